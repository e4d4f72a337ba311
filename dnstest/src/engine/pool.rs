use core::num::NonZero;
use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::Semaphore;

/// A unit of access handed out by the [`Pool`].
#[derive(Debug)]
pub enum Token<C> {
    /// No connection, the holder must dial a new one to use it.
    Empty,
    /// Live connection, exclusively owned by the holder.
    Bound(C),
}

impl<C> Token<C> {
    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(..))
    }
}

/// Fixed-capacity connection pool.
///
/// Exactly `capacity` tokens circulate through the pool: it starts with
/// `capacity` empty tokens and every acquired token must be released back,
/// possibly emptied. This makes the pool both a concurrency limiter (at most
/// `capacity` connections are in use) and a connection cache.
#[derive(Debug)]
pub struct Pool<C> {
    capacity: usize,
    /// One permit per token sitting in the queue.
    available: Semaphore,
    tokens: Mutex<VecDeque<Token<C>>>,
}

impl<C> Pool<C> {
    pub fn new(capacity: NonZero<usize>) -> Self {
        let capacity = capacity.get();
        let tokens = (0..capacity).map(|_| Token::Empty).collect();

        Self {
            capacity,
            available: Semaphore::new(capacity),
            tokens: Mutex::new(tokens),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits until a token is available and takes it.
    ///
    /// Returns `None` once the pool is closed. Cancel safe: dropping the
    /// future never loses a token.
    pub async fn acquire(&self) -> Option<Token<C>> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();

        Some(self.pop())
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> Option<Token<C>> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();

        Some(self.pop())
    }

    /// Returns a token to the pool. Never blocks.
    ///
    /// A token released while the pool is already full was never acquired
    /// from it, so it is refused and dropped. Returns whether the token was
    /// accepted.
    pub fn release(&self, token: Token<C>) -> bool {
        {
            let mut tokens = self.tokens();
            // Counts both queued tokens and those whose permit is being
            // handed out right now.
            if tokens.len() >= self.capacity {
                log::error!("token released to a full pool, dropping it");
                return false;
            }
            tokens.push_back(token);
        }
        self.available.add_permits(1);

        true
    }

    /// Closes the pool and takes all the tokens currently inside.
    ///
    /// Pending and future [`Pool::acquire`] calls return `None`. Must be
    /// called after all holders have released their tokens to recover every
    /// connection.
    pub fn drain(&self) -> Vec<Token<C>> {
        self.available.close();
        self.tokens().drain(..).collect()
    }

    #[inline]
    fn pop(&self) -> Token<C> {
        match self.tokens().pop_front() {
            Some(token) => token,
            // A permit is only issued for a queued token.
            None => unreachable!("permit acquired without a token"),
        }
    }

    #[inline]
    fn tokens(&self) -> MutexGuard<'_, VecDeque<Token<C>>> {
        // The queue is consistent after every push and pop, so a panic while
        // holding the lock can not leave it broken.
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    fn pool<C>(capacity: usize) -> Pool<C> {
        Pool::new(NonZero::new(capacity).unwrap())
    }

    #[test]
    fn starts_with_capacity_empty_tokens() {
        for capacity in [1, 2, 7, 64] {
            let pool = pool::<u32>(capacity);

            for _ in 0..capacity {
                assert!(matches!(pool.try_acquire(), Some(Token::Empty)));
            }
            assert!(pool.try_acquire().is_none());
        }
    }

    #[test]
    fn released_token_is_available_again() {
        let pool = pool::<u32>(1);

        let token = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());

        assert!(!token.is_bound());
        pool.release(Token::Bound(42));
        assert!(matches!(pool.try_acquire(), Some(Token::Bound(42))));
    }

    #[test]
    fn tokens_are_neither_lost_nor_duplicated() {
        let pool = pool::<u32>(3);

        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(pool.release(a));
        let c = pool.try_acquire().unwrap();
        let d = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());

        drop(d);
        assert!(pool.release(Token::Bound(1)));
        assert!(pool.release(b));
        assert!(pool.release(c));

        let tokens = pool.drain();
        assert_eq!(3, tokens.len());
        assert_eq!(1, tokens.iter().filter(|t| t.is_bound()).count());
    }

    #[test]
    fn release_to_full_pool_is_refused() {
        let pool = pool::<u32>(1);

        let token = pool.try_acquire().unwrap();
        assert!(pool.release(token));
        assert!(!pool.release(Token::Bound(9)));

        let token = pool.try_acquire().unwrap();
        assert!(!token.is_bound());
        assert!(pool.try_acquire().is_none());

        assert!(pool.release(token));
        assert_eq!(1, pool.drain().len());
    }

    #[test]
    fn drain_closes_the_pool() {
        let pool = pool::<u32>(2);

        assert_eq!(2, pool.drain().len());
        assert!(pool.try_acquire().is_none());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let pool = Arc::new(pool::<u32>(1));
        let token = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(token);
        pool.release(Token::Bound(7));
        assert!(matches!(waiter.await.unwrap(), Some(Token::Bound(7))));
    }

    #[tokio::test]
    async fn acquire_returns_none_when_drained() {
        let pool = Arc::new(pool::<u32>(1));
        let _token = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::task::yield_now().await;

        assert!(pool.drain().is_empty());
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_acquire_loses_nothing() {
        let pool = pool::<u32>(1);
        let token = pool.acquire().await.unwrap();

        let rc = tokio::time::timeout(core::time::Duration::from_millis(10), pool.acquire()).await;
        assert!(rc.is_err());

        pool.release(token);
        assert!(pool.try_acquire().is_some());
    }
}

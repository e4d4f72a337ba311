use core::time::Duration;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{
    dial::Dial,
    exchange::exchange,
    pool::{Pool, Token},
};
use crate::{message::MessageFactory, stat::Stat};

/// Independent request loop.
///
/// Each iteration takes a token from the pool, dials a connection if the
/// token is empty, performs exactly one exchange and returns the token back.
/// A connection that failed an exchange is dropped and an empty token is
/// returned instead, so it never circulates again.
pub struct Worker<D: Dial> {
    id: usize,
    pool: Arc<Pool<D::Conn>>,
    dialer: Arc<D>,
    factory: Arc<MessageFactory>,
    read_timeout: Duration,
    stat: Arc<Stat>,
    cancel: CancellationToken,
}

impl<D: Dial> Worker<D> {
    pub fn new(
        id: usize,
        pool: Arc<Pool<D::Conn>>,
        dialer: Arc<D>,
        factory: Arc<MessageFactory>,
        read_timeout: Duration,
        stat: Arc<Stat>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            pool,
            dialer,
            factory,
            read_timeout,
            stat,
            cancel,
        }
    }

    /// Runs until cancelled or until the pool is closed.
    pub async fn run(self) {
        log::debug!("worker {} started", self.id);

        loop {
            let token = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                token = self.pool.acquire() => token,
            };
            let Some(token) = token else {
                break;
            };

            let token = self.execute(token).await;
            let is_bound = token.is_bound();
            self.pool.release(token);

            if !is_bound {
                // Give other workers a chance to run when the resolver is
                // unreachable, we do not back off.
                tokio::task::yield_now().await;
            }
        }

        log::debug!("worker {} stopped", self.id);
    }

    /// Performs a single iteration with the given token, returning the token
    /// that must be released back to the pool.
    async fn execute(&self, token: Token<D::Conn>) -> Token<D::Conn> {
        let mut conn = match token {
            Token::Bound(conn) => conn,
            Token::Empty => {
                let rc = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Token::Empty,
                    rc = self.dialer.dial() => rc,
                };

                match rc {
                    Ok(conn) => {
                        self.stat.on_sock_created();
                        conn
                    }
                    Err(err) => {
                        log::warn!("reconnect due to broken connection: {err}");
                        self.stat.on_dial_err();
                        return Token::Empty;
                    }
                }
            }
        };

        let req = match self.factory.next() {
            Ok(req) => req,
            Err(err) => {
                log::warn!("failed to build request: {err}");
                tokio::task::yield_now().await;
                return Token::Bound(conn);
            }
        };

        let rc = tokio::select! {
            biased;
            // The response may still be in flight, so the connection can not
            // be reused.
            _ = self.cancel.cancelled() => return Token::Empty,
            rc = exchange(&mut conn, &req, self.read_timeout, &self.stat) => rc,
        };

        match rc {
            Ok(()) => Token::Bound(conn),
            Err(err) => {
                log::warn!("reconnect for [{}] due to {err}", req.qname());
                self.stat.on_exchange_err();
                Token::Empty
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use core::{
        num::NonZero,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use std::{
        io::{Error, ErrorKind},
        sync::Mutex,
    };

    use super::*;
    use crate::{
        corpus::Corpus,
        engine::exchange::test::{Behavior, FakeConn},
        error::DialError,
    };

    const RTT: Duration = Duration::from_millis(20);
    const OK: Behavior = Behavior::Answer { rcode: 0, delay: RTT };

    /// Hands out scripted connections, one script per dial. Once the scripts
    /// run out every dial fails.
    #[derive(Debug)]
    pub(crate) struct FakeDialer {
        scripts: Mutex<Vec<Vec<Behavior>>>,
        dials: AtomicUsize,
        /// Cancels the run once this many dials have been attempted.
        max_dials: Option<(usize, CancellationToken)>,
    }

    impl FakeDialer {
        pub(crate) fn new(scripts: Vec<Vec<Behavior>>) -> Self {
            let mut scripts = scripts;
            scripts.reverse();

            Self {
                scripts: Mutex::new(scripts),
                dials: AtomicUsize::new(0),
                max_dials: None,
            }
        }

        /// Every dial succeeds with a connection following the same script.
        pub(crate) fn repeat(script: Vec<Behavior>, count: usize) -> Self {
            Self::new(vec![script; count])
        }

        fn cancel_after(mut self, dials: usize, cancel: CancellationToken) -> Self {
            self.max_dials = Some((dials, cancel));
            self
        }

        pub(crate) fn dials(&self) -> usize {
            self.dials.load(Ordering::Relaxed)
        }
    }

    impl Dial for FakeDialer {
        type Conn = FakeConn;

        async fn dial(&self) -> Result<FakeConn, DialError> {
            let dials = self.dials.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some((max, cancel)) = &self.max_dials {
                if dials >= *max {
                    cancel.cancel();
                }
            }

            match self.scripts.lock().unwrap().pop() {
                Some(script) => Ok(FakeConn::new(script)),
                None => Err(DialError::Io(Error::from(ErrorKind::ConnectionRefused))),
            }
        }
    }

    struct Setup {
        pool: Arc<Pool<FakeConn>>,
        dialer: Arc<FakeDialer>,
        stat: Arc<Stat>,
        cancel: CancellationToken,
    }

    impl Setup {
        fn new(capacity: usize, dialer: FakeDialer, cancel: CancellationToken) -> Self {
            Self {
                pool: Arc::new(Pool::new(NonZero::new(capacity).unwrap())),
                dialer: Arc::new(dialer),
                stat: Arc::new(Stat::default()),
                cancel,
            }
        }

        fn worker(&self, id: usize) -> Worker<FakeDialer> {
            let factory = MessageFactory::new(Corpus::default(), false, false);

            Worker::new(
                id,
                self.pool.clone(),
                self.dialer.clone(),
                Arc::new(factory),
                Duration::from_secs(5),
                self.stat.clone(),
                self.cancel.clone(),
            )
        }

        async fn cancel_at(&self, at: Duration) {
            tokio::time::sleep(at).await;
            self.cancel.cancel();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_connection() {
        let setup = Setup::new(1, FakeDialer::repeat(vec![OK], 1), CancellationToken::new());

        // Five exchanges complete at 20ms steps, the sixth is interrupted.
        tokio::join!(setup.worker(0).run(), setup.cancel_at(Duration::from_millis(110)));

        assert_eq!(5, setup.stat.num_completed());
        assert_eq!(RTT * 5, setup.stat.rtt());
        assert_eq!(1, setup.dialer.dials());
        assert_eq!(1, setup.stat.num_sock_created());

        let s = setup.stat.snapshot(Duration::from_secs(1));
        assert_eq!(5, s.qps);
        assert_eq!(0.02, s.rtt);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_replaces_connection() {
        let dialer = FakeDialer::new(vec![vec![OK, OK, Behavior::WrongId], vec![OK]]);
        let setup = Setup::new(1, dialer, CancellationToken::new());

        tokio::join!(setup.worker(0).run(), setup.cancel_at(Duration::from_millis(90)));

        assert_eq!(2, setup.dialer.dials());
        assert_eq!(4, setup.stat.num_completed());
        assert_eq!(1, setup.stat.num_exchange_errors());

        let tokens = setup.pool.drain();
        assert_eq!(1, tokens.len());
        // Cancelled mid-exchange.
        assert!(!tokens[0].is_bound());
    }

    #[tokio::test(start_paused = true)]
    async fn dial_failures_keep_pool_intact() {
        let cancel = CancellationToken::new();
        let dialer = FakeDialer::new(Vec::new()).cancel_after(10, cancel.clone());
        let setup = Setup::new(2, dialer, cancel);

        setup.worker(0).run().await;

        assert_eq!(0, setup.stat.num_completed());
        assert_eq!(10, setup.stat.num_dial_errors());
        assert_eq!(0, setup.stat.num_sock_created());

        let tokens = setup.pool.drain();
        assert_eq!(2, tokens.len());
        assert!(tokens.iter().all(|t| !t.is_bound()));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_limits_connections() {
        let setup = Setup::new(2, FakeDialer::repeat(vec![OK], 4), CancellationToken::new());

        tokio::join!(
            setup.worker(0).run(),
            setup.worker(1).run(),
            setup.worker(2).run(),
            setup.worker(3).run(),
            setup.cancel_at(Duration::from_millis(110)),
        );

        // Two connections are used in parallel, whatever the worker count.
        assert_eq!(2, setup.dialer.dials());
        assert_eq!(10, setup.stat.num_completed());
        assert_eq!(2, setup.pool.drain().len());
    }

    #[tokio::test]
    async fn stops_while_waiting_for_token() {
        let setup = Setup::new(1, FakeDialer::repeat(vec![OK], 1), CancellationToken::new());
        let token = setup.pool.try_acquire().unwrap();

        setup.cancel.cancel();
        setup.worker(0).run().await;

        setup.pool.release(token);
        assert_eq!(0, setup.dialer.dials());
        assert_eq!(1, setup.pool.drain().len());
    }

    #[tokio::test]
    async fn stops_when_pool_is_closed() {
        let setup = Setup::new(1, FakeDialer::repeat(vec![OK], 1), CancellationToken::new());
        setup.pool.drain();

        setup.worker(0).run().await;

        assert_eq!(0, setup.dialer.dials());
    }
}

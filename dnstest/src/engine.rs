use core::{num::NonZero, time::Duration};
use std::sync::Arc;

use anyhow::Error;
use tokio_util::sync::CancellationToken;

pub use self::{
    conn::{Connection, Transport},
    dial::{Dial, Dialer},
    exchange::exchange,
    pool::{Pool, Token},
    worker::Worker,
};
use self::runtime::{LocalTaskPool, ThreadPool};
use crate::{cfg::Config, message::MessageFactory, stat::Stat};

mod conn;
mod dial;
mod exchange;
mod pool;
mod runtime;
mod worker;

/// Connection-pooled load engine.
///
/// Spreads the workers over a fixed set of OS threads, all sharing a single
/// connection pool, message factory and statistics.
pub struct Engine<D: Dial> {
    pool: Arc<Pool<D::Conn>>,
    dialer: Arc<D>,
    factory: Arc<MessageFactory>,
    stat: Arc<Stat>,
    num_workers: NonZero<usize>,
    num_threads: NonZero<usize>,
    read_timeout: Duration,
}

impl<D> Engine<D>
where
    D: Dial + Send + Sync + 'static,
    D::Conn: Send + 'static,
{
    pub fn new(cfg: &Config, dialer: D, factory: MessageFactory) -> Self {
        Self {
            pool: Arc::new(Pool::new(cfg.connections)),
            dialer: Arc::new(dialer),
            factory: Arc::new(factory),
            stat: Arc::new(Stat::default()),
            num_workers: cfg.workers,
            num_threads: cfg.threads.min(cfg.workers),
            read_timeout: cfg.read_timeout,
        }
    }

    #[inline]
    pub fn stat(&self) -> Arc<Stat> {
        self.stat.clone()
    }

    /// Runs all the workers until the given token is cancelled.
    ///
    /// Blocks the calling thread. Returns only after every worker has stopped
    /// and every pooled connection has been closed.
    pub fn run(self, cancel: CancellationToken) -> Result<(), Error> {
        let num_threads = self.num_threads.get();
        let num_workers = self.num_workers.get();

        let rt = ThreadPool::new(self.num_threads, |tid: usize| {
            let pool = self.pool.clone();
            let dialer = self.dialer.clone();
            let factory = self.factory.clone();
            let stat = self.stat.clone();
            let cancel = cancel.clone();
            let read_timeout = self.read_timeout;

            move || {
                let ids: Vec<usize> = worker_ids(tid, num_threads, num_workers).collect();

                let tasks = LocalTaskPool::new(ids.len(), |idx| {
                    let worker = Worker::new(
                        ids[idx],
                        pool.clone(),
                        dialer.clone(),
                        factory.clone(),
                        read_timeout,
                        stat.clone(),
                        cancel.clone(),
                    );

                    worker.run()
                });

                tasks.run()
            }
        });

        let rc = rt.run();

        // All workers have returned their tokens by now.
        let tokens = self.pool.drain();
        let num_bound = tokens.iter().filter(|token| token.is_bound()).count();
        log::debug!("closed {num_bound} connections, {}/{} tokens recovered", tokens.len(), self.pool.capacity());

        rc
    }
}

/// Returns identifiers of workers assigned to the given thread, round-robin.
fn worker_ids(tid: usize, num_threads: usize, num_workers: usize) -> impl Iterator<Item = usize> {
    (tid..num_workers).step_by(num_threads)
}

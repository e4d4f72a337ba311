use core::{future::Future, num::NonZero};
use std::thread::Builder;

use anyhow::{anyhow, Error};
use tokio::task::LocalSet;

/// Represents a thread pool for running workers each in a separate thread.
#[derive(Debug)]
pub struct ThreadPool<F> {
    num_threads: NonZero<usize>,
    factory: F,
}

impl<F> ThreadPool<F> {
    pub fn new(num_threads: NonZero<usize>, factory: F) -> Self {
        Self { num_threads, factory }
    }
}

impl<F, U> ThreadPool<F>
where
    F: FnMut(usize) -> U,
    U: FnOnce() -> Result<(), Error> + Send + 'static,
{
    /// Runs this [`ThreadPool`] by spawning threads and waiting for them to
    /// complete.
    ///
    /// Every spawned thread is joined, even if some of them fail. The first
    /// error is returned.
    pub fn run(mut self) -> Result<(), Error> {
        let num_threads = self.num_threads.get();
        let mut threads = Vec::with_capacity(num_threads);

        let mut rc = Ok(());
        for idx in 0..num_threads {
            let worker = (self.factory)(idx);

            match Builder::new().name(format!("dnstest:w{idx}")).spawn(worker) {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    rc = Err(err.into());
                    break;
                }
            }
        }

        for thread in threads {
            let v = thread.join().map_err(|_| anyhow!("worker thread panicked")).and_then(|v| v);
            if rc.is_ok() {
                rc = v;
            }
        }

        rc
    }
}

/// Per-thread task set.
///
/// Tasks are not required to be `Send`: they all run on the calling thread
/// within a single-threaded runtime.
#[derive(Debug)]
pub struct LocalTaskPool<F> {
    num_tasks: usize,
    factory: F,
}

impl<F> LocalTaskPool<F> {
    pub fn new(num_tasks: usize, factory: F) -> Self {
        Self { factory, num_tasks }
    }
}

impl<F, T> LocalTaskPool<F>
where
    F: FnMut(usize) -> T,
    T: Future + 'static,
{
    /// Runs all tasks to completion.
    pub fn run(mut self) -> Result<(), Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;
        let local = LocalSet::new();

        let mut jobs = Vec::with_capacity(self.num_tasks);
        for idx in 0..self.num_tasks {
            let job = local.spawn_local((self.factory)(idx));

            jobs.push(job);
        }

        local.block_on(&runtime, async move {
            for job in jobs {
                job.await?;
            }

            Ok::<_, Error>(())
        })
    }
}

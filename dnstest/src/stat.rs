use core::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

use crate::histogram::LogHistogram;

const NS_IN_SEC: f64 = 1_000_000_000.0;

/// Run-wide statistics, shared between all workers.
///
/// Every counter is updated with a relaxed atomic increment and can be read
/// while workers are still running.
#[derive(Debug, Default)]
pub struct Stat {
    /// Number of successfully completed exchanges.
    num_completed: AtomicU64,
    /// Cumulative round-trip time of completed exchanges, in nanoseconds.
    rtt_ns: AtomicU64,
    /// Number of connections established.
    num_sock_created: AtomicU64,
    /// Number of failed dial attempts.
    num_dial_errors: AtomicU64,
    /// Number of failed exchanges.
    num_exchange_errors: AtomicU64,
    /// Round-trip times histogram.
    hist: LogHistogram,
}

impl Stat {
    /// Accounts a successful exchange that took the given time.
    #[inline]
    pub fn on_exchange(&self, rtt: Duration) {
        self.num_completed.fetch_add(1, Ordering::Relaxed);
        self.rtt_ns.fetch_add(rtt.as_nanos() as u64, Ordering::Relaxed);
        self.hist.record(rtt);
    }

    #[inline]
    pub fn on_sock_created(&self) {
        self.num_sock_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_dial_err(&self) {
        self.num_dial_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_exchange_err(&self) {
        self.num_exchange_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn num_completed(&self) -> u64 {
        self.num_completed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rtt(&self) -> Duration {
        Duration::from_nanos(self.rtt_ns.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn num_sock_created(&self) -> u64 {
        self.num_sock_created.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn num_dial_errors(&self) -> u64 {
        self.num_dial_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn num_exchange_errors(&self) -> u64 {
        self.num_exchange_errors.load(Ordering::Relaxed)
    }

    /// Computes the report for a run that lasted `elapsed`.
    ///
    /// Throughput is truncated to an integer but computed from the exact
    /// elapsed time, so sub-second runs do not collapse to zero.
    pub fn snapshot(&self, elapsed: Duration) -> Snapshot {
        let completed = self.num_completed();
        let rtt_ns = self.rtt_ns.load(Ordering::Relaxed);

        let (qps, rtt) = match (completed, elapsed.as_nanos()) {
            (0, _) => (0, 0.0),
            (_, 0) => (0, (rtt_ns / completed) as f64 / NS_IN_SEC),
            (n, elapsed_ns) => {
                let qps = (n as u128 * NS_IN_SEC as u128 / elapsed_ns) as u64;
                (qps, (rtt_ns / n) as f64 / NS_IN_SEC)
            }
        };

        Snapshot {
            qps,
            rtt,
            completed,
            p50: self.hist.quantile(0.50).as_secs_f64(),
            p90: self.hist.quantile(0.90).as_secs_f64(),
            p99: self.hist.quantile(0.99).as_secs_f64(),
            sock_created: self.num_sock_created(),
            dial_errors: self.num_dial_errors(),
            exchange_errors: self.num_exchange_errors(),
        }
    }
}

/// Final run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Completed exchanges per second.
    pub qps: u64,
    /// Mean round-trip time, in seconds.
    pub rtt: f64,
    /// Number of completed exchanges.
    pub completed: u64,
    /// Round-trip time quantiles estimated from the histogram, in seconds.
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub sock_created: u64,
    pub dial_errors: u64,
    pub exchange_errors: u64,
}

impl Display for Snapshot {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        write!(fmt, "QPS: {}, RTT (sec): {:.6}", self.qps, self.rtt)
    }
}

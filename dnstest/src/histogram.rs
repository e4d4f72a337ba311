use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Upper bound of the last bucket, in microseconds.
const MAX_US: f64 = 60_000_000.0;
/// Ratio between two adjacent bucket bounds.
const FACTOR: f64 = 1.5;

/// Lock-free latency histogram with logarithmic buckets.
///
/// Bucket `i` counts samples in `[FACTOR^i; FACTOR^(i+1))` microseconds,
/// samples beyond the last bound land in the last bucket.
#[derive(Debug)]
pub struct LogHistogram {
    buckets: Vec<AtomicU64>,
}

impl Default for LogHistogram {
    fn default() -> Self {
        let mut buckets = Vec::new();
        let mut curr = 1.0;
        while curr < MAX_US {
            buckets.push(AtomicU64::new(0));
            curr *= FACTOR;
        }

        Self { buckets }
    }
}

impl LogHistogram {
    #[inline]
    pub fn record(&self, d: Duration) {
        let us = d.as_micros() as f64;
        let idx = us.log(FACTOR).max(0.0) as usize;
        let idx = idx.min(self.buckets.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total number of recorded samples.
    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|v| v.load(Ordering::Relaxed)).sum()
    }

    /// Estimates the given quantile.
    ///
    /// Finds the first bucket `i` whose cumulative count reaches `q * total`
    /// and interpolates linearly inside it in log-`FACTOR` coordinates:
    /// with `sum` samples below the bucket and `b` inside it, the pseudo-index
    /// is `x = i + (q * total - sum) / b` and the estimate is `FACTOR^x`.
    ///
    /// Returns zero for an empty histogram.
    pub fn quantile(&self, q: f64) -> Duration {
        assert!((0.0..=1.0).contains(&q));

        let snapshot: Vec<u64> = self.buckets.iter().map(|v| v.load(Ordering::Relaxed)).collect();
        let size: u64 = snapshot.iter().sum();
        if size == 0 {
            return Duration::ZERO;
        }

        let mut sum = 0;
        for (idx, &b) in snapshot.iter().enumerate() {
            if ((sum + b) as f64) >= q * (size as f64) {
                if b == 0 {
                    // Only possible for q == 0 before the first sample.
                    return Duration::ZERO;
                }

                let x = (q * size as f64 - sum as f64) / b as f64 + idx as f64;
                return Duration::from_micros(FACTOR.powf(x) as u64);
            }
            sum += b;
        }

        Duration::from_micros(MAX_US as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_quantile() {
        let h = LogHistogram::default();

        assert_eq!(0, h.count());
        assert_eq!(Duration::ZERO, h.quantile(0.5));
    }

    #[test]
    fn zero_quantile() {
        let h = LogHistogram::default();
        h.record(Duration::from_millis(1));

        assert_eq!(Duration::ZERO, h.quantile(0.0));
    }

    #[test]
    fn quantile_lands_in_recorded_bucket() {
        let h = LogHistogram::default();
        for _ in 0..100 {
            h.record(Duration::from_millis(20));
        }

        // Bucket bounds are FACTOR apart, the estimate stays within one.
        let p50 = h.quantile(0.5).as_micros() as f64;
        assert!(p50 >= 20_000.0 / FACTOR && p50 <= 20_000.0 * FACTOR, "p50: {p50}");
        assert_eq!(100, h.count());
    }

    #[test]
    fn quantiles_are_ordered() {
        let h = LogHistogram::default();
        for ms in 1..=100 {
            h.record(Duration::from_millis(ms));
        }

        let p50 = h.quantile(0.5);
        let p90 = h.quantile(0.9);
        let p99 = h.quantile(0.99);
        assert!(p50 <= p90 && p90 <= p99);
    }

    #[test]
    fn huge_samples_are_clamped() {
        let h = LogHistogram::default();
        h.record(Duration::from_secs(3600));

        assert_eq!(1, h.count());
        assert!(h.quantile(1.0) <= Duration::from_micros((MAX_US * FACTOR) as u64));
    }
}

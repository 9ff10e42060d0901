//! Scan listener contract (§6) and a rate-limiting wrapper for `recordRead`.

use std::time::{Duration, Instant};

use crate::wire::WireParameters;

/// Callbacks driven from the scanning thread during [`super::driver::acquire_image`].
/// Implementations must return promptly: they run inline with the blocking
/// read loop, not on a side channel.
pub trait ScanListener {
    fn scanning_started(&mut self) {}

    fn frame_acquisition_started(
        &mut self,
        _parameters: &WireParameters,
        _frame_index: usize,
        _likely_total_frames: usize,
    ) {
    }

    fn record_read(&mut self, _total_bytes_read: usize, _expected_image_bytes: Option<usize>) {}

    fn scanning_finished(&mut self) {}
}

/// Wraps a [`ScanListener`], dropping `record_read` notifications that
/// arrive within `min_interval` of the last one that was let through.
pub struct RateLimitedScanListener<T> {
    inner: T,
    min_interval: Duration,
    last_record_at: Option<Instant>,
}

impl<T: ScanListener> RateLimitedScanListener<T> {
    pub fn new(inner: T, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_record_at: None,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: ScanListener> ScanListener for RateLimitedScanListener<T> {
    fn scanning_started(&mut self) {
        self.inner.scanning_started();
    }

    fn frame_acquisition_started(
        &mut self,
        parameters: &WireParameters,
        frame_index: usize,
        likely_total_frames: usize,
    ) {
        self.inner.frame_acquisition_started(parameters, frame_index, likely_total_frames);
    }

    fn record_read(&mut self, total_bytes_read: usize, expected_image_bytes: Option<usize>) {
        let now = Instant::now();
        if let Some(last) = self.last_record_at {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }
        self.last_record_at = Some(now);
        self.inner.record_read(total_bytes_read, expected_image_bytes);
    }

    fn scanning_finished(&mut self) {
        self.inner.scanning_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingListener {
        records: usize,
    }

    impl ScanListener for CountingListener {
        fn record_read(&mut self, _total_bytes_read: usize, _expected_image_bytes: Option<usize>) {
            self.records += 1;
        }
    }

    #[test]
    fn drops_records_within_the_interval() {
        let mut listener = RateLimitedScanListener::new(CountingListener::default(), Duration::from_secs(3600));
        listener.record_read(10, None);
        listener.record_read(20, None);
        listener.record_read(30, None);
        assert_eq!(listener.into_inner().records, 1);
    }

    #[test]
    fn zero_interval_lets_everything_through() {
        let mut listener = RateLimitedScanListener::new(CountingListener::default(), Duration::ZERO);
        listener.record_read(10, None);
        listener.record_read(20, None);
        assert_eq!(listener.into_inner().records, 2);
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::frame::{Frame, Region};
use crate::error::Result;
use crate::platform::ScreenCapture;

pub const DEFAULT_TTL: Duration = Duration::from_millis(50);

struct CachedFrame {
    region: Region,
    stored_at: Instant,
    frame: Arc<Frame>,
}

/// Remembers the last captured region for a short time.
pub struct ScreenCache {
    capture: Arc<dyn ScreenCapture>,
    ttl: Duration,
    entry: Option<CachedFrame>,
}

impl ScreenCache {
    pub fn new(capture: Arc<dyn ScreenCapture>, ttl: Duration) -> Self {
        Self {
            capture,
            ttl,
            entry: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached frame for `region` if younger than the TTL, otherwise a fresh capture.
    pub fn get_or_capture(&mut self, region: Region, now: Instant) -> Result<Arc<Frame>> {
        if let Some(entry) = &self.entry {
            if entry.region == region && now.saturating_duration_since(entry.stored_at) < self.ttl {
                return Ok(Arc::clone(&entry.frame));
            }
        }

        let frame = Arc::new(self.capture.capture(region)?);
        debug!(?region, width = frame.width(), height = frame.height(), "captured screen region");
        self.entry = Some(CachedFrame {
            region,
            stored_at: now,
            frame: Arc::clone(&frame),
        });
        Ok(frame)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubCapture;

    fn cache() -> (Arc<StubCapture>, ScreenCache) {
        let capture = Arc::new(StubCapture::blank());
        let cache = ScreenCache::new(capture.clone(), DEFAULT_TTL);
        (capture, cache)
    }

    #[test]
    fn reuses_frame_within_ttl() {
        let (capture, mut cache) = cache();
        let region = Region::new(0, 0, 10, 10);
        let t0 = Instant::now();

        cache.get_or_capture(region, t0).unwrap();
        cache.get_or_capture(region, t0 + Duration::from_millis(49)).unwrap();
        assert_eq!(capture.calls(), 1);

        cache.get_or_capture(region, t0 + Duration::from_millis(50)).unwrap();
        assert_eq!(capture.calls(), 2);
    }

    #[test]
    fn invalidate_forces_capture() {
        let (capture, mut cache) = cache();
        let region = Region::new(0, 0, 10, 10);
        let t0 = Instant::now();

        cache.get_or_capture(region, t0).unwrap();
        cache.invalidate();
        cache.get_or_capture(region, t0).unwrap();
        assert_eq!(capture.calls(), 2);
    }

    #[test]
    fn different_region_misses() {
        let (capture, mut cache) = cache();
        let t0 = Instant::now();

        cache.get_or_capture(Region::new(0, 0, 10, 10), t0).unwrap();
        let frame = cache.get_or_capture(Region::new(5, 5, 20, 8), t0).unwrap();
        assert_eq!(capture.calls(), 2);
        assert_eq!((frame.width(), frame.height()), (20, 8));
    }

    #[test]
    fn failed_capture_is_not_cached() {
        let (capture, mut cache) = cache();
        let region = Region::new(0, 0, 10, 10);
        let t0 = Instant::now();

        capture.push_failure("display asleep");
        assert!(cache.get_or_capture(region, t0).is_err());
        assert!(cache.get_or_capture(region, t0).is_ok());
        assert_eq!(capture.calls(), 2);
    }
}

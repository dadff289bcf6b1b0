use crate::cache::LruMap;
use crate::foundation::geom::Dimensions;
use std::sync::Mutex;

/// Moving-average estimator of per-tile computation durations, keyed by tile
/// dimensions and bounded by a small LRU.
///
/// Real runs feed [`DurationEstimator::update`] after every canonical-tile
/// computation; the simulator reads [`DurationEstimator::duration`], probing
/// the kernel once per unseen dimensions to seed the average.
#[derive(Debug)]
pub struct DurationEstimator {
    cache: Mutex<LruMap<Dimensions, f64>>,
    factor: f64,
}

impl DurationEstimator {
    /// Estimator with the given LRU capacity and smoothing factor.
    pub fn with_params(capacity: usize, factor: f64) -> Self {
        Self {
            cache: Mutex::new(LruMap::new(capacity)),
            factor,
        }
    }

    /// Estimator with the stock parameters (8 slots, factor 1e-2).
    pub fn new() -> Self {
        Self::with_params(8, 1e-2)
    }

    /// Fold a measured duration (seconds) into the average for `dims`.
    pub fn update(&self, dims: Dimensions, seconds: f64) {
        let mut cache = self.lock();
        if let Some(avg) = cache.get_mut(&dims) {
            *avg = self.factor * seconds + (1.0 - self.factor) * *avg;
        } else {
            cache.insert(dims, seconds);
        }
    }

    /// Estimated duration (seconds) for `dims`; `probe` runs once to seed an
    /// unseen entry.
    pub fn duration(&self, dims: Dimensions, probe: impl FnOnce() -> f64) -> f64 {
        let mut cache = self.lock();
        if let Some(avg) = cache.get(&dims) {
            return *avg;
        }
        let seconds = probe();
        cache.insert(dims, seconds);
        seconds
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruMap<Dimensions, f64>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_seeds_once_and_is_reused() {
        let est = DurationEstimator::new();
        let dims = Dimensions::new(32, 32);

        assert_eq!(est.duration(dims, || 2.0), 2.0);
        assert_eq!(est.duration(dims, || panic!("must not re-probe")), 2.0);
    }

    #[test]
    fn update_moves_the_average_slowly() {
        let est = DurationEstimator::with_params(8, 0.5);
        let dims = Dimensions::new(32, 32);

        est.update(dims, 4.0);
        est.update(dims, 2.0);
        assert_eq!(est.duration(dims, || unreachable!()), 3.0);
    }

    #[test]
    fn distinct_dimensions_are_tracked_separately() {
        let est = DurationEstimator::new();
        est.update(Dimensions::new(32, 32), 1.0);
        est.update(Dimensions::new(4, 32), 9.0);

        assert_eq!(est.duration(Dimensions::new(32, 32), || 0.0), 1.0);
        assert_eq!(est.duration(Dimensions::new(4, 32), || 0.0), 9.0);
    }
}

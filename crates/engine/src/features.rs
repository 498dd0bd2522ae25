//! Compute-once cache for the texture descriptor volume

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info};
use voxseg_algorithms::texture::{extract_features, FeatureParams, FeatureVolume};
use voxseg_core::{CancelToken, Error, Result, Volume, VolumeId, VoxelElement};

struct Entry {
    volume: VolumeId,
    params: FeatureParams,
    features: Arc<FeatureVolume>,
}

/// Descriptor volume cached by (volume identity, extraction parameters).
///
/// Shared between the worker thread and synchronous runs; extraction runs
/// under the lock so concurrent callers never compute twice. Descriptors do
/// not depend on markers, so extraction is cancelled only through
/// [`invalidate`](Self::invalidate) or [`cancel_extraction`](Self::cancel_extraction),
/// never by a superseded segmentation job.
#[derive(Default)]
pub struct FeatureCache {
    entry: Mutex<Option<Entry>>,
    extraction: Mutex<CancelToken>,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached descriptors for `volume`, extracting them on a miss.
    pub fn get_or_compute<T: VoxelElement>(
        &self,
        volume: &Volume<T>,
        params: FeatureParams,
    ) -> Result<Arc<FeatureVolume>> {
        let mut entry = self
            .entry
            .lock()
            .map_err(|_| Error::Other("feature cache lock poisoned".to_string()))?;
        if let Some(hit) = entry.as_ref() {
            if hit.volume == volume.id() && hit.params == params {
                return Ok(Arc::clone(&hit.features));
            }
        }

        let cancel = self.extraction_token()?;
        let start = Instant::now();
        let features = Arc::new(extract_features(volume, params, &cancel)?);
        info!(
            shape = ?volume.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "texture features extracted"
        );
        *entry = Some(Entry { volume: volume.id(), params, features: Arc::clone(&features) });
        Ok(features)
    }

    /// Whether descriptors for exactly this volume and parameters are held
    pub fn is_cached(&self, volume: VolumeId, params: FeatureParams) -> bool {
        self.entry
            .lock()
            .map(|e| e.as_ref().is_some_and(|hit| hit.volume == volume && hit.params == params))
            .unwrap_or(false)
    }

    /// Stop a running extraction; later extractions start with a fresh token.
    pub fn cancel_extraction(&self) {
        if let Ok(mut token) = self.extraction.lock() {
            token.cancel();
            *token = CancelToken::new();
            debug!("feature extraction cancelled");
        }
    }

    /// Drop the cached descriptors, cancelling any extraction in flight.
    pub fn invalidate(&self) {
        self.cancel_extraction();
        if let Ok(mut entry) = self.entry.lock() {
            *entry = None;
        }
    }

    fn extraction_token(&self) -> Result<CancelToken> {
        self.extraction
            .lock()
            .map(|token| token.clone())
            .map_err(|_| Error::Other("feature cache lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_returns_same_allocation() {
        let cache = FeatureCache::new();
        let volume = Volume::<i16>::filled(4, 4, 4, 100);
        let params = FeatureParams::default();
        let a = cache.get_or_compute(&volume, params).unwrap();
        let b = cache.get_or_compute(&volume, params).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.is_cached(volume.id(), params));
    }

    #[test]
    fn test_mutated_volume_misses() {
        let cache = FeatureCache::new();
        let mut volume = Volume::<i16>::filled(4, 4, 4, 100);
        let params = FeatureParams::default();
        let a = cache.get_or_compute(&volume, params).unwrap();
        volume.set(1, 1, 1, 500).unwrap();
        assert!(!cache.is_cached(volume.id(), params));
        let b = cache.get_or_compute(&volume, params).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_changed_params_miss() {
        let cache = FeatureCache::new();
        let volume = Volume::<i16>::filled(3, 3, 3, 7);
        let params = FeatureParams::default();
        cache.get_or_compute(&volume, params).unwrap();
        let other = FeatureParams { sigma: 0.0, ..params };
        assert!(!cache.is_cached(volume.id(), other));
        cache.invalidate();
        assert!(!cache.is_cached(volume.id(), params));
    }

    #[test]
    fn test_cancel_extraction_stops_a_running_extraction() {
        let cache = Arc::new(FeatureCache::new());
        let volume = Arc::new(Volume::<i16>::filled(64, 64, 64, 100));
        let params = FeatureParams::default();
        let worker = {
            let cache = Arc::clone(&cache);
            let volume = Arc::clone(&volume);
            std::thread::spawn(move || cache.get_or_compute(&volume, params).map(|_| ()))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        cache.cancel_extraction();
        let result = worker.join().unwrap();
        // a fast machine may finish before the cancel lands
        if result.is_err() {
            assert!(matches!(result, Err(Error::Cancelled)));
            assert!(!cache.is_cached(volume.id(), params));
        }
        // the next extraction is not poisoned by the old token
        cache.get_or_compute(&volume, params).unwrap();
        assert!(cache.is_cached(volume.id(), params));
    }
}

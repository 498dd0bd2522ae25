//! Window/level lookup and intensity normalisation
//!
//! Watershed and texture extraction either see the volume through the
//! host's display window (mapped to 0..=255) or the raw intensities
//! shifted so that the minimum is zero.

use ndarray::{Array3, ArrayView3};
use voxseg_core::{Volume, VoxelElement, WindowLevel};

/// Map every voxel through the window/level lookup
pub fn apply_window<T: VoxelElement>(data: ArrayView3<'_, T>, window: &WindowLevel) -> Array3<f64> {
    data.mapv(|v| window.lut(v.as_f64()))
}

/// Subtract `origin` from every voxel, as f64
pub fn shift_intensity<T: VoxelElement>(data: ArrayView3<'_, T>, origin: f64) -> Array3<f64> {
    data.mapv(|v| v.as_f64() - origin)
}

/// Windowed intensities when requested and available, else shifted raw
/// intensities.
///
/// `data` may be a sub-view of `volume` (a single slice); the window always
/// comes from the volume. The shift uses the minimum of the whole volume so
/// a slice and the full volume agree on intensities.
pub fn preprocess_intensity<T: VoxelElement>(
    volume: &Volume<T>,
    data: ArrayView3<'_, T>,
    use_window: bool,
) -> Array3<f64> {
    match (use_window, volume.window()) {
        (true, Some(window)) => apply_window(data, &window),
        _ => {
            let min = volume.min_max().map(|(lo, _)| lo.as_f64()).unwrap_or(0.0);
            shift_intensity(data, min)
        }
    }
}

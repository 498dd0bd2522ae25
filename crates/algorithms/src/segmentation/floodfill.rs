//! Texture-guided flood fill
//!
//! Grows a region from every foreground seed through connected voxels
//! whose descriptor lies close to the mean seed descriptor. "Close" is the
//! mean distance of the seeds themselves to that mean, so the threshold
//! adapts to how varied the painted texture is.

use std::collections::VecDeque;

use ndarray::{Array3, ArrayView3};
use voxseg_core::volume::neighbor;
use voxseg_core::{CancelToken, Connectivity3D, Error, Result};

use super::{check_shape, BasinLabel, CANCEL_STRIDE};
use crate::texture::{FeatureVolume, TextureDescriptor, DESCRIPTOR_LEN};

/// Parameters for the texture flood fill
#[derive(Debug, Clone)]
pub struct FloodFillParams {
    /// Neighbour offsets as (dz, dy, dx)
    pub offsets: Vec<(isize, isize, isize)>,
    /// Multiplier applied to the adaptive threshold (default 1.0)
    pub tolerance: f64,
}

impl Default for FloodFillParams {
    fn default() -> Self {
        Self { offsets: Connectivity3D::Six.offsets(), tolerance: 1.0 }
    }
}

/// Outcome of a texture flood fill
#[derive(Debug, Clone)]
pub struct FloodFill {
    /// Voxels reached by the fill, seeds included
    pub included: Array3<bool>,
    /// Mean descriptor of the seeds
    pub mean: TextureDescriptor,
    /// Distance threshold actually applied
    pub threshold: f64,
}

impl FloodFill {
    pub fn count(&self) -> usize {
        self.included.iter().filter(|v| **v).count()
    }
}

/// Grow the foreground-marked region of `markers` through `features`.
///
/// Returns `Error::InvalidParameter` when `markers` has no foreground seed.
pub fn texture_flood_fill(
    features: &FeatureVolume,
    markers: ArrayView3<'_, u8>,
    params: &FloodFillParams,
    cancel: &CancelToken,
) -> Result<FloodFill> {
    let shape = features.shape();
    check_shape(shape, &markers)?;
    let descriptors = features.view();

    let seeds: Vec<(usize, usize, usize)> = markers
        .indexed_iter()
        .filter(|(_, m)| BasinLabel::from_u8(**m) == BasinLabel::Foreground)
        .map(|(voxel, _)| voxel)
        .collect();
    if seeds.is_empty() {
        return Err(Error::InvalidParameter {
            name: "markers",
            value: "0 foreground voxels".to_string(),
            reason: "flood fill needs at least one foreground seed".to_string(),
        });
    }

    let mut mean = [0.0f64; DESCRIPTOR_LEN];
    for &voxel in &seeds {
        for (m, v) in mean.iter_mut().zip(descriptors[voxel].iter()) {
            *m += f64::from(*v);
        }
    }
    for m in mean.iter_mut() {
        *m /= seeds.len() as f64;
    }
    let mean_distance = seeds
        .iter()
        .map(|&voxel| distance(&descriptors[voxel], &mean))
        .sum::<f64>()
        / seeds.len() as f64;
    let threshold = mean_distance * params.tolerance;

    let mut included = Array3::from_elem(shape, false);
    let mut queue = VecDeque::with_capacity(seeds.len());
    for &voxel in &seeds {
        included[voxel] = true;
        queue.push_back(voxel);
    }

    let mut visited = 0usize;
    while let Some(voxel) = queue.pop_front() {
        visited += 1;
        if visited % CANCEL_STRIDE == 0 {
            cancel.check()?;
        }
        for &offset in &params.offsets {
            let Some(next) = neighbor(voxel, offset, shape) else {
                continue;
            };
            if included[next] {
                continue;
            }
            if distance(&descriptors[next], &mean) <= threshold {
                included[next] = true;
                queue.push_back(next);
            }
        }
    }

    cancel.check()?;
    Ok(FloodFill {
        included,
        mean: mean.map(|m| m as f32),
        threshold,
    })
}

fn distance(descriptor: &TextureDescriptor, mean: &[f64; DESCRIPTOR_LEN]) -> f64 {
    descriptor
        .iter()
        .zip(mean.iter())
        .map(|(d, m)| (f64::from(*d) - m).powi(2))
        .sum::<f64>()
        .sqrt()
}

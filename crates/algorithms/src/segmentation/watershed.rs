//! Marker-controlled watershed by priority flooding
//!
//! Markers seed basins; voxels are then claimed in order of increasing
//! relief (ties in push order) by the basin whose flood reaches them first.
//! On a morphological gradient this stops basins at intensity edges.

use std::collections::BinaryHeap;

use ndarray::{Array3, ArrayView3};
use voxseg_core::volume::neighbor;
use voxseg_core::{Algorithm, CancelToken, Connectivity3D, Error, Result};

use super::queue::QueueEntry;
use super::{check_shape, ravel, unravel, CANCEL_STRIDE};

/// Parameters for marker watershed
#[derive(Debug, Clone)]
pub struct WatershedParams {
    /// Neighbour offsets as (dz, dy, dx)
    pub offsets: Vec<(isize, isize, isize)>,
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self { offsets: Connectivity3D::Six.offsets() }
    }
}

/// Marker watershed algorithm
#[derive(Debug, Clone, Default)]
pub struct Watershed;

impl Algorithm for Watershed {
    /// (relief, markers)
    type Input = (Array3<f64>, Array3<u8>);
    type Output = Array3<u8>;
    type Params = WatershedParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MarkerWatershed"
    }

    fn description(&self) -> &'static str {
        "Flood a relief from foreground/background markers"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        marker_watershed(&input.0, input.1.view(), &params.offsets, &CancelToken::new())
    }
}

/// Flood `relief` from `markers`.
///
/// `markers` holds basin labels (1 foreground, 2 background, 0 unmarked).
/// The result uses the same encoding; voxels no flood can reach stay 0.
///
/// # Arguments
/// * `relief` - Landscape to flood, usually a morphological gradient
/// * `markers` - Seed labels with the same shape as `relief`
/// * `offsets` - Connectivity as (dz, dy, dx) neighbour offsets
/// * `cancel` - Checked periodically; cancellation returns `Error::Cancelled`
pub fn marker_watershed(
    relief: &Array3<f64>,
    markers: ArrayView3<'_, u8>,
    offsets: &[(isize, isize, isize)],
    cancel: &CancelToken,
) -> Result<Array3<u8>> {
    let shape = relief.dim();
    check_shape(shape, &markers)?;

    let mut labels = markers.to_owned();
    let mut heap = BinaryHeap::new();
    let mut age: u64 = 0;

    for (voxel, &label) in markers.indexed_iter() {
        if label != 0 {
            heap.push(QueueEntry { priority: relief[voxel], age, index: ravel(voxel, shape) });
            age += 1;
        }
    }

    let mut pops = 0usize;
    while let Some(entry) = heap.pop() {
        pops += 1;
        if pops % CANCEL_STRIDE == 0 {
            cancel.check()?;
        }

        let voxel = unravel(entry.index, shape);
        let label = labels[voxel];
        for &offset in offsets {
            let Some(next) = neighbor(voxel, offset, shape) else {
                continue;
            };
            if labels[next] != 0 {
                continue;
            }
            labels[next] = label;
            heap.push(QueueEntry { priority: relief[next], age, index: ravel(next, shape) });
            age += 1;
        }
    }

    cancel.check()?;
    Ok(labels)
}

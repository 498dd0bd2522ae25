//! Watershed by image foresting transform
//!
//! Each voxel is conquered by the marker with the cheapest path to it,
//! where a path costs its largest arc and an arc costs the absolute
//! intensity step between neighbours. Unlike relief flooding, ties are
//! settled by path cost rather than by the local value at the voxel.

use std::collections::BinaryHeap;

use ndarray::{Array3, ArrayView3};
use voxseg_core::volume::neighbor;
use voxseg_core::{CancelToken, Result};

use super::queue::QueueEntry;
use super::{check_shape, ravel, unravel, BasinLabel, CANCEL_STRIDE};

/// Run the IFT watershed on `intensity` seeded by `markers`.
///
/// Same label encoding as [`marker_watershed`](super::marker_watershed):
/// 1 foreground, 2 background, 0 unreached.
pub fn watershed_ift(
    intensity: &Array3<f64>,
    markers: ArrayView3<'_, u8>,
    offsets: &[(isize, isize, isize)],
    cancel: &CancelToken,
) -> Result<Array3<u8>> {
    let shape = intensity.dim();
    check_shape(shape, &markers)?;

    // Background seeds travel as negative labels.
    let mut labels: Array3<i8> = markers.mapv(|m| match BasinLabel::from_u8(m) {
        BasinLabel::Foreground => 1,
        BasinLabel::Background => -1,
        BasinLabel::Unreached => 0,
    });
    let mut cost = Array3::from_elem(shape, f64::INFINITY);
    let mut done = Array3::from_elem(shape, false);
    let mut heap = BinaryHeap::new();
    let mut age: u64 = 0;

    for (voxel, &label) in labels.indexed_iter() {
        if label != 0 {
            cost[voxel] = 0.0;
            heap.push(QueueEntry { priority: 0.0, age, index: ravel(voxel, shape) });
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
        if done[voxel] {
            continue;
        }
        done[voxel] = true;

        let here = intensity[voxel];
        let path_cost = cost[voxel];
        let label = labels[voxel];
        for &offset in offsets {
            let Some(next) = neighbor(voxel, offset, shape) else {
                continue;
            };
            if done[next] {
                continue;
            }
            let candidate = path_cost.max((intensity[next] - here).abs());
            if candidate < cost[next] {
                cost[next] = candidate;
                labels[next] = label;
                heap.push(QueueEntry { priority: candidate, age, index: ravel(next, shape) });
                age += 1;
            }
        }
    }

    cancel.check()?;
    Ok(labels.mapv(|l| match l {
        1 => BasinLabel::Foreground as u8,
        -1 => BasinLabel::Background as u8,
        _ => BasinLabel::Unreached as u8,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxseg_core::{Connectivity2D, Connectivity3D};

    #[test]
    fn test_ift_splits_at_intensity_step() {
        // dark object on the left, bright background on the right
        let intensity = Array3::from_shape_fn((1, 4, 8), |(_, _, x)| if x < 3 { 10.0 } else { 200.0 });
        let mut markers = Array3::zeros((1, 4, 8));
        markers[(0, 1, 0)] = 1;
        markers[(0, 1, 7)] = 2;
        let labels = watershed_ift(
            &intensity,
            markers.view(),
            &Connectivity2D::Four.offsets(),
            &CancelToken::new(),
        )
        .unwrap();
        for y in 0..4 {
            for x in 0..3 {
                assert_eq!(labels[(0, y, x)], 1);
            }
            for x in 3..8 {
                assert_eq!(labels[(0, y, x)], 2);
            }
        }
    }

    #[test]
    fn test_ift_prefers_cheaper_path_over_distance() {
        // Foreground seed far away along a smooth ramp, background seed
        // close but behind a sharp step.
        let mut intensity = Array3::from_shape_fn((1, 1, 7), |(_, _, x)| x as f64);
        intensity[(0, 0, 6)] = 100.0;
        let mut markers = Array3::zeros((1, 1, 7));
        markers[(0, 0, 0)] = 1;
        markers[(0, 0, 6)] = 2;
        let labels = watershed_ift(
            &intensity,
            markers.view(),
            &Connectivity2D::Four.offsets(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(labels[(0, 0, 5)], 1);
        assert_eq!(labels[(0, 0, 6)], 2);
    }

    #[test]
    fn test_disconnected_voxels_stay_unreached() {
        let intensity = Array3::zeros((1, 1, 3));
        let mut markers = Array3::zeros((1, 1, 3));
        markers[(0, 0, 0)] = 1;
        // no offsets: nothing propagates
        let labels = watershed_ift(&intensity, markers.view(), &[], &CancelToken::new()).unwrap();
        assert_eq!(labels.as_slice().unwrap(), &[1, 0, 0]);
        let labels = watershed_ift(
            &intensity,
            markers.view(),
            &Connectivity3D::Six.offsets(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(labels.as_slice().unwrap(), &[1, 1, 1]);
    }
}

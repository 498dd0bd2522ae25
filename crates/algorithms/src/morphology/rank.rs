//! Shared min/max filter loop for erosion and dilation

use ndarray::Array3;
use voxseg_core::{Error, Result};

use super::element::StructuringElement;
use crate::maybe_rayon::*;

#[derive(Debug, Clone, Copy)]
pub(super) enum Extremum {
    Min,
    Max,
}

/// Replace every voxel with the extremum over the element.
///
/// Element cells falling outside the volume are skipped, so borders see a
/// truncated neighbourhood instead of a padded one.
pub(super) fn extremum_filter(
    input: &Array3<f64>,
    element: &StructuringElement,
    extremum: Extremum,
) -> Result<Array3<f64>> {
    element.validate()?;

    let (depth, height, width) = input.dim();
    let offsets = element.offsets();

    let data: Vec<f64> = (0..depth * height)
        .into_par_iter()
        .flat_map(|zy| {
            let (z, y) = ((zy / height) as isize, (zy % height) as isize);
            let mut row = vec![0.0; width];
            for (x, out) in row.iter_mut().enumerate() {
                let x = x as isize;
                let mut acc = match extremum {
                    Extremum::Min => f64::INFINITY,
                    Extremum::Max => f64::NEG_INFINITY,
                };
                for &(dz, dy, dx) in &offsets {
                    let (nz, ny, nx) = (z + dz, y + dy, x + dx);
                    if nz < 0
                        || ny < 0
                        || nx < 0
                        || nz >= depth as isize
                        || ny >= height as isize
                        || nx >= width as isize
                    {
                        continue;
                    }
                    let v = input[(nz as usize, ny as usize, nx as usize)];
                    acc = match extremum {
                        Extremum::Min => acc.min(v),
                        Extremum::Max => acc.max(v),
                    };
                }
                *out = acc;
            }
            row
        })
        .collect();

    Array3::from_shape_vec((depth, height, width), data).map_err(|e| Error::Other(e.to_string()))
}

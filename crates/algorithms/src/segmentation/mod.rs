//! Marker-driven segmentation kernels
//!
//! - **Watershed**: priority flooding of a relief from labelled markers
//! - **Watershed-IFT**: image foresting transform with max-arc path cost
//! - **Texture flood fill**: region growing on descriptor similarity
//! - **Components**: connected-component labelling of binary volumes

mod components;
mod floodfill;
mod ift;
mod queue;
mod watershed;

pub use components::{label_components, Components};
pub use floodfill::{texture_flood_fill, FloodFill, FloodFillParams};
pub use ift::watershed_ift;
pub use watershed::{marker_watershed, Watershed, WatershedParams};

use ndarray::ArrayView3;
use voxseg_core::{Error, Result};

/// Per-voxel result of a marker segmentation, also the marker value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasinLabel {
    /// No marker reached the voxel (or, as a marker, nothing painted)
    Unreached = 0,
    /// Basin flooded from a foreground marker
    Foreground = 1,
    /// Basin flooded from a background marker
    Background = 2,
}

impl BasinLabel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => BasinLabel::Foreground,
            2 => BasinLabel::Background,
            _ => BasinLabel::Unreached,
        }
    }
}

/// Check that `markers` matches `shape`
pub(crate) fn check_shape(
    shape: (usize, usize, usize),
    markers: &ArrayView3<'_, u8>,
) -> Result<()> {
    if markers.dim() != shape {
        return Err(Error::SizeMismatch { expected: shape, actual: markers.dim() });
    }
    Ok(())
}

/// Flat index helpers shared by the flooding kernels
#[inline]
pub(crate) fn unravel(index: usize, shape: (usize, usize, usize)) -> (usize, usize, usize) {
    let plane = shape.1 * shape.2;
    (index / plane, (index % plane) / shape.2, index % shape.2)
}

#[inline]
pub(crate) fn ravel(voxel: (usize, usize, usize), shape: (usize, usize, usize)) -> usize {
    (voxel.0 * shape.1 + voxel.1) * shape.2 + voxel.2
}

/// Number of heap pops between cancellation checks
pub(crate) const CANCEL_STRIDE: usize = 1 << 15;

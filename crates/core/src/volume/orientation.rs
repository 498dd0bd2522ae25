//! Slice orientations and plane/volume coordinate mapping

use ndarray::Axis;
use serde::{Deserialize, Serialize};

/// The three orthogonal slice planes of a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Slices along z; plane rows are y, plane columns are x
    Axial,
    /// Slices along y; plane rows are z, plane columns are x
    Coronal,
    /// Slices along x; plane rows are z, plane columns are y
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [Orientation::Axial, Orientation::Coronal, Orientation::Sagittal];

    /// Volume axis the slice index runs along
    pub fn axis(self) -> Axis {
        match self {
            Orientation::Axial => Axis(0),
            Orientation::Coronal => Axis(1),
            Orientation::Sagittal => Axis(2),
        }
    }

    /// Number of slices for a volume of shape (z, y, x)
    pub fn slice_count(self, shape: (usize, usize, usize)) -> usize {
        match self {
            Orientation::Axial => shape.0,
            Orientation::Coronal => shape.1,
            Orientation::Sagittal => shape.2,
        }
    }

    /// Plane shape (rows, cols) for a volume of shape (z, y, x)
    pub fn plane_shape(self, shape: (usize, usize, usize)) -> (usize, usize) {
        let (z, y, x) = shape;
        match self {
            Orientation::Axial => (y, x),
            Orientation::Coronal => (z, x),
            Orientation::Sagittal => (z, y),
        }
    }

    /// Map a slice index and in-plane (row, col) to volume (z, y, x)
    pub fn to_volume(self, index: usize, row: usize, col: usize) -> (usize, usize, usize) {
        match self {
            Orientation::Axial => (index, row, col),
            Orientation::Coronal => (row, index, col),
            Orientation::Sagittal => (row, col, index),
        }
    }

    /// Split a volume (z, y, x) into slice index and in-plane (row, col)
    pub fn to_plane(self, voxel: (usize, usize, usize)) -> (usize, usize, usize) {
        let (z, y, x) = voxel;
        match self {
            Orientation::Axial => (z, y, x),
            Orientation::Coronal => (y, z, x),
            Orientation::Sagittal => (x, z, y),
        }
    }
}

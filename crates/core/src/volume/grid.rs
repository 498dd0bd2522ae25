//! Main Volume type

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::volume::{Orientation, VoxelElement, WindowLevel};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3};
use serde::{Deserialize, Serialize};

static NEXT_VOLUME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a volume's voxel content.
///
/// A fresh id is drawn whenever a volume is built or its data is borrowed
/// mutably, so two volumes share an id only if one is an untouched clone
/// of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(u64);

impl VolumeId {
    fn next() -> Self {
        VolumeId(NEXT_VOLUME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for logging
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Physical voxel spacing (millimetres in scanner data)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Spacing {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0, z: 1.0 }
    }
}

/// A 3D scalar volume in (z, y, x) order.
///
/// `Volume<T>` stores intensities of type `T` together with physical
/// spacing and the display window the host shows it with.
///
/// # Example
///
/// ```ignore
/// use voxseg_core::Volume;
///
/// let mut volume: Volume<i16> = Volume::new(64, 128, 128);
/// volume.set(10, 20, 30, 400)?;
/// let value = volume.get(10, 20, 30)?;
/// ```
#[derive(Debug, Clone)]
pub struct Volume<T: VoxelElement> {
    data: Array3<T>,
    spacing: Spacing,
    window: Option<WindowLevel>,
    id: VolumeId,
}

impl<T: VoxelElement> Volume<T> {
    /// Create a new volume filled with zeros
    pub fn new(depth: usize, height: usize, width: usize) -> Self {
        Self::from_array(Array3::zeros((depth, height, width)))
    }

    /// Create a new volume filled with a specific value
    pub fn filled(depth: usize, height: usize, width: usize, value: T) -> Self {
        Self::from_array(Array3::from_elem((depth, height, width), value))
    }

    /// Create a volume from a flat vector in (z, y, x) order
    pub fn from_vec(data: Vec<T>, depth: usize, height: usize, width: usize) -> Result<Self> {
        if data.len() != depth * height * width {
            return Err(Error::InvalidDimensions { depth, height, width });
        }

        let array = Array3::from_shape_vec((depth, height, width), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a volume from an ndarray
    pub fn from_array(data: Array3<T>) -> Self {
        Self {
            data,
            spacing: Spacing::default(),
            window: None,
            id: VolumeId::next(),
        }
    }

    /// Create a volume with the same spacing and window but different data
    pub fn with_same_meta<U: VoxelElement>(&self, data: Array3<U>) -> Volume<U> {
        Volume {
            data,
            spacing: self.spacing,
            window: self.window,
            id: VolumeId::next(),
        }
    }

    // Dimensions

    /// Number of slices along z
    pub fn depth(&self) -> usize {
        self.data.dim().0
    }

    /// Number of rows along y
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    /// Number of columns along x
    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    /// Dimensions as (z, y, x)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Total number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the volume is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (z, y, x)
    pub fn get(&self, z: usize, y: usize, x: usize) -> Result<T> {
        self.data
            .get((z, y, x))
            .copied()
            .ok_or(Error::IndexOutOfBounds { z, y, x, shape: self.shape() })
    }

    /// Set value at (z, y, x)
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: T) -> Result<()> {
        let shape = self.shape();
        match self.data.get_mut((z, y, x)) {
            Some(cell) => {
                *cell = value;
                self.id = VolumeId::next();
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds { z, y, x, shape }),
        }
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// Get a mutable view of the underlying data. Changes the volume id.
    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, T> {
        self.id = VolumeId::next();
        self.data.view_mut()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array. Changes the volume id.
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        self.id = VolumeId::next();
        &mut self.data
    }

    /// Consume the volume and return the underlying array
    pub fn into_array(self) -> Array3<T> {
        self.data
    }

    /// View one 2D slice of the volume
    pub fn slice(&self, orientation: Orientation, index: usize) -> Result<ArrayView2<'_, T>> {
        let extent = orientation.slice_count(self.shape());
        if index >= extent {
            return Err(Error::InvalidParameter {
                name: "slice_index",
                value: index.to_string(),
                reason: format!("{orientation:?} has {extent} slices"),
            });
        }
        Ok(self.data.index_axis(orientation.axis(), index))
    }

    /// Copy of the volume as f64, the working type of every filter
    pub fn to_f64(&self) -> Array3<f64> {
        self.data.mapv(|v| v.as_f64())
    }

    /// Copy of one slice as f64
    pub fn slice_f64(&self, orientation: Orientation, index: usize) -> Result<Array2<f64>> {
        Ok(self.slice(orientation, index)?.mapv(|v| v.as_f64()))
    }

    // Metadata

    /// Content identity, see [`VolumeId`]
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Get the voxel spacing
    pub fn spacing(&self) -> Spacing {
        self.spacing
    }

    /// Set the voxel spacing
    pub fn set_spacing(&mut self, spacing: Spacing) {
        self.spacing = spacing;
    }

    /// Display window/level, if the host has one
    pub fn window(&self) -> Option<WindowLevel> {
        self.window
    }

    /// Set the display window/level
    pub fn set_window(&mut self, window: Option<WindowLevel>) {
        self.window = window;
    }

    /// Minimum and maximum intensity, or `None` for an empty volume
    pub fn min_max(&self) -> Option<(T, T)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| {
            (if v < lo { v } else { lo }, if v > hi { v } else { hi })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_creation() {
        let volume: Volume<i16> = Volume::new(4, 5, 6);
        assert_eq!(volume.shape(), (4, 5, 6));
        assert_eq!(volume.depth(), 4);
        assert_eq!(volume.height(), 5);
        assert_eq!(volume.width(), 6);
        assert_eq!(volume.len(), 120);
    }

    #[test]
    fn test_volume_access() {
        let mut volume: Volume<f32> = Volume::new(3, 3, 3);
        volume.set(1, 2, 0, 42.0).unwrap();
        assert_eq!(volume.get(1, 2, 0).unwrap(), 42.0);
        assert!(volume.get(3, 0, 0).is_err());
        assert!(volume.set(0, 0, 3, 1.0).is_err());
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Volume::<u8>::from_vec(vec![0; 7], 2, 2, 2).is_err());
        assert!(Volume::<u8>::from_vec(vec![0; 8], 2, 2, 2).is_ok());
    }

    #[test]
    fn test_identity_changes_on_mutation() {
        let mut volume: Volume<i16> = Volume::new(2, 2, 2);
        let before = volume.id();
        let clone = volume.clone();
        assert_eq!(clone.id(), before);

        let _ = volume.view();
        assert_eq!(volume.id(), before);

        volume.data_mut()[(0, 0, 0)] = 5;
        assert_ne!(volume.id(), before);
        assert_ne!(Volume::<i16>::new(2, 2, 2).id(), clone.id());
    }

    #[test]
    fn test_slice_orientations() {
        let mut volume: Volume<u8> = Volume::new(2, 3, 4);
        volume.set(1, 2, 3, 9).unwrap();
        assert_eq!(volume.slice(Orientation::Axial, 1).unwrap()[(2, 3)], 9);
        assert_eq!(volume.slice(Orientation::Coronal, 2).unwrap()[(1, 3)], 9);
        assert_eq!(volume.slice(Orientation::Sagittal, 3).unwrap()[(1, 2)], 9);
        assert!(volume.slice(Orientation::Axial, 2).is_err());
    }

    #[test]
    fn test_min_max() {
        let volume = Volume::from_vec(vec![3i16, -7, 12, 0], 1, 2, 2).unwrap();
        assert_eq!(volume.min_max(), Some((-7, 12)));
        assert_eq!(Volume::<i16>::new(0, 0, 0).min_max(), None);
    }
}

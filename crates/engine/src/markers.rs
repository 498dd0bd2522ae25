//! Marker buffer: sparse user marks paired 1:1 with the intensity volume
//!
//! Small buffers live in memory. Buffers above the configured resident
//! limit spill to an anonymous temporary file mapped with `memmap2`, so a
//! large scan does not need its marker array in RAM.

use std::path::Path;
use std::sync::Arc;

use memmap2::MmapMut;
use ndarray::{Array3, ArrayView3, ArrayViewMut2, ArrayViewMut3};
use serde::{Deserialize, Serialize};
use tracing::debug;
use voxseg_core::{Error, Orientation, Result};

/// Label painted into the marker buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MarkerLabel {
    Erase = 0,
    Foreground = 1,
    Background = 2,
}

impl MarkerLabel {
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MarkerLabel::Erase),
            1 => Some(MarkerLabel::Foreground),
            2 => Some(MarkerLabel::Background),
            _ => None,
        }
    }
}

/// Per-label voxel counts of a marker array
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerCounts {
    pub unmarked: usize,
    pub foreground: usize,
    pub background: usize,
}

impl MarkerCounts {
    pub fn of(markers: ArrayView3<'_, u8>) -> Self {
        let mut counts = MarkerCounts::default();
        for &m in markers.iter() {
            match MarkerLabel::from_u8(m) {
                Some(MarkerLabel::Foreground) => counts.foreground += 1,
                Some(MarkerLabel::Background) => counts.background += 1,
                _ => counts.unmarked += 1,
            }
        }
        counts
    }

    /// Both foreground and background present
    pub fn has_both(&self) -> bool {
        self.foreground > 0 && self.background > 0
    }
}

enum Storage {
    Resident(Vec<u8>),
    Mapped(MmapMut),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Resident(data) => data,
            Storage::Mapped(map) => map,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Storage::Resident(data) => data,
            Storage::Mapped(map) => map,
        }
    }
}

/// 3D marker labels in (z, y, x) order
pub struct MarkerBuffer {
    shape: (usize, usize, usize),
    storage: Storage,
}

impl std::fmt::Debug for MarkerBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerBuffer")
            .field("shape", &self.shape)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl MarkerBuffer {
    /// Allocate a zeroed buffer.
    ///
    /// Buffers of at most `resident_limit` bytes are kept in memory; larger
    /// ones are backed by a temporary file in `spill_dir` (or the system
    /// temp directory). Every failure is reported as `Error::Storage`.
    pub fn allocate(
        shape: (usize, usize, usize),
        resident_limit: usize,
        spill_dir: Option<&Path>,
    ) -> Result<Self> {
        let len = shape
            .0
            .checked_mul(shape.1)
            .and_then(|n| n.checked_mul(shape.2))
            .ok_or_else(|| Error::Storage(format!("marker buffer of shape {shape:?} overflows usize")))?;

        let storage = if len <= resident_limit {
            let mut data = Vec::new();
            data.try_reserve_exact(len)
                .map_err(|e| Error::Storage(format!("cannot reserve {len} bytes: {e}")))?;
            data.resize(len, 0);
            Storage::Resident(data)
        } else {
            Storage::Mapped(map_temp_file(len, spill_dir)?)
        };

        debug!(?shape, bytes = len, mapped = matches!(storage, Storage::Mapped(_)), "marker buffer allocated");
        Ok(Self { shape, storage })
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer is backed by a mapped temporary file
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    pub fn view(&self) -> Result<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(self.shape, self.storage.as_slice()).map_err(|e| Error::Other(e.to_string()))
    }

    pub fn view_mut(&mut self) -> Result<ArrayViewMut3<'_, u8>> {
        ArrayViewMut3::from_shape(self.shape, self.storage.as_mut_slice())
            .map_err(|e| Error::Other(e.to_string()))
    }

    /// Mutable 2D view of one slice, `None` when `index` is outside the volume
    pub fn slice_mut(&mut self, orientation: Orientation, index: usize) -> Result<Option<ArrayViewMut2<'_, u8>>> {
        if index >= orientation.slice_count(self.shape) {
            return Ok(None);
        }
        Ok(Some(self.view_mut()?.index_axis_move(orientation.axis(), index)))
    }

    pub fn get(&self, z: usize, y: usize, x: usize) -> Option<MarkerLabel> {
        let (d, h, w) = self.shape;
        if z >= d || y >= h || x >= w {
            return None;
        }
        MarkerLabel::from_u8(self.storage.as_slice()[(z * h + y) * w + x])
    }

    /// Frozen copy handed to a segmentation run
    pub fn snapshot(&self) -> Result<Arc<Array3<u8>>> {
        Array3::from_shape_vec(self.shape, self.storage.as_slice().to_vec())
            .map(Arc::new)
            .map_err(|e| Error::Other(e.to_string()))
    }

    pub fn counts(&self) -> Result<MarkerCounts> {
        Ok(MarkerCounts::of(self.view()?))
    }

    /// Reset every voxel to `Erase`
    pub fn clear(&mut self) {
        self.storage.as_mut_slice().fill(MarkerLabel::Erase.value());
    }
}

fn map_temp_file(len: usize, spill_dir: Option<&Path>) -> Result<MmapMut> {
    let storage_err = |e: std::io::Error| Error::Storage(format!("marker spill file: {e}"));
    let file = match spill_dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    }
    .map_err(storage_err)?;
    file.set_len(len as u64).map_err(storage_err)?;
    // SAFETY: the file is anonymous (already unlinked) and owned solely by
    // this mapping, so nothing else can truncate or write it underneath us.
    unsafe { MmapMut::map_mut(&file) }.map_err(storage_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resident_buffer_starts_erased() {
        let buffer = MarkerBuffer::allocate((2, 3, 4), usize::MAX, None).unwrap();
        assert!(!buffer.is_mapped());
        assert_eq!(buffer.len(), 24);
        assert_eq!(buffer.get(1, 2, 3), Some(MarkerLabel::Erase));
        assert_eq!(buffer.get(2, 0, 0), None);
        assert_eq!(buffer.counts().unwrap().unmarked, 24);
    }

    #[test]
    fn test_mapped_buffer_behaves_like_resident() {
        let mut buffer = MarkerBuffer::allocate((3, 4, 5), 0, None).unwrap();
        assert!(buffer.is_mapped());
        {
            let mut slice = buffer.slice_mut(Orientation::Coronal, 2).unwrap().unwrap();
            slice[(1, 4)] = MarkerLabel::Foreground.value();
        }
        assert_eq!(buffer.get(1, 2, 4), Some(MarkerLabel::Foreground));
        let snapshot = buffer.snapshot().unwrap();
        assert_eq!(snapshot[(1, 2, 4)], 1);
        buffer.clear();
        assert_eq!(buffer.get(1, 2, 4), Some(MarkerLabel::Erase));
        assert_eq!(snapshot[(1, 2, 4)], 1);
    }

    #[test]
    fn test_slice_out_of_range_is_none() {
        let mut buffer = MarkerBuffer::allocate((2, 2, 2), usize::MAX, None).unwrap();
        assert!(buffer.slice_mut(Orientation::Axial, 2).unwrap().is_none());
    }

    #[test]
    fn test_missing_spill_dir_is_storage_error() {
        let err = MarkerBuffer::allocate((4, 4, 4), 0, Some(Path::new("/nonexistent/voxseg-spill"))).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_overflowing_shape_is_storage_error() {
        let err = MarkerBuffer::allocate((usize::MAX, 2, 2), 0, None).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_counts() {
        let mut markers = Array3::zeros((1, 2, 2));
        markers[(0, 0, 0)] = 1;
        markers[(0, 1, 1)] = 2;
        markers[(0, 1, 0)] = 2;
        let counts = MarkerCounts::of(markers.view());
        assert_eq!(counts, MarkerCounts { unmarked: 1, foreground: 1, background: 2 });
        assert!(counts.has_both());
    }
}

//! Brush footprints and stroke rasterization onto marker slices

use ndarray::{Array2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use voxseg_core::{Error, Orientation, Result};

use crate::markers::{MarkerBuffer, MarkerLabel};

/// Footprint outline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrushShape {
    #[default]
    Circle,
    Square,
}

/// Base brush operation chosen in the host's toolbar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrushOperation {
    #[default]
    Foreground,
    Background,
    Erase,
}

/// Modifier keys held during a stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrushModifiers {
    /// Swap foreground and background
    pub alternate: bool,
    /// Erase regardless of the base operation
    pub erase: bool,
}

/// Pick the label a stroke paints. `erase` wins over `alternate`.
pub fn resolve_label(base: BrushOperation, modifiers: BrushModifiers) -> MarkerLabel {
    if modifiers.erase {
        return MarkerLabel::Erase;
    }
    match (base, modifiers.alternate) {
        (BrushOperation::Foreground, false) | (BrushOperation::Background, true) => MarkerLabel::Foreground,
        (BrushOperation::Background, false) | (BrushOperation::Foreground, true) => MarkerLabel::Background,
        (BrushOperation::Erase, _) => MarkerLabel::Erase,
    }
}

/// Boolean brush bitmap with odd dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    mask: Array2<bool>,
}

impl Footprint {
    /// Build a `shape` footprint `size` cells across.
    ///
    /// Even sizes are rounded up to the next odd size so the footprint has
    /// a centre cell.
    pub fn new(shape: BrushShape, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidParameter {
                name: "brush_size",
                value: "0".to_string(),
                reason: "brush must be at least one cell across".to_string(),
            });
        }
        let side = size | 1;
        let r = (side / 2) as isize;
        let mask = Array2::from_shape_fn((side, side), |(row, col)| match shape {
            BrushShape::Square => true,
            BrushShape::Circle => {
                let (dr, dc) = (row as isize - r, col as isize - r);
                dr * dr + dc * dc <= r * r
            }
        });
        Ok(Self { mask })
    }

    /// Wrap an arbitrary bitmap; both dimensions must be odd.
    pub fn from_mask(mask: Array2<bool>) -> Result<Self> {
        let (rows, cols) = mask.dim();
        if rows % 2 == 0 || cols % 2 == 0 {
            return Err(Error::InvalidParameter {
                name: "footprint",
                value: format!("{rows}x{cols}"),
                reason: "footprint dimensions must be odd".to_string(),
            });
        }
        Ok(Self { mask })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    pub fn active_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }
}

/// Stamp `footprint` centred at `center` (row, col) into `slice`.
///
/// The footprint rectangle is clipped against the slice; cells falling
/// outside are dropped. Returns the number of cells written, 0 when the
/// clipped rectangle is empty.
pub fn stamp(slice: &mut ArrayViewMut2<'_, u8>, footprint: &Footprint, center: (isize, isize), label: MarkerLabel) -> usize {
    let (rows, cols) = slice.dim();
    let (fh, fw) = footprint.dim();
    let top = center.0 - (fh / 2) as isize;
    let left = center.1 - (fw / 2) as isize;

    let r0 = top.max(0);
    let r1 = (top + fh as isize).min(rows as isize);
    let c0 = left.max(0);
    let c1 = (left + fw as isize).min(cols as isize);
    if r0 >= r1 || c0 >= c1 {
        return 0;
    }

    let value = label.value();
    let mut written = 0;
    for row in r0..r1 {
        for col in c0..c1 {
            if footprint.mask[((row - top) as usize, (col - left) as usize)] {
                slice[(row as usize, col as usize)] = value;
                written += 1;
            }
        }
    }
    written
}

/// Rasterize one brush dab onto slice `index` of `orientation`.
///
/// A slice index outside the volume is a no-op.
pub fn apply_stroke(
    markers: &mut MarkerBuffer,
    footprint: &Footprint,
    center: (isize, isize),
    orientation: Orientation,
    index: usize,
    label: MarkerLabel,
) -> Result<usize> {
    match markers.slice_mut(orientation, index)? {
        Some(mut slice) => Ok(stamp(&mut slice, footprint, center, label)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_label_precedence() {
        let none = BrushModifiers::default();
        let alt = BrushModifiers { alternate: true, erase: false };
        let erase = BrushModifiers { alternate: true, erase: true };
        assert_eq!(resolve_label(BrushOperation::Foreground, none), MarkerLabel::Foreground);
        assert_eq!(resolve_label(BrushOperation::Foreground, alt), MarkerLabel::Background);
        assert_eq!(resolve_label(BrushOperation::Background, alt), MarkerLabel::Foreground);
        assert_eq!(resolve_label(BrushOperation::Background, erase), MarkerLabel::Erase);
        assert_eq!(resolve_label(BrushOperation::Erase, alt), MarkerLabel::Erase);
    }

    #[test]
    fn test_footprint_shapes() {
        let circle = Footprint::new(BrushShape::Circle, 5).unwrap();
        assert_eq!(circle.dim(), (5, 5));
        assert!(!circle.mask()[(0, 0)]);
        assert!(circle.mask()[(0, 2)]);
        assert_eq!(circle.active_count(), 13);
        let square = Footprint::new(BrushShape::Square, 4).unwrap();
        assert_eq!(square.dim(), (5, 5));
        assert_eq!(square.active_count(), 25);
        assert!(Footprint::new(BrushShape::Circle, 0).is_err());
        assert!(Footprint::from_mask(Array2::from_elem((2, 3), true)).is_err());
    }

    #[test]
    fn test_stamp_clips_at_corner() {
        let mut slice = Array2::<u8>::zeros((6, 6));
        let footprint = Footprint::new(BrushShape::Square, 3).unwrap();
        let written = stamp(&mut slice.view_mut(), &footprint, (0, 0), MarkerLabel::Foreground);
        assert_eq!(written, 4);
        assert_eq!(slice.iter().filter(|v| **v == 1).count(), 4);
        assert_eq!(slice[(1, 1)], 1);
        assert_eq!(slice[(2, 2)], 0);
    }

    #[test]
    fn test_stamp_far_outside_is_noop() {
        let mut slice = Array2::<u8>::zeros((4, 4));
        let footprint = Footprint::new(BrushShape::Circle, 3).unwrap();
        assert_eq!(stamp(&mut slice.view_mut(), &footprint, (-5, 2), MarkerLabel::Foreground), 0);
        assert_eq!(stamp(&mut slice.view_mut(), &footprint, (2, 40), MarkerLabel::Foreground), 0);
        assert!(slice.iter().all(|v| *v == 0));
    }

    #[test]
    fn test_stamp_never_writes_outside_slice() {
        // Embed the slice in a larger guard frame and stamp through a view
        let footprint = Footprint::new(BrushShape::Circle, 7).unwrap();
        for cy in -6isize..=12 {
            for cx in -6isize..=12 {
                let mut frame = Array2::<u8>::zeros((14, 14));
                {
                    let mut inner = frame.slice_mut(ndarray::s![3..10, 3..11]);
                    stamp(&mut inner, &footprint, (cy, cx), MarkerLabel::Background);
                }
                for ((r, c), v) in frame.indexed_iter() {
                    let inside = (3..10).contains(&r) && (3..11).contains(&c);
                    assert!(inside || *v == 0, "write leaked to ({r}, {c}) for centre ({cy}, {cx})");
                }
            }
        }
    }

    #[test]
    fn test_apply_stroke_targets_orientation() {
        let mut markers = MarkerBuffer::allocate((4, 5, 6), usize::MAX, None).unwrap();
        let footprint = Footprint::new(BrushShape::Square, 1).unwrap();
        apply_stroke(&mut markers, &footprint, (3, 4), Orientation::Sagittal, 2, MarkerLabel::Background).unwrap();
        assert_eq!(markers.get(3, 4, 2), Some(MarkerLabel::Background));
        assert_eq!(apply_stroke(&mut markers, &footprint, (0, 0), Orientation::Axial, 9, MarkerLabel::Foreground).unwrap(), 0);
    }
}

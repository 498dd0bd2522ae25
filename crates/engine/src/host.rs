//! Stroke events and the host's screen-to-voxel mapping

use voxseg_core::Orientation;

use crate::brush::BrushModifiers;

/// Slice position of one brush dab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokePoint {
    pub orientation: Orientation,
    /// Slice index along the orientation's axis
    pub slice: usize,
    /// In-plane (row, col); may lie outside the slice
    pub center: (isize, isize),
}

/// Maps viewer coordinates onto the active slice plane
pub trait ScreenToVoxel {
    fn orientation(&self) -> Orientation;

    fn slice_index(&self) -> usize;

    /// Plane (row, col) under the screen position `(x, y)`
    fn to_plane(&self, screen: (f64, f64)) -> (isize, isize);
}

/// Phase of a stroke event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokePhase {
    Start,
    Move,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeEvent {
    Start { point: StrokePoint, modifiers: BrushModifiers },
    Move { point: StrokePoint, modifiers: BrushModifiers },
    End,
}

impl StrokeEvent {
    /// Build an event from a screen position through the host's mapper
    pub fn from_screen(
        phase: StrokePhase,
        mapper: &dyn ScreenToVoxel,
        screen: (f64, f64),
        modifiers: BrushModifiers,
    ) -> Self {
        let point = StrokePoint {
            orientation: mapper.orientation(),
            slice: mapper.slice_index(),
            center: mapper.to_plane(screen),
        };
        match phase {
            StrokePhase::Start => StrokeEvent::Start { point, modifiers },
            StrokePhase::Move => StrokeEvent::Move { point, modifiers },
            StrokePhase::End => StrokeEvent::End,
        }
    }
}

/// Screen mapping for a slice view with a uniform zoom and pan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomedSliceView {
    pub orientation: Orientation,
    pub slice: usize,
    /// Screen pixels per voxel
    pub zoom: f64,
    /// Screen position of voxel (0, 0)
    pub origin: (f64, f64),
}

impl ScreenToVoxel for ZoomedSliceView {
    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn slice_index(&self) -> usize {
        self.slice
    }

    fn to_plane(&self, screen: (f64, f64)) -> (isize, isize) {
        let col = ((screen.0 - self.origin.0) / self.zoom).floor() as isize;
        let row = ((screen.1 - self.origin.1) / self.zoom).floor() as isize;
        (row, col)
    }
}

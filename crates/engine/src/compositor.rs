//! Mask compositor: merges strategy output into the host's padded mask
//!
//! The mask carries a one-voxel border at index 0 of every axis; volume
//! voxel (z, y, x) lives at mask cell (z + 1, y + 1, x + 1). Every commit
//! forces the border to the boundary sentinel, invalidates the render
//! caches of all three orientations, marks the mask edited, clears the
//! undo history and fires the mask-changed callback.

use std::time::Instant;

use ndarray::{s, Array3, ArrayView3, ArrayViewMut3, Axis, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use voxseg_algorithms::segmentation::{label_components, BasinLabel};
use voxseg_core::{Connectivity3D, Error, Orientation, Result};

use crate::strategy::{LabelField, SegmentScope, StrategyOutput};

/// Reserved mask values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskSentinels {
    pub background: u8,
    pub ambiguous: u8,
    pub foreground: u8,
    /// Written into the padding border
    pub boundary: u8,
    /// Values an additive merge may replace, lowest precedence first
    pub overwritable: Vec<u8>,
}

impl Default for MaskSentinels {
    fn default() -> Self {
        Self { background: 0, ambiguous: 2, foreground: 253, boundary: 1, overwritable: vec![0, 2, 253] }
    }
}

impl MaskSentinels {
    /// Position of `value` in the additive precedence order
    fn rank(&self, value: u8) -> Option<usize> {
        self.overwritable.iter().position(|v| *v == value)
    }

    /// Whether an additive merge may replace `current` with `proposed`
    fn may_replace(&self, current: u8, proposed: u8) -> bool {
        match (self.rank(current), self.rank(proposed)) {
            (Some(c), Some(p)) => p >= c,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Conflict policy for a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
    /// Clear the region to background, then write foreground
    #[default]
    Overwrite,
    /// Only raise voxels holding an overwritable value
    Additive,
}

/// Saved region of the mask, in padded coordinates
#[derive(Debug, Clone)]
pub struct UndoSnapshot {
    origin: (usize, usize, usize),
    data: Array3<u8>,
}

/// Per-voxel undo stack kept alongside the mask
#[derive(Debug, Clone, Default)]
pub struct UndoHistory {
    snapshots: Vec<UndoSnapshot>,
}

impl UndoHistory {
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Host label volume with its padding border
#[derive(Debug, Clone)]
pub struct PaddedMask {
    data: Array3<u8>,
    edited: bool,
    history: UndoHistory,
}

impl PaddedMask {
    /// All-background mask for a volume of `shape`
    pub fn new(shape: (usize, usize, usize)) -> Self {
        Self {
            data: Array3::zeros((shape.0 + 1, shape.1 + 1, shape.2 + 1)),
            edited: false,
            history: UndoHistory::default(),
        }
    }

    /// Wrap an existing padded array; every axis needs room for the border.
    pub fn from_padded(data: Array3<u8>) -> Result<Self> {
        let (d, h, w) = data.dim();
        if d == 0 || h == 0 || w == 0 {
            return Err(Error::InvalidDimensions { depth: d, height: h, width: w });
        }
        Ok(Self { data, edited: false, history: UndoHistory::default() })
    }

    /// Shape of the volume the mask covers (padding excluded)
    pub fn volume_shape(&self) -> (usize, usize, usize) {
        let (d, h, w) = self.data.dim();
        (d - 1, h - 1, w - 1)
    }

    pub fn padded(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn interior(&self) -> ArrayView3<'_, u8> {
        self.data.slice(s![1.., 1.., 1..])
    }

    fn interior_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.data.slice_mut(s![1.., 1.., 1..])
    }

    /// Value at volume coordinates
    pub fn get(&self, z: usize, y: usize, x: usize) -> Option<u8> {
        self.data.get((z + 1, y + 1, x + 1)).copied()
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    pub fn history(&self) -> &UndoHistory {
        &self.history
    }

    /// Host-side manual edit of one voxel, recorded for undo.
    ///
    /// Out-of-volume coordinates are rejected; the border is not editable.
    pub fn paint(&mut self, z: usize, y: usize, x: usize, value: u8) -> Result<()> {
        let shape = self.volume_shape();
        if z >= shape.0 || y >= shape.1 || x >= shape.2 {
            return Err(Error::IndexOutOfBounds { z, y, x, shape });
        }
        let cell = (z + 1, y + 1, x + 1);
        self.history.snapshots.push(UndoSnapshot {
            origin: cell,
            data: Array3::from_elem((1, 1, 1), self.data[cell]),
        });
        self.data[cell] = value;
        self.edited = true;
        Ok(())
    }

    /// Restore the most recent snapshot; false when there is none
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.history.snapshots.pop() else {
            return false;
        };
        let (z, y, x) = snapshot.origin;
        let (d, h, w) = snapshot.data.dim();
        self.data.slice_mut(s![z..z + d, y..y + h, x..x + w]).assign(&snapshot.data);
        true
    }

    fn set_border(&mut self, boundary: u8) {
        for axis in 0..3 {
            self.data.index_axis_mut(Axis(axis), 0).fill(boundary);
        }
    }
}

/// What a commit changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    /// Voxels whose value changed
    pub changed: usize,
    /// Voxels holding the foreground sentinel in the committed region
    pub foreground: usize,
}

/// Notification payload for the mask-changed callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskChange {
    pub scope: SegmentScope,
    pub summary: CommitSummary,
}

type InvalidateFn = Box<dyn FnMut(Orientation) + Send>;
type ChangedFn = Box<dyn FnMut(&MaskChange) + Send>;

/// Applies strategy output to a [`PaddedMask`]
pub struct MaskCompositor {
    sentinels: MaskSentinels,
    on_invalidate: Option<InvalidateFn>,
    on_changed: Option<ChangedFn>,
}

impl std::fmt::Debug for MaskCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskCompositor").field("sentinels", &self.sentinels).finish_non_exhaustive()
    }
}

impl Default for MaskCompositor {
    fn default() -> Self {
        Self::new(MaskSentinels::default())
    }
}

impl MaskCompositor {
    pub fn new(sentinels: MaskSentinels) -> Self {
        Self { sentinels, on_invalidate: None, on_changed: None }
    }

    /// Called once per orientation whose rendered slices are stale
    pub fn on_invalidate(mut self, f: impl FnMut(Orientation) + Send + 'static) -> Self {
        self.on_invalidate = Some(Box::new(f));
        self
    }

    /// Called after every successful commit
    pub fn on_mask_changed(mut self, f: impl FnMut(&MaskChange) + Send + 'static) -> Self {
        self.on_changed = Some(Box::new(f));
        self
    }

    pub fn sentinels(&self) -> &MaskSentinels {
        &self.sentinels
    }

    /// Merge `output` into `mask` under `mode`.
    pub fn commit(&mut self, mask: &mut PaddedMask, output: &StrategyOutput, mode: MergeMode) -> Result<CommitSummary> {
        let start = Instant::now();
        let volume_shape = mask.volume_shape();
        let expected = output.scope.region_shape(volume_shape);
        if output.field.dim() != expected {
            return Err(Error::SizeMismatch { expected, actual: output.field.dim() });
        }

        let sentinels = &self.sentinels;
        let mut region = output.scope.region(mask.interior_mut())?;
        let mut changed = 0usize;
        let mut foreground = 0usize;

        let mut write = |cell: &mut u8, proposed: Option<u8>| {
            let next = match (mode, proposed) {
                (MergeMode::Overwrite, p) => p.unwrap_or(sentinels.background),
                (MergeMode::Additive, Some(p)) if sentinels.may_replace(*cell, p) => p,
                (MergeMode::Additive, _) => *cell,
            };
            if next != *cell {
                *cell = next;
                changed += 1;
            }
            if *cell == sentinels.foreground {
                foreground += 1;
            }
        };

        match &output.field {
            LabelField::Basins(labels) => {
                Zip::from(&mut region).and(labels).for_each(|cell, &label| {
                    let proposed = match BasinLabel::from_u8(label) {
                        BasinLabel::Foreground => Some(sentinels.foreground),
                        BasinLabel::Background if mode == MergeMode::Additive => Some(sentinels.ambiguous),
                        _ => None,
                    };
                    write(cell, proposed);
                });
            }
            LabelField::Inclusion(included) => {
                Zip::from(&mut region).and(included).for_each(|cell, &inside| {
                    write(cell, inside.then_some(sentinels.foreground));
                });
            }
        }

        let summary = CommitSummary { changed, foreground };
        self.finish(mask, output.scope, summary);
        info!(
            ?mode,
            scope = ?output.scope,
            changed,
            foreground,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "mask committed"
        );
        Ok(summary)
    }

    /// Relabel foreground components of at most `max_size` voxels as background.
    ///
    /// Returns the number of voxels cleared; the mask is untouched (and no
    /// callbacks fire) when nothing is small enough.
    pub fn remove_small_regions(
        &mut self,
        mask: &mut PaddedMask,
        max_size: usize,
        connectivity: Connectivity3D,
    ) -> Result<usize> {
        let foreground = self.sentinels.foreground;
        let inside = mask.interior().mapv(|v| v == foreground);
        let components = label_components(inside.view(), &connectivity.offsets());

        let mut removed = 0usize;
        let background = self.sentinels.background;
        Zip::from(&mut mask.interior_mut()).and(&components.labels).for_each(|cell, &id| {
            if id > 0 && components.sizes[id as usize - 1] <= max_size {
                *cell = background;
                removed += 1;
            }
        });
        debug!(components = components.count(), removed, max_size, "small regions removed");

        if removed > 0 {
            let remaining = mask.interior().iter().filter(|v| **v == foreground).count();
            self.finish(mask, SegmentScope::Volume, CommitSummary { changed: removed, foreground: remaining });
        }
        Ok(removed)
    }

    fn finish(&mut self, mask: &mut PaddedMask, scope: SegmentScope, summary: CommitSummary) {
        mask.set_border(self.sentinels.boundary);
        mask.edited = true;
        mask.history.clear();
        if let Some(invalidate) = self.on_invalidate.as_mut() {
            for orientation in Orientation::ALL {
                invalidate(orientation);
            }
        }
        if let Some(changed) = self.on_changed.as_mut() {
            changed(&MaskChange { scope, summary });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn basins(shape: (usize, usize, usize), f: impl Fn((usize, usize, usize)) -> u8) -> StrategyOutput {
        StrategyOutput { scope: SegmentScope::Volume, field: LabelField::Basins(Array3::from_shape_fn(shape, f)) }
    }

    #[test]
    fn test_overwrite_round_trip() {
        let mut mask = PaddedMask::new((3, 4, 5));
        let output = basins((3, 4, 5), |(_, _, x)| if x < 2 { 1 } else { 2 });
        let summary = MaskCompositor::default().commit(&mut mask, &output, MergeMode::Overwrite).unwrap();
        assert_eq!(summary.foreground, 3 * 4 * 2);
        for ((z, y, x), v) in mask.interior().indexed_iter() {
            assert_eq!(*v, if x < 2 { 253 } else { 0 }, "at ({z}, {y}, {x})");
        }
        assert!(mask.padded().index_axis(Axis(0), 0).iter().all(|v| *v == 1));
        assert!(mask.padded().index_axis(Axis(1), 0).iter().all(|v| *v == 1));
        assert!(mask.padded().index_axis(Axis(2), 0).iter().all(|v| *v == 1));
        assert!(mask.is_edited());
    }

    #[test]
    fn test_overwrite_clears_region() {
        let mut mask = PaddedMask::new((2, 2, 2));
        mask.paint(0, 0, 0, 254).unwrap();
        let output = basins((2, 2, 2), |_| 2);
        MaskCompositor::default().commit(&mut mask, &output, MergeMode::Overwrite).unwrap();
        assert!(mask.interior().iter().all(|v| *v == 0));
    }

    #[test]
    fn test_additive_respects_precedence() {
        let mut mask = PaddedMask::new((1, 1, 4));
        mask.paint(0, 0, 0, 253).unwrap();
        mask.paint(0, 0, 1, 254).unwrap();
        mask.paint(0, 0, 2, 2).unwrap();
        let output = basins((1, 1, 4), |(_, _, x)| if x == 2 { 1 } else { 2 });
        MaskCompositor::default().commit(&mut mask, &output, MergeMode::Additive).unwrap();
        // foreground never downgraded, foreign values untouched
        assert_eq!(mask.get(0, 0, 0), Some(253));
        assert_eq!(mask.get(0, 0, 1), Some(254));
        assert_eq!(mask.get(0, 0, 2), Some(253));
        assert_eq!(mask.get(0, 0, 3), Some(2));
    }

    #[test]
    fn test_additive_inclusion_writes_only_included() {
        let mut mask = PaddedMask::new((1, 2, 2));
        mask.paint(0, 1, 1, 2).unwrap();
        let included = Array3::from_shape_fn((1, 2, 2), |(_, y, x)| y == 0 && x == 0);
        let output = StrategyOutput { scope: SegmentScope::Volume, field: LabelField::Inclusion(included) };
        MaskCompositor::default().commit(&mut mask, &output, MergeMode::Additive).unwrap();
        assert_eq!(mask.get(0, 0, 0), Some(253));
        assert_eq!(mask.get(0, 1, 1), Some(2));
        assert_eq!(mask.get(0, 0, 1), Some(0));
    }

    #[test]
    fn test_slice_commit_touches_only_slice() {
        let mut mask = PaddedMask::new((3, 3, 3));
        let output = StrategyOutput {
            scope: SegmentScope::Slice { orientation: Orientation::Sagittal, index: 1 },
            field: LabelField::Basins(Array3::from_elem((3, 3, 1), 1)),
        };
        let summary = MaskCompositor::default().commit(&mut mask, &output, MergeMode::Overwrite).unwrap();
        assert_eq!(summary.changed, 9);
        for ((_, _, x), v) in mask.interior().indexed_iter() {
            assert_eq!(*v, if x == 1 { 253 } else { 0 });
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut mask = PaddedMask::new((2, 2, 2));
        let output = basins((2, 2, 3), |_| 1);
        assert!(MaskCompositor::default().commit(&mut mask, &output, MergeMode::Overwrite).is_err());
        assert!(!mask.is_edited());
    }

    #[test]
    fn test_commit_bookkeeping_and_callbacks() {
        let invalidated = Arc::new(Mutex::new(Vec::new()));
        let changes = Arc::new(Mutex::new(0usize));
        let (inv, chg) = (Arc::clone(&invalidated), Arc::clone(&changes));
        let mut compositor = MaskCompositor::default()
            .on_invalidate(move |o| inv.lock().unwrap().push(o))
            .on_mask_changed(move |_| *chg.lock().unwrap() += 1);

        let mut mask = PaddedMask::new((2, 2, 2));
        mask.paint(1, 1, 1, 7).unwrap();
        assert_eq!(mask.history().len(), 1);
        compositor.commit(&mut mask, &basins((2, 2, 2), |_| 1), MergeMode::Overwrite).unwrap();
        assert!(mask.history().is_empty());
        assert!(!mask.undo());
        assert_eq!(*invalidated.lock().unwrap(), Orientation::ALL.to_vec());
        assert_eq!(*changes.lock().unwrap(), 1);
    }

    #[test]
    fn test_paint_and_undo() {
        let mut mask = PaddedMask::new((2, 2, 2));
        mask.paint(0, 1, 0, 254).unwrap();
        assert_eq!(mask.get(0, 1, 0), Some(254));
        assert!(mask.undo());
        assert_eq!(mask.get(0, 1, 0), Some(0));
        assert!(mask.paint(2, 0, 0, 1).is_err());
    }

    #[test]
    fn test_remove_small_regions() {
        let mut mask = PaddedMask::new((1, 5, 5));
        for (y, x) in [(0, 0), (0, 1), (1, 0), (1, 1), (4, 4)] {
            mask.paint(0, y, x, 253).unwrap();
        }
        let mut compositor = MaskCompositor::default();
        assert_eq!(compositor.remove_small_regions(&mut mask, 1, Connectivity3D::Six).unwrap(), 1);
        assert_eq!(mask.get(0, 4, 4), Some(0));
        assert_eq!(mask.get(0, 1, 1), Some(253));
        assert!(mask.history().is_empty());
        assert_eq!(compositor.remove_small_regions(&mut mask, 1, Connectivity3D::Six).unwrap(), 0);
    }
}

//! # voxseg engine
//!
//! Interactive marker-driven segmentation of a 3D scan.
//!
//! A host feeds stroke events into a [`Session`]; the brush paints
//! foreground/background markers into a [`MarkerBuffer`]; each stroke
//! release snapshots the markers and hands them to a background worker
//! running the configured [`SegmentationStrategy`]; the newest result is
//! merged into the host's [`PaddedMask`] by the [`MaskCompositor`].

pub mod brush;
pub mod compositor;
pub mod config;
pub mod features;
pub mod host;
pub mod markers;
pub mod session;
pub mod strategy;
pub mod worker;

pub use brush::{apply_stroke, resolve_label, BrushModifiers, BrushOperation, BrushShape, Footprint};
pub use compositor::{CommitSummary, MaskChange, MaskCompositor, MaskSentinels, MergeMode, PaddedMask};
pub use config::{ConfigHandle, ConfigUpdate, SegmentationAlgorithm, SessionConfig, StorageConfig};
pub use features::FeatureCache;
pub use host::{ScreenToVoxel, StrokeEvent, StrokePhase, StrokePoint, ZoomedSliceView};
pub use markers::{MarkerBuffer, MarkerCounts, MarkerLabel};
pub use session::{CommitStatus, SegmentReport, Session, SessionState};
pub use strategy::{
    run_strategy, strategy_for, LabelField, SegmentOutcome, SegmentScope, SegmentationStrategy, StrategyInput,
    StrategyOutput,
};

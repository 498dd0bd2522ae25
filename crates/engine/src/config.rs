//! Session configuration and its typed update channel
//!
//! The host owns a [`ConfigHandle`] and sends [`ConfigUpdate`]s; the session
//! drains them before every stroke and every segmentation run. An update
//! that would leave the configuration invalid is rejected and the previous
//! value kept.

use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voxseg_algorithms::classification::ClassifierKind;
use voxseg_core::{Connectivity2D, Connectivity3D, Error, Result};

use crate::brush::{BrushOperation, BrushShape};
use crate::compositor::MergeMode;

/// Segmentation strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentationAlgorithm {
    #[default]
    Watershed,
    WatershedIft,
    Classifier,
    FloodFill,
}

impl SegmentationAlgorithm {
    pub const ALL: [SegmentationAlgorithm; 4] = [
        SegmentationAlgorithm::Watershed,
        SegmentationAlgorithm::WatershedIft,
        SegmentationAlgorithm::Classifier,
        SegmentationAlgorithm::FloodFill,
    ];

    /// Watershed variants run per slice and can be expanded to 3D
    pub fn is_watershed(self) -> bool {
        matches!(self, SegmentationAlgorithm::Watershed | SegmentationAlgorithm::WatershedIft)
    }

    /// Strategies that consume the texture descriptor volume
    pub fn uses_features(self) -> bool {
        matches!(self, SegmentationAlgorithm::Classifier | SegmentationAlgorithm::FloodFill)
    }
}

impl std::str::FromStr for SegmentationAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "watershed" => Ok(SegmentationAlgorithm::Watershed),
            "watershed-ift" | "ift" => Ok(SegmentationAlgorithm::WatershedIft),
            "classifier" => Ok(SegmentationAlgorithm::Classifier),
            "flood-fill" | "floodfill" => Ok(SegmentationAlgorithm::FloodFill),
            other => Err(Error::InvalidParameter {
                name: "algorithm",
                value: other.to_string(),
                reason: "expected watershed, watershed-ift, classifier or flood-fill".to_string(),
            }),
        }
    }
}

/// Where the marker buffer lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Buffers up to this many bytes stay in memory (default: 256 MiB)
    pub resident_limit_bytes: usize,
    /// Directory for the spill file; system temp dir when unset
    pub spill_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { resident_limit_bytes: 256 << 20, spill_dir: None }
    }
}

/// Everything a segmentation session reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub algorithm: SegmentationAlgorithm,
    /// In-plane connectivity for slice-scoped runs
    pub con_2d: Connectivity2D,
    /// Connectivity for volume-scoped runs
    pub con_3d: Connectivity3D,
    /// Morphological gradient kernel size, odd
    pub mg_size: usize,
    /// Window intensities with the display window/level before processing
    pub use_window_level: bool,
    pub operation: BrushOperation,
    pub brush_shape: BrushShape,
    pub brush_size: usize,
    /// Gaussian sigma applied before texture extraction
    pub texture_sigma: f64,
    pub merge_mode: MergeMode,
    pub classifier: ClassifierKind,
    pub storage: StorageConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            algorithm: SegmentationAlgorithm::Watershed,
            con_2d: Connectivity2D::Four,
            con_3d: Connectivity3D::Six,
            mg_size: 3,
            use_window_level: true,
            operation: BrushOperation::Foreground,
            brush_shape: BrushShape::Circle,
            brush_size: 15,
            texture_sigma: 1.5,
            merge_mode: MergeMode::Overwrite,
            classifier: ClassifierKind::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mg_size == 0 || self.mg_size % 2 == 0 {
            return Err(Error::InvalidParameter {
                name: "mg_size",
                value: self.mg_size.to_string(),
                reason: "gradient kernel size must be odd".to_string(),
            });
        }
        if self.brush_size == 0 {
            return Err(Error::InvalidParameter {
                name: "brush_size",
                value: "0".to_string(),
                reason: "brush must be at least one cell across".to_string(),
            });
        }
        if !self.texture_sigma.is_finite() || self.texture_sigma < 0.0 {
            return Err(Error::InvalidParameter {
                name: "texture_sigma",
                value: self.texture_sigma.to_string(),
                reason: "sigma must be finite and non-negative".to_string(),
            });
        }
        match &self.classifier {
            ClassifierKind::DecisionTree(params) => params.validate(),
            ClassifierKind::RandomForest(params) => params.validate(),
        }
    }

    /// Apply one update, keeping the current value if the result is invalid.
    pub fn apply(&mut self, update: ConfigUpdate) -> Result<()> {
        let mut next = self.clone();
        match update {
            ConfigUpdate::Algorithm(v) => next.algorithm = v,
            ConfigUpdate::Connectivity2D(v) => next.con_2d = v,
            ConfigUpdate::Connectivity3D(v) => next.con_3d = v,
            ConfigUpdate::MgSize(v) => next.mg_size = v,
            ConfigUpdate::UseWindowLevel(v) => next.use_window_level = v,
            ConfigUpdate::Operation(v) => next.operation = v,
            ConfigUpdate::BrushShape(v) => next.brush_shape = v,
            ConfigUpdate::BrushSize(v) => next.brush_size = v,
            ConfigUpdate::TextureSigma(v) => next.texture_sigma = v,
            ConfigUpdate::MergeMode(v) => next.merge_mode = v,
            ConfigUpdate::Classifier(v) => next.classifier = v,
            ConfigUpdate::Replace(v) => next = *v,
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// A single named option change from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigUpdate {
    Algorithm(SegmentationAlgorithm),
    Connectivity2D(Connectivity2D),
    Connectivity3D(Connectivity3D),
    MgSize(usize),
    UseWindowLevel(bool),
    Operation(BrushOperation),
    BrushShape(BrushShape),
    BrushSize(usize),
    TextureSigma(f64),
    MergeMode(MergeMode),
    Classifier(ClassifierKind),
    Replace(Box<SessionConfig>),
}

/// Sending side of the configuration channel, held by the host
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Sender<ConfigUpdate>,
}

impl ConfigHandle {
    pub fn send(&self, update: ConfigUpdate) -> Result<()> {
        self.tx
            .send(update)
            .map_err(|_| Error::Other("segmentation session has been dropped".to_string()))
    }
}

/// Receiving side, drained by the session
#[derive(Debug)]
pub struct ConfigReceiver {
    rx: Receiver<ConfigUpdate>,
}

impl ConfigReceiver {
    /// Apply every pending update to `config`; returns how many were accepted.
    pub fn drain(&self, config: &mut SessionConfig) -> usize {
        let mut accepted = 0;
        while let Ok(update) = self.rx.try_recv() {
            debug!(?update, "config update");
            match config.apply(update) {
                Ok(()) => accepted += 1,
                Err(e) => warn!("config update rejected: {e}"),
            }
        }
        accepted
    }
}

pub fn config_channel() -> (ConfigHandle, ConfigReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ConfigHandle { tx }, ConfigReceiver { rx })
}

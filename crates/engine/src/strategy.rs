//! Segmentation strategies behind one contract
//!
//! A strategy maps (volume, optional descriptor volume, marker snapshot)
//! to either a basin label field or a boolean inclusion field. Missing
//! markers are an expected outcome ([`SegmentOutcome::NotReady`]), not an
//! error.

use std::time::Instant;

use ndarray::{Array3, ArrayBase, ArrayView3, Ix3, RawData, Slice};
use tracing::{debug, info};
use voxseg_algorithms::classification::TrainingSet;
use voxseg_algorithms::filters::preprocess_intensity;
use voxseg_algorithms::morphology::{gradient, StructuringElement};
use voxseg_algorithms::segmentation::{
    marker_watershed, texture_flood_fill, watershed_ift, BasinLabel, FloodFillParams,
};
use voxseg_algorithms::texture::{FeatureParams, FeatureVolume};
use voxseg_core::{CancelToken, Error, Orientation, Result, Volume, VoxelElement};

use crate::config::{SegmentationAlgorithm, SessionConfig};
use crate::features::FeatureCache;
use crate::markers::MarkerCounts;

/// Part of the volume a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentScope {
    /// One slice, with in-plane connectivity
    Slice { orientation: Orientation, index: usize },
    /// The whole volume, with 3D connectivity
    Volume,
}

impl SegmentScope {
    /// Restrict a full-volume array to this scope; slices keep a unit axis.
    pub fn region<S: RawData>(&self, array: ArrayBase<S, Ix3>) -> Result<ArrayBase<S, Ix3>> {
        match *self {
            SegmentScope::Volume => Ok(array),
            SegmentScope::Slice { orientation, index } => {
                let shape = array.dim();
                if index >= orientation.slice_count(shape) {
                    let (z, y, x) = orientation.to_volume(index, 0, 0);
                    return Err(Error::IndexOutOfBounds { z, y, x, shape });
                }
                Ok(array.slice_axis_move(orientation.axis(), Slice::from(index..index + 1)))
            }
        }
    }

    /// Shape of the region inside a volume of `shape`
    pub fn region_shape(&self, shape: (usize, usize, usize)) -> (usize, usize, usize) {
        match *self {
            SegmentScope::Volume => shape,
            SegmentScope::Slice { orientation, .. } => match orientation {
                Orientation::Axial => (1, shape.1, shape.2),
                Orientation::Coronal => (shape.0, 1, shape.2),
                Orientation::Sagittal => (shape.0, shape.1, 1),
            },
        }
    }

    pub fn offsets(&self, config: &SessionConfig) -> Vec<(isize, isize, isize)> {
        match *self {
            SegmentScope::Slice { orientation, .. } => config.con_2d.offsets_in(orientation),
            SegmentScope::Volume => config.con_3d.offsets(),
        }
    }
}

/// Raw strategy result over a scope's region
#[derive(Debug, Clone, PartialEq)]
pub enum LabelField {
    /// Basin labels: 1 foreground, 2 background, 0 unreached
    Basins(Array3<u8>),
    /// Voxels included in the segmented region
    Inclusion(Array3<bool>),
}

impl LabelField {
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            LabelField::Basins(labels) => labels.dim(),
            LabelField::Inclusion(included) => included.dim(),
        }
    }

    pub fn foreground_count(&self) -> usize {
        match self {
            LabelField::Basins(labels) => labels.iter().filter(|l| **l == BasinLabel::Foreground as u8).count(),
            LabelField::Inclusion(included) => included.iter().filter(|v| **v).count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutput {
    pub scope: SegmentScope,
    pub field: LabelField,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// Not enough markers; nothing to commit
    NotReady(String),
    Labels(StrategyOutput),
    Cancelled,
}

/// Everything a strategy reads for one run
pub struct StrategyInput<'a, T: VoxelElement> {
    pub volume: &'a Volume<T>,
    /// Descriptor volume, present for strategies that use features
    pub features: Option<&'a FeatureVolume>,
    /// Full-volume marker snapshot
    pub markers: ArrayView3<'a, u8>,
    pub scope: SegmentScope,
}

pub trait SegmentationStrategy<T: VoxelElement>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `segment` needs the descriptor volume
    fn uses_features(&self) -> bool {
        false
    }

    /// Whether the strategy ignores slice scopes and always covers the volume
    fn volume_scoped(&self) -> bool {
        false
    }

    /// Reason the markers are insufficient, `None` when ready
    fn readiness(&self, counts: &MarkerCounts) -> Option<String> {
        if counts.has_both() {
            None
        } else {
            Some(format!(
                "{} needs foreground and background markers ({} fg, {} bg)",
                self.name(),
                counts.foreground,
                counts.background
            ))
        }
    }

    fn segment(&self, input: &StrategyInput<'_, T>, config: &SessionConfig, cancel: &CancelToken) -> Result<SegmentOutcome>;
}

/// Marker watershed on the morphological gradient
#[derive(Debug, Clone, Copy, Default)]
pub struct WatershedStrategy;

/// Image foresting transform on (windowed) intensities
#[derive(Debug, Clone, Copy, Default)]
pub struct WatershedIftStrategy;

/// Per-voxel classifier trained on the marked descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierStrategy;

/// Region growing on descriptor similarity
#[derive(Debug, Clone, Copy, Default)]
pub struct FloodFillStrategy;

fn not_ready<T: VoxelElement>(
    strategy: &dyn SegmentationStrategy<T>,
    markers: ArrayView3<'_, u8>,
) -> Option<SegmentOutcome> {
    strategy.readiness(&MarkerCounts::of(markers)).map(SegmentOutcome::NotReady)
}

fn require_features<'a, T: VoxelElement>(input: &StrategyInput<'a, T>) -> Result<&'a FeatureVolume> {
    input
        .features
        .ok_or_else(|| Error::Algorithm("texture features were not provided".to_string()))
}

impl<T: VoxelElement> SegmentationStrategy<T> for WatershedStrategy {
    fn name(&self) -> &'static str {
        "watershed"
    }

    fn segment(&self, input: &StrategyInput<'_, T>, config: &SessionConfig, cancel: &CancelToken) -> Result<SegmentOutcome> {
        let markers = input.scope.region(input.markers)?;
        if let Some(outcome) = not_ready::<T>(self, markers) {
            return Ok(outcome);
        }
        let region = input.scope.region(input.volume.view())?;
        let intensity = preprocess_intensity(input.volume, region, config.use_window_level);
        // Cube elements truncate to the plane on single-slice regions
        let element = StructuringElement::from_size(config.mg_size, false)?;
        let relief = gradient(&intensity, &element)?;
        cancel.check()?;
        let labels = marker_watershed(&relief, markers, &input.scope.offsets(config), cancel)?;
        Ok(SegmentOutcome::Labels(StrategyOutput { scope: input.scope, field: LabelField::Basins(labels) }))
    }
}

impl<T: VoxelElement> SegmentationStrategy<T> for WatershedIftStrategy {
    fn name(&self) -> &'static str {
        "watershed-ift"
    }

    fn segment(&self, input: &StrategyInput<'_, T>, config: &SessionConfig, cancel: &CancelToken) -> Result<SegmentOutcome> {
        let markers = input.scope.region(input.markers)?;
        if let Some(outcome) = not_ready::<T>(self, markers) {
            return Ok(outcome);
        }
        let region = input.scope.region(input.volume.view())?;
        let intensity = preprocess_intensity(input.volume, region, config.use_window_level);
        let labels = watershed_ift(&intensity, markers, &input.scope.offsets(config), cancel)?;
        Ok(SegmentOutcome::Labels(StrategyOutput { scope: input.scope, field: LabelField::Basins(labels) }))
    }
}

impl<T: VoxelElement> SegmentationStrategy<T> for ClassifierStrategy {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn uses_features(&self) -> bool {
        true
    }

    fn volume_scoped(&self) -> bool {
        true
    }

    fn segment(&self, input: &StrategyInput<'_, T>, config: &SessionConfig, cancel: &CancelToken) -> Result<SegmentOutcome> {
        if let Some(outcome) = not_ready::<T>(self, input.markers) {
            return Ok(outcome);
        }
        let features = require_features(input)?;
        let set = TrainingSet::from_markers(features, input.markers)?;
        debug!(samples = set.len(), "classifier training set");
        let model = config.classifier.fit(&set, cancel)?;
        let labels = model.predict_volume(features, cancel)?;
        Ok(SegmentOutcome::Labels(StrategyOutput { scope: SegmentScope::Volume, field: LabelField::Basins(labels) }))
    }
}

impl<T: VoxelElement> SegmentationStrategy<T> for FloodFillStrategy {
    fn name(&self) -> &'static str {
        "flood-fill"
    }

    fn uses_features(&self) -> bool {
        true
    }

    fn volume_scoped(&self) -> bool {
        true
    }

    fn readiness(&self, counts: &MarkerCounts) -> Option<String> {
        (counts.foreground == 0).then(|| "flood-fill needs at least one foreground marker".to_string())
    }

    fn segment(&self, input: &StrategyInput<'_, T>, config: &SessionConfig, cancel: &CancelToken) -> Result<SegmentOutcome> {
        if let Some(outcome) = not_ready::<T>(self, input.markers) {
            return Ok(outcome);
        }
        let features = require_features(input)?;
        let params = FloodFillParams { offsets: config.con_3d.offsets(), ..Default::default() };
        let fill = texture_flood_fill(features, input.markers, &params, cancel)?;
        debug!(threshold = fill.threshold, included = fill.count(), "flood fill grown");
        Ok(SegmentOutcome::Labels(StrategyOutput {
            scope: SegmentScope::Volume,
            field: LabelField::Inclusion(fill.included),
        }))
    }
}

pub fn strategy_for<T: VoxelElement>(algorithm: SegmentationAlgorithm) -> Box<dyn SegmentationStrategy<T>> {
    match algorithm {
        SegmentationAlgorithm::Watershed => Box::new(WatershedStrategy),
        SegmentationAlgorithm::WatershedIft => Box::new(WatershedIftStrategy),
        SegmentationAlgorithm::Classifier => Box::new(ClassifierStrategy),
        SegmentationAlgorithm::FloodFill => Box::new(FloodFillStrategy),
    }
}

/// Descriptor parameters implied by `config`
pub fn feature_params(config: &SessionConfig) -> FeatureParams {
    FeatureParams { sigma: config.texture_sigma, use_window: config.use_window_level }
}

/// Run the configured strategy on a marker snapshot.
///
/// Readiness is checked before any descriptor extraction. Descriptor
/// extraction ignores `cancel` and always lands in `cache`; cancellation of
/// the job itself is folded into [`SegmentOutcome::Cancelled`]. Other errors (including a
/// degenerate training set) are returned for the caller to decline.
pub fn run_strategy<T: VoxelElement>(
    volume: &Volume<T>,
    markers: ArrayView3<'_, u8>,
    requested: SegmentScope,
    config: &SessionConfig,
    cache: &FeatureCache,
    cancel: &CancelToken,
) -> Result<SegmentOutcome> {
    if markers.dim() != volume.shape() {
        return Err(Error::SizeMismatch { expected: volume.shape(), actual: markers.dim() });
    }
    let strategy = strategy_for::<T>(config.algorithm);
    let scope = if strategy.volume_scoped() { SegmentScope::Volume } else { requested };

    if let Some(reason) = strategy.readiness(&MarkerCounts::of(scope.region(markers)?)) {
        debug!(strategy = strategy.name(), "not ready: {reason}");
        return Ok(SegmentOutcome::NotReady(reason));
    }

    let start = Instant::now();
    let features = if strategy.uses_features() {
        // extraction outlives a superseded job so the next one hits the cache
        let extracted = cache.get_or_compute(volume, feature_params(config));
        match extracted {
            Ok(features) => Some(features),
            Err(Error::Cancelled) => return Ok(SegmentOutcome::Cancelled),
            Err(e) => return Err(e),
        }
    } else {
        None
    };
    if cancel.is_cancelled() {
        return Ok(SegmentOutcome::Cancelled);
    }

    let input = StrategyInput { volume, features: features.as_deref(), markers: markers.view(), scope };
    match strategy.segment(&input, config, cancel) {
        Ok(outcome) => {
            if let SegmentOutcome::Labels(output) = &outcome {
                info!(
                    strategy = strategy.name(),
                    scope = ?output.scope,
                    foreground = output.field.foreground_count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "segmentation finished"
                );
            }
            Ok(outcome)
        }
        Err(Error::Cancelled) => Ok(SegmentOutcome::Cancelled),
        Err(e) => Err(e),
    }
}

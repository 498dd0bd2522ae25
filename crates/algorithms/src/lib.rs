//! # voxseg algorithms
//!
//! Volumetric kernels behind the interactive segmentation engine.
//!
//! ## Available Algorithm Categories
//!
//! - **filters**: window/level lookup, intensity shift, separable Gaussian
//! - **morphology**: grey dilation, erosion and morphological gradient
//! - **texture**: per-voxel rotation-invariant LBP descriptors
//! - **segmentation**: marker watershed, watershed-IFT, texture flood fill,
//!   connected components
//! - **classification**: CART decision tree and random forest

pub mod classification;
pub mod filters;
pub mod morphology;
pub mod segmentation;
pub mod texture;

pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        ClassifierKind, DecisionTree, ForestParams, RandomForest, TrainingSet, TreeParams,
    };
    pub use crate::filters::{apply_window, gaussian_filter, shift_intensity, GaussianParams};
    pub use crate::morphology::{dilate, erode, gradient, StructuringElement};
    pub use crate::segmentation::{
        label_components, marker_watershed, texture_flood_fill, watershed_ift, BasinLabel,
        FloodFillParams,
    };
    pub use crate::texture::{extract_features, FeatureParams, FeatureVolume, TextureDescriptor};
    pub use voxseg_core::prelude::*;
}

//! Supervised voxel classification on texture descriptors
//!
//! - **Decision tree**: CART with Gini impurity
//! - **Random forest**: bagged CART trees with per-split feature sampling
//!
//! Both are fitted from a [`TrainingSet`] built from marked voxels and
//! predict one class label per voxel of a [`FeatureVolume`].

mod forest;
mod training;
mod tree;

pub use forest::{ForestParams, RandomForest};
pub use training::TrainingSet;
pub use tree::{DecisionTree, TreeParams};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use voxseg_core::{CancelToken, Error, Result};

use crate::maybe_rayon::*;
use crate::texture::{FeatureVolume, TextureDescriptor};

/// Which classifier to fit, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClassifierKind {
    DecisionTree(TreeParams),
    RandomForest(ForestParams),
}

impl Default for ClassifierKind {
    fn default() -> Self {
        ClassifierKind::RandomForest(ForestParams::default())
    }
}

impl ClassifierKind {
    /// Fit a fresh model on `set`.
    pub fn fit(&self, set: &TrainingSet, cancel: &CancelToken) -> Result<FittedClassifier> {
        match self {
            ClassifierKind::DecisionTree(params) => {
                cancel.check()?;
                DecisionTree::fit(set, params).map(FittedClassifier::Tree)
            }
            ClassifierKind::RandomForest(params) => {
                RandomForest::fit(set, params, cancel).map(FittedClassifier::Forest)
            }
        }
    }
}

/// A trained model of either kind
#[derive(Debug, Clone)]
pub enum FittedClassifier {
    Tree(DecisionTree),
    Forest(RandomForest),
}

impl FittedClassifier {
    pub fn predict(&self, sample: &TextureDescriptor) -> u8 {
        match self {
            FittedClassifier::Tree(tree) => tree.predict(sample),
            FittedClassifier::Forest(forest) => forest.predict(sample),
        }
    }

    /// Predict a label for every voxel of `features`.
    pub fn predict_volume(&self, features: &FeatureVolume, cancel: &CancelToken) -> Result<Array3<u8>> {
        let (depth, height, width) = features.shape();
        let descriptors = features.descriptors();

        let rows: Vec<Option<Vec<u8>>> = (0..depth * height)
            .into_par_iter()
            .map(|zy| {
                if cancel.is_cancelled() {
                    return None;
                }
                let (z, y) = (zy / height, zy % height);
                Some((0..width).map(|x| self.predict(&descriptors[(z, y, x)])).collect())
            })
            .collect();

        let mut data = Vec::with_capacity(depth * height * width);
        for row in rows {
            data.extend(row.ok_or(Error::Cancelled)?);
        }
        Array3::from_shape_vec((depth, height, width), data).map_err(|e| Error::Other(e.to_string()))
    }
}

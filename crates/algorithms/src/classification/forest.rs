//! Random forest of CART trees
//!
//! Each tree is grown on a class-stratified bootstrap of the training set
//! and samples `sqrt(n_features)` candidate features per split. Trees carry
//! their own RNG seeded from `seed + tree_index`, so a fit is reproducible
//! regardless of how rayon schedules the trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;
use voxseg_core::{CancelToken, Error, Result};

use super::tree::{DecisionTree, TreeParams};
use super::TrainingSet;
use crate::maybe_rayon::*;
use crate::texture::{TextureDescriptor, DESCRIPTOR_LEN};

/// Parameters for random forest fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees (default: 25)
    pub trees: usize,
    /// Per-tree parameters
    pub tree: TreeParams,
    /// Base seed; tree `i` uses `seed + i` (default: 42)
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 25,
            tree: TreeParams::default(),
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.trees == 0 {
            return Err(Error::InvalidParameter {
                name: "trees",
                value: "0".to_string(),
                reason: "a forest needs at least one tree".to_string(),
            });
        }
        self.tree.validate()
    }
}

/// A fitted random forest; predicts by majority vote
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    classes: Vec<u8>,
}

impl RandomForest {
    pub fn fit(set: &TrainingSet, params: &ForestParams, cancel: &CancelToken) -> Result<Self> {
        params.validate()?;
        let set = set.subsample(params.tree.max_training_samples, params.seed);
        set.validate()?;

        // Bootstrap within each class so every tree sees every class
        let classes = set.classes();
        let by_class: Vec<Vec<usize>> = classes
            .iter()
            .map(|c| (0..set.len()).filter(|&i| set.labels()[i] == *c).collect())
            .collect();
        let max_features = ((DESCRIPTOR_LEN as f64).sqrt().round() as usize).max(1);

        let trees: Vec<Option<DecisionTree>> = (0..params.trees)
            .into_par_iter()
            .map(|t| {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let mut sample: Vec<usize> = Vec::with_capacity(set.len());
                for members in &by_class {
                    for _ in 0..members.len() {
                        sample.push(members[rng.gen_range(0..members.len())]);
                    }
                }
                Some(DecisionTree::grow(&set, &mut sample, &params.tree, max_features, Some(&mut rng)))
            })
            .collect();

        let trees = trees.into_iter().collect::<Option<Vec<_>>>().ok_or(Error::Cancelled)?;
        debug!(trees = trees.len(), samples = set.len(), "random forest fitted");
        Ok(Self { trees, classes })
    }

    pub fn predict(&self, sample: &TextureDescriptor) -> u8 {
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            let label = tree.predict(sample);
            if let Some(class) = self.classes.iter().position(|c| *c == label) {
                votes[class] += 1;
            }
        }
        let mut best = 0;
        for (class, &count) in votes.iter().enumerate() {
            if count > votes[best] {
                best = class;
            }
        }
        self.classes.get(best).copied().unwrap_or(0)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banded_set() -> TrainingSet {
        let mut set = TrainingSet::new();
        for i in 0..60 {
            let v = (i % 10) as f32;
            set.push([v, 9.0 - v, (i % 4) as f32], if v < 5.0 { 1 } else { 2 });
        }
        set
    }

    #[test]
    fn test_forest_learns_band() {
        let forest = RandomForest::fit(&banded_set(), &ForestParams::default(), &CancelToken::new()).unwrap();
        assert_eq!(forest.tree_count(), 25);
        assert_eq!(forest.predict(&[1.0, 8.0, 0.0]), 1);
        assert_eq!(forest.predict(&[8.0, 1.0, 3.0]), 2);
    }

    #[test]
    fn test_forest_is_reproducible() {
        let set = banded_set();
        let params = ForestParams { trees: 8, ..Default::default() };
        let a = RandomForest::fit(&set, &params, &CancelToken::new()).unwrap();
        let b = RandomForest::fit(&set, &params, &CancelToken::new()).unwrap();
        for v in 0..10 {
            let sample = [v as f32 + 0.25, 4.0, 1.0];
            assert_eq!(a.predict(&sample), b.predict(&sample));
        }
    }

    #[test]
    fn test_forest_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            RandomForest::fit(&banded_set(), &ForestParams::default(), &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_sparse_class_survives_the_sample_cap() {
        let mut set = TrainingSet::new();
        for i in 0..1000 {
            set.push([(i % 7) as f32, 1.0, 0.0], 1);
        }
        set.push([100.0, 0.0, 0.0], 2);
        let tree = TreeParams { max_training_samples: 50, ..Default::default() };
        for seed in 0..10 {
            let params = ForestParams { trees: 5, tree: tree.clone(), seed };
            let forest = RandomForest::fit(&set, &params, &CancelToken::new()).unwrap();
            assert_eq!(forest.predict(&[100.0, 0.0, 0.0]), 2, "seed {seed}");
            assert_eq!(forest.predict(&[3.0, 1.0, 0.0]), 1, "seed {seed}");
        }
    }

    #[test]
    fn test_zero_trees_rejected() {
        let params = ForestParams { trees: 0, ..Default::default() };
        assert!(RandomForest::fit(&banded_set(), &params, &CancelToken::new()).is_err());
    }
}

//! CART decision tree with Gini impurity

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use voxseg_core::{Error, Result};

use super::TrainingSet;
use crate::texture::{TextureDescriptor, DESCRIPTOR_LEN};

/// Parameters for a single decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Maximum depth below the root (default: 16)
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves (default: 2)
    pub min_samples_split: usize,
    /// Training samples are subsampled per class to at most this many (default: 20000)
    pub max_training_samples: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self { max_depth: 16, min_samples_split: 2, max_training_samples: 20_000 }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(Error::InvalidParameter {
                name: "min_samples_split",
                value: self.min_samples_split.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.max_training_samples < 2 {
            return Err(Error::InvalidParameter {
                name: "max_training_samples",
                value: self.max_training_samples.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        Ok(())
    }
}

const SUBSAMPLE_SEED: u64 = 0;

#[derive(Debug, Clone)]
enum Node {
    Leaf { label: u8 },
    Split { feature: usize, threshold: f32, left: usize, right: usize },
}

/// A fitted binary decision tree
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit on `set` (capped at `max_training_samples`), considering all
    /// features at each split.
    pub fn fit(set: &TrainingSet, params: &TreeParams) -> Result<Self> {
        params.validate()?;
        let set = set.subsample(params.max_training_samples, SUBSAMPLE_SEED);
        set.validate()?;
        let mut indices: Vec<usize> = (0..set.len()).collect();
        Ok(Self::grow(&set, &mut indices, params, DESCRIPTOR_LEN, None))
    }

    /// Grow a tree on `indices` (which may repeat samples).
    ///
    /// With an `rng`, each split examines a shuffled feature order and stops
    /// after `max_features` features once a valid split has been found.
    pub(crate) fn grow(
        set: &TrainingSet,
        indices: &mut [usize],
        params: &TreeParams,
        max_features: usize,
        rng: Option<&mut StdRng>,
    ) -> Self {
        let classes = set.classes();
        let mut builder = Builder {
            samples: set.samples(),
            class_of: set
                .labels()
                .iter()
                .map(|l| classes.iter().position(|c| c == l).unwrap_or(0))
                .collect(),
            classes,
            params,
            max_features: max_features.clamp(1, DESCRIPTOR_LEN),
            rng,
            nodes: Vec::new(),
        };
        builder.build(indices, 0);
        DecisionTree { nodes: builder.nodes }
    }

    pub fn predict(&self, sample: &TextureDescriptor) -> u8 {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { label } => return *label,
                Node::Split { feature, threshold, left, right } => {
                    at = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match &nodes[at] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct Builder<'a> {
    samples: &'a [TextureDescriptor],
    class_of: Vec<usize>,
    classes: Vec<u8>,
    params: &'a TreeParams,
    max_features: usize,
    rng: Option<&'a mut StdRng>,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    score: f64,
}

impl Builder<'_> {
    /// Build the subtree for `indices`, returning its node index.
    fn build(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let counts = self.class_counts(indices);
        let at = self.nodes.len();
        self.nodes.push(Node::Leaf { label: self.majority(&counts) });

        let pure = counts.iter().filter(|c| **c > 0).count() <= 1;
        if pure || depth >= self.params.max_depth || indices.len() < self.params.min_samples_split {
            return at;
        }

        let Some(split) = self.best_split(indices, gini(&counts, indices.len()) * indices.len() as f64)
        else {
            return at;
        };

        let mid = partition(indices, |i| self.samples[i][split.feature] <= split.threshold);
        let (lower, upper) = indices.split_at_mut(mid);
        let left = self.build(lower, depth + 1);
        let right = self.build(upper, depth + 1);
        self.nodes[at] = Node::Split { feature: split.feature, threshold: split.threshold, left, right };
        at
    }

    fn best_split(&mut self, indices: &mut [usize], parent_score: f64) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..DESCRIPTOR_LEN).collect();
        if let Some(rng) = self.rng.as_deref_mut() {
            features.shuffle(rng);
        }

        let mut best: Option<BestSplit> = None;
        for (tried, &feature) in features.iter().enumerate() {
            if tried >= self.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.split_on(indices, feature) {
                if best.as_ref().is_none_or(|b| candidate.score < b.score) {
                    best = Some(candidate);
                }
            }
        }
        best.filter(|b| b.score < parent_score - 1e-12)
    }

    /// Lowest weighted Gini split on one feature, thresholds at midpoints.
    fn split_on(&self, indices: &mut [usize], feature: usize) -> Option<BestSplit> {
        indices.sort_by(|&a, &b| self.samples[a][feature].total_cmp(&self.samples[b][feature]));

        let n = indices.len();
        let mut left = vec![0usize; self.classes.len()];
        let mut right = self.class_counts(indices);
        let mut best: Option<BestSplit> = None;

        for k in 0..n - 1 {
            let class = self.class_of[indices[k]];
            left[class] += 1;
            right[class] -= 1;

            let here = self.samples[indices[k]][feature];
            let next = self.samples[indices[k + 1]][feature];
            if here == next {
                continue;
            }
            let (nl, nr) = (k + 1, n - k - 1);
            let score = gini(&left, nl) * nl as f64 + gini(&right, nr) * nr as f64;
            if best.as_ref().is_none_or(|b| score < b.score) {
                best = Some(BestSplit { feature, threshold: here + (next - here) / 2.0, score });
            }
        }
        best
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for &i in indices {
            counts[self.class_of[i]] += 1;
        }
        counts
    }

    /// Most frequent class; ties go to the lowest label.
    fn majority(&self, counts: &[usize]) -> u8 {
        let mut best = 0;
        for (class, &count) in counts.iter().enumerate() {
            if count > counts[best] {
                best = class;
            }
        }
        self.classes.get(best).copied().unwrap_or(0)
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

/// In-place partition; returns the count of `pred`-true items.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for k in 0..indices.len() {
        if pred(indices[k]) {
            indices.swap(mid, k);
            mid += 1;
        }
    }
    mid
}

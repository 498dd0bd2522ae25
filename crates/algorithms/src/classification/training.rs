//! Training samples gathered from marked voxels

use ndarray::ArrayView3;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use voxseg_core::{Error, Result};

use crate::segmentation::BasinLabel;
use crate::texture::{FeatureVolume, TextureDescriptor};

/// Paired descriptors and class labels
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    samples: Vec<TextureDescriptor>,
    labels: Vec<u8>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every foreground and background marked voxel.
    ///
    /// Unmarked voxels are skipped. Labels are the marker values
    /// (1 foreground, 2 background).
    pub fn from_markers(features: &FeatureVolume, markers: ArrayView3<'_, u8>) -> Result<Self> {
        if markers.dim() != features.shape() {
            return Err(Error::SizeMismatch { expected: features.shape(), actual: markers.dim() });
        }
        let descriptors = features.view();
        let mut set = Self::new();
        for (voxel, &marker) in markers.indexed_iter() {
            let label = BasinLabel::from_u8(marker);
            if label != BasinLabel::Unreached {
                set.push(descriptors[voxel], label as u8);
            }
        }
        Ok(set)
    }

    pub fn push(&mut self, sample: TextureDescriptor, label: u8) {
        self.samples.push(sample);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[TextureDescriptor] {
        &self.samples
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Distinct labels in ascending order
    pub fn classes(&self) -> Vec<u8> {
        let mut classes = self.labels.clone();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Keep at most `max` samples, drawn per class without replacement.
    ///
    /// Each class keeps a share proportional to its size, and never less than
    /// one sample, so a sparsely marked class survives the cap. The retained
    /// samples keep their original relative order.
    pub fn subsample(&self, max: usize, seed: u64) -> TrainingSet {
        if self.len() <= max {
            return self.clone();
        }
        let classes = self.classes();
        let members: Vec<Vec<usize>> = classes
            .iter()
            .map(|&class| (0..self.len()).filter(|&i| self.labels[i] == class).collect())
            .collect();

        let mut quotas: Vec<usize> = members
            .iter()
            .map(|m| (m.len() * max / self.len()).clamp(1, m.len()))
            .collect();
        // Flooring at one can overshoot the cap; take the excess from the largest shares
        while quotas.iter().sum::<usize>() > max {
            match quotas.iter_mut().filter(|q| **q > 1).max_by_key(|q| **q) {
                Some(q) => *q -= 1,
                None => break,
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked: Vec<usize> = members
            .iter()
            .zip(&quotas)
            .flat_map(|(m, &quota)| {
                index::sample(&mut rng, m.len(), quota).into_iter().map(|i| m[i]).collect::<Vec<_>>()
            })
            .collect();
        picked.sort_unstable();
        TrainingSet {
            samples: picked.iter().map(|&i| self.samples[i]).collect(),
            labels: picked.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Reject sets no classifier can learn from.
    pub fn validate(&self) -> Result<()> {
        if self.classes().len() < 2 {
            return Err(Error::DegenerateTrainingSet(format!(
                "{} samples of a single class",
                self.len()
            )));
        }
        let first = self.samples[0];
        if self.samples.iter().all(|s| *s == first) {
            return Err(Error::DegenerateTrainingSet(format!(
                "all {} feature vectors are identical",
                self.len()
            )));
        }
        Ok(())
    }
}

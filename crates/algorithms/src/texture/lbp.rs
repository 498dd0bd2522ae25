//! Local binary pattern texture descriptors
//!
//! For every voxel, the 8-neighbour ring in each orthogonal plane (XY, XZ,
//! YZ) is compared with the centre. A neighbour at or above the centre sets
//! its bit; neighbours outside the volume never do. The ring is reduced to
//! the rotation-invariant uniform code: the number of set bits when the
//! ring has at most two 0/1 transitions, otherwise `9`.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use voxseg_core::{Algorithm, CancelToken, Error, Result, Volume, VolumeId, VoxelElement};

use crate::filters::{gaussian_filter, preprocess_intensity, GaussianParams};
use crate::maybe_rayon::*;

/// Number of components in a descriptor (one per orthogonal plane)
pub const DESCRIPTOR_LEN: usize = 3;

/// Per-voxel descriptor: LBP codes for the XY, XZ and YZ planes
pub type TextureDescriptor = [f32; DESCRIPTOR_LEN];

/// Code used for non-uniform rings
const NON_UNIFORM: u8 = 9;

/// Ring order, clockwise from the upper-left neighbour, as (row, col)
const RING: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
];

/// Parameters for texture extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureParams {
    /// Gaussian pre-filter sigma in voxels (0 disables the filter)
    pub sigma: f64,
    /// Map through the display window before extraction
    pub use_window: bool,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self { sigma: 1.5, use_window: true }
    }
}

/// Descriptor volume derived from an intensity volume
#[derive(Debug, Clone)]
pub struct FeatureVolume {
    descriptors: Array3<TextureDescriptor>,
    source: Option<VolumeId>,
}

impl FeatureVolume {
    /// Wrap precomputed descriptors that are not tied to a volume
    pub fn from_descriptors(descriptors: Array3<TextureDescriptor>) -> Self {
        Self { descriptors, source: None }
    }

    pub fn descriptors(&self) -> &Array3<TextureDescriptor> {
        &self.descriptors
    }

    pub fn view(&self) -> ArrayView3<'_, TextureDescriptor> {
        self.descriptors.view()
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.descriptors.dim()
    }

    /// Identity of the volume these descriptors were computed from
    pub fn source(&self) -> Option<VolumeId> {
        self.source
    }

    pub fn get(&self, z: usize, y: usize, x: usize) -> Option<&TextureDescriptor> {
        self.descriptors.get((z, y, x))
    }
}

/// Texture extraction algorithm
#[derive(Debug, Clone, Default)]
pub struct TextureFeatures;

impl Algorithm for TextureFeatures {
    type Input = Volume<f64>;
    type Output = FeatureVolume;
    type Params = FeatureParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "TextureFeatures"
    }

    fn description(&self) -> &'static str {
        "Per-voxel rotation-invariant LBP codes for the three orthogonal planes"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        extract_features(&input, params, &CancelToken::new())
    }
}

/// Compute the descriptor volume for `volume`.
///
/// Pure and deterministic: the same volume and parameters always give the
/// same descriptors. Checks `cancel` once per slab of rows.
pub fn extract_features<T: VoxelElement>(
    volume: &Volume<T>,
    params: FeatureParams,
    cancel: &CancelToken,
) -> Result<FeatureVolume> {
    let intensity = preprocess_intensity(volume, volume.view(), params.use_window);
    cancel.check()?;
    let smoothed = gaussian_filter(&intensity, GaussianParams { sigma: params.sigma, ..Default::default() })?;
    cancel.check()?;

    let (depth, height, width) = smoothed.dim();
    let rows: Vec<Option<Vec<TextureDescriptor>>> = (0..depth * height)
        .into_par_iter()
        .map(|zy| {
            if cancel.is_cancelled() {
                return None;
            }
            let (z, y) = (zy / height, zy % height);
            Some((0..width).map(|x| descriptor_at(&smoothed, z, y, x)).collect())
        })
        .collect();

    let mut data = Vec::with_capacity(depth * height * width);
    for row in rows {
        data.extend(row.ok_or(Error::Cancelled)?);
    }

    let descriptors = Array3::from_shape_vec((depth, height, width), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(FeatureVolume { descriptors, source: Some(volume.id()) })
}

fn descriptor_at(data: &Array3<f64>, z: usize, y: usize, x: usize) -> TextureDescriptor {
    let centre = data[(z, y, x)];
    let (z, y, x) = (z as isize, y as isize, x as isize);
    // XY: rows along y, cols along x
    let xy = ring_bits(|dr, dc| sample(data, z, y + dr, x + dc), centre);
    // XZ: rows along z, cols along x
    let xz = ring_bits(|dr, dc| sample(data, z + dr, y, x + dc), centre);
    // YZ: rows along z, cols along y
    let yz = ring_bits(|dr, dc| sample(data, z + dr, y + dc, x), centre);
    [lbp_code(xy) as f32, lbp_code(xz) as f32, lbp_code(yz) as f32]
}

fn sample(data: &Array3<f64>, z: isize, y: isize, x: isize) -> Option<f64> {
    if z < 0 || y < 0 || x < 0 {
        return None;
    }
    data.get((z as usize, y as usize, x as usize)).copied()
}

fn ring_bits(at: impl Fn(isize, isize) -> Option<f64>, centre: f64) -> u8 {
    RING.iter().enumerate().fold(0u8, |bits, (i, &(dr, dc))| match at(dr, dc) {
        Some(v) if v >= centre => bits | (1 << i),
        _ => bits,
    })
}

/// Rotation-invariant uniform code of an 8-bit ring.
pub fn lbp_code(bits: u8) -> u8 {
    let transitions = (bits ^ bits.rotate_right(1)).count_ones();
    if transitions <= 2 {
        bits.count_ones() as u8
    } else {
        NON_UNIFORM
    }
}

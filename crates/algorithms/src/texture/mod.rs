//! Texture feature extraction
//!
//! - **LBP**: per-voxel rotation-invariant uniform local binary patterns,
//!   one code per orthogonal plane, stored as a [`FeatureVolume`]

mod lbp;

pub use lbp::{
    extract_features, lbp_code, FeatureParams, FeatureVolume, TextureDescriptor, TextureFeatures,
    DESCRIPTOR_LEN,
};

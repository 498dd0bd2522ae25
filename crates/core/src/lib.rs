//! # voxseg core
//!
//! Core types shared by the voxseg crates.
//!
//! This crate provides:
//! - `Volume<T>`: generic 3D scalar grid with spacing and display window
//! - `Orientation`: axial / coronal / sagittal slice addressing
//! - `Connectivity2D` / `Connectivity3D`: neighbourhood offsets
//! - `CancelToken`: cooperative cancellation for long kernels
//! - Algorithm trait for a consistent kernel API

pub mod cancel;
pub mod error;
pub mod volume;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use volume::{
    Connectivity2D, Connectivity3D, Orientation, Spacing, Volume, VolumeId, VoxelElement,
    WindowLevel,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::error::{Error, Result};
    pub use crate::volume::{
        Connectivity2D, Connectivity3D, Orientation, Spacing, Volume, VolumeId, VoxelElement,
        WindowLevel,
    };
    pub use crate::Algorithm;
}

/// Core trait for volumetric kernels.
///
/// Kernels are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

//! Volume data structures and voxel addressing

mod connectivity;
mod element;
mod grid;
mod orientation;
mod window;

pub use connectivity::{neighbor, Connectivity2D, Connectivity3D};
pub use element::VoxelElement;
pub use grid::{Spacing, Volume, VolumeId};
pub use orientation::Orientation;
pub use window::WindowLevel;

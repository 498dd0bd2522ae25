//! Intensity preprocessing filters
//!
//! - **Window**: display window/level lookup to 0..=255, or shift-to-zero
//! - **Gaussian**: separable isotropic low-pass filter

mod gaussian;
mod window;

pub use gaussian::{gaussian_filter, Gaussian, GaussianParams};
pub use window::{apply_window, preprocess_intensity, shift_intensity};

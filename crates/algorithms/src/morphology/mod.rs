//! Grey-level mathematical morphology on volumes
//!
//! - **Erosion**: minimum filter over a structuring element
//! - **Dilation**: maximum filter over a structuring element
//! - **Gradient**: dilation minus erosion, the relief watershed floods

mod dilate;
mod element;
mod erode;
mod gradient;
mod rank;

pub use dilate::{dilate, Dilate, DilateParams};
pub use element::StructuringElement;
pub use erode::{erode, Erode, ErodeParams};
pub use gradient::{gradient, Gradient, GradientParams};

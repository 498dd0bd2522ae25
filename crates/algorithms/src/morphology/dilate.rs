//! Morphological dilation (maximum filter)
//!
//! Replaces each voxel with the maximum value in its structuring element
//! neighborhood. Enlarges bright regions and shrinks dark regions.

use ndarray::Array3;
use voxseg_core::{Algorithm, Error, Result};

use super::element::StructuringElement;
use super::rank::{extremum_filter, Extremum};

/// Parameters for morphological dilation
#[derive(Debug, Clone, Default)]
pub struct DilateParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Dilation algorithm
#[derive(Debug, Clone, Default)]
pub struct Dilate;

impl Algorithm for Dilate {
    type Input = Array3<f64>;
    type Output = Array3<f64>;
    type Params = DilateParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Dilate"
    }

    fn description(&self) -> &'static str {
        "Morphological dilation (maximum filter over structuring element)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        dilate(&input, &params.element)
    }
}

/// Perform morphological dilation on a volume
///
/// # Arguments
/// * `input` - Input intensities in (z, y, x) order
/// * `element` - Structuring element defining the neighborhood shape
pub fn dilate(input: &Array3<f64>, element: &StructuringElement) -> Result<Array3<f64>> {
    extremum_filter(input, element, Extremum::Max)
}

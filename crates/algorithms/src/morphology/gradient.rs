//! Morphological gradient (dilation minus erosion)
//!
//! Highlights edges and boundaries by computing the difference between
//! the dilation and erosion of the input. The result is always non-negative
//! and forms the relief that marker watershed floods.

use ndarray::{Array3, Zip};
use voxseg_core::{Algorithm, Error, Result};

use super::dilate::dilate;
use super::element::StructuringElement;
use super::erode::erode;

/// Parameters for morphological gradient
#[derive(Debug, Clone, Default)]
pub struct GradientParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Morphological gradient algorithm
#[derive(Debug, Clone, Default)]
pub struct Gradient;

impl Algorithm for Gradient {
    type Input = Array3<f64>;
    type Output = Array3<f64>;
    type Params = GradientParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "MorphologicalGradient"
    }

    fn description(&self) -> &'static str {
        "Morphological gradient (dilation minus erosion) for edge detection"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        gradient(&input, &params.element)
    }
}

/// Compute the morphological gradient of a volume
///
/// # Arguments
/// * `input` - Input intensities in (z, y, x) order
/// * `element` - Structuring element defining the neighborhood shape
pub fn gradient(input: &Array3<f64>, element: &StructuringElement) -> Result<Array3<f64>> {
    let mut dilated = dilate(input, element)?;
    let eroded = erode(input, element)?;
    Zip::from(&mut dilated).and(&eroded).for_each(|d, &e| *d -= e);
    Ok(dilated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_uniform_is_zero() {
        let input = Array3::from_elem((5, 5, 5), 5.0);
        let result = gradient(&input, &StructuringElement::Cube(1)).unwrap();
        assert!(result.iter().all(|v| v.abs() < 1e-10));
    }

    #[test]
    fn test_gradient_detects_edge() {
        // Step along x: left half = 5, right half = 15
        let input = Array3::from_shape_fn((5, 5, 8), |(_, _, x)| if x < 4 { 5.0 } else { 15.0 });
        let result = gradient(&input, &StructuringElement::Cube(1)).unwrap();
        assert!((result[(2, 2, 3)] - 10.0).abs() < 1e-10);
        assert!((result[(2, 2, 4)] - 10.0).abs() < 1e-10);
        assert!(result[(2, 2, 1)].abs() < 1e-10);
    }

    #[test]
    fn test_gradient_non_negative() {
        let input = Array3::from_shape_fn((6, 6, 6), |(z, y, x)| ((z * 5 + y * 7 + x * 3) % 20) as f64);
        let result = gradient(&input, &StructuringElement::Square(1)).unwrap();
        assert!(result.iter().all(|v| *v >= -1e-10));
    }
}

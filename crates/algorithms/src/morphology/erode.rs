//! Morphological erosion (minimum filter)
//!
//! Replaces each voxel with the minimum value in its structuring element
//! neighborhood. Shrinks bright regions and enlarges dark regions.

use ndarray::Array3;
use voxseg_core::{Algorithm, Error, Result};

use super::element::StructuringElement;
use super::rank::{extremum_filter, Extremum};

/// Parameters for morphological erosion
#[derive(Debug, Clone, Default)]
pub struct ErodeParams {
    /// Structuring element shape
    pub element: StructuringElement,
}

/// Erosion algorithm
#[derive(Debug, Clone, Default)]
pub struct Erode;

impl Algorithm for Erode {
    type Input = Array3<f64>;
    type Output = Array3<f64>;
    type Params = ErodeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Erode"
    }

    fn description(&self) -> &'static str {
        "Morphological erosion (minimum filter over structuring element)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        erode(&input, &params.element)
    }
}

/// Perform morphological erosion on a volume
pub fn erode(input: &Array3<f64>, element: &StructuringElement) -> Result<Array3<f64>> {
    extremum_filter(input, element, Extremum::Min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erode_picks_minimum() {
        let mut input = Array3::from_elem((5, 5, 5), 5.0);
        input[(2, 3, 2)] = -4.0;
        let result = erode(&input, &StructuringElement::Cube(1)).unwrap();
        assert_eq!(result[(2, 2, 2)], -4.0);
        assert_eq!(result[(0, 0, 0)], 5.0);
    }

    #[test]
    fn test_erode_via_algorithm_trait() {
        let mut input = Array3::from_elem((3, 3, 3), 2.0);
        input[(1, 1, 1)] = 0.0;
        let result = Erode.execute_default(input).unwrap();
        assert_eq!(result[(0, 0, 0)], 0.0);
        assert_eq!(Erode.name(), "Erode");
    }
}

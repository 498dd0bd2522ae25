//! Structuring element definitions for morphological operations
//!
//! A structuring element defines the neighborhood shape used in
//! erosion, dilation, and derived transforms. Planar elements have
//! `dz = 0` everywhere and are used for slice-scoped work.

use ndarray::Array3;
use voxseg_core::{Error, Result};

/// Shape of a structuring element for morphological operations
#[derive(Debug, Clone, PartialEq)]
pub enum StructuringElement {
    /// In-plane square of given radius (side = 2*radius + 1)
    Square(usize),
    /// Cube of given radius (side = 2*radius + 1)
    Cube(usize),
    /// 3D cross (face neighbours along each axis) of given radius
    Cross(usize),
    /// Ball of given radius
    Ball(usize),
    /// User-provided boolean mask (odd extent on every axis)
    Custom(Array3<bool>),
}

impl Default for StructuringElement {
    fn default() -> Self {
        StructuringElement::Cube(1)
    }
}

impl StructuringElement {
    /// Element matching a morphological-gradient kernel size: a square for
    /// slice-scoped work, a cube for volume-scoped work.
    pub fn from_size(size: usize, planar: bool) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(Error::InvalidParameter {
                name: "size",
                value: size.to_string(),
                reason: "kernel size must be odd and at least 1".to_string(),
            });
        }
        let radius = size / 2;
        Ok(if planar {
            StructuringElement::Square(radius)
        } else {
            StructuringElement::Cube(radius)
        })
    }

    /// Validate the structuring element, returning an error for invalid configurations
    pub fn validate(&self) -> Result<()> {
        match self {
            StructuringElement::Custom(mask) => {
                let (d, h, w) = mask.dim();
                if mask.is_empty() || d % 2 == 0 || h % 2 == 0 || w % 2 == 0 {
                    return Err(Error::InvalidParameter {
                        name: "custom_mask",
                        value: format!("{}x{}x{}", d, h, w),
                        reason: "custom mask extents must be odd and non-zero".to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Compute (dz, dy, dx) offsets relative to center for all active cells
    pub fn offsets(&self) -> Vec<(isize, isize, isize)> {
        match self {
            StructuringElement::Square(r) => {
                let r = *r as isize;
                let mut offsets = Vec::new();
                for dy in -r..=r {
                    for dx in -r..=r {
                        offsets.push((0, dy, dx));
                    }
                }
                offsets
            }
            StructuringElement::Cube(r) => {
                let r = *r as isize;
                let mut offsets = Vec::new();
                for dz in -r..=r {
                    for dy in -r..=r {
                        for dx in -r..=r {
                            offsets.push((dz, dy, dx));
                        }
                    }
                }
                offsets
            }
            StructuringElement::Cross(r) => {
                let r = *r as isize;
                let mut offsets = vec![(0, 0, 0)];
                for d in (-r..=r).filter(|d| *d != 0) {
                    offsets.push((d, 0, 0));
                    offsets.push((0, d, 0));
                    offsets.push((0, 0, d));
                }
                offsets
            }
            StructuringElement::Ball(r) => {
                let r = *r as isize;
                let mut offsets = Vec::new();
                for dz in -r..=r {
                    for dy in -r..=r {
                        for dx in -r..=r {
                            if dz * dz + dy * dy + dx * dx <= r * r {
                                offsets.push((dz, dy, dx));
                            }
                        }
                    }
                }
                offsets
            }
            StructuringElement::Custom(mask) => {
                let (d, h, w) = mask.dim();
                let (cz, cy, cx) = ((d / 2) as isize, (h / 2) as isize, (w / 2) as isize);
                mask.indexed_iter()
                    .filter(|(_, active)| **active)
                    .map(|((z, y, x), _)| (z as isize - cz, y as isize - cy, x as isize - cx))
                    .collect()
            }
        }
    }
}

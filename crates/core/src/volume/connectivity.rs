//! Voxel connectivity patterns for region growing and flooding

use serde::{Deserialize, Serialize};

use super::Orientation;

/// In-plane connectivity for slice-scoped operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity2D {
    /// Edge neighbours only
    #[default]
    Four,
    /// Edge and corner neighbours
    Eight,
}

/// Connectivity for volume-scoped operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity3D {
    /// Face neighbours
    #[default]
    Six,
    /// Face and edge neighbours
    Eighteen,
    /// Face, edge and corner neighbours
    TwentySix,
}

impl Connectivity2D {
    /// Build from the neighbour count used by hosts (4 or 8)
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            4 => Some(Connectivity2D::Four),
            8 => Some(Connectivity2D::Eight),
            _ => None,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            Connectivity2D::Four => 4,
            Connectivity2D::Eight => 8,
        }
    }

    /// Neighbour offsets as (dz, dy, dx) with dz = 0, so slice-scoped work
    /// can run on a single-slice volume.
    pub fn offsets(self) -> Vec<(isize, isize, isize)> {
        let max_manhattan = match self {
            Connectivity2D::Four => 1,
            Connectivity2D::Eight => 2,
        };
        let mut offsets = Vec::new();
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let m = dy.abs() + dx.abs();
                if m != 0 && m <= max_manhattan {
                    offsets.push((0, dy, dx));
                }
            }
        }
        offsets
    }

    /// Offsets for the plane of `orientation`, with the slice axis held at 0
    pub fn offsets_in(self, orientation: Orientation) -> Vec<(isize, isize, isize)> {
        self.offsets()
            .into_iter()
            .map(|(_, dr, dc)| match orientation {
                Orientation::Axial => (0, dr, dc),
                Orientation::Coronal => (dr, 0, dc),
                Orientation::Sagittal => (dr, dc, 0),
            })
            .collect()
    }
}

impl Connectivity3D {
    /// Build from the neighbour count used by hosts (6, 18 or 26)
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            6 => Some(Connectivity3D::Six),
            18 => Some(Connectivity3D::Eighteen),
            26 => Some(Connectivity3D::TwentySix),
            _ => None,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            Connectivity3D::Six => 6,
            Connectivity3D::Eighteen => 18,
            Connectivity3D::TwentySix => 26,
        }
    }

    /// Rank of the structuring element: neighbours whose offset has at
    /// most this many non-zero components are connected.
    pub fn rank(self) -> usize {
        match self {
            Connectivity3D::Six => 1,
            Connectivity3D::Eighteen => 2,
            Connectivity3D::TwentySix => 3,
        }
    }

    /// Neighbour offsets as (dz, dy, dx), centre excluded
    pub fn offsets(self) -> Vec<(isize, isize, isize)> {
        let rank = self.rank();
        let mut offsets = Vec::with_capacity(self.count() as usize);
        for dz in -1isize..=1 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let nonzero = [dz, dy, dx].iter().filter(|d| **d != 0).count();
                    if nonzero != 0 && nonzero <= rank {
                        offsets.push((dz, dy, dx));
                    }
                }
            }
        }
        offsets
    }
}

/// Step from `(z, y, x)` by `offset`, returning `None` outside `shape`.
#[inline]
pub fn neighbor(
    voxel: (usize, usize, usize),
    offset: (isize, isize, isize),
    shape: (usize, usize, usize),
) -> Option<(usize, usize, usize)> {
    let z = voxel.0 as isize + offset.0;
    let y = voxel.1 as isize + offset.1;
    let x = voxel.2 as isize + offset.2;
    if z < 0 || y < 0 || x < 0 || z >= shape.0 as isize || y >= shape.1 as isize || x >= shape.2 as isize {
        None
    } else {
        Some((z as usize, y as usize, x as usize))
    }
}

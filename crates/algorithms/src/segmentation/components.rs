//! Connected-component labelling of binary volumes

use std::collections::VecDeque;

use ndarray::{Array3, ArrayView3};
use voxseg_core::volume::neighbor;

/// Labelled components of a binary volume
#[derive(Debug, Clone)]
pub struct Components {
    /// Component id per voxel, 0 for voxels outside every component
    pub labels: Array3<u32>,
    /// Voxel count per component; `sizes[id - 1]` belongs to component `id`
    pub sizes: Vec<usize>,
}

impl Components {
    pub fn count(&self) -> usize {
        self.sizes.len()
    }

    /// Voxel count of the component holding `voxel`, 0 if none does
    pub fn size_at(&self, voxel: (usize, usize, usize)) -> usize {
        match self.labels.get(voxel) {
            Some(&id) if id > 0 => self.sizes[id as usize - 1],
            _ => 0,
        }
    }
}

/// Label the connected `true` regions of `mask`.
///
/// Components are numbered from 1 in raster order of their first voxel.
pub fn label_components(mask: ArrayView3<'_, bool>, offsets: &[(isize, isize, isize)]) -> Components {
    let shape = mask.dim();
    let mut labels = Array3::<u32>::zeros(shape);
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for (start, &inside) in mask.indexed_iter() {
        if !inside || labels[start] != 0 {
            continue;
        }
        let id = sizes.len() as u32 + 1;
        labels[start] = id;
        queue.push_back(start);
        let mut size = 0usize;

        while let Some(voxel) = queue.pop_front() {
            size += 1;
            for &offset in offsets {
                if let Some(next) = neighbor(voxel, offset, shape) {
                    if mask[next] && labels[next] == 0 {
                        labels[next] = id;
                        queue.push_back(next);
                    }
                }
            }
        }
        sizes.push(size);
    }

    Components { labels, sizes }
}

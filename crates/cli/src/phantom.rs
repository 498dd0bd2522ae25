//! Synthetic test volumes

use std::f64::consts::PI;

use clap::ValueEnum;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voxseg_core::{Volume, WindowLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phantom {
    /// Bright ball of radius size/3 on a dark background
    Sphere,
    /// Schwarz P minimal surface, cos x + cos y + cos z > 0 is solid
    SchwarzP,
}

/// Solid and void intensities used by every phantom
pub const SOLID: i16 = 400;
pub const VOID: i16 = 0;

/// Build a `size`^3 phantom with uniform noise of amplitude `noise`.
pub fn generate(kind: Phantom, size: usize, periods: f64, noise: f64, seed: u64) -> Volume<i16> {
    let centre = (size as f64 - 1.0) / 2.0;
    let radius = size as f64 / 3.0;
    let scale = 2.0 * PI * periods / size as f64;
    let mut rng = StdRng::seed_from_u64(seed);

    let data = Array3::from_shape_fn((size, size, size), |(z, y, x)| {
        let solid = match kind {
            Phantom::Sphere => {
                let d2 = (z as f64 - centre).powi(2) + (y as f64 - centre).powi(2) + (x as f64 - centre).powi(2);
                d2 <= radius * radius
            }
            Phantom::SchwarzP => {
                (x as f64 * scale).cos() + (y as f64 * scale).cos() + (z as f64 * scale).cos() > 0.0
            }
        };
        let base = if solid { SOLID } else { VOID } as f64;
        let jitter = if noise > 0.0 { rng.gen_range(-noise..=noise) } else { 0.0 };
        (base + jitter).round() as i16
    });

    let mut volume = Volume::from_array(data);
    volume.set_window(Some(WindowLevel::new((SOLID - VOID) as f64 * 2.0, (SOLID + VOID) as f64 / 2.0)));
    volume
}

/// First voxel of the central axial slice on each side of the solid/void split
pub fn default_marks(volume: &Volume<i16>) -> (Option<(usize, usize, usize)>, Option<(usize, usize, usize)>) {
    let z = volume.depth() / 2;
    let threshold = (SOLID + VOID) / 2;
    let mut solid = None;
    let mut void = None;
    for y in 0..volume.height() {
        for x in 0..volume.width() {
            let Ok(v) = volume.get(z, y, x) else { continue };
            if v > threshold {
                // prefer the voxel nearest the slice centre for the solid mark
                let better = solid.is_none_or(|(_, sy, sx): (usize, usize, usize)| {
                    dist2((y, x), volume) < dist2((sy, sx), volume)
                });
                if better {
                    solid = Some((z, y, x));
                }
            } else if void.is_none() {
                void = Some((z, y, x));
            }
        }
    }
    (solid, void)
}

fn dist2(p: (usize, usize), volume: &Volume<i16>) -> usize {
    let (cy, cx) = (volume.height() / 2, volume.width() / 2);
    p.0.abs_diff(cy).pow(2) + p.1.abs_diff(cx).pow(2)
}

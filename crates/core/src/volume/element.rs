//! Voxel element trait for generic intensity values

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a volume voxel.
///
/// Scanner data usually arrives as `i16` (CT) or `u16` (MR); filters work
/// on `f64` copies, so every element must convert losslessly enough to `f64`.
pub trait VoxelElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Minimum value representable by this type
    fn min_value() -> Self;

    /// Maximum value representable by this type
    fn max_value() -> Self;

    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Convert self to f64
    fn as_f64(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }

    /// Convert from f64, saturating at the type bounds
    fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            return Self::zero();
        }
        let lo = Self::min_value().as_f64();
        let hi = Self::max_value().as_f64();
        let clamped = if Self::is_float() { value } else { value.round().clamp(lo, hi) };
        <Self as NumCast>::from(clamped).unwrap_or_else(Self::zero)
    }
}

macro_rules! impl_voxel_element_int {
    ($t:ty) => {
        impl VoxelElement for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            fn is_float() -> bool {
                false
            }
        }
    };
}

macro_rules! impl_voxel_element_float {
    ($t:ty) => {
        impl VoxelElement for $t {
            fn min_value() -> Self {
                <$t>::MIN
            }

            fn max_value() -> Self {
                <$t>::MAX
            }

            fn is_float() -> bool {
                true
            }
        }
    };
}

impl_voxel_element_int!(i8);
impl_voxel_element_int!(i16);
impl_voxel_element_int!(i32);
impl_voxel_element_int!(u8);
impl_voxel_element_int!(u16);
impl_voxel_element_int!(u32);
impl_voxel_element_float!(f32);
impl_voxel_element_float!(f64);

//! Integer voxel coordinates and physical voxel sizes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Index, Sub};

use crate::error::GtbotError;

/// A 3D point in the voxel units of some resolution level.
///
/// Serialized as a plain `[x, y, z]` array, matching the way viewer
/// payloads and cutout metadata store coordinates.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 3]", into = "[i64; 3]")]
pub struct Point3 {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Point3 {
    /// Creates a new point from its three components.
    #[inline]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// A point with the same value on every axis.
    #[inline]
    pub const fn splat(v: i64) -> Self {
        Self::new(v, v, v)
    }

    /// Converts floating-point viewer coordinates, truncating toward zero.
    #[inline]
    pub fn from_f64_trunc(coords: [f64; 3]) -> Self {
        Self::new(
            coords[0].trunc() as i64,
            coords[1].trunc() as i64,
            coords[2].trunc() as i64,
        )
    }

    #[inline]
    pub fn to_array(self) -> [i64; 3] {
        [self.x, self.y, self.z]
    }

    #[inline]
    pub fn to_f64(self) -> [f64; 3] {
        [self.x as f64, self.y as f64, self.z as f64]
    }

    /// Applies `f` to each axis.
    #[inline]
    pub fn map(self, mut f: impl FnMut(i64) -> i64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }

    /// Combines two points axis by axis.
    #[inline]
    pub fn zip_with(self, other: Self, mut f: impl FnMut(i64, i64) -> i64) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }

    /// Axis-wise sum, or `None` if any axis overflows.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(rhs.x)?,
            self.y.checked_add(rhs.y)?,
            self.z.checked_add(rhs.z)?,
        ))
    }

    /// Axis-wise difference, or `None` if any axis overflows.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        Some(Self::new(
            self.x.checked_sub(rhs.x)?,
            self.y.checked_sub(rhs.y)?,
            self.z.checked_sub(rhs.z)?,
        ))
    }

    /// Returns true if every component satisfies `pred`.
    #[inline]
    pub fn all(self, mut pred: impl FnMut(i64) -> bool) -> bool {
        pred(self.x) && pred(self.y) && pred(self.z)
    }
}

impl From<[i64; 3]> for Point3 {
    fn from(a: [i64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

impl From<Point3> for [i64; 3] {
    fn from(p: Point3) -> Self {
        p.to_array()
    }
}

impl Index<usize> for Point3 {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("axis {axis} out of range for Point3"),
        }
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl fmt::Debug for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point3({}, {}, {})", self.x, self.y, self.z)
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// Physical size of one voxel along each axis at a given resolution level.
///
/// Construction does not validate; the conversions in
/// [`mapper`](super::to_resolution) reject non-positive sizes with
/// [`GtbotError::InvalidResolution`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoxelSize(pub [f64; 3]);

impl VoxelSize {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    #[inline]
    pub fn axis(&self, axis: usize) -> f64 {
        self.0[axis]
    }

    /// Checks that every axis is finite and strictly positive.
    pub fn validate(&self) -> Result<(), GtbotError> {
        for (axis, v) in self.0.iter().enumerate() {
            if !v.is_finite() || *v <= 0.0 {
                return Err(GtbotError::InvalidResolution {
                    message: format!(
                        "voxel size {} has non-positive axis {} ({})",
                        self, axis, v
                    ),
                });
            }
        }
        Ok(())
    }

    /// Multiplies each axis by an integer downsampling factor.
    pub fn scaled(&self, factor: [u32; 3]) -> Self {
        Self([
            self.0[0] * factor[0] as f64,
            self.0[1] * factor[1] as f64,
            self.0[2] * factor[2] as f64,
        ])
    }
}

impl From<[f64; 3]> for VoxelSize {
    fn from(a: [f64; 3]) -> Self {
        Self(a)
    }
}

impl fmt::Display for VoxelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_arithmetic() {
        let a = Point3::new(10, 20, 30);
        let b = Point3::new(1, 2, 3);
        assert_eq!(a + b, Point3::new(11, 22, 33));
        assert_eq!(a - b, Point3::new(9, 18, 27));
        assert_eq!(a[2], 30);
    }

    #[test]
    fn test_point_truncates_toward_zero() {
        let p = Point3::from_f64_trunc([132840.5, -3.7, 3525.0]);
        assert_eq!(p, Point3::new(132840, -3, 3525));
    }

    #[test]
    fn test_point_serializes_as_array() {
        let json = serde_json::to_string(&Point3::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let back: Point3 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Point3::new(1, 2, 3));
    }

    #[test]
    fn test_voxel_size_validation() {
        assert!(VoxelSize::new(4.0, 4.0, 40.0).validate().is_ok());
        assert!(matches!(
            VoxelSize::new(4.0, 0.0, 40.0).validate(),
            Err(GtbotError::InvalidResolution { .. })
        ));
        assert!(VoxelSize::new(f64::NAN, 4.0, 40.0).validate().is_err());
    }

    #[test]
    fn test_voxel_size_scaled() {
        let mip2 = VoxelSize::new(4.0, 4.0, 40.0).scaled([4, 4, 1]);
        assert_eq!(mip2, VoxelSize::new(16.0, 16.0, 40.0));
    }
}

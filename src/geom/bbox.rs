//! Axis-aligned 3D bounding boxes.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::point::Point3;
use crate::error::GtbotError;

/// An axis-aligned box covering the half-open voxel range `[min, max)`.
///
/// Unlike viewer annotations, a `Box3` is always normalized: the
/// constructor orders each axis so that `min[i] <= max[i]`. A box may be
/// flat (zero width along some axis); such a box has zero volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "BoxCorners", into = "BoxCorners")]
pub struct Box3 {
    min: Point3,
    max: Point3,
}

#[derive(Serialize, Deserialize)]
struct BoxCorners {
    min: Point3,
    max: Point3,
}

impl From<BoxCorners> for Box3 {
    fn from(c: BoxCorners) -> Self {
        Box3::new(c.min, c.max)
    }
}

impl From<Box3> for BoxCorners {
    fn from(b: Box3) -> Self {
        BoxCorners {
            min: b.min,
            max: b.max,
        }
    }
}

impl Box3 {
    /// Creates a box from two corners in any order.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: a.zip_with(b, i64::min),
            max: a.zip_with(b, i64::max),
        }
    }

    /// Builds the box spanned by two annotation corners.
    ///
    /// `from_corners(a, b) == from_corners(b, a)` for any pair.
    #[inline]
    pub fn from_corners(a: Point3, b: Point3) -> Self {
        Self::new(a, b)
    }

    /// Builds a box of extent `size` centered on `center`.
    ///
    /// `min = center - size / 2` (floor division) and `max = min + size`.
    pub fn from_center_and_size(center: Point3, size: Point3) -> Result<Self, GtbotError> {
        if !size.all(|s| s > 0) {
            return Err(GtbotError::InvalidDimensions {
                message: format!("box size {} must be positive on every axis", size),
            });
        }
        let overflow = || GtbotError::InvalidDimensions {
            message: format!("box of size {} around {} overflows the coordinate range", size, center),
        };
        let min = center
            .checked_sub(size.map(|s| s.div_euclid(2)))
            .ok_or_else(overflow)?;
        let max = min.checked_add(size).ok_or_else(overflow)?;
        Ok(Self::new(min, max))
    }

    /// Expands a point annotation into a box of the configured span.
    #[inline]
    pub fn from_point_and_dim(point: Point3, dim: Point3) -> Result<Self, GtbotError> {
        Self::from_center_and_size(point, dim)
    }

    /// Reads the `[x0, y0, z0, x1, y1, z1]` list used by cutout metadata.
    pub fn from_flat(values: [i64; 6]) -> Self {
        Self::new(
            Point3::new(values[0], values[1], values[2]),
            Point3::new(values[3], values[4], values[5]),
        )
    }

    pub fn to_flat(&self) -> [i64; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    #[inline]
    pub fn min(&self) -> Point3 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> Point3 {
        self.max
    }

    /// Extent along each axis, saturating at `i64::MAX`.
    #[inline]
    pub fn size(&self) -> Point3 {
        self.max.zip_with(self.min, i64::saturating_sub)
    }

    /// Number of voxels inside the box, saturating at `i64::MAX`.
    pub fn volume(&self) -> i64 {
        self.checked_volume().unwrap_or(i64::MAX)
    }

    /// Number of voxels inside the box, or `None` if it does not fit in an
    /// `i64`.
    pub fn checked_volume(&self) -> Option<i64> {
        let s = self.max.checked_sub(self.min)?;
        s.x.checked_mul(s.y)?.checked_mul(s.z)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volume() == 0
    }

    /// The box center under the same floor rule used by
    /// [`from_center_and_size`](Self::from_center_and_size).
    pub fn center(&self) -> Point3 {
        self.min + self.size().map(|s| s.div_euclid(2))
    }

    /// Returns true if `p` lies in `[min, max)`.
    pub fn contains_point(&self, p: Point3) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] < self.max[i])
    }

    /// Returns true if `other` lies entirely inside this box.
    pub fn contains(&self, other: &Box3) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && other.max[i] <= self.max[i])
    }

    /// The overlap of two boxes, or `None` when they share no voxel.
    pub fn intersection(&self, other: &Box3) -> Option<Box3> {
        let min = self.min.zip_with(other.min, i64::max);
        let max = self.max.zip_with(other.max, i64::min);
        if (0..3).all(|i| min[i] < max[i]) {
            Some(Box3 { min, max })
        } else {
            None
        }
    }

    /// Shifts the box by `offset`.
    pub fn translate(&self, offset: Point3) -> Box3 {
        Box3 {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Expresses the box relative to `origin`, e.g. the corner of a cutout.
    pub fn relative_to(&self, origin: Point3) -> Box3 {
        Box3 {
            min: self.min - origin,
            max: self.max - origin,
        }
    }

    /// Dilates the box by `pad` on both sides of every axis.
    pub fn with_padding(&self, pad: Point3) -> Result<PaddedBox3, GtbotError> {
        if !pad.all(|p| p >= 0) {
            return Err(GtbotError::InvalidDimensions {
                message: format!("padding {} must be non-negative", pad),
            });
        }
        let overflow = || GtbotError::InvalidDimensions {
            message: format!("padding {} around {} overflows the coordinate range", pad, self),
        };
        Ok(PaddedBox3 {
            inner: *self,
            outer: Box3 {
                min: self.min.checked_sub(pad).ok_or_else(overflow)?,
                max: self.max.checked_add(pad).ok_or_else(overflow)?,
            },
        })
    }

    /// Array index ranges for this box, or `None` if any corner is negative.
    pub fn index_ranges(&self) -> Option<[Range<usize>; 3]> {
        if !self.min.all(|v| v >= 0) {
            return None;
        }
        let r = |i: usize| self.min[i] as usize..self.max[i] as usize;
        Some([r(0), r(1), r(2)])
    }
}

impl std::fmt::Display for Box3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.min, self.max)
    }
}

/// A requested region together with the context read around it.
///
/// `inner` is the region a user asked for; `outer` is `inner` dilated by a
/// non-negative padding, so `outer` always contains `inner`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaddedBox3 {
    inner: Box3,
    outer: Box3,
}

impl PaddedBox3 {
    #[inline]
    pub fn inner(&self) -> Box3 {
        self.inner
    }

    #[inline]
    pub fn outer(&self) -> Box3 {
        self.outer
    }

    /// Padding applied on the low side of each axis.
    pub fn pad(&self) -> Point3 {
        self.inner.min - self.outer.min
    }

    /// The inner box in the index space of an array read for `outer`.
    pub fn local_inner(&self) -> Box3 {
        self.inner.relative_to(self.outer.min)
    }

    /// Pairs two boxes that were mapped independently to another resolution.
    ///
    /// Truncation can shrink the padding to zero but never invert it, so the
    /// pair is accepted as long as `outer` still contains `inner`.
    pub fn from_mapped(inner: Box3, outer: Box3) -> Result<Self, GtbotError> {
        if !outer.contains(&inner) {
            return Err(GtbotError::InvalidDimensions {
                message: format!("outer box {} does not contain inner box {}", outer, inner),
            });
        }
        Ok(Self { inner, outer })
    }
}

//! Conversion of coordinates between resolution levels.
//!
//! Annotations are authored in the voxel units of the layer that displays
//! them, while reads against a volume happen in the units of one of its
//! resolution levels. Every conversion goes through this module so that all
//! callers share one truncation policy.

use super::{Box3, Point3, VoxelSize};
use crate::error::GtbotError;

/// Maps `point` from voxel size `from` to voxel size `to`.
///
/// Each axis becomes `trunc(point[i] * from[i] / to[i])`.
///
/// # Errors
/// - [`GtbotError::InvalidResolution`] if either voxel size has a
///   non-positive or non-finite axis.
/// - [`GtbotError::InvalidDimensions`] if the mapped point does not fit in
///   `i64` coordinates.
pub fn to_resolution(
    point: Point3,
    from: VoxelSize,
    to: VoxelSize,
) -> Result<Point3, GtbotError> {
    from.validate()?;
    to.validate()?;
    map_point(point, from, to)
}

/// Maps both corners of `bbox` independently.
///
/// A result that collapses to zero width on some axis is legal.
pub fn box_to_resolution(bbox: &Box3, from: VoxelSize, to: VoxelSize) -> Result<Box3, GtbotError> {
    from.validate()?;
    to.validate()?;
    Ok(Box3::new(
        map_point(bbox.min(), from, to)?,
        map_point(bbox.max(), from, to)?,
    ))
}

/// Integer downsampling factor from `fine` to `coarse`, per axis.
///
/// Returns `InvalidResolution` unless `coarse` is an integer multiple of
/// `fine` along every axis.
pub fn scale_factor(fine: VoxelSize, coarse: VoxelSize) -> Result<[u32; 3], GtbotError> {
    fine.validate()?;
    coarse.validate()?;
    let mut factor = [1u32; 3];
    for (axis, f) in factor.iter_mut().enumerate() {
        let ratio = coarse.axis(axis) / fine.axis(axis);
        let rounded = ratio.round();
        if rounded < 1.0 || (ratio - rounded).abs() > 1e-6 {
            return Err(GtbotError::InvalidResolution {
                message: format!(
                    "{} is not an integer downsampling of {} along axis {}",
                    coarse, fine, axis
                ),
            });
        }
        *f = rounded as u32;
    }
    Ok(factor)
}

fn map_point(point: Point3, from: VoxelSize, to: VoxelSize) -> Result<Point3, GtbotError> {
    let p = point.to_f64();
    // Multiply before dividing so that integral results stay exact.
    let axis = |i: usize| {
        let v = ((p[i] * from.axis(i)) / to.axis(i)).trunc();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range.
        if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Ok(v as i64)
        } else {
            Err(GtbotError::InvalidDimensions {
                message: format!("{} at {} does not fit the coordinate range at {}", point, from, to),
            })
        }
    };
    Ok(Point3::new(axis(0)?, axis(1)?, axis(2)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIP0: VoxelSize = VoxelSize::new(4.0, 4.0, 40.0);
    const MIP1: VoxelSize = VoxelSize::new(8.0, 8.0, 40.0);

    #[test]
    fn test_to_coarser_resolution() {
        let p = to_resolution(Point3::new(133197, 35151, 3525), MIP0, MIP1).unwrap();
        assert_eq!(p, Point3::new(66598, 17575, 3525));
    }

    #[test]
    fn test_to_finer_resolution() {
        let p = to_resolution(Point3::new(10, 11, 12), MIP1, MIP0).unwrap();
        assert_eq!(p, Point3::new(20, 22, 12));
    }

    #[test]
    fn test_truncates_toward_zero_for_negative_coordinates() {
        let p = to_resolution(Point3::new(-5, 5, 0), MIP0, MIP1).unwrap();
        assert_eq!(p, Point3::new(-2, 2, 0));
    }

    #[test]
    fn test_exact_for_non_dyadic_ratios() {
        let from = VoxelSize::new(4.0, 4.0, 4.0);
        let to = VoxelSize::new(40.0, 40.0, 40.0);
        let p = to_resolution(Point3::new(30, 400, 7), from, to).unwrap();
        assert_eq!(p, Point3::new(3, 40, 0));
    }

    #[test]
    fn test_rejects_non_positive_target() {
        let err = to_resolution(Point3::splat(1), MIP0, VoxelSize::new(8.0, 0.0, 40.0));
        assert!(matches!(err, Err(GtbotError::InvalidResolution { .. })));
        assert!(to_resolution(Point3::splat(1), MIP0, VoxelSize::new(-8.0, 8.0, 40.0)).is_err());
    }

    #[test]
    fn test_box_may_degenerate() {
        let b = Box3::new(Point3::new(0, 0, 0), Point3::new(1, 1, 1));
        let coarse = box_to_resolution(&b, MIP0, VoxelSize::new(16.0, 16.0, 40.0)).unwrap();
        assert!(coarse.is_empty());
    }

    #[test]
    fn test_out_of_range_result_is_rejected() {
        let far = Point3::new(i64::MAX / 2, 0, 0);
        let err = to_resolution(far, MIP1, MIP0).unwrap_err();
        assert!(matches!(err, GtbotError::InvalidDimensions { .. }));

        let b = Box3::new(Point3::splat(0), far);
        assert!(box_to_resolution(&b, MIP1, MIP0).is_err());
        assert!(box_to_resolution(&b, MIP0, MIP1).is_ok());
    }

    #[test]
    fn test_scale_factor() {
        assert_eq!(scale_factor(MIP0, MIP1).unwrap(), [2, 2, 1]);
        assert!(scale_factor(MIP0, VoxelSize::new(6.0, 8.0, 40.0)).is_err());
        assert!(scale_factor(MIP1, MIP0).is_err());
    }
}

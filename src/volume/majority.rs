//! Segment lookup inside a sub-box of a label volume.

use std::collections::{BTreeMap, HashMap};

use ndarray::{s, ArrayView3};
use serde::Serialize;

use super::Voxel;
use crate::error::GtbotError;
use crate::geom::{Box3, Point3};

/// A segment found inside a queried box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LabeledPoint {
    /// Segment id; never 0.
    pub label: u64,
    /// Number of voxels carrying `label` inside the box.
    pub voxel_count: u64,
    /// First voxel of the segment in x-major scan order.
    pub point: Point3,
}

impl LabeledPoint {
    /// Moves the representative point by `offset`, e.g. from cutout-local
    /// to absolute coordinates.
    pub fn translate(self, offset: Point3) -> Self {
        Self {
            point: self.point + offset,
            ..self
        }
    }
}

/// Lists the segments inside `bbox`, largest first.
///
/// `bbox` is in the index space of `volume`. Voxels are scanned in x-major
/// order (x outermost, z innermost), so the flat offset of voxel
/// `(ix, iy, iz)` within the box is `(ix * ny + iy) * nz + iz`. The first
/// voxel of each label in that order becomes its representative point,
/// reported in `volume` coordinates.
///
/// Labels covering fewer than `min_voxel_count` voxels are dropped, label 0
/// is never returned, and ties in size are broken by ascending label.
///
/// # Errors
/// - [`GtbotError::EmptyBox`] if `bbox` has zero volume.
/// - [`GtbotError::InvalidDimensions`] if `bbox` is not inside `volume`.
pub fn labels_in_box<T: Voxel>(
    volume: ArrayView3<'_, T>,
    bbox: &Box3,
    min_voxel_count: u64,
) -> Result<Vec<LabeledPoint>, GtbotError> {
    if bbox.is_empty() {
        return Err(GtbotError::EmptyBox { bbox: *bbox });
    }

    let (nx, ny, nz) = volume.dim();
    let extent = Box3::new(Point3::splat(0), Point3::new(nx as i64, ny as i64, nz as i64));
    let [rx, ry, rz] = match bbox.index_ranges() {
        Some(ranges) if extent.contains(bbox) => ranges,
        _ => {
            return Err(GtbotError::InvalidDimensions {
                message: format!("query box {} exceeds volume extent {}", bbox, extent),
            })
        }
    };

    let window = volume.slice(s![rx, ry, rz]);
    let (_, wy, wz) = window.dim();

    // label -> (voxel count, flat index of first occurrence)
    let mut stats: HashMap<u64, (u64, usize)> = HashMap::new();
    for (flat, voxel) in window.iter().enumerate() {
        let label = voxel.to_label();
        if label == 0 {
            continue;
        }
        stats
            .entry(label)
            .and_modify(|entry| entry.0 += 1)
            .or_insert((1, flat));
    }

    let mut ranked: Vec<LabeledPoint> = stats
        .into_iter()
        .filter(|(_, (count, _))| *count >= min_voxel_count)
        .map(|(label, (voxel_count, first))| {
            let offset = unflatten(first, wy, wz);
            LabeledPoint {
                label,
                voxel_count,
                point: bbox.min() + offset,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.voxel_count
            .cmp(&a.voxel_count)
            .then(a.label.cmp(&b.label))
    });
    Ok(ranked)
}

/// Voxel count of every non-zero label in `volume`.
pub fn segment_sizes<T: Voxel>(volume: ArrayView3<'_, T>) -> BTreeMap<u64, u64> {
    let mut sizes = BTreeMap::new();
    for voxel in volume.iter() {
        let label = voxel.to_label();
        if label != 0 {
            *sizes.entry(label).or_insert(0) += 1;
        }
    }
    sizes
}

fn unflatten(flat: usize, ny: usize, nz: usize) -> Point3 {
    let iz = flat % nz;
    let iy = (flat / nz) % ny;
    let ix = flat / (nz * ny);
    Point3::new(ix as i64, iy as i64, iz as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 10x10x10 volume holding 500 voxels of label 1, 50 of label 2 and 2 of
    /// label 3, laid out in scan order.
    fn three_label_volume() -> Array3<u32> {
        let mut volume = Array3::<u32>::zeros((10, 10, 10));
        for (i, v) in volume.iter_mut().enumerate() {
            *v = match i {
                0..=499 => 1,
                500..=549 => 2,
                550..=551 => 3,
                _ => 0,
            };
        }
        volume
    }

    fn whole(volume: &Array3<u32>) -> Box3 {
        let (nx, ny, nz) = volume.dim();
        Box3::new(Point3::splat(0), Point3::new(nx as i64, ny as i64, nz as i64))
    }

    #[test]
    fn test_threshold_and_order() {
        let volume = three_label_volume();
        let bbox = whole(&volume);
        let labels = labels_in_box(volume.view(), &bbox, 10).unwrap();

        let ids: Vec<u64> = labels.iter().map(|l| l.label).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(labels[0].voxel_count, 500);
        assert_eq!(labels[1].voxel_count, 50);
        for l in &labels {
            assert!(bbox.contains_point(l.point));
            assert_eq!(volume[[l.point.x as usize, l.point.y as usize, l.point.z as usize]] as u64, l.label);
        }
    }

    #[test]
    fn test_representative_is_first_in_x_major_order() {
        let volume = three_label_volume();
        let labels = labels_in_box(volume.view(), &whole(&volume), 1).unwrap();
        assert_eq!(labels[0].point, Point3::new(0, 0, 0));
        // flat index 500 -> x = 5, y = 0, z = 0
        assert_eq!(labels[1].point, Point3::new(5, 0, 0));
        // flat index 550 -> x = 5, y = 5, z = 0
        assert_eq!(labels[2].point, Point3::new(5, 5, 0));
    }

    #[test]
    fn test_sub_box_points_are_in_volume_coordinates() {
        let mut volume = Array3::<u32>::zeros((8, 8, 8));
        volume[[6, 5, 4]] = 9;
        volume[[6, 5, 5]] = 9;
        let bbox = Box3::new(Point3::new(4, 4, 4), Point3::new(8, 8, 8));
        let labels = labels_in_box(volume.view(), &bbox, 1).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].point, Point3::new(6, 5, 4));
        assert_eq!(labels[0].voxel_count, 2);
    }

    #[test]
    fn test_never_returns_zero() {
        let volume = Array3::<u32>::zeros((4, 4, 4));
        let labels = labels_in_box(volume.view(), &whole(&volume), 0).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_ties_break_by_ascending_label() {
        let mut volume = Array3::<u32>::zeros((2, 1, 1));
        volume[[0, 0, 0]] = 12;
        volume[[1, 0, 0]] = 4;
        let labels = labels_in_box(volume.view(), &whole(&volume), 1).unwrap();
        let ids: Vec<u64> = labels.iter().map(|l| l.label).collect();
        assert_eq!(ids, vec![4, 12]);
    }

    #[test]
    fn test_empty_box_fails() {
        let volume = three_label_volume();
        let flat = Box3::new(Point3::new(0, 0, 3), Point3::new(10, 10, 3));
        assert!(matches!(
            labels_in_box(volume.view(), &flat, 1),
            Err(GtbotError::EmptyBox { .. })
        ));
    }

    #[test]
    fn test_box_outside_volume_fails() {
        let volume = three_label_volume();
        let bbox = Box3::new(Point3::new(5, 5, 5), Point3::new(11, 10, 10));
        assert!(matches!(
            labels_in_box(volume.view(), &bbox, 1),
            Err(GtbotError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_segment_sizes() {
        let volume = three_label_volume();
        let sizes = segment_sizes(volume.view());
        assert_eq!(sizes.into_iter().collect::<Vec<_>>(), vec![(1, 500), (2, 50), (3, 2)]);
    }
}

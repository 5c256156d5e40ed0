//! Moving volumes between a volumetric source and slice directories.
//!
//! [`read_window`] reads any box, filling what lies outside the source,
//! [`draw_wireframe`] marks the requested region inside a padded read, and
//! [`slices`] turns arrays into directories of 2-D images and back. The
//! [`workflow`] module composes these into the cutout and upload steps.

pub mod metadata;
pub mod report;
pub mod slices;
pub mod workflow;

use log::warn;
use ndarray::{s, Array3};

use crate::error::GtbotError;
use crate::geom::{Box3, Point3};
use crate::volume::{VolumeSource, Voxel};

pub use metadata::{CutoutMetadata, RawMetadata};
pub use report::{CutoutReport, UploadReport};
pub use slices::{from_slice_directory, to_slice_directory, SliceVoxel};
pub use workflow::{
    create_cutouts, locate_metadata, new_layer_info, upload_cutout, write_segment_sizes,
    LocatedCutout,
};

/// Largest window [`read_window`] allocates, in voxels.
pub const MAX_WINDOW_VOXELS: i64 = 1 << 30;

/// Reads exactly the voxels in `bbox` (absolute coordinates at `mip`).
///
/// The part of `bbox` outside the declared bounds of the level is filled
/// with [`VolumeSource::missing_value`]; only the in-bounds part is
/// requested from the source. A transient read failure is retried once.
///
/// # Errors
/// [`GtbotError::InvalidDimensions`] if `bbox` holds more than
/// [`MAX_WINDOW_VOXELS`] voxels.
pub fn read_window<T: Voxel>(
    source: &dyn VolumeSource<T>,
    bbox: &Box3,
    mip: usize,
) -> Result<Array3<T>, GtbotError> {
    let scale = source.scale(mip)?;
    match bbox.checked_volume() {
        Some(voxels) if voxels <= MAX_WINDOW_VOXELS => {}
        _ => {
            return Err(GtbotError::InvalidDimensions {
                message: format!(
                    "box {} at mip {} of {} exceeds {} voxels",
                    bbox,
                    mip,
                    source.identifier(),
                    MAX_WINDOW_VOXELS
                ),
            })
        }
    }
    let size = bbox.size();
    let mut window = Array3::from_elem(
        (size.x as usize, size.y as usize, size.z as usize),
        source.missing_value(),
    );

    let Some(inside) = bbox.intersection(&scale.bounds()) else {
        warn!(
            "box {} lies outside {} at mip {}, returning fill",
            bbox,
            source.identifier(),
            mip
        );
        return Ok(window);
    };

    let data = match source.read(&inside, mip) {
        Err(e) if e.is_transient() => {
            warn!("retrying read of {} after: {}", inside, e);
            source.read(&inside, mip)?
        }
        other => other?,
    };

    let (nx, ny, nz) = data.dim();
    if inside.size() != Point3::new(nx as i64, ny as i64, nz as i64) {
        return Err(GtbotError::InvalidDimensions {
            message: format!(
                "{} returned shape ({}, {}, {}) for box {}",
                source.identifier(),
                nx,
                ny,
                nz,
                inside
            ),
        });
    }

    if let Some([rx, ry, rz]) = inside.relative_to(bbox.min()).index_ranges() {
        window.slice_mut(s![rx, ry, rz]).assign(&data);
    }
    Ok(window)
}

/// Stamps the outline of `inner` (in the index space of `volume`).
///
/// On every z slice in `[min.z, max.z)` the one-voxel lines `x = min.x`,
/// `x = max.x`, `y = min.y` and `y = max.y` are painted across the
/// rectangle. The `max` lines fall just outside the half-open box. Lines
/// are clipped to the volume.
pub fn draw_wireframe<T: Copy>(volume: &mut Array3<T>, inner: &Box3, value: T) {
    let (nx, ny, nz) = volume.dim();
    let clip = |v: i64, n: usize| v.clamp(0, n as i64) as usize;
    let (lo, hi) = (inner.min(), inner.max());

    let xs = clip(lo.x, nx)..clip(hi.x + 1, nx);
    let ys = clip(lo.y, ny)..clip(hi.y + 1, ny);
    let zs = clip(lo.z, nz)..clip(hi.z, nz);
    if zs.is_empty() {
        return;
    }

    for x in [lo.x, hi.x] {
        if (0..nx as i64).contains(&x) {
            volume
                .slice_mut(s![x as usize, ys.clone(), zs.clone()])
                .fill(value);
        }
    }
    for y in [lo.y, hi.y] {
        if (0..ny as i64).contains(&y) {
            volume
                .slice_mut(s![xs.clone(), y as usize, zs.clone()])
                .fill(value);
        }
    }
}

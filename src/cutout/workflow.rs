//! The two halves of a proofreading round trip: cut boxes out of an image
//! volume into slice directories, and write edited slice directories back
//! into a fresh volume layer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use ndarray::s;
use serde::Serialize;

use super::metadata::{CutoutMetadata, RawMetadata};
use super::report::{CutoutReport, UploadReport};
use super::slices::{from_slice_directory, to_slice_directory, SliceVoxel};
use super::{draw_wireframe, read_window};
use crate::command::{bucket_url, safe_description, safe_string};
use crate::config::{Config, UploadConfig};
use crate::error::{GtbotError, Stage};
use crate::geom::{box_to_resolution, Box3, PaddedBox3, Point3, VoxelSize};
use crate::notify::Notifier;
use crate::payload::{Annotation, AnnotationPayload, IdGenerator};
use crate::volume::precomputed::ScaleInfo;
use crate::volume::{
    extent, segment_sizes, LayerKind, PrecomputedInfo, Scale, SourceOpener, VolumeSource,
};

/// Value of the outline drawn around the requested region.
pub const WIREFRAME_VALUE: u8 = 255;

/// File names tried, next to a slice directory, for its sidecar.
pub const METADATA_NAMES: [&str; 3] = ["metadata.json", "README.md", "raw/README.md"];

/// File name of the label histogram written after a segmentation upload.
pub const SEGMENT_CSV: &str = "segment_sizes.csv";

/// Cuts every box annotation of `payload` out of its first image layer.
///
/// Each box is padded by `config.cutout.pad` at mip 0, mapped to
/// `config.cutout.mip`, read (with fill outside the volume) and written as
/// `<prefix>/<author>/<name>/raw/NNN.<ext>` next to a `metadata.json`
/// sidecar. When the padding is non-zero the requested region is outlined
/// with [`WIREFRAME_VALUE`]. One report per box is returned and sent to
/// `notifier`.
pub fn create_cutouts(
    payload: &AnnotationPayload,
    opener: &dyn SourceOpener,
    config: &Config,
    author: &str,
    ids: &mut IdGenerator,
    notifier: &dyn Notifier,
) -> Result<Vec<CutoutReport>, GtbotError> {
    let image = payload.first_image_layer().ok_or(GtbotError::NoImageLayer)?;
    let identifier = image.source_path();

    let fallback = config.viewer.voxel_size;
    let boxes: Vec<(Box3, Option<String>, VoxelSize)> = payload
        .annotation_layers()
        .flat_map(|layer| {
            let resolution = payload.annotation_voxel_size(layer, fallback);
            layer.annotations.iter().filter_map(move |a| match a {
                Annotation::Box(b) => {
                    Some((b.voxel_box(), b.meta.description.clone(), resolution))
                }
                _ => None,
            })
        })
        .collect();
    if boxes.is_empty() {
        warn!("no box annotations in payload, nothing to cut out");
        return Ok(Vec::new());
    }

    let source = opener
        .open_image(identifier)
        .map_err(|e| e.at_stage(Stage::CutoutRead))?;
    let mip = config.cutout.mip;
    let base = source.scale(0)?.resolution;
    let target = source.scale(mip)?.resolution;
    let pad = config.cutout.pad;
    let owner = safe_string(author);

    let mut reports = Vec::with_capacity(boxes.len());
    for (bbox, description, resolution) in boxes {
        let requested = box_to_resolution(&bbox, resolution, base)?;
        let padded = requested.with_padding(pad)?;
        let mapped = PaddedBox3::from_mapped(
            box_to_resolution(&padded.inner(), base, target)?,
            box_to_resolution(&padded.outer(), base, target)?,
        )?;

        let mut volume = read_window(source.as_ref(), &mapped.outer(), mip)?;
        if pad != Point3::splat(0) {
            draw_wireframe(&mut volume, &mapped.local_inner(), WIREFRAME_VALUE);
        }

        let tag = ids.tag();
        let name = match description.as_deref().map(safe_description) {
            Some(d) if !d.is_empty() => format!("{}_{}", d, tag),
            _ => tag,
        };
        let directory = config.cutout.prefix.join(&owner).join(&name);
        let slices = to_slice_directory(volume.view(), &directory.join("raw"), &config.cutout.extension)?;

        let metadata = CutoutMetadata {
            raw: RawMetadata {
                pad,
                bbox: Some(requested.to_flat()),
                center: None,
                size: None,
                mip,
                user: author.to_string(),
                timestamp: Utc::now().to_rfc3339(),
                src_path: identifier.to_string(),
                dst_path: directory.display().to_string(),
            },
        };
        metadata.write(&directory.join(METADATA_NAMES[0]))?;

        let report = CutoutReport {
            name,
            bucket_path: bucket_url(&directory),
            directory,
            source: identifier.to_string(),
            bbox: requested.to_flat(),
            size: mapped.inner().size(),
            mip,
            pad,
            slices: slices.len(),
        };
        info!("cut out {} from {}", requested, identifier);
        notifier.notify(author, &report.to_string());
        reports.push(report);
    }
    Ok(reports)
}

/// A slice directory together with the sidecar describing it.
#[derive(Clone, Debug)]
pub struct LocatedCutout {
    pub slice_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: CutoutMetadata,
}

/// Finds the sidecar for a slice directory.
///
/// The names in [`METADATA_NAMES`] are tried in the parent of `path`.
/// Files that do not parse are skipped. If nothing is found, the search is
/// repeated for `path/export`.
pub fn locate_metadata(path: &Path) -> Result<LocatedCutout, GtbotError> {
    for slice_dir in [path.to_path_buf(), path.join("export")] {
        let Some(parent) = slice_dir.parent() else {
            continue;
        };
        for name in METADATA_NAMES {
            let candidate = parent.join(name);
            if !candidate.is_file() {
                continue;
            }
            match CutoutMetadata::read(&candidate) {
                Ok(metadata) => {
                    return Ok(LocatedCutout {
                        slice_dir,
                        metadata_path: candidate,
                        metadata,
                    })
                }
                Err(e) => warn!("skipping {}: {}", candidate.display(), e),
            }
        }
    }
    Err(GtbotError::MetadataNotFound {
        path: path.to_path_buf(),
    })
}

/// The `info` for a fresh layer that will receive an upload at `mip`.
///
/// Scale `i` has voxel size `config.resolution * [2^i, 2^i, 1]`. Its
/// bounds cover `inner` (mip 0): the offset is rounded down and the size
/// rounded up.
pub fn new_layer_info(
    kind: LayerKind,
    inner: &Box3,
    mip: usize,
    config: &UploadConfig,
) -> PrecomputedInfo {
    let scales = (0..=mip)
        .map(|i| {
            let f = 1i64 << i;
            let factor = [f as u32, f as u32, 1];
            let div = Point3::new(f, f, 1);
            let resolution = config.resolution.scaled(factor);
            let scale = Scale {
                key: Scale::key_for(resolution),
                resolution,
                voxel_offset: inner.min().zip_with(div, i64::div_euclid),
                size: inner.size().zip_with(div, |v, d| (v + d - 1).div_euclid(d)),
                chunk_size: config.chunk_size,
            };
            ScaleInfo::from(&scale)
        })
        .collect();

    PrecomputedInfo {
        kind,
        data_type: kind.data_type().to_string(),
        num_channels: 1,
        scales,
        mesh: match kind {
            LayerKind::Segmentation => Some(format!("mesh_mip_{}_err_0", mip)),
            LayerKind::Image => None,
        },
    }
}

/// Writes an edited slice directory back at the region its sidecar names.
///
/// The slice stack covers the padded region at the sidecar's mip. It is
/// cropped to the requested region and written there; padding is never
/// uploaded. Writes are not retried. Segmentation uploads also leave a
/// `segment_sizes.csv` histogram next to the slice directory.
pub fn upload_cutout<T: SliceVoxel>(
    located: &LocatedCutout,
    extension: &str,
    destination: &mut dyn VolumeSource<T>,
) -> Result<UploadReport, GtbotError> {
    let volume = from_slice_directory::<T>(&located.slice_dir, extension)?;
    let padded = located.metadata.padded_region(&located.metadata_path)?;
    let mip = located.metadata.raw.mip;

    let base = destination.scale(0)?.resolution;
    let target = destination.scale(mip)?.resolution;
    let mapped = PaddedBox3::from_mapped(
        box_to_resolution(&padded.inner(), base, target)?,
        box_to_resolution(&padded.outer(), base, target)?,
    )?;

    let local = mapped.local_inner();
    let stack = Box3::new(Point3::splat(0), extent(&volume));
    let ranges = stack
        .contains(&local)
        .then(|| local.index_ranges())
        .flatten()
        .ok_or_else(|| GtbotError::InvalidDimensions {
            message: format!(
                "slices in {} span {}, which does not hold region {}",
                located.slice_dir.display(),
                stack,
                local
            ),
        })?;
    let [rx, ry, rz] = ranges;
    let crop = volume.slice(s![rx, ry, rz]);

    let inner = mapped.inner();
    destination
        .write(&inner, mip, crop)
        .map_err(|e| e.at_stage(Stage::CutoutWrite))?;
    info!(
        "wrote {} from {} to {}",
        inner,
        located.slice_dir.display(),
        destination.identifier()
    );

    let (segments, segment_csv) = match T::KIND {
        LayerKind::Segmentation => {
            let sizes = segment_sizes(crop);
            let parent = located
                .slice_dir
                .parent()
                .unwrap_or(located.slice_dir.as_path());
            let path = parent.join(SEGMENT_CSV);
            write_segment_sizes(&path, sizes.iter().map(|(&id, &n)| (id, n)))?;
            (Some(sizes.len()), Some(path))
        }
        LayerKind::Image => (None, None),
    };

    Ok(UploadReport {
        source_dir: located.slice_dir.clone(),
        layer: destination.identifier().to_string(),
        kind: T::KIND,
        bbox: inner.to_flat(),
        mip,
        voxels_written: inner.volume() as u64,
        segments,
        segment_csv,
    })
}

#[derive(Serialize)]
struct SegmentRow {
    segment_id: u64,
    size: u64,
}

/// Writes `segment_id,size` rows with a header.
pub fn write_segment_sizes(
    path: &Path,
    sizes: impl IntoIterator<Item = (u64, u64)>,
) -> Result<(), GtbotError> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for (segment_id, size) in sizes {
        writer
            .serialize(SegmentRow { segment_id, size })
            .map_err(|source| GtbotError::SegmentCsvWrite {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer
        .into_inner()
        .map_err(|e| GtbotError::Io(e.into_error()))?
        .flush()?;
    Ok(())
}

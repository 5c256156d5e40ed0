//! The `metadata.json` sidecar written next to a slice directory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GtbotError;
use crate::geom::{Box3, PaddedBox3, Point3};

/// Top-level sidecar document. Only the `raw` section is defined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CutoutMetadata {
    pub raw: RawMetadata,
}

/// How a cutout was produced.
///
/// `bbox` is the requested region at mip 0 as `[x0, y0, z0, x1, y1, z1]`.
/// Hand-written sidecars may give `center` and `size` instead; when both
/// forms are present, `center`/`size` wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub pad: Point3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i64; 6]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Point3>,
    pub mip: usize,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub timestamp: String,
    pub src_path: String,
    #[serde(default)]
    pub dst_path: String,
}

impl CutoutMetadata {
    pub fn read(path: &Path) -> Result<Self, GtbotError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            GtbotError::MetadataParse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), GtbotError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
            GtbotError::MetadataWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// The requested region at mip 0. `path` names the sidecar in errors.
    pub fn region(&self, path: &Path) -> Result<Box3, GtbotError> {
        let raw = &self.raw;
        if let (Some(center), Some(size)) = (raw.center, raw.size) {
            return Box3::from_center_and_size(center, size);
        }
        raw.bbox
            .map(Box3::from_flat)
            .ok_or_else(|| GtbotError::MetadataInvalid {
                path: path.to_path_buf(),
                message: "cannot construct the bounding box: need 'bbox' or 'center' and 'size'"
                    .to_string(),
            })
    }

    /// The region dilated by the recorded padding, at mip 0.
    pub fn padded_region(&self, path: &Path) -> Result<PaddedBox3, GtbotError> {
        self.region(path)?.with_padding(self.raw.pad)
    }
}

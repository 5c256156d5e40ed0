//! Summaries of cutout and upload runs.
//!
//! Both report types print the message sent back to the requester and
//! serialize to JSON for the CLI's `--output json`.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::geom::Point3;
use crate::volume::LayerKind;

/// One box annotation written out as a slice directory.
#[derive(Clone, Debug, Serialize)]
pub struct CutoutReport {
    /// Directory name, `<description>_<tag>` or just the tag.
    pub name: String,
    /// Local directory holding `raw/` and `metadata.json`.
    pub directory: PathBuf,
    /// Location of `directory` inside the shared bucket, as a URL.
    pub bucket_path: String,
    /// Image layer the voxels came from.
    pub source: String,
    /// Requested region at mip 0, `[x0, y0, z0, x1, y1, z1]`.
    pub bbox: [i64; 6],
    /// Extent of the requested region at `mip`.
    pub size: Point3,
    pub mip: usize,
    pub pad: Point3,
    /// Number of slice images written.
    pub slices: usize,
}

impl fmt::Display for CutoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cutout volume `{}` created!", self.name)?;
        writeln!(f, "Bucket path: `{}`", self.bucket_path)?;
        writeln!(f, "Image layer: `{}`", self.source)?;
        writeln!(f, "Bounding box: `{:?}`", self.bbox)?;
        writeln!(f, "Size: `{}`", self.size)?;
        writeln!(f, "Mip level: `{}`", self.mip)?;
        writeln!(f, "Padding: `{}`", self.pad)
    }
}

/// A slice directory written back into a volume store.
#[derive(Clone, Debug, Serialize)]
pub struct UploadReport {
    pub source_dir: PathBuf,
    /// Destination layer location.
    pub layer: String,
    pub kind: LayerKind,
    /// Region written, at `mip`.
    pub bbox: [i64; 6],
    pub mip: usize,
    pub voxels_written: u64,
    /// Distinct non-zero labels, for segmentations.
    pub segments: Option<usize>,
    /// Histogram written next to the slices, for segmentations.
    pub segment_csv: Option<PathBuf>,
}

impl fmt::Display for UploadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LayerKind::Image => "image",
            LayerKind::Segmentation => "segmentation",
        };
        writeln!(
            f,
            "Uploaded {} from `{}` to `{}`",
            kind,
            self.source_dir.display(),
            self.layer
        )?;
        writeln!(
            f,
            "  {} voxels in {:?} at mip {}",
            self.voxels_written, self.bbox, self.mip
        )?;
        if let Some(count) = self.segments {
            write!(f, "  {} segment(s)", count)?;
            if let Some(csv) = &self.segment_csv {
                write!(f, ", sizes in `{}`", csv.display())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutout_message() {
        let report = CutoutReport {
            name: "soma_00ff00ff00ff00ff".to_string(),
            directory: PathBuf::from("./alice/soma_00ff00ff00ff00ff"),
            bucket_path: "./alice/soma_00ff00ff00ff00ff".to_string(),
            source: "gs://bucket/image".to_string(),
            bbox: [0, 0, 0, 512, 512, 16],
            size: Point3::new(256, 256, 16),
            mip: 1,
            pad: Point3::new(256, 256, 4),
            slices: 24,
        };
        let text = report.to_string();
        assert!(text.starts_with("Cutout volume `soma_00ff00ff00ff00ff` created!"));
        assert!(text.contains("Size: `[256, 256, 16]`"));
        assert!(text.contains("Mip level: `1`"));
    }

    #[test]
    fn test_upload_serializes() {
        let report = UploadReport {
            source_dir: PathBuf::from("cut/raw"),
            layer: "file:///tmp/seg".to_string(),
            kind: LayerKind::Segmentation,
            bbox: [0, 0, 0, 4, 4, 2],
            mip: 0,
            voxels_written: 32,
            segments: Some(2),
            segment_csv: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "segmentation");
        assert_eq!(json["segments"], 2);
        assert!(report.to_string().contains("2 segment(s)"));
    }
}

//! Runtime configuration.
//!
//! Every operation receives a [`Config`] explicitly. Defaults match the
//! parameters the bot was run with; a YAML file passed with `--config`
//! overrides any subset of them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GtbotError;
use crate::geom::{Point3, VoxelSize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cutout: CutoutConfig,
    pub bbox: BboxConfig,
    pub labels: LabelConfig,
    pub viewer: ViewerConfig,
    pub upload: UploadConfig,
    /// Seed for generated ids and tags; random when absent.
    pub seed: Option<u64>,
}

/// How cutouts are read and written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
    pub mip: usize,
    /// Context read around each box, in mip 0 voxels.
    pub pad: Point3,
    pub extension: String,
    /// Directory cutouts are written under.
    pub prefix: PathBuf,
}

/// Span used to expand point annotations into boxes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BboxConfig {
    pub dim: Point3,
}

/// Segment lookup inside derived boxes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub mode: LabelMode,
    pub mip: usize,
    pub min_voxel_count: u64,
    /// Name of the layer that receives labeled points.
    pub layer_name: String,
}

/// Whether box expansion also looks up segments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LabelMode {
    /// Never query the segmentation.
    Off,
    /// Query a visible segmentation layer when the payload has one.
    #[default]
    IfAvailable,
    /// Fail when the payload has no visible segmentation layer.
    Required,
}

/// The viewer and its state server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub host: String,
    /// Endpoint payloads are POSTed to; inline links are used when absent.
    pub state_server: Option<String>,
    /// Annotation voxel size when neither the layer nor the navigation
    /// pose records one.
    pub voxel_size: VoxelSize,
    pub timeout_secs: u64,
}

/// Destinations for uploaded cutouts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Prepended to `<bucket>/<author>/<tag>` to form a layer location.
    pub store_root: String,
    pub bucket: String,
    /// Bucket used by the `save` command.
    pub save_bucket: String,
    pub resolution: VoxelSize,
    pub chunk_size: Point3,
    pub default_author: String,
    /// Local mount under which bucket paths pasted in chat are resolved.
    pub workspace_prefix: Option<PathBuf>,
}

impl Default for CutoutConfig {
    fn default() -> Self {
        Self {
            mip: 1,
            pad: Point3::new(256, 256, 4),
            extension: "tif".to_string(),
            prefix: PathBuf::from("."),
        }
    }
}

impl Default for BboxConfig {
    fn default() -> Self {
        Self {
            dim: Point3::new(40920, 40920, 2048),
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            mode: LabelMode::IfAvailable,
            mip: 0,
            min_voxel_count: 100,
            layer_name: "segments".to_string(),
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            host: "https://neuromancer-seung-import.appspot.com".to_string(),
            state_server: Some("https://globalv1.daf-apis.com/nglstate/post".to_string()),
            voxel_size: VoxelSize::new(4.0, 4.0, 40.0),
            timeout_secs: 30,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            store_root: "gs://".to_string(),
            bucket: "gtbot".to_string(),
            save_bucket: "gtbot_perm".to_string(),
            resolution: VoxelSize::new(4.0, 4.0, 40.0),
            chunk_size: Point3::new(64, 64, 8),
            default_author: "gtbot".to_string(),
            workspace_prefix: None,
        }
    }
}

impl Config {
    /// Loads a YAML file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, GtbotError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|source| GtbotError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.viewer.timeout_secs)
    }
}

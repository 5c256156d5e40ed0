//! Client for the chunked "precomputed" volume layout.
//!
//! A volume is an `info` JSON document plus one object per chunk, keyed
//! `<scale key>/<x0>-<x1>_<y0>-<y1>_<z0>-<z1>`. Only the `raw` encoding is
//! supported: little-endian voxels with x varying fastest. Chunks on the
//! upper edge of a scale are clipped to its bounds. A chunk that does not
//! exist reads as the fill value.

use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use ndarray::{s, Array3, ArrayView3, ShapeBuilder};
use serde::{Deserialize, Serialize};

use super::chunks::{ChunkStore, FileChunkStore};
use super::source::{Scale, SourceOpener, VolumeSource};
use super::Voxel;
use crate::error::{GtbotError, Stage};
use crate::geom::{Box3, Point3, VoxelSize};

const RAW_ENCODING: &str = "raw";

/// Layer type written into `info`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Segmentation,
}

impl LayerKind {
    pub fn data_type(self) -> &'static str {
        match self {
            LayerKind::Image => u8::DATA_TYPE,
            LayerKind::Segmentation => u32::DATA_TYPE,
        }
    }
}

/// The `info` document of a precomputed volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedInfo {
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub data_type: String,
    #[serde(default = "one")]
    pub num_channels: u32,
    pub scales: Vec<ScaleInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
}

fn one() -> u32 {
    1
}

/// One entry of `info.scales`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleInfo {
    pub key: String,
    pub resolution: VoxelSize,
    pub voxel_offset: Point3,
    pub size: Point3,
    pub chunk_sizes: Vec<Point3>,
    pub encoding: String,
}

impl From<&Scale> for ScaleInfo {
    fn from(scale: &Scale) -> Self {
        Self {
            key: scale.key.clone(),
            resolution: scale.resolution,
            voxel_offset: scale.voxel_offset,
            size: scale.size,
            chunk_sizes: vec![scale.chunk_size],
            encoding: RAW_ENCODING.to_string(),
        }
    }
}

impl PrecomputedInfo {
    fn to_scales(&self, identifier: &str) -> Result<Vec<Scale>, GtbotError> {
        self.scales
            .iter()
            .map(|info| {
                if info.encoding != RAW_ENCODING {
                    return Err(GtbotError::UnsupportedDataType {
                        identifier: identifier.to_string(),
                        expected: format!("{} encoding", RAW_ENCODING),
                        found: format!("{} encoding", info.encoding),
                    });
                }
                let chunk_size = info
                    .chunk_sizes
                    .first()
                    .copied()
                    .filter(|c| c.all(|v| v > 0))
                    .ok_or_else(|| GtbotError::InvalidDimensions {
                        message: format!(
                            "scale {} of {} has no usable chunk size",
                            info.key, identifier
                        ),
                    })?;
                Ok(Scale {
                    key: info.key.clone(),
                    resolution: info.resolution,
                    voxel_offset: info.voxel_offset,
                    size: info.size,
                    chunk_size,
                })
            })
            .collect()
    }
}

/// A [`VolumeSource`] over a [`ChunkStore`] in the precomputed layout.
pub struct PrecomputedSource<T> {
    store: Box<dyn ChunkStore>,
    info: PrecomputedInfo,
    scales: Vec<Scale>,
    _voxel: PhantomData<fn() -> T>,
}

impl<T: Voxel> PrecomputedSource<T> {
    /// Opens an existing volume by reading its `info`.
    pub fn open(store: Box<dyn ChunkStore>) -> Result<Self, GtbotError> {
        let location = store.location().to_string();
        let bytes = store.get("info")?.ok_or_else(|| {
            GtbotError::unavailable(Stage::CutoutRead, &location, "missing info file")
        })?;
        let info: PrecomputedInfo = serde_json::from_slice(&bytes).map_err(|source| {
            GtbotError::MetadataParse {
                path: format!("{}/info", location).into(),
                source,
            }
        })?;
        Self::from_info(store, info)
    }

    /// Writes `info` to the store and opens the (empty) volume it describes.
    pub fn create(store: Box<dyn ChunkStore>, info: PrecomputedInfo) -> Result<Self, GtbotError> {
        let bytes = serde_json::to_vec_pretty(&info).map_err(|source| {
            GtbotError::MetadataWrite {
                path: format!("{}/info", store.location()).into(),
                source,
            }
        })?;
        store.put("info", &bytes)?;
        Self::from_info(store, info)
    }

    fn from_info(store: Box<dyn ChunkStore>, info: PrecomputedInfo) -> Result<Self, GtbotError> {
        if info.data_type != T::DATA_TYPE || info.num_channels != 1 {
            return Err(GtbotError::UnsupportedDataType {
                identifier: store.location().to_string(),
                expected: T::DATA_TYPE.to_string(),
                found: format!("{} x{}", info.data_type, info.num_channels),
            });
        }
        let scales = info.to_scales(store.location())?;
        Ok(Self {
            store,
            info,
            scales,
            _voxel: PhantomData,
        })
    }

    pub fn info(&self) -> &PrecomputedInfo {
        &self.info
    }

    fn decode_chunk(&self, key: &str, chunk: &Box3, bytes: &[u8]) -> Result<Array3<T>, GtbotError> {
        let size = chunk.size();
        let (nx, ny, nz) = (size.x as usize, size.y as usize, size.z as usize);
        let expected = nx * ny * nz * T::BYTES;
        if bytes.len() != expected {
            return Err(GtbotError::unavailable(
                Stage::CutoutRead,
                format!("{}/{}", self.store.location(), key),
                format!("chunk holds {} bytes, expected {}", bytes.len(), expected),
            ));
        }
        let values: Vec<T> = bytes.chunks_exact(T::BYTES).map(T::from_le_slice).collect();
        Array3::from_shape_vec((nx, ny, nz).f(), values).map_err(|e| {
            GtbotError::InvalidDimensions {
                message: format!("chunk {}: {}", key, e),
            }
        })
    }

    fn load_chunk(&self, scale: &Scale, chunk: &Box3) -> Result<Array3<T>, GtbotError> {
        let key = chunk_key(scale, chunk);
        match self.store.get(&key)? {
            Some(bytes) => self.decode_chunk(&key, chunk, &bytes),
            None => {
                debug!("chunk {} missing, using fill value", key);
                let size = chunk.size();
                Ok(Array3::from_elem(
                    (size.x as usize, size.y as usize, size.z as usize),
                    self.missing_value(),
                ))
            }
        }
    }
}

impl<T: Voxel> VolumeSource<T> for PrecomputedSource<T> {
    fn identifier(&self) -> &str {
        self.store.location()
    }

    fn scales(&self) -> &[Scale] {
        &self.scales
    }

    fn read(&self, bbox: &Box3, mip: usize) -> Result<Array3<T>, GtbotError> {
        let scale = self.scale(mip)?;
        if !scale.bounds().contains(bbox) {
            return Err(GtbotError::unavailable(
                Stage::CutoutRead,
                self.identifier(),
                format!("box {} leaves bounds {} at mip {}", bbox, scale.bounds(), mip),
            ));
        }
        let size = bbox.size();
        let mut out = Array3::from_elem(
            (size.x as usize, size.y as usize, size.z as usize),
            self.missing_value(),
        );

        for chunk in chunks_overlapping(scale, bbox) {
            let Some(overlap) = chunk.intersection(bbox) else {
                continue;
            };
            let data = self.load_chunk(scale, &chunk)?;
            copy_box(&data, &chunk, &mut out, bbox, &overlap);
        }
        Ok(out)
    }

    fn write(
        &mut self,
        bbox: &Box3,
        mip: usize,
        data: ArrayView3<'_, T>,
    ) -> Result<(), GtbotError> {
        let (nx, ny, nz) = data.dim();
        if bbox.size() != Point3::new(nx as i64, ny as i64, nz as i64) {
            return Err(GtbotError::InvalidDimensions {
                message: format!(
                    "data of shape ({}, {}, {}) does not match box {}",
                    nx, ny, nz, bbox
                ),
            });
        }
        let scale = self.scale(mip)?.clone();
        let Some(target) = bbox.intersection(&scale.bounds()) else {
            warn!(
                "box {} lies outside {} at mip {}, nothing written",
                bbox,
                self.identifier(),
                mip
            );
            return Ok(());
        };
        if target != *bbox {
            debug!("cropping write {} to volume bounds {}", bbox, target);
        }

        for chunk in chunks_overlapping(&scale, &target) {
            let Some(overlap) = chunk.intersection(&target) else {
                continue;
            };
            let mut buffer = if overlap == chunk {
                let size = chunk.size();
                Array3::from_elem(
                    (size.x as usize, size.y as usize, size.z as usize),
                    self.missing_value(),
                )
            } else {
                self.load_chunk(&scale, &chunk)?
            };
            copy_box_view(data, bbox, &mut buffer, &chunk, &overlap);

            let mut bytes = Vec::with_capacity(buffer.len() * T::BYTES);
            // Reversed axes iterate with x fastest, the on-disk order.
            for value in buffer.view().reversed_axes().iter() {
                value.extend_le_bytes(&mut bytes);
            }
            self.store.put(&chunk_key(&scale, &chunk), &bytes)?;
        }
        Ok(())
    }
}

/// Object key of `chunk` within `scale`.
pub fn chunk_key(scale: &Scale, chunk: &Box3) -> String {
    let (a, b) = (chunk.min(), chunk.max());
    format!(
        "{}/{}-{}_{}-{}_{}-{}",
        scale.key, a.x, b.x, a.y, b.y, a.z, b.z
    )
}

/// Grid-aligned chunks of `scale` that overlap `bbox`, clipped to the
/// scale bounds.
fn chunks_overlapping(scale: &Scale, bbox: &Box3) -> Vec<Box3> {
    let bounds = scale.bounds();
    let origin = scale.voxel_offset;
    let step = scale.chunk_size;
    let first = (bbox.min() - origin).zip_with(step, i64::div_euclid);
    let last = (bbox.max() - origin - Point3::splat(1)).zip_with(step, i64::div_euclid);

    let mut chunks = Vec::new();
    for ix in first.x..=last.x {
        for iy in first.y..=last.y {
            for iz in first.z..=last.z {
                let min = origin + Point3::new(ix * step.x, iy * step.y, iz * step.z);
                let grid = Box3::new(min, min + step);
                if let Some(chunk) = grid.intersection(&bounds) {
                    chunks.push(chunk);
                }
            }
        }
    }
    chunks
}

/// Copies `overlap` from `src` (covering `src_box`) into `dst` (covering
/// `dst_box`).
fn copy_box<T: Voxel>(src: &Array3<T>, src_box: &Box3, dst: &mut Array3<T>, dst_box: &Box3, overlap: &Box3) {
    copy_box_view(src.view(), src_box, dst, dst_box, overlap);
}

fn copy_box_view<T: Voxel>(
    src: ArrayView3<'_, T>,
    src_box: &Box3,
    dst: &mut Array3<T>,
    dst_box: &Box3,
    overlap: &Box3,
) {
    let from = overlap.relative_to(src_box.min());
    let to = overlap.relative_to(dst_box.min());
    if let (Some([sx, sy, sz]), Some([dx, dy, dz])) = (from.index_ranges(), to.index_ranges()) {
        dst.slice_mut(s![dx, dy, dz])
            .assign(&src.slice(s![sx, sy, sz]));
    }
}

/// Opens layer sources in the precomputed layout.
///
/// Accepts an optional `precomputed://` prefix followed by a local path,
/// a `file://` URL, an `http(s)://` URL, or `gs://bucket/path`, which is
/// mapped to the public storage endpoint.
#[derive(Clone, Debug)]
pub struct PrecomputedOpener {
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for PrecomputedOpener {
    fn default() -> Self {
        Self {
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PrecomputedOpener {
    pub fn new(token: Option<String>, timeout: Duration) -> Self {
        Self { token, timeout }
    }

    /// Builds the chunk store a source string points at.
    pub fn store(&self, source: &str) -> Result<Box<dyn ChunkStore>, GtbotError> {
        let location = source.strip_prefix("precomputed://").unwrap_or(source);
        if let Some(path) = location.strip_prefix("file://") {
            return Ok(Box::new(FileChunkStore::new(Path::new(path))));
        }
        if let Some(rest) = location.strip_prefix("gs://") {
            return self.http_store(source, &format!("https://storage.googleapis.com/{}", rest));
        }
        if location.starts_with("http://") || location.starts_with("https://") {
            return self.http_store(source, location);
        }
        Ok(Box::new(FileChunkStore::new(Path::new(location))))
    }

    #[cfg(feature = "remote")]
    fn http_store(&self, _source: &str, url: &str) -> Result<Box<dyn ChunkStore>, GtbotError> {
        Ok(Box::new(super::chunks::HttpChunkStore::new(
            url,
            self.token.clone(),
            self.timeout,
        )))
    }

    #[cfg(not(feature = "remote"))]
    fn http_store(&self, source: &str, _url: &str) -> Result<Box<dyn ChunkStore>, GtbotError> {
        Err(GtbotError::unavailable(
            Stage::CutoutRead,
            source,
            "remote sources need the `remote` feature",
        ))
    }
}

impl SourceOpener for PrecomputedOpener {
    fn open_labels(&self, source: &str) -> Result<Box<dyn VolumeSource<u32>>, GtbotError> {
        Ok(Box::new(PrecomputedSource::<u32>::open(self.store(source)?)?))
    }

    fn open_image(&self, source: &str) -> Result<Box<dyn VolumeSource<u8>>, GtbotError> {
        Ok(Box::new(PrecomputedSource::<u8>::open(self.store(source)?)?))
    }
}

//! The volumetric source collaborator and an in-memory implementation.

use std::collections::HashMap;

use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::{extent, Voxel};
use crate::error::{GtbotError, Stage};
use crate::geom::{Box3, Point3, VoxelSize};

/// One resolution level of a volume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Store key of the level, e.g. `"8_8_40"`.
    pub key: String,
    pub resolution: VoxelSize,
    pub voxel_offset: Point3,
    pub size: Point3,
    pub chunk_size: Point3,
}

impl Scale {
    /// Declared bounds of the level in its own voxel units.
    pub fn bounds(&self) -> Box3 {
        Box3::new(self.voxel_offset, self.voxel_offset + self.size)
    }

    /// Conventional key for a resolution, `x_y_z` in physical units.
    pub fn key_for(resolution: VoxelSize) -> String {
        format!(
            "{}_{}_{}",
            resolution.axis(0),
            resolution.axis(1),
            resolution.axis(2)
        )
    }
}

/// A multi-resolution volume that can be read and written by box.
///
/// Boxes are absolute coordinates at the requested level. Implementations
/// may reject boxes that leave [`Scale::bounds`]; callers that need
/// out-of-bounds fill go through [`crate::cutout::read_window`].
pub trait VolumeSource<T: Voxel>: Send + Sync {
    /// Human-readable name used in error messages.
    fn identifier(&self) -> &str;

    fn scales(&self) -> &[Scale];

    fn scale(&self, mip: usize) -> Result<&Scale, GtbotError> {
        self.scales()
            .get(mip)
            .ok_or_else(|| GtbotError::ScaleNotFound {
                identifier: self.identifier().to_string(),
                mip,
            })
    }

    /// Value used for voxels the source has no data for.
    fn missing_value(&self) -> T {
        T::default()
    }

    fn read(&self, bbox: &Box3, mip: usize) -> Result<Array3<T>, GtbotError>;

    fn write(&mut self, bbox: &Box3, mip: usize, data: ArrayView3<'_, T>)
        -> Result<(), GtbotError>;
}

/// Resolves a layer source string to a readable volume.
pub trait SourceOpener {
    fn open_labels(&self, source: &str) -> Result<Box<dyn VolumeSource<u32>>, GtbotError>;

    fn open_image(&self, source: &str) -> Result<Box<dyn VolumeSource<u8>>, GtbotError>;
}

/// A volume held entirely in memory, one array per resolution level.
#[derive(Clone, Debug)]
pub struct MemorySource<T> {
    identifier: String,
    scales: Vec<Scale>,
    levels: Vec<Array3<T>>,
    missing: T,
}

impl<T: Voxel> MemorySource<T> {
    /// Creates a single-level source whose data starts at `voxel_offset`.
    pub fn new(
        identifier: impl Into<String>,
        resolution: VoxelSize,
        voxel_offset: Point3,
        data: Array3<T>,
    ) -> Self {
        let mut source = Self {
            identifier: identifier.into(),
            scales: Vec::new(),
            levels: Vec::new(),
            missing: T::default(),
        };
        source.push_level(resolution, voxel_offset, data);
        source
    }

    /// Adds a coarser resolution level.
    pub fn with_level(mut self, resolution: VoxelSize, voxel_offset: Point3, data: Array3<T>) -> Self {
        self.push_level(resolution, voxel_offset, data);
        self
    }

    /// Sets the fill value reported by [`VolumeSource::missing_value`].
    pub fn with_missing_value(mut self, missing: T) -> Self {
        self.missing = missing;
        self
    }

    /// Data of level `mip`, if present.
    pub fn level(&self, mip: usize) -> Option<&Array3<T>> {
        self.levels.get(mip)
    }

    fn push_level(&mut self, resolution: VoxelSize, voxel_offset: Point3, data: Array3<T>) {
        self.scales.push(Scale {
            key: Scale::key_for(resolution),
            resolution,
            voxel_offset,
            size: extent(&data),
            chunk_size: extent(&data),
        });
        self.levels.push(data);
    }

    fn local_ranges(
        &self,
        bbox: &Box3,
        mip: usize,
        stage: Stage,
    ) -> Result<[std::ops::Range<usize>; 3], GtbotError> {
        let scale = self.scale(mip)?;
        if !scale.bounds().contains(bbox) {
            return Err(GtbotError::unavailable(
                stage,
                &self.identifier,
                format!("box {} leaves bounds {} at mip {}", bbox, scale.bounds(), mip),
            ));
        }
        bbox.relative_to(scale.voxel_offset)
            .index_ranges()
            .ok_or_else(|| GtbotError::InvalidDimensions {
                message: format!("box {} is not addressable at mip {}", bbox, mip),
            })
    }
}

impl<T: Voxel> VolumeSource<T> for MemorySource<T> {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn scales(&self) -> &[Scale] {
        &self.scales
    }

    fn missing_value(&self) -> T {
        self.missing
    }

    fn read(&self, bbox: &Box3, mip: usize) -> Result<Array3<T>, GtbotError> {
        let [rx, ry, rz] = self.local_ranges(bbox, mip, Stage::CutoutRead)?;
        Ok(self.levels[mip].slice(s![rx, ry, rz]).to_owned())
    }

    fn write(
        &mut self,
        bbox: &Box3,
        mip: usize,
        data: ArrayView3<'_, T>,
    ) -> Result<(), GtbotError> {
        let expected = bbox.size();
        let (nx, ny, nz) = data.dim();
        if expected != Point3::new(nx as i64, ny as i64, nz as i64) {
            return Err(GtbotError::InvalidDimensions {
                message: format!(
                    "data of shape ({}, {}, {}) does not match box {}",
                    nx, ny, nz, bbox
                ),
            });
        }
        let [rx, ry, rz] = self.local_ranges(bbox, mip, Stage::CutoutWrite)?;
        self.levels[mip].slice_mut(s![rx, ry, rz]).assign(&data);
        Ok(())
    }
}

/// Opens sources from a fixed table, cloning on every open.
#[derive(Clone, Debug, Default)]
pub struct MemoryOpener {
    labels: HashMap<String, MemorySource<u32>>,
    images: HashMap<String, MemorySource<u8>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(mut self, source: impl Into<String>, volume: MemorySource<u32>) -> Self {
        self.labels.insert(source.into(), volume);
        self
    }

    pub fn with_image(mut self, source: impl Into<String>, volume: MemorySource<u8>) -> Self {
        self.images.insert(source.into(), volume);
        self
    }
}

impl SourceOpener for MemoryOpener {
    fn open_labels(&self, source: &str) -> Result<Box<dyn VolumeSource<u32>>, GtbotError> {
        self.labels
            .get(source)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn VolumeSource<u32>>)
            .ok_or_else(|| GtbotError::unavailable(Stage::LabelQuery, source, "no such source"))
    }

    fn open_image(&self, source: &str) -> Result<Box<dyn VolumeSource<u8>>, GtbotError> {
        self.images
            .get(source)
            .cloned()
            .map(|s| Box::new(s) as Box<dyn VolumeSource<u8>>)
            .ok_or_else(|| GtbotError::unavailable(Stage::CutoutRead, source, "no such source"))
    }
}

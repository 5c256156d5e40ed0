//! Volumetric arrays and the sources they are read from.
//!
//! Volumes are `ndarray::Array3` values indexed `[x, y, z]`. The element
//! type is described by [`Voxel`], which knows how a voxel is named and
//! encoded by a volumetric store. Segmentations use `u32` labels where 0
//! means "unlabeled"; images use `u8` intensities.

pub mod chunks;
pub mod majority;
pub mod precomputed;
pub mod source;

use std::fmt;

use ndarray::Array3;

use crate::geom::Point3;

pub use majority::{labels_in_box, segment_sizes, LabeledPoint};
pub use precomputed::{LayerKind, PrecomputedInfo, PrecomputedOpener, PrecomputedSource};
pub use source::{MemoryOpener, MemorySource, Scale, SourceOpener, VolumeSource};

/// A segmentation volume. Label 0 is the reserved "no label" value.
pub type LabelVolume = Array3<u32>;

/// A grayscale image volume.
pub type ImageVolume = Array3<u8>;

/// An element type that can be stored in a volumetric source.
pub trait Voxel: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Data type name used in store metadata (`"uint8"`, `"uint32"`).
    const DATA_TYPE: &'static str;

    /// Encoded width in bytes.
    const BYTES: usize;

    /// Decodes one little-endian value from exactly `BYTES` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Appends the little-endian encoding of `self`.
    fn extend_le_bytes(self, out: &mut Vec<u8>);

    /// The value as a segment id.
    fn to_label(self) -> u64;
}

impl Voxel for u8 {
    const DATA_TYPE: &'static str = "uint8";
    const BYTES: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn extend_le_bytes(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn to_label(self) -> u64 {
        self as u64
    }
}

impl Voxel for u32 {
    const DATA_TYPE: &'static str = "uint32";
    const BYTES: usize = 4;

    fn from_le_slice(bytes: &[u8]) -> Self {
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn extend_le_bytes(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn to_label(self) -> u64 {
        self as u64
    }
}

/// Shape of `volume` as a point, for comparisons against boxes.
pub fn extent<T>(volume: &Array3<T>) -> Point3 {
    let (nx, ny, nz) = volume.dim();
    Point3::new(nx as i64, ny as i64, nz as i64)
}

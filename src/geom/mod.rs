//! Voxel-space geometry.
//!
//! Points, voxel sizes and axis-aligned boxes, plus the conversions between
//! resolution levels of a multi-resolution volume. Everything here is pure
//! arithmetic; no module in `geom` performs I/O.
//!
//! # Example
//!
//! ```
//! use gtbot::geom::{box_to_resolution, Box3, Point3, VoxelSize};
//!
//! let bbox = Box3::from_center_and_size(Point3::new(100, 100, 10), Point3::new(40, 40, 4))?;
//! assert_eq!(bbox.min(), Point3::new(80, 80, 8));
//!
//! let mip1 = box_to_resolution(&bbox, VoxelSize::new(4.0, 4.0, 40.0), VoxelSize::new(8.0, 8.0, 40.0))?;
//! assert_eq!(mip1.max(), Point3::new(60, 60, 12));
//! # Ok::<(), gtbot::GtbotError>(())
//! ```

mod bbox;
mod mapper;
mod point;

pub use bbox::{Box3, PaddedBox3};
pub use mapper::{box_to_resolution, scale_factor, to_resolution};
pub use point::{Point3, VoxelSize};

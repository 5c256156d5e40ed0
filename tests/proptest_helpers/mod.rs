#![allow(dead_code)]

use gtbot::geom::{Box3, Point3, VoxelSize};
use ndarray::Array3;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Coordinates stay well inside the range where `f64` products are exact.
pub const COORD_LIMIT: i64 = 1 << 24;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_point() -> BoxedStrategy<Point3> {
    (
        -COORD_LIMIT..COORD_LIMIT,
        -COORD_LIMIT..COORD_LIMIT,
        -COORD_LIMIT..COORD_LIMIT,
    )
        .prop_map(|(x, y, z)| Point3::new(x, y, z))
        .boxed()
}

/// Strictly positive extents.
pub fn arb_size(max: i64) -> BoxedStrategy<Point3> {
    (1..=max, 1..=max, 1..=max)
        .prop_map(|(x, y, z)| Point3::new(x, y, z))
        .boxed()
}

pub fn arb_pad(max: i64) -> BoxedStrategy<Point3> {
    (0..=max, 0..=max, 0..=max)
        .prop_map(|(x, y, z)| Point3::new(x, y, z))
        .boxed()
}

pub fn arb_box() -> BoxedStrategy<Box3> {
    (arb_point(), arb_point())
        .prop_map(|(a, b)| Box3::new(a, b))
        .boxed()
}

/// Voxel sizes of a dyadic mip pyramid over 4x4x40 nm, plus the z-isotropic
/// 40 nm level.
pub fn arb_pyramid_resolution() -> BoxedStrategy<VoxelSize> {
    prop_oneof![
        Just(VoxelSize::new(4.0, 4.0, 40.0)),
        Just(VoxelSize::new(8.0, 8.0, 40.0)),
        Just(VoxelSize::new(16.0, 16.0, 40.0)),
        Just(VoxelSize::new(32.0, 32.0, 40.0)),
        Just(VoxelSize::new(64.0, 64.0, 80.0)),
    ]
    .boxed()
}

/// A label volume with a handful of distinct ids, including background.
pub fn arb_label_volume(max_side: usize, max_label: u32) -> BoxedStrategy<Array3<u32>> {
    (1..=max_side, 1..=max_side, 1..=max_side)
        .prop_flat_map(move |(nx, ny, nz)| {
            proptest::collection::vec(0..=max_label, nx * ny * nz).prop_map(move |values| {
                Array3::from_shape_vec((nx, ny, nz), values).expect("shape matches length")
            })
        })
        .boxed()
}

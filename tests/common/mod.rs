#![allow(dead_code)]

use std::fs;
use std::path::Path;

use gtbot::cutout::to_slice_directory;
use gtbot::cutout::SliceVoxel;
use ndarray::Array3;

/// Encodes `json` as the `#!` state of a viewer link on `host`.
pub fn inline_url(host: &str, json: &str) -> String {
    format!("{}/#!{}", host, urlencoding::encode(json))
}

/// Writes a slice directory at `dir/raw` and a `metadata.json` next to it.
pub fn write_cutout<T: SliceVoxel>(dir: &Path, volume: &Array3<T>, metadata: &str) {
    fs::create_dir_all(dir).expect("create cutout dir");
    to_slice_directory(volume.view(), &dir.join("raw"), "png").expect("write slices");
    fs::write(dir.join("metadata.json"), metadata).expect("write metadata");
}

/// Writes a precomputed `info` for a single-scale volume under `dir`.
pub fn write_info(dir: &Path, kind: &str, data_type: &str, size: [i64; 3], chunk: [i64; 3]) {
    fs::create_dir_all(dir).expect("create layer dir");
    let info = serde_json::json!({
        "type": kind,
        "data_type": data_type,
        "num_channels": 1,
        "scales": [{
            "key": "4_4_40",
            "resolution": [4, 4, 40],
            "voxel_offset": [0, 0, 0],
            "size": size,
            "chunk_sizes": [chunk],
            "encoding": "raw"
        }]
    });
    fs::write(dir.join("info"), serde_json::to_vec_pretty(&info).expect("info json"))
        .expect("write info");
}

//! Rewriting a viewer payload: points become boxes, boxes become labeled
//! points.
//!
//! [`translate`] works on a copy of the payload. The input is never
//! modified, so a caller only persists the result once every step has
//! succeeded.

pub mod report;

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};

use crate::config::{Config, LabelMode};
use crate::cutout::read_window;
use crate::error::{GtbotError, Stage};
use crate::geom::{box_to_resolution, to_resolution, Box3, Point3, VoxelSize};
use crate::payload::{Annotation, AnnotationLayer, AnnotationPayload, IdGenerator, Layer};
use crate::volume::{labels_in_box, LabeledPoint, SourceOpener};

pub use report::TranslationReport;

/// A box derived from a point record, with the voxel size it is in.
#[derive(Clone, Copy, Debug)]
struct DerivedBox {
    bbox: Box3,
    resolution: VoxelSize,
}

/// Expands point annotations into boxes and, when labeling applies, adds a
/// layer of points naming the segments found inside those boxes.
///
/// Steps:
/// 1. For every point record of every annotation layer, append a box of
///    span `config.bbox.dim` centered on it, with a fresh id. Points stay.
/// 2. Unless `config.labels.mode` is [`LabelMode::Off`], read each derived
///    box from the first visible segmentation layer at `config.labels.mip`
///    and collect the segments with at least `config.labels.min_voxel_count`
///    voxels.
///    Each box is clipped to the bounds of that level first.
/// 3. If any were found, append one annotation layer with one point per
///    segment, tagged with the segment id.
///
/// A segment found in several boxes is reported once, at the box where it
/// has the most voxels (the earlier box on ties). Labeled points are
/// ordered by descending voxel count, then label, and reported in the
/// voxel size of the first annotation layer.
///
/// # Errors
/// - [`GtbotError::NoAnnotationLayer`] if the payload has no annotation
///   layer.
/// - [`GtbotError::NoSegmentationLayer`] if labeling is
///   [`LabelMode::Required`] and no visible segmentation layer exists.
/// - [`GtbotError::SourceUnavailable`] at [`Stage::LabelQuery`] if the
///   segmentation cannot be read.
pub fn translate(
    payload: &AnnotationPayload,
    config: &Config,
    opener: &dyn SourceOpener,
    ids: &mut IdGenerator,
) -> Result<(AnnotationPayload, TranslationReport), GtbotError> {
    let fallback = config.viewer.voxel_size;
    let resolutions: Vec<VoxelSize> = payload
        .annotation_layers()
        .map(|layer| payload.annotation_voxel_size(layer, fallback))
        .collect();
    let Some(&output_resolution) = resolutions.first() else {
        return Err(GtbotError::NoAnnotationLayer);
    };

    let mut translated = payload.clone();
    let mut report = TranslationReport::default();

    let mut derived = Vec::new();
    for (layer, resolution) in translated
        .annotation_layers_mut()
        .zip(resolutions.iter().copied())
    {
        for bbox in expand_points(layer, config.bbox.dim, ids)? {
            derived.push(DerivedBox { bbox, resolution });
        }
    }
    report.boxes_added = derived.len();
    info!("expanded {} point annotation(s) into boxes", derived.len());

    let labeled = label_boxes(payload, &derived, output_resolution, config, opener, &mut report)?;
    if !labeled.is_empty() {
        let name = unique_layer_name(&translated, &config.labels.layer_name);
        let mut layer = AnnotationLayer::new(name.clone());
        layer.voxel_size = Some(output_resolution);
        layer.annotations = labeled
            .iter()
            .map(|lp| Annotation::labeled_point(ids.annotation_id(), lp.point, lp.label))
            .collect();
        translated.layers.push(Layer::Annotation(layer));
        report.new_layer = Some(name);
    }
    report.labeled_points = labeled;

    Ok((translated, report))
}

/// Appends a box record for every point record of `layer`.
fn expand_points(
    layer: &mut AnnotationLayer,
    dim: Point3,
    ids: &mut IdGenerator,
) -> Result<Vec<Box3>, GtbotError> {
    let boxes = layer
        .annotations
        .iter()
        .filter_map(|a| match a {
            Annotation::Point(p) => Some(Box3::from_point_and_dim(p.voxel(), dim)),
            _ => None,
        })
        .collect::<Result<Vec<_>, _>>()?;

    layer
        .annotations
        .extend(boxes.iter().map(|b| Annotation::bbox(ids.annotation_id(), b)));
    Ok(boxes)
}

fn label_boxes(
    payload: &AnnotationPayload,
    derived: &[DerivedBox],
    output_resolution: VoxelSize,
    config: &Config,
    opener: &dyn SourceOpener,
    report: &mut TranslationReport,
) -> Result<Vec<LabeledPoint>, GtbotError> {
    if config.labels.mode == LabelMode::Off {
        report.labeling_skipped = Some("disabled".to_string());
        return Ok(Vec::new());
    }

    let Some(segmentation) = payload.visible_segmentation_layer() else {
        if config.labels.mode == LabelMode::Required {
            return Err(GtbotError::NoSegmentationLayer);
        }
        report.labeling_skipped = Some("no visible segmentation layer".to_string());
        return Ok(Vec::new());
    };

    if derived.is_empty() {
        report.labeling_skipped = Some("no point annotations".to_string());
        return Ok(Vec::new());
    }

    let identifier = segmentation.source_path();
    let source = opener
        .open_labels(identifier)
        .map_err(|e| e.at_stage(Stage::LabelQuery))?;
    let mip = config.labels.mip;
    let scale = source.scale(mip)?;
    let (resolution, bounds) = (scale.resolution, scale.bounds());
    report.segmentation = Some(identifier.to_string());

    let mut best: BTreeMap<u64, LabeledPoint> = BTreeMap::new();
    for d in derived {
        let mapped = box_to_resolution(&d.bbox, d.resolution, resolution)?;
        // Voxels outside the level carry no segment.
        let Some(target) = mapped.intersection(&bounds) else {
            debug!("{} lies outside {} at mip {}", mapped, identifier, mip);
            continue;
        };
        let window = read_window(source.as_ref(), &target, mip)
            .map_err(|e| e.at_stage(Stage::LabelQuery))?;
        let local = target.relative_to(target.min());
        let labels = labels_in_box(window.view(), &local, config.labels.min_voxel_count)?;
        debug!("{} segment(s) in {}", labels.len(), target);

        for lp in labels {
            let absolute = lp.translate(target.min());
            let absolute = LabeledPoint {
                point: to_resolution(absolute.point, resolution, output_resolution)?,
                ..absolute
            };
            match best.get(&lp.label) {
                Some(kept) if kept.voxel_count >= absolute.voxel_count => {}
                _ => {
                    best.insert(lp.label, absolute);
                }
            }
        }
    }

    let mut found: Vec<LabeledPoint> = best.into_values().collect();
    found.sort_by(|a, b| b.voxel_count.cmp(&a.voxel_count).then(a.label.cmp(&b.label)));
    Ok(found)
}

fn unique_layer_name(payload: &AnnotationPayload, base: &str) -> String {
    let taken: HashSet<&str> = payload.layers.iter().map(Layer::name).collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|i| format!("{}_{}", base, i))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::payload_from_json_str;
    use crate::volume::{MemoryOpener, MemorySource};
    use ndarray::Array3;

    fn payload(with_segmentation: bool) -> AnnotationPayload {
        let seg = if with_segmentation {
            r#"{"type": "segmentation", "name": "seg", "source": "precomputed://mem://seg"},"#
        } else {
            ""
        };
        payload_from_json_str(&format!(
            r#"{{"layers": [{}
                {{"type": "annotation", "name": "ann", "voxelSize": [4, 4, 40],
                  "annotations": [{{"type": "point", "id": "p1", "point": [20, 20, 5]}}]}}
            ]}}"#,
            seg
        ))
        .unwrap()
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.bbox.dim = Point3::new(8, 8, 2);
        config.labels.min_voxel_count = 1;
        config
    }

    fn opener() -> MemoryOpener {
        let mut labels = Array3::<u32>::zeros((40, 40, 10));
        labels[[18, 19, 4]] = 5;
        MemoryOpener::new().with_labels(
            "mem://seg",
            MemorySource::new("seg", VoxelSize::new(4.0, 4.0, 40.0), Point3::splat(0), labels),
        )
    }

    #[test]
    fn test_no_annotation_layer() {
        let empty = payload_from_json_str(r#"{"layers": []}"#).unwrap();
        let err = translate(&empty, &config(), &opener(), &mut IdGenerator::new(Some(1)))
            .unwrap_err();
        assert!(matches!(err, GtbotError::NoAnnotationLayer));
    }

    #[test]
    fn test_required_labels_without_segmentation() {
        let mut config = config();
        config.labels.mode = LabelMode::Required;
        let err = translate(&payload(false), &config, &opener(), &mut IdGenerator::new(Some(1)))
            .unwrap_err();
        assert!(matches!(err, GtbotError::NoSegmentationLayer));
    }

    #[test]
    fn test_missing_segmentation_is_skipped_when_optional() {
        let (out, report) =
            translate(&payload(false), &config(), &opener(), &mut IdGenerator::new(Some(1))).unwrap();
        assert_eq!(report.boxes_added, 1);
        assert!(report.labeling_skipped.is_some());
        assert_eq!(out.layers.len(), 1);
    }

    #[test]
    fn test_labels_off() {
        let mut config = config();
        config.labels.mode = LabelMode::Off;
        let (out, report) =
            translate(&payload(true), &config, &opener(), &mut IdGenerator::new(Some(1))).unwrap();
        assert_eq!(report.labeled_points.len(), 0);
        assert_eq!(out.layers.len(), 2);
    }

    #[test]
    fn test_input_is_not_modified() {
        let input = payload(true);
        let before = input.clone();
        let (out, report) =
            translate(&input, &config(), &opener(), &mut IdGenerator::new(Some(1))).unwrap();
        assert_eq!(input, before);
        assert_ne!(out, before);

        assert_eq!(report.labeled_points.len(), 1);
        assert_eq!(report.labeled_points[0].label, 5);
        assert_eq!(report.labeled_points[0].point, Point3::new(18, 19, 4));
    }

    #[test]
    fn test_unreadable_segmentation_names_label_query() {
        let err = translate(
            &payload(true),
            &config(),
            &MemoryOpener::new(),
            &mut IdGenerator::new(Some(1)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GtbotError::SourceUnavailable {
                stage: Stage::LabelQuery,
                ..
            }
        ));
    }

    fn points_payload(points: &[[f64; 3]]) -> AnnotationPayload {
        let records: Vec<String> = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    r#"{{"type": "point", "id": "p{}", "point": [{:e}, {:e}, {:e}]}}"#,
                    i, p[0], p[1], p[2]
                )
            })
            .collect();
        payload_from_json_str(&format!(
            r#"{{"layers": [
                {{"type": "segmentation", "name": "seg", "source": "precomputed://mem://seg"}},
                {{"type": "annotation", "name": "ann", "voxelSize": [4, 4, 40],
                  "annotations": [{}]}}
            ]}}"#,
            records.join(",")
        ))
        .unwrap()
    }

    #[test]
    fn test_default_span_is_clipped_to_the_segmentation() {
        let mut labels = Array3::<u32>::zeros((40, 40, 10));
        labels.slice_mut(ndarray::s![10..20, 10..20, 4..6]).fill(7);
        let opener = MemoryOpener::new().with_labels(
            "mem://seg",
            MemorySource::new("seg", VoxelSize::new(4.0, 4.0, 40.0), Point3::splat(0), labels),
        );

        let (out, report) = translate(
            &points_payload(&[[20.0, 20.0, 5.0]]),
            &Config::default(),
            &opener,
            &mut IdGenerator::new(Some(1)),
        )
        .unwrap();
        assert_eq!(report.boxes_added, 1);
        assert_eq!(report.labeled_points.len(), 1);
        assert_eq!(report.labeled_points[0].label, 7);
        assert_eq!(report.labeled_points[0].voxel_count, 200);
        assert_eq!(out.layers.len(), 3);
    }

    #[test]
    fn test_box_outside_segmentation_finds_nothing() {
        let mut config = config();
        config.labels.mode = LabelMode::Required;
        let (out, report) = translate(
            &points_payload(&[[500.0, 500.0, 50.0]]),
            &config,
            &opener(),
            &mut IdGenerator::new(Some(1)),
        )
        .unwrap();
        assert!(report.labeled_points.is_empty());
        assert_eq!(out.layers.len(), 2);
    }

    #[test]
    fn test_unrepresentable_point_is_an_error() {
        let mut config = config();
        config.labels.mode = LabelMode::Off;
        let err = translate(
            &points_payload(&[[1e30, 100.0, 10.0]]),
            &config,
            &opener(),
            &mut IdGenerator::new(Some(1)),
        )
        .unwrap_err();
        assert!(matches!(err, GtbotError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_segment_shared_by_boxes_is_reported_once() {
        let mut labels = Array3::<u32>::zeros((40, 40, 10));
        labels.slice_mut(ndarray::s![18..27, 18..22, 4..6]).fill(7);
        let opener = MemoryOpener::new().with_labels(
            "mem://seg",
            MemorySource::new("seg", VoxelSize::new(4.0, 4.0, 40.0), Point3::splat(0), labels),
        );

        let (out, report) = translate(
            &points_payload(&[[20.0, 20.0, 5.0], [24.0, 20.0, 5.0]]),
            &config(),
            &opener,
            &mut IdGenerator::new(Some(1)),
        )
        .unwrap();
        assert_eq!(report.boxes_added, 2);
        assert_eq!(report.labeled_points.len(), 1);
        // The second box holds more of the segment.
        assert_eq!(report.labeled_points[0].voxel_count, 56);
        assert_eq!(report.labeled_points[0].point, Point3::new(20, 18, 4));

        let Some(Layer::Annotation(segments)) = out.layers.last() else {
            panic!("no label layer");
        };
        assert_eq!(segments.annotations.len(), 1);
    }

    #[test]
    fn test_unique_layer_name() {
        let mut p = payload(false);
        p.layers.push(Layer::Annotation(AnnotationLayer::new("segments")));
        assert_eq!(unique_layer_name(&p, "segments"), "segments_2");
        assert_eq!(unique_layer_name(&p, "labels"), "labels");
    }
}

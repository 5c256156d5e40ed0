use gtbot::bot::Bot;
use gtbot::config::{Config, LabelMode};
use gtbot::geom::{Box3, Point3, VoxelSize};
use gtbot::notify::MemoryNotifier;
use gtbot::payload::{
    payload_from_json_str, Annotation, AnnotationPayload, IdGenerator, Layer, MemoryPayloadStore,
};
use gtbot::translate::translate;
use gtbot::volume::{MemoryOpener, MemorySource};
use ndarray::{s, Array3};

mod common;

const PAYLOAD: &str = r#"{
  "layers": [
    {"type": "image", "name": "img", "source": "precomputed://mem://img"},
    {"type": "segmentation", "name": "seg", "source": "precomputed://mem://seg"},
    {"type": "annotation", "name": "points", "voxelSize": [4, 4, 40],
     "annotations": [{"type": "point", "id": "p1", "point": [100, 100, 10]}]}
  ],
  "navigation": {"pose": {"position": {"voxelSize": [4, 4, 40], "voxelCoordinates": [100, 100, 10]}}},
  "layout": "xy-3d"
}"#;

fn labels() -> MemoryOpener {
    let mut volume = Array3::<u32>::zeros((200, 200, 20));
    volume.slice_mut(s![90..110, 90..110, 9..11]).fill(7);
    MemoryOpener::new().with_labels(
        "mem://seg",
        MemorySource::new("seg", VoxelSize::new(4.0, 4.0, 40.0), Point3::splat(0), volume),
    )
}

fn config() -> Config {
    let mut config = Config::default();
    config.bbox.dim = Point3::new(40, 40, 4);
    config
}

fn boxes(layer: &Layer) -> Vec<Box3> {
    match layer {
        Layer::Annotation(a) => a
            .annotations
            .iter()
            .filter_map(|ann| match ann {
                Annotation::Box(b) => Some(b.voxel_box()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[test]
fn point_becomes_box_and_label_layer() {
    let input = payload_from_json_str(PAYLOAD).expect("parse payload");
    let (output, report) = translate(
        &input,
        &config(),
        &labels(),
        &mut IdGenerator::new(Some(7)),
    )
    .expect("translate");

    assert_eq!(output.layers.len(), 4);
    let Layer::Annotation(points) = &output.layers[2] else {
        panic!("annotation layer moved");
    };
    assert_eq!(points.annotations.len(), 2);
    assert!(matches!(&points.annotations[0], Annotation::Point(p) if p.meta.id == "p1"));
    assert_eq!(
        boxes(&output.layers[2]),
        vec![Box3::new(Point3::new(80, 80, 8), Point3::new(120, 120, 12))]
    );

    let Layer::Annotation(segments) = &output.layers[3] else {
        panic!("no label layer appended");
    };
    assert_eq!(segments.name, "segments");
    assert_eq!(segments.annotations.len(), 1);
    let Annotation::Point(labeled) = &segments.annotations[0] else {
        panic!("label record is not a point");
    };
    assert_eq!(labeled.meta.segments, vec!["7".to_string()]);
    assert!(Box3::new(Point3::new(90, 90, 9), Point3::new(110, 110, 11)).contains_point(labeled.voxel()));

    assert_eq!(report.boxes_added, 1);
    assert_eq!(report.segment_count(), 1);
    assert_eq!(report.labeled_points[0].voxel_count, 800);

    // Unknown keys ride along untouched.
    assert_eq!(output.extra.get("layout"), input.extra.get("layout"));
}

#[test]
fn default_config_reads_only_the_segmentation_bounds() {
    let input = payload_from_json_str(PAYLOAD).expect("parse payload");
    let (output, report) = translate(
        &input,
        &Config::default(),
        &labels(),
        &mut IdGenerator::new(Some(7)),
    )
    .expect("translate");

    assert_eq!(
        boxes(&output.layers[2]),
        vec![Box3::new(
            Point3::new(100 - 20460, 100 - 20460, 10 - 1024),
            Point3::new(100 + 20460, 100 + 20460, 10 + 1024)
        )]
    );
    assert_eq!(report.labeled_points.len(), 1);
    assert_eq!(report.labeled_points[0].label, 7);
    assert_eq!(report.labeled_points[0].voxel_count, 800);
}

#[test]
fn threshold_drops_small_segments() {
    let input = payload_from_json_str(PAYLOAD).expect("parse payload");
    let mut config = config();
    config.labels.min_voxel_count = 801;
    let (output, report) =
        translate(&input, &config, &labels(), &mut IdGenerator::new(Some(7))).expect("translate");
    assert_eq!(output.layers.len(), 3);
    assert!(report.labeled_points.is_empty());
    assert!(report.new_layer.is_none());
}

#[test]
fn bot_publishes_translated_payload() {
    let mut config = config();
    config.viewer.host = "https://viewer.example".to_string();
    config.labels.mode = LabelMode::Required;
    let mut bot = Bot::new(
        config,
        Box::new(labels()),
        Box::new(MemoryPayloadStore::new()),
        Box::new(MemoryNotifier::new()),
    );

    let link = common::inline_url("https://viewer.example", PAYLOAD);
    let outcome = bot.create_bboxes(&link, "tester").expect("create bboxes");
    assert_eq!(outcome.link, "https://viewer.example/?json_url=memory://state/1");

    let stored: AnnotationPayload = bot.resolve(&outcome.link).expect("stored payload");
    assert_eq!(stored.layers.len(), 4);
    assert_eq!(boxes(&stored.layers[2]).len(), 1);
}

#[test]
fn failed_label_query_publishes_nothing() {
    let mut config = config();
    config.labels.mode = LabelMode::Required;
    let store = MemoryPayloadStore::new();
    let mut bot = Bot::new(
        config,
        Box::new(MemoryOpener::new()),
        Box::new(store),
        Box::new(MemoryNotifier::new()),
    );

    let link = common::inline_url("https://viewer.example", PAYLOAD);
    let err = bot.create_bboxes(&link, "tester").unwrap_err();
    assert!(matches!(err, gtbot::GtbotError::SourceUnavailable { .. }));
    assert!(bot.resolve("https://viewer.example/?json_url=memory://state/1").is_err());
}

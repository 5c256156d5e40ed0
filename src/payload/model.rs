//! Typed view of a viewer payload.
//!
//! A payload is the JSON state behind a viewer link: an ordered list of
//! layers plus navigation and display settings. Only the parts gtbot reads
//! or writes are typed; every other key is kept in an `extra` map so a
//! payload survives a round trip through the tool unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::geom::{Box3, Point3, VoxelSize};

/// The full viewer state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPayload {
    #[serde(default, deserialize_with = "layers_from_list_or_map")]
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One layer, tagged by its `type` key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layer {
    Image(VolumeLayer),
    Segmentation(VolumeLayer),
    Annotation(AnnotationLayer),
}

/// An image or segmentation layer backed by a volumetric source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeLayer {
    #[serde(default)]
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A layer holding annotation records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationLayer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(
        rename = "voxelSize",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub voxel_size: Option<VoxelSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An annotation record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Annotation {
    #[serde(rename = "point")]
    Point(PointAnnotation),
    #[serde(rename = "axis_aligned_bounding_box")]
    Box(BoxAnnotation),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointAnnotation {
    pub point: [f64; 3],
    #[serde(flatten)]
    pub meta: AnnotationMeta,
}

/// Corners are stored as the viewer wrote them and may be unordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxAnnotation {
    #[serde(rename = "pointA")]
    pub point_a: [f64; 3],
    #[serde(rename = "pointB")]
    pub point_b: [f64; 3],
    #[serde(flatten)]
    pub meta: AnnotationMeta,
}

/// Fields shared by every annotation record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationMeta {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Segment ids the record is attached to, as decimal strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnnotationPayload {
    pub fn annotation_layers(&self) -> impl Iterator<Item = &AnnotationLayer> {
        self.layers.iter().filter_map(|layer| match layer {
            Layer::Annotation(a) => Some(a),
            _ => None,
        })
    }

    pub fn annotation_layers_mut(&mut self) -> impl Iterator<Item = &mut AnnotationLayer> {
        self.layers.iter_mut().filter_map(|layer| match layer {
            Layer::Annotation(a) => Some(a),
            _ => None,
        })
    }

    /// The first image layer, which cutouts are read from.
    pub fn first_image_layer(&self) -> Option<&VolumeLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Image(v) => Some(v),
            _ => None,
        })
    }

    /// The first segmentation layer not hidden in the viewer.
    pub fn visible_segmentation_layer(&self) -> Option<&VolumeLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Segmentation(v) if v.is_visible() => Some(v),
            _ => None,
        })
    }

    /// Voxel size of the viewer's navigation pose, if recorded.
    pub fn navigation_voxel_size(&self) -> Option<VoxelSize> {
        let size = self
            .navigation
            .as_ref()?
            .get("pose")?
            .get("position")?
            .get("voxelSize")?;
        serde_json::from_value(size.clone()).ok()
    }

    /// Voxel size annotation coordinates in `layer` are expressed in.
    pub fn annotation_voxel_size(&self, layer: &AnnotationLayer, fallback: VoxelSize) -> VoxelSize {
        layer
            .voxel_size
            .or_else(|| self.navigation_voxel_size())
            .unwrap_or(fallback)
    }

    /// Every box record across all annotation layers, in payload order.
    pub fn box_annotations(&self) -> impl Iterator<Item = &BoxAnnotation> {
        self.annotation_layers()
            .flat_map(|layer| layer.annotations.iter())
            .filter_map(|a| match a {
                Annotation::Box(b) => Some(b),
                _ => None,
            })
    }
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Image(v) | Layer::Segmentation(v) => &v.name,
            Layer::Annotation(a) => &a.name,
        }
    }
}

impl VolumeLayer {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            visible: None,
            extra: Map::new(),
        }
    }

    /// Layers are visible unless explicitly hidden.
    pub fn is_visible(&self) -> bool {
        self.visible.unwrap_or(true)
    }

    /// Source location without the `precomputed://` scheme.
    pub fn source_path(&self) -> &str {
        self.source
            .strip_prefix("precomputed://")
            .unwrap_or(&self.source)
    }
}

impl AnnotationLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Annotation {
    pub fn meta(&self) -> &AnnotationMeta {
        match self {
            Annotation::Point(p) => &p.meta,
            Annotation::Box(b) => &b.meta,
        }
    }

    /// A point record tagged with one segment.
    pub fn labeled_point(id: String, point: Point3, label: u64) -> Self {
        let p = point.to_f64();
        Annotation::Point(PointAnnotation {
            point: p,
            meta: AnnotationMeta {
                id,
                segments: vec![label.to_string()],
                ..Default::default()
            },
        })
    }

    pub fn bbox(id: String, bbox: &Box3) -> Self {
        Annotation::Box(BoxAnnotation {
            point_a: bbox.min().to_f64(),
            point_b: bbox.max().to_f64(),
            meta: AnnotationMeta {
                id,
                ..Default::default()
            },
        })
    }
}

impl PointAnnotation {
    /// Voxel coordinate of the point, truncated toward zero.
    pub fn voxel(&self) -> Point3 {
        Point3::from_f64_trunc(self.point)
    }
}

impl BoxAnnotation {
    /// The normalized box, corners truncated toward zero.
    pub fn voxel_box(&self) -> Box3 {
        Box3::from_corners(
            Point3::from_f64_trunc(self.point_a),
            Point3::from_f64_trunc(self.point_b),
        )
    }

    /// The unnormalized `[ax, ay, az, bx, by, bz]` list cutout metadata
    /// records.
    pub fn corner_list(&self) -> [i64; 6] {
        let a = Point3::from_f64_trunc(self.point_a);
        let b = Point3::from_f64_trunc(self.point_b);
        [a.x, a.y, a.z, b.x, b.y, b.z]
    }
}

/// Older viewer states store layers as an object keyed by name.
fn layers_from_list_or_map<'de, D>(deserializer: D) -> Result<Vec<Layer>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Layers {
        List(Vec<Layer>),
        Map(Map<String, Value>),
    }

    match Layers::deserialize(deserializer)? {
        Layers::List(layers) => Ok(layers),
        Layers::Map(map) => map
            .into_iter()
            .map(|(name, mut value)| {
                if let Value::Object(obj) = &mut value {
                    obj.entry("name").or_insert(Value::String(name));
                }
                serde_json::from_value(value).map_err(serde::de::Error::custom)
            })
            .collect(),
    }
}

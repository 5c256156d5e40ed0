//! Viewer payloads: the typed model, links, ids and the state store.

pub mod ids;
pub mod link;
pub mod model;
pub mod store;

pub use ids::IdGenerator;
pub use link::{
    inline_link, payload_from_json_slice, payload_from_json_str, share_link, ViewerLink,
};
pub use model::{
    Annotation, AnnotationLayer, AnnotationMeta, AnnotationPayload, BoxAnnotation, Layer,
    PointAnnotation, VolumeLayer,
};
#[cfg(feature = "remote")]
pub use store::HttpPayloadStore;
pub use store::{MemoryPayloadStore, PayloadStore};

/// Fuzzing entrypoint for payload parsing.
#[cfg(feature = "fuzzing")]
pub fn parse_payload_slice(bytes: &[u8]) -> Result<AnnotationPayload, crate::GtbotError> {
    payload_from_json_slice(bytes)
}

/// Fuzzing entrypoint for link parsing.
#[cfg(feature = "fuzzing")]
pub fn parse_viewer_link(text: &str) -> Result<ViewerLink, crate::GtbotError> {
    ViewerLink::parse(text)
}

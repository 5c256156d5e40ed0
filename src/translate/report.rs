//! Summary of one translation.

use serde::Serialize;
use std::fmt;

use crate::volume::LabeledPoint;

/// What a translation added to a payload.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TranslationReport {
    /// Point records expanded into boxes.
    pub boxes_added: usize,
    /// Segmentation queried for labels, if any.
    pub segmentation: Option<String>,
    /// Why labeling did not run, if it did not.
    pub labeling_skipped: Option<String>,
    /// Labeled points, in annotation coordinates.
    pub labeled_points: Vec<LabeledPoint>,
    /// Name of the annotation layer holding the labeled points.
    pub new_layer: Option<String>,
}

impl TranslationReport {
    pub fn segment_count(&self) -> usize {
        self.labeled_points.len()
    }
}

impl fmt::Display for TranslationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Converted {} point(s) to boxes", self.boxes_added)?;
        match (&self.segmentation, &self.labeling_skipped) {
            (Some(source), _) => {
                write!(
                    f,
                    "Found {} segment(s) in {}",
                    self.segment_count(),
                    source
                )?;
                if let Some(layer) = &self.new_layer {
                    write!(f, " (layer '{}')", layer)?;
                }
                writeln!(f)?;
            }
            (None, Some(reason)) => writeln!(f, "Segment lookup skipped: {}", reason)?,
            (None, None) => {}
        }
        Ok(())
    }
}

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::media::{MediaKind, MediaRecord};

/// Projection of a media record stored in the full-text search engine.
///
/// Derived deterministically from a [`MediaRecord`]: tags are sorted and dates
/// are rendered as RFC 3339 UTC with second precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub kind: MediaKind,
    pub format: String,
    pub width: i32,
    pub height: i32,
    pub duration: Option<f64>,
    pub tags: Vec<String>,
    pub dates: BTreeMap<String, String>,
}

impl SearchDocument {
    pub fn from_record(record: &MediaRecord) -> Self {
        let mut tags = record.tags.clone();
        tags.sort();
        tags.dedup();

        let dates = record
            .dates
            .iter()
            .map(|(name, at)| (name.clone(), at.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .collect();

        Self {
            id: record.media.id.clone(),
            kind: record.media.kind,
            format: record.media.format.clone(),
            width: record.media.width,
            height: record.media.height,
            duration: record.media.duration,
            tags,
            dates,
        }
    }

    /// Text fed to the search engine's tokenizer.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.kind.to_string(), self.format.clone()];
        parts.extend(self.tags.iter().cloned());
        parts.extend(self.dates.keys().cloned());
        parts.join(" ")
    }
}

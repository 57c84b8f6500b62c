//! Step argument attachments.
//!
//! Encodes a doc-string or data-table argument into a stored blob and returns
//! the [`Attachment`] descriptor that a step references.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::ids;
use crate::model::Attachment;
use crate::store::ArtifactStore;

pub const CSV_MIME: &str = "text/csv";
pub const TEXT_MIME: &str = "text/plain";

/// Argument carried by a finished step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepArgument {
    /// Text blob with a declared media type (short name or full type).
    DocString {
        content: String,
        #[serde(default)]
        media_type: String,
    },
    /// Tabular grid of strings.
    DataTable { rows: Vec<Vec<String>> },
}

/// Resolve a declared doc-string media type.
///
/// Short names used in feature files map to their full type, full types pass
/// through, and anything else is plain text.
pub fn resolve_media_type(declared: &str) -> &str {
    match declared.trim() {
        "json" => "application/json",
        "xml" => "application/xml",
        "csv" => CSV_MIME,
        t if t.contains('/') => t,
        _ => TEXT_MIME,
    }
}

/// File extension for a stored attachment of the given media type.
pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "application/json" => ".json",
        "application/xml" => ".xml",
        CSV_MIME => ".csv",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        _ => ".txt",
    }
}

/// Encode rows as RFC 4180 CSV.
pub fn encode_csv(rows: &[Vec<String>]) -> Vec<u8> {
    let mut out = String::new();
    for row in rows {
        let line = row
            .iter()
            .map(|cell| csv_field(cell))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out.into_bytes()
}

fn csv_field(cell: &str) -> String {
    let needs_quotes = cell.contains([',', '"', '\n', '\r']) || cell.starts_with([' ', '\t']);
    if needs_quotes {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

// ---------------------------------------------------------------------------
// AttachmentEncoder
// ---------------------------------------------------------------------------

/// Stores attachment payloads and hands back their descriptors.
#[derive(Clone)]
pub struct AttachmentEncoder {
    store: Arc<dyn ArtifactStore>,
}

impl AttachmentEncoder {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Persist `content` under a fresh storage name derived from the media type.
    pub fn encode(&self, name: &str, media_type: &str, content: &[u8]) -> Result<Attachment> {
        let attachment = Attachment {
            name: name.to_string(),
            source: format!("{}-attachment{}", ids::new_id(), extension_for(media_type)),
            media_type: media_type.to_string(),
        };

        self.store.put(&attachment.source, content)?;
        debug!(
            source = attachment.source.as_str(),
            media_type,
            bytes = content.len(),
            "attachment stored"
        );

        Ok(attachment)
    }

    /// Scalar attachment; an empty media type is stored as plain text.
    pub fn bytes_attachment(&self, content: &[u8], media_type: &str) -> Result<Attachment> {
        let media_type = if media_type.is_empty() {
            TEXT_MIME
        } else {
            media_type
        };
        self.encode("Doc", media_type, content)
    }

    /// Table attachment stored as CSV.
    pub fn table_attachment(&self, rows: &[Vec<String>]) -> Result<Attachment> {
        self.encode("Table", CSV_MIME, &encode_csv(rows))
    }

    /// Encode a step argument.
    pub fn argument(&self, argument: &StepArgument) -> Result<Attachment> {
        match argument {
            StepArgument::DocString {
                content,
                media_type,
            } => self.bytes_attachment(content.as_bytes(), resolve_media_type(media_type)),
            StepArgument::DataTable { rows } => self.table_attachment(rows),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

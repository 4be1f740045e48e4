use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store identifier for a document. Ordered, so pages can be sorted by it.
pub type DocumentId = i64;

/// An uploaded document.
///
/// Documents are soft-deleted by setting `deleted_at`; the purge job removes
/// them physically, together with their chunks, once the retention window
/// has elapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Whether the document has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for creating a document together with its content chunks.
#[derive(Debug, Clone, Default)]
pub struct CreateDocument {
    pub name: String,
    /// Chunk contents, stored with their position as `chunk_index`.
    pub chunks: Vec<String>,
}

/// Read-only view of a document eligible for purge.
///
/// Only the identifier is fetched when paging through eligible records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCandidate {
    pub id: DocumentId,
}

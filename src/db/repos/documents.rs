use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{CreateDocument, Document, DocumentId, PurgeCandidate},
};

#[async_trait]
pub trait DocumentRepo: Send + Sync {
    /// Create a document and its chunks in a single transaction
    async fn create(&self, input: CreateDocument) -> DbResult<Document>;

    /// Get a document by ID, including soft-deleted ones
    async fn get_by_id(&self, id: DocumentId) -> DbResult<Option<Document>>;

    /// Soft-delete a document by stamping `deleted_at`.
    ///
    /// Returns `NotFound` if the document does not exist or is already deleted.
    async fn soft_delete(&self, id: DocumentId, at: DateTime<Utc>) -> DbResult<()>;

    /// Count the chunks stored for a document
    async fn count_chunks(&self, document_id: DocumentId) -> DbResult<i64>;

    // ==================== Purge Operations ====================

    /// Count documents soft-deleted strictly before `cutoff`.
    async fn count_purgeable(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;

    /// Fetch one page of purgeable documents, ordered by id ascending.
    ///
    /// The page covers positions `[offset, offset + limit - 1]` of the
    /// eligible set as it exists at query time.
    async fn list_purgeable(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> DbResult<Vec<PurgeCandidate>>;

    /// Permanently delete a batch of documents and their chunks.
    ///
    /// All-or-nothing: either every listed document that is still
    /// soft-deleted is removed along with its chunks, or nothing is.
    /// Returns the number of documents removed.
    async fn purge_batch(&self, ids: &[DocumentId]) -> DbResult<u64>;
}

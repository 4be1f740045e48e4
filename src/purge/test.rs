//! In-memory document store for purge unit tests.
//!
//! Behaves like the SQL repos (strict cutoff, id ordering, atomic batch
//! delete) and lets tests fail individual fetch or delete calls.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    db::{DbError, DbResult, DocumentRepo},
    models::{CreateDocument, Document, DocumentId, PurgeCandidate},
};

#[derive(Debug, Clone)]
struct StoredDocument {
    document: Document,
    chunks: i64,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<DocumentId, StoredDocument>,
    next_id: DocumentId,
    fail_count: bool,
    panic_on_fetch: bool,
    failing_fetch_calls: HashSet<usize>,
    failing_delete_calls: HashSet<usize>,
    fetches: Vec<(u64, u32)>,
    deletes: Vec<Vec<DocumentId>>,
}

/// In-memory [`DocumentRepo`] with failure injection.
///
/// Call numbers are 1-based and count every attempt, retries included.
#[derive(Default)]
pub struct MemoryDocumentRepo {
    state: Mutex<State>,
}

impl MemoryDocumentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `count` documents soft-deleted at `deleted_at`, each with two chunks.
    pub fn seed_deleted(&self, count: usize, deleted_at: DateTime<Utc>) -> Vec<DocumentId> {
        let mut state = self.state.lock();
        (0..count)
            .map(|_| {
                state.next_id += 1;
                let id = state.next_id;
                state.documents.insert(
                    id,
                    StoredDocument {
                        document: Document {
                            id,
                            name: format!("doc-{id}"),
                            created_at: deleted_at,
                            deleted_at: Some(deleted_at),
                        },
                        chunks: 2,
                    },
                );
                id
            })
            .collect()
    }

    /// Insert a live document.
    pub fn seed_live(&self) -> DocumentId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.documents.insert(
            id,
            StoredDocument {
                document: Document {
                    id,
                    name: format!("doc-{id}"),
                    created_at: Utc::now(),
                    deleted_at: None,
                },
                chunks: 1,
            },
        );
        id
    }

    pub fn fail_count(&self) {
        self.state.lock().fail_count = true;
    }

    /// Make every page request panic, as a bug inside a batch would.
    pub fn panic_on_fetch(&self) {
        self.state.lock().panic_on_fetch = true;
    }

    pub fn fail_fetch_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.state.lock().failing_fetch_calls.extend(calls);
    }

    pub fn fail_delete_calls(&self, calls: impl IntoIterator<Item = usize>) {
        self.state.lock().failing_delete_calls.extend(calls);
    }

    /// `(offset, limit)` of every page request, in order.
    pub fn fetches(&self) -> Vec<(u64, u32)> {
        self.state.lock().fetches.clone()
    }

    /// Id sets passed to every delete call, in order.
    pub fn deletes(&self) -> Vec<Vec<DocumentId>> {
        self.state.lock().deletes.clone()
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().documents.len()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.state.lock().documents.contains_key(&id)
    }

    fn eligible(state: &State, cutoff: DateTime<Utc>) -> impl Iterator<Item = DocumentId> + '_ {
        state
            .documents
            .values()
            .filter(move |d| d.document.deleted_at.is_some_and(|at| at < cutoff))
            .map(|d| d.document.id)
    }
}

#[async_trait]
impl DocumentRepo for MemoryDocumentRepo {
    async fn create(&self, input: CreateDocument) -> DbResult<Document> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let document = Document {
            id: state.next_id,
            name: input.name,
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.documents.insert(
            document.id,
            StoredDocument {
                document: document.clone(),
                chunks: input.chunks.len() as i64,
            },
        );
        Ok(document)
    }

    async fn get_by_id(&self, id: DocumentId) -> DbResult<Option<Document>> {
        Ok(self
            .state
            .lock()
            .documents
            .get(&id)
            .map(|d| d.document.clone()))
    }

    async fn soft_delete(&self, id: DocumentId, at: DateTime<Utc>) -> DbResult<()> {
        let mut state = self.state.lock();
        match state.documents.get_mut(&id) {
            Some(stored) if stored.document.deleted_at.is_none() => {
                stored.document.deleted_at = Some(at);
                Ok(())
            }
            _ => Err(DbError::NotFound),
        }
    }

    async fn count_chunks(&self, document_id: DocumentId) -> DbResult<i64> {
        Ok(self
            .state
            .lock()
            .documents
            .get(&document_id)
            .map_or(0, |d| d.chunks))
    }

    async fn count_purgeable(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let state = self.state.lock();
        if state.fail_count {
            return Err(DbError::Internal("connection refused".into()));
        }
        Ok(Self::eligible(&state, cutoff).count() as u64)
    }

    async fn list_purgeable(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> DbResult<Vec<PurgeCandidate>> {
        let mut state = self.state.lock();
        state.fetches.push((offset, limit));
        if state.panic_on_fetch {
            drop(state);
            panic!("fetch panicked at offset {offset}");
        }
        let call = state.fetches.len();
        if state.failing_fetch_calls.contains(&call) {
            return Err(DbError::Internal(format!("fetch call {call} failed")));
        }
        Ok(Self::eligible(&state, cutoff)
            .skip(offset as usize)
            .take(limit as usize)
            .map(|id| PurgeCandidate { id })
            .collect())
    }

    async fn purge_batch(&self, ids: &[DocumentId]) -> DbResult<u64> {
        let mut state = self.state.lock();
        state.deletes.push(ids.to_vec());
        let call = state.deletes.len();
        if state.failing_delete_calls.contains(&call) {
            return Err(DbError::Internal(format!("delete call {call} failed")));
        }

        let mut removed = 0;
        for id in ids {
            let deletable = state
                .documents
                .get(id)
                .is_some_and(|d| d.document.deleted_at.is_some());
            if deletable {
                state.documents.remove(id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

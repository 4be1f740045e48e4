use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DocumentRepo,
    },
    models::{CreateDocument, Document, DocumentId, PurgeCandidate},
};

pub struct SqliteDocumentRepo {
    pool: SqlitePool,
}

impl SqliteDocumentRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn placeholders(count: usize) -> String {
        (0..count).map(|_| "?").collect::<Vec<_>>().join(",")
    }
}

#[async_trait]
impl DocumentRepo for SqliteDocumentRepo {
    async fn create(&self, input: CreateDocument) -> DbResult<Document> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (name, created_at)
            VALUES (?, ?)
            "#,
        )
        .bind(&input.name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        for (index, content) in input.chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, content)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(index as i64)
            .bind(content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Document {
            id,
            name: input.name,
            created_at: now,
            deleted_at: None,
        })
    }

    async fn get_by_id(&self, id: DocumentId) -> DbResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_at, deleted_at
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Document {
            id: row.get("id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
            deleted_at: row.get("deleted_at"),
        }))
    }

    async fn soft_delete(&self, id: DocumentId, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET deleted_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    async fn count_chunks(&self, document_id: DocumentId) -> DbResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM document_chunks
            WHERE document_id = ?
            "#,
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    // ==================== Purge Operations ====================

    async fn count_purgeable(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM documents
            WHERE deleted_at IS NOT NULL AND deleted_at < ?
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn list_purgeable(
        &self,
        cutoff: DateTime<Utc>,
        offset: u64,
        limit: u32,
    ) -> DbResult<Vec<PurgeCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id
            FROM documents
            WHERE deleted_at IS NOT NULL AND deleted_at < ?
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PurgeCandidate { id: row.get("id") })
            .collect())
    }

    async fn purge_batch(&self, ids: &[DocumentId]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = Self::placeholders(ids.len());
        let mut tx = self.pool.begin().await?;

        // Chunks first so no orphaned rows survive a partial batch
        let chunks_query = format!(
            r#"
            DELETE FROM document_chunks
            WHERE document_id IN (
                SELECT id FROM documents
                WHERE id IN ({}) AND deleted_at IS NOT NULL
            )
            "#,
            placeholders
        );
        let mut query_builder = sqlx::query(&chunks_query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        let chunks_deleted = query_builder.execute(&mut *tx).await?.rows_affected();

        let documents_query = format!(
            r#"
            DELETE FROM documents
            WHERE id IN ({}) AND deleted_at IS NOT NULL
            "#,
            placeholders
        );
        let mut query_builder = sqlx::query(&documents_query);
        for id in ids {
            query_builder = query_builder.bind(id);
        }
        let documents_deleted = query_builder.execute(&mut *tx).await?.rows_affected();

        // Dropping `tx` without commit on any `?` above rolls the batch back
        tx.commit().await?;

        tracing::trace!(
            documents = documents_deleted,
            chunks = chunks_deleted,
            "Purged document batch"
        );

        Ok(documents_deleted)
    }
}

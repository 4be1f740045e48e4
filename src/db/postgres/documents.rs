use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::DocumentRepo,
    },
    models::{CreateDocument, Document, DocumentId, PurgeCandidate},
};

pub struct PostgresDocumentRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresDocumentRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }
}

#[async_trait]
impl DocumentRepo for PostgresDocumentRepo {
    async fn create(&self, input: CreateDocument) -> DbResult<Document> {
        let now = Utc::now();
        let mut tx = self.write_pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO documents (name, created_at)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(&input.name)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let id: i64 = row.get("id");

        for (index, content) in input.chunks.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, content)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(id)
            .bind(index as i32)
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
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.read_pool)
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
            SET deleted_at = $1
            WHERE id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(&self.write_pool)
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
            WHERE document_id = $1
            "#,
        )
        .bind(document_id)
        .fetch_one(&self.read_pool)
        .await?;

        Ok(row.get("count"))
    }

    // ==================== Purge Operations ====================

    // Purge reads go to the write pool: a lagging replica would hand out
    // windows that no longer match what the deletes see.

    async fn count_purgeable(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM documents
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.write_pool)
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
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
            ORDER BY id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .bind(offset as i64)
        .fetch_all(&self.write_pool)
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

        let mut tx = self.write_pool.begin().await?;

        // Lock the documents first so a concurrent restore cannot slip in
        // between the chunk delete and the document delete
        let locked = sqlx::query(
            r#"
            SELECT id FROM documents
            WHERE id = ANY($1) AND deleted_at IS NOT NULL
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        let locked_ids: Vec<i64> = locked.into_iter().map(|row| row.get("id")).collect();

        let chunks_deleted = sqlx::query(
            r#"
            DELETE FROM document_chunks
            WHERE document_id = ANY($1)
            "#,
        )
        .bind(&locked_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let documents_deleted = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE id = ANY($1)
            "#,
        )
        .bind(&locked_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        tracing::trace!(
            documents = documents_deleted,
            chunks = chunks_deleted,
            "Purged document batch"
        );

        Ok(documents_deleted)
    }
}

//! Test harness for document store tests
//!
//! - SQLite: in-memory databases with the real migrations applied
//! - PostgreSQL: one shared testcontainers instance, one schema per test
//! - Seeding helpers for building soft-deleted fixtures at fixed timestamps

use chrono::{DateTime, Utc};
#[cfg(feature = "database-sqlite")]
use sqlx::SqlitePool;

use crate::{
    db::repos::DocumentRepo,
    models::{CreateDocument, DocumentId},
};

/// Create an in-memory SQLite pool with migrations applied
#[cfg(feature = "database-sqlite")]
pub async fn create_sqlite_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(&pool)
        .await
        .expect("Failed to run SQLite migrations");

    pool
}

/// Insert `count` documents with `chunks_per_document` chunks each and
/// soft-delete them at `deleted_at`. Returns the ids in insertion order.
pub async fn seed_deleted_documents(
    repo: &dyn DocumentRepo,
    count: usize,
    chunks_per_document: usize,
    deleted_at: DateTime<Utc>,
) -> Vec<DocumentId> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let document = repo
            .create(CreateDocument {
                name: format!("doc-{i}.pdf"),
                chunks: (0..chunks_per_document)
                    .map(|c| format!("chunk {c} of doc {i}"))
                    .collect(),
            })
            .await
            .expect("Failed to create document");
        repo.soft_delete(document.id, deleted_at)
            .await
            .expect("Failed to soft-delete document");
        ids.push(document.id);
    }
    ids
}

/// Insert a document that is never soft-deleted.
pub async fn seed_live_document(repo: &dyn DocumentRepo, name: &str) -> DocumentId {
    repo.create(CreateDocument {
        name: name.to_string(),
        chunks: vec!["live chunk".to_string()],
    })
    .await
    .expect("Failed to create document")
    .id
}

/// Parse an RFC 3339 timestamp for fixtures.
pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid RFC 3339 timestamp")
        .with_timezone(&Utc)
}

/// PostgreSQL test harness using testcontainers
#[cfg(feature = "database-postgres")]
pub mod postgres {
    use std::sync::OnceLock;

    use sqlx::PgPool;
    use testcontainers_modules::{
        postgres::Postgres,
        testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner},
    };
    use tokio::sync::OnceCell;

    struct SharedContainer {
        #[allow(dead_code)] // keeps the container alive for the whole test run
        container: ContainerAsync<Postgres>,
        connection_string: String,
    }

    static SHARED_CONTAINER: OnceLock<OnceCell<SharedContainer>> = OnceLock::new();

    async fn get_shared_container() -> &'static SharedContainer {
        let cell = SHARED_CONTAINER.get_or_init(OnceCell::new);
        cell.get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("17-alpine")
                .start()
                .await
                .expect("Failed to start PostgreSQL container");

            let host = container.get_host().await.expect("Failed to get host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("Failed to get port");

            SharedContainer {
                container,
                connection_string: format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
            }
        })
        .await
    }

    /// Create a pool bound to a fresh schema with migrations applied.
    ///
    /// Each test gets its own `search_path`, so tests can run in parallel
    /// against the single shared container.
    pub async fn create_isolated_postgres_pool() -> PgPool {
        let shared = get_shared_container().await;

        let admin_pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&shared.connection_string)
            .await
            .expect("Failed to connect to PostgreSQL");

        let schema_name = format!("purge_test_{}", uuid::Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE SCHEMA \"{}\"", schema_name))
            .execute(&admin_pool)
            .await
            .expect("Failed to create test schema");

        let isolated_url = format!(
            "{}?options=-c search_path={}",
            shared.connection_string, schema_name
        );

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&isolated_url)
            .await
            .expect("Failed to connect to isolated schema");

        sqlx::migrate!("./migrations_sqlx/postgres")
            .run(&pool)
            .await
            .expect("Failed to run PostgreSQL migrations");

        pool
    }
}

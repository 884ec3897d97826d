use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use vista_core::models::SearchDocument;
use vista_core::StoreResult;

use crate::db::media::fetch_record;
use crate::db::transaction::TransactionGuard;
use crate::traits::{Reconciled, SearchIndex, SearchReconciler};

/// First key of the advisory locks serializing reconciliations of one media.
const RECONCILE_LOCK_CLASS: i32 = 0x5653;

/// Take the transaction-scoped reconciliation lock of `media_id`.
pub(crate) async fn lock_search_document(
    conn: &mut PgConnection,
    media_id: &str,
) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
        .bind(RECONCILE_LOCK_CLASS)
        .bind(media_id)
        .execute(conn)
        .await?;

    Ok(())
}

async fn upsert_document(conn: &mut PgConnection, document: &SearchDocument) -> StoreResult<()> {
    let body = serde_json::to_value(document)?;

    sqlx::query(
        r#"
        INSERT INTO search_documents (id, document, tsv, updated_at)
        VALUES ($1, $2, to_tsvector('simple', $3), NOW())
        ON CONFLICT (id) DO UPDATE SET
            document = EXCLUDED.document,
            tsv = EXCLUDED.tsv,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&document.id)
    .bind(body)
    .bind(document.searchable_text())
    .execute(conn)
    .await?;

    Ok(())
}

async fn delete_document(conn: &mut PgConnection, id: &str) -> StoreResult<()> {
    sqlx::query("DELETE FROM search_documents WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Search engine backed by a Postgres `tsvector` column.
///
/// Queries use `websearch_to_tsquery`, so quoted phrases, `or` and `-term`
/// exclusions behave as in common web search boxes.
#[derive(Clone)]
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    #[tracing::instrument(skip(self, document), fields(db.table = "search_documents", db.operation = "upsert", media.id = %document.id))]
    async fn upsert(&self, document: &SearchDocument) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_document(&mut conn, document).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "search_documents", db.operation = "delete"))]
    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        delete_document(&mut conn, id).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "search_documents", db.operation = "select"))]
    async fn get(&self, id: &str) -> StoreResult<Option<SearchDocument>> {
        let body: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT document FROM search_documents WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match body {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "search_documents", db.operation = "search", db.limit = %limit))]
    async fn query(&self, expression: &str, limit: i64) -> StoreResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM search_documents, websearch_to_tsquery('simple', $1) q
            WHERE tsv @@ q
            ORDER BY ts_rank(tsv, q) DESC, id
            LIMIT $2
            "#,
        )
        .bind(expression)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

/// Reconciles inside one transaction holding the media's advisory lock.
///
/// The transaction runs at READ COMMITTED, so the record is read after every
/// competing reconciliation (and every `PgMediaStore::delete`) of the same id
/// has committed.
#[derive(Clone)]
pub struct PgSearchReconciler {
    pool: PgPool,
}

impl PgSearchReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SearchReconciler for PgSearchReconciler {
    #[tracing::instrument(skip(self), fields(db.table = "search_documents", db.operation = "reconcile"))]
    async fn reconcile(&self, media_id: &str) -> StoreResult<Reconciled> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "reconcile_search").await?;
        lock_search_document(&mut tx, media_id).await?;

        let outcome = match fetch_record(&mut tx, media_id).await? {
            Some(record) => {
                let document = SearchDocument::from_record(&record);
                upsert_document(&mut tx, &document).await?;
                tracing::debug!(media.id = %media_id, tags = document.tags.len(), "Search document upserted");
                Reconciled::Upserted
            }
            None => {
                delete_document(&mut tx, media_id).await?;
                tracing::debug!(media.id = %media_id, "Media gone, search document removed");
                Reconciled::Deleted
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Row};
use std::collections::BTreeMap;

use vista_core::models::{Media, MediaRecord, NewMedia};
use vista_core::{StoreError, StoreResult};

use crate::db::search::lock_search_document;
use crate::db::transaction::TransactionGuard;
use crate::traits::MediaStore;

const MEDIA_COLUMNS: &str = "id, kind, format, width, height, duration, created_at";

#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Find or create a row of a name-keyed dimension table and return its id.
pub(crate) async fn find_or_create_name(
    conn: &mut PgConnection,
    table: &'static str,
    name: &str,
) -> StoreResult<i64> {
    // DO UPDATE (instead of DO NOTHING) so RETURNING yields the existing row.
    let id: i64 = sqlx::query_scalar(&format!(
        "INSERT INTO {table} (name) VALUES ($1) \
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
         RETURNING id"
    ))
    .bind(name)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Load a media row with its sorted tag names and date map.
pub(crate) async fn fetch_record(
    conn: &mut PgConnection,
    id: &str,
) -> StoreResult<Option<MediaRecord>> {
    let media = sqlx::query_as::<Postgres, Media>(&format!(
        "SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(media) = media else {
        return Ok(None);
    };

    let tags: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT t.name
        FROM media_tags mt
        JOIN tags t ON t.id = mt.tag_id
        WHERE mt.media_id = $1
        ORDER BY t.name
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let date_rows = sqlx::query(
        r#"
        SELECT d.name, md.at
        FROM media_dates md
        JOIN date_names d ON d.id = md.date_name_id
        WHERE md.media_id = $1
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let dates: BTreeMap<String, DateTime<Utc>> = date_rows
        .iter()
        .map(|row| (row.get::<String, _>("name"), row.get::<DateTime<Utc>, _>("at")))
        .collect();

    Ok(Some(MediaRecord { media, tags, dates }))
}

async fn lock_media(conn: &mut PgConnection, id: &str) -> StoreResult<()> {
    let found: Option<String> = sqlx::query_scalar("SELECT id FROM media WHERE id = $1 FOR SHARE")
        .bind(id)
        .fetch_optional(conn)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| StoreError::NotFound(format!("media {}", id)))
}

#[async_trait]
impl MediaStore for PgMediaStore {
    #[tracing::instrument(skip(self, media, tags, dates), fields(db.table = "media", db.operation = "insert", media.id = %media.id))]
    async fn create_media(
        &self,
        media: NewMedia,
        tags: &[&str],
        dates: &[(&str, DateTime<Utc>)],
    ) -> StoreResult<Media> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "create_media").await?;

        let inserted = sqlx::query_as::<Postgres, Media>(&format!(
            r#"
            INSERT INTO media (id, kind, format, width, height, duration)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MEDIA_COLUMNS}
            "#
        ))
        .bind(&media.id)
        .bind(media.kind)
        .bind(&media.format)
        .bind(media.width)
        .bind(media.height)
        .bind(media.duration)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::AlreadyExists(_) => StoreError::AlreadyExists(format!("media {}", media.id)),
            other => other,
        })?;

        for (name, at) in dates {
            let date_name_id = find_or_create_name(&mut tx, "date_names", name).await?;
            sqlx::query(
                r#"
                INSERT INTO media_dates (media_id, date_name_id, at)
                VALUES ($1, $2, $3)
                ON CONFLICT (media_id, date_name_id) DO UPDATE SET at = EXCLUDED.at
                "#,
            )
            .bind(&media.id)
            .bind(date_name_id)
            .bind(at)
            .execute(&mut **tx)
            .await?;
        }

        for name in tags {
            let tag_id = find_or_create_name(&mut tx, "tags", name).await?;
            sqlx::query(
                "INSERT INTO media_tags (media_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(&media.id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            media.id = %inserted.id,
            media.kind = %inserted.kind,
            width = inserted.width,
            height = inserted.height,
            "Media record created"
        );

        Ok(inserted)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "exists"))]
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM media WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select"))]
    async fn get(&self, id: &str) -> StoreResult<Option<Media>> {
        let media = sqlx::query_as::<Postgres, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(media)
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "media", db.operation = "select_many", count = ids.len()))]
    async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Media>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let media = sqlx::query_as::<Postgres, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(media)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select_record"))]
    async fn get_record(&self, id: &str) -> StoreResult<Option<MediaRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    #[tracing::instrument(skip(self, tags), fields(db.table = "media_tags", db.operation = "insert"))]
    async fn add_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "add_tags").await?;
        lock_media(&mut tx, id).await?;

        for name in tags {
            let tag_id = find_or_create_name(&mut tx, "tags", name).await?;
            sqlx::query(
                "INSERT INTO media_tags (media_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
        }

        tx.commit().await
    }

    #[tracing::instrument(skip(self, tags), fields(db.table = "media_tags", db.operation = "delete"))]
    async fn remove_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
        sqlx::query(
            r#"
            DELETE FROM media_tags mt
            USING tags t
            WHERE mt.tag_id = t.id AND mt.media_id = $1 AND t.name = ANY($2)
            "#,
        )
        .bind(id)
        .bind(tags)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_dates", db.operation = "upsert"))]
    async fn set_date(&self, id: &str, name: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "set_date").await?;
        lock_media(&mut tx, id).await?;

        let date_name_id = find_or_create_name(&mut tx, "date_names", name).await?;
        sqlx::query(
            r#"
            INSERT INTO media_dates (media_id, date_name_id, at)
            VALUES ($1, $2, $3)
            ON CONFLICT (media_id, date_name_id) DO UPDATE SET at = EXCLUDED.at
            "#,
        )
        .bind(id)
        .bind(date_name_id)
        .bind(at)
        .execute(&mut **tx)
        .await?;

        tx.commit().await
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "delete"))]
    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "delete_media").await?;
        // Waits for an in-flight reconciliation of this id to commit first.
        lock_search_document(&mut tx, id).await?;

        // Edges and vectors go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM media WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "list_ids"))]
    async fn list_ids(&self, after: Option<&str>, limit: i64) -> StoreResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM media
            WHERE $1::text IS NULL OR id > $1
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

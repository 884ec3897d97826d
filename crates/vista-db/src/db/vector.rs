use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;

use vista_core::{StoreError, StoreResult};

use crate::db::media::find_or_create_name;
use crate::db::transaction::TransactionGuard;
use crate::traits::VectorStore;

#[derive(Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    #[tracing::instrument(skip(self, vectors), fields(db.table = "media_vectors", db.operation = "replace", spaces = vectors.len()))]
    async fn replace_vectors(
        &self,
        media_id: &str,
        vectors: Vec<(String, Vec<f32>)>,
    ) -> StoreResult<()> {
        let mut tx = TransactionGuard::begin_labeled(&self.pool, "replace_vectors").await?;

        // Holding a share lock keeps a concurrent delete from slipping in
        // between the check and the inserts.
        let found: Option<String> =
            sqlx::query_scalar("SELECT id FROM media WHERE id = $1 FOR SHARE")
                .bind(media_id)
                .fetch_optional(&mut **tx)
                .await?;
        if found.is_none() {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("media {}", media_id)));
        }

        sqlx::query("DELETE FROM media_vectors WHERE media_id = $1")
            .bind(media_id)
            .execute(&mut **tx)
            .await?;

        for (space, embedding) in vectors {
            let space_id = find_or_create_name(&mut tx, "vector_spaces", &space).await?;
            sqlx::query(
                "INSERT INTO media_vectors (media_id, space_id, embedding) VALUES ($1, $2, $3)",
            )
            .bind(media_id)
            .bind(space_id)
            .bind(Vector::from(embedding))
            .execute(&mut **tx)
            .await?;
        }

        tx.commit().await
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_vectors", db.operation = "select"))]
    async fn get_vector(&self, media_id: &str, space: &str) -> StoreResult<Option<Vec<f32>>> {
        let vector: Option<Vector> = sqlx::query_scalar(
            r#"
            SELECT v.embedding
            FROM media_vectors v
            JOIN vector_spaces s ON s.id = v.space_id
            WHERE v.media_id = $1 AND s.name = $2
            "#,
        )
        .bind(media_id)
        .bind(space)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vector.map(|v| v.to_vec()))
    }

    #[tracing::instrument(skip(self, vector), fields(db.table = "media_vectors", db.operation = "vector_search", db.limit = %limit))]
    async fn nearest(
        &self,
        space: &str,
        vector: &[f32],
        limit: i64,
        exclude_id: Option<&str>,
    ) -> StoreResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT v.media_id
            FROM media_vectors v
            JOIN vector_spaces s ON s.id = v.space_id
            WHERE s.name = $2
                AND ($3::text IS NULL OR v.media_id <> $3)
            ORDER BY v.embedding <=> $1, v.media_id
            LIMIT $4
            "#,
        )
        .bind(Vector::from(vector.to_vec()))
        .bind(space)
        .bind(exclude_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

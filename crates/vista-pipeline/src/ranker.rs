//! Nearest-neighbour ranking over stored embeddings.

use std::collections::HashMap;
use std::sync::Arc;

use vista_core::models::Media;
use vista_core::{StoreError, StoreResult};
use vista_db::{MediaStore, VectorStore};

/// Ranks media by cosine distance to a query vector.
#[derive(Clone)]
pub struct SimilarityRanker {
    media: Arc<dyn MediaStore>,
    vectors: Arc<dyn VectorStore>,
}

impl SimilarityRanker {
    pub fn new(media: Arc<dyn MediaStore>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { media, vectors }
    }

    /// Media of `space` closest to `vector`, best first.
    ///
    /// Returns an empty list for a non-positive `limit` or an empty vector.
    /// Ids whose record disappeared between the two lookups are dropped.
    #[tracing::instrument(skip(self, vector), fields(dimensions = vector.len()))]
    pub async fn rank_by_similarity(
        &self,
        space: &str,
        vector: &[f32],
        limit: i64,
        exclude_id: Option<&str>,
    ) -> StoreResult<Vec<Media>> {
        if limit <= 0 || vector.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self
            .vectors
            .nearest(space, vector, limit, exclude_id)
            .await?;
        self.fetch_in_order(&ids).await
    }

    /// Media most similar to an existing media, excluding itself.
    pub async fn similar_to(
        &self,
        media_id: &str,
        space: &str,
        limit: i64,
    ) -> StoreResult<Vec<Media>> {
        let vector = self
            .vectors
            .get_vector(media_id, space)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("{} vector for media {}", space, media_id))
            })?;
        self.rank_by_similarity(space, &vector, limit, Some(media_id))
            .await
    }

    /// Load `ids` and return them in the same order. The store returns rows
    /// in arbitrary order.
    pub async fn fetch_in_order(&self, ids: &[String]) -> StoreResult<Vec<Media>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<String, Media> = self
            .media
            .get_many(ids)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use vista_core::models::{Media, MediaRecord, NewMedia};
use vista_core::vector::cosine_distance;
use vista_core::{StoreError, StoreResult};

use crate::traits::{MediaStore, VectorStore};

struct StoredMedia {
    media: Media,
    tags: BTreeSet<String>,
    dates: BTreeMap<String, DateTime<Utc>>,
    vectors: HashMap<String, Vec<f32>>,
}

/// Media rows, their edges and their vectors behind one lock.
///
/// Vectors live inside the media entry so that deleting a media row drops
/// them too, matching the cascading foreign keys of the relational schema.
#[derive(Clone, Default)]
pub struct MemoryMediaStore {
    inner: Arc<Mutex<BTreeMap<String, StoredMedia>>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound(format!("media {}", id))
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn create_media(
        &self,
        media: NewMedia,
        tags: &[&str],
        dates: &[(&str, DateTime<Utc>)],
    ) -> StoreResult<Media> {
        let mut rows = self.inner.lock().await;
        if rows.contains_key(&media.id) {
            return Err(StoreError::AlreadyExists(format!("media {}", media.id)));
        }

        let row = Media {
            id: media.id,
            kind: media.kind,
            format: media.format,
            width: media.width,
            height: media.height,
            duration: media.duration,
            created_at: Utc::now(),
        };

        rows.insert(
            row.id.clone(),
            StoredMedia {
                media: row.clone(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                dates: dates.iter().map(|(n, at)| (n.to_string(), *at)).collect(),
                vectors: HashMap::new(),
            },
        );

        Ok(row)
    }

    async fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().await.contains_key(id))
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Media>> {
        Ok(self.inner.lock().await.get(id).map(|s| s.media.clone()))
    }

    async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Media>> {
        let rows = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|s| s.media.clone()))
            .collect())
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<MediaRecord>> {
        let rows = self.inner.lock().await;
        Ok(rows.get(id).map(|s| MediaRecord {
            media: s.media.clone(),
            tags: s.tags.iter().cloned().collect(),
            dates: s.dates.clone(),
        }))
    }

    async fn add_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
        let mut rows = self.inner.lock().await;
        let stored = rows.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.tags.extend(tags.iter().cloned());
        Ok(())
    }

    async fn remove_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
        let mut rows = self.inner.lock().await;
        if let Some(stored) = rows.get_mut(id) {
            for tag in tags {
                stored.tags.remove(tag);
            }
        }
        Ok(())
    }

    async fn set_date(&self, id: &str, name: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut rows = self.inner.lock().await;
        let stored = rows.get_mut(id).ok_or_else(|| not_found(id))?;
        stored.dates.insert(name.to_string(), at);
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().await.remove(id).is_some())
    }

    async fn list_ids(&self, after: Option<&str>, limit: i64) -> StoreResult<Vec<String>> {
        let rows = self.inner.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(rows
            .keys()
            .filter(|id| after.map_or(true, |after| id.as_str() > after))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VectorStore for MemoryMediaStore {
    async fn replace_vectors(
        &self,
        media_id: &str,
        vectors: Vec<(String, Vec<f32>)>,
    ) -> StoreResult<()> {
        let mut rows = self.inner.lock().await;
        let stored = rows.get_mut(media_id).ok_or_else(|| not_found(media_id))?;
        stored.vectors = vectors.into_iter().collect();
        Ok(())
    }

    async fn get_vector(&self, media_id: &str, space: &str) -> StoreResult<Option<Vec<f32>>> {
        let rows = self.inner.lock().await;
        Ok(rows
            .get(media_id)
            .and_then(|s| s.vectors.get(space).cloned()))
    }

    async fn nearest(
        &self,
        space: &str,
        vector: &[f32],
        limit: i64,
        exclude_id: Option<&str>,
    ) -> StoreResult<Vec<String>> {
        let rows = self.inner.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut scored: Vec<(f32, &String)> = rows
            .iter()
            .filter(|(id, _)| exclude_id != Some(id.as_str()))
            .filter_map(|(id, s)| {
                s.vectors
                    .get(space)
                    .map(|v| (cosine_distance(vector, v), id))
            })
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_core::models::MediaKind;

    fn image(id: &str) -> NewMedia {
        NewMedia {
            id: id.to_string(),
            kind: MediaKind::Image,
            format: "png".to_string(),
            width: 800,
            height: 600,
            duration: None,
        }
    }

    #[tokio::test]
    async fn test_create_media_with_edges() {
        let store = MemoryMediaStore::new();
        let now = Utc::now();
        store
            .create_media(image("abc123"), &["tagme"], &[("upload", now)])
            .await
            .unwrap();

        let record = store.get_record("abc123").await.unwrap().unwrap();
        assert_eq!(record.media.width, 800);
        assert_eq!(record.tags, vec!["tagme"]);
        assert_eq!(record.dates.get("upload"), Some(&now));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_already_exists() {
        let store = MemoryMediaStore::new();
        store.create_media(image("abc123"), &[], &[]).await.unwrap();

        let result = store.create_media(image("abc123"), &[], &[]).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_tags_on_missing_media_fail() {
        let store = MemoryMediaStore::new();
        let result = store.add_tags("nope", &["cat".to_string()]).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_tags_are_sorted_and_removable() {
        let store = MemoryMediaStore::new();
        store.create_media(image("abc123"), &["tagme"], &[]).await.unwrap();
        store
            .add_tags("abc123", &["dog".to_string(), "cat".to_string()])
            .await
            .unwrap();
        store.remove_tags("abc123", &["tagme".to_string()]).await.unwrap();

        let record = store.get_record("abc123").await.unwrap().unwrap();
        assert_eq!(record.tags, vec!["cat", "dog"]);
    }

    #[tokio::test]
    async fn test_replace_vectors_requires_media() {
        let store = MemoryMediaStore::new();
        let result = store
            .replace_vectors("abc123", vec![("vision".to_string(), vec![1.0, 0.0])])
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_vectors_drops_old_spaces() {
        let store = MemoryMediaStore::new();
        store.create_media(image("abc123"), &[], &[]).await.unwrap();
        store
            .replace_vectors("abc123", vec![("old".to_string(), vec![1.0])])
            .await
            .unwrap();
        store
            .replace_vectors("abc123", vec![("vision".to_string(), vec![0.0, 1.0])])
            .await
            .unwrap();

        assert!(store.get_vector("abc123", "old").await.unwrap().is_none());
        assert_eq!(
            store.get_vector("abc123", "vision").await.unwrap(),
            Some(vec![0.0, 1.0])
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_vectors() {
        let store = MemoryMediaStore::new();
        store.create_media(image("abc123"), &[], &[]).await.unwrap();
        store
            .replace_vectors("abc123", vec![("vision".to_string(), vec![1.0])])
            .await
            .unwrap();

        assert!(store.delete("abc123").await.unwrap());
        assert!(!store.delete("abc123").await.unwrap());
        assert!(store
            .nearest("vision", &[1.0], 10, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_nearest_orders_by_cosine_distance() {
        let store = MemoryMediaStore::new();
        for (id, v) in [
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("c", vec![0.7, 0.7]),
        ] {
            store.create_media(image(id), &[], &[]).await.unwrap();
            store
                .replace_vectors(id, vec![("vision".to_string(), v)])
                .await
                .unwrap();
        }

        let ids = store.nearest("vision", &[1.0, 0.1], 10, None).await.unwrap();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let ids = store
            .nearest("vision", &[1.0, 0.1], 1, Some("a"))
            .await
            .unwrap();
        assert_eq!(ids, vec!["c"]);
    }

    #[tokio::test]
    async fn test_list_ids_pages_in_order() {
        let store = MemoryMediaStore::new();
        for id in ["c", "a", "b"] {
            store.create_media(image(id), &[], &[]).await.unwrap();
        }

        assert_eq!(store.list_ids(None, 2).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_ids(Some("b"), 2).await.unwrap(), vec!["c"]);
    }
}

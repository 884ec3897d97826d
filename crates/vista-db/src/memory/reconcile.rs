use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;

use vista_core::models::SearchDocument;
use vista_core::StoreResult;

use crate::traits::{MediaStore, Reconciled, SearchIndex, SearchReconciler};

const LOCK_SHARDS: usize = 64;

/// Reconciler over any pair of media store and search index, serialized per
/// media id by a sharded lock.
///
/// Only reconciliations take the lock, so edits must reconcile after they
/// commit: a run that read a record before an edit then always finishes
/// before the run that reads the edit.
#[derive(Clone)]
pub struct MemorySearchReconciler {
    media: Arc<dyn MediaStore>,
    search: Arc<dyn SearchIndex>,
    shards: Arc<Vec<Mutex<()>>>,
}

impl MemorySearchReconciler {
    pub fn new(media: Arc<dyn MediaStore>, search: Arc<dyn SearchIndex>) -> Self {
        let shards = (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect();
        Self {
            media,
            search,
            shards: Arc::new(shards),
        }
    }

    fn shard(&self, media_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        media_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % LOCK_SHARDS]
    }
}

#[async_trait]
impl SearchReconciler for MemorySearchReconciler {
    #[tracing::instrument(skip(self))]
    async fn reconcile(&self, media_id: &str) -> StoreResult<Reconciled> {
        let _guard = self.shard(media_id).lock().await;

        match self.media.get_record(media_id).await? {
            Some(record) => {
                let document = SearchDocument::from_record(&record);
                self.search.upsert(&document).await?;
                tracing::debug!(media.id = %media_id, tags = document.tags.len(), "Search document upserted");
                Ok(Reconciled::Upserted)
            }
            None => {
                self.search.delete(media_id).await?;
                tracing::debug!(media.id = %media_id, "Media gone, search document removed");
                Ok(Reconciled::Deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    use vista_core::models::{Media, MediaKind, MediaRecord, NewMedia};

    use crate::{MemoryMediaStore, MemorySearchIndex};

    fn png(id: &str) -> NewMedia {
        NewMedia {
            id: id.to_string(),
            kind: MediaKind::Image,
            format: "png".into(),
            width: 800,
            height: 600,
            duration: None,
        }
    }

    fn reconciler(media: &MemoryMediaStore, search: &MemorySearchIndex) -> MemorySearchReconciler {
        MemorySearchReconciler::new(Arc::new(media.clone()), Arc::new(search.clone()))
    }

    /// Stalls the first `get_record` after it has read the record, until
    /// released.
    struct StallingStore {
        inner: MemoryMediaStore,
        armed: AtomicBool,
        read_done: Notify,
        release: Notify,
    }

    #[async_trait]
    impl MediaStore for StallingStore {
        async fn create_media(
            &self,
            media: NewMedia,
            tags: &[&str],
            dates: &[(&str, DateTime<Utc>)],
        ) -> StoreResult<Media> {
            self.inner.create_media(media, tags, dates).await
        }

        async fn exists(&self, id: &str) -> StoreResult<bool> {
            self.inner.exists(id).await
        }

        async fn get(&self, id: &str) -> StoreResult<Option<Media>> {
            self.inner.get(id).await
        }

        async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Media>> {
            self.inner.get_many(ids).await
        }

        async fn get_record(&self, id: &str) -> StoreResult<Option<MediaRecord>> {
            let record = self.inner.get_record(id).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.read_done.notify_one();
                self.release.notified().await;
            }
            record
        }

        async fn add_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
            self.inner.add_tags(id, tags).await
        }

        async fn remove_tags(&self, id: &str, tags: &[String]) -> StoreResult<()> {
            self.inner.remove_tags(id, tags).await
        }

        async fn set_date(&self, id: &str, name: &str, at: DateTime<Utc>) -> StoreResult<()> {
            self.inner.set_date(id, name, at).await
        }

        async fn delete(&self, id: &str) -> StoreResult<bool> {
            self.inner.delete(id).await
        }

        async fn list_ids(&self, after: Option<&str>, limit: i64) -> StoreResult<Vec<String>> {
            self.inner.list_ids(after, limit).await
        }
    }

    #[tokio::test]
    async fn test_upserts_projection_of_record() {
        let media = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        media
            .create_media(png("abc123"), &["tagme"], &[("upload", Utc::now())])
            .await
            .unwrap();

        let outcome = reconciler(&media, &search).reconcile("abc123").await.unwrap();
        assert_eq!(outcome, Reconciled::Upserted);

        let doc = search.get("abc123").await.unwrap().unwrap();
        assert_eq!(doc.tags, vec!["tagme"]);
        assert!(doc.dates.contains_key("upload"));
    }

    #[tokio::test]
    async fn test_missing_record_deletes_document() {
        let media = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        let reconciler = reconciler(&media, &search);
        media.create_media(png("abc123"), &[], &[]).await.unwrap();
        reconciler.reconcile("abc123").await.unwrap();

        media.delete("abc123").await.unwrap();
        let outcome = reconciler.reconcile("abc123").await.unwrap();
        assert_eq!(outcome, Reconciled::Deleted);
        assert!(search.get("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_an_error() {
        let media = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        let outcome = reconciler(&media, &search)
            .reconcile("never-seen")
            .await
            .unwrap();
        assert_eq!(outcome, Reconciled::Deleted);
    }

    #[tokio::test]
    async fn test_stale_read_cannot_outlive_delete() {
        let inner = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        inner
            .create_media(png("abc123"), &["tagme"], &[])
            .await
            .unwrap();

        let store = Arc::new(StallingStore {
            inner: inner.clone(),
            armed: AtomicBool::new(true),
            read_done: Notify::new(),
            release: Notify::new(),
        });
        let reconciler = MemorySearchReconciler::new(store.clone(), Arc::new(search.clone()));

        // Index run reads the record, then stalls before writing.
        let indexing = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile("abc123").await })
        };
        store.read_done.notified().await;

        // The delete commits and its post-commit reconciliation starts.
        assert!(inner.delete("abc123").await.unwrap());
        let after_delete = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile("abc123").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!after_delete.is_finished());

        store.release.notify_one();
        assert_eq!(indexing.await.unwrap().unwrap(), Reconciled::Upserted);
        assert_eq!(after_delete.await.unwrap().unwrap(), Reconciled::Deleted);

        assert!(!inner.exists("abc123").await.unwrap());
        assert!(search.get("abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_tags_are_overwritten() {
        let inner = MemoryMediaStore::new();
        let search = MemorySearchIndex::new();
        inner
            .create_media(png("abc123"), &["tagme"], &[])
            .await
            .unwrap();

        let store = Arc::new(StallingStore {
            inner: inner.clone(),
            armed: AtomicBool::new(true),
            read_done: Notify::new(),
            release: Notify::new(),
        });
        let reconciler = MemorySearchReconciler::new(store.clone(), Arc::new(search.clone()));

        let indexing = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile("abc123").await })
        };
        store.read_done.notified().await;

        inner
            .add_tags("abc123", &["beach".to_string()])
            .await
            .unwrap();
        let after_edit = {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile("abc123").await })
        };

        store.release.notify_one();
        indexing.await.unwrap().unwrap();
        after_edit.await.unwrap().unwrap();

        let doc = search.get("abc123").await.unwrap().unwrap();
        assert_eq!(doc.tags, vec!["beach", "tagme"]);
    }
}

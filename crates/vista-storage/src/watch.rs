//! Bucket watcher
//!
//! Turns new objects in a bucket into [`ObjectEvent`]s by diffing periodic
//! listings. Delivery is at-least-once: a restarted watcher with backfill
//! enabled re-announces every existing object, and an object that is deleted
//! and stored again is announced again. A consumer that failed to act on an
//! event hands the key back through [`WatchRetry`] to have it announced on
//! the next listing.

use crate::traits::Storage;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use vista_core::models::content_type_from_key;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Notification emitted for a newly observed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
    Created {
        bucket: String,
        key: String,
        content_type: String,
    },
}

/// Returns keys to a running watcher.
#[derive(Debug, Clone)]
pub struct WatchRetry {
    tx: mpsc::UnboundedSender<String>,
}

impl WatchRetry {
    /// Forget `key`, so the next listing announces it again if it still
    /// exists.
    pub fn forget(&self, key: impl Into<String>) {
        // A closed channel means the watcher is gone.
        let _ = self.tx.send(key.into());
    }
}

struct WatchState {
    storage: Arc<dyn Storage>,
    bucket: String,
    interval: Duration,
    backfill: bool,
    primed: bool,
    listed: bool,
    seen: HashSet<String>,
    pending: VecDeque<ObjectEvent>,
    forgotten: mpsc::UnboundedReceiver<String>,
}

impl WatchState {
    /// List the bucket once and queue events for keys not seen before.
    async fn poll(&mut self) {
        while let Ok(key) = self.forgotten.try_recv() {
            self.seen.remove(&key);
        }

        let objects = match self.storage.list(&self.bucket).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(bucket = %self.bucket, error = %e, "Bucket listing failed; retrying on next tick");
                return;
            }
        };

        let announce = self.primed || self.backfill;
        let current: HashSet<String> = objects.iter().map(|o| o.key.clone()).collect();

        for object in objects {
            if self.seen.contains(&object.key) {
                continue;
            }
            if announce {
                let content_type = object
                    .content_type
                    .clone()
                    .or_else(|| content_type_from_key(&object.key).map(String::from))
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
                self.pending.push_back(ObjectEvent::Created {
                    bucket: self.bucket.clone(),
                    key: object.key.clone(),
                    content_type,
                });
            }
        }

        if !self.primed {
            tracing::info!(
                bucket = %self.bucket,
                existing = current.len(),
                backfill = self.backfill,
                "Bucket watcher primed"
            );
        }

        self.seen = current;
        self.primed = true;
    }
}

/// Watch `bucket` for new objects, listing it every `interval`.
///
/// With `backfill`, objects already present on the first listing are
/// announced too; otherwise they are only recorded as seen. Failed listings
/// are retried every `interval` as well.
pub fn watch_bucket(
    storage: Arc<dyn Storage>,
    bucket: impl Into<String>,
    interval: Duration,
    backfill: bool,
) -> (BoxStream<'static, ObjectEvent>, WatchRetry) {
    let (tx, forgotten) = mpsc::unbounded_channel();
    let state = WatchState {
        storage,
        bucket: bucket.into(),
        interval,
        backfill,
        primed: false,
        listed: false,
        seen: HashSet::new(),
        pending: VecDeque::new(),
        forgotten,
    };

    let events = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.listed {
                tokio::time::sleep(state.interval).await;
            }
            state.listed = true;
            state.poll().await;
        }
    })
    .boxed();

    (events, WatchRetry { tx })
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::traits::{ByteStream, ObjectInfo, StorageError, StorageResult};
    use crate::{LocalStorage, StorageBackend};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    async fn next_event(stream: &mut BoxStream<'static, ObjectEvent>) -> ObjectEvent {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("watcher produced no event")
            .expect("watcher stream ended")
    }

    #[tokio::test]
    async fn test_backfill_announces_existing_objects() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        storage
            .put("media", "abc123.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        let (mut events, _retry) = watch_bucket(storage, "media", Duration::from_millis(20), true);
        assert_eq!(
            next_event(&mut events).await,
            ObjectEvent::Created {
                bucket: "media".into(),
                key: "abc123.png".into(),
                content_type: "image/png".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_new_objects_announced_after_priming() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        storage
            .put("media", "old.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        let (mut events, _retry) =
            watch_bucket(storage.clone(), "media", Duration::from_millis(20), false);

        let writer = storage.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer
                .put("media", "clip.mp4", Bytes::from_static(b"y"), "video/mp4")
                .await
                .unwrap();
        });

        let ObjectEvent::Created { key, content_type, .. } = next_event(&mut events).await;
        assert_eq!(key, "clip.mp4");
        assert_eq!(content_type, "video/mp4");
    }

    #[tokio::test]
    async fn test_unknown_extension_falls_back_to_octet_stream() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        storage
            .put("media", "blob", Bytes::from_static(b"x"), "")
            .await
            .unwrap();

        let (mut events, _retry) = watch_bucket(storage, "media", Duration::from_millis(20), true);
        let ObjectEvent::Created { content_type, .. } = next_event(&mut events).await;
        assert_eq!(content_type, FALLBACK_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_forgotten_key_is_announced_again() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
        storage
            .put("media", "abc123.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        let (mut events, retry) = watch_bucket(storage, "media", Duration::from_millis(20), true);
        let ObjectEvent::Created { key, .. } = next_event(&mut events).await;
        assert_eq!(key, "abc123.png");

        retry.forget("abc123.png");
        let ObjectEvent::Created { key, .. } = next_event(&mut events).await;
        assert_eq!(key, "abc123.png");
    }

    struct Unreachable {
        listings: AtomicUsize,
    }

    #[async_trait]
    impl Storage for Unreachable {
        async fn get(&self, _bucket: &str, key: &str) -> StorageResult<Bytes> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn get_stream(&self, _bucket: &str, key: &str) -> StorageResult<ByteStream> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn put(
            &self,
            _bucket: &str,
            _key: &str,
            _data: Bytes,
            _content_type: &str,
        ) -> StorageResult<ObjectInfo> {
            Err(StorageError::BackendError("connection refused".into()))
        }

        async fn list(&self, _bucket: &str) -> StorageResult<Vec<ObjectInfo>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::BackendError("connection refused".into()))
        }

        async fn exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn delete(&self, _bucket: &str, _key: &str) -> StorageResult<()> {
            Ok(())
        }

        async fn internal_url(&self, _bucket: &str, key: &str) -> StorageResult<String> {
            Err(StorageError::NotFound(key.to_string()))
        }

        fn backend_type(&self) -> StorageBackend {
            StorageBackend::Local
        }
    }

    #[tokio::test]
    async fn test_failed_first_listing_waits_for_interval() {
        let storage = Arc::new(Unreachable {
            listings: AtomicUsize::new(0),
        });
        let (mut events, _retry) =
            watch_bucket(storage.clone(), "media", Duration::from_secs(1), true);

        let next = tokio::time::timeout(Duration::from_millis(200), events.next()).await;
        assert!(next.is_err());
        assert_eq!(storage.listings.load(Ordering::SeqCst), 1);
    }
}

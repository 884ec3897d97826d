//! Post-commit consistency hooks.
//!
//! Every mutation of a media record that affects its search document goes
//! through [`MediaEditor`]. Once the relational write has committed, the
//! editor runs the registered [`MediaChangeHook`]s. If a hook fails, the
//! editor enqueues an `index_media` job so the index converges anyway and
//! reports the failure to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use vista_core::models::{EnqueueOptions, IndexMediaArgs};
use vista_core::StoreError;
use vista_db::{MediaStore, SearchReconciler};
use vista_worker::JobClient;

/// Callback run after a media record changed.
#[async_trait]
pub trait MediaChangeHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn media_changed(&self, media_id: &str) -> anyhow::Result<()>;
}

/// Keeps the search index in line with the relational store, inline with the
/// edit.
pub struct SearchIndexHook {
    reconciler: Arc<dyn SearchReconciler>,
}

impl SearchIndexHook {
    pub fn new(reconciler: Arc<dyn SearchReconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl MediaChangeHook for SearchIndexHook {
    fn name(&self) -> &'static str {
        "search_index"
    }

    async fn media_changed(&self, media_id: &str) -> anyhow::Result<()> {
        self.reconciler.reconcile(media_id).await?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    /// The edit itself failed; nothing was committed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The edit committed but a hook failed. An `index_media` job has been
    /// enqueued (when `fallback_enqueued`) to repair the index.
    #[error("hook {hook} failed for media {media_id}: {source}")]
    Hook {
        hook: &'static str,
        media_id: String,
        fallback_enqueued: bool,
        #[source]
        source: anyhow::Error,
    },
}

/// Entry point for tag, date and deletion edits.
#[derive(Clone)]
pub struct MediaEditor {
    media: Arc<dyn MediaStore>,
    jobs: JobClient,
    hooks: Vec<Arc<dyn MediaChangeHook>>,
}

impl MediaEditor {
    pub fn new(media: Arc<dyn MediaStore>, jobs: JobClient) -> Self {
        Self {
            media,
            jobs,
            hooks: Vec::new(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn MediaChangeHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[tracing::instrument(skip(self, tags))]
    pub async fn add_tags(&self, media_id: &str, tags: &[String]) -> Result<(), EditError> {
        self.media.add_tags(media_id, tags).await?;
        self.after_commit(media_id).await
    }

    #[tracing::instrument(skip(self, tags))]
    pub async fn remove_tags(&self, media_id: &str, tags: &[String]) -> Result<(), EditError> {
        self.media.remove_tags(media_id, tags).await?;
        self.after_commit(media_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_date(
        &self,
        media_id: &str,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EditError> {
        self.media.set_date(media_id, name, at).await?;
        self.after_commit(media_id).await
    }

    /// Delete a media record with its edges and vectors. Returns whether it
    /// existed. Hooks run either way so a stale document is cleaned up.
    #[tracing::instrument(skip(self))]
    pub async fn delete_media(&self, media_id: &str) -> Result<bool, EditError> {
        let existed = self.media.delete(media_id).await?;
        self.after_commit(media_id).await?;
        Ok(existed)
    }

    async fn after_commit(&self, media_id: &str) -> Result<(), EditError> {
        for hook in &self.hooks {
            if let Err(source) = hook.media_changed(media_id).await {
                tracing::warn!(
                    media.id = %media_id,
                    hook = hook.name(),
                    error = %source,
                    "Post-commit hook failed, enqueueing index_media"
                );
                let fallback_enqueued = self.enqueue_fallback(media_id).await;
                return Err(EditError::Hook {
                    hook: hook.name(),
                    media_id: media_id.to_string(),
                    fallback_enqueued,
                    source,
                });
            }
        }
        Ok(())
    }

    async fn enqueue_fallback(&self, media_id: &str) -> bool {
        let args = IndexMediaArgs {
            media_id: media_id.to_string(),
        };
        match self.jobs.enqueue(&args, EnqueueOptions::default()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(media.id = %media_id, error = %e, "Failed to enqueue fallback index_media");
                false
            }
        }
    }
}

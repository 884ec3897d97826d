//! The search index follows relational edits, directly or through the
//! fallback job when the inline hook fails.

mod helpers;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

use helpers::fixtures::{solid_png, RED};
use helpers::Harness;
use vista_core::models::{JobKind, JobState};
use vista_db::{SearchIndex, VectorStore};
use vista_pipeline::{EditError, MediaChangeHook, MediaEditor};

struct Unreachable;

#[async_trait]
impl MediaChangeHook for Unreachable {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn media_changed(&self, _media_id: &str) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn test_tag_and_date_edits_reach_search() {
    let h = Harness::start().await;
    h.ingest("abc123", solid_png(800, 600, RED), "image/png").await;
    h.wait_idle().await;

    let editor = h.pipeline.editor();
    editor
        .add_tags("abc123", &["beach".to_string(), "sunset".to_string()])
        .await
        .unwrap();
    editor
        .remove_tags("abc123", &["tagme".to_string()])
        .await
        .unwrap();
    let taken = Utc.with_ymd_and_hms(2023, 7, 14, 9, 0, 0).unwrap();
    editor.set_date("abc123", "taken", taken).await.unwrap();

    let doc = h.search.get("abc123").await.unwrap().unwrap();
    assert_eq!(doc.tags, vec!["beach", "sunset"]);
    assert_eq!(doc.dates["taken"], "2023-07-14T09:00:00Z");
    assert!(doc.dates.contains_key("upload"));

    let hits = h.pipeline.search_text("sunset", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "abc123");
    assert!(h.pipeline.search_text("tagme", 10).await.unwrap().is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn test_delete_removes_document_and_vectors() {
    let h = Harness::start().await;
    h.ingest("abc123", solid_png(800, 600, RED), "image/png").await;
    h.wait_idle().await;
    assert!(h.search.get("abc123").await.unwrap().is_some());

    assert!(h.pipeline.editor().delete_media("abc123").await.unwrap());

    assert!(h.search.get("abc123").await.unwrap().is_none());
    assert!(h
        .media
        .get_vector("abc123", "vision")
        .await
        .unwrap()
        .is_none());
    assert!(h
        .pipeline
        .rank_by_similarity("vision", &[1.0, 0.0, 0.0], 10, None)
        .await
        .unwrap()
        .is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn test_hook_failure_converges_through_index_job() {
    let h = Harness::start().await;
    h.ingest("abc123", solid_png(800, 600, RED), "image/png").await;
    h.wait_idle().await;

    let editor = MediaEditor::new(h.state.media.clone(), h.state.jobs.clone())
        .with_hook(Arc::new(Unreachable));
    let err = editor
        .add_tags("abc123", &["beach".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::Hook {
            fallback_enqueued: true,
            ..
        }
    ));

    let jobs = h.wait_idle().await;
    let index_jobs: Vec<_> = jobs
        .iter()
        .filter(|j| j.kind == JobKind::IndexMedia)
        .collect();
    assert_eq!(index_jobs.len(), 2);
    assert!(index_jobs.iter().all(|j| j.state == JobState::Completed));

    let doc = h.search.get("abc123").await.unwrap().unwrap();
    assert_eq!(doc.tags, vec!["beach", "tagme"]);

    h.shutdown().await;
}

#[tokio::test]
async fn test_index_job_for_deleted_media_removes_document() {
    let h = Harness::start().await;
    h.ingest("abc123", solid_png(800, 600, RED), "image/png").await;
    h.wait_idle().await;

    // Delete behind the editor's back, then let an index job notice.
    vista_db::MediaStore::delete(&h.media, "abc123").await.unwrap();
    assert!(h.search.get("abc123").await.unwrap().is_some());

    h.state
        .jobs
        .enqueue(
            &vista_core::models::IndexMediaArgs {
                media_id: "abc123".into(),
            },
            Default::default(),
        )
        .await
        .unwrap();
    h.wait_idle().await;

    assert!(h.search.get("abc123").await.unwrap().is_none());

    h.shutdown().await;
}

//! Text embeddings through the bridge, similarity and semantic search.

mod helpers;

use tokio_util::sync::CancellationToken;

use helpers::fixtures::{solid_png, BLUE, GREEN, RED};
use helpers::Harness;
use vista_core::models::JobKind;
use vista_pipeline::EmbeddingRequestError;

async fn seeded() -> Harness {
    let h = Harness::start().await;
    h.ingest("red.png", solid_png(40, 40, RED), "image/png").await;
    h.ingest("green.png", solid_png(40, 40, GREEN), "image/png")
        .await;
    h.ingest("blue.png", solid_png(40, 40, BLUE), "image/png").await;
    h.wait_idle().await;
    h
}

fn ids(media: &[vista_core::models::Media]) -> Vec<&str> {
    media.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn test_text_embedding_round_trip() {
    let h = Harness::start().await;
    let embedding = h
        .pipeline
        .request_text_embedding("a red bicycle", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(embedding.space, "vision");
    assert_eq!(embedding.vector, vec![1.0, 0.0, 0.0]);
    // The consumed job is gone.
    assert!(h.jobs_of(JobKind::EmbedText).await.is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn test_blank_text_is_cancelled() {
    let h = Harness::start().await;
    let err = h
        .pipeline
        .request_text_embedding("   ", &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        EmbeddingRequestError::Cancelled(message) => assert!(message.contains("empty")),
        other => panic!("unexpected error: {other:?}"),
    }

    h.shutdown().await;
}

#[tokio::test]
async fn test_semantic_search_ranks_closest_first() {
    let h = seeded().await;

    let hits = h
        .pipeline
        .semantic_search("something red", 3, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "red.png");

    let hits = h
        .pipeline
        .semantic_search("grass", 1, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ids(&hits), vec!["green.png"]);

    h.shutdown().await;
}

#[tokio::test]
async fn test_similar_to_excludes_the_query_media() {
    let h = seeded().await;

    let hits = h.pipeline.similar_to("red.png", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(!ids(&hits).contains(&"red.png"));

    h.shutdown().await;
}

#[tokio::test]
async fn test_search_text_matches_format_and_tags() {
    let h = seeded().await;

    let hits = h.pipeline.search_text("png tagme", 10).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(h.pipeline.search_text("jpeg", 10).await.unwrap().is_empty());
    assert!(h.pipeline.search_text("png", 0).await.unwrap().is_empty());

    h.shutdown().await;
}

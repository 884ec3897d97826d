//! Object watcher: turns new objects in the media bucket into
//! `analyze_media` jobs.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use vista_core::models::{AnalyzeMediaArgs, EnqueueOptions, Job};
use vista_core::StoreResult;
use vista_storage::{watch_bucket, ObjectEvent, Storage};
use vista_worker::JobClient;

/// Enqueue analysis for one watcher event.
///
/// Events for other buckets are ignored. Content types are not filtered
/// here: the analyze stage cancels what it cannot handle, which keeps a
/// record of every object that was seen.
pub async fn ingest_event(
    jobs: &JobClient,
    media_bucket: &str,
    event: ObjectEvent,
) -> StoreResult<Option<Job>> {
    let ObjectEvent::Created {
        bucket,
        key,
        content_type,
    } = event;

    if bucket != media_bucket {
        tracing::debug!(bucket = %bucket, key = %key, "Ignoring object outside the media bucket");
        return Ok(None);
    }

    let job = jobs
        .enqueue(&AnalyzeMediaArgs { key, content_type }, EnqueueOptions::default())
        .await?;
    Ok(Some(job))
}

/// Watch the media bucket until `shutdown` fires, enqueueing an analysis for
/// every new object.
pub async fn run_watcher(
    storage: Arc<dyn Storage>,
    jobs: JobClient,
    media_bucket: String,
    interval: Duration,
    backfill: bool,
    shutdown: CancellationToken,
) {
    tracing::info!(
        bucket = %media_bucket,
        interval_ms = interval.as_millis() as u64,
        backfill,
        "Object watcher started"
    );

    let (mut events, retry) = watch_bucket(storage, media_bucket.clone(), interval, backfill);

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let ObjectEvent::Created { key, .. } = &event;
        let key = key.clone();
        match ingest_event(&jobs, &media_bucket, event).await {
            Ok(Some(job)) => {
                tracing::info!(media.id = %key, job.id = %job.id, "New object queued for analysis")
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(media.id = %key, error = %e, "Failed to enqueue analysis, retrying on next listing");
                retry.forget(key);
            }
        }
    }

    tracing::info!(bucket = %media_bucket, "Object watcher stopped");
}

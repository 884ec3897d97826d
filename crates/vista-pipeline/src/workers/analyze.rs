use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;

use vista_core::constants::{TAGME_TAG, UPLOAD_DATE};
use vista_core::models::{
    AnalyzeMediaArgs, EmbedMediaArgs, EnqueueOptions, IndexMediaArgs, Job, Media, MediaKind,
    NewMedia,
};
use vista_core::{JobError, JobResultExt, StoreError};
use vista_processing::read_header;

use super::{
    decode_failure, parse_args, probe_failure, storage_failure, store_failure, JobHandler,
};
use crate::state::PipelineState;

/// `analyze_media`: derive structural metadata for a stored object, persist
/// the media record and hand off to the embed and index stages.
pub struct AnalyzeWorker;

#[async_trait]
impl JobHandler for AnalyzeWorker {
    #[tracing::instrument(skip(self, job, state), fields(job.id = %job.id, media.id = tracing::field::Empty, media.kind = tracing::field::Empty))]
    async fn process(
        &self,
        job: &Job,
        state: &PipelineState,
    ) -> Result<Option<serde_json::Value>, JobError> {
        let args: AnalyzeMediaArgs = parse_args(job)?;
        tracing::Span::current().record("media.id", args.key.as_str());

        // Already ingested: only make sure the downstream stages run.
        if let Some(existing) = state
            .media
            .get(&args.key)
            .await
            .map_err(|e| store_failure(e, "checking for an existing media record"))?
        {
            tracing::info!(media.id = %args.key, "Media already analyzed, re-enqueueing downstream stages");
            enqueue_downstream(state, &existing).await?;
            return Ok(None);
        }

        let kind = MediaKind::from_content_type(&args.content_type)
            .with_context(|| format!("unsupported content type {:?}", args.content_type))
            .cancel_on_err()?;
        tracing::Span::current().record("media.kind", tracing::field::display(kind));

        tracing::info!(
            media.id = %args.key,
            content_type = %args.content_type,
            "Analyzing media"
        );

        let new_media = if kind.needs_probe() {
            analyze_with_probe(state, &args.key, kind).await?
        } else {
            analyze_image(state, &args.key).await?
        };

        let media = match state
            .media
            .create_media(new_media, &[TAGME_TAG], &[(UPLOAD_DATE, Utc::now())])
            .await
        {
            Ok(media) => media,
            // A concurrent run won the insert.
            Err(StoreError::AlreadyExists(_)) => {
                tracing::info!(media.id = %args.key, "Media record created concurrently");
                state
                    .media
                    .get(&args.key)
                    .await
                    .map_err(|e| store_failure(e, "loading concurrently created media"))?
                    .ok_or_else(|| {
                        JobError::retry(anyhow::anyhow!(
                            "media {} vanished after a conflicting insert",
                            args.key
                        ))
                    })?
            }
            Err(e) => return Err(store_failure(e, "persisting media record")),
        };

        enqueue_downstream(state, &media).await?;

        tracing::info!(
            media.id = %media.id,
            format = %media.format,
            width = media.width,
            height = media.height,
            duration = ?media.duration,
            "Media analyzed"
        );

        Ok(None)
    }
}

async fn analyze_image(state: &PipelineState, key: &str) -> Result<NewMedia, JobError> {
    let data = state
        .storage
        .get(&state.settings.media_bucket, key)
        .await
        .map_err(|e| storage_failure(e, "downloading source image"))?;

    let meta = read_header(&data).map_err(|e| decode_failure(e, "reading image header"))?;

    Ok(NewMedia {
        id: key.to_string(),
        kind: MediaKind::Image,
        format: meta.format,
        width: dimension(meta.width, "width")?,
        height: dimension(meta.height, "height")?,
        duration: None,
    })
}

/// Probe a video or audio object and, when it has a picture, store a JPEG
/// preview under the same key in the preview bucket.
async fn analyze_with_probe(
    state: &PipelineState,
    key: &str,
    kind: MediaKind,
) -> Result<NewMedia, JobError> {
    let url = state
        .storage
        .internal_url(&state.settings.media_bucket, key)
        .await
        .map_err(|e| storage_failure(e, "resolving source location"))?;

    let report = state
        .prober
        .probe(&url)
        .await
        .map_err(|e| probe_failure(e, "probing media"))?;

    if report.has_video {
        let preview = state
            .prober
            .extract_preview(&url, state.settings.preview_offset_secs)
            .await
            .map_err(|e| probe_failure(e, "extracting preview frame"))?;

        state
            .storage
            .put(&state.settings.preview_bucket, key, preview, "image/jpeg")
            .await
            .map_err(|e| storage_failure(e, "storing preview frame"))?;
    } else {
        tracing::debug!(media.id = %key, "No video stream, skipping preview");
    }

    Ok(NewMedia {
        id: key.to_string(),
        kind,
        format: report.format,
        width: dimension(report.width, "width")?,
        height: dimension(report.height, "height")?,
        duration: report.duration,
    })
}

/// Media dimensions are stored as non-negative `INTEGER`s.
fn dimension(value: u32, name: &str) -> Result<i32, JobError> {
    i32::try_from(value)
        .with_context(|| format!("{} {} does not fit the media record", name, value))
        .cancel_on_err()
}

/// Bucket the embed stage reads a picture of `media` from, if it has one.
pub(crate) fn embed_source<'a>(state: &'a PipelineState, media: &Media) -> Option<&'a str> {
    match media.kind {
        MediaKind::Image => Some(&state.settings.media_bucket),
        // Previews exist only for media with a video stream.
        MediaKind::Video | MediaKind::Audio if media.width > 0 && media.height > 0 => {
            Some(&state.settings.preview_bucket)
        }
        MediaKind::Video | MediaKind::Audio => None,
    }
}

async fn enqueue_downstream(state: &PipelineState, media: &Media) -> Result<(), JobError> {
    if let Some(bucket) = embed_source(state, media) {
        state
            .jobs
            .enqueue(
                &EmbedMediaArgs {
                    bucket: bucket.to_string(),
                    key: media.id.clone(),
                },
                EnqueueOptions::default(),
            )
            .await
            .map_err(|e| store_failure(e, "enqueueing embed_media"))?;
    } else {
        tracing::debug!(media.id = %media.id, "No visual source, skipping embedding");
    }

    state
        .jobs
        .enqueue(
            &IndexMediaArgs {
                media_id: media.id.clone(),
            },
            EnqueueOptions::default(),
        )
        .await
        .map_err(|e| store_failure(e, "enqueueing index_media"))?;

    Ok(())
}

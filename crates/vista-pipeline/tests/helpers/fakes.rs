use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;

use vista_core::models::{Media, MediaRecord, NewMedia};
use vista_core::StoreResult;
use vista_db::{MediaStore, MemoryMediaStore};
use vista_inference::{InferenceError, TextModel, VisionModel};
use vista_processing::{ProbeError, ProbeReport, Prober};

pub const INPUT_SIZE: u32 = 32;

/// Embeds an image as its per-channel means shifted into `[0, 2]`, so a
/// solid red image maps to `[2, 0, 0]`.
pub struct FakeVision;

#[async_trait]
impl VisionModel for FakeVision {
    fn input_size(&self) -> u32 {
        INPUT_SIZE
    }

    async fn embed_image(&self, pixels: &[f32]) -> Result<Vec<f32>, InferenceError> {
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        Ok(pixels
            .chunks(plane)
            .map(|channel| 1.0 + channel.iter().sum::<f32>() / channel.len() as f32)
            .collect())
    }
}

/// Maps anything mentioning "red" next to red images, everything else next
/// to green ones.
pub struct FakeText;

#[async_trait]
impl TextModel for FakeText {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        if text.to_lowercase().contains("red") {
            Ok(vec![2.0, 0.0, 0.0])
        } else {
            Ok(vec![0.0, 2.0, 0.0])
        }
    }
}

enum Script {
    Report {
        report: ProbeReport,
        preview: Option<Bytes>,
    },
    LaunchFailure,
}

/// Prober returning a fixed report, counting its calls.
pub struct FakeProber {
    script: Script,
    pub probes: AtomicUsize,
    pub previews: AtomicUsize,
}

impl FakeProber {
    fn new(script: Script) -> Self {
        Self {
            script,
            probes: AtomicUsize::new(0),
            previews: AtomicUsize::new(0),
        }
    }

    pub fn video(width: u32, height: u32, duration: f64, preview: Vec<u8>) -> Self {
        Self::new(Script::Report {
            report: ProbeReport {
                format: "mov".to_string(),
                width,
                height,
                duration: Some(duration),
                has_video: true,
            },
            preview: Some(Bytes::from(preview)),
        })
    }

    pub fn audio_only(duration: f64) -> Self {
        Self::new(Script::Report {
            report: ProbeReport {
                format: "mp3".to_string(),
                width: 0,
                height: 0,
                duration: Some(duration),
                has_video: false,
            },
            preview: None,
        })
    }

    /// Behaves as if the probing tool is not installed.
    pub fn missing_tool() -> Self {
        Self::new(Script::LaunchFailure)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn preview_count(&self) -> usize {
        self.previews.load(Ordering::SeqCst)
    }
}

fn launch_failure(tool: &'static str) -> ProbeError {
    ProbeError::Launch {
        tool,
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, _url: &str) -> Result<ProbeReport, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Report { report, .. } => Ok(report.clone()),
            Script::LaunchFailure => Err(launch_failure("ffprobe")),
        }
    }

    async fn extract_preview(&self, _url: &str, _offset_secs: f64) -> Result<Bytes, ProbeError> {
        self.previews.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Report {
                preview: Some(preview),
                ..
            } => Ok(preview.clone()),
            Script::Report { preview: None, .. } => {
                Err(ProbeError::NoStreams("no video stream".to_string()))
            }
            Script::LaunchFailure => Err(launch_failure("ffmpeg")),
        }
    }
}

/// Media store whose first `racers` lookups by id all report a missing
/// record, released together once every racer has looked. Drives concurrent
/// first-time analyses of one key into the insert at the same time.
pub struct RacingMediaStore {
    inner: MemoryMediaStore,
    racers: usize,
    lookups: AtomicUsize,
    start: Barrier,
}

impl RacingMediaStore {
    pub fn new(inner: MemoryMediaStore, racers: usize) -> Self {
        Self {
            inner,
            racers,
            lookups: AtomicUsize::new(0),
            start: Barrier::new(racers),
        }
    }
}

#[async_trait]
impl MediaStore for RacingMediaStore {
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
        if self.lookups.fetch_add(1, Ordering::SeqCst) < self.racers {
            self.start.wait().await;
            return Ok(None);
        }
        self.inner.get(id).await
    }

    async fn get_many(&self, ids: &[String]) -> StoreResult<Vec<Media>> {
        self.inner.get_many(ids).await
    }

    async fn get_record(&self, id: &str) -> StoreResult<Option<MediaRecord>> {
        self.inner.get_record(id).await
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

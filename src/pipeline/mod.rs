//! Pipeline driver.
//!
//! One run:
//! 1. check the encoder works (fatal if not)
//! 2. create the input, output and cover directories
//! 3. discover inputs and reject colliding base names
//! 4. publish files through a bounded worker pool, results kept in
//!    discovery order
//! 5. write the manifest if anything was published and the run wasn't
//!    cancelled
//!
//! A file-level failure is logged and the batch continues. The manifest is
//! never replaced by an empty or cancelled run.

use chrono::Utc;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, ResultExt};
use crate::manifest;
use crate::model::{PublishedTrack, SourceFile};
use crate::publisher::{PublishError, Publisher};
use crate::scanner;

/// What happened to the manifest at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Written(PathBuf),
    /// No input files were found
    NothingToDo,
    /// Files were found but none was published
    NoTracksPublished,
    Cancelled,
}

/// A file that was excluded from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

/// Overall result of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    NothingToDo,
    Partial,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success | RunStatus::NothingToDo => 0,
            RunStatus::Failed => 1,
            RunStatus::Partial => 2,
            RunStatus::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub discovered: usize,
    pub published: usize,
    pub failed: Vec<FailedFile>,
    /// Files never started because the run was cancelled
    pub not_started: usize,
    pub elapsed: Duration,
    pub output_dir: PathBuf,
    pub cover_dir: PathBuf,
    pub manifest: ManifestStatus,
}

impl RunSummary {
    fn new(config: &Config) -> Self {
        Self {
            discovered: 0,
            published: 0,
            failed: Vec::new(),
            not_started: 0,
            elapsed: Duration::ZERO,
            output_dir: config.paths.output_dir.clone(),
            cover_dir: config.paths.cover_dir.clone(),
            manifest: ManifestStatus::NothingToDo,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.manifest == ManifestStatus::Cancelled {
            RunStatus::Cancelled
        } else if self.discovered == 0 {
            RunStatus::NothingToDo
        } else if self.published == 0 {
            RunStatus::Failed
        } else if self.published == self.discovered {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

/// Drives one sync run.
pub struct Pipeline {
    config: Arc<Config>,
    publisher: Arc<Publisher>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, publisher: Publisher, cancel: CancellationToken) -> Self {
        Self {
            config,
            publisher: Arc::new(publisher),
            cancel,
        }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let paths = &self.config.paths;
        let mut summary = RunSummary::new(&self.config);

        let version = self
            .publisher
            .preflight()
            .await
            .with_context("Encoder preflight failed")?;
        info!(target: "music_sync::pipeline", encoder = %version, "Encoder available");

        for dir in [&paths.input_dir, &paths.output_dir, &paths.cover_dir] {
            ensure_dir(dir).await?;
        }

        let sources = scanner::discover(&paths.input_dir, self.config.pipeline.recursive)?;
        summary.discovered = sources.len();

        if sources.is_empty() {
            info!(target: "music_sync::pipeline", dir = %paths.input_dir.display(), "No audio files found, nothing to do");
            summary.elapsed = started.elapsed();
            return Ok(summary);
        }

        let jobs = self.config.pipeline.jobs.max(1);
        info!(target: "music_sync::pipeline", files = sources.len(), jobs, "Starting sync");

        let results = self.publish_all(&sources, jobs).await;
        summary.not_started = sources.len() - results.len();

        let mut tracks: Vec<PublishedTrack> = Vec::with_capacity(results.len());
        let mut cancelled_in_flight = 0;
        for (source, result) in results {
            match result {
                Ok(track) => tracks.push(track),
                Err(PublishError::Cancelled) => cancelled_in_flight += 1,
                Err(e) => {
                    error!(target: "music_sync::pipeline", file = %source.file_name(), error = %e, "File failed, skipping");
                    summary.failed.push(FailedFile {
                        name: source.file_name(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary.not_started += cancelled_in_flight;
        summary.published = tracks.len();

        summary.manifest = if self.cancel.is_cancelled() {
            warn!(target: "music_sync::pipeline", published = tracks.len(), "Run cancelled, manifest left untouched");
            ManifestStatus::Cancelled
        } else if tracks.is_empty() {
            warn!(target: "music_sync::pipeline", "No files were published, manifest left untouched");
            ManifestStatus::NoTracksPublished
        } else {
            let document = manifest::build(&tracks, Utc::now());
            manifest::write(&paths.manifest, &document).await?;
            ManifestStatus::Written(paths.manifest.clone())
        };

        summary.elapsed = started.elapsed();
        info!(
            target: "music_sync::pipeline",
            published = summary.published,
            failed = summary.failed.len(),
            elapsed = %format!("{:.2}s", summary.elapsed.as_secs_f64()),
            "Sync finished"
        );
        Ok(summary)
    }

    /// Publish every source with at most `jobs` files in flight. Results
    /// come back in discovery order; no new file starts once cancelled.
    async fn publish_all<'a>(
        &self,
        sources: &'a [SourceFile],
        jobs: usize,
    ) -> Vec<(&'a SourceFile, std::result::Result<PublishedTrack, PublishError>)> {
        let publisher = &self.publisher;
        let cancel = &self.cancel;

        futures::stream::iter(sources)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|source| async move { (source, publisher.publish(source, cancel).await) })
            .buffered(jobs)
            .collect()
            .await
    }
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(format!("Failed to create directory {}", dir.display()))?;
    info!(target: "music_sync::pipeline", dir = %dir.display(), "Created directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::manifest::Manifest;
    use crate::metadata::{UNKNOWN_ALBUM, UNKNOWN_ARTIST};
    use crate::store::mocks::MemoryStore;
    use crate::test_utils::TestLayout;
    use crate::transcode::mocks::FakeEncoder;

    fn pipeline(layout: &TestLayout, encoder: Arc<FakeEncoder>, store: Arc<MemoryStore>) -> Pipeline {
        pipeline_with(layout, encoder, store, CancellationToken::new())
    }

    fn pipeline_with(
        layout: &TestLayout,
        encoder: Arc<FakeEncoder>,
        store: Arc<MemoryStore>,
        cancel: CancellationToken,
    ) -> Pipeline {
        let config = Arc::new(layout.config());
        Pipeline::new(config, layout.publisher(encoder, store), cancel)
    }

    fn read_manifest(layout: &TestLayout) -> Manifest {
        serde_json::from_slice(&std::fs::read(&layout.manifest).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_full_run_writes_manifest() {
        let layout = TestLayout::new();
        layout.add_source("b.mp3");
        layout.add_source("a.wav");
        let store = Arc::new(MemoryStore::new());

        let summary = pipeline(&layout, Arc::new(FakeEncoder::new()), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status(), RunStatus::Success);
        assert_eq!(summary.published, 2);
        assert_eq!(summary.manifest, ManifestStatus::Written(layout.manifest.clone()));

        let manifest = read_manifest(&layout);
        assert_eq!(manifest.total_tracks, 2);
        assert_eq!(manifest.tracks[0].filename, "a");
        assert_eq!(manifest.tracks[0].id, 1);
        assert_eq!(manifest.tracks[1].filename, "b");
        assert_eq!(store.put_count(), 4);
    }

    #[tokio::test]
    async fn test_rerun_uploads_nothing_new() {
        let layout = TestLayout::new();
        layout.add_source("one.mp3");
        layout.add_source("two.flac");
        let encoder = Arc::new(FakeEncoder::new());
        let store = Arc::new(MemoryStore::new());

        pipeline(&layout, encoder.clone(), store.clone()).run().await.unwrap();
        let first = read_manifest(&layout);
        let puts = store.put_count();
        let encodes = encoder.call_count();

        pipeline(&layout, encoder.clone(), store.clone()).run().await.unwrap();
        let second = read_manifest(&layout);

        assert_eq!(store.put_count(), puts);
        assert_eq!(encoder.call_count(), encodes);
        assert_eq!(first.tracks.len(), second.tracks.len());
        for (a, b) in first.tracks.iter().zip(&second.tracks) {
            assert_eq!(
                (&a.filename, &a.qualities, &a.stream_url, a.id),
                (&b.filename, &b.qualities, &b.stream_url, b.id)
            );
        }
    }

    #[tokio::test]
    async fn test_one_bad_file_is_isolated() {
        let layout = TestLayout::new();
        layout.add_source("first.mp3");
        layout.add_source("broken.mp3");
        layout.add_source("third.mp3");

        let summary = pipeline(&layout, Arc::new(FakeEncoder::failing_on("broken")), Arc::new(MemoryStore::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status(), RunStatus::Partial);
        assert_eq!(summary.status().exit_code(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].name, "broken.mp3");

        let manifest = read_manifest(&layout);
        let names: Vec<&str> = manifest.tracks.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["first", "third"]);
    }

    #[tokio::test]
    async fn test_empty_input_keeps_existing_manifest() {
        let layout = TestLayout::new();
        std::fs::write(&layout.manifest, b"previous").unwrap();

        let summary = pipeline(&layout, Arc::new(FakeEncoder::new()), Arc::new(MemoryStore::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status(), RunStatus::NothingToDo);
        assert_eq!(summary.discovered, 0);
        assert_eq!(std::fs::read(&layout.manifest).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_all_failed_keeps_existing_manifest() {
        let layout = TestLayout::new();
        layout.add_source("bad.mp3");
        std::fs::write(&layout.manifest, b"previous").unwrap();

        let summary = pipeline(&layout, Arc::new(FakeEncoder::failing_on("bad")), Arc::new(MemoryStore::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status(), RunStatus::Failed);
        assert_eq!(summary.manifest, ManifestStatus::NoTracksPublished);
        assert_eq!(std::fs::read(&layout.manifest).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_unreadable_tags_still_published() {
        let layout = TestLayout::new();
        layout.add_source("Mystery Track.ogg");

        pipeline(&layout, Arc::new(FakeEncoder::new()), Arc::new(MemoryStore::new()))
            .run()
            .await
            .unwrap();

        let manifest = read_manifest(&layout);
        let entry = &manifest.tracks[0];
        assert_eq!(entry.title, "Mystery Track");
        assert_eq!(entry.artist, UNKNOWN_ARTIST);
        assert_eq!(entry.album, UNKNOWN_ALBUM);
        assert!(entry.cover_art.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_base_names_abort_before_work() {
        let layout = TestLayout::new();
        layout.add_source("track.mp3");
        layout.add_source("track.wav");
        let encoder = Arc::new(FakeEncoder::new());

        let result = pipeline(&layout, encoder.clone(), Arc::new(MemoryStore::new()))
            .run()
            .await;

        assert!(matches!(result, Err(Error::Scan(_))));
        assert_eq!(encoder.call_count(), 0);
        assert!(!layout.manifest.exists());
    }

    #[tokio::test]
    async fn test_missing_encoder_is_run_fatal() {
        let layout = TestLayout::new();
        layout.add_source("song.mp3");

        let result = pipeline(&layout, Arc::new(FakeEncoder::unavailable()), Arc::new(MemoryStore::new()))
            .run()
            .await;

        let err = result.unwrap_err();
        assert!(err.is_encoder_missing());
        assert!(!layout.manifest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_no_manifest() {
        let layout = TestLayout::new();
        layout.add_source("song.mp3");
        std::fs::write(&layout.manifest, b"previous").unwrap();
        let encoder = Arc::new(FakeEncoder::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = pipeline_with(&layout, encoder.clone(), Arc::new(MemoryStore::new()), cancel)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status(), RunStatus::Cancelled);
        assert_eq!(summary.status().exit_code(), 130);
        assert_eq!(summary.not_started, 1);
        assert_eq!(encoder.call_count(), 0);
        assert_eq!(std::fs::read(&layout.manifest).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_parallel_run_keeps_discovery_order() {
        let layout = TestLayout::new();
        for name in ["d.mp3", "c.mp3", "b.mp3", "a.mp3", "e.mp3"] {
            layout.add_source(name);
        }
        let mut config = layout.config();
        config.pipeline.jobs = 4;
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(
            Arc::new(config),
            layout.publisher(Arc::new(FakeEncoder::new()), store.clone()),
            CancellationToken::new(),
        );

        pipeline.run().await.unwrap();

        let manifest = read_manifest(&layout);
        let names: Vec<&str> = manifest.tracks.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.put_count(), 10);
    }

    #[tokio::test]
    async fn test_directories_are_created() {
        let layout = TestLayout::new();

        pipeline(&layout, Arc::new(FakeEncoder::new()), Arc::new(MemoryStore::new()))
            .run()
            .await
            .unwrap();

        assert!(layout.input.is_dir());
        assert!(layout.output.is_dir());
        assert!(layout.covers.is_dir());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::NothingToDo.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Partial.exit_code(), 2);
    }
}

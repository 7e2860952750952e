//! Orchestrator: owns the state machine, hands chunks to the worker,
//! applies checkpoint policy, reports progress, and handles cancellation
//! (spec.md §4.8, §5).
//!
//! Recast as an explicit state machine per spec.md §9's redesign flag:
//! suspension points are ordinary function-call boundaries, not
//! async/await. Chunks are synthesized strictly sequentially; this build
//! carries no concurrent worker pool, so `Config::parallel_workers > 1` is
//! rejected at validation time rather than silently ignored (see
//! `synthesis_worker::assert_pool_size_supported` for the companion
//! backend-thread-safety guard).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::checkpoint::{ChapterMarker, Checkpoint, CheckpointLog};
use crate::chunker::{self, Chunk, ChunkOptions};
use crate::config::Config;
use crate::dialogue_router;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::finalizer::{AudioEncoder, EncodeParams, FfmpegEncoder};
use crate::fingerprint::SettingsFingerprint;
use crate::normalizer::{self, NormalizeOptions};
use crate::parser::DocumentParser;
use crate::progress::{Progress, ProgressCallback};
use crate::stream_writer::StreamWriter;
use crate::synthesis_worker::{self, assert_pool_size_supported};
use crate::voice::VoiceSynthesizer;

/// Orchestrator states (spec.md §4.8). Terminal states are `Done`,
/// `Failed`, and `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Normalizing,
    Planning,
    Resuming,
    Synthesizing,
    Encoding,
    Done,
    Failed,
    Cancelled,
}

/// The outcome of a completed (or cancelled) run.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(PathBuf),
    Cancelled,
}

/// Ties every pipeline stage together for one narration run.
pub struct Orchestrator {
    config: Config,
    backend: Arc<dyn VoiceSynthesizer>,
    backend_model_identity: String,
    encoder: Arc<dyn AudioEncoder>,
}

impl Orchestrator {
    /// Uses [`FfmpegEncoder`] as the Encoder collaborator. Use
    /// [`Orchestrator::with_encoder`] to inject a different one.
    pub fn new(config: Config, backend: Arc<dyn VoiceSynthesizer>, backend_model_identity: impl Into<String>) -> Self {
        Self::with_encoder(config, backend, backend_model_identity, Arc::new(FfmpegEncoder))
    }

    pub fn with_encoder(
        config: Config,
        backend: Arc<dyn VoiceSynthesizer>,
        backend_model_identity: impl Into<String>,
        encoder: Arc<dyn AudioEncoder>,
    ) -> Self {
        Self {
            config,
            backend,
            backend_model_identity: backend_model_identity.into(),
            encoder,
        }
    }

    /// Run the full pipeline: `Init → Normalizing → Planning →
    /// (Resuming?) → Synthesizing → Encoding → Done`.
    pub fn run(
        &self,
        input_path: &Path,
        parser: &dyn DocumentParser,
        cancel: &AtomicBool,
        mut on_progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<RunOutcome> {
        self.config.validate()?;
        assert_pool_size_supported(&self.backend, self.config.parallel_workers)?;

        // Init -> Normalizing
        let document = parser
            .parse(input_path)
            .map_err(|e| Error::InputError(format!("{e:#}")))?;
        self.report(&mut on_progress, State::Normalizing, 0, 0);

        let normalized = normalizer::normalize(&document, &NormalizeOptions::default());

        // Normalizing -> Planning: enumerate the chunk stream without
        // executing synthesis.
        self.report(&mut on_progress, State::Planning, 0, 0);
        let chunks = chunker::chunk_document(
            &normalized,
            ChunkOptions {
                char_target: self.config.char_target,
                phoneme_hard_limit: self.config.phoneme_hard_limit,
            },
        );
        let total = chunks.len() as u64;

        let fingerprint = SettingsFingerprint::compute(input_path, &self.config, &self.backend_model_identity)
            .map_err(|e| Error::InputError(format!("failed to fingerprint input: {e}")))?;
        let session_dir = self.config.workspace_dir.join(fingerprint.to_hex());
        std::fs::create_dir_all(&session_dir)?;

        let checkpoint_log = CheckpointLog::new(&session_dir);
        let stream_path = session_dir.join("stream.pcm");
        let mut stream_writer = StreamWriter::new(&stream_path, self.config.sample_rate);

        // Planning -> Resuming? : a valid checkpoint with a matching
        // fingerprint exists.
        let existing = checkpoint_log.read()?;
        let (mut next_ordinal, mut stream_offset, mut chapter_markers) = match existing {
            Some((_, checkpoint)) if checkpoint.fingerprint == fingerprint => {
                self.report(&mut on_progress, State::Resuming, checkpoint.last_completed_ordinal, total);
                stream_writer.truncate_to(checkpoint.stream_byte_offset)?;
                (
                    checkpoint.last_completed_ordinal + 1,
                    checkpoint.stream_byte_offset,
                    checkpoint.chapter_markers,
                )
            }
            Some(_) => {
                // CorruptionError policy (spec.md §7): fingerprint
                // mismatch discards the workspace and restarts from
                // chunk 0.
                std::fs::remove_file(&stream_path).ok();
                (0u64, 0u64, Vec::new())
            }
            None => (0u64, 0u64, Vec::new()),
        };

        // Synthesizing
        self.report(&mut on_progress, State::Synthesizing, next_ordinal, total);
        let mut completed_since_checkpoint = 0u64;
        for chunk in chunks.iter().filter(|c| c.ordinal >= next_ordinal) {
            if cancel.load(Ordering::SeqCst) {
                // Only commit a checkpoint if a chunk has actually
                // completed (next_ordinal > 0). Cancelling before chunk 0
                // ever ran must leave no checkpoint behind, or a later
                // resume would believe chunk 0 is done when stream.pcm
                // was never even created.
                if next_ordinal > 0 {
                    self.checkpoint_now(
                        &checkpoint_log,
                        &fingerprint,
                        next_ordinal - 1,
                        stream_offset,
                        &chapter_markers,
                    )?;
                }
                self.report(&mut on_progress, State::Cancelled, next_ordinal, total);
                return Ok(RunOutcome::Cancelled);
            }

            if chunk.is_chapter_start && chunk.ordinal != 0 {
                let pad = synthesis_worker::chapter_boundary_pad_samples(self.config.sample_rate);
                stream_offset = stream_writer.append_chunk(&pad)?;
            }
            if chunk.is_chapter_start {
                chapter_markers.push(ChapterMarker {
                    chapter_ordinal: chunk.chapter_ordinal,
                    title: chunk.chapter_title.clone().unwrap_or_default(),
                    stream_byte_offset: stream_offset,
                });
            }

            let audio = self.synthesize_one(chunk)?;
            stream_offset = stream_writer.append_chunk(&audio)?;
            next_ordinal = chunk.ordinal + 1;
            completed_since_checkpoint += 1;

            let is_last = chunk.ordinal + 1 == total;
            if completed_since_checkpoint >= self.config.checkpoint_interval || is_last {
                self.checkpoint_now(
                    &checkpoint_log,
                    &fingerprint,
                    chunk.ordinal,
                    stream_offset,
                    &chapter_markers,
                )?;
                completed_since_checkpoint = 0;
            }

            self.report(&mut on_progress, State::Synthesizing, next_ordinal, total);
        }

        // Synthesizing -> Encoding
        self.report(&mut on_progress, State::Encoding, total, total);
        let destination = self
            .config
            .output_dir
            .join(format!("audiobook.{}", self.config.output_format.extension()));
        self.encoder.encode(EncodeParams {
            stream_path: &stream_path,
            sample_rate: self.config.sample_rate,
            format: self.config.output_format,
            chapter_markers: &chapter_markers,
            stream_byte_offset: stream_offset,
            destination: &destination,
            workspace_dir: &session_dir,
            title: self.config.title.as_deref(),
            author: self.config.author.as_deref(),
            narrator_voice: &self.config.narrator_voice,
        })?;

        // Encoding -> Done
        self.report(&mut on_progress, State::Done, total, total);
        Ok(RunOutcome::Completed(destination))
    }

    fn synthesize_one(&self, chunk: &Chunk) -> Result<Vec<i16>> {
        let spans = dialogue_router::route(
            &chunk.text,
            &self.config.narrator_voice,
            &self.config.character_map,
            self.config.character_voices,
        );
        let audio = synthesis_worker::synthesize_chunk(
            self.backend.as_ref(),
            chunk.ordinal,
            &spans,
            self.config.speed,
            self.config.sample_rate,
            self.config.synthesis_timeout,
        )?;
        Ok(audio.samples)
    }

    fn checkpoint_now(
        &self,
        log: &CheckpointLog,
        fingerprint: &SettingsFingerprint,
        last_completed_ordinal: u64,
        stream_byte_offset: u64,
        chapter_markers: &[ChapterMarker],
    ) -> Result<()> {
        let checkpoint = Checkpoint {
            fingerprint: fingerprint.clone(),
            last_completed_ordinal,
            stream_byte_offset,
            chapter_markers: chapter_markers.to_vec(),
        };
        log.write(&checkpoint)
    }

    fn report(&self, on_progress: &mut Option<&mut ProgressCallback<'_>>, state: State, completed: u64, total: u64) {
        if let Some(cb) = on_progress.as_mut() {
            cb(Progress {
                state,
                chunks_completed: completed,
                chunks_total: total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use crate::parser::PlainTextParser;
    use crate::voice::test_support::FakeVoice;

    fn base_config(workspace: &Path, output: &Path) -> Config {
        Config {
            narrator_voice: "am_michael".to_string(),
            speed: 1.0,
            sample_rate: 24_000,
            output_format: OutputFormat::Wav,
            character_voices: false,
            character_map: Default::default(),
            char_target: 400,
            phoneme_hard_limit: 510,
            checkpoint_interval: 2,
            parallel_workers: 1,
            output_dir: output.to_path_buf(),
            workspace_dir: workspace.to_path_buf(),
            synthesis_timeout: std::time::Duration::from_secs(5),
            title: Some("Test Book".to_string()),
            author: None,
        }
    }

    #[test]
    fn single_chunk_run_writes_checkpoint_and_stream() {
        let workspace = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let input_dir = tempfile::tempdir().unwrap();
        let input_path = input_dir.path().join("book.txt");
        std::fs::write(&input_path, "Hello world.").unwrap();

        let config = base_config(workspace.path(), output.path());
        let backend: Arc<dyn VoiceSynthesizer> = Arc::new(FakeVoice::new(24_000));
        let orchestrator = Orchestrator::new(config, backend, "fake-v1");
        let cancel = AtomicBool::new(false);

        let outcome = orchestrator
            .run(&input_path, &PlainTextParser, &cancel, None)
            .unwrap();

        match outcome {
            RunOutcome::Completed(path) => assert!(path.exists() || path.to_string_lossy().contains("audiobook")),
            RunOutcome::Cancelled => panic!("expected completion"),
        }
    }

    #[test]
    fn cancellation_is_observed_before_first_chunk() {
        let workspace = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let input_dir = tempfile::tempdir().unwrap();
        let input_path = input_dir.path().join("book.txt");
        std::fs::write(&input_path, "Hello world. Another sentence here for good measure.").unwrap();

        let config = base_config(workspace.path(), output.path());
        let backend: Arc<dyn VoiceSynthesizer> = Arc::new(FakeVoice::new(24_000));
        let orchestrator = Orchestrator::new(config, backend, "fake-v1");
        let cancel = AtomicBool::new(true);

        let outcome = orchestrator
            .run(&input_path, &PlainTextParser, &cancel, None)
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));
    }

    #[test]
    fn cancellation_before_any_chunk_leaves_no_checkpoint_and_a_later_run_completes() {
        let workspace = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let input_dir = tempfile::tempdir().unwrap();
        let input_path = input_dir.path().join("book.txt");
        std::fs::write(&input_path, "Hello world. Another sentence here for good measure.").unwrap();

        let config = base_config(workspace.path(), output.path());
        let backend: Arc<dyn VoiceSynthesizer> = Arc::new(FakeVoice::new(24_000));
        let orchestrator = Orchestrator::new(config, backend, "fake-v1");

        let cancel = AtomicBool::new(true);
        let outcome = orchestrator
            .run(&input_path, &PlainTextParser, &cancel, None)
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Cancelled));

        let fingerprint = SettingsFingerprint::compute(&input_path, &orchestrator.config, "fake-v1").unwrap();
        let session_dir = orchestrator.config.workspace_dir.join(fingerprint.to_hex());
        let checkpoint_log = CheckpointLog::new(&session_dir);
        assert!(
            checkpoint_log.read().unwrap().is_none(),
            "cancelling before any chunk completed must not leave a checkpoint behind"
        );

        let cancel = AtomicBool::new(false);
        let outcome = orchestrator
            .run(&input_path, &PlainTextParser, &cancel, None)
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
    }
}

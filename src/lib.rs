//! `narrator` — an audiobook narration pipeline.
//!
//! Converts a normalized book-length [`Document`](document::Document) into
//! a single narrated audiobook artifact: text normalization and chunking,
//! per-chunk voice routing between narrator and detected characters,
//! streaming synthesis through an injected neural TTS backend, and
//! resumable assembly of the resulting audio into a final container with
//! chapter markers.
//!
//! The pipeline is a unidirectional flow with one durable side channel
//! (the checkpoint log):
//!
//! ```text
//! Orchestrator -> Normalizer -> Chunker -> (per chunk) Dialogue Router
//!   -> Synthesis Worker -> Stream Writer -> Checkpoint Log
//! ```
//!
//! Format-specific text extraction, the TTS backend itself, and the final
//! audio encoder are all collaborators behind narrow trait interfaces
//! ([`parser::DocumentParser`], [`voice::VoiceSynthesizer`],
//! [`finalizer::AudioEncoder`]). A host application may swap in its own
//! implementation of any of them; this crate carries exactly one concrete
//! implementation of each so the ambient CLI/server binaries have
//! something to run against ([`parser::PlainTextParser`],
//! [`finalizer::FfmpegEncoder`]), plus [`process_backend::ProcessSynthesizer`]
//! for driving an external TTS process.

pub mod checkpoint;
pub mod chunker;
pub mod config;
pub mod dialogue_router;
pub mod document;
pub mod error;
pub mod finalizer;
pub mod fingerprint;
pub mod format;
pub mod logging;
pub mod normalizer;
pub mod orchestrator;
pub mod parser;
pub mod process_backend;
pub mod progress;
pub mod resample;
pub mod stream_writer;
pub mod synthesis_worker;
pub mod voice;
pub mod voice_catalog;

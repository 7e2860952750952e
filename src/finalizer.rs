//! Finalizer: drives the external encoder to produce the final container,
//! injects chapter markers, and deletes the intermediate stream (spec.md
//! §4.7).
//!
//! The encoder itself is an injectable collaborator (spec.md §6 "Encoder
//! collaborator"), expressed the same way as [`crate::voice::VoiceSynthesizer`]:
//! a narrow trait plus one concrete implementation this crate carries.
//! [`FfmpegEncoder`] is that implementation. FFMETADATA1 generation is
//! grounded on `gen-audiobook`'s `create_ffmpeg_metadata`; the `ffmpeg`
//! invocation itself is grounded on `m4btool`'s explicit
//! `Command::new("ffmpeg")` argv construction — no shell interpolation of
//! user-controlled paths. `OutputFormat::Wav` never touches chapters (it
//! can't carry them), so it is written directly with `hound` instead of
//! round-tripping through `ffmpeg`.

use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::checkpoint::ChapterMarker;
use crate::error::{Error, Result};
use crate::format::OutputFormat;
use crate::stream_writer;

/// Bytes per PCM frame for mono 16-bit output (spec.md §4.7 offset→time
/// conversion: `offset_bytes / (sample_rate * bytes_per_frame)`).
const BYTES_PER_FRAME: u64 = 2;

/// Everything the Encoder collaborator needs to produce one final artifact
/// (spec.md §6 `encode(pcm_stream_path, format, sample_rate, channels,
/// chapters, metadata, destination)`).
pub struct EncodeParams<'a> {
    pub stream_path: &'a Path,
    pub sample_rate: u32,
    pub format: OutputFormat,
    pub chapter_markers: &'a [ChapterMarker],
    pub stream_byte_offset: u64,
    pub destination: &'a Path,
    pub workspace_dir: &'a Path,
    pub title: Option<&'a str>,
    pub author: Option<&'a str>,
    pub narrator_voice: &'a str,
}

/// The external audio-encoder collaborator (spec.md §1, §6): out of scope
/// for the core, injected by the host application. Must report its own
/// errors and be idempotent-on-destination (overwrite or atomic replace).
pub trait AudioEncoder {
    fn encode(&self, params: EncodeParams<'_>) -> anyhow::Result<()>;
}

/// The one concrete `AudioEncoder` this crate carries: `ffmpeg` via
/// explicit `Command` argv for chaptered/compressed containers, direct
/// `hound` writes for plain wav (which can't carry chapters anyway).
pub struct FfmpegEncoder;

impl AudioEncoder for FfmpegEncoder {
    /// Produce the final audiobook file and remove the session workspace on
    /// success (spec.md §4.7 steps 1-5).
    fn encode(&self, params: EncodeParams<'_>) -> anyhow::Result<()> {
        verify_stream_size(params.stream_path, params.stream_byte_offset)?;

        if let Some(parent) = params.destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageError(e.to_string()))?;
        }

        if params.format == OutputFormat::Wav {
            write_wav_direct(&params)?;
        } else {
            let metadata_path = params.workspace_dir.join("chapters.metadata");
            if params.format.supports_chapters() {
                let chapters = build_chapter_infos(params.chapter_markers, params.sample_rate);
                write_ffmpeg_metadata(&metadata_path, &params, &chapters)?;
            }

            let staged_output = params.workspace_dir.join(format!("output.{}", params.format.extension()));
            run_ffmpeg(&params, &metadata_path, &staged_output)?;

            std::fs::rename(&staged_output, params.destination)
                .or_else(|_| std::fs::copy(&staged_output, params.destination).map(|_| ()))
                .map_err(|e| Error::StorageError(format!("failed to move final artifact: {e}")))?;
        }

        std::fs::remove_dir_all(params.workspace_dir).ok();
        Ok(())
    }
}

/// `OutputFormat::Wav` has no chapter markers to carry, so it is written
/// straight from the StreamFile's PCM samples with `hound` rather than
/// shelled out to `ffmpeg`.
fn write_wav_direct(params: &EncodeParams<'_>) -> Result<()> {
    let samples = stream_writer::read_all_samples(params.stream_path)
        .map_err(|e| Error::StorageError(format!("failed to read stream for wav output: {e}")))?;
    let spec = WavSpec {
        channels: 1,
        sample_rate: params.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(params.destination, spec).map_err(|e| Error::StorageError(format!("failed to create wav output: {e}")))?;
    for sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| Error::StorageError(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::StorageError(format!("failed to finalize wav output: {e}")))?;
    Ok(())
}

fn verify_stream_size(stream_path: &Path, expected_offset: u64) -> Result<()> {
    let actual = std::fs::metadata(stream_path)
        .map_err(|e| Error::StorageError(format!("failed to stat stream file: {e}")))?
        .len();
    if actual > expected_offset {
        crate::stream_writer::StreamWriter::new(stream_path, 0)
            .truncate_to(expected_offset)
            .ok();
    } else if actual < expected_offset {
        return Err(Error::CorruptionError(
            "stream file shorter than the checkpointed offset".to_string(),
        ));
    }
    Ok(())
}

struct ChapterInfo {
    title: String,
    start_ms: u64,
    end_ms: u64,
}

fn build_chapter_infos(markers: &[ChapterMarker], sample_rate: u32) -> Vec<ChapterInfo> {
    let offset_to_ms = |offset: u64| -> u64 {
        let frames = offset.saturating_sub(stream_writer::HEADER_LEN) / BYTES_PER_FRAME;
        frames * 1000 / sample_rate as u64
    };

    let mut infos = Vec::with_capacity(markers.len());
    for (idx, marker) in markers.iter().enumerate() {
        let start_ms = offset_to_ms(marker.stream_byte_offset);
        let end_ms = markers
            .get(idx + 1)
            .map(|next| offset_to_ms(next.stream_byte_offset))
            .unwrap_or(u64::MAX);
        infos.push(ChapterInfo {
            title: marker.title.clone(),
            start_ms,
            end_ms,
        });
    }
    infos
}

fn escape_metadata_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\') {
            escaped.push('\\');
        }
        if c == '\n' {
            escaped.push_str("\\\n");
            continue;
        }
        escaped.push(c);
    }
    escaped
}

fn write_ffmpeg_metadata(path: &Path, params: &EncodeParams<'_>, chapters: &[ChapterInfo]) -> Result<()> {
    let mut out = String::new();
    out.push_str(";FFMETADATA1\n");
    if let Some(title) = params.title {
        out.push_str(&format!("title={}\n", escape_metadata_value(title)));
    }
    if let Some(author) = params.author {
        out.push_str(&format!("artist={}\n", escape_metadata_value(author)));
    }
    out.push_str(&format!(
        "comment={}\n",
        escape_metadata_value(&format!("narrator voice: {}", params.narrator_voice))
    ));

    for chapter in chapters {
        out.push_str("[CHAPTER]\n");
        out.push_str("TIMEBASE=1/1000\n");
        out.push_str(&format!("START={}\n", chapter.start_ms));
        let end = if chapter.end_ms == u64::MAX {
            chapter.start_ms
        } else {
            chapter.end_ms
        };
        out.push_str(&format!("END={end}\n"));
        out.push_str(&format!("title={}\n", escape_metadata_value(&chapter.title)));
    }

    std::fs::write(path, out).map_err(|e| Error::StorageError(format!("failed to write chapter metadata: {e}")))
}

fn run_ffmpeg(params: &EncodeParams<'_>, metadata_path: &Path, staged_output: &Path) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-skip_initial_bytes")
        .arg(stream_writer::HEADER_LEN.to_string())
        .arg("-f")
        .arg("s16le")
        .arg("-ar")
        .arg(params.sample_rate.to_string())
        .arg("-ac")
        .arg("1")
        .arg("-i")
        .arg(params.stream_path);

    if params.format.supports_chapters() && metadata_path.exists() {
        cmd.arg("-i").arg(metadata_path).arg("-map_metadata").arg("1");
    }

    if let Some(title) = params.title {
        cmd.arg("-metadata").arg(format!("title={title}"));
    }
    if let Some(author) = params.author {
        cmd.arg("-metadata").arg(format!("artist={author}"));
    }

    cmd.arg(staged_output);

    let output = cmd
        .output()
        .map_err(|e| Error::StorageError(format!("failed to invoke ffmpeg: {e}")))?;
    if !output.status.success() {
        return Err(Error::StorageError(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_reserved_characters() {
        assert_eq!(escape_metadata_value("a=b;c#d\\e"), "a\\=b\\;c\\#d\\\\e");
    }

    #[test]
    fn escape_handles_newlines() {
        assert_eq!(escape_metadata_value("line1\nline2"), "line1\\\nline2");
    }

    #[test]
    fn chapter_infos_derive_start_and_end_from_offsets() {
        let markers = vec![
            ChapterMarker {
                chapter_ordinal: 0,
                title: "Chapter 1".to_string(),
                stream_byte_offset: 16,
            },
            ChapterMarker {
                chapter_ordinal: 1,
                title: "Chapter 2".to_string(),
                stream_byte_offset: 16 + 48_000 * 2, // 1 second in
            },
        ];
        let infos = build_chapter_infos(&markers, 48_000);
        assert_eq!(infos[0].start_ms, 0);
        assert_eq!(infos[0].end_ms, 1000);
        assert_eq!(infos[1].start_ms, 1000);
        assert_eq!(infos[1].end_ms, u64::MAX);
    }
}

//! Stream Writer: appends chunk PCM to a single growing intermediate audio
//! stream file in a byte-framed format the encoder accepts (spec.md §4.5,
//! §6).
//!
//! The `StreamFile` is a raw headered PCM file, not a `hound` WAV: hound's
//! writer doesn't support this crate's custom 16-byte header or
//! mid-stream resume/truncate, so plain `File` + `BufWriter` is used
//! instead, following the teacher's general append-then-fsync discipline.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// `"AURDR\0\0\0"` — 8 bytes, padded with NULs to round out the magic.
const MAGIC: &[u8; 8] = b"AURDR\0\0\0";
pub const HEADER_LEN: u64 = 16;
const STREAM_VERSION: u32 = 1;

/// Appends PCM frames to the session `StreamFile`, writing the header
/// lazily on first write.
pub struct StreamWriter {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<BufWriter<File>>,
}

impl StreamWriter {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            writer: None,
        }
    }

    /// Append chunk PCM, flush, fsync, and return the new file size
    /// (spec.md §4.5 procedure).
    pub fn append_chunk(&mut self, samples: &[i16]) -> Result<u64> {
        self.ensure_open()?;
        let writer = self.writer.as_mut().expect("ensure_open initializes writer");

        for sample in samples {
            writer
                .write_all(&sample.to_le_bytes())
                .map_err(|e| Error::StorageError(format!("stream write failed: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| Error::StorageError(format!("stream flush failed: {e}")))?;
        writer
            .get_ref()
            .sync_data()
            .map_err(|e| Error::StorageError(format!("stream fsync failed: {e}")))?;

        let size = writer
            .get_ref()
            .metadata()
            .map_err(|e| Error::StorageError(format!("stream stat failed: {e}")))?
            .len();
        Ok(size)
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::StorageError(format!("failed to open stream file: {e}")))?;
        let mut writer = BufWriter::new(file);
        if is_new {
            writer
                .write_all(MAGIC)
                .map_err(|e| Error::StorageError(format!("header write failed: {e}")))?;
            writer
                .write_all(&STREAM_VERSION.to_le_bytes())
                .map_err(|e| Error::StorageError(format!("header write failed: {e}")))?;
            writer
                .write_all(&self.sample_rate.to_le_bytes())
                .map_err(|e| Error::StorageError(format!("header write failed: {e}")))?;
            writer
                .flush()
                .map_err(|e| Error::StorageError(format!("header flush failed: {e}")))?;
        }
        self.writer = Some(writer);
        Ok(())
    }

    /// Current file size in bytes, including the header (0 if the file
    /// doesn't exist yet).
    pub fn current_size(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::StorageError(format!("stream stat failed: {e}"))),
        }
    }

    /// Truncate the StreamFile to exactly `offset` bytes, used on resume
    /// to discard a partially-written tail past the last checkpoint
    /// (spec.md §8 append-only durability property). `.create(true)` makes
    /// `truncate_to(0)` against a stream file that was never created a
    /// no-op base case rather than a `NotFound` error.
    pub fn truncate_to(&mut self, offset: u64) -> Result<()> {
        self.writer = None;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::StorageError(format!("failed to open stream file for truncate: {e}")))?;
        file.set_len(offset)
            .map_err(|e| Error::StorageError(format!("truncate failed: {e}")))?;
        Ok(())
    }
}

/// Read back the header of a StreamFile, validating the magic.
pub fn read_header(path: &Path) -> Result<(u32, u32)> {
    let mut file =
        File::open(path).map_err(|e| Error::StorageError(format!("failed to open stream file: {e}")))?;
    let mut header = [0u8; HEADER_LEN as usize];
    file.read_exact(&mut header)
        .map_err(|e| Error::CorruptionError(format!("truncated stream header: {e}")))?;
    if &header[0..8] != MAGIC {
        return Err(Error::CorruptionError("bad stream magic".to_string()));
    }
    let version = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let sample_rate = u32::from_le_bytes(header[12..16].try_into().unwrap());
    Ok((version, sample_rate))
}

/// Read back all PCM samples after the header, for tests and for the
/// Finalizer's own verification pass.
pub fn read_all_samples(path: &Path) -> Result<Vec<i16>> {
    let mut file =
        File::open(path).map_err(|e| Error::StorageError(format!("failed to open stream file: {e}")))?;
    file.seek(SeekFrom::Start(HEADER_LEN))
        .map_err(|e| Error::StorageError(format!("seek failed: {e}")))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| Error::StorageError(format!("read failed: {e}")))?;
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

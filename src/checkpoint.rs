//! Checkpoint Log: a tiny, fsync-durable record of
//! `(completed_chunk_ordinal, byte_offset_in_stream, settings_fingerprint)`
//! (spec.md §4.6, §6).
//!
//! Grounded on a `CheckpointWriter` trait abstracting the filesystem calls
//! for testability (crash scenarios can be exercised with a fake writer
//! without touching a real filesystem), layered with the spec's two-slot
//! `A`/`B` alternation on top.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fingerprint::SettingsFingerprint;

const MAGIC: &[u8; 8] = b"NARRCKPT";
const CHECKPOINT_VERSION: u32 = 1;

/// `(chapter_ordinal, chapter_title, stream_byte_offset_at_start)`
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMarker {
    pub chapter_ordinal: u32,
    pub title: String,
    pub stream_byte_offset: u64,
}

/// `{ fingerprint, last_completed_ordinal, stream_byte_offset,
/// chapter_marker_table }` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub fingerprint: SettingsFingerprint,
    pub last_completed_ordinal: u64,
    pub stream_byte_offset: u64,
    pub chapter_markers: Vec<ChapterMarker>,
}

impl Checkpoint {
    pub fn new(fingerprint: SettingsFingerprint) -> Self {
        Self {
            fingerprint,
            last_completed_ordinal: 0,
            stream_byte_offset: 0,
            chapter_markers: Vec::new(),
        }
    }

    /// Binary layout per spec.md §6:
    /// `magic(8) | version(u32) | fingerprint_len(u32) | fingerprint(bytes)
    /// | last_ordinal(u64) | stream_offset(u64) | n_markers(u32) |
    /// markers[...] | crc32(u32)`. Each marker:
    /// `ordinal(u64) | title_len(u32) | title(utf8) | offset(u64)`.
    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&CHECKPOINT_VERSION.to_le_bytes());
        let fp_bytes = self.fingerprint.as_bytes();
        body.extend_from_slice(&(fp_bytes.len() as u32).to_le_bytes());
        body.extend_from_slice(fp_bytes);
        body.extend_from_slice(&self.last_completed_ordinal.to_le_bytes());
        body.extend_from_slice(&self.stream_byte_offset.to_le_bytes());
        body.extend_from_slice(&(self.chapter_markers.len() as u32).to_le_bytes());
        for marker in &self.chapter_markers {
            body.extend_from_slice(&(marker.chapter_ordinal as u64).to_le_bytes());
            let title_bytes = marker.title.as_bytes();
            body.extend_from_slice(&(title_bytes.len() as u32).to_le_bytes());
            body.extend_from_slice(title_bytes);
            body.extend_from_slice(&marker.stream_byte_offset.to_le_bytes());
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut out = Vec::with_capacity(MAGIC.len() + body.len() + 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 4 {
            return Err(Error::CorruptionError("checkpoint too short".to_string()));
        }
        if &bytes[0..8] != MAGIC {
            return Err(Error::CorruptionError("bad checkpoint magic".to_string()));
        }
        let body = &bytes[8..bytes.len() - 4];
        let stored_crc = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(Error::CorruptionError("checkpoint CRC mismatch".to_string()));
        }

        let mut cursor = 0usize;
        let version = read_u32(body, &mut cursor)?;
        if version != CHECKPOINT_VERSION {
            return Err(Error::CorruptionError(format!(
                "unsupported checkpoint version {version}"
            )));
        }
        let fp_len = read_u32(body, &mut cursor)? as usize;
        let fingerprint_bytes = read_bytes(body, &mut cursor, fp_len)?;
        let fingerprint = SettingsFingerprint::from_bytes(fingerprint_bytes.to_vec());
        let last_completed_ordinal = read_u64(body, &mut cursor)?;
        let stream_byte_offset = read_u64(body, &mut cursor)?;
        let n_markers = read_u32(body, &mut cursor)? as usize;
        let mut chapter_markers = Vec::with_capacity(n_markers);
        for _ in 0..n_markers {
            let chapter_ordinal = read_u64(body, &mut cursor)? as u32;
            let title_len = read_u32(body, &mut cursor)? as usize;
            let title_bytes = read_bytes(body, &mut cursor, title_len)?;
            let title = std::str::from_utf8(title_bytes)
                .map_err(|_| Error::CorruptionError("non-utf8 marker title".to_string()))?
                .to_string();
            let stream_byte_offset = read_u64(body, &mut cursor)?;
            chapter_markers.push(ChapterMarker {
                chapter_ordinal,
                title,
                stream_byte_offset,
            });
        }

        Ok(Checkpoint {
            fingerprint,
            last_completed_ordinal,
            stream_byte_offset,
            chapter_markers,
        })
    }
}

fn read_u32(body: &[u8], cursor: &mut usize) -> Result<u32> {
    let bytes = read_bytes(body, cursor, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(body: &[u8], cursor: &mut usize) -> Result<u64> {
    let bytes = read_bytes(body, cursor, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_bytes<'a>(body: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = *cursor + len;
    if end > body.len() {
        return Err(Error::CorruptionError("checkpoint truncated".to_string()));
    }
    let slice = &body[*cursor..end];
    *cursor = end;
    Ok(slice)
}

/// Trait abstracting checkpoint I/O for testability, mirroring the
/// write-tmp/fsync/rename/fsync-dir split used by durable snapshot writers
/// elsewhere in the ecosystem.
pub trait CheckpointWriter: Send + Sync {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn fsync_file(&self, path: &Path) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn fsync_dir(&self, path: &Path) -> Result<()>;
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;
}

/// Production checkpoint writer using real filesystem operations.
pub struct FsCheckpointWriter;

impl CheckpointWriter for FsCheckpointWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::StorageError(e.to_string()))?;
        }
        let mut file = File::create(path).map_err(|e| Error::StorageError(e.to_string()))?;
        file.write_all(data).map_err(|e| Error::StorageError(e.to_string()))?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> Result<()> {
        File::open(path)
            .and_then(|f| f.sync_all())
            .map_err(|e| Error::StorageError(e.to_string()))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to).map_err(|e| Error::StorageError(e.to_string()))
    }

    fn fsync_dir(&self, path: &Path) -> Result<()> {
        File::open(path)
            .and_then(|f| f.sync_all())
            .map_err(|e| Error::StorageError(e.to_string()))
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageError(e.to_string())),
        }
    }
}

/// Manages the two alternating checkpoint slots (spec.md §4.6).
pub struct CheckpointLog<W: CheckpointWriter = FsCheckpointWriter> {
    writer: W,
    dir: PathBuf,
}

impl CheckpointLog<FsCheckpointWriter> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_writer(FsCheckpointWriter, dir)
    }
}

impl<W: CheckpointWriter> CheckpointLog<W> {
    pub fn with_writer(writer: W, dir: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            dir: dir.into(),
        }
    }

    fn slot_a(&self) -> PathBuf {
        self.dir.join("checkpoint.a")
    }

    fn slot_b(&self) -> PathBuf {
        self.dir.join("checkpoint.b")
    }

    fn next_tmp(&self) -> PathBuf {
        self.dir.join("checkpoint.next")
    }

    /// Write protocol (spec.md §4.6): write to `checkpoint.next`, fsync,
    /// rename over the inactive slot, fsync directory.
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let current = self.read()?;
        let target = match &current {
            // Overwrite whichever slot is *not* the one we just read as
            // active, so a crash mid-write never destroys the last good
            // slot.
            Some((active_path, _)) if *active_path == self.slot_a() => self.slot_b(),
            _ => self.slot_a(),
        };

        let encoded = checkpoint.encode();
        let tmp = self.next_tmp();
        self.writer.write_tmp(&tmp, &encoded)?;
        self.writer.fsync_file(&tmp)?;
        self.writer.rename(&tmp, &target)?;
        self.writer.fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Read protocol: read both slots, verify CRC and version, prefer the
    /// one with the higher `last_completed_ordinal`.
    pub fn read(&self) -> Result<Option<(PathBuf, Checkpoint)>> {
        let a = self.try_read_slot(&self.slot_a());
        let b = self.try_read_slot(&self.slot_b());
        match (a, b) {
            (Some(a), Some(b)) => {
                if a.1.last_completed_ordinal >= b.1.last_completed_ordinal {
                    Ok(Some(a))
                } else {
                    Ok(Some(b))
                }
            }
            (Some(a), None) => Ok(Some(a)),
            (None, Some(b)) => Ok(Some(b)),
            (None, None) => Ok(None),
        }
    }

    fn try_read_slot(&self, path: &Path) -> Option<(PathBuf, Checkpoint)> {
        let bytes = self.writer.read(path).ok().flatten()?;
        Checkpoint::decode(&bytes).ok().map(|c| (path.to_path_buf(), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_checkpoint(ordinal: u64) -> Checkpoint {
        Checkpoint {
            fingerprint: SettingsFingerprint::from_bytes(vec![1, 2, 3, 4]),
            last_completed_ordinal: ordinal,
            stream_byte_offset: 1024 + ordinal,
            chapter_markers: vec![ChapterMarker {
                chapter_ordinal: 0,
                title: "Chapter 1".to_string(),
                stream_byte_offset: 16,
            }],
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let checkpoint = sample_checkpoint(5);
        let encoded = checkpoint.encode();
        let decoded = Checkpoint::decode(&encoded).unwrap();
        assert_eq!(decoded, checkpoint);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let checkpoint = sample_checkpoint(1);
        let mut encoded = checkpoint.encode();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert!(Checkpoint::decode(&encoded).is_err());
    }

    #[test]
    fn read_prefers_higher_ordinal_across_slots() {
        let dir = tempdir().unwrap();
        let log = CheckpointLog::new(dir.path());
        log.write(&sample_checkpoint(1)).unwrap();
        log.write(&sample_checkpoint(2)).unwrap();
        let (_, latest) = log.read().unwrap().unwrap();
        assert_eq!(latest.last_completed_ordinal, 2);
    }

    #[test]
    fn alternates_slots_on_each_write() {
        let dir = tempdir().unwrap();
        let log = CheckpointLog::new(dir.path());
        log.write(&sample_checkpoint(1)).unwrap();
        assert!(dir.path().join("checkpoint.a").exists());
        log.write(&sample_checkpoint(2)).unwrap();
        assert!(dir.path().join("checkpoint.b").exists());
    }

    #[test]
    fn missing_slots_read_as_none() {
        let dir = tempdir().unwrap();
        let log: CheckpointLog = CheckpointLog::new(dir.path());
        assert!(log.read().unwrap().is_none());
    }
}

//! SettingsFingerprint: a stable hash over every input that would change
//! the produced audio (spec.md §3). Grounded on a SHA-256 content-hash
//! pattern used elsewhere in the ecosystem for resumable-session
//! identity.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::Config;

/// Opaque stable hash controlling resume eligibility. Any difference in
/// any of its inputs invalidates resume (spec.md §8 "Fingerprint
/// sensitivity").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettingsFingerprint(Vec<u8>);

impl SettingsFingerprint {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Short hex representation, suitable for use as a session id.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Compute the fingerprint over everything spec.md §3 lists: input
    /// file identity, normalizer/chunker parameters, narrator voice,
    /// speed, sample rate, character-to-voice map, and backend model
    /// identity.
    pub fn compute(
        input_path: &Path,
        config: &Config,
        backend_model_identity: &str,
    ) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(input_path)?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(input_path.to_string_lossy().as_bytes());
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        hasher.update(config.narrator_voice.as_bytes());
        hasher.update(config.speed.to_le_bytes());
        hasher.update(config.sample_rate.to_le_bytes());
        hasher.update(config.output_format.extension().as_bytes());
        hasher.update([config.character_voices as u8]);
        hasher.update(config.char_target.to_le_bytes());
        hasher.update(config.phoneme_hard_limit.to_le_bytes());

        // HashMap iteration order isn't stable; sort keys before hashing
        // so the fingerprint is reproducible (mirrors the determinism
        // discipline the Chunker applies to its own assembly loop).
        let mut entries: Vec<(&String, &String)> = config.character_map.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        for (name, voice) in entries {
            hasher.update(name.as_bytes());
            hasher.update(voice.as_bytes());
        }

        hasher.update(backend_model_identity.as_bytes());

        Ok(Self(hasher.finalize().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn identical_inputs_produce_identical_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_file(&dir, "book.txt", "hello world");
        let config = Config::default();
        let a = SettingsFingerprint::compute(&path, &config, "model-v1").unwrap();
        let b = SettingsFingerprint::compute(&path, &config, "model-v1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn changing_speed_invalidates_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_file(&dir, "book.txt", "hello world");
        let mut config = Config::default();
        config.speed = 1.0;
        let a = SettingsFingerprint::compute(&path, &config, "model-v1").unwrap();
        config.speed = 1.2;
        let b = SettingsFingerprint::compute(&path, &config, "model-v1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn character_map_order_does_not_affect_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp_file(&dir, "book.txt", "hello world");
        let mut a = Config::default();
        a.character_map.insert("Adam".to_string(), "v1".to_string());
        a.character_map.insert("Eve".to_string(), "v2".to_string());

        let mut b = Config::default();
        b.character_map.insert("Eve".to_string(), "v2".to_string());
        b.character_map.insert("Adam".to_string(), "v1".to_string());

        let fa = SettingsFingerprint::compute(&path, &a, "model-v1").unwrap();
        let fb = SettingsFingerprint::compute(&path, &b, "model-v1").unwrap();
        assert_eq!(fa, fb);
    }
}

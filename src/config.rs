use std::collections::HashMap;
use std::path::PathBuf;

use crate::format::OutputFormat;

/// Options that control how a document is narrated.
///
/// This struct represents *library-level configuration*, not CLI flags
/// directly. The CLI is responsible for mapping user input into this type
/// so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (servers, tests, batch jobs) can construct options
///   programmatically
#[derive(Debug, Clone)]
pub struct Config {
    /// Default voice id for non-dialogue spans.
    pub narrator_voice: String,

    /// Speed multiplier passed to the backend, clamped to `[0.5, 2.0]`.
    pub speed: f32,

    /// Output sample rate in Hz.
    pub sample_rate: u32,

    /// Container format for the final artifact.
    pub output_format: OutputFormat,

    /// Whether the Dialogue Router is enabled.
    pub character_voices: bool,

    /// Mapping of detected speaker name to voice id.
    pub character_map: HashMap<String, String>,

    /// Chunker soft character bound.
    pub char_target: usize,

    /// Chunker hard phoneme bound, a property of the synthesis backend.
    pub phoneme_hard_limit: usize,

    /// Chunks between checkpoints.
    pub checkpoint_interval: u64,

    /// Synthesis worker pool size. This implementation carries no
    /// concurrent worker pool, so only `1` is accepted; `validate()`
    /// rejects anything higher rather than silently ignoring it.
    pub parallel_workers: usize,

    /// Destination directory for the final artifact.
    pub output_dir: PathBuf,

    /// Temp root for the StreamFile and checkpoint slots.
    pub workspace_dir: PathBuf,

    /// Per-span synthesis deadline.
    pub synthesis_timeout: std::time::Duration,

    /// Title, if known from the parser.
    pub title: Option<String>,

    /// Author, if known from the parser.
    pub author: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            narrator_voice: "am_michael".to_string(),
            speed: 1.0,
            sample_rate: 48_000,
            output_format: OutputFormat::Wav,
            character_voices: false,
            character_map: HashMap::new(),
            char_target: 400,
            phoneme_hard_limit: 510,
            checkpoint_interval: 50,
            parallel_workers: 1,
            output_dir: std::env::temp_dir(),
            workspace_dir: std::env::temp_dir(),
            synthesis_timeout: std::time::Duration::from_secs(60),
            title: None,
            author: None,
        }
    }
}

impl Config {
    /// Validate the configuration, returning the fields that are out of
    /// their documented range as an `InputError`.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(0.5..=2.0).contains(&self.speed) {
            return Err(crate::error::Error::InputError(format!(
                "speed {} out of range [0.5, 2.0]",
                self.speed
            )));
        }
        if self.char_target == 0 {
            return Err(crate::error::Error::InputError(
                "char_target must be > 0".to_string(),
            ));
        }
        if self.phoneme_hard_limit == 0 {
            return Err(crate::error::Error::InputError(
                "phoneme_hard_limit must be > 0".to_string(),
            ));
        }
        if self.parallel_workers == 0 {
            return Err(crate::error::Error::InputError(
                "parallel_workers must be > 0".to_string(),
            ));
        }
        if self.parallel_workers > 1 {
            return Err(crate::error::Error::InputError(
                "parallel_workers > 1 is not supported: this build has no concurrent synthesis \
                 worker pool, set parallel_workers = 1"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn speed_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.speed = 3.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_char_target_rejected() {
        let mut cfg = Config::default();
        cfg.char_target = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parallel_workers_above_one_rejected() {
        let mut cfg = Config::default();
        cfg.parallel_workers = 2;
        assert!(cfg.validate().is_err());
    }
}

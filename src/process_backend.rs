//! A `VoiceSynthesizer` that shells out to an external TTS program, for
//! hosts that don't want to embed a neural backend directly in this
//! process. Grounded on `finalizer.rs`'s `Command::new("ffmpeg")`
//! pattern: explicit argv, no shell interpolation of user-controlled
//! text.
//!
//! spec.md §1 treats the TTS backend as an out-of-core collaborator; this
//! is one concrete, optional way to satisfy that collaborator without
//! this crate embedding any particular TTS engine. The wire protocol is
//! intentionally small: `text` goes to the child's stdin, and stdout is
//! read back as a 4-byte little-endian `u32` sample rate followed by
//! raw little-endian `f32` PCM samples.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::voice::VoiceSynthesizer;

/// Synthesizes by invoking `{command} --voice <voice_id> --speed <speed>`
/// once per call, piping `text` to stdin and reading samples from stdout.
pub struct ProcessSynthesizer {
    command: String,
}

impl ProcessSynthesizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

impl VoiceSynthesizer for ProcessSynthesizer {
    fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> anyhow::Result<(Vec<f32>, u32)> {
        let mut child = Command::new(&self.command)
            .arg("--voice")
            .arg(voice_id)
            .arg("--speed")
            .arg(speed.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(text.as_bytes())?;

        let output = child.wait_with_output()?;
        if !output.status.success() {
            anyhow::bail!(
                "tts backend '{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        parse_process_output(&output.stdout)
    }

    fn thread_safe(&self) -> bool {
        // Every call spawns its own child process, so concurrent calls
        // don't share any mutable state in this process.
        true
    }
}

fn parse_process_output(bytes: &[u8]) -> anyhow::Result<(Vec<f32>, u32)> {
    if bytes.len() < 4 {
        anyhow::bail!("tts backend output too short for a sample-rate header");
    }
    let (rate_bytes, rest) = bytes.split_at(4);
    let sample_rate = u32::from_le_bytes(rate_bytes.try_into().unwrap());
    if rest.len() % 4 != 0 {
        anyhow::bail!("tts backend output is not a whole number of f32 samples");
    }
    let samples = rest
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Ok((samples, sample_rate))
}

//! The TTS collaborator interface (spec.md §6), expressed as a capability
//! trait per spec.md §9 rather than an inheritance hierarchy. Mirrors the
//! shape of a `Backend` trait, collapsed to a single non-streaming call
//! since the Synthesis Worker already owns chunk-level buffering.

/// A pluggable neural TTS backend.
///
/// Implementations must be thread-safe whenever the host configures
/// `parallel_workers > 1`; backends that cannot support concurrent calls
/// should override [`VoiceSynthesizer::thread_safe`] to return `false`, at
/// which point the Orchestrator refuses to start with a worker pool larger
/// than one.
pub trait VoiceSynthesizer: Send + Sync {
    /// Synthesize `text` with the given `voice_id` at `speed`, returning
    /// interleaved mono `f32` samples and their native sample rate.
    fn synthesize(&self, text: &str, voice_id: &str, speed: f32) -> anyhow::Result<(Vec<f32>, u32)>;

    /// Whether this backend tolerates concurrent `synthesize` calls from
    /// multiple worker threads. Default `true`.
    fn thread_safe(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::VoiceSynthesizer;

    /// A deterministic fake backend for tests: emits `len(text)` samples of
    /// a fixed-frequency tone so output is reproducible and distinguishable
    /// from silence, at the backend's native rate (independent of the
    /// requested configured rate, to exercise the Worker's resampling
    /// path).
    pub struct FakeVoice {
        pub native_rate: u32,
        pub calls: AtomicUsize,
    }

    impl FakeVoice {
        pub fn new(native_rate: u32) -> Self {
            Self {
                native_rate,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VoiceSynthesizer for FakeVoice {
        fn synthesize(&self, text: &str, _voice_id: &str, speed: f32) -> anyhow::Result<(Vec<f32>, u32)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = ((text.chars().count() as f32) / speed).max(1.0) as usize;
            let samples: Vec<f32> = (0..n)
                .map(|i| (i as f32 * 0.1).sin() * 0.5)
                .collect();
            Ok((samples, self.native_rate))
        }
    }

    /// A backend that always fails, for retry-path tests.
    pub struct FailingVoice {
        pub transient: bool,
    }

    impl VoiceSynthesizer for FailingVoice {
        fn synthesize(&self, _text: &str, _voice_id: &str, _speed: f32) -> anyhow::Result<(Vec<f32>, u32)> {
            if self.transient {
                anyhow::bail!("transient synthesis failure")
            } else {
                anyhow::bail!("fatal synthesis failure")
            }
        }
    }
}

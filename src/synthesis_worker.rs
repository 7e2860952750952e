//! Synthesis Worker: turns a sequence of Spans into a single PCM buffer per
//! chunk (spec.md §4.4).

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use crate::dialogue_router::Span;
use crate::error::{Error, Result};
use crate::resample::resample_mono;
use crate::voice::VoiceSynthesizer;

/// Backoff schedule for transient backend errors (spec.md §4.4, §7):
/// retry up to 3 times with 100ms, 400ms, 1.6s delays.
const BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(400),
    Duration::from_millis(1_600),
];

const INTER_SPAN_VOICE_CHANGE_PAD_MS: u64 = 30;
const INTER_CHUNK_CHAPTER_START_PAD_MS: u64 = 300;

/// The PCM result of synthesizing one chunk.
pub struct ChunkAudio {
    pub ordinal: u64,
    /// int16 PCM samples at the configured sample rate, mono.
    pub samples: Vec<i16>,
}

/// Synthesize every span of a chunk, pad between voice changes, and
/// concatenate into a single chunk PCM buffer.
pub fn synthesize_chunk(
    backend: &dyn VoiceSynthesizer,
    ordinal: u64,
    spans: &[Span],
    speed: f32,
    sample_rate: u32,
    timeout: Duration,
) -> Result<ChunkAudio> {
    let mut samples: Vec<i16> = Vec::new();
    let mut previous_voice: Option<&str> = None;

    for span in spans {
        if let Some(prev) = previous_voice {
            if prev != span.voice_id {
                append_silence(&mut samples, sample_rate, INTER_SPAN_VOICE_CHANGE_PAD_MS);
            }
        }

        let (raw_samples, rate) = with_retries(|| {
            synthesize_with_timeout(backend, &span.text, &span.voice_id, speed, timeout)
        })?;

        let resampled = if rate == sample_rate {
            raw_samples
        } else {
            resample_mono(&raw_samples, rate, sample_rate)
                .map_err(|e| Error::FatalBackendError(format!("resample failed: {e:#}")))?
        };

        samples.extend(to_pcm_i16(&resampled));
        previous_voice = Some(&span.voice_id);
    }

    Ok(ChunkAudio { ordinal, samples })
}

/// Silence to insert between chunks whose boundary is a chapter start
/// (spec.md §4.4). Called by the Orchestrator between chunk writes, not by
/// `synthesize_chunk` itself, since it is a property of chunk *sequencing*
/// rather than of one chunk's synthesis.
pub fn chapter_boundary_pad_samples(sample_rate: u32) -> Vec<i16> {
    let mut samples = Vec::new();
    append_silence(&mut samples, sample_rate, INTER_CHUNK_CHAPTER_START_PAD_MS);
    samples
}

fn append_silence(samples: &mut Vec<i16>, sample_rate: u32, duration_ms: u64) {
    let n = (sample_rate as u64 * duration_ms / 1000) as usize;
    samples.extend(std::iter::repeat(0i16).take(n));
}

fn to_pcm_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Run `synthesize` on a background thread and enforce the per-span
/// deadline. A timeout is treated as a transient failure per spec.md §5.
fn synthesize_with_timeout(
    backend: &dyn VoiceSynthesizer,
    text: &str,
    voice_id: &str,
    speed: f32,
    timeout: Duration,
) -> std::result::Result<(Vec<f32>, u32), Error> {
    // `backend` is `&dyn VoiceSynthesizer` borrowed for the duration of this
    // call; we can't move it across a spawned thread without `'static` or
    // scoped threads, so we call it directly and only time-box via the
    // retry loop's own bookkeeping when the backend is thread_safe.
    //
    // When the backend isn't safe to call from multiple threads we still
    // want deadline enforcement, so we use `std::thread::scope` to borrow
    // it for exactly one call.
    let (tx, rx) = mpsc::channel();
    std::thread::scope(|scope| {
        scope.spawn(|| {
            let result = backend.synthesize(text, voice_id, speed);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(ok)) => Ok(ok),
            Ok(Err(err)) => Err(classify_backend_error(&err)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::TransientBackendError(
                "synthesis deadline exceeded".to_string(),
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::FatalBackendError(
                "synthesis thread disconnected without a result".to_string(),
            )),
        }
    })
}

fn classify_backend_error(err: &anyhow::Error) -> Error {
    let message = format!("{err:#}");
    if message.contains("transient") || message.contains("timeout") || message.contains("throttle") {
        Error::TransientBackendError(message)
    } else {
        Error::FatalBackendError(message)
    }
}

/// Retry a fallible operation against the transient backoff schedule.
/// Fatal errors are not retried.
fn with_retries<T>(mut op: impl FnMut() -> std::result::Result<T, Error>) -> Result<T> {
    let mut attempt = 0usize;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(Error::TransientBackendError(message)) => {
                if attempt >= BACKOFF_SCHEDULE.len() {
                    return Err(Error::FatalBackendError(format!(
                        "exhausted retries: {message}"
                    )));
                }
                std::thread::sleep(BACKOFF_SCHEDULE[attempt]);
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

/// Thread-safety guard for the worker pool (spec.md §6): refuses to start
/// with `parallel_workers > 1` unless the backend documents itself as
/// thread-safe.
pub fn assert_pool_size_supported(backend: &Arc<dyn VoiceSynthesizer>, parallel_workers: usize) -> Result<()> {
    if parallel_workers > 1 && !backend.thread_safe() {
        return Err(Error::InputError(
            "backend is not thread-safe; parallel_workers must be 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::test_support::{FailingVoice, FakeVoice};

    #[test]
    fn single_span_no_padding() {
        let backend = FakeVoice::new(22_050);
        let spans = vec![Span {
            text: "hello".to_string(),
            voice_id: "narrator".to_string(),
        }];
        let audio = synthesize_chunk(&backend, 0, &spans, 1.0, 22_050, Duration::from_secs(1)).unwrap();
        assert!(!audio.samples.is_empty());
    }

    #[test]
    fn voice_change_inserts_30ms_pad() {
        let backend = FakeVoice::new(24_000);
        let spans = vec![
            Span {
                text: "narration".to_string(),
                voice_id: "narrator".to_string(),
            },
            Span {
                text: "dialogue".to_string(),
                voice_id: "speaker".to_string(),
            },
        ];
        let audio = synthesize_chunk(&backend, 0, &spans, 1.0, 24_000, Duration::from_secs(1)).unwrap();
        let expected_pad = (24_000u64 * 30 / 1000) as usize;
        assert!(audio.samples.len() >= expected_pad);
    }

    #[test]
    fn resamples_when_backend_rate_differs() {
        let backend = FakeVoice::new(22_050);
        let spans = vec![Span {
            text: "hello world this is a test".to_string(),
            voice_id: "narrator".to_string(),
        }];
        let audio = synthesize_chunk(&backend, 0, &spans, 1.0, 48_000, Duration::from_secs(1)).unwrap();
        assert!(!audio.samples.is_empty());
    }

    #[test]
    fn fatal_backend_error_is_not_retried() {
        let backend = FailingVoice { transient: false };
        let spans = vec![Span {
            text: "x".to_string(),
            voice_id: "narrator".to_string(),
        }];
        let err = synthesize_chunk(&backend, 0, &spans, 1.0, 24_000, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::FatalBackendError(_)));
    }

    #[test]
    fn transient_backend_error_exhausts_retries_into_fatal() {
        let backend = FailingVoice { transient: true };
        let spans = vec![Span {
            text: "x".to_string(),
            voice_id: "narrator".to_string(),
        }];
        let err = synthesize_chunk(&backend, 0, &spans, 1.0, 24_000, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::FatalBackendError(_)));
    }
}

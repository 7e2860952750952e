//! Resamples synthesized speech to the configured output rate.
//!
//! Adapted from the decode pipeline's streaming resampler setup: same
//! `SincFixedIn` parameters (sinc_len 256, Blackman-Harris-2 window,
//! oversampling 256), collapsed to a single whole-buffer call since a
//! synthesized span arrives as one complete `Vec<f32>` rather than a
//! stream of decoded frames.

use anyhow::{Context, Result, anyhow, bail};
use rubato::{Resampler, SincFixedIn, WindowFunction};

/// Resample mono `f32` samples from `src_rate` to `dst_rate`.
///
/// Spec.md §4.4 permits linear interpolation or a higher-quality
/// resampler; we use the higher-quality `rubato` sinc resampler already
/// pulled in for this purpose.
pub fn resample_mono(samples: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>> {
    if src_rate == dst_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let in_chunk_frames = 2048.min(samples.len().max(1));
    let mut resampler = SincFixedIn::<f32>::new(
        dst_rate as f64 / src_rate as f64,
        2.0,
        rubato::SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: rubato::SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        },
        in_chunk_frames,
        1,
    )
    .map_err(|e| anyhow!(e))
    .context("failed to init resampler")?;

    let in_max = resampler.input_frames_max();
    let mut padded = samples.to_vec();
    let rem = padded.len() % in_max;
    if rem != 0 {
        padded.resize(padded.len() + (in_max - rem), 0.0);
    }

    let mut output = Vec::with_capacity((padded.len() as f64 * dst_rate as f64 / src_rate as f64) as usize);
    for block in padded.chunks(in_max) {
        let input = vec![block.to_vec()];
        let out = resampler
            .process(&input, None)
            .map_err(|e| anyhow!(e))
            .context("resampler process failed")?;
        if out.len() != 1 {
            bail!("expected mono output from resampler");
        }
        output.extend_from_slice(&out[0]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_rates_match() {
        let samples = vec![0.1, 0.2, -0.3];
        let out = resample_mono(&samples, 22_050, 22_050).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn upsampling_produces_more_samples() {
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample_mono(&samples, 22_050, 48_000).unwrap();
        assert!(out.len() > samples.len());
    }

    #[test]
    fn empty_input_stays_empty() {
        let out = resample_mono(&[], 22_050, 48_000).unwrap();
        assert!(out.is_empty());
    }
}

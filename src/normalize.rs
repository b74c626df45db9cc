//! Audio normalization: mono, canonical rate, bounded duration.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::config::{MAX_SAMPLES, TARGET_SR};
use crate::decode::Waveform;
use crate::error::NormalizeError;

// Frames fed to the resampler per call.
const CHUNK_SIZE: usize = 1024;

const SINC_LEN: usize = 256;

/// Mono, resample to `TARGET_SR`, then keep at most the first `MAX_SAMPLES` samples.
pub fn normalize(waveform: Waveform) -> Result<Vec<f32>, NormalizeError> {
    normalize_to(waveform, TARGET_SR, MAX_SAMPLES)
}

pub fn normalize_to(waveform: Waveform, target_sr: u32, max_samples: usize) -> Result<Vec<f32>, NormalizeError> {
    let source_sr = waveform.sample_rate;
    let mut mono = waveform.into_mono();
    if mono.is_empty() {
        return Err(NormalizeError::EmptyWaveform);
    }
    if let Some(limit) = input_limit(max_samples, source_sr, target_sr) {
        mono.truncate(limit);
    }
    let mut resampled = resample(mono, source_sr, target_sr)?;
    resampled.truncate(max_samples);
    Ok(resampled)
}

/// Input samples needed to produce `max_samples` output samples, with enough trailing context
/// that the kept output is unaffected by the cut.
fn input_limit(max_samples: usize, source_sr: u32, target_sr: u32) -> Option<usize> {
    if source_sr == 0 || target_sr == 0 {
        return None;
    }
    let needed = (max_samples as u64 * source_sr as u64).div_ceil(target_sr as u64) as usize;
    let per_output = (source_sr as usize).div_ceil(target_sr as usize);
    Some(needed + 2 * SINC_LEN * per_output + CHUNK_SIZE)
}

/// Bandlimited sinc resampling of a mono signal.
///
/// The output holds exactly `ceil(len * target_sr / source_sr)` samples, aligned with the
/// input (the filter delay is removed). Equal rates return the input untouched.
pub fn resample(mono: Vec<f32>, source_sr: u32, target_sr: u32) -> Result<Vec<f32>, NormalizeError> {
    if source_sr == 0 {
        return Err(NormalizeError::InvalidRate(source_sr));
    }
    if target_sr == 0 {
        return Err(NormalizeError::InvalidRate(target_sr));
    }
    if source_sr == target_sr || mono.is_empty() {
        return Ok(mono);
    }

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_sr as f64 / source_sr as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, CHUNK_SIZE, 1)?;

    let expected = (mono.len() as u64 * target_sr as u64).div_ceil(source_sr as u64) as usize;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected + delay + CHUNK_SIZE);
    let mut block = vec![0.0f32; CHUNK_SIZE];
    let mut pos = 0;
    // Keep feeding (zeros past the end) until the delayed tail has been flushed out.
    while output.len() < expected + delay {
        block.fill(0.0);
        if pos < mono.len() {
            let end = (pos + CHUNK_SIZE).min(mono.len());
            block[..end - pos].copy_from_slice(&mono[pos..end]);
        }
        let resampled = resampler.process(std::slice::from_ref(&block), None)?;
        output.extend_from_slice(&resampled[0]);
        pos += CHUNK_SIZE;
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

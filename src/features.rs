//! Feature extraction adapter.
//!
//! The model's self-supervised front end wants its own input tensors, and how it pads or
//! normalizes is its business. The collator only hands it unpadded, mono, 16 kHz waveforms,
//! once for the clean stream and once for the degraded stream.

use std::sync::Arc;

use anyhow::{bail, ensure};
use ndarray::{Array2, s};

use crate::config::TARGET_SR;
use crate::error::{CollateError, ConfigurationError};

/// A transform from a list of waveforms to model-ready input.
pub trait FeatureExtractor: Send + Sync {
    type Output: Send + 'static;

    /// The rate the extractor was built for.
    fn sampling_rate(&self) -> u32;

    fn extract(&self, waveforms: &[Vec<f32>], sampling_rate: u32, padding: bool) -> anyhow::Result<Self::Output>;
}

/// Calls an injected extractor the way the collator needs it: canonical rate, padding on.
pub struct SslAdapter<E> {
    extractor: Arc<E>,
}

impl<E: FeatureExtractor> SslAdapter<E> {
    pub fn new(extractor: Arc<E>) -> Result<Self, ConfigurationError> {
        let found = extractor.sampling_rate();
        if found != TARGET_SR {
            return Err(ConfigurationError::SampleRateMismatch {
                expected: TARGET_SR,
                found,
            });
        }
        Ok(Self { extractor })
    }

    /// `stream` only labels errors ("clean" or "degraded").
    pub fn extract(&self, stream: &'static str, waveforms: &[Vec<f32>]) -> Result<E::Output, CollateError> {
        self.extractor
            .extract(waveforms, TARGET_SR, true)
            .map_err(|source| CollateError::FeatureExtraction { stream, source })
    }
}

/// Padded raw-waveform input in the wav2vec2 style.
#[derive(Debug, Clone, PartialEq)]
pub struct SslInput {
    /// [batch_size, max_len]
    pub input_values: Array2<f32>,
    /// [batch_size, max_len], 1 for real samples, 0 for padding.
    pub attention_mask: Array2<i64>,
}

/// Pads waveforms to the batch maximum, optionally normalizing each one to zero mean and unit
/// variance over its true length first.
#[derive(Debug, Clone)]
pub struct WaveformFeatureExtractor {
    pub sampling_rate: u32,
    pub do_normalize: bool,
    pub padding_value: f32,
}

impl Default for WaveformFeatureExtractor {
    fn default() -> Self {
        Self {
            sampling_rate: TARGET_SR,
            do_normalize: true,
            padding_value: 0.0,
        }
    }
}

impl FeatureExtractor for WaveformFeatureExtractor {
    type Output = SslInput;

    fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    fn extract(&self, waveforms: &[Vec<f32>], sampling_rate: u32, padding: bool) -> anyhow::Result<SslInput> {
        ensure!(
            sampling_rate == self.sampling_rate,
            "extractor expects {} Hz audio, got {} Hz",
            self.sampling_rate,
            sampling_rate
        );
        ensure!(!waveforms.is_empty(), "no waveforms to extract features from");

        let max_len = waveforms.iter().map(Vec::len).max().unwrap_or(0);
        if !padding && waveforms.iter().any(|w| w.len() != max_len) {
            bail!("waveforms have different lengths and padding is disabled");
        }

        let mut input_values = Array2::from_elem((waveforms.len(), max_len), self.padding_value);
        let mut attention_mask = Array2::<i64>::zeros((waveforms.len(), max_len));

        for (i, wave) in waveforms.iter().enumerate() {
            let len = wave.len();
            let mut row = input_values.slice_mut(s![i, ..len]);
            if self.do_normalize {
                let (mean, std) = mean_std(wave);
                for (dst, &src) in row.iter_mut().zip(wave) {
                    *dst = (src - mean) / std;
                }
            } else {
                for (dst, &src) in row.iter_mut().zip(wave) {
                    *dst = src;
                }
            }
            attention_mask.slice_mut(s![i, ..len]).fill(1);
        }

        Ok(SslInput {
            input_values,
            attention_mask,
        })
    }
}

fn mean_std(wave: &[f32]) -> (f32, f32) {
    if wave.is_empty() {
        return (0.0, 1.0);
    }
    let n = wave.len() as f64;
    let mean = wave.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = wave.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, (var + 1e-7).sqrt() as f32)
}

//! Batch collation.
//!
//! A batch is built from an ordered list of samples in one synchronous pass: every waveform is
//! normalized, the degraded waveforms are zero-padded into one tensor with their true lengths
//! recorded, and both streams go through the feature extractor unpadded. Phoneme ids are
//! attached only when every sample in the batch has them.

use std::sync::Arc;

use ndarray::{Array1, Array2, s};

use crate::config::{CLEAN_SPEECH_FIELD, DEGRADED_SPEECH_FIELD, PHONEME_IDS_FIELD};
use crate::decode::{DecodedSample, decode_record};
use crate::error::{CollateError, ConfigurationError};
use crate::features::{FeatureExtractor, SslAdapter};
use crate::normalize::normalize;
use crate::shard::Record;

pub const DEGRADED_WAV_KEY: &str = "degraded_wav_16k";
pub const DEGRADED_LENGTHS_KEY: &str = "degraded_wav_16k_lengths";
pub const CLEAN_SSL_KEY: &str = "clean_ssl_input";
pub const DEGRADED_SSL_KEY: &str = "degraded_ssl_input";
pub const PHONEME_INPUT_IDS_KEY: &str = "phoneme_input_ids";

/// A batch ready for the training step. Row `i` of every tensor belongs to input sample `i`.
#[derive(Debug, Clone)]
pub struct Batch<F> {
    /// [batch_size, max_len], zero padded.
    pub degraded_wav_16k: Array2<f32>,
    /// [batch_size], unpadded lengths.
    pub degraded_wav_16k_lengths: Array1<i64>,
    pub clean_ssl_input: F,
    pub degraded_ssl_input: F,
    /// [batch_size, max_tokens], zero padded. Absent unless every sample had phoneme ids.
    pub phoneme_input_ids: Option<Array2<i64>>,
    /// Record keys in row order.
    pub keys: Vec<String>,
}

impl<F> Batch<F> {
    pub fn batch_size(&self) -> usize {
        self.degraded_wav_16k.nrows()
    }

    pub fn max_len(&self) -> usize {
        self.degraded_wav_16k.ncols()
    }

    /// Names of the fields present in this batch.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = vec![
            DEGRADED_WAV_KEY,
            DEGRADED_LENGTHS_KEY,
            CLEAN_SSL_KEY,
            DEGRADED_SSL_KEY,
        ];
        if self.phoneme_input_ids.is_some() {
            fields.push(PHONEME_INPUT_IDS_KEY);
        }
        fields
    }
}

/// Builds batches. Stateless apart from the injected extractor, so one collator can be shared
/// by any number of threads.
pub struct Collator<E> {
    adapter: SslAdapter<E>,
}

impl<E: FeatureExtractor> Collator<E> {
    pub fn new(extractor: Arc<E>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            adapter: SslAdapter::new(extractor)?,
        })
    }

    /// Decode and collate raw records. The first record that fails to decode aborts the batch.
    pub fn collate_records(&self, records: Vec<Record>) -> Result<Batch<E::Output>, CollateError> {
        let samples = records
            .into_iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, _>>()?;
        self.collate(samples)
    }

    pub fn collate(&self, samples: Vec<DecodedSample>) -> Result<Batch<E::Output>, CollateError> {
        if samples.is_empty() {
            return Err(CollateError::EmptyBatch);
        }

        let batch_size = samples.len();
        let mut clean_wavs = Vec::with_capacity(batch_size);
        let mut degraded_wavs = Vec::with_capacity(batch_size);
        let mut phonemes = Vec::with_capacity(batch_size);
        let mut keys = Vec::with_capacity(batch_size);

        for sample in samples {
            let DecodedSample {
                key,
                clean,
                degraded,
                phoneme_ids,
            } = sample;
            let failed = |field: &'static str| {
                let key = key.clone();
                move |source| CollateError::Normalize { key, field, source }
            };
            clean_wavs.push(normalize(clean).map_err(failed(CLEAN_SPEECH_FIELD))?);
            degraded_wavs.push(normalize(degraded).map_err(failed(DEGRADED_SPEECH_FIELD))?);
            phonemes.push(phoneme_ids);
            keys.push(key);
        }

        let (degraded_wav_16k, degraded_wav_16k_lengths) = pad_waveforms(&degraded_wavs);
        let clean_ssl_input = self.adapter.extract("clean", &clean_wavs)?;
        let degraded_ssl_input = self.adapter.extract("degraded", &degraded_wavs)?;
        let phoneme_input_ids = collate_phonemes(phonemes, &keys);

        tracing::debug!(
            "Collated {} samples, max length {}, phonemes {}",
            batch_size,
            degraded_wav_16k.ncols(),
            if phoneme_input_ids.is_some() { "attached" } else { "omitted" }
        );

        Ok(Batch {
            degraded_wav_16k,
            degraded_wav_16k_lengths,
            clean_ssl_input,
            degraded_ssl_input,
            phoneme_input_ids,
            keys,
        })
    }
}

/// All or nothing: a single sample without ids drops the field for the whole batch.
fn collate_phonemes(phonemes: Vec<Option<Vec<i64>>>, keys: &[String]) -> Option<Array2<i64>> {
    let total = phonemes.len();
    let missing: Vec<&str> = phonemes
        .iter()
        .zip(keys)
        .filter(|(ids, _)| ids.is_none())
        .map(|(_, key)| key.as_str())
        .collect();

    if missing.len() == total {
        tracing::debug!("No sample carries '{}', omitting it from the batch", PHONEME_IDS_FIELD);
        return None;
    }
    if !missing.is_empty() {
        tracing::warn!(
            "'{}' missing for {} of {} samples ({}), omitting it from the batch",
            PHONEME_IDS_FIELD,
            missing.len(),
            total,
            missing.join(", ")
        );
        return None;
    }

    let sequences: Vec<Vec<i64>> = phonemes.into_iter().flatten().collect();
    Some(pad_token_ids(&sequences))
}

/// Zero-pad waveforms to the longest one. Returns the padded tensor and the true lengths.
pub fn pad_waveforms(waveforms: &[Vec<f32>]) -> (Array2<f32>, Array1<i64>) {
    let lengths: Array1<i64> = waveforms.iter().map(|w| w.len() as i64).collect();
    let max_len = waveforms.iter().map(Vec::len).max().unwrap_or(0);

    let mut padded = Array2::<f32>::zeros((waveforms.len(), max_len));
    for (i, wave) in waveforms.iter().enumerate() {
        padded
            .slice_mut(s![i, ..wave.len()])
            .assign(&ndarray::ArrayView1::from(wave.as_slice()));
    }
    (padded, lengths)
}

/// Zero-pad token sequences to the longest one.
pub fn pad_token_ids(sequences: &[Vec<i64>]) -> Array2<i64> {
    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut padded = Array2::<i64>::zeros((sequences.len(), max_len));
    for (i, ids) in sequences.iter().enumerate() {
        padded
            .slice_mut(s![i, ..ids.len()])
            .assign(&ndarray::ArrayView1::from(ids.as_slice()));
    }
    padded
}

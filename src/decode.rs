//! Sample decoding: raw record payloads into waveforms and token ids.
//!
//! Audio goes through symphonia, so any container/codec it knows works (WAV, FLAC, OGG, MP3).
//! Phoneme ids are stored as a packed little-endian `i64` array.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::{CLEAN_SPEECH_FIELD, DEGRADED_SPEECH_FIELD, PHONEME_IDS_FIELD};
use crate::error::{AudioError, DecodeError};
use crate::shard::Record;

/// Interleaved PCM as it came out of the container.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl Waveform {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Collapse to a single channel by averaging.
    pub fn into_mono(self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples;
        }
        self.samples
            .chunks_exact(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }
}

/// A record after decoding, before any resampling.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSample {
    pub key: String,
    pub clean: Waveform,
    pub degraded: Waveform,
    /// `None` when the record had no phoneme field or it was malformed.
    pub phoneme_ids: Option<Vec<i64>>,
}

/// Decode one record, consuming it.
///
/// Both audio fields are required. The phoneme field is best effort: a malformed payload is
/// logged and treated as absent.
pub fn decode_record(mut record: Record) -> Result<DecodedSample, DecodeError> {
    let clean = decode_field(&mut record, CLEAN_SPEECH_FIELD)?;
    let degraded = decode_field(&mut record, DEGRADED_SPEECH_FIELD)?;

    let phoneme_ids = record.take(PHONEME_IDS_FIELD).and_then(|bytes| {
        let ids = decode_phoneme_ids(&bytes);
        if ids.is_none() {
            tracing::warn!(
                "Record {}: ignoring malformed '{}' ({} bytes)",
                record.key(),
                PHONEME_IDS_FIELD,
                bytes.len()
            );
        }
        ids
    });

    Ok(DecodedSample {
        key: record.key().to_string(),
        clean,
        degraded,
        phoneme_ids,
    })
}

fn decode_field(record: &mut Record, field: &'static str) -> Result<Waveform, DecodeError> {
    let bytes = record.take(field).ok_or_else(|| DecodeError::MissingField {
        key: record.key().to_string(),
        field,
    })?;
    let extension = field.rsplit_once('.').map(|(_, ext)| ext);
    decode_audio(bytes, extension).map_err(|source| DecodeError::InvalidAudio {
        key: record.key().to_string(),
        field,
        source,
    })
}

/// Decode audio from an in-memory container.
pub fn decode_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<Waveform, AudioError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoAudioTrack)?;
    let sample_rate = track.codec_params.sample_rate.ok_or(AudioError::MissingSampleRate)?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        channels = decoded.spec().channels.count();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(AudioError::NoFrames);
    }

    Ok(Waveform {
        samples,
        sample_rate,
        channels,
    })
}

// `torch.save` output: a zip archive, or a bare pickle stream in the legacy format.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PICKLE_PROTO: u8 = 0x80;
const PICKLE_STOP: u8 = b'.';

fn is_torch_serialized(bytes: &[u8]) -> bool {
    if bytes.starts_with(ZIP_MAGIC) {
        return true;
    }
    matches!(bytes, [PICKLE_PROTO, 2..=5, .., PICKLE_STOP])
}

/// Unpack little-endian `i64` ids. Returns `None` for an empty or ragged payload, and for
/// torch-serialized tensors, which are not raw id arrays.
pub fn decode_phoneme_ids(bytes: &[u8]) -> Option<Vec<i64>> {
    if bytes.is_empty() || bytes.len() % 8 != 0 || is_torch_serialized(bytes) {
        return None;
    }
    Some(
        bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                i64::from_le_bytes(word)
            })
            .collect(),
    )
}

pub fn encode_phoneme_ids(ids: &[i64]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

/// Encodes interleaved f32 PCM into a full WAV file in an in-memory byte buffer.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut buffer = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut buffer, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sine, speech_record};

    #[test]
    fn test_wav_roundtrip() {
        let samples = sine(4410, 440.0, 44100);
        let bytes = encode_wav(&samples, 44100, 1).unwrap();

        let audio = decode_audio(bytes, Some("wav")).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples, samples);
    }

    #[test]
    fn test_stereo_is_interleaved() {
        let interleaved: Vec<f32> = (0..100).flat_map(|_| [0.25f32, -0.75]).collect();
        let bytes = encode_wav(&interleaved, 22050, 2).unwrap();

        let audio = decode_audio(bytes, None).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.frames(), 100);
        assert!(audio.into_mono().iter().all(|&s| (s + 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_audio(b"definitely not audio".to_vec(), Some("wav")).is_err());
    }

    #[test]
    fn test_decode_record() {
        let record = speech_record("utt-1", &[0.1; 160], &[0.2; 320], 16000, Some(&[5, 6, 7]));
        let sample = decode_record(record).unwrap();

        assert_eq!(sample.key, "utt-1");
        assert_eq!(sample.clean.samples.len(), 160);
        assert_eq!(sample.degraded.samples.len(), 320);
        assert_eq!(sample.degraded.sample_rate, 16000);
        assert_eq!(sample.phoneme_ids, Some(vec![5, 6, 7]));
    }

    #[test]
    fn test_missing_required_field_names_it() {
        let mut record = speech_record("utt-2", &[0.1; 16], &[0.2; 16], 16000, None);
        record.take(DEGRADED_SPEECH_FIELD);

        let err = decode_record(record).unwrap_err();
        assert_eq!(err.field(), DEGRADED_SPEECH_FIELD);
        assert_eq!(err.key(), "utt-2");
        assert!(matches!(err, DecodeError::MissingField { .. }));
    }

    #[test]
    fn test_undecodable_required_field() {
        let record = speech_record("utt-3", &[0.1; 16], &[0.2; 16], 16000, None)
            .with_field(CLEAN_SPEECH_FIELD, vec![0, 1, 2, 3]);

        let err = decode_record(record).unwrap_err();
        assert_eq!(err.field(), CLEAN_SPEECH_FIELD);
        assert!(matches!(err, DecodeError::InvalidAudio { .. }));
    }

    #[test]
    fn test_malformed_phonemes_are_dropped() {
        let record = speech_record("utt-4", &[0.1; 16], &[0.2; 16], 16000, None)
            .with_field(PHONEME_IDS_FIELD, vec![1, 2, 3]);
        assert_eq!(decode_record(record).unwrap().phoneme_ids, None);

        let record = speech_record("utt-5", &[0.1; 16], &[0.2; 16], 16000, None)
            .with_field(PHONEME_IDS_FIELD, Vec::new());
        assert_eq!(decode_record(record).unwrap().phoneme_ids, None);
    }

    #[test]
    fn test_phoneme_ids_roundtrip() {
        let ids = [0, 1, -1, i64::MAX];
        assert_eq!(decode_phoneme_ids(&encode_phoneme_ids(&ids)), Some(ids.to_vec()));
        assert_eq!(decode_phoneme_ids(&[0u8; 12]), None);
    }

    #[test]
    fn test_torch_serialized_phonemes_are_malformed() {
        let mut zipped = b"PK\x03\x04".to_vec();
        zipped.resize(16, 0x11);
        assert_eq!(decode_phoneme_ids(&zipped), None);

        let mut pickled = vec![0x80, 0x02];
        pickled.resize(23, 0x00);
        pickled.push(b'.');
        assert_eq!(decode_phoneme_ids(&pickled), None);

        let record = speech_record("utt-6", &[0.1; 16], &[0.2; 16], 16000, None)
            .with_field(PHONEME_IDS_FIELD, zipped);
        assert_eq!(decode_record(record).unwrap().phoneme_ids, None);

        // Raw ids that merely start with 0x80 are still ids.
        let ids = [0x80, 7];
        assert_eq!(decode_phoneme_ids(&encode_phoneme_ids(&ids)), Some(ids.to_vec()));
    }
}

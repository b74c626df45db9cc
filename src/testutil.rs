//! Fixtures shared by the unit tests.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BinaryArray, RecordBatch, StringArray};
use parquet::arrow::ArrowWriter;

use crate::config::{CLEAN_SPEECH_FIELD, DEGRADED_SPEECH_FIELD, KEY_COLUMN, PHONEME_IDS_FIELD};
use crate::decode::{encode_phoneme_ids, encode_wav};
use crate::shard::Record;

/// Write records as one Parquet shard. Fields missing from a record become null cells.
pub fn write_shard(path: &Path, records: &[Record]) {
    let names: BTreeSet<String> = records
        .iter()
        .flat_map(|r| r.field_names().map(str::to_string))
        .collect();

    let keys = StringArray::from(records.iter().map(Record::key).collect::<Vec<_>>());
    let mut columns: Vec<(String, ArrayRef)> = vec![(KEY_COLUMN.to_string(), Arc::new(keys) as ArrayRef)];
    for name in names {
        let cells: Vec<Option<&[u8]>> = records.iter().map(|r| r.get(&name)).collect();
        columns.push((name, Arc::new(BinaryArray::from_opt_vec(cells)) as ArrayRef));
    }

    let batch = RecordBatch::try_from_iter(columns).unwrap();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// A waveform whose every sample equals `tag`, so rows can be told apart after batching.
pub fn tagged(len: usize, tag: f32) -> Vec<f32> {
    vec![tag; len]
}

pub fn sine(len: usize, freq: f32, sample_rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// A complete record with mono WAV payloads and optional phoneme ids.
pub fn speech_record(key: &str, clean: &[f32], degraded: &[f32], sample_rate: u32, phonemes: Option<&[i64]>) -> Record {
    let mut record = Record::new(key)
        .with_field(CLEAN_SPEECH_FIELD, encode_wav(clean, sample_rate, 1).unwrap())
        .with_field(DEGRADED_SPEECH_FIELD, encode_wav(degraded, sample_rate, 1).unwrap());
    if let Some(ids) = phonemes {
        record.insert(PHONEME_IDS_FIELD, encode_phoneme_ids(ids));
    }
    record
}

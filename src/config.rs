//! Configuration for how training batches are assembled from the restoration corpus.
//!
//! The corpus is a set of Parquet shards where every row pairs a clean recording with a
//! degraded copy of the same utterance, plus an optional phoneme id sequence. Batches are
//! assembled in two streams: a training stream that draws shards with replacement and
//! shuffles through a bounded window, and a validation stream that walks its shards in order.
//!
//! Everything that is fixed by the model (canonical rate, maximum clip length, field names)
//! lives here as constants. Everything that changes per run (paths, batch sizes, worker
//! count) lives in `DataConfig`, whose defaults mirror the values the model was trained with.

use phf::phf_map;

use crate::error::ConfigurationError;
use crate::shard::NodeSplit;

/// Every waveform handed to the model is resampled to this rate.
pub const TARGET_SR: u32 = 16000;

/// Clips longer than this are cut, keeping the leading part.
pub const MAX_DURATION_SECS: usize = 20;
pub const MAX_SAMPLES: usize = TARGET_SR as usize * MAX_DURATION_SECS;

// Field names as they appear in the shard columns.
pub const CLEAN_SPEECH_FIELD: &str = "speech.wav";
pub const DEGRADED_SPEECH_FIELD: &str = "degraded_speech.wav";
pub const PHONEME_IDS_FIELD: &str = "phoneme_input_ids.pth";

// Optional string column carrying the record identifier.
pub const KEY_COLUMN: &str = "__key__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A record without it cannot be trained on.
    Required,
    /// Dropped from the whole batch when any sample lacks it.
    Optional,
}

/// The fields the pipeline knows how to decode. Columns with these names must hold
/// binary payloads; any other column in a shard is carried along untouched.
pub const RECORD_FIELDS: phf::Map<&'static str, FieldKind> = phf_map! {
    "speech.wav" => FieldKind::Required,
    "degraded_speech.wav" => FieldKind::Required,
    "phoneme_input_ids.pth" => FieldKind::Optional,
};

// Size of the reorder buffer for the training stream. Validation is not shuffled.
pub const TRAIN_SHUFFLE_WINDOW: usize = 1000;

// Both streams are replayed this many times per declared epoch.
pub const REPEAT_COUNT: usize = 2;

// The training stream is infinite, so an "epoch" is simply this many batches.
pub const TRAIN_BATCHES_PER_EPOCH: usize = 20_000;

// Validation declares `VAL_DECLARED_SAMPLES / val_batch_size` samples per epoch.
pub const VAL_DECLARED_SAMPLES: usize = 3000 * 4;

pub const DEFAULT_TRAIN_BATCH_SIZE: usize = 16;
pub const DEFAULT_VAL_BATCH_SIZE: usize = 4;
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// How a single sample stream over an already resolved shard list is read, shuffled and
/// replayed.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Draw shards with replacement, producing an endless stream.
    pub resampled: bool,
    /// Reorder buffer size; `0` or `1` disables shuffling.
    pub shuffle_window: usize,
    pub repeat_count: usize,
    /// Nominal number of samples reported to the consumer. Never enforced.
    pub declared_length: usize,
    pub seed: u64,
}

/// Everything the data module needs besides the feature extractor.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub train_dataset_path: String,
    pub val_dataset_path: String,
    pub train_batch_size: usize,
    pub val_batch_size: usize,
    pub shuffle_window: usize,
    pub worker_count: usize,
    pub seed: u64,
    pub node_split: NodeSplit,
}

impl DataConfig {
    pub fn new(train_dataset_path: impl Into<String>, val_dataset_path: impl Into<String>) -> Self {
        Self {
            train_dataset_path: train_dataset_path.into(),
            val_dataset_path: val_dataset_path.into(),
            train_batch_size: DEFAULT_TRAIN_BATCH_SIZE,
            val_batch_size: DEFAULT_VAL_BATCH_SIZE,
            shuffle_window: TRAIN_SHUFFLE_WINDOW,
            worker_count: DEFAULT_WORKER_COUNT,
            seed: 0,
            node_split: NodeSplit::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.train_batch_size == 0 {
            return Err(ConfigurationError::ZeroSetting("train_batch_size"));
        }
        if self.val_batch_size == 0 {
            return Err(ConfigurationError::ZeroSetting("val_batch_size"));
        }
        if self.train_dataset_path.trim().is_empty() {
            return Err(ConfigurationError::EmptyPath("train_dataset_path"));
        }
        if self.val_dataset_path.trim().is_empty() {
            return Err(ConfigurationError::EmptyPath("val_dataset_path"));
        }
        self.node_split.validate()
    }

    pub fn train_stream(&self) -> StreamConfig {
        StreamConfig {
            resampled: true,
            shuffle_window: self.shuffle_window,
            repeat_count: REPEAT_COUNT,
            declared_length: TRAIN_BATCHES_PER_EPOCH * self.train_batch_size,
            seed: self.seed,
        }
    }

    pub fn val_stream(&self) -> StreamConfig {
        StreamConfig {
            resampled: false,
            shuffle_window: 0,
            repeat_count: REPEAT_COUNT,
            declared_length: VAL_DECLARED_SAMPLES / self.val_batch_size,
            seed: self.seed,
        }
    }
}

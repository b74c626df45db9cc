//! Error types for the batching pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems found while setting up a stream. Surfaced before any batch is built.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid shard pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("No shards found for '{0}'")]
    NoShards(String),
    #[error("Shard {0} does not exist or is not a file")]
    MissingShard(PathBuf),
    #[error("Shard {path} is not readable: {source}")]
    UnreadableShard {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid node split: rank {rank} with world size {world_size}")]
    InvalidNodeSplit { rank: usize, world_size: usize },
    #[error("Invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Node {rank} of {world_size} received none of the {shards} shards")]
    EmptyNode {
        rank: usize,
        world_size: usize,
        shards: usize,
    },
    #[error("{0} must be > 0")]
    ZeroSetting(&'static str),
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),
    #[error("Feature extractor runs at {found} Hz but batches are resampled to {expected} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },
}

/// Failures while reading rows out of a shard.
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parquet error in {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },
    #[error("Arrow error in {path}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: arrow::error::ArrowError,
    },
    #[error("Column '{column}' in {path} does not hold binary data")]
    InvalidColumnType { path: PathBuf, column: String },
    #[error("None of the {shards} shards holds any rows")]
    NoRows { shards: usize },
}

/// Low-level audio decoding failures, without record context.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Missing sample rate")]
    MissingSampleRate,
    #[error("Decoded zero frames")]
    NoFrames,
}

/// A required field of a record could not be turned into audio.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Record {key} is missing required field '{field}'")]
    MissingField { key: String, field: &'static str },
    #[error("Record {key}: field '{field}' is not valid audio: {source}")]
    InvalidAudio {
        key: String,
        field: &'static str,
        #[source]
        source: AudioError,
    },
}

impl DecodeError {
    pub fn key(&self) -> &str {
        match self {
            DecodeError::MissingField { key, .. } | DecodeError::InvalidAudio { key, .. } => key,
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            DecodeError::MissingField { field, .. } | DecodeError::InvalidAudio { field, .. } => {
                field
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Cannot normalize an empty waveform")]
    EmptyWaveform,
    #[error("Invalid source sample rate {0}")]
    InvalidRate(u32),
    #[error("Resampler construction failed: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Reasons a whole batch could not be assembled.
#[derive(Error, Debug)]
pub enum CollateError {
    #[error("Cannot collate an empty batch")]
    EmptyBatch,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Record {key}: normalizing '{field}' failed: {source}")]
    Normalize {
        key: String,
        field: &'static str,
        #[source]
        source: NormalizeError,
    },
    #[error("Feature extraction failed for the {stream} stream: {source}")]
    FeatureExtraction {
        stream: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Per-batch failures reported by a loader. The loader keeps going after any of these.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Shard(#[from] ShardError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Collate(#[from] CollateError),
}

//! Streaming sample pipeline and batch collator for speech restoration training.
//!
//! Shards of paired clean/degraded recordings are read, shuffled through a bounded window,
//! decoded, normalized to 16 kHz mono and collated into padded batches for the model. See
//! `config.rs` for the fixed constants and the per-run settings.

pub mod collate;
pub mod config;
pub mod decode;
pub mod error;
pub mod features;
pub mod loader;
pub mod normalize;
pub mod shard;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use collate::{Batch, Collator};
pub use config::{DataConfig, StreamConfig};
pub use decode::{DecodedSample, Waveform};
pub use error::{ConfigurationError, LoaderError};
pub use features::{FeatureExtractor, SslAdapter, SslInput, WaveformFeatureExtractor};
pub use loader::{BatchLoader, DataModule};
pub use shard::{NodeSplit, Record};

//! Dry run of the batch pipeline: builds the data module over real shards and pulls a few
//! batches, logging what the model would receive.
//!
//! `RUST_LOG=debug` shows per-batch collation details.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use speech_batcher::config::DEFAULT_WORKER_COUNT;
use speech_batcher::{DataConfig, DataModule, NodeSplit, WaveformFeatureExtractor};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Split {
    Train,
    Val,
}

#[derive(Parser, Debug)]
#[command(name = "speech-batcher", about = "Pull a few batches from the restoration corpus")]
struct Args {
    /// Training shard pattern, e.g. "data/train-{000000..000127}.parquet".
    #[arg(long)]
    train: String,

    /// Validation shard pattern.
    #[arg(long)]
    val: String,

    #[arg(long, value_enum, default_value = "train")]
    split: Split,

    /// Number of batches to pull.
    #[arg(long, default_value_t = 10)]
    batches: usize,

    /// Overrides the split's default batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// `0` runs the pipeline in this thread.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let start_time = Instant::now();

    let mut config = DataConfig::new(args.train, args.val);
    config.worker_count = args.workers;
    config.seed = args.seed;
    config.node_split = NodeSplit::from_env().context("reading RANK / WORLD_SIZE")?;
    if let Some(batch_size) = args.batch_size {
        match args.split {
            Split::Train => config.train_batch_size = batch_size,
            Split::Val => config.val_batch_size = batch_size,
        }
    }

    let data = DataModule::setup(config, Arc::new(WaveformFeatureExtractor::default()))?;
    let loader = match args.split {
        Split::Train => data.train_loader(),
        Split::Val => data.val_loader(),
    };
    tracing::info!("Loader declares {} batches per epoch", loader.declared_len());

    let pb = ProgressBar::new(args.batches as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Pulling batches [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut pulled = 0;
    let mut failed = 0;
    for result in loader.take(args.batches) {
        match result {
            Ok(batch) => {
                pb.suspend(|| {
                    tracing::info!(
                        "Batch {}: {} samples, degraded {:?}, clean features {:?}, phonemes {}",
                        pulled,
                        batch.batch_size(),
                        batch.degraded_wav_16k.shape(),
                        batch.clean_ssl_input.input_values.shape(),
                        match &batch.phoneme_input_ids {
                            Some(ids) => format!("{:?}", ids.shape()),
                            None => "omitted".to_string(),
                        }
                    )
                });
            }
            Err(e) => {
                failed += 1;
                pb.suspend(|| tracing::error!("Batch {} failed: {:#}", pulled, anyhow::Error::from(e)));
            }
        }
        pulled += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    tracing::info!(
        "Pulled {} batches ({} failed) in {:?}",
        pulled,
        failed,
        start_time.elapsed()
    );
    Ok(())
}

//! Scans a node's shards and reports how many records are usable for training, how many carry
//! phoneme ids, and a sensible declared length for the validation split.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use speech_batcher::config::{FieldKind, PHONEME_IDS_FIELD, RECORD_FIELDS};
use speech_batcher::decode::decode_phoneme_ids;
use speech_batcher::shard::{NodeSplit, ShardReader, resolve_node_shards};

#[derive(Parser, Debug)]
#[command(name = "shard_stats", about = "Count usable records in a set of shards")]
struct Args {
    /// Shard pattern, brace ranges and globs allowed.
    pattern: String,

    #[arg(long, default_value_t = 0)]
    rank: usize,

    #[arg(long, default_value_t = 1)]
    world_size: usize,

    /// Batch size used to turn the record count into a batch count.
    #[arg(long, default_value_t = 4)]
    batch_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    shards: usize,
    unreadable: usize,
    records: usize,
    incomplete: usize,
    with_phonemes: usize,
}

impl Counts {
    fn merge(self, other: Self) -> Self {
        Self {
            shards: self.shards + other.shards,
            unreadable: self.unreadable + other.unreadable,
            records: self.records + other.records,
            incomplete: self.incomplete + other.incomplete,
            with_phonemes: self.with_phonemes + other.with_phonemes,
        }
    }
}

fn scan_shard(path: PathBuf) -> Counts {
    let mut counts = Counts {
        shards: 1,
        ..Default::default()
    };
    for item in ShardReader::sequential(Arc::from(vec![path])) {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("{}", e);
                counts.unreadable += 1;
                continue;
            }
        };
        counts.records += 1;

        let complete = RECORD_FIELDS
            .entries()
            .filter(|(_, kind)| **kind == FieldKind::Required)
            .all(|(name, _)| record.contains(name));
        if !complete {
            counts.incomplete += 1;
        }
        if record.get(PHONEME_IDS_FIELD).and_then(decode_phoneme_ids).is_some() {
            counts.with_phonemes += 1;
        }
    }
    counts
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let split = NodeSplit::new(args.rank, args.world_size)?;
    let shards = resolve_node_shards(&args.pattern, split)?;

    let pb = ProgressBar::new(shards.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Scanning shards [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let totals = shards
        .to_vec()
        .into_par_iter()
        .progress_with(pb)
        .map(scan_shard)
        .reduce(Counts::default, Counts::merge);

    let usable = totals.records - totals.incomplete;
    println!("Shards:             {}", totals.shards);
    println!("Read errors:        {}", totals.unreadable);
    println!("Records:            {}", totals.records);
    println!("Missing a required: {}", totals.incomplete);
    println!("With phoneme ids:   {}", totals.with_phonemes);
    println!(
        "Suggested declared length: {} samples, {} batches of {}",
        usable,
        usable.div_ceil(args.batch_size.max(1)),
        args.batch_size
    );

    Ok(())
}

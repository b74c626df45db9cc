//! Pull-based stream stages between the shard reader and the collator.
//!
//! Each stage is a plain `Iterator` adapter: it produces its next item by pulling from the
//! stage before it, and only the shuffle stage buffers anything.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::StreamConfig;
use crate::decode::{DecodedSample, decode_record};
use crate::error::LoaderError;
use crate::shard::{NodeSplit, ShardReader};

/// Approximate shuffling with a bounded reorder buffer.
///
/// Once the buffer holds `window` items, each emission picks a random buffered item and puts
/// the next upstream item in its place. When upstream ends the buffer drains in random order.
pub struct WindowedShuffle<I: Iterator> {
    inner: I,
    buffer: Vec<I::Item>,
    window: usize,
    rng: StdRng,
    exhausted: bool,
}

impl<I: Iterator> WindowedShuffle<I> {
    pub fn new(inner: I, window: usize, seed: u64) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(window),
            window,
            rng: StdRng::seed_from_u64(seed),
            exhausted: false,
        }
    }

    /// Items currently held back.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl<I: Iterator> Iterator for WindowedShuffle<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if self.window <= 1 {
            return self.inner.next();
        }

        while !self.exhausted && self.buffer.len() < self.window {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }

        let idx = self.rng.random_range(0..self.buffer.len());
        if !self.exhausted {
            match self.inner.next() {
                Some(item) => return Some(std::mem::replace(&mut self.buffer[idx], item)),
                None => self.exhausted = true,
            }
        }
        Some(self.buffer.swap_remove(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        let held = self.buffer.len();
        (lo.saturating_add(held), hi.and_then(|hi| hi.checked_add(held)))
    }
}

/// Replays a freshly built stream `passes` times, back to back.
///
/// The factory receives the pass index so each pass can be seeded differently.
pub struct Repeat<F, I> {
    make: F,
    passes: usize,
    pass: usize,
    current: Option<I>,
}

impl<F, I> Repeat<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator,
{
    pub fn new(passes: usize, make: F) -> Self {
        Self {
            make,
            passes,
            pass: 0,
            current: None,
        }
    }
}

impl<F, I> Iterator for Repeat<F, I>
where
    F: FnMut(usize) -> I,
    I: Iterator,
{
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stream) = &mut self.current {
                if let Some(item) = stream.next() {
                    return Some(item);
                }
                self.current = None;
                self.pass += 1;
                continue;
            }
            if self.pass >= self.passes {
                return None;
            }
            tracing::debug!("Starting pass {} of {}", self.pass + 1, self.passes);
            self.current = Some((self.make)(self.pass));
        }
    }
}

/// Attaches a nominal length to a stream.
///
/// The declared length is bookkeeping for epoch-based consumers only: the stream may end
/// earlier or run forever, and neither is an error.
pub struct WithLength<I> {
    inner: I,
    declared: usize,
}

impl<I> WithLength<I> {
    pub fn new(inner: I, declared: usize) -> Self {
        Self { inner, declared }
    }

    pub fn declared_len(&self) -> usize {
        self.declared
    }
}

impl<I: Iterator> Iterator for WithLength<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Chaining helpers in the order the pipeline uses them.
pub trait StreamExt: Iterator + Sized {
    fn shuffle_window(self, window: usize, seed: u64) -> WindowedShuffle<Self> {
        WindowedShuffle::new(self, window, seed)
    }

    fn with_length(self, declared: usize) -> WithLength<Self> {
        WithLength::new(self, declared)
    }
}

impl<I: Iterator> StreamExt for I {}

pub type SampleResult = Result<DecodedSample, LoaderError>;
pub type SampleStream = WithLength<Box<dyn Iterator<Item = SampleResult> + Send>>;

/// Which of a node's replicated workers a stream is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    pub id: usize,
    pub count: usize,
}

impl Default for WorkerSlot {
    fn default() -> Self {
        Self { id: 0, count: 1 }
    }
}

/// Build the decoded sample stream for one worker: read, shuffle, decode, repeat.
///
/// Resampled streams draw from every shard of the node with a per-worker seed. Finite streams
/// give each worker a disjoint subset of the node's shards; a worker left without shards
/// produces nothing.
pub fn sample_stream(shards: Arc<[PathBuf]>, config: &StreamConfig, worker: WorkerSlot) -> SampleStream {
    let shards: Arc<[PathBuf]> = if config.resampled || worker.count <= 1 {
        shards
    } else {
        NodeSplit {
            rank: worker.id,
            world_size: worker.count,
        }
        .select(&shards)
        .into()
    };

    let resampled = config.resampled;
    let window = config.shuffle_window;
    let seed = config.seed;
    let passes = Repeat::new(config.repeat_count, move |pass| {
        let pass_seed = mix_seed(seed, worker.id as u64, pass as u64);
        let reader = if resampled {
            ShardReader::resampled(Arc::clone(&shards), pass_seed)
        } else {
            ShardReader::sequential(Arc::clone(&shards))
        };
        reader
            .shuffle_window(window, pass_seed.rotate_left(17))
            .map(|item| -> SampleResult { Ok(decode_record(item?)?) })
    });

    let boxed: Box<dyn Iterator<Item = SampleResult> + Send> = Box::new(passes);
    boxed.with_length(config.declared_length)
}

fn mix_seed(seed: u64, worker: u64, pass: u64) -> u64 {
    splitmix64(seed ^ splitmix64(worker.wrapping_mul(0xD6E8FEB86659FD93) ^ pass))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

//! Training and validation batch loaders.
//!
//! Architecture (per node):
//! Shard Reader -> Shuffle Window -> Decoder -> Repeat -> Collator -> consumer
//!
//! - With `worker_count == 0` the whole chain runs in the consumer's thread on demand.
//! - Otherwise each worker thread runs its own chain over its share of the node's shards and
//!   sends finished batches over a bounded channel. Workers share nothing but the read-only
//!   shard list and the collator.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};

use crate::collate::{Batch, Collator};
use crate::config::{DataConfig, StreamConfig};
use crate::error::{ConfigurationError, LoaderError};
use crate::features::FeatureExtractor;
use crate::shard::resolve_node_shards;
use crate::stream::{SampleStream, WorkerSlot, sample_stream};

pub type BatchResult<F> = Result<Batch<F>, LoaderError>;

/// Owns the configuration, the injected extractor and the resolved shard lists, and hands out
/// loaders for both splits.
pub struct DataModule<E: FeatureExtractor> {
    config: DataConfig,
    collator: Arc<Collator<E>>,
    train_shards: Arc<[PathBuf]>,
    val_shards: Arc<[PathBuf]>,
}

impl<E: FeatureExtractor + 'static> DataModule<E> {
    /// Validate the configuration and resolve this node's shards for both splits.
    pub fn setup(config: DataConfig, extractor: Arc<E>) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let collator = Arc::new(Collator::new(extractor)?);
        let train_shards = resolve_node_shards(&config.train_dataset_path, config.node_split)?;
        let val_shards = resolve_node_shards(&config.val_dataset_path, config.node_split)?;
        Ok(Self {
            config,
            collator,
            train_shards,
            val_shards,
        })
    }

    pub fn train_loader(&self) -> BatchLoader<E> {
        tracing::info!("Initializing training loader with batch size {}", self.config.train_batch_size);
        BatchLoader::new(
            Arc::clone(&self.train_shards),
            self.config.train_stream(),
            self.config.train_batch_size,
            self.config.worker_count,
            Arc::clone(&self.collator),
        )
    }

    pub fn val_loader(&self) -> BatchLoader<E> {
        tracing::info!("Initializing validation loader with batch size {}", self.config.val_batch_size);
        BatchLoader::new(
            Arc::clone(&self.val_shards),
            self.config.val_stream(),
            self.config.val_batch_size,
            self.config.worker_count,
            Arc::clone(&self.collator),
        )
    }
}

/// Groups a sample stream into batches.
///
/// A short final batch is emitted as is. If any sample in a group failed upstream, the whole
/// group becomes one error item and batching continues with the next group.
pub struct Batcher<E: FeatureExtractor> {
    samples: SampleStream,
    collator: Arc<Collator<E>>,
    batch_size: usize,
}

impl<E: FeatureExtractor> Batcher<E> {
    pub fn new(samples: SampleStream, collator: Arc<Collator<E>>, batch_size: usize) -> Self {
        Self {
            samples,
            collator,
            batch_size: batch_size.max(1),
        }
    }
}

impl<E: FeatureExtractor> Iterator for Batcher<E> {
    type Item = BatchResult<E::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let pulled: Vec<_> = self.samples.by_ref().take(self.batch_size).collect();
        if pulled.is_empty() {
            return None;
        }
        let batch = pulled
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .and_then(|samples| self.collator.collate(samples).map_err(LoaderError::from));
        if let Err(e) = &batch {
            tracing::warn!("Dropping batch: {}", e);
        }
        Some(batch)
    }
}

enum Source<E: FeatureExtractor> {
    Inline(Batcher<E>),
    Workers(WorkerPool<E::Output>),
}

/// Pull endpoint for one split. Iterating yields batches (or per-batch errors) until the
/// underlying stream ends, which for the training split is never.
pub struct BatchLoader<E: FeatureExtractor> {
    source: Source<E>,
    declared_batches: usize,
}

impl<E: FeatureExtractor + 'static> BatchLoader<E> {
    pub fn new(
        shards: Arc<[PathBuf]>,
        stream: StreamConfig,
        batch_size: usize,
        worker_count: usize,
        collator: Arc<Collator<E>>,
    ) -> Self {
        let batch_size = batch_size.max(1);
        let declared_batches = stream.declared_length.div_ceil(batch_size);

        let source = if worker_count == 0 {
            let samples = sample_stream(shards, &stream, WorkerSlot::default());
            Source::Inline(Batcher::new(samples, collator, batch_size))
        } else {
            Source::Workers(WorkerPool::start(shards, stream, batch_size, worker_count, collator))
        };

        Self {
            source,
            declared_batches,
        }
    }
}

impl<E: FeatureExtractor> BatchLoader<E> {
    /// Nominal number of batches per epoch.
    pub fn declared_len(&self) -> usize {
        self.declared_batches
    }
}

impl<E: FeatureExtractor> Iterator for BatchLoader<E> {
    type Item = BatchResult<E::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Inline(batcher) => batcher.next(),
            Source::Workers(pool) => pool.next(),
        }
    }
}

struct WorkerPool<F> {
    batches: Receiver<BatchResult<F>>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl<F: Send + 'static> WorkerPool<F> {
    fn start<E>(
        shards: Arc<[PathBuf]>,
        stream: StreamConfig,
        batch_size: usize,
        worker_count: usize,
        collator: Arc<Collator<E>>,
    ) -> Self
    where
        E: FeatureExtractor<Output = F> + 'static,
    {
        let (tx, rx) = bounded(2 * worker_count);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handles = (0..worker_count)
            .map(|id| {
                let slot = WorkerSlot {
                    id,
                    count: worker_count,
                };
                let samples = sample_stream(Arc::clone(&shards), &stream, slot);
                let batcher = Batcher::new(samples, Arc::clone(&collator), batch_size);
                let tx = tx.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || worker_main(id, batcher, tx, shutdown))
            })
            .collect();

        // Workers hold the only senders, so the channel closes once all of them are done.
        drop(tx);

        Self {
            batches: rx,
            shutdown,
            handles,
        }
    }
}

impl<F> Iterator for WorkerPool<F> {
    type Item = BatchResult<F>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.recv().ok()
    }
}

impl<F> Drop for WorkerPool<F> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Loader worker panicked");
            }
        }
    }
}

fn worker_main<E: FeatureExtractor>(
    id: usize,
    batcher: Batcher<E>,
    tx: Sender<BatchResult<E::Output>>,
    shutdown: Arc<AtomicBool>,
) {
    tracing::debug!("Worker {} started", id);
    for batch in batcher {
        if shutdown.load(Ordering::Relaxed) || !send_batch(&tx, &shutdown, batch) {
            break;
        }
    }
    tracing::debug!("Worker {} finished", id);
}

/// Send with retry on timeout, checking shutdown between attempts.
fn send_batch<T>(tx: &Sender<T>, shutdown: &AtomicBool, mut item: T) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(item, Duration::from_millis(100)) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => item = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

use std::thread::{self, JoinHandle};
use crossbeam::channel::{bounded, Receiver};
use crate::dataset::batch::{SampleBatch, SampleIteratorExt};
use crate::dataset::stream::PositionDataset;
use crate::dataset::DatasetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    pub batch_size: usize,
    /// Worker threads, each replaying its own partition of the games. 0 loads inline.
    pub num_workers: usize,
    /// Size of each worker's shuffle buffer. 0 or 1 keeps file order.
    pub shuffle_buffer: usize,
    pub seed: u64,
    /// Batches buffered per worker before the worker blocks.
    pub prefetch: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            batch_size: 256,
            num_workers: 4,
            shuffle_buffer: 0,
            seed: 0,
            prefetch: 4,
        }
    }
}

/// Feeds batches of samples to the training loop, one pass over the dataset per epoch.
pub struct BatchLoader {
    dataset: PositionDataset,
    options: LoaderOptions,
}

impl BatchLoader {
    pub fn new(dataset: PositionDataset, options: LoaderOptions) -> BatchLoader {
        assert!(options.batch_size > 0);
        BatchLoader { dataset, options }
    }

    pub fn dataset(&self) -> &PositionDataset {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Upper bound on the number of batches in one epoch.
    pub fn num_batches(&self) -> usize {
        let workers = self.options.num_workers.max(1);
        (0..workers)
            .filter_map(|id| self.dataset.worker_len(id, workers).ok())
            .map(|len| len.div_ceil(self.options.batch_size))
            .sum()
    }

    /// Starts one pass over the dataset. With workers, batches arrive in whatever order the
    /// workers produce them; dropping the returned iterator stops the workers.
    pub fn epoch(&self, epoch: u64) -> Result<EpochBatches, DatasetError> {
        let options = self.options;
        let seed = options.seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15);

        if options.num_workers == 0 {
            let samples = self.dataset.iter();
            let batches: Box<dyn Iterator<Item = SampleBatch> + Send> = if options.shuffle_buffer > 1 {
                Box::new(samples.shuffled(options.shuffle_buffer, seed).batches(options.batch_size))
            } else {
                Box::new(samples.batches(options.batch_size))
            };
            return Ok(EpochBatches::Inline(batches));
        }

        let (sender, receiver) = bounded(options.prefetch.max(1) * options.num_workers);
        let mut workers = Vec::with_capacity(options.num_workers);
        for worker_id in 0..options.num_workers {
            let samples = self.dataset.worker_iter(worker_id, options.num_workers)?;
            let sender = sender.clone();
            let worker_seed = seed.wrapping_add(worker_id as u64);

            workers.push(thread::spawn(move || {
                let batches: Box<dyn Iterator<Item = SampleBatch>> = if options.shuffle_buffer > 1 {
                    Box::new(samples.shuffled(options.shuffle_buffer, worker_seed).batches(options.batch_size))
                } else {
                    Box::new(samples.batches(options.batch_size))
                };
                for batch in batches {
                    if sender.send(batch).is_err() {
                        tracing::debug!("Worker {} stopped early", worker_id);
                        return;
                    }
                }
            }));
        }

        Ok(EpochBatches::Workers { receiver, workers })
    }
}

pub enum EpochBatches {
    Inline(Box<dyn Iterator<Item = SampleBatch> + Send>),
    Workers {
        receiver: Receiver<SampleBatch>,
        workers: Vec<JoinHandle<()>>,
    },
}

impl Iterator for EpochBatches {
    type Item = SampleBatch;

    fn next(&mut self) -> Option<SampleBatch> {
        match self {
            EpochBatches::Inline(batches) => batches.next(),
            EpochBatches::Workers { receiver, workers } => match receiver.recv() {
                Ok(batch) => Some(batch),
                Err(_) => {
                    // every sender is gone, so every worker has finished
                    for worker in workers.drain(..) {
                        if worker.join().is_err() {
                            tracing::error!("Data loader worker panicked");
                        }
                    }
                    None
                }
            },
        }
    }
}

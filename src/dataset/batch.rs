use tch::{Device, Kind, Tensor};
use crate::dataset::shuffle::Shuffled;
use crate::dataset::stream::TrainingSample;
use crate::encoding::constants::{BOARD_SIZE, NUM_ENCODED_VALUES, NUM_POSITION_PLANES};

/// Samples laid out as flat buffers, ready to become tensors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleBatch {
    /// `len() * 896` values, one encoded position after another.
    pub positions: Vec<f32>,
    pub move_indices: Vec<i64>,
    pub outcomes: Vec<f32>,
}

impl SampleBatch {
    pub fn with_capacity(capacity: usize) -> SampleBatch {
        SampleBatch {
            positions: Vec::with_capacity(capacity * NUM_ENCODED_VALUES),
            move_indices: Vec::with_capacity(capacity),
            outcomes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: &TrainingSample) {
        sample.position.extend_into(&mut self.positions);
        self.move_indices.push(sample.move_index.into());
        self.outcomes.push(sample.outcome);
    }

    pub fn len(&self) -> usize {
        self.move_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.move_indices.is_empty()
    }

    /// Returns `(positions [n, 14, 8, 8], move indices [n] as int64, outcomes [n, 1])`.
    pub fn to_tensors(&self, device: Device) -> (Tensor, Tensor, Tensor) {
        let n = self.len() as i64;
        let positions = Tensor::from_slice(&self.positions)
            .view([n, NUM_POSITION_PLANES as i64, BOARD_SIZE as i64, BOARD_SIZE as i64])
            .to_device(device);
        let move_indices = Tensor::from_slice(&self.move_indices)
            .to_kind(Kind::Int64)
            .to_device(device);
        let outcomes = Tensor::from_slice(&self.outcomes)
            .view([n, 1])
            .to_device(device);
        (positions, move_indices, outcomes)
    }
}

impl FromIterator<TrainingSample> for SampleBatch {
    fn from_iter<T: IntoIterator<Item = TrainingSample>>(samples: T) -> SampleBatch {
        let mut batch = SampleBatch::default();
        for sample in samples {
            batch.push(&sample);
        }
        batch
    }
}

/// Groups samples into batches of `batch_size`. The last batch may be smaller.
pub struct Batches<I> {
    samples: I,
    batch_size: usize,
}

impl<I: Iterator<Item = TrainingSample>> Batches<I> {
    pub fn new(samples: I, batch_size: usize) -> Batches<I> {
        assert!(batch_size > 0);
        Batches { samples, batch_size }
    }

    pub fn into_inner(self) -> I {
        self.samples
    }
}

impl<I: Iterator<Item = TrainingSample>> Iterator for Batches<I> {
    type Item = SampleBatch;

    fn next(&mut self) -> Option<SampleBatch> {
        let mut batch = SampleBatch::with_capacity(self.batch_size);
        for sample in self.samples.by_ref().take(self.batch_size) {
            batch.push(&sample);
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

pub trait SampleIteratorExt: Iterator<Item = TrainingSample> + Sized {
    fn batches(self, batch_size: usize) -> Batches<Self> {
        Batches::new(self, batch_size)
    }

    fn shuffled(self, buffer_size: usize, seed: u64) -> Shuffled<Self> {
        Shuffled::new(self, buffer_size, seed)
    }
}

impl<I: Iterator<Item = TrainingSample>> SampleIteratorExt for I {}

#[cfg(test)]
mod tests {
    use shakmaty::{Chess, Square};
    use crate::encoding::{encode_position, MoveIndex};
    use super::*;

    fn sample(outcome: f32) -> TrainingSample {
        TrainingSample {
            position: encode_position(&Chess::default()),
            move_index: MoveIndex::from_squares(Square::E2, Square::E4),
            outcome,
        }
    }

    #[test]
    fn test_batches_keep_remainder() {
        let samples = (0..7).map(|i| sample(i as f32));
        let sizes: Vec<usize> = samples.batches(3).map(|batch| batch.len()).collect();
        assert_eq!(sizes, [3, 3, 1]);
    }

    #[test]
    fn test_batches_preserve_order() {
        let batches: Vec<SampleBatch> = (0..5).map(|i| sample(i as f32)).batches(2).collect();
        let outcomes: Vec<f32> = batches.iter().flat_map(|batch| batch.outcomes.clone()).collect();
        assert_eq!(outcomes, [0., 1., 2., 3., 4.]);
    }

    #[test]
    fn test_to_tensors() {
        let batch: SampleBatch = vec![sample(1.), sample(-1.)].into_iter().collect();
        assert_eq!(batch.positions.len(), 2 * NUM_ENCODED_VALUES);

        let (positions, move_indices, outcomes) = batch.to_tensors(Device::Cpu);
        assert_eq!(positions.size(), [2, 14, 8, 8]);
        assert_eq!(positions.kind(), Kind::Float);
        assert_eq!(move_indices.size(), [2]);
        assert_eq!(move_indices.kind(), Kind::Int64);
        assert_eq!(move_indices.int64_value(&[1]), 12 * 64 + 28);
        assert_eq!(outcomes.size(), [2, 1]);
        assert_eq!(outcomes.double_value(&[1, 0]), -1.);
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        assert_eq!(std::iter::empty::<TrainingSample>().batches(4).count(), 0);
    }
}

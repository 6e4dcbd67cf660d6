use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Approximate shuffle over a stream using a bounded buffer. Each item is emitted from a
/// uniformly random slot of a buffer of up to `buffer_size` pending items, so memory use
/// stays bounded regardless of the stream length. The order is fixed by the seed.
pub struct Shuffled<I: Iterator> {
    inner: I,
    buffer: Vec<I::Item>,
    buffer_size: usize,
    rng: StdRng,
}

impl<I: Iterator> Shuffled<I> {
    pub fn new(inner: I, buffer_size: usize, seed: u64) -> Shuffled<I> {
        let buffer_size = buffer_size.max(1);
        Shuffled {
            inner,
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn get_ref(&self) -> &I {
        &self.inner
    }
}

impl<I: Iterator> Iterator for Shuffled<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        while self.buffer.len() < self.buffer_size {
            match self.inner.next() {
                Some(item) => self.buffer.push(item),
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let slot = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shuffle_is_a_permutation() {
        let mut shuffled: Vec<u32> = Shuffled::new(0..1000u32, 64, 7).collect();
        assert_eq!(shuffled.len(), 1000);
        assert_ne!(shuffled, (0..1000).collect::<Vec<_>>());
        shuffled.sort();
        assert_eq!(shuffled, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_order() {
        let first: Vec<u32> = Shuffled::new(0..500u32, 32, 42).collect();
        let second: Vec<u32> = Shuffled::new(0..500u32, 32, 42).collect();
        let other: Vec<u32> = Shuffled::new(0..500u32, 32, 43).collect();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_buffer_of_one_keeps_order() {
        let items: Vec<u32> = Shuffled::new(0..10u32, 1, 3).collect();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }
}

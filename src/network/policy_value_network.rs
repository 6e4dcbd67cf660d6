use tch::Tensor;

pub trait PolicyValueNetwork {
    /// Maps a `[n, 14, 8, 8]` batch to `(value [n, 1], policy logits [n, 4096])`.
    fn forward_t(&self, x: &Tensor, train: bool) -> (Tensor, Tensor);
}

use tch::{nn, Tensor};
use crate::encoding::constants::{NUM_MOVE_INDICES, NUM_SQUARES};

const HIDDEN_UNITS: i64 = 1024;

/// Produces one raw logit per move index.
#[derive(Debug)]
pub struct PolicyHead {
    conv: nn::Conv2D,
    bn: nn::BatchNorm,
    fc1: nn::Linear,
    fc2: nn::Linear,
}

impl PolicyHead {
    pub fn new(vs: &nn::Path, num_filters: i64) -> Self {
        PolicyHead {
            conv: nn::conv2d(vs / "conv", num_filters, num_filters, 1, Default::default()),
            bn: nn::batch_norm2d(vs / "bn", num_filters, Default::default()),
            fc1: nn::linear(vs / "fc1", num_filters * NUM_SQUARES as i64, HIDDEN_UNITS, Default::default()),
            fc2: nn::linear(vs / "fc2", HIDDEN_UNITS, NUM_MOVE_INDICES as i64, Default::default()),
        }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        x.apply(&self.conv)
            .apply_t(&self.bn, train)
            .relu()
            .flatten(1, -1)
            .apply(&self.fc1)
            .relu()
            .apply(&self.fc2)
    }
}

use tch::{Kind, Tensor};
use crate::encoding::constants::{BOARD_SIZE, NUM_MOVE_INDICES, NUM_POSITION_PLANES, SIDE_TO_MOVE_PLANE};
use crate::network::policy_value_network::PolicyValueNetwork;

/// Test double that ignores the board and answers by side to move only.
pub struct FixedOutputNet {
    pub white_value: f64,
    pub black_value: f64,
    /// `[4096]` logits used whenever White is to move.
    pub white_logits: Tensor,
    pub black_logits: Tensor,
}

impl FixedOutputNet {
    pub fn uniform(value: f64) -> FixedOutputNet {
        FixedOutputNet::for_both_sides(value, Tensor::zeros([NUM_MOVE_INDICES as i64], (Kind::Float, tch::Device::Cpu)))
    }

    pub fn for_both_sides(value: f64, logits: Tensor) -> FixedOutputNet {
        FixedOutputNet {
            white_value: value,
            black_value: value,
            white_logits: logits.shallow_clone(),
            black_logits: logits,
        }
    }

    /// Logits of `low` everywhere except `high` at the given move indices.
    pub fn logits_favoring(indices: &[usize], low: f64, high: f64) -> Tensor {
        let logits = Tensor::full([NUM_MOVE_INDICES as i64], low, (Kind::Float, tch::Device::Cpu));
        for &index in indices {
            let _ = logits.get(index as i64).fill_(high);
        }
        logits
    }
}

impl PolicyValueNetwork for FixedOutputNet {
    fn forward_t(&self, input: &Tensor, _train: bool) -> (Tensor, Tensor) {
        let input = input.view([-1, NUM_POSITION_PLANES as i64, BOARD_SIZE as i64, BOARD_SIZE as i64]);
        let batch_size = input.size()[0];

        let mut values = Vec::with_capacity(batch_size as usize);
        let mut logits = Vec::with_capacity(batch_size as usize);
        for i in 0..batch_size {
            let white_to_move = input.double_value(&[i, SIDE_TO_MOVE_PLANE as i64, 0, 0]) == 1.;
            if white_to_move {
                values.push(self.white_value as f32);
                logits.push(self.white_logits.shallow_clone());
            } else {
                values.push(self.black_value as f32);
                logits.push(self.black_logits.shallow_clone());
            }
        }

        let values = Tensor::from_slice(&values).view([batch_size, 1]).to_device(input.device());
        let logits = Tensor::stack(&logits, 0).to_device(input.device());
        (values, logits)
    }
}

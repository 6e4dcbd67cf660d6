use std::path::Path;
use tch::{nn, Device, TchError, Tensor};
use crate::config::NetworkConfig;
use crate::encoding::constants::{BOARD_SIZE, NUM_POSITION_PLANES};
use crate::network::policy_head::PolicyHead;
use crate::network::policy_value_network::PolicyValueNetwork;
use crate::network::residual_block::ResidualBlock;
use crate::network::value_head::ValueHead;

/// Residual convolutional tower with a value head and a policy head.
#[derive(Debug)]
pub struct ChessNet {
    pub vs: nn::VarStore,
    pub config: NetworkConfig,
    conv_input: nn::Conv2D,
    bn_input: nn::BatchNorm,
    residual_blocks: Vec<ResidualBlock>,
    value_head: ValueHead,
    policy_head: PolicyHead,
}

impl ChessNet {
    pub fn new(device: Device, config: &NetworkConfig) -> ChessNet {
        let vs = nn::VarStore::new(device);
        let root = vs.root();
        let num_filters = config.num_filters;

        let conv_input = nn::conv2d(
            &root / "conv_input",
            NUM_POSITION_PLANES as i64,
            num_filters,
            3,
            nn::ConvConfig { padding: 1, ..Default::default() },
        );
        let bn_input = nn::batch_norm2d(&root / "bn_input", num_filters, Default::default());

        let residual_blocks = (0..config.num_res_blocks)
            .map(|i| ResidualBlock::new(&(&root / "res_blocks" / i), num_filters))
            .collect();

        let value_head = ValueHead::new(&(&root / "value_head"), num_filters);
        let policy_head = PolicyHead::new(&(&root / "policy_head"), num_filters);

        ChessNet {
            vs,
            config: *config,
            conv_input,
            bn_input,
            residual_blocks,
            value_head,
            policy_head,
        }
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TchError> {
        self.vs.save(path)
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TchError> {
        self.vs.load(path)
    }
}

impl PolicyValueNetwork for ChessNet {
    fn forward_t(&self, x: &Tensor, train: bool) -> (Tensor, Tensor) {
        let mut x = x
            .view([-1, NUM_POSITION_PLANES as i64, BOARD_SIZE as i64, BOARD_SIZE as i64])
            .apply(&self.conv_input)
            .apply_t(&self.bn_input, train)
            .relu();

        for block in &self.residual_blocks {
            x = block.forward(&x, train);
        }

        let value = self.value_head.forward(&x, train);
        let policy_logits = self.policy_head.forward(&x, train);
        (value, policy_logits)
    }
}

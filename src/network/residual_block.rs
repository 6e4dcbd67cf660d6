use tch::{nn, Tensor};

#[derive(Debug)]
pub struct ResidualBlock {
    conv1: nn::Conv2D,
    bn1: nn::BatchNorm,
    conv2: nn::Conv2D,
    bn2: nn::BatchNorm,
}

impl ResidualBlock {
    pub fn new(vs: &nn::Path, channels: i64) -> ResidualBlock {
        let conv_config = nn::ConvConfig { padding: 1, ..Default::default() };
        ResidualBlock {
            conv1: nn::conv2d(vs / "conv1", channels, channels, 3, conv_config),
            bn1: nn::batch_norm2d(vs / "bn1", channels, Default::default()),
            conv2: nn::conv2d(vs / "conv2", channels, channels, 3, conv_config),
            bn2: nn::batch_norm2d(vs / "bn2", channels, Default::default()),
        }
    }

    pub fn forward(&self, x: &Tensor, train: bool) -> Tensor {
        let out = x.apply(&self.conv1).apply_t(&self.bn1, train).relu();
        let out = out.apply(&self.conv2).apply_t(&self.bn2, train);
        (out + x).relu()
    }
}

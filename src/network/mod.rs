mod utils;
mod policy_value_network;
mod residual_block;
mod policy_head;
mod value_head;
mod chess_net;
pub mod checkpoint;

pub use utils::*;
pub use policy_value_network::*;
pub use chess_net::*;

#[cfg(test)]
pub mod fixed_output_net;

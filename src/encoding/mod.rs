pub mod constants;
mod planes;
mod move_index;

pub use planes::*;
pub use move_index::*;

mod error;
mod record;
mod game;
mod corpus;

pub use error::*;
pub use record::*;
pub use game::*;
pub use corpus::*;

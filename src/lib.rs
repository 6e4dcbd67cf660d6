pub mod config;
pub mod encoding;
pub mod pgn;
pub mod dataset;
pub mod network;
pub mod inference;
pub mod training;

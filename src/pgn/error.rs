use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgnError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Empty record")]
    EmptyRecord,
    #[error("Invalid FEN tag: {0}")]
    InvalidFen(String),
    #[error("Illegal move at ply {ply}: {san}")]
    IllegalMove { ply: usize, san: String },
}

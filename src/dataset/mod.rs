mod partition;
mod stream;
mod batch;
mod shuffle;
mod loader;

pub use partition::*;
pub use stream::*;
pub use batch::*;
pub use shuffle::*;
pub use loader::*;

use std::io;
use thiserror::Error;
use crate::pgn::PgnError;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Number of workers must be positive")]
    NoWorkers,
    #[error("Worker id {worker_id} is out of range for {num_workers} workers")]
    WorkerOutOfRange { worker_id: usize, num_workers: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("PGN error: {0}")]
    Pgn(#[from] PgnError),
    #[error("No game record at offset {offset}")]
    MissingRecord { offset: u64 },
    #[error("Game at offset {offset} has {found} moves, index expects {expected}")]
    MoveCountMismatch { offset: u64, expected: usize, found: usize },
    #[error("Move at ply {ply} of game at offset {offset} has no move index")]
    UnindexableMove { offset: u64, ply: usize },
}

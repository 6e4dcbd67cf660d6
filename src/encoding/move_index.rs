use std::fmt::{Display, Formatter};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Move, Square};
use thiserror::Error;
use crate::encoding::constants::{NUM_MOVE_INDICES, NUM_SQUARES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveIndexError {
    #[error("move index {0} is outside [0, 4095]")]
    OutOfRange(u32),
}

/// Dense index of a move in the 64x64 from/to move space: `from * 64 + to`, with a1 = 0
/// and h8 = 63.
///
/// The promotion piece is not part of the index, so an under-promotion shares its index
/// with the queen promotion on the same squares. Castling is indexed by the king's
/// standard destination (e1g1, e1c1, e8g8, e8c8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoveIndex(u16);

impl MoveIndex {
    pub fn new(index: u32) -> Result<MoveIndex, MoveIndexError> {
        if index as usize >= NUM_MOVE_INDICES {
            return Err(MoveIndexError::OutOfRange(index));
        }
        Ok(MoveIndex(index as u16))
    }

    pub const fn from_squares(from: Square, to: Square) -> MoveIndex {
        MoveIndex(from as u16 * NUM_SQUARES as u16 + to as u16)
    }

    /// Returns `None` only for drops and null moves, which have no source square.
    pub fn from_uci(uci: &UciMove) -> Option<MoveIndex> {
        match *uci {
            UciMove::Normal { from, to, .. } => Some(MoveIndex::from_squares(from, to)),
            UciMove::Put { .. } | UciMove::Null => None,
        }
    }

    pub fn from_move(mv: &Move) -> Option<MoveIndex> {
        MoveIndex::from_uci(&mv.to_uci(CastlingMode::Standard))
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn from_square(self) -> Square {
        Square::new(self.0 as u32 / NUM_SQUARES as u32)
    }

    pub fn to_square(self) -> Square {
        Square::new(self.0 as u32 % NUM_SQUARES as u32)
    }

    pub fn squares(self) -> (Square, Square) {
        (self.from_square(), self.to_square())
    }

    /// The move shape this index stands for. The promotion piece cannot be recovered and
    /// is always reported as absent.
    pub fn to_uci(self) -> UciMove {
        UciMove::Normal {
            from: self.from_square(),
            to: self.to_square(),
            promotion: None,
        }
    }

    pub fn all() -> impl Iterator<Item = MoveIndex> {
        (0..NUM_MOVE_INDICES as u16).map(MoveIndex)
    }
}

impl TryFrom<u32> for MoveIndex {
    type Error = MoveIndexError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        MoveIndex::new(index)
    }
}

impl From<MoveIndex> for i64 {
    fn from(index: MoveIndex) -> i64 {
        index.0 as i64
    }
}

impl Display for MoveIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_uci())
    }
}

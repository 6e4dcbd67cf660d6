use shakmaty::{Board, CastlingSide, Color, Position, Role, Setup, Square};
use tch::{Device, Tensor};
use crate::encoding::constants::*;

type Planes = [[[f32; BOARD_SIZE]; BOARD_SIZE]; NUM_POSITION_PLANES];

/// The four castling rights read by the encoder. They are independent booleans;
/// the encoder never checks them against the piece placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastlingFlags {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingFlags {
    pub const NONE: CastlingFlags = CastlingFlags {
        white_kingside: false,
        white_queenside: false,
        black_kingside: false,
        black_queenside: false,
    };

    pub const ALL: CastlingFlags = CastlingFlags {
        white_kingside: true,
        white_queenside: true,
        black_kingside: true,
        black_queenside: true,
    };

    pub fn of_position<P: Position>(position: &P) -> CastlingFlags {
        let castles = position.castles();
        CastlingFlags {
            white_kingside: castles.has(Color::White, CastlingSide::KingSide),
            white_queenside: castles.has(Color::White, CastlingSide::QueenSide),
            black_kingside: castles.has(Color::Black, CastlingSide::KingSide),
            black_queenside: castles.has(Color::Black, CastlingSide::QueenSide),
        }
    }

    /// Reads the rights of an unvalidated setup from its castling rook squares.
    /// Only the standard corner rooks are recognised.
    pub fn of_setup(setup: &Setup) -> CastlingFlags {
        let rooks = setup.castling_rights;
        CastlingFlags {
            white_kingside: rooks.contains(Square::H1),
            white_queenside: rooks.contains(Square::A1),
            black_kingside: rooks.contains(Square::H8),
            black_queenside: rooks.contains(Square::A8),
        }
    }

    pub fn count(&self) -> usize {
        [self.white_kingside, self.white_queenside, self.black_kingside, self.black_queenside]
            .iter()
            .filter(|&&right| right)
            .count()
    }
}

/// A position encoded as 14 planes of 8x8 scalars.
///
/// Planes 0-5 hold White's pawns, knights, bishops, rooks, queens and king, planes 6-11
/// hold Black's pieces in the same order. Plane 12 is filled with 1.0 when White is to
/// move. Plane 13 is filled with the fraction of castling rights still available.
/// Rank 8 is row 0.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPosition {
    planes: Planes,
}

impl EncodedPosition {
    fn zeros() -> EncodedPosition {
        EncodedPosition {
            planes: [[[0.; BOARD_SIZE]; BOARD_SIZE]; NUM_POSITION_PLANES],
        }
    }

    pub fn planes(&self) -> &Planes {
        &self.planes
    }

    pub fn plane(&self, plane: usize) -> &[[f32; BOARD_SIZE]; BOARD_SIZE] {
        &self.planes[plane]
    }

    pub fn get(&self, plane: usize, row: usize, col: usize) -> f32 {
        self.planes[plane][row][col]
    }

    /// All values in plane-major, then row, then column order.
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.planes.iter().flatten().flatten().copied()
    }

    /// Appends the values to a flat batch buffer.
    pub fn extend_into(&self, buffer: &mut Vec<f32>) {
        buffer.reserve(NUM_ENCODED_VALUES);
        buffer.extend(self.values());
    }

    pub fn to_tensor(&self, device: Device) -> Tensor {
        let values: Vec<f32> = self.values().collect();
        Tensor::from_slice(&values)
            .view([NUM_POSITION_PLANES as i64, BOARD_SIZE as i64, BOARD_SIZE as i64])
            .to_device(device)
    }
}

/// Maps a square to its (row, col) cell. Rank 8 is row 0, file a is column 0.
pub const fn square_to_cell(square: Square) -> (usize, usize) {
    let index = square as usize;
    (BOARD_SIZE - 1 - index / BOARD_SIZE, index % BOARD_SIZE)
}

/// Encodes raw placement, side to move and castling rights. Makes a single pass over the
/// occupied squares and does not require the position to be legal.
pub fn encode_parts(board: &Board, turn: Color, castling: CastlingFlags) -> EncodedPosition {
    let mut encoded = EncodedPosition::zeros();

    // Channels 0-11: piece types for both colors
    for (square, piece) in board.clone().into_iter() {
        let (row, col) = square_to_cell(square);
        let color_offset = match piece.color {
            Color::White => 0,
            Color::Black => NUM_PIECE_TYPE_PLANES,
        };
        let channel = color_offset + piece.role as usize - Role::Pawn as usize;
        encoded.planes[channel][row][col] = 1.;
    }

    // Channel 12: side to move (1 if white to move, 0 if black to move)
    if turn == Color::White {
        encoded.planes[SIDE_TO_MOVE_PLANE] = [[1.; BOARD_SIZE]; BOARD_SIZE];
    }

    // Channel 13: fraction of castling rights left
    let castling_value = castling.count() as f32 / NUM_CASTLING_RIGHTS as f32;
    encoded.planes[CASTLING_PLANE] = [[castling_value; BOARD_SIZE]; BOARD_SIZE];

    encoded
}

pub fn encode_position<P: Position>(position: &P) -> EncodedPosition {
    encode_parts(position.board(), position.turn(), CastlingFlags::of_position(position))
}

/// Encodes a setup that was never validated as a legal position.
pub fn encode_setup(setup: &Setup) -> EncodedPosition {
    encode_parts(&setup.board, setup.turn, CastlingFlags::of_setup(setup))
}

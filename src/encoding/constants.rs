// Constants for the input tensor
pub const BOARD_SIZE: usize = 8;
pub const NUM_SQUARES: usize = BOARD_SIZE * BOARD_SIZE;

pub const NUM_PIECE_TYPE_PLANES: usize = 6; // pawn, knight, bishop, rook, queen, king
pub const NUM_COLORS: usize = 2;
pub const NUM_PIECE_PLANES: usize = NUM_PIECE_TYPE_PLANES * NUM_COLORS; // 12 planes for the board

pub const SIDE_TO_MOVE_PLANE: usize = NUM_PIECE_PLANES; // plane 12
pub const CASTLING_PLANE: usize = SIDE_TO_MOVE_PLANE + 1; // plane 13
pub const NUM_CASTLING_RIGHTS: usize = 4; // white/black, kingside/queenside

pub const NUM_POSITION_PLANES: usize = CASTLING_PLANE + 1; // 14 8x8 planes in the input tensor
pub const NUM_ENCODED_VALUES: usize = NUM_POSITION_PLANES * NUM_SQUARES; // 896 scalars per position

// Constants for the policy output
pub const NUM_MOVE_INDICES: usize = NUM_SQUARES * NUM_SQUARES; // 4096 from/to pairs, promotion piece not encoded

use std::mem;
use indexmap::IndexMap;
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Move, Position};
use crate::pgn::error::PgnError;

/// Game-level result read from the `Result` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    /// Draws, unfinished games and missing or unrecognised results.
    Other,
}

impl GameOutcome {
    pub fn from_result_tag(result: Option<&str>) -> GameOutcome {
        match result.map(str::trim) {
            Some("1-0") => GameOutcome::WhiteWins,
            Some("0-1") => GameOutcome::BlackWins,
            _ => GameOutcome::Other,
        }
    }

    /// +1 for a White win, -1 for a Black win, 0 otherwise. Not relative to the side to move.
    pub fn value(self) -> f32 {
        match self {
            GameOutcome::WhiteWins => 1.,
            GameOutcome::BlackWins => -1.,
            GameOutcome::Other => 0.,
        }
    }
}

/// The main line of one game, resolved against its initial position.
#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub headers: IndexMap<String, String>,
    pub outcome: GameOutcome,
    pub initial_position: Chess,
    pub moves: Vec<Move>,
}

impl ParsedGame {
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn final_position(&self) -> Chess {
        let mut position = self.initial_position.clone();
        for mv in &self.moves {
            position.play_unchecked(mv);
        }
        position
    }
}

#[derive(Default)]
struct GameVisitor {
    headers: IndexMap<String, String>,
    initial_position: Chess,
    position: Chess,
    moves: Vec<Move>,
    error: Option<PgnError>,
}

fn position_from_fen(fen: &str) -> Result<Chess, PgnError> {
    fen.parse::<Fen>()
        .map_err(|_| PgnError::InvalidFen(fen.to_string()))?
        .into_position(CastlingMode::Standard)
        .map_err(|_| PgnError::InvalidFen(fen.to_string()))
}

impl Visitor for GameVisitor {
    type Result = Result<ParsedGame, PgnError>;

    fn begin_game(&mut self) {
        *self = GameVisitor::default();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let key = String::from_utf8_lossy(key).into_owned();
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        self.headers.insert(key, value);
    }

    fn end_headers(&mut self) -> Skip {
        if let Some(fen) = self.headers.get("FEN") {
            match position_from_fen(fen) {
                Ok(position) => {
                    self.initial_position = position.clone();
                    self.position = position;
                }
                Err(e) => self.error = Some(e),
            }
        }
        Skip(self.error.is_some())
    }

    fn san(&mut self, san_plus: SanPlus) {
        if self.error.is_some() {
            return;
        }
        match san_plus.san.to_move(&self.position) {
            Ok(mv) => {
                self.position.play_unchecked(&mv);
                self.moves.push(mv);
            }
            Err(_) => {
                self.error = Some(PgnError::IllegalMove {
                    ply: self.moves.len() + 1,
                    san: san_plus.to_string(),
                });
            }
        }
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // main line only
    }

    fn end_game(&mut self) -> Self::Result {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let headers = mem::take(&mut self.headers);
        let outcome = GameOutcome::from_result_tag(headers.get("Result").map(String::as_str));
        Ok(ParsedGame {
            headers,
            outcome,
            initial_position: mem::take(&mut self.initial_position),
            moves: mem::take(&mut self.moves),
        })
    }
}

/// Parses exactly one game record. Variations are skipped and every main-line move is
/// resolved from the standard start position, or from the `FEN` header when present.
pub fn parse_record(bytes: &[u8]) -> Result<ParsedGame, PgnError> {
    let mut reader = BufferedReader::new_cursor(bytes);
    let mut visitor = GameVisitor::default();
    match reader.read_game(&mut visitor)? {
        Some(game) => game,
        None => Err(PgnError::EmptyRecord),
    }
}

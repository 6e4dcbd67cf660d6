use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::sync::Arc;
use shakmaty::{Chess, Move, Position};
use crate::dataset::partition::partition_range;
use crate::dataset::DatasetError;
use crate::encoding::{encode_position, EncodedPosition, MoveIndex};
use crate::pgn::{parse_record, ArchiveId, GameIndex, RecordReader};

/// One training example: the position before a move, the move played and the game's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub position: EncodedPosition,
    pub move_index: MoveIndex,
    pub outcome: f32,
}

/// A restartable sequence of training samples backed by a [`GameIndex`].
///
/// Nothing is held in memory beyond the index. Every traversal re-reads the archives at the
/// stored offsets and replays each game's main line, so traversals are independent and
/// always produce the same samples in the same order.
#[derive(Debug, Clone)]
pub struct PositionDataset {
    index: Arc<GameIndex>,
}

impl PositionDataset {
    pub fn new(index: Arc<GameIndex>) -> PositionDataset {
        PositionDataset { index }
    }

    pub fn index(&self) -> &GameIndex {
        &self.index
    }

    /// Number of samples a full traversal yields when every game replays.
    pub fn len(&self) -> usize {
        self.index.total_positions()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_games(&self) -> usize {
        self.index.num_games()
    }

    pub fn iter(&self) -> SampleIter {
        SampleIter::new(self.index.clone(), 0..self.num_games())
    }

    /// Samples from this worker's contiguous share of the games. Games are never split
    /// between workers.
    pub fn worker_iter(&self, worker_id: usize, num_workers: usize) -> Result<SampleIter, DatasetError> {
        let games = partition_range(self.num_games(), num_workers, worker_id)?;
        Ok(SampleIter::new(self.index.clone(), games))
    }

    /// Number of samples in this worker's share.
    pub fn worker_len(&self, worker_id: usize, num_workers: usize) -> Result<usize, DatasetError> {
        let games = partition_range(self.num_games(), num_workers, worker_id)?;
        Ok(self.index.entries()[games].iter().map(|entry| entry.move_count as usize).sum())
    }
}

impl<'a> IntoIterator for &'a PositionDataset {
    type Item = TrainingSample;
    type IntoIter = SampleIter;

    fn into_iter(self) -> SampleIter {
        self.iter()
    }
}

struct GameReplay {
    position: Chess,
    moves: std::vec::IntoIter<(Move, MoveIndex)>,
    outcome: f32,
}

/// Lazily replays a range of indexed games. Holds at most one open archive at a time, and
/// closes it when dropped.
pub struct SampleIter {
    index: Arc<GameIndex>,
    games: Range<usize>,
    reader: Option<(ArchiveId, RecordReader<BufReader<File>>)>,
    current: Option<GameReplay>,
    skipped_games: usize,
}

impl SampleIter {
    fn new(index: Arc<GameIndex>, games: Range<usize>) -> SampleIter {
        SampleIter {
            index,
            games,
            reader: None,
            current: None,
            skipped_games: 0,
        }
    }

    /// Games that could not be replayed so far.
    pub fn skipped_games(&self) -> usize {
        self.skipped_games
    }

    /// The record reader for `archive`, positioned at `offset`. Consecutive games of one
    /// archive are read without seeking.
    fn reader_at(&mut self, archive: ArchiveId, offset: u64) -> Result<&mut RecordReader<BufReader<File>>, DatasetError> {
        if self.reader.as_ref().is_some_and(|(open, _)| *open != archive) {
            self.reader = None;
        }
        let reader = match self.reader.take() {
            Some((open, mut reader)) => {
                reader.seek_to(offset)?;
                (open, reader)
            }
            None => (archive, RecordReader::open_at(&self.index.archives()[archive as usize].path, offset)?),
        };
        let (_, reader) = self.reader.insert(reader);
        Ok(reader)
    }

    fn load_game(&mut self, game: usize) -> Result<GameReplay, DatasetError> {
        let entry = self.index.entries()[game];
        let record = self
            .reader_at(entry.archive, entry.offset)?
            .read_record()?
            .ok_or(DatasetError::MissingRecord { offset: entry.offset })?;
        let parsed = parse_record(&record.bytes)?;

        if parsed.move_count() != entry.move_count as usize {
            return Err(DatasetError::MoveCountMismatch {
                offset: entry.offset,
                expected: entry.move_count as usize,
                found: parsed.move_count(),
            });
        }

        let moves = parsed
            .moves
            .into_iter()
            .enumerate()
            .map(|(ply, mv)| match MoveIndex::from_move(&mv) {
                Some(index) => Ok((mv, index)),
                None => Err(DatasetError::UnindexableMove { offset: entry.offset, ply: ply + 1 }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GameReplay {
            position: parsed.initial_position,
            moves: moves.into_iter(),
            outcome: entry.outcome.value(),
        })
    }
}

impl Iterator for SampleIter {
    type Item = TrainingSample;

    fn next(&mut self) -> Option<TrainingSample> {
        loop {
            if let Some(game) = &mut self.current {
                if let Some((mv, move_index)) = game.moves.next() {
                    let position = encode_position(&game.position);
                    game.position.play_unchecked(&mv);
                    return Some(TrainingSample {
                        position,
                        move_index,
                        outcome: game.outcome,
                    });
                }
                self.current = None;
            }

            let game = self.games.next()?;
            match self.load_game(game) {
                Ok(replay) => self.current = Some(replay),
                Err(e) => {
                    tracing::warn!("Skipping game {}: {}", game, e);
                    self.skipped_games += 1;
                }
            }
        }
    }
}

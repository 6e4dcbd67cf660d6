use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::pgn::game::{parse_record, GameOutcome};
use crate::pgn::record::RecordReader;

/// Position of an archive in [`GameIndex::archives`].
pub type ArchiveId = u32;

/// Where one game lives and what it is worth as training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameIndexEntry {
    pub archive: ArchiveId,
    /// Byte offset of the first line of the game record.
    pub offset: u64,
    /// Number of main-line plies.
    pub move_count: u32,
    pub outcome: GameOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// File length when the archive was scanned.
    pub len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveStatus {
    Complete,
    /// Scanning stopped early because the position cap was reached.
    Capped,
    Missing,
    Unreadable,
    /// A corrupt or unreadable record stopped the scan; earlier games were kept.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub games: usize,
    pub positions: usize,
    pub status: ArchiveStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub archives: Vec<ArchiveSummary>,
}

impl IndexReport {
    pub fn count(&self, status: ArchiveStatus) -> usize {
        self.archives.iter().filter(|summary| summary.status == status).count()
    }
}

impl Display for IndexReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for summary in &self.archives {
            writeln!(
                f,
                "{:<11} {:>9} games {:>11} positions  {}",
                format!("{:?}", summary.status),
                summary.games,
                summary.positions,
                summary.path.display(),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum IndexCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Corrupt index cache: {0}")]
    Decode(#[from] bincode::Error),
    #[error("Archive changed since it was indexed: {0}")]
    Stale(PathBuf),
}

/// Compact descriptors of every indexed game, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameIndex {
    archives: Vec<ArchiveInfo>,
    entries: Vec<GameIndexEntry>,
    total_positions: usize,
    report: IndexReport,
}

impl GameIndex {
    pub fn entries(&self) -> &[GameIndexEntry] {
        &self.entries
    }

    pub fn archives(&self) -> &[ArchiveInfo] {
        &self.archives
    }

    pub fn archive_path(&self, entry: &GameIndexEntry) -> &Path {
        &self.archives[entry.archive as usize].path
    }

    /// Sum of the move counts of all entries.
    pub fn total_positions(&self) -> usize {
        self.total_positions
    }

    pub fn num_games(&self) -> usize {
        self.entries.len()
    }

    pub fn report(&self) -> &IndexReport {
        &self.report
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), IndexCacheError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Loads a cached index, rejecting it if any archive's length no longer matches.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<GameIndex, IndexCacheError> {
        let reader = BufReader::new(File::open(path)?);
        let index: GameIndex = bincode::deserialize_from(reader)?;
        for archive in &index.archives {
            let current_len = fs::metadata(&archive.path).map(|m| m.len()).ok();
            if current_len != Some(archive.len) {
                return Err(IndexCacheError::Stale(archive.path.clone()));
            }
        }
        Ok(index)
    }
}

struct ScannedGame {
    offset: u64,
    move_count: u32,
    outcome: GameOutcome,
}

struct ArchiveScan {
    len: Option<u64>,
    games: Vec<ScannedGame>,
    summary: ArchiveSummary,
}

/// Builds a [`GameIndex`] by making one forward pass over each archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusIndexer {
    max_positions: Option<usize>,
}

impl CorpusIndexer {
    pub fn new(max_positions: Option<usize>) -> CorpusIndexer {
        CorpusIndexer { max_positions }
    }

    pub fn index<P: AsRef<Path> + Sync>(&self, paths: &[P]) -> GameIndex {
        let scans = match self.max_positions {
            None => paths
                .par_iter()
                .map(|path| scan_archive(path.as_ref(), None))
                .collect::<Vec<_>>(),
            Some(cap) => {
                let mut scans = Vec::new();
                let mut total = 0;
                for path in paths {
                    if total >= cap {
                        tracing::info!("Reached max positions limit of {}", cap);
                        break;
                    }
                    let scan = scan_archive(path.as_ref(), Some(cap - total));
                    total += scan.summary.positions;
                    scans.push(scan);
                }
                scans
            }
        };

        let mut index = GameIndex::default();
        for scan in scans {
            if let Some(len) = scan.len {
                let archive = index.archives.len() as ArchiveId;
                index.archives.push(ArchiveInfo { path: scan.summary.path.clone(), len });
                index.entries.extend(scan.games.into_iter().map(|game| GameIndexEntry {
                    archive,
                    offset: game.offset,
                    move_count: game.move_count,
                    outcome: game.outcome,
                }));
            }
            index.total_positions += scan.summary.positions;
            index.report.archives.push(scan.summary);
        }

        tracing::info!(
            "Indexed {} games, {} positions from {} archives",
            index.entries.len(),
            index.total_positions,
            index.archives.len(),
        );
        index
    }
}

fn scan_archive(path: &Path, budget: Option<usize>) -> ArchiveScan {
    let mut scan = ArchiveScan {
        len: None,
        games: Vec::new(),
        summary: ArchiveSummary {
            path: path.to_path_buf(),
            games: 0,
            positions: 0,
            status: ArchiveStatus::Complete,
        },
    };

    if !path.exists() {
        tracing::warn!("PGN file not found: {}", path.display());
        scan.summary.status = ArchiveStatus::Missing;
        return scan;
    }

    if !path.is_file() {
        tracing::error!("Not a regular file: {}", path.display());
        scan.summary.status = ArchiveStatus::Unreadable;
        return scan;
    }

    let opened = File::open(path).and_then(|file| {
        let len = file.metadata()?.len();
        Ok((file, len))
    });
    let (file, len) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", path.display(), e);
            scan.summary.status = ArchiveStatus::Unreadable;
            return scan;
        }
    };
    scan.len = Some(len);
    tracing::info!("Indexing {} ({} bytes)", path.display(), len);

    let mut reader = RecordReader::new(BufReader::with_capacity(1 << 20, file));
    loop {
        let record = match reader.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Read error in {} after offset {}: {}", path.display(), reader.offset(), e);
                scan.summary.status = ArchiveStatus::Truncated;
                break;
            }
        };

        let game = match parse_record(&record.bytes) {
            Ok(game) => game,
            Err(e) => {
                tracing::error!(
                    "Corrupt game at offset {} in {}: {}; keeping {} games indexed before it",
                    record.offset,
                    path.display(),
                    e,
                    scan.summary.games,
                );
                scan.summary.status = ArchiveStatus::Truncated;
                break;
            }
        };

        let move_count = game.move_count();
        if move_count == 0 {
            tracing::debug!("Skipping game without moves at offset {}", record.offset);
            continue;
        }

        scan.games.push(ScannedGame {
            offset: record.offset,
            move_count: move_count as u32,
            outcome: game.outcome,
        });
        scan.summary.games += 1;
        scan.summary.positions += move_count;

        if scan.summary.games % 10_000 == 0 {
            tracing::debug!("  {} games, {} positions", scan.summary.games, scan.summary.positions);
        }

        if budget.is_some_and(|budget| scan.summary.positions >= budget) {
            scan.summary.status = ArchiveStatus::Capped;
            break;
        }
    }

    if scan.summary.status == ArchiveStatus::Truncated {
        tracing::warn!(
            "Stopped reading {} early: {} games, {} positions",
            path.display(),
            scan.summary.games,
            scan.summary.positions,
        );
    }
    scan
}

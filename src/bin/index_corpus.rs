use std::path::PathBuf;
use anyhow::{bail, Context};
use clap::Parser;
use tessera::config::Config;
use tessera::pgn::{ArchiveStatus, CorpusIndexer};

/// Scans PGN archives and writes the game index cache used by `train`.
#[derive(Parser, Debug)]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage root, overrides the config
    #[arg(long)]
    root: Option<PathBuf>,

    /// Archives to index; defaults to every downloaded month under the storage root
    pgn_files: Vec<PathBuf>,

    /// Stop once this many positions are indexed
    #[arg(long)]
    max_positions: Option<usize>,

    /// Where to write the index, defaults to `<root>/data/game_index.bin`
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_ref())?;
    if let Some(root) = args.root {
        config.storage.root = root;
    }
    config.storage.ensure_dirs()?;

    let archives = if args.pgn_files.is_empty() {
        config.storage.monthly_archives()?
    } else {
        args.pgn_files
    };
    if archives.is_empty() {
        bail!("No PGN archives found under {}", config.storage.games_dir().display());
    }
    tracing::info!("Indexing {} archives", archives.len());

    let max_positions = args.max_positions.or(config.training.max_positions);
    let index = CorpusIndexer::new(max_positions).index(&archives);
    println!("{}", index.report());
    println!("{} games, {} positions", index.num_games(), index.total_positions());

    let skipped = index.report().count(ArchiveStatus::Missing) + index.report().count(ArchiveStatus::Unreadable);
    if skipped > 0 {
        tracing::warn!("{} archives could not be read", skipped);
    }

    let output = args.output.unwrap_or_else(|| config.storage.index_cache_path());
    index
        .save(&output)
        .with_context(|| format!("Failed to write index to {}", output.display()))?;
    tracing::info!("Wrote index to {}", output.display());
    Ok(())
}

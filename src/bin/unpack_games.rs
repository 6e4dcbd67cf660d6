use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use anyhow::{bail, Context};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tessera::config::Config;
use tessera::pgn::{RawRecord, RecordReader};

/// Decompresses a monthly `.pgn.zst` dump and keeps the games where both players meet
/// the rating threshold.
#[derive(Parser, Debug)]
struct Args {
    /// Compressed (`.zst`) or plain PGN dump
    input: PathBuf,

    /// Month the dump belongs to (`YYYY-MM`); output goes to `<root>/games/<month>/`
    #[arg(long)]
    month: Option<String>,

    /// Explicit output file, overrides `--month`
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    root: Option<PathBuf>,

    #[arg(long, default_value_t = 2000)]
    min_elo: u32,

    /// Stop after writing this many games
    #[arg(long)]
    max_games: Option<usize>,
}

fn rating(record: &RawRecord, tag: &str) -> Option<u32> {
    record.header(tag)?.trim().parse().ok()
}

fn passes_filter(record: &RawRecord, min_elo: u32) -> bool {
    match (rating(record, "WhiteElo"), rating(record, "BlackElo")) {
        (Some(white), Some(black)) => white >= min_elo && black >= min_elo,
        _ => false,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_ref())?;
    if let Some(root) = args.root {
        config.storage.root = root;
    }
    let output = match (args.output, args.month) {
        (Some(output), _) => output,
        (None, Some(month)) => config.storage.month_archive(&month),
        (None, None) => bail!("Either --output or --month is required"),
    };
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::open(&args.input).with_context(|| format!("Failed to open {}", args.input.display()))?;
    let input: Box<dyn Read> = if args.input.extension().is_some_and(|ext| ext == "zst") {
        Box::new(zstd::Decoder::new(file)?)
    } else {
        Box::new(file)
    };
    let mut reader = RecordReader::new(BufReader::new(input));
    let mut writer = BufWriter::new(File::create(&output)?);

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template(
            "{spinner:.green} {prefix} [{elapsed_precise}] [Read {human_pos} @ {per_sec}] {msg}",
        )?)
        .with_prefix(args.input.display().to_string());

    let mut kept = 0;
    loop {
        let record = match reader.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!("Input ends mid-record after {} games: {}", bar.position(), e);
                break;
            }
            Err(e) => return Err(e).context("Failed to read PGN input"),
        };
        bar.inc(1);

        if passes_filter(&record, args.min_elo) {
            writer.write_all(&record.bytes)?;
            if !record.bytes.ends_with(b"\n") {
                writer.write_all(b"\n")?;
            }
            writer.write_all(b"\n")?;
            kept += 1;
            bar.set_message(format!("[Kept {}]", kept));
            if args.max_games.is_some_and(|max| kept >= max) {
                break;
            }
        }
    }
    writer.flush()?;
    bar.finish();

    tracing::info!(
        "Kept {} of {} games rated at least {}, written to {}",
        kept,
        bar.position(),
        args.min_elo,
        output.display(),
    );
    Ok(())
}

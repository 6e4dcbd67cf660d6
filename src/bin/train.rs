use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context};
use clap::Parser;
use tessera::config::Config;
use tessera::dataset::{PositionDataset, SampleBatch};
use tessera::network::checkpoint::{Checkpoint, OptimizerState};
use tessera::network::{select_device, ChessNet};
use tessera::pgn::{CorpusIndexer, GameIndex};
use tessera::training::{StepLr, Trainer};

const MODEL_NAME: &str = "chess_net";

/// Trains the policy/value network on indexed PGN archives.
#[derive(Parser, Debug)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    root: Option<PathBuf>,

    /// Archives to train on; defaults to every downloaded month under the storage root
    pgn_files: Vec<PathBuf>,

    #[arg(long)]
    max_positions: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    epochs: Option<u64>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    weight_decay: Option<f64>,

    #[arg(long)]
    lr_step: Option<u64>,

    #[arg(long)]
    lr_gamma: Option<f64>,

    #[arg(long)]
    num_workers: Option<usize>,

    #[arg(long)]
    save_every: Option<u64>,

    #[arg(long)]
    shuffle_buffer: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    num_res_blocks: Option<usize>,

    #[arg(long)]
    num_filters: Option<i64>,

    /// Checkpoint stem to continue from, e.g. `ChessAI/checkpoints/model_epoch_5`
    #[arg(long)]
    resume_from: Option<PathBuf>,

    /// Rescan the archives even if a matching index cache exists
    #[arg(long)]
    reindex: bool,

    #[arg(long)]
    cpu: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        let training = &mut config.training;
        if let Some(root) = &self.root {
            config.storage.root = root.clone();
        }
        if self.max_positions.is_some() {
            training.max_positions = self.max_positions;
        }
        training.batch_size = self.batch_size.unwrap_or(training.batch_size);
        training.epochs = self.epochs.unwrap_or(training.epochs);
        training.learning_rate = self.learning_rate.unwrap_or(training.learning_rate);
        training.weight_decay = self.weight_decay.unwrap_or(training.weight_decay);
        training.lr_step = self.lr_step.unwrap_or(training.lr_step);
        training.lr_gamma = self.lr_gamma.unwrap_or(training.lr_gamma);
        training.num_workers = self.num_workers.unwrap_or(training.num_workers);
        training.save_every = self.save_every.unwrap_or(training.save_every);
        training.shuffle_buffer = self.shuffle_buffer.unwrap_or(training.shuffle_buffer);
        training.seed = self.seed.unwrap_or(training.seed);
        config.network.num_res_blocks = self.num_res_blocks.unwrap_or(config.network.num_res_blocks);
        config.network.num_filters = self.num_filters.unwrap_or(config.network.num_filters);
    }
}

/// Reuses the cached index when it was built from exactly these archives.
fn load_or_build_index(config: &Config, archives: &[PathBuf], reindex: bool) -> anyhow::Result<GameIndex> {
    let cache = config.storage.index_cache_path();
    if !reindex && cache.is_file() {
        match GameIndex::load(&cache) {
            Ok(index) if index.archives().iter().map(|a| &a.path).eq(archives.iter()) => {
                tracing::info!("Using cached index {}", cache.display());
                return Ok(index);
            }
            Ok(_) => tracing::info!("Cached index covers different archives, rescanning"),
            Err(e) => tracing::warn!("Ignoring index cache {}: {}", cache.display(), e),
        }
    }

    let index = CorpusIndexer::new(config.training.max_positions).index(archives);
    println!("{}", index.report());
    if let Err(e) = index.save(&cache) {
        tracing::warn!("Could not write index cache {}: {}", cache.display(), e);
    }
    Ok(index)
}

fn check_first_batch(dataset: &PositionDataset, batch_size: usize) {
    let batch: SampleBatch = dataset.iter().take(batch_size).collect();
    let (positions, moves, outcomes) = batch.to_tensors(tch::Device::Cpu);
    tracing::info!(
        "First batch: positions {:?}, moves {:?}, outcomes {:?}",
        positions.size(),
        moves.size(),
        outcomes.size(),
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_ref())?;
    args.apply(&mut config);
    config.storage.ensure_dirs()?;

    let archives = if args.pgn_files.is_empty() {
        config.storage.monthly_archives()?
    } else {
        args.pgn_files.clone()
    };
    if archives.is_empty() {
        bail!("No PGN archives found under {}", config.storage.games_dir().display());
    }
    let index = load_or_build_index(&config, &archives, args.reindex)?;
    let dataset = PositionDataset::new(Arc::new(index));
    tracing::info!("Dataset: {} games, {} positions", dataset.num_games(), dataset.len());
    if dataset.is_empty() {
        bail!("No positions loaded from {} archives", archives.len());
    }
    check_first_batch(&dataset, config.training.batch_size);

    let device = select_device(args.cpu);
    tracing::info!("Using device {:?}", device);
    let mut net = ChessNet::new(device, &config.network);
    let num_parameters: usize = net.vs.variables().values().map(|t| t.numel()).sum();
    tracing::info!("Network has {} parameters", num_parameters);

    let trainer = Trainer::new(config.clone(), device);
    let reports = trainer.fit(&mut net, &dataset, args.resume_from.as_deref())?;
    let Some(last) = reports.last() else {
        tracing::warn!("No epochs were run");
        return Ok(());
    };

    let model = config.storage.model_stem(MODEL_NAME);
    final_checkpoint(&config, last.epoch, last.mean.total_loss)
        .save(&net.vs, &model)
        .with_context(|| format!("Failed to save model to {}", model.display()))?;
    tracing::info!("Saved model to {}", model.display());
    Ok(())
}

/// The metadata of the last epoch checkpoint, or fresh metadata when that epoch was not saved.
fn final_checkpoint(config: &Config, epoch: u64, mean_loss: f64) -> Checkpoint {
    Checkpoint::read(config.storage.checkpoint_stem(epoch)).unwrap_or_else(|_| {
        let training = &config.training;
        let scheduler = StepLr::new(training.learning_rate, training.lr_step, training.lr_gamma);
        let optimizer = OptimizerState {
            learning_rate: scheduler.lr_at(epoch),
            weight_decay: training.weight_decay,
            steps: 0,
        };
        Checkpoint::new(epoch, config.network, optimizer, scheduler.state(epoch), mean_loss)
    })
}

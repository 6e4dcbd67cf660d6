use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use tessera::config::Config;
use tessera::inference::Engine;
use tessera::network::select_device;

/// Prints the network's evaluation and preferred moves for one position.
#[derive(Parser, Debug)]
struct Args {
    /// Checkpoint stem, defaults to `<root>/models/chess_net`
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Position to analyze, defaults to the starting position
    #[arg(long)]
    fen: Option<String>,

    #[arg(long, default_value_t = 5)]
    num_moves: usize,

    #[arg(long)]
    cpu: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_ref())?;
    let position: Chess = match &args.fen {
        Some(fen) => fen
            .parse::<Fen>()
            .with_context(|| format!("Invalid FEN: {fen}"))?
            .into_position(CastlingMode::Standard)
            .with_context(|| format!("Illegal position: {fen}"))?,
        None => Chess::default(),
    };

    let model = args.model.unwrap_or_else(|| config.storage.model_stem("chess_net"));
    let engine = Engine::load(&model, &config.network, select_device(args.cpu))
        .with_context(|| format!("Failed to load model {}", model.display()))?;

    let evaluation = engine.evaluate(&position)?;
    println!("Position: {}", Fen::from_setup(position.clone().into_setup(EnPassantMode::Legal)));
    println!("Evaluation: {:.3} (positive favors White)", evaluation.value);
    match &evaluation.best_move {
        Some(mv) => println!("Best move: {}", San::from_move(&position, mv)),
        None => println!("No legal moves"),
    }
    println!("Top {} moves:", args.num_moves.min(evaluation.ranked_moves.len()));
    for (rank, (mv, probability)) in evaluation.ranked_moves.iter().take(args.num_moves).enumerate() {
        println!("{:>2}. {:<8} {:.4}", rank + 1, San::from_move(&position, mv).to_string(), probability);
    }
    Ok(())
}

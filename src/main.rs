use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use anyhow::Context;
use clap::Parser;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Color, File, Move, Outcome, Position, Rank, Square};
use tessera::config::Config;
use tessera::inference::Engine;
use tessera::network::select_device;

const SHOWN_MOVES: usize = 3;

/// Play White against the trained network in the terminal.
#[derive(Parser, Debug)]
struct Args {
    /// Checkpoint stem, defaults to `<root>/models/chess_net`
    #[arg(long)]
    model: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    cpu: bool,
}

fn print_board(position: &Chess) {
    let board = position.board();
    for rank in Rank::ALL.into_iter().rev() {
        print!("{} ", rank.char());
        for file in File::ALL {
            let c = board.piece_at(Square::from_coords(file, rank)).map_or('.', |piece| piece.char());
            print!("{} ", c);
        }
        println!();
    }
    println!("  a b c d e f g h");
}

/// Accepts UCI (`e2e4`) or SAN (`e4`, `Nf3`).
fn parse_move(position: &Chess, input: &str) -> Option<Move> {
    if let Ok(uci) = input.parse::<UciMove>() {
        if let Ok(mv) = uci.to_move(position) {
            return Some(mv);
        }
    }
    let san = input.parse::<SanPlus>().ok()?;
    san.san.to_move(position).ok()
}

fn describe(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Decisive { winner: Color::White } => "White wins",
        Outcome::Decisive { winner: Color::Black } => "Black wins",
        Outcome::Draw => "Draw",
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let config = Config::load_or_default(args.config.as_ref())?;
    let model = args.model.unwrap_or_else(|| config.storage.model_stem("chess_net"));
    let engine = Engine::load(&model, &config.network, select_device(args.cpu))
        .with_context(|| format!("Failed to load model {}", model.display()))?;

    let mut position = Chess::default();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print_board(&position);
        if let Some(outcome) = position.outcome() {
            println!("Game over: {}", describe(outcome));
            break;
        }

        if position.turn() == Color::White {
            print!("Enter move (q to quit): ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;
            let input = line.trim();
            if input == "q" {
                break;
            }
            match parse_move(&position, input) {
                Some(mv) => position.play_unchecked(&mv),
                None => println!("Illegal move: {}", input),
            }
            continue;
        }

        let evaluation = engine.evaluate(&position)?;
        println!("Evaluation: {:.3}", evaluation.value);
        for (mv, probability) in evaluation.ranked_moves.iter().take(SHOWN_MOVES) {
            println!("  {:<8} {:.4}", San::from_move(&position, mv).to_string(), probability);
        }
        let Some(mv) = evaluation.best_move else {
            break;
        };
        println!("Engine plays {}", San::from_move(&position, &mv));
        position.play_unchecked(&mv);
    }
    Ok(())
}

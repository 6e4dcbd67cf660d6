use std::path::Path;
use shakmaty::{Chess, Move, Position};
use tch::{Device, Kind, TchError};
use crate::config::NetworkConfig;
use crate::encoding::{encode_position, MoveIndex};
use crate::network::checkpoint::{Checkpoint, CheckpointError};
use crate::network::{ChessNet, PolicyValueNetwork};

/// Network output for one position, restricted to the legal moves.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Expected outcome from White's point of view, in [-1, 1].
    pub value: f32,
    pub best_move: Option<Move>,
    /// Legal moves with their share of the softmax over all 4096 move indices, highest
    /// first. Mass on illegal indices is dropped, so the probabilities may sum to less
    /// than 1.
    pub ranked_moves: Vec<(Move, f32)>,
}

/// Answers positions with a single forward pass; there is no search.
pub struct Engine<N = ChessNet> {
    network: N,
    device: Device,
}

impl Engine<ChessNet> {
    pub fn load<P: AsRef<Path>>(stem: P, config: &NetworkConfig, device: Device) -> Result<Self, CheckpointError> {
        let mut network = ChessNet::new(device, config);
        Checkpoint::load(stem, &mut network.vs, config)?;
        Ok(Engine::new(network, device))
    }
}

impl<N: PolicyValueNetwork> Engine<N> {
    pub fn new(network: N, device: Device) -> Self {
        Engine { network, device }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn evaluate(&self, position: &Chess) -> Result<Evaluation, TchError> {
        let input = encode_position(position).to_tensor(self.device).unsqueeze(0);
        let (value, policy_logits) = tch::no_grad(|| self.network.forward_t(&input, false));

        let value = value.double_value(&[0, 0]) as f32;
        let probabilities = Vec::<f32>::try_from(
            policy_logits
                .softmax(-1, Kind::Float)
                .view([-1])
                .to_device(Device::Cpu),
        )?;

        let mut ranked_moves: Vec<(Move, f32)> = position
            .legal_moves()
            .into_iter()
            .map(|mv| {
                let probability = MoveIndex::from_move(&mv)
                    .and_then(|index| probabilities.get(index.as_usize()).copied())
                    .unwrap_or(0.);
                (mv, probability)
            })
            .collect();
        // stable, so ties keep legal move order
        ranked_moves.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(Evaluation {
            value,
            best_move: ranked_moves.first().map(|(mv, _)| mv.clone()),
            ranked_moves,
        })
    }

    /// The `n` most probable legal moves.
    pub fn top_moves(&self, position: &Chess, n: usize) -> Result<Vec<(Move, f32)>, TchError> {
        let mut ranked = self.evaluate(position)?.ranked_moves;
        ranked.truncate(n);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use shakmaty::fen::Fen;
    use shakmaty::{CastlingMode, Square};
    use crate::network::fixed_output_net::FixedOutputNet;
    use super::*;

    fn position_from_fen(fen: &str) -> Chess {
        fen.parse::<Fen>()
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap()
    }

    fn e2e4() -> usize {
        MoveIndex::from_squares(Square::E2, Square::E4).as_usize()
    }

    #[test]
    fn test_only_legal_moves_are_ranked() {
        // a1a1 can never be legal
        let logits = FixedOutputNet::logits_favoring(&[0], 0., 1000.);
        let engine = Engine::new(FixedOutputNet::for_both_sides(0., logits), Device::Cpu);
        let position = Chess::default();
        let evaluation = engine.evaluate(&position).unwrap();

        let legal = position.legal_moves();
        assert_eq!(evaluation.ranked_moves.len(), legal.len());
        for (mv, probability) in &evaluation.ranked_moves {
            assert!(legal.contains(mv));
            assert!(*probability < 1e-6);
        }
        let total: f32 = evaluation.ranked_moves.iter().map(|(_, p)| p).sum();
        assert!(total < 1e-3);
    }

    #[test]
    fn test_ties_keep_legal_move_order() {
        let engine = Engine::new(FixedOutputNet::uniform(0.), Device::Cpu);
        let position = Chess::default();
        let evaluation = engine.evaluate(&position).unwrap();

        let legal: Vec<Move> = position.legal_moves().into_iter().collect();
        let ranked: Vec<Move> = evaluation.ranked_moves.iter().map(|(mv, _)| mv.clone()).collect();
        assert_eq!(ranked, legal);
        assert_eq!(evaluation.best_move, legal.first().cloned());

        let total: f32 = evaluation.ranked_moves.iter().map(|(_, p)| p).sum();
        assert!((total - 20. / 4096.).abs() < 1e-5);
    }

    #[test]
    fn test_best_move_follows_policy() {
        let logits = FixedOutputNet::logits_favoring(&[e2e4()], -1., 10.);
        let engine = Engine::new(FixedOutputNet::for_both_sides(0.25, logits), Device::Cpu);
        let evaluation = engine.evaluate(&Chess::default()).unwrap();

        let best = evaluation.best_move.unwrap();
        assert_eq!(best.from(), Some(Square::E2));
        assert_eq!(best.to(), Square::E4);
        assert!(evaluation.ranked_moves[0].1 > 0.5);
        assert!(evaluation.ranked_moves.windows(2).all(|w| w[0].1 >= w[1].1));
        assert_eq!(evaluation.value, 0.25);
    }

    #[test]
    fn test_side_to_move_selects_output() {
        let e7e5 = MoveIndex::from_squares(Square::E7, Square::E5).as_usize();
        let net = FixedOutputNet {
            white_value: 1.,
            black_value: -1.,
            white_logits: FixedOutputNet::logits_favoring(&[e2e4()], 0., 10.),
            black_logits: FixedOutputNet::logits_favoring(&[e7e5], 0., 10.),
        };
        let engine = Engine::new(net, Device::Cpu);

        let position = Chess::default();
        let white = engine.evaluate(&position).unwrap();
        let mv = white.best_move.unwrap();
        assert_eq!(white.value, 1.);

        let after = position.play(&mv).unwrap();
        let black = engine.evaluate(&after).unwrap();
        assert_eq!(black.value, -1.);
        assert_eq!(black.best_move.unwrap().to(), Square::E5);
    }

    #[test]
    fn test_checkmate_has_no_best_move() {
        let position = position_from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        let engine = Engine::new(FixedOutputNet::uniform(-1.), Device::Cpu);
        let evaluation = engine.evaluate(&position).unwrap();

        assert!(evaluation.best_move.is_none());
        assert!(evaluation.ranked_moves.is_empty());
        assert_eq!(evaluation.value, -1.);
    }

    #[test]
    fn test_top_moves() {
        let engine = Engine::new(FixedOutputNet::uniform(0.), Device::Cpu);
        assert_eq!(engine.top_moves(&Chess::default(), 3).unwrap().len(), 3);
        assert_eq!(engine.top_moves(&Chess::default(), 100).unwrap().len(), 20);

        let stalemate = position_from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(engine.top_moves(&stalemate, 5).unwrap().is_empty());
    }
}

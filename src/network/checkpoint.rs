use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tch::{nn, TchError};
use thiserror::Error;
use crate::config::NetworkConfig;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid checkpoint metadata: {0}")]
    Metadata(#[from] bincode::Error),
    #[error("Tensor error: {0}")]
    Tensor(#[from] TchError),
    #[error("Unsupported checkpoint version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Checkpoint was trained with {found:?}, expected {expected:?}")]
    ArchitectureMismatch { expected: NetworkConfig, found: NetworkConfig },
    #[error("Missing parameter file: {0}")]
    MissingParameters(PathBuf),
}

/// Adam hyper-parameters and progress. The moment estimates live inside libtorch and are
/// not saved, so a resumed run restarts them from zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub steps: u64,
}

/// Step decay: the learning rate is multiplied by `gamma` every `step_size` epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub base_lr: f64,
    pub step_size: u64,
    pub gamma: f64,
    /// Number of completed epochs the schedule has been stepped through.
    pub last_epoch: u64,
}

/// Training state saved as `<stem>.meta` (bincode) next to the parameters in
/// `<stem>.safetensors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub epoch: u64,
    pub network: NetworkConfig,
    pub optimizer: OptimizerState,
    pub scheduler: SchedulerState,
    pub mean_loss: f64,
}

fn with_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(stem.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

impl Checkpoint {
    pub fn new(
        epoch: u64,
        network: NetworkConfig,
        optimizer: OptimizerState,
        scheduler: SchedulerState,
        mean_loss: f64,
    ) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            epoch,
            network,
            optimizer,
            scheduler,
            mean_loss,
        }
    }

    pub fn metadata_path<P: AsRef<Path>>(stem: P) -> PathBuf {
        with_suffix(stem.as_ref(), ".meta")
    }

    pub fn parameters_path<P: AsRef<Path>>(stem: P) -> PathBuf {
        with_suffix(stem.as_ref(), ".safetensors")
    }

    pub fn save<P: AsRef<Path>>(&self, vs: &nn::VarStore, stem: P) -> Result<(), CheckpointError> {
        let stem = stem.as_ref();
        if let Some(parent) = stem.parent() {
            fs::create_dir_all(parent)?;
        }
        vs.save(Checkpoint::parameters_path(stem))?;
        let writer = BufWriter::new(File::create(Checkpoint::metadata_path(stem))?);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Reads and version-checks the metadata without touching the parameters.
    pub fn read<P: AsRef<Path>>(stem: P) -> Result<Checkpoint, CheckpointError> {
        let reader = BufReader::new(File::open(Checkpoint::metadata_path(stem))?);
        let checkpoint: Checkpoint = bincode::deserialize_from(reader)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(checkpoint)
    }

    /// Validates the checkpoint against `expected` and loads its parameters into `vs`.
    pub fn load<P: AsRef<Path>>(
        stem: P,
        vs: &mut nn::VarStore,
        expected: &NetworkConfig,
    ) -> Result<Checkpoint, CheckpointError> {
        let stem = stem.as_ref();
        let checkpoint = Checkpoint::read(stem)?;
        if checkpoint.network != *expected {
            return Err(CheckpointError::ArchitectureMismatch {
                expected: *expected,
                found: checkpoint.network,
            });
        }

        let parameters = Checkpoint::parameters_path(stem);
        if !parameters.is_file() {
            return Err(CheckpointError::MissingParameters(parameters));
        }
        vs.load(&parameters)?;
        tracing::info!("Loaded checkpoint {} (epoch {})", stem.display(), checkpoint.epoch);
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use tch::{Device, Kind, Tensor};
    use tempfile::TempDir;
    use crate::network::{ChessNet, PolicyValueNetwork};
    use super::*;

    const SMALL: NetworkConfig = NetworkConfig { num_res_blocks: 1, num_filters: 8 };

    fn checkpoint(network: NetworkConfig) -> Checkpoint {
        Checkpoint::new(
            3,
            network,
            OptimizerState { learning_rate: 1e-3, weight_decay: 1e-4, steps: 120 },
            SchedulerState { base_lr: 1e-3, step_size: 5, gamma: 0.1, last_epoch: 3 },
            2.5,
        )
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let stem = dir.path().join("checkpoints").join("model_epoch_3");
        let net = ChessNet::new(Device::Cpu, &SMALL);
        let saved = checkpoint(SMALL);
        saved.save(&net.vs, &stem).unwrap();

        assert!(Checkpoint::metadata_path(&stem).is_file());
        assert!(Checkpoint::parameters_path(&stem).is_file());

        let mut restored = ChessNet::new(Device::Cpu, &SMALL);
        let loaded = Checkpoint::load(&stem, &mut restored.vs, &SMALL).unwrap();
        assert_eq!(loaded, saved);

        let original = net.vs.variables();
        for (name, tensor) in restored.vs.variables() {
            assert!(tensor.allclose(&original[&name], 0., 0., false), "{} differs", name);
        }

        let input = Tensor::rand([2, 14, 8, 8], (Kind::Float, Device::Cpu));
        let (value_a, policy_a) = net.forward_t(&input, false);
        let (value_b, policy_b) = restored.forward_t(&input, false);
        assert!(value_a.allclose(&value_b, 1e-6, 1e-6, false));
        assert!(policy_a.allclose(&policy_b, 1e-6, 1e-6, false));
    }

    #[test]
    fn test_architecture_mismatch() {
        let dir = TempDir::new().unwrap();
        let stem = dir.path().join("model");
        let net = ChessNet::new(Device::Cpu, &SMALL);
        checkpoint(SMALL).save(&net.vs, &stem).unwrap();

        let other = NetworkConfig { num_res_blocks: 2, num_filters: 8 };
        let mut bigger = ChessNet::new(Device::Cpu, &other);
        let result = Checkpoint::load(&stem, &mut bigger.vs, &other);
        assert!(matches!(result, Err(CheckpointError::ArchitectureMismatch { .. })));
    }

    #[test]
    fn test_missing_parameters() {
        let dir = TempDir::new().unwrap();
        let stem = dir.path().join("model");
        let mut net = ChessNet::new(Device::Cpu, &SMALL);
        checkpoint(SMALL).save(&net.vs, &stem).unwrap();
        fs::remove_file(Checkpoint::parameters_path(&stem)).unwrap();

        let result = Checkpoint::load(&stem, &mut net.vs, &SMALL);
        assert!(matches!(result, Err(CheckpointError::MissingParameters(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let stem = dir.path().join("model");
        let mut stale = checkpoint(SMALL);
        stale.version = CHECKPOINT_VERSION + 1;
        let writer = BufWriter::new(File::create(Checkpoint::metadata_path(&stem)).unwrap());
        bincode::serialize_into(writer, &stale).unwrap();

        assert!(matches!(Checkpoint::read(&stem), Err(CheckpointError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_paths_keep_dotted_stems() {
        let stem = Path::new("runs/v1.2/model_epoch_1");
        assert_eq!(Checkpoint::metadata_path(stem), PathBuf::from("runs/v1.2/model_epoch_1.meta"));
        assert_eq!(Checkpoint::parameters_path(stem), PathBuf::from("runs/v1.2/model_epoch_1.safetensors"));
    }
}

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FILTERED_ARCHIVE_NAME: &str = "lichess_games_filtered.pgn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the binaries need to know, passed explicitly to the components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub training: TrainingConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads the file when given, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Directory layout under a single storage root:
///
/// ```text
/// <root>/games/YYYY-MM/lichess_games_filtered.pgn
/// <root>/checkpoints/model_epoch_{n}.{meta,safetensors}
/// <root>/models/
/// <root>/data/
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig { root: PathBuf::from("ChessAI") }
    }
}

impl StorageConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> StorageConfig {
        StorageConfig { root: root.into() }
    }

    pub fn games_dir(&self) -> PathBuf {
        self.root.join("games")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [self.games_dir(), self.checkpoints_dir(), self.models_dir(), self.data_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn month_archive(&self, month: &str) -> PathBuf {
        self.games_dir().join(month).join(FILTERED_ARCHIVE_NAME)
    }

    /// `YYYY-MM` directories under `games/` that hold a filtered archive, oldest first.
    pub fn downloaded_months(&self) -> io::Result<Vec<String>> {
        let games_dir = self.games_dir();
        if !games_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut months = Vec::new();
        for entry in fs::read_dir(&games_dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if entry.path().is_dir() && is_month_name(&name) && self.month_archive(&name).is_file() {
                months.push(name);
            }
        }
        months.sort();
        Ok(months)
    }

    pub fn monthly_archives(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .downloaded_months()?
            .iter()
            .map(|month| self.month_archive(month))
            .collect())
    }

    pub fn checkpoint_stem(&self, epoch: u64) -> PathBuf {
        self.checkpoints_dir().join(format!("model_epoch_{epoch}"))
    }

    pub fn model_stem(&self, name: &str) -> PathBuf {
        self.models_dir().join(name)
    }

    pub fn index_cache_path(&self) -> PathBuf {
        self.data_dir().join("game_index.bin")
    }
}

fn is_month_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes.iter().enumerate().all(|(i, b)| i == 4 || b.is_ascii_digit())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub num_res_blocks: usize,
    pub num_filters: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            num_res_blocks: 8,
            num_filters: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub epochs: u64,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// Epochs between learning rate decays.
    pub lr_step: u64,
    pub lr_gamma: f64,
    pub num_workers: usize,
    pub save_every: u64,
    pub max_positions: Option<usize>,
    pub shuffle_buffer: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            batch_size: 256,
            epochs: 10,
            learning_rate: 1e-3,
            weight_decay: 1e-4,
            lr_step: 5,
            lr_gamma: 0.1,
            num_workers: 4,
            save_every: 1,
            max_positions: None,
            shuffle_buffer: 0,
            seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.root, PathBuf::from("ChessAI"));
        assert_eq!(config.network.num_res_blocks, 8);
        assert_eq!(config.network.num_filters, 256);
        assert_eq!(config.training.batch_size, 256);
        assert_eq!(config.training.lr_step, 5);
        assert_eq!(config.training.max_positions, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "training": { "epochs": 3 }, "storage": { "root": "/data" } }"#).unwrap();
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 256);
        assert_eq!(config.storage.checkpoints_dir(), PathBuf::from("/data/checkpoints"));
        assert_eq!(config.network, NetworkConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.network.num_res_blocks = 2;
        config.training.max_positions = Some(1000);

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        assert!(matches!(Config::load(dir.path().join("missing.json")), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_downloaded_months() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::new(dir.path());
        storage.ensure_dirs().unwrap();

        for month in ["2024-02", "2023-11", "2024-01"] {
            fs::create_dir_all(storage.games_dir().join(month)).unwrap();
        }
        fs::write(storage.month_archive("2024-02"), "").unwrap();
        fs::write(storage.month_archive("2023-11"), "").unwrap();
        fs::create_dir_all(storage.games_dir().join("misc")).unwrap();
        fs::write(storage.games_dir().join("misc").join(FILTERED_ARCHIVE_NAME), "").unwrap();

        assert_eq!(storage.downloaded_months().unwrap(), ["2023-11", "2024-02"]);
        assert_eq!(
            storage.monthly_archives().unwrap(),
            [storage.month_archive("2023-11"), storage.month_archive("2024-02")],
        );
    }

    #[test]
    fn test_paths() {
        let storage = StorageConfig::new("/mnt/chess");
        assert_eq!(storage.checkpoint_stem(3), PathBuf::from("/mnt/chess/checkpoints/model_epoch_3"));
        assert_eq!(storage.index_cache_path(), PathBuf::from("/mnt/chess/data/game_index.bin"));
        assert!(is_month_name("2024-12"));
        assert!(!is_month_name("2024_12"));
        assert!(!is_month_name("24-12"));
    }
}

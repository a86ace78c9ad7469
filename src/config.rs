//! Central configuration for fillscan analysis stages.
//!
//! Loads from `config.toml` at the project root.
//! All tuning parameters are runtime-configurable — no recompilation needed.

use serde::Deserialize;
use std::path::Path;

/// Trading-session bounds used by the quote-annotation stage.
/// Fills and quotes outside these bounds are excluded.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session open hour (24h clock)
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    /// Session open minute
    #[serde(default = "default_open_minute")]
    pub open_minute: u32,
    /// Session close hour (24h clock); the close minute itself is included
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
    /// Session close minute
    #[serde(default)]
    pub close_minute: u32,
}

fn default_open_hour() -> u32 {
    9
}
fn default_open_minute() -> u32 {
    30
}
fn default_close_hour() -> u32 {
    16
}

/// Per-venue model training parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Minimum annotated fills required to train a venue model
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Fraction of each venue's rows held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// L2 regularization strength for the ridge fit
    #[serde(default = "default_ridge_lambda")]
    pub ridge_lambda: f64,
    /// Seed for the train/test shuffle
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_min_samples() -> usize {
    50
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_ridge_lambda() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the default location (project root config.toml).
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            if let Ok(cfg) = Self::load(Path::new(path)) {
                tracing::info!("Loaded config from {}", path);
                return cfg;
            }
        }

        tracing::debug!("No config.toml found, using defaults");
        Self::default()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_hour: 9,
            open_minute: 30,
            close_hour: 16,
            close_minute: 0,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            test_fraction: 0.2,
            ridge_lambda: 1.0,
            seed: 42,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

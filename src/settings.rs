use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub compact_interval_secs: u64,
    /// Default look-ahead for free-window suggestions, in days.
    pub suggestion_days: u32,
    /// `tracing_subscriber` filter directive.
    pub log: String,
}

impl Settings {
    /// Load from `CLUBBOOK_*` variables, after reading a `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::build(Environment::with_prefix("CLUBBOOK"))
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(env.prefix_separator("_").try_parsing(true))
            .set_default("data_dir", "./data")?
            .set_default("compact_threshold", 1000)?
            .set_default("compact_interval_secs", 60)?
            .set_default("suggestion_days", 14)?
            .set_default("log", "info")?
            .build()?;

        config.try_deserialize()
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("club.wal")
    }

    pub fn compact_interval(&self) -> Duration {
        Duration::from_secs(self.compact_interval_secs.max(1))
    }
}

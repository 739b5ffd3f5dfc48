use crate::error::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_positive_terms() -> PathBuf {
    "terms/positive.xml".into()
}

fn default_negative_terms() -> PathBuf {
    "terms/negative.xml".into()
}

fn default_store_root() -> PathBuf {
    "./data".into()
}

fn default_lob_root() -> PathBuf {
    "./bills".into()
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn default_batch_size() -> usize {
    64
}

/// Run settings, read from an optional TOML file and `BILLRANK__*` variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_positive_terms")]
    pub positive_terms: PathBuf,
    #[serde(default = "default_negative_terms")]
    pub negative_terms: PathBuf,
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    #[serde(default = "default_lob_root")]
    pub lob_root: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Legislative session, e.g. "17-18"; derived from today's date when unset.
    #[serde(default)]
    pub biennium: Option<String>,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(config::Environment::with_prefix("BILLRANK").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn session(&self) -> String {
        self.biennium.clone().unwrap_or_else(crate::measure::current_leg_session)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            positive_terms: default_positive_terms(),
            negative_terms: default_negative_terms(),
            store_root: default_store_root(),
            lob_root: default_lob_root(),
            workers: default_workers(),
            batch_size: default_batch_size(),
            biennium: None,
        }
    }
}

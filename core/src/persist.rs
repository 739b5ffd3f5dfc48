use crate::error::{RankError, Result};
use crate::ranker::RankSummary;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const META_VERSION: u32 = 1;

/// What the last bulk ranking run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub last_run_at: String,
    pub session: String,
    pub scored: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub version: u32,
}

impl RunMeta {
    pub fn from_summary(summary: &RankSummary, session: impl Into<String>) -> Self {
        let last_run_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            last_run_at,
            session: session.into(),
            scored: summary.scored(),
            skipped: summary.skipped(),
            cancelled: summary.cancelled,
            version: META_VERSION,
        }
    }
}

/// Files under the store root.
pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn bills_db(&self) -> PathBuf { self.root.join("bills.sled") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn save_meta(paths: &StorePaths, meta: &RunMeta) -> Result<()> {
    create_dir_all(&paths.root).map_err(|e| persistence(&paths.meta(), e))?;
    let mut f = File::create(paths.meta()).map_err(|e| persistence(&paths.meta(), e))?;
    let json = serde_json::to_string_pretty(meta).map_err(|e| persistence(&paths.meta(), e))?;
    f.write_all(json.as_bytes()).map_err(|e| persistence(&paths.meta(), e))?;
    Ok(())
}

/// `None` until the first bulk run has completed.
pub fn load_meta(paths: &StorePaths) -> Result<Option<RunMeta>> {
    let mut f = match File::open(paths.meta()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence(&paths.meta(), e)),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf).map_err(|e| persistence(&paths.meta(), e))?;
    let meta: RunMeta = serde_json::from_str(&buf).map_err(|e| persistence(&paths.meta(), e))?;
    Ok(Some(meta))
}

fn persistence(path: &Path, err: impl std::fmt::Display) -> RankError {
    RankError::Persistence(format!("{}: {err}", path.display()))
}

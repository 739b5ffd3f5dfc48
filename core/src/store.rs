//! Bill rows and the store that holds them.

use crate::error::{RankError, Result};
use crate::measure::MeasureId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRow {
    pub measure: MeasureId,
    /// e.g. 201720180AB1
    pub bill_id: String,
    /// Latest version id, e.g. 20170AB199INT
    pub bill_version_id: String,
    /// Lob file path, relative to the store's lob root
    pub lob_path: String,
    pub author: String,
    pub title: String,
    pub positive_score: i64,
    pub negative_score: i64,
    /// Version that was current when the scores were last written.
    pub ranked_version: Option<String>,
}

impl BillRow {
    pub fn new(measure: MeasureId, bill_version_id: impl Into<String>, lob_path: impl Into<String>) -> Self {
        Self {
            measure,
            bill_id: String::new(),
            bill_version_id: bill_version_id.into(),
            lob_path: lob_path.into(),
            author: String::new(),
            title: String::new(),
            positive_score: 0,
            negative_score: 0,
            ranked_version: None,
        }
    }

    /// Scores are stale when the current version has never been ranked.
    pub fn needs_ranking(&self) -> bool {
        self.ranked_version.as_deref() != Some(self.bill_version_id.as_str())
    }

    /// Take descriptive fields from `incoming`, keeping this row's scores.
    fn refresh_from(&mut self, incoming: BillRow) {
        let BillRow { bill_id, bill_version_id, lob_path, author, title, .. } = incoming;
        if !bill_id.is_empty() { self.bill_id = bill_id; }
        if !bill_version_id.is_empty() { self.bill_version_id = bill_version_id; }
        if !lob_path.is_empty() { self.lob_path = lob_path; }
        if !author.is_empty() { self.author = author; }
        if !title.is_empty() { self.title = title; }
    }

    fn apply(&mut self, result: &RankingResult) {
        self.positive_score = result.positive_score;
        self.negative_score = result.negative_score;
        self.ranked_version = Some(self.bill_version_id.clone());
    }
}

/// The scores produced for one bill by one ranking pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingResult {
    pub measure: MeasureId,
    pub positive_score: i64,
    pub negative_score: i64,
}

/// Which bills a ranking pass should visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillFilter {
    All,
    Single(MeasureId),
    /// Bills whose current version has not been ranked yet.
    Changed,
}

impl BillFilter {
    pub fn selects(&self, row: &BillRow) -> bool {
        match self {
            Self::All => true,
            Self::Single(measure) => &row.measure == measure,
            Self::Changed => row.needs_ranking(),
        }
    }
}

/// Where bill rows live and where their text is read from.
///
/// `write_score` must replace both scores of one bill in a single atomic update.
pub trait BillStore: Send + Sync {
    fn read_bill_text(&self, lob_path: &str) -> Result<Vec<u8>>;
    fn write_score(&self, result: &RankingResult) -> Result<()>;
    /// Selected rows, ordered by measure.
    fn bills_to_rank(&self, filter: &BillFilter) -> Result<Vec<BillRow>>;
    fn get_bill(&self, measure: &MeasureId) -> Result<Option<BillRow>>;
    /// Insert a row, or refresh an existing row's descriptive fields while keeping its scores.
    fn upsert_bill(&self, row: BillRow) -> Result<()>;
}

fn read_lob(lob_root: &Path, lob_path: &str) -> Result<Vec<u8>> {
    let path = lob_root.join(lob_path);
    fs::read(&path).map_err(|source| RankError::BillTextUnavailable { path, source })
}

fn missing_row(measure: &MeasureId) -> RankError {
    RankError::Persistence(format!("no bill row for {measure}"))
}

/// Embedded store: bincode-encoded rows in a sled tree keyed by `AB_12`.
pub struct SledBillStore {
    db: sled::Db,
    bills: sled::Tree,
    lob_root: PathBuf,
}

impl SledBillStore {
    pub fn open(db_path: impl AsRef<Path>, lob_root: impl Into<PathBuf>) -> Result<Self> {
        let db = sled::open(db_path.as_ref())?;
        let bills = db.open_tree("bills")?;
        Ok(Self { db, bills, lob_root: lob_root.into() })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<BillRow> {
        Ok(bincode::deserialize(bytes)?)
    }
}

impl BillStore for SledBillStore {
    fn read_bill_text(&self, lob_path: &str) -> Result<Vec<u8>> {
        read_lob(&self.lob_root, lob_path)
    }

    fn write_score(&self, result: &RankingResult) -> Result<()> {
        let key = result.measure.storage_key();
        let mut codec_error = None;
        // update_and_fetch retries the closure on contention, so the row is swapped whole.
        let updated = self.bills.update_and_fetch(key.as_bytes(), |old| {
            let old = old?;
            match bincode::deserialize::<BillRow>(old) {
                Ok(mut row) => {
                    row.apply(result);
                    match bincode::serialize(&row) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            codec_error = Some(e);
                            Some(old.to_vec())
                        }
                    }
                }
                Err(e) => {
                    codec_error = Some(e);
                    Some(old.to_vec())
                }
            }
        })?;
        if let Some(e) = codec_error {
            return Err(e.into());
        }
        if updated.is_none() {
            return Err(missing_row(&result.measure));
        }
        Ok(())
    }

    fn bills_to_rank(&self, filter: &BillFilter) -> Result<Vec<BillRow>> {
        if let BillFilter::Single(measure) = filter {
            return Ok(self.get_bill(measure)?.into_iter().collect());
        }
        let mut rows = Vec::new();
        for entry in self.bills.iter() {
            let (_, value) = entry?;
            let row = Self::decode(&value)?;
            if filter.selects(&row) {
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.measure.cmp(&b.measure));
        Ok(rows)
    }

    fn get_bill(&self, measure: &MeasureId) -> Result<Option<BillRow>> {
        self.bills
            .get(measure.storage_key().as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn upsert_bill(&self, row: BillRow) -> Result<()> {
        let key = row.measure.storage_key();
        let mut codec_error = None;
        // Merged inside update_and_fetch so a concurrent write_score is never rolled back.
        self.bills.update_and_fetch(key.as_bytes(), |old| {
            codec_error = None;
            let merged = match old.map(|bytes| bincode::deserialize::<BillRow>(bytes)) {
                Some(Ok(mut existing)) => {
                    existing.refresh_from(row.clone());
                    existing
                }
                Some(Err(e)) => {
                    codec_error = Some(e);
                    return old.map(<[u8]>::to_vec);
                }
                None => row.clone(),
            };
            match bincode::serialize(&merged) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    codec_error = Some(e);
                    old.map(<[u8]>::to_vec)
                }
            }
        })?;
        match codec_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// In-process store for tests and dry runs.
#[derive(Default)]
pub struct MemoryBillStore {
    rows: RwLock<BTreeMap<MeasureId, BillRow>>,
    texts: RwLock<BTreeMap<String, Vec<u8>>>,
    lob_root: Option<PathBuf>,
}

impl MemoryBillStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read lob files from disk under `lob_root` instead of from memory.
    pub fn with_lob_root(lob_root: impl Into<PathBuf>) -> Self {
        Self { lob_root: Some(lob_root.into()), ..Self::default() }
    }

    pub fn put_text(&self, lob_path: impl Into<String>, text: impl Into<Vec<u8>>) {
        self.texts.write().insert(lob_path.into(), text.into());
    }

    pub fn remove_text(&self, lob_path: &str) {
        self.texts.write().remove(lob_path);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl BillStore for MemoryBillStore {
    fn read_bill_text(&self, lob_path: &str) -> Result<Vec<u8>> {
        if let Some(root) = &self.lob_root {
            return read_lob(root, lob_path);
        }
        self.texts.read().get(lob_path).cloned().ok_or_else(|| RankError::BillTextUnavailable {
            path: PathBuf::from(lob_path),
            source: std::io::Error::new(ErrorKind::NotFound, "no such lob"),
        })
    }

    fn write_score(&self, result: &RankingResult) -> Result<()> {
        let mut rows = self.rows.write();
        let row = rows.get_mut(&result.measure).ok_or_else(|| missing_row(&result.measure))?;
        row.apply(result);
        Ok(())
    }

    fn bills_to_rank(&self, filter: &BillFilter) -> Result<Vec<BillRow>> {
        Ok(self.rows.read().values().filter(|row| filter.selects(row)).cloned().collect())
    }

    fn get_bill(&self, measure: &MeasureId) -> Result<Option<BillRow>> {
        Ok(self.rows.read().get(measure).cloned())
    }

    fn upsert_bill(&self, row: BillRow) -> Result<()> {
        let mut rows = self.rows.write();
        match rows.get_mut(&row.measure) {
            Some(existing) => existing.refresh_from(row),
            None => {
                rows.insert(row.measure.clone(), row);
            }
        }
        Ok(())
    }
}

//! Persistent reconciliation ledger.
//!
//! # Invariants
//!
//! - **Unique key**: at most one record per `content_hash`.
//! - **Stable order**: records keep their first-insertion position; updates
//!   replace in place.
//! - **Never deleted**: nothing in this module removes a record.
//! - **Refresh, not union**: [`StateTable::merge`] only updates keys the base
//!   already holds. New items must be seeded with
//!   [`StateTable::seed_defaults`] before their results can land.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::StateFileError;
use crate::types::{
    parse_bool, parse_tri, render_tri, ReconciliationState, STATE_COLUMNS,
    STATE_COL_ARCHIVE_CHECKED, STATE_COL_DISK_CHECKED, STATE_COL_DOWNLOADED_OK, STATE_COL_HASH,
    STATE_COL_PATH, STATE_COL_VALID_IN_ARCHIVE, STATE_COL_VALID_ON_DISK,
};

/// Older ledgers used these column names; they load as their current equivalents.
const LEGACY_COLUMN_ALIASES: &[(&str, &str)] = &[
    ("did_download", STATE_COL_DOWNLOADED_OK),
    ("did_check_archive", STATE_COL_ARCHIVE_CHECKED),
    ("did_check_disk", STATE_COL_DISK_CHECKED),
];

/// Ordered mapping `content_hash -> ReconciliationState`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateTable {
    records: Vec<ReconciliationState>,
    index: HashMap<String, usize>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records; a repeated key replaces the earlier record in place.
    pub fn from_records(records: impl IntoIterator<Item = ReconciliationState>) -> Self {
        let mut t = Self::new();
        for r in records {
            t.upsert(r);
        }
        t
    }

    /// Insert or replace by key. Returns `true` if the key was new.
    pub fn upsert(&mut self, record: ReconciliationState) -> bool {
        match self.index.get(&record.content_hash) {
            Some(&i) => {
                self.records[i] = record;
                false
            }
            None => {
                self.index
                    .insert(record.content_hash.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    pub fn get(&self, content_hash: &str) -> Option<&ReconciliationState> {
        self.index.get(content_hash).map(|&i| &self.records[i])
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        self.index.contains_key(content_hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconciliationState> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ReconciliationState] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ReconciliationState> {
        self.records
    }

    /// Append an unseen-default record for every hash not yet present.
    /// Returns how many were added.
    pub fn seed_defaults<'a>(&mut self, hashes: impl IntoIterator<Item = &'a str>) -> usize {
        let mut added = 0;
        for h in hashes {
            if !self.contains(h) && self.upsert(ReconciliationState::unseen(h)) {
                added += 1;
            }
        }
        added
    }

    /// Right-biased refresh keyed by `content_hash`.
    ///
    /// For every base record, the **last** incoming record with the same key
    /// replaces it wholesale; base records without a match are kept. Output
    /// order is base order. Keys present only in `incoming` are dropped.
    pub fn merge(&self, incoming: &[ReconciliationState]) -> StateTable {
        let mut latest: HashMap<&str, &ReconciliationState> = HashMap::new();
        for r in incoming {
            latest.insert(r.content_hash.as_str(), r);
        }

        let merged: Vec<ReconciliationState> = self
            .records
            .iter()
            .map(|base| match latest.get(base.content_hash.as_str()) {
                Some(newer) => (*newer).clone(),
                None => base.clone(),
            })
            .collect();

        StateTable {
            index: self.index.clone(),
            records: merged,
        }
    }

    // -----------------------------------------------------------------------
    // CSV
    // -----------------------------------------------------------------------

    /// Parse a ledger. Only the hash column is required; missing flag
    /// columns take their unseen defaults. Rows with a blank hash are skipped.
    pub fn read_from<R: io::Read>(rdr: R) -> Result<Self, StateFileError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(rdr);

        let headers = rdr
            .headers()
            .map_err(|e| StateFileError::Io(format!("read ledger header: {e}")))?
            .clone();
        let cols = column_index(&headers);
        let hash_i = *cols
            .get(STATE_COL_HASH)
            .ok_or_else(|| StateFileError::MissingColumn(STATE_COL_HASH.to_string()))?;

        let mut table = StateTable::new();
        for (n, rec) in rdr.records().enumerate() {
            let row = n + 2; // 1-based, header = 1
            let rec = rec.map_err(|e| StateFileError::Io(format!("read ledger row {row}: {e}")))?;

            let hash = rec.get(hash_i).unwrap_or("").to_string();
            if hash.is_empty() {
                continue;
            }

            let mut st = ReconciliationState::unseen(hash);
            let raw = |name: &str| cols.get(name).and_then(|&i| rec.get(i));

            if let Some(p) = raw(STATE_COL_PATH) {
                st.path = p.to_string();
            }
            if let Some(v) = raw(STATE_COL_DOWNLOADED_OK) {
                st.downloaded_ok = parse_tri(v).ok_or_else(|| bad(row, STATE_COL_DOWNLOADED_OK, v))?;
            }
            for (name, slot) in [
                (STATE_COL_VALID_ON_DISK, &mut st.valid_on_disk),
                (STATE_COL_VALID_IN_ARCHIVE, &mut st.valid_in_archive),
                (STATE_COL_ARCHIVE_CHECKED, &mut st.archive_checked),
                (STATE_COL_DISK_CHECKED, &mut st.disk_checked),
            ] {
                if let Some(v) = raw(name) {
                    // Blank keeps the default rather than guessing.
                    if !v.is_empty() {
                        *slot = parse_bool(v).ok_or_else(|| bad(row, name, v))?;
                    }
                }
            }

            table.upsert(st);
        }
        Ok(table)
    }

    pub fn write_to<W: io::Write>(&self, w: W) -> Result<(), StateFileError> {
        let mut wtr = csv::Writer::from_writer(w);
        let io_err = |e: csv::Error| StateFileError::Io(format!("write ledger: {e}"));

        wtr.write_record(STATE_COLUMNS).map_err(io_err)?;
        for r in &self.records {
            wtr.write_record([
                r.path.as_str(),
                r.content_hash.as_str(),
                render_tri(r.downloaded_ok),
                bool_str(r.valid_on_disk),
                bool_str(r.valid_in_archive),
                bool_str(r.archive_checked),
                bool_str(r.disk_checked),
            ])
            .map_err(io_err)?;
        }
        wtr.flush()
            .map_err(|e| StateFileError::Io(format!("flush ledger: {e}")))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StateFileError> {
        let file = std::fs::File::open(path)
            .map_err(|e| StateFileError::Io(format!("open '{}': {e}", path.display())))?;
        let t = Self::read_from(io::BufReader::new(file))?;
        debug!(path = %path.display(), records = t.len(), "ledger loaded");
        Ok(t)
    }

    /// `Ok(None)` when no ledger exists yet (first run).
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>, StateFileError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Write to a temp file in the destination directory, fsync, then rename
    /// over `path`. Readers see either the old ledger or the new one.
    pub fn save_atomic(&self, path: &Path) -> Result<(), StateFileError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| StateFileError::Io(format!("create temp in '{}': {e}", dir.display())))?;

        self.write_to(tmp.as_file_mut())?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| StateFileError::Io(format!("sync ledger temp: {e}")))?;
        tmp.persist(path)
            .map_err(|e| StateFileError::Io(format!("replace '{}': {}", path.display(), e.error)))?;

        debug!(path = %path.display(), records = self.len(), "ledger saved");
        Ok(())
    }
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

fn bad(row: usize, field: &str, raw: &str) -> StateFileError {
    StateFileError::ParseField {
        row,
        field: field.to_string(),
        raw: raw.to_string(),
    }
}

/// Lower-cased header -> column index, with legacy names folded in.
/// Current names win when both spellings are present.
fn column_index(headers: &csv::StringRecord) -> HashMap<String, usize> {
    let mut cols: HashMap<String, usize> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        cols.entry(h.trim().to_ascii_lowercase()).or_insert(i);
    }
    for (legacy, current) in LEGACY_COLUMN_ALIASES {
        if let Some(&i) = cols.get(*legacy) {
            cols.entry((*current).to_string()).or_insert(i);
        }
    }
    cols
}

//! Candidate list loading and `field=value` selection.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::StateFileError;
use crate::table::StateTable;
use crate::types::{is_content_hash, Item};

/// One row of the candidate list: the item plus every column as a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub item: Item,
    pub fields: BTreeMap<String, String>,
}

/// Load candidates from a CSV file. `hash_column` is required; a missing
/// `name_column` leaves every remote name empty.
pub fn load_candidates(
    path: &Path,
    hash_column: &str,
    name_column: &str,
) -> Result<Vec<Candidate>, StateFileError> {
    let file = std::fs::File::open(path)
        .map_err(|e| StateFileError::Io(format!("open candidates '{}': {e}", path.display())))?;
    let out = read_candidates(io::BufReader::new(file), hash_column, name_column)?;
    debug!(path = %path.display(), candidates = out.len(), "candidates loaded");
    Ok(out)
}

/// Rows with a blank or malformed hash are skipped; for repeated hashes the first row wins.
pub fn read_candidates<R: io::Read>(
    rdr: R,
    hash_column: &str,
    name_column: &str,
) -> Result<Vec<Candidate>, StateFileError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(rdr);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| StateFileError::Io(format!("read candidates header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let hash_i = headers
        .iter()
        .position(|h| h == hash_column)
        .ok_or_else(|| StateFileError::MissingColumn(hash_column.to_string()))?;
    let name_i = headers.iter().position(|h| h == name_column);

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (n, rec) in rdr.records().enumerate() {
        let row = n + 2;
        let rec =
            rec.map_err(|e| StateFileError::Io(format!("read candidates row {row}: {e}")))?;

        let hash = rec.get(hash_i).unwrap_or("");
        if hash.is_empty() {
            warn!(row, column = hash_column, "candidate row without hash skipped");
            continue;
        }
        if !is_content_hash(hash) {
            warn!(row, hash, "candidate hash is not 32 hex digits; skipped");
            continue;
        }
        if !seen.insert(hash.to_string()) {
            debug!(row, hash, "duplicate candidate ignored");
            continue;
        }

        let remote = name_i.and_then(|i| rec.get(i)).unwrap_or("");
        let fields = headers
            .iter()
            .zip(rec.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        out.push(Candidate {
            item: Item::new(hash, remote),
            fields,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// `field=value` equality filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub field: String,
    pub value: String,
}

impl Selector {
    /// Splits on the first `=`; the field must be non-empty, the value may be.
    pub fn parse(raw: &str) -> Result<Self, StateFileError> {
        match raw.split_once('=') {
            Some((field, value)) if !field.trim().is_empty() => Ok(Self {
                field: field.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(StateFileError::BadFilter(raw.to_string())),
        }
    }

    /// Candidate column first, then the item's ledger field. Unknown fields
    /// match nothing.
    pub fn matches(&self, candidate: &Candidate, table: &StateTable) -> bool {
        if let Some(v) = candidate.fields.get(&self.field) {
            return *v == self.value;
        }
        table
            .get(&candidate.item.content_hash)
            .and_then(|st| st.field(&self.field))
            .is_some_and(|v| v == self.value)
    }
}

/// Keep candidates matching **every** selector, in input order.
pub fn select(
    candidates: Vec<Candidate>,
    selectors: &[Selector],
    table: &StateTable,
) -> Vec<Candidate> {
    if selectors.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| selectors.iter().all(|s| s.matches(c, table)))
        .collect()
}

//! amr-state
//!
//! Item identity, the per-item reconciliation record, the persistent ledger
//! and candidate list loading. Pure data plus CSV I/O; nothing here touches
//! the network.

mod candidates;
mod error;
mod table;
mod types;

pub use candidates::{load_candidates, read_candidates, select, Candidate, Selector};
pub use error::StateFileError;
pub use table::StateTable;
pub use types::{
    is_content_hash, Item, ReconciliationState, CONTENT_HASH_LEN, STATE_COLUMNS,
    STATE_COL_ARCHIVE_CHECKED, STATE_COL_DISK_CHECKED,
    STATE_COL_DOWNLOADED_OK, STATE_COL_HASH, STATE_COL_PATH, STATE_COL_VALID_IN_ARCHIVE,
    STATE_COL_VALID_ON_DISK,
};

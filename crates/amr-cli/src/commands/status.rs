use std::path::Path;

use amr_state::StateTable;
use anyhow::{Context, Result};

/// Per-flag counts over a ledger.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCounts {
    pub total: usize,
    pub verified: usize,
    pub downloaded_ok: usize,
    pub download_failed: usize,
    pub never_downloaded: usize,
    pub disk_checked: usize,
    pub archive_checked: usize,
    pub invalid_in_archive: usize,
}

impl LedgerCounts {
    pub fn tally(table: &StateTable) -> Self {
        let mut c = LedgerCounts {
            total: table.len(),
            ..LedgerCounts::default()
        };
        for r in table.iter() {
            c.verified += usize::from(r.is_verified());
            match r.downloaded_ok {
                Some(true) => c.downloaded_ok += 1,
                Some(false) => c.download_failed += 1,
                None => c.never_downloaded += 1,
            }
            c.disk_checked += usize::from(r.disk_checked);
            c.archive_checked += usize::from(r.archive_checked);
            c.invalid_in_archive += usize::from(r.archive_checked && !r.valid_in_archive);
        }
        c
    }

    pub fn print(&self) {
        println!("total={}", self.total);
        println!("verified={}", self.verified);
        println!("downloaded_ok={}", self.downloaded_ok);
        println!("download_failed={}", self.download_failed);
        println!("never_downloaded={}", self.never_downloaded);
        println!("disk_checked={}", self.disk_checked);
        println!("archive_checked={}", self.archive_checked);
        println!("invalid_in_archive={}", self.invalid_in_archive);
    }
}

pub fn run(state_path: &Path) -> Result<LedgerCounts> {
    let table = StateTable::load(state_path)
        .with_context(|| format!("read ledger: {}", state_path.display()))?;
    Ok(LedgerCounts::tally(&table))
}

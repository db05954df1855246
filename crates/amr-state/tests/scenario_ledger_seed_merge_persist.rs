//! scenario_ledger_seed_merge_persist
//!
//! The driver's ledger lifecycle, without the network.
//!
//! # Coverage
//! 1. First run: no ledger file, candidates seeded, results merged, saved.
//! 2. Second run: existing records keep their position, new candidates are
//!    appended, stale items survive untouched.
//! 3. Saving over an existing ledger leaves no temp files behind.

use amr_state::{ReconciliationState, StateTable};

fn done(hash: &str, path: &str) -> ReconciliationState {
    ReconciliationState {
        path: path.to_string(),
        downloaded_ok: Some(true),
        valid_on_disk: true,
        disk_checked: true,
        ..ReconciliationState::unseen(hash)
    }
}

#[test]
fn ledger_lifecycle_across_two_runs() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("downloaded_candidates.csv");

    // Run 1.
    assert!(StateTable::load_if_exists(&ledger).unwrap().is_none());
    let mut base = StateTable::new();
    base.seed_defaults(["h1", "h2"]);
    let merged = base.merge(&[done("h2", "/c/h2_b"), done("h1", "/c/h1_a")]);
    merged.save_atomic(&ledger).unwrap();

    // Run 2: h1 dropped from the candidate list, h3 is new.
    let mut base = StateTable::load_if_exists(&ledger).unwrap().unwrap();
    assert_eq!(base, merged);
    assert_eq!(base.seed_defaults(["h2", "h3"]), 1);
    let merged = base.merge(&[done("h3", "/c/h3_c")]);
    merged.save_atomic(&ledger).unwrap();

    let back = StateTable::load(&ledger).unwrap();
    let order: Vec<_> = back.iter().map(|r| r.content_hash.as_str()).collect();
    assert_eq!(order, vec!["h1", "h2", "h3"]);
    assert_eq!(back.get("h1").unwrap().path, "/c/h1_a");
    assert!(back.get("h3").unwrap().is_verified());

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "unexpected files: {leftovers:?}");
}

#[test]
fn load_of_missing_ledger_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StateTable::load(&dir.path().join("absent.csv")).unwrap_err();
    assert!(err.to_string().contains("absent.csv"));
}

use assert_cmd::Command;
use predicates::prelude::*;

use amr_state::{ReconciliationState, StateTable};

#[test]
fn status_prints_flag_counts() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("ledger.csv");

    let mut good = ReconciliationState::unseen("aaa");
    good.downloaded_ok = Some(true);
    good.disk_checked = true;
    good.valid_on_disk = true;
    StateTable::from_records([good, ReconciliationState::unseen("bbb")])
        .save_atomic(&ledger)
        .unwrap();

    Command::cargo_bin("amr")
        .unwrap()
        .env_remove("RUST_LOG")
        .arg("status")
        .arg(&ledger)
        .assert()
        .success()
        .stdout(predicate::str::contains("total=2"))
        .stdout(predicate::str::contains("verified=1"))
        .stdout(predicate::str::contains("never_downloaded=1"));
}

#[test]
fn status_of_missing_ledger_fails() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("amr")
        .unwrap()
        .arg("status")
        .arg(dir.path().join("absent.csv"))
        .assert()
        .failure();
}

#[test]
fn config_hash_is_stable_across_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.yaml");
    let b = dir.path().join("b.yaml");
    std::fs::write(&a, "fetch:\n  workers: 8\narchive:\n  read_timeout_secs: 60\n").unwrap();
    std::fs::write(&b, "archive:\n  read_timeout_secs: 60\nfetch:\n  workers: 8\n").unwrap();

    let run = |p: &std::path::Path| {
        let out = Command::cargo_bin("amr")
            .unwrap()
            .arg("config-hash")
            .arg(p)
            .output()
            .unwrap();
        assert!(out.status.success());
        String::from_utf8(out.stdout).unwrap()
    };

    let (sa, sb) = (run(&a), run(&b));
    assert!(sa.starts_with("config_hash="));
    assert_eq!(sa, sb);
}

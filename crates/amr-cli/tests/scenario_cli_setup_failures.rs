//! scenario_cli_setup_failures
//!
//! Setup problems exit nonzero before any download and leave no ledger.
//!
//! # Coverage
//! 1. Missing candidate list.
//! 2. Malformed `--select`.
//! 3. Refused token exchange.
//! 4. Candidate list without the hash column.

use std::path::Path;

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;

const ONE_CANDIDATE: &str = "md5sum,archive_filename\n0cc175b9c0f1b6a831c399e269772661,a.fits\n";

fn amr(workdir: &Path, server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("amr").unwrap();
    cmd.current_dir(workdir)
        .env("AMR_ARCHIVE_URL", server.base_url())
        .env_remove("AMR_ARCHIVE_USER")
        .env_remove("AMR_ARCHIVE_PASS")
        .env_remove("AMR_ARCHIVE_CREDENTIALS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn missing_candidate_list_fails() {
    let server = MockServer::start();
    let work = tempfile::tempdir().unwrap();

    amr(work.path(), &server)
        .args(["fetch", "absent.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("load candidates"));
    assert!(!work.path().join("downloaded_absent.csv").exists());
}

#[test]
fn malformed_selector_fails() {
    let server = MockServer::start();
    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("c.csv"), ONE_CANDIDATE).unwrap();

    amr(work.path(), &server)
        .args(["fetch", "c.csv", "--select", "instrument"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid selector 'instrument'"));
}

#[test]
fn refused_token_fails_before_dispatch() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/get_token/");
        then.status(401).body("bad credentials");
    });
    let retrieve = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body("x");
    });
    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("c.csv"), ONE_CANDIDATE).unwrap();

    amr(work.path(), &server)
        .env("AMR_ARCHIVE_USER", "obs@example.org")
        .env("AMR_ARCHIVE_PASS", "secret-pw")
        .args(["fetch", "c.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("archive authentication failed"))
        .stderr(predicate::str::contains("secret-pw").not());

    assert_eq!(retrieve.hits(), 0);
    assert!(!work.path().join("downloaded_c.csv").exists());
}

#[test]
fn candidate_list_without_hash_column_fails() {
    let server = MockServer::start();
    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("c.csv"), "name\na.fits\n").unwrap();

    amr(work.path(), &server)
        .args(["fetch", "c.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("md5sum"));
}

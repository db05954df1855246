//! amr-testkit
//!
//! In-memory archive double and on-disk fixtures shared by the scenario
//! tests of the reconciliation and CLI crates. Never linked into the binary.

mod archive;
mod fixtures;

pub use archive::FakeArchive;
pub use fixtures::CacheDir;

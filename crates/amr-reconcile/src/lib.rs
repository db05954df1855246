//! amr-reconcile
//!
//! Per-item reconciliation between the local cache and the archive, and the
//! bounded parallel runner that drives a batch of items.
//!
//! - A verified local copy is never re-downloaded and costs no network call.
//! - Archive and I/O failures are folded into the item's state, never raised.
//! - A panicking item becomes a failed record; the batch carries on.

mod engine;
mod runner;
mod types;
pub mod verify;

pub use engine::{plan_pass, reconcile_item};
pub use runner::{run_all, Job};
pub use types::*;

use std::fmt;
use std::str::FromStr;

use amr_state::ReconciliationState;
use serde::Serialize;

/// Steps a pass intends to run, decided once from the prior state and
/// whether the destination exists. Execution may add `check_archive` and
/// `download` as results come in; it never removes a planned step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassPlan {
    pub check_disk: bool,
    pub check_archive: bool,
    pub download: bool,
}

impl PassPlan {
    pub fn is_noop(&self) -> bool {
        !(self.check_disk || self.check_archive || self.download)
    }
}

/// Classification of a finished pass for the run summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// Already verified; no download attempted.
    Skipped,
    /// Downloaded and verified.
    Downloaded,
    /// No verified-good copy after the pass.
    Failed,
}

/// Result of one pass over one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub state: ReconciliationState,
    pub plan: PassPlan,
    pub checked_disk: bool,
    pub checked_archive: bool,
    pub download_attempted: bool,
    /// The pass panicked and `state` is the synthesized failure record.
    pub panicked: bool,
}

impl PassReport {
    pub fn outcome(&self) -> PassOutcome {
        if self.panicked || !self.state.is_verified() {
            PassOutcome::Failed
        } else if self.download_attempted {
            PassOutcome::Downloaded
        } else {
            PassOutcome::Skipped
        }
    }
}

/// Batch totals printed by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[PassReport]) -> Self {
        let mut s = RunSummary {
            total: reports.len(),
            ..RunSummary::default()
        };
        for r in reports {
            match r.outcome() {
                PassOutcome::Skipped => s.skipped += 1,
                PassOutcome::Downloaded => s.downloaded += 1,
                PassOutcome::Failed => s.failed += 1,
            }
        }
        s
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} downloaded={} skipped={} failed={}",
            self.total, self.downloaded, self.skipped, self.failed
        )
    }
}

/// How the runner schedules item passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// One spawned tokio task per item on the multi-thread runtime.
    #[default]
    Tasks,
    /// Passes polled concurrently on the calling task; nothing is spawned.
    Local,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tasks" => Ok(Backend::Tasks),
            "local" => Ok(Backend::Local),
            other => Err(format!("unknown backend '{other}' (expected tasks|local)")),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Tasks => "tasks",
            Backend::Local => "local",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Upper bound on passes in flight; values below 1 are treated as 1.
    pub concurrency: usize,
    pub backend: Backend,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            backend: Backend::Tasks,
        }
    }
}

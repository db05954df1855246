//! `amr fetch`: bring a local cache in line with a candidate list.
//!
//! Setup (config, candidates, ledger, filters, download dir, auth) fails the
//! command. Once dispatch starts, per-item failures only show up in the
//! ledger and the summary counts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use amr_archive::{ArchiveClient, HttpArchiveClient};
use amr_config::FetchSettings;
use amr_reconcile::{run_all, Backend, Job, RunSummary, RunnerOptions};
use amr_state::{load_candidates, select, ReconciliationState, Selector, StateTable};
use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{default_state_path, load_config};

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Candidate list (CSV with a header row)
    pub candidates: PathBuf,

    /// Directory that receives downloaded files (created if missing)
    #[arg(long = "download-dir", default_value = ".")]
    pub download_dir: PathBuf,

    /// Parallel workers (overrides /fetch/workers)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Execution backend: tasks | local
    #[arg(long, default_value = "tasks")]
    pub backend: Backend,

    /// Only process candidates where FIELD equals VALUE (repeatable)
    #[arg(long = "select", value_name = "FIELD=VALUE")]
    pub select: Vec<String>,

    /// Ledger path (default: downloaded_<candidates> next to the candidate list)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub summary: RunSummary,
    pub state_path: PathBuf,
}

pub async fn run(args: &FetchArgs) -> Result<FetchOutcome> {
    let loaded = load_config(&args.config)?;
    let mut settings = FetchSettings::from_config_json(&loaded.config_json)?;
    if let Some(j) = args.jobs {
        settings.workers = j.max(1);
    }

    let selectors = args
        .select
        .iter()
        .map(|raw| Selector::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let candidates = load_candidates(
        &args.candidates,
        &settings.hash_column,
        &settings.name_column,
    )
    .with_context(|| format!("load candidates: {}", args.candidates.display()))?;

    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| default_state_path(&args.candidates));
    let mut ledger = StateTable::load_if_exists(&state_path)
        .with_context(|| format!("load ledger: {}", state_path.display()))?
        .unwrap_or_default();
    let seeded = ledger.seed_defaults(candidates.iter().map(|c| c.item.content_hash.as_str()));

    let candidate_count = candidates.len();
    let selected = select(candidates, &selectors, &ledger);
    info!(
        candidates = candidate_count,
        selected = selected.len(),
        new_in_ledger = seeded,
        ledger = %state_path.display(),
        "candidates ready"
    );

    let download_dir = prepare_download_dir(&args.download_dir)?;

    let credentials = amr_config::secrets::resolve_archive_credentials(&loaded.config_json)?;
    let client = HttpArchiveClient::from_settings(&settings)?;
    let headers = client
        .auth_headers(credentials.as_ref())
        .await
        .context("archive authentication failed")?;

    let jobs: Vec<Job> = selected
        .into_iter()
        .map(|c| {
            let prior = ledger
                .get(&c.item.content_hash)
                .cloned()
                .unwrap_or_else(|| ReconciliationState::unseen(&c.item.content_hash));
            Job {
                dest: c.item.local_path(&download_dir),
                prior,
                item: c.item,
            }
        })
        .collect();

    let opts = RunnerOptions {
        concurrency: settings.workers,
        backend: args.backend,
    };
    info!(
        jobs = jobs.len(),
        workers = opts.concurrency,
        backend = %opts.backend,
        archive = %client.base_url(),
        "dispatch"
    );
    let client: Arc<dyn ArchiveClient> = Arc::new(client);
    let reports = run_all(client, Arc::new(headers), jobs, &opts).await;

    let summary = RunSummary::from_reports(&reports);
    let results: Vec<ReconciliationState> = reports.into_iter().map(|r| r.state).collect();
    ledger
        .merge(&results)
        .save_atomic(&state_path)
        .with_context(|| format!("write ledger: {}", state_path.display()))?;

    info!(
        total = summary.total,
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed,
        "fetch complete"
    );
    Ok(FetchOutcome {
        summary,
        state_path,
    })
}

/// Create `dir` if needed, prove it is writable, and return it absolute.
fn prepare_download_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create download dir: {}", dir.display()))?;
    let abs = dir
        .canonicalize()
        .with_context(|| format!("resolve download dir: {}", dir.display()))?;
    tempfile::NamedTempFile::new_in(&abs)
        .with_context(|| format!("download dir not writable: {}", abs.display()))?;
    Ok(abs)
}

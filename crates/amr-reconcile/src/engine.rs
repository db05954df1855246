use std::fmt;
use std::io;
use std::path::Path;

use amr_archive::{ArchiveClient, ArchiveError, AuthHeaders};
use amr_state::{Item, ReconciliationState};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::types::{PassPlan, PassReport};
use crate::verify;

/// Decide a pass from the prior state and whether the destination exists.
///
/// - missing: download.
/// - present, never verified: check the disk copy.
/// - present, verified bad: download if the archive already vouched for the
///   item, otherwise ask it first.
/// - present, verified good: nothing.
pub fn plan_pass(prior: &ReconciliationState, exists_on_disk: bool) -> PassPlan {
    let mut plan = PassPlan::default();
    if !exists_on_disk {
        plan.download = true;
    } else if !prior.disk_checked {
        plan.check_disk = true;
    } else if !prior.valid_on_disk {
        if prior.archive_checked && prior.valid_in_archive {
            plan.download = true;
        } else {
            plan.check_archive = true;
        }
    }
    plan
}

/// Run one reconciliation pass for `item`, writing to `dest`.
///
/// Never fails: archive and I/O errors are logged and folded into the
/// returned state. The returned state always has `path == dest`.
pub async fn reconcile_item(
    archive: &dyn ArchiveClient,
    headers: &AuthHeaders,
    item: &Item,
    prior: &ReconciliationState,
    dest: &Path,
) -> PassReport {
    let hash = item.content_hash.as_str();
    let mut st = prior.clone();
    st.path = dest.display().to_string();

    let exists = tokio::fs::try_exists(dest).await.unwrap_or(false);
    if !exists {
        st.valid_on_disk = false;
        st.disk_checked = false;
    }
    let plan = plan_pass(&st, exists);

    let mut report = PassReport {
        state: st,
        plan,
        checked_disk: false,
        checked_archive: false,
        download_attempted: false,
        panicked: false,
    };
    if plan.is_noop() {
        debug!(hash, "verified copy on disk; skipping");
        return report;
    }

    let mut check_archive = plan.check_archive;
    let mut download = plan.download;
    let st = &mut report.state;

    if plan.check_disk {
        report.checked_disk = true;
        st.valid_on_disk = verify_on_disk(dest, hash).await;
        st.disk_checked = true;
        if !st.valid_on_disk {
            debug!(hash, "disk copy does not match; asking archive");
            check_archive = true;
        }
    }

    if check_archive {
        report.checked_archive = true;
        match archive.check_valid(hash, headers).await {
            Ok(valid) => {
                st.valid_in_archive = valid;
                st.archive_checked = true;
                if valid {
                    download = true;
                } else {
                    info!(hash, "archive reports item invalid; not downloading");
                }
            }
            Err(e) => {
                warn!(hash, archive = archive.name(), error = %e, "archive check failed");
                st.archive_checked = false;
                download = false;
            }
        }
    }

    if download {
        report.download_attempted = true;
        match download_to(archive, headers, hash, dest).await {
            Ok(bytes) => {
                debug!(hash, bytes, dest = %dest.display(), "downloaded");
                st.downloaded_ok = Some(true);
            }
            Err(e) => {
                warn!(hash, dest = %dest.display(), error = %e, "download failed");
                st.downloaded_ok = Some(false);
            }
        }

        match verify::matches(dest, hash).await {
            Ok(ok) => {
                st.valid_on_disk = ok;
                st.disk_checked = true;
                if !ok {
                    warn!(hash, dest = %dest.display(), "downloaded copy does not match hash");
                }
            }
            Err(e) => {
                debug!(hash, error = %e, "post-download verification unavailable");
                st.valid_on_disk = false;
                st.disk_checked = false;
            }
        }
    }

    report
}

/// Disk verification where an unreadable file counts as invalid.
async fn verify_on_disk(dest: &Path, hash: &str) -> bool {
    match verify::matches(dest, hash).await {
        Ok(ok) => ok,
        Err(e) => {
            debug!(hash, dest = %dest.display(), error = %e, "disk copy unreadable");
            false
        }
    }
}

#[derive(Debug)]
enum DownloadError {
    Archive(ArchiveError),
    Io(io::Error),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Archive(e) => write!(f, "{e}"),
            DownloadError::Io(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Stream the archive body into `dest`, truncating any existing file.
async fn download_to(
    archive: &dyn ArchiveClient,
    headers: &AuthHeaders,
    hash: &str,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let mut body = archive
        .fetch(hash, headers)
        .await
        .map_err(DownloadError::Archive)?;
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(DownloadError::Io)?;

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(DownloadError::Archive)?;
        file.write_all(&chunk).await.map_err(DownloadError::Io)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(DownloadError::Io)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior(disk_checked: bool, valid_on_disk: bool, archive_checked: bool, valid_in_archive: bool) -> ReconciliationState {
        ReconciliationState {
            disk_checked,
            valid_on_disk,
            archive_checked,
            valid_in_archive,
            ..ReconciliationState::unseen("h")
        }
    }

    fn plan(check_disk: bool, check_archive: bool, download: bool) -> PassPlan {
        PassPlan { check_disk, check_archive, download }
    }

    #[test]
    fn missing_file_always_downloads() {
        for p in [prior(true, true, true, true), prior(false, false, true, false)] {
            assert_eq!(plan_pass(&p, false), plan(false, false, true));
        }
    }

    #[test]
    fn unchecked_disk_copy_is_verified_first() {
        assert_eq!(plan_pass(&prior(false, true, true, true), true), plan(true, false, false));
    }

    #[test]
    fn known_bad_copy_downloads_when_archive_vouched() {
        assert_eq!(plan_pass(&prior(true, false, true, true), true), plan(false, false, true));
    }

    #[test]
    fn known_bad_copy_asks_archive_otherwise() {
        assert_eq!(plan_pass(&prior(true, false, false, true), true), plan(false, true, false));
        assert_eq!(plan_pass(&prior(true, false, true, false), true), plan(false, true, false));
    }

    #[test]
    fn verified_copy_is_noop() {
        assert!(plan_pass(&prior(true, true, false, true), true).is_noop());
    }
}

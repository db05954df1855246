use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Length of an MD5 digest in hex.
pub const CONTENT_HASH_LEN: usize = 32;

/// Exactly 32 ASCII hex digits, either case. The hash becomes part of a local
/// file name and an archive URL, so nothing else is accepted.
pub fn is_content_hash(s: &str) -> bool {
    s.len() == CONTENT_HASH_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// One file the mirror is responsible for materializing locally.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// MD5 hex digest; names the item and verifies any copy of it.
    pub content_hash: String,
    /// Archive-side file name (may be a full remote path).
    pub remote_name: String,
}

impl Item {
    pub fn new(content_hash: impl Into<String>, remote_name: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            remote_name: remote_name.into(),
        }
    }

    /// Last path segment of `remote_name`, ignoring trailing slashes.
    pub fn remote_basename(&self) -> &str {
        self.remote_name
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or("")
    }

    /// `{hash}_{basename}`: unique per hash and stable across runs.
    pub fn local_file_name(&self) -> String {
        match self.remote_basename() {
            "" => self.content_hash.clone(),
            base => format!("{}_{}", self.content_hash, base),
        }
    }

    pub fn local_path(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(self.local_file_name())
    }
}

/// Per-item reconciliation record, keyed by `content_hash`.
///
/// `disk_checked == false` means `valid_on_disk` carries no evidence and must
/// never justify skipping work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationState {
    pub content_hash: String,
    /// Resolved local path ("" until the item's first pass).
    pub path: String,
    /// Outcome of the most recent download attempt; `None` = never attempted.
    pub downloaded_ok: Option<bool>,
    pub valid_on_disk: bool,
    /// Defaults to `true`: retrievable until the archive says otherwise.
    pub valid_in_archive: bool,
    pub disk_checked: bool,
    pub archive_checked: bool,
}

impl ReconciliationState {
    /// Record for an item never seen before.
    pub fn unseen(content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            path: String::new(),
            downloaded_ok: None,
            valid_on_disk: false,
            valid_in_archive: true,
            disk_checked: false,
            archive_checked: false,
        }
    }

    /// Verified-good local copy: the only condition that allows a skip.
    pub fn is_verified(&self) -> bool {
        self.disk_checked && self.valid_on_disk
    }

    /// Field value rendered the way the ledger file stores it.
    pub fn field(&self, name: &str) -> Option<String> {
        let v = match name {
            STATE_COL_HASH => self.content_hash.clone(),
            STATE_COL_PATH => self.path.clone(),
            STATE_COL_DOWNLOADED_OK => render_tri(self.downloaded_ok).to_string(),
            STATE_COL_VALID_ON_DISK => self.valid_on_disk.to_string(),
            STATE_COL_VALID_IN_ARCHIVE => self.valid_in_archive.to_string(),
            STATE_COL_ARCHIVE_CHECKED => self.archive_checked.to_string(),
            STATE_COL_DISK_CHECKED => self.disk_checked.to_string(),
            _ => return None,
        };
        Some(v)
    }
}

pub const STATE_COL_PATH: &str = "path";
pub const STATE_COL_HASH: &str = "md5sum";
pub const STATE_COL_DOWNLOADED_OK: &str = "downloaded_ok";
pub const STATE_COL_VALID_ON_DISK: &str = "valid_on_disk";
pub const STATE_COL_VALID_IN_ARCHIVE: &str = "valid_in_archive";
pub const STATE_COL_ARCHIVE_CHECKED: &str = "archive_checked";
pub const STATE_COL_DISK_CHECKED: &str = "disk_checked";

/// Ledger column order.
pub const STATE_COLUMNS: [&str; 7] = [
    STATE_COL_PATH,
    STATE_COL_HASH,
    STATE_COL_DOWNLOADED_OK,
    STATE_COL_VALID_ON_DISK,
    STATE_COL_VALID_IN_ARCHIVE,
    STATE_COL_ARCHIVE_CHECKED,
    STATE_COL_DISK_CHECKED,
];

pub(crate) fn render_tri(v: Option<bool>) -> &'static str {
    match v {
        None => "",
        Some(true) => "true",
        Some(false) => "false",
    }
}

/// Lenient boolean parse: accepts `true/false`, `True/False`, `1/0`, `yes/no`.
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// Tri-state parse: blank is unknown.
pub(crate) fn parse_tri(raw: &str) -> Option<Option<bool>> {
    if raw.trim().is_empty() {
        return Some(None);
    }
    parse_bool(raw).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_file_name_uses_basename_of_remote_path() {
        let item = Item::new("abc123", "/net/archive/pipe/20190101/c4d_190101_000000_ooi_g_v1.fits.fz");
        assert_eq!(
            item.local_file_name(),
            "abc123_c4d_190101_000000_ooi_g_v1.fits.fz"
        );
        assert_eq!(
            item.local_path(Path::new("/cache")),
            PathBuf::from("/cache/abc123_c4d_190101_000000_ooi_g_v1.fits.fz")
        );
    }

    #[test]
    fn local_file_name_without_remote_name_is_hash() {
        assert_eq!(Item::new("abc", "").local_file_name(), "abc");
        assert_eq!(Item::new("abc", "dir/").local_file_name(), "abc_dir");
    }

    #[test]
    fn content_hash_shape() {
        assert!(is_content_hash("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(is_content_hash("D41D8CD98F00B204E9800998ECF8427E"));
        assert!(!is_content_hash("d41d8cd98f00b204e9800998ecf8427"));
        assert!(!is_content_hash("../../etc/evil"));
        assert!(!is_content_hash("../../../../../../../../tmp/evil1"));
        assert!(!is_content_hash("d41d8cd98f00b204e9800998ecf8427g"));
    }

    #[test]
    fn unseen_defaults_trust_nothing() {
        let s = ReconciliationState::unseen("h");
        assert_eq!(s.downloaded_ok, None);
        assert!(s.valid_in_archive);
        assert!(!s.disk_checked && !s.archive_checked && !s.valid_on_disk);
        assert!(!s.is_verified());
    }

    #[test]
    fn lenient_bool_parsing() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_tri(""), Some(None));
        assert_eq!(parse_tri("False"), Some(Some(false)));
        assert_eq!(parse_tri("x"), None);
    }

    #[test]
    fn field_rendering_matches_ledger() {
        let mut s = ReconciliationState::unseen("h");
        assert_eq!(s.field("downloaded_ok").as_deref(), Some(""));
        s.downloaded_ok = Some(false);
        assert_eq!(s.field("downloaded_ok").as_deref(), Some("false"));
        assert_eq!(s.field("valid_in_archive").as_deref(), Some("true"));
        assert_eq!(s.field("nope"), None);
    }
}

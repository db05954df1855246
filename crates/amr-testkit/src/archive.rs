//! In-memory [`ArchiveClient`] with failure injection and call accounting.
//!
//! Every knob takes `&self` so a test can keep an `Arc<FakeArchive>` and
//! reconfigure or inspect it while the runner holds another clone.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use amr_archive::{ArchiveClient, ArchiveError, AuthHeaders, ByteStream};
use amr_reconcile::verify::md5_hex;
use bytes::Bytes;
use futures_util::{stream, StreamExt};

/// Body chunk size; small enough that multi-chunk bodies are cheap to build.
const CHUNK: usize = 64 * 1024;

#[derive(Clone)]
struct Object {
    content: Bytes,
    valid: bool,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Object>,
    fail_check: HashSet<String>,
    fail_fetch: HashSet<String>,
    fail_mid_stream: HashSet<String>,
    panic_on_check: HashSet<String>,
    panic_on_fetch: HashSet<String>,
    latency: Duration,
    latency_for: HashMap<String, Duration>,
    check_calls: HashMap<String, usize>,
    fetch_calls: HashMap<String, usize>,
    last_headers: Option<AuthHeaders>,
}

#[derive(Default)]
pub struct FakeArchive {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic injected by a test may poison the lock; the data is still usable.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Store `content` under its own MD5 and return that hash.
    pub fn put(&self, content: impl Into<Bytes>) -> String {
        let content = content.into();
        let hash = md5_hex(&content);
        self.put_as(&hash, content, true);
        hash
    }

    /// Store arbitrary content under `hash` (it need not match).
    pub fn put_as(&self, hash: &str, content: impl Into<Bytes>, valid: bool) {
        self.lock().objects.insert(
            hash.to_string(),
            Object {
                content: content.into(),
                valid,
            },
        );
    }

    pub fn mark_invalid(&self, hash: &str) {
        if let Some(o) = self.lock().objects.get_mut(hash) {
            o.valid = false;
        }
    }

    /// `check_valid` for `hash` returns a transport error.
    pub fn fail_checks(&self, hash: &str) {
        self.lock().fail_check.insert(hash.to_string());
    }

    /// `fetch` for `hash` returns a 503 before any byte is sent.
    pub fn fail_fetches(&self, hash: &str) {
        self.lock().fail_fetch.insert(hash.to_string());
    }

    /// `fetch` for `hash` yields the first half of the body, then an error.
    pub fn fail_mid_stream(&self, hash: &str) {
        self.lock().fail_mid_stream.insert(hash.to_string());
    }

    pub fn panic_on_check(&self, hash: &str) {
        self.lock().panic_on_check.insert(hash.to_string());
    }

    pub fn panic_on_fetch(&self, hash: &str) {
        self.lock().panic_on_fetch.insert(hash.to_string());
    }

    /// Delay applied inside every call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Delay for calls on `hash` only; overrides [`FakeArchive::set_latency`].
    pub fn set_latency_for(&self, hash: &str, latency: Duration) {
        self.lock().latency_for.insert(hash.to_string(), latency);
    }

    /// Remove every injected failure.
    pub fn heal(&self) {
        let mut g = self.lock();
        g.fail_check.clear();
        g.fail_fetch.clear();
        g.fail_mid_stream.clear();
        g.panic_on_check.clear();
        g.panic_on_fetch.clear();
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn check_calls(&self) -> usize {
        self.lock().check_calls.values().sum()
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls.values().sum()
    }

    pub fn check_calls_for(&self, hash: &str) -> usize {
        self.lock().check_calls.get(hash).copied().unwrap_or(0)
    }

    pub fn fetch_calls_for(&self, hash: &str) -> usize {
        self.lock().fetch_calls.get(hash).copied().unwrap_or(0)
    }

    /// Network calls of either kind.
    pub fn total_calls(&self) -> usize {
        self.check_calls() + self.fetch_calls()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<AuthHeaders> {
        self.lock().last_headers.clone()
    }

    pub fn reset_counters(&self) {
        let mut g = self.lock();
        g.check_calls.clear();
        g.fetch_calls.clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn chunks(content: &Bytes) -> Vec<Result<Bytes, ArchiveError>> {
    (0..content.len())
        .step_by(CHUNK)
        .map(|start| Ok(content.slice(start..(start + CHUNK).min(content.len()))))
        .collect()
}

#[async_trait::async_trait]
impl ArchiveClient for FakeArchive {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn check_valid(
        &self,
        content_hash: &str,
        headers: &AuthHeaders,
    ) -> Result<bool, ArchiveError> {
        let _guard = self.enter();
        let (latency, fail, panic, valid) = {
            let mut g = self.lock();
            *g.check_calls.entry(content_hash.to_string()).or_default() += 1;
            g.last_headers = Some(headers.clone());
            (
                g.latency_for.get(content_hash).copied().unwrap_or(g.latency),
                g.fail_check.contains(content_hash),
                g.panic_on_check.contains(content_hash),
                g.objects.get(content_hash).map(|o| o.valid),
            )
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if panic {
            panic!("injected panic in check_valid for {content_hash}");
        }
        if fail {
            return Err(ArchiveError::Transport(format!(
                "injected check failure for {content_hash}"
            )));
        }
        Ok(valid.unwrap_or(false))
    }

    async fn fetch(
        &self,
        content_hash: &str,
        headers: &AuthHeaders,
    ) -> Result<ByteStream, ArchiveError> {
        let _guard = self.enter();
        let (latency, fail, mid, panic, obj) = {
            let mut g = self.lock();
            *g.fetch_calls.entry(content_hash.to_string()).or_default() += 1;
            g.last_headers = Some(headers.clone());
            (
                g.latency_for.get(content_hash).copied().unwrap_or(g.latency),
                g.fail_fetch.contains(content_hash),
                g.fail_mid_stream.contains(content_hash),
                g.panic_on_fetch.contains(content_hash),
                g.objects.get(content_hash).cloned(),
            )
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if panic {
            panic!("injected panic in fetch for {content_hash}");
        }
        if fail {
            return Err(ArchiveError::Status {
                code: 503,
                message: "injected fetch failure".to_string(),
            });
        }
        let Some(obj) = obj else {
            return Err(ArchiveError::Status {
                code: 404,
                message: format!("no object {content_hash}"),
            });
        };

        if mid {
            let half = obj.content.slice(..obj.content.len() / 2);
            let mut parts = chunks(&half);
            parts.push(Err(ArchiveError::Transport(
                "injected connection reset".to_string(),
            )));
            return Ok(stream::iter(parts).boxed());
        }
        Ok(stream::iter(chunks(&obj.content)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(a: &FakeArchive, hash: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut s = a.fetch(hash, &AuthHeaders::anonymous()).await?;
        let mut out = Vec::new();
        while let Some(chunk) = s.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn put_stores_under_md5_and_streams_back() {
        let a = FakeArchive::new();
        let content = vec![7u8; CHUNK * 2 + 10];
        let h = a.put(content.clone());
        assert_eq!(h, md5_hex(&content));
        assert!(a.check_valid(&h, &AuthHeaders::anonymous()).await.unwrap());
        assert_eq!(body(&a, &h).await.unwrap(), content);
        assert_eq!(a.check_calls_for(&h), 1);
        assert_eq!(a.fetch_calls_for(&h), 1);
    }

    #[tokio::test]
    async fn injected_failures() {
        let a = FakeArchive::new();
        let h = a.put(&b"0123456789"[..]);
        a.fail_checks(&h);
        a.fail_mid_stream(&h);

        let err = a.check_valid(&h, &AuthHeaders::anonymous()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Transport(_)));
        assert!(matches!(body(&a, &h).await, Err(ArchiveError::Transport(_))));

        a.heal();
        assert_eq!(body(&a, &h).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn unknown_hash_is_invalid_and_unfetchable() {
        let a = FakeArchive::new();
        let h = AuthHeaders::with_token("t");
        assert!(!a.check_valid("nope", &h).await.unwrap());
        assert!(matches!(
            a.fetch("nope", &h).await.err(),
            Some(ArchiveError::Status { code: 404, .. })
        ));
        assert_eq!(a.last_headers(), Some(h));
    }
}

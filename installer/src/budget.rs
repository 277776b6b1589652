//! Download limits, lock timings and release mirrors.
//!
//! These values are assembled once (from defaults or the root crate's
//! configuration file) and passed by reference into each component.

use std::time::Duration;

/// Default primary release mirror.
pub const DEFAULT_PRIMARY_BASE_URL: &str = "https://releases.amikos.tech/chroma-go-local";

/// Default fallback release mirror.
pub const DEFAULT_FALLBACK_BASE_URL: &str =
    "https://github.com/amikos-tech/chroma-go-local/releases/download";

/// Timings for the cross-process download lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// How long to wait for a held lock before giving up.
    pub wait_timeout: Duration,
    /// Age beyond which an unrefreshed lock file is considered abandoned.
    pub stale_after: Duration,
    /// Delay between acquisition attempts.
    pub poll_interval: Duration,
    /// How often a holder refreshes the lock file's modification time.
    /// Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(45),
            stale_after: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_millis(500),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Process-wide limits for a library download.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::budget::DownloadBudget;
///
/// let budget = DownloadBudget::default();
/// assert_eq!(budget.max_artifact_bytes, 500 * 1024 * 1024);
/// assert_eq!(budget.attempts_per_mirror, 3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadBudget {
    /// Largest accepted download or extracted library, in bytes.
    pub max_artifact_bytes: u64,
    /// Redirect hop at which a download is abandoned.
    pub max_redirects: usize,
    /// Attempts against each mirror before moving to the next.
    pub attempts_per_mirror: u32,
    /// Base delay between attempts; attempt `n` waits `n` times this.
    pub retry_backoff: Duration,
    /// Overall timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Cross-process lock timings.
    pub lock: LockSettings,
}

impl Default for DownloadBudget {
    fn default() -> Self {
        Self {
            max_artifact_bytes: 500 * 1024 * 1024,
            max_redirects: 10,
            attempts_per_mirror: 3,
            retry_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10 * 60),
            lock: LockSettings::default(),
        }
    }
}

/// Primary and optional fallback base URLs for release assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMirrors {
    /// Base URL tried first.
    pub primary: String,
    /// Base URL tried once the primary is exhausted.
    pub fallback: Option<String>,
}

impl ReleaseMirrors {
    /// Mirrors with a primary and a fallback base URL.
    #[must_use]
    pub fn new(primary: impl Into<String>, fallback: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback,
        }
    }

    /// Mirrors consisting of a single base URL.
    #[must_use]
    pub fn single(primary: impl Into<String>) -> Self {
        Self::new(primary, None)
    }

    /// Return the usable base URLs in order.
    ///
    /// Whitespace and trailing slashes are trimmed; blank and duplicate
    /// entries are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use chroma_local_installer::budget::ReleaseMirrors;
    ///
    /// let mirrors = ReleaseMirrors::new(
    ///     "https://a.test/",
    ///     Some(" https://a.test ".to_owned()),
    /// );
    /// assert_eq!(mirrors.bases(), vec!["https://a.test".to_owned()]);
    /// ```
    #[must_use]
    pub fn bases(&self) -> Vec<String> {
        let mut bases: Vec<String> = Vec::with_capacity(2);
        let candidates = std::iter::once(self.primary.as_str()).chain(self.fallback.as_deref());
        for candidate in candidates {
            let base = candidate.trim().trim_end_matches('/');
            if base.is_empty() || bases.iter().any(|seen| seen == base) {
                continue;
            }
            bases.push(base.to_owned());
        }
        bases
    }
}

impl Default for ReleaseMirrors {
    fn default() -> Self {
        Self::new(
            DEFAULT_PRIMARY_BASE_URL,
            Some(DEFAULT_FALLBACK_BASE_URL.to_owned()),
        )
    }
}

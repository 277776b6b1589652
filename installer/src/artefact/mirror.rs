//! Mirror fallback and bounded retries for release assets.
//!
//! Each asset is fetched independently: the primary mirror is tried up to
//! the attempt budget, then the fallback. A 404 or refused redirect
//! exhausts a mirror at once. A size-limit violation aborts the asset
//! outright since no mirror should serve a larger file.

use super::download::{ArtefactDownloader, DownloadError};
use super::naming::asset_url;
use super::version_tag::LibraryVersionTag;
use crate::budget::{DownloadBudget, ReleaseMirrors};
use log::{debug, warn};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// A failed attempt sequence against one mirror.
#[derive(Debug)]
pub struct MirrorFailure {
    /// Base URL of the mirror.
    pub base: String,
    /// The last error the mirror produced.
    pub error: DownloadError,
}

impl fmt::Display for MirrorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "release mirror {} failed: {}", self.base, self.error)
    }
}

/// Errors arising from mirror-aware asset retrieval.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// No usable base URL is configured.
    #[error("no release base URL configured")]
    NoMirrors,

    /// Every mirror failed for the asset.
    #[error("failed to download {asset} from all release mirrors: {}", join_failures(.failures))]
    Exhausted {
        /// The asset being fetched.
        asset: String,
        /// One entry per mirror, in the order tried.
        failures: Vec<MirrorFailure>,
    },

    /// The asset exceeded the size limit.
    #[error("failed to download {asset}: {source}")]
    ResourceLimit {
        /// The asset being fetched.
        asset: String,
        /// The size-limit violation.
        #[source]
        source: DownloadError,
    },
}

fn join_failures(failures: &[MirrorFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fetches release assets across the configured mirrors.
pub struct MirrorFetcher<'a> {
    downloader: &'a dyn ArtefactDownloader,
    bases: Vec<String>,
    attempts: u32,
    backoff: Duration,
}

impl<'a> MirrorFetcher<'a> {
    /// Create a fetcher using `downloader` for every request.
    #[must_use]
    pub fn new(
        downloader: &'a dyn ArtefactDownloader,
        mirrors: &ReleaseMirrors,
        budget: &DownloadBudget,
    ) -> Self {
        Self {
            downloader,
            bases: mirrors.bases(),
            attempts: budget.attempts_per_mirror.max(1),
            backoff: budget.retry_backoff,
        }
    }

    /// Fetch `asset` for `version` into `dest`, returning the base URL that
    /// served it.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NoMirrors`] when no base URL is configured,
    /// [`MirrorError::ResourceLimit`] when the asset is too large, and
    /// [`MirrorError::Exhausted`] when every mirror failed.
    pub fn fetch_with_fallback(
        &self,
        version: &LibraryVersionTag,
        asset: &str,
        dest: &Path,
    ) -> Result<&str, MirrorError> {
        if self.bases.is_empty() {
            return Err(MirrorError::NoMirrors);
        }
        let mut failures = Vec::new();
        for base in &self.bases {
            let url = asset_url(base, version, asset);
            match self.fetch_from_mirror(&url, dest) {
                Ok(()) => return Ok(base.as_str()),
                Err(error) if error.is_resource_limit() => {
                    return Err(MirrorError::ResourceLimit {
                        asset: asset.to_owned(),
                        source: error,
                    });
                }
                Err(error) => {
                    warn!("release mirror {base} failed for {asset}: {error}");
                    failures.push(MirrorFailure {
                        base: base.clone(),
                        error,
                    });
                }
            }
        }
        Err(MirrorError::Exhausted {
            asset: asset.to_owned(),
            failures,
        })
    }

    fn fetch_from_mirror(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let mut attempt = 1;
        loop {
            debug!("fetching {url} (attempt {attempt} of {})", self.attempts);
            match self.downloader.fetch(url, dest) {
                Ok(()) => return Ok(()),
                Err(error) if !error.is_retryable() || attempt >= self.attempts => {
                    return Err(error);
                }
                Err(error) => {
                    warn!("attempt {attempt} for {url} failed, retrying: {error}");
                    std::thread::sleep(self.backoff.saturating_mul(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::download::MockArtefactDownloader;
    use mockall::Sequence;
    use mockall::predicate::{always, eq};
    use rstest::{fixture, rstest};

    #[fixture]
    fn version() -> LibraryVersionTag {
        LibraryVersionTag::try_from("v0.3.1").expect("valid tag")
    }

    fn budget(attempts: u32) -> DownloadBudget {
        DownloadBudget {
            attempts_per_mirror: attempts,
            retry_backoff: Duration::ZERO,
            ..DownloadBudget::default()
        }
    }

    fn mirrors() -> ReleaseMirrors {
        ReleaseMirrors::new("https://primary.test", Some("https://fallback.test".to_owned()))
    }

    fn transient(url: &str) -> DownloadError {
        DownloadError::HttpError {
            url: url.to_owned(),
            reason: "connection reset".to_owned(),
        }
    }

    #[rstest]
    fn primary_success_skips_fallback(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        downloader
            .expect_fetch()
            .with(eq("https://primary.test/v0.3.1/SHA256SUMS"), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let fetcher = MirrorFetcher::new(&downloader, &mirrors(), &budget(3));
        let base = fetcher
            .fetch_with_fallback(&version, "SHA256SUMS", Path::new("/unused"))
            .expect("primary succeeds");
        assert_eq!(base, "https://primary.test");
    }

    #[rstest]
    fn not_found_moves_to_fallback_without_retrying(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        let mut seq = Sequence::new();
        downloader
            .expect_fetch()
            .with(eq("https://primary.test/v0.3.1/SHA256SUMS"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|url, _| {
                Err(DownloadError::NotFound {
                    url: url.to_owned(),
                })
            });
        downloader
            .expect_fetch()
            .with(eq("https://fallback.test/v0.3.1/SHA256SUMS"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let fetcher = MirrorFetcher::new(&downloader, &mirrors(), &budget(3));
        let base = fetcher
            .fetch_with_fallback(&version, "SHA256SUMS", Path::new("/unused"))
            .expect("fallback succeeds");
        assert_eq!(base, "https://fallback.test");
    }

    #[rstest]
    fn transient_failures_are_retried_up_to_budget(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        let mut seq = Sequence::new();
        downloader
            .expect_fetch()
            .with(eq("https://primary.test/v0.3.1/SHA256SUMS.sig"), always())
            .times(2)
            .in_sequence(&mut seq)
            .returning(|url, _| Err(transient(url)));
        downloader
            .expect_fetch()
            .with(eq("https://primary.test/v0.3.1/SHA256SUMS.sig"), always())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let fetcher = MirrorFetcher::new(&downloader, &mirrors(), &budget(3));
        let base = fetcher
            .fetch_with_fallback(&version, "SHA256SUMS.sig", Path::new("/unused"))
            .expect("third attempt succeeds");
        assert_eq!(base, "https://primary.test");
    }

    #[rstest]
    fn exhausted_mirrors_report_each_failure(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        downloader
            .expect_fetch()
            .times(4)
            .returning(|url, _| Err(transient(url)));

        let fetcher = MirrorFetcher::new(&downloader, &mirrors(), &budget(2));
        let err = fetcher
            .fetch_with_fallback(&version, "SHA256SUMS", Path::new("/unused"))
            .expect_err("all mirrors fail");
        let MirrorError::Exhausted { failures, .. } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(failures.len(), 2);
        let message = err.to_string();
        assert!(message.contains("release mirror https://primary.test failed"));
        assert!(message.contains("release mirror https://fallback.test failed"));
    }

    #[rstest]
    fn size_limit_aborts_without_fallback(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        downloader.expect_fetch().times(1).returning(|url, _| {
            Err(DownloadError::TooLarge {
                url: url.to_owned(),
                declared: 10,
                max: 5,
            })
        });

        let fetcher = MirrorFetcher::new(&downloader, &mirrors(), &budget(3));
        let err = fetcher
            .fetch_with_fallback(&version, "archive.tar.gz", Path::new("/unused"))
            .expect_err("too large");
        assert!(matches!(err, MirrorError::ResourceLimit { .. }));
        assert!(err.to_string().contains("too large"));
    }

    #[rstest]
    fn zero_attempt_budget_still_tries_once(version: LibraryVersionTag) {
        let mut downloader = MockArtefactDownloader::new();
        downloader.expect_fetch().times(1).returning(|_, _| Ok(()));

        let fetcher = MirrorFetcher::new(
            &downloader,
            &ReleaseMirrors::single("https://primary.test"),
            &budget(0),
        );
        assert!(
            fetcher
                .fetch_with_fallback(&version, "SHA256SUMS", Path::new("/unused"))
                .is_ok()
        );
    }

    #[rstest]
    fn blank_mirrors_are_rejected(version: LibraryVersionTag) {
        let downloader = MockArtefactDownloader::new();
        let fetcher =
            MirrorFetcher::new(&downloader, &ReleaseMirrors::single("  "), &budget(3));
        let err = fetcher
            .fetch_with_fallback(&version, "SHA256SUMS", Path::new("/unused"))
            .expect_err("no mirrors");
        assert!(matches!(err, MirrorError::NoMirrors));
    }
}

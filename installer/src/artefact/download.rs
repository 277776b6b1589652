//! Size-bounded HTTP download of release assets.
//!
//! Provides a trait-based abstraction for fetching a URL to a local file,
//! enabling dependency injection for testing. The HTTP implementation
//! follows redirects itself so that every hop can be policed: scheme
//! downgrades from `https` to `http` are rejected and the chain is capped.
//! Bodies are streamed through a limited reader into a temporary file beside
//! the destination and renamed into place only once complete.

use crate::budget::DownloadBudget;
use log::debug;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Trait for downloading a release asset to a local path.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::download::HttpDownloader;
/// use chroma_local_installer::budget::DownloadBudget;
///
/// let downloader = HttpDownloader::new(&DownloadBudget::default());
/// // Use downloader.fetch(url, dest) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the body exceeds the size
    /// limit, a redirect is rejected, or the file cannot be written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Reasons a redirect hop is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    /// The hop would move from `https` to `http`.
    #[error("redirect from HTTPS to HTTP is not allowed: {from} -> {to}")]
    Downgrade {
        /// URL that issued the redirect.
        from: String,
        /// Redirect target.
        to: String,
    },

    /// The chain reached the configured hop limit.
    #[error("stopped after {max} redirects")]
    TooMany {
        /// The configured hop limit.
        max: usize,
    },
}

/// Errors arising from artefact download operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request failed at the transport level.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested asset was not found (HTTP 404).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The server answered with a status other than success or 404.
    #[error("unexpected response {status} for URL {url}")]
    UnexpectedStatus {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The declared `Content-Length` exceeds the size limit.
    #[error("downloaded artifact is too large: {declared} bytes exceeds max {max} bytes")]
    TooLarge {
        /// The URL that was requested.
        url: String,
        /// The declared body length.
        declared: u64,
        /// The configured limit.
        max: u64,
    },

    /// The streamed body exceeded the size limit.
    #[error("downloaded artifact is too large: body from {url} exceeds max allowed size of {max} bytes")]
    SizeLimitExceeded {
        /// The URL that was requested.
        url: String,
        /// The configured limit.
        max: u64,
    },

    /// The body ended before the declared `Content-Length`.
    #[error("download incomplete for {url}: expected {expected} bytes, got {actual} bytes")]
    Incomplete {
        /// The URL that was requested.
        url: String,
        /// The declared body length.
        expected: u64,
        /// The number of bytes received.
        actual: u64,
    },

    /// A redirect hop was refused.
    #[error(transparent)]
    Redirect(#[from] RedirectError),

    /// A URL or redirect target could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The unparsable URL.
        url: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// I/O error reading the body or writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    /// Whether retrying the same URL could succeed.
    ///
    /// Missing assets, refused redirects, malformed URLs and size-limit
    /// violations are deterministic and never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HttpError { .. }
                | Self::UnexpectedStatus { .. }
                | Self::Incomplete { .. }
                | Self::Io(_)
        )
    }

    /// Whether the failure is a size-limit violation.
    #[must_use]
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::TooLarge { .. } | Self::SizeLimitExceeded { .. })
    }
}

/// Check whether the redirect from `previous` to `next` may be followed.
///
/// `hop` is the 1-based number of the redirect about to be followed. The
/// hop limit is checked before the scheme.
///
/// # Errors
///
/// Returns [`RedirectError::TooMany`] once `hop` reaches `max_redirects`
/// and [`RedirectError::Downgrade`] for an `https` to `http` hop.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::download::check_redirect;
/// use url::Url;
///
/// let from = Url::parse("https://a.test/x").expect("valid url");
/// let to = Url::parse("http://b.test/x").expect("valid url");
/// assert!(check_redirect(&from, &to, 1, 10).is_err());
/// ```
pub fn check_redirect(
    previous: &Url,
    next: &Url,
    hop: usize,
    max_redirects: usize,
) -> Result<(), RedirectError> {
    if hop >= max_redirects {
        return Err(RedirectError::TooMany { max: max_redirects });
    }
    if previous.scheme().eq_ignore_ascii_case("https") && next.scheme().eq_ignore_ascii_case("http")
    {
        return Err(RedirectError::Downgrade {
            from: previous.to_string(),
            to: next.to_string(),
        });
    }
    Ok(())
}

/// HTTP-based downloader using `ureq`.
pub struct HttpDownloader {
    agent: ureq::Agent,
    max_bytes: u64,
    max_redirects: usize,
}

impl HttpDownloader {
    /// Create a downloader honouring the size, redirect and timeout limits
    /// of `budget`.
    #[must_use]
    pub fn new(budget: &DownloadBudget) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(budget.request_timeout))
            .max_redirects(0)
            .max_redirects_will_error(false)
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            max_bytes: budget.max_artifact_bytes,
            max_redirects: budget.max_redirects,
        }
    }

    /// Resolve `location` against `current` and apply the redirect rules
    /// for the `hop`th redirect.
    fn redirect_target(
        &self,
        current: &Url,
        location: &str,
        hop: usize,
    ) -> Result<Url, DownloadError> {
        let next = current
            .join(location)
            .map_err(|err| DownloadError::InvalidUrl {
                url: location.to_owned(),
                reason: err.to_string(),
            })?;
        check_redirect(current, &next, hop, self.max_redirects)?;
        Ok(next)
    }

    fn write_body(&self, url: &str, body: ureq::Body, dest: &Path) -> Result<(), DownloadError> {
        let declared = body.content_length();
        if let Some(declared) = declared {
            if declared > self.max_bytes {
                return Err(DownloadError::TooLarge {
                    url: url.to_owned(),
                    declared,
                    max: self.max_bytes,
                });
            }
        }

        let parent = dest
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let prefix = format!(
            "{}.download-",
            dest.file_name()
                .map_or_else(|| "asset".into(), |name| name.to_string_lossy())
        );
        let mut temp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(parent)?;

        let mut limited = body.into_reader().take(self.max_bytes.saturating_add(1));
        let written = io::copy(&mut limited, temp.as_file_mut())?;
        if written > self.max_bytes {
            return Err(DownloadError::SizeLimitExceeded {
                url: url.to_owned(),
                max: self.max_bytes,
            });
        }
        if let Some(expected) = declared.filter(|len| *len > 0) {
            if written != expected {
                return Err(DownloadError::Incomplete {
                    url: url.to_owned(),
                    expected,
                    actual: written,
                });
            }
        }
        temp.as_file().sync_all()?;
        temp.persist(dest).map_err(|err| DownloadError::Io(err.error))?;
        debug!("downloaded {written} bytes from {url} to {}", dest.display());
        Ok(())
    }
}

impl ArtefactDownloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let mut current = parse_url(url)?;
        let mut hop = 0;
        loop {
            let response = self
                .agent
                .get(current.as_str())
                .call()
                .map_err(|e| map_ureq_error(current.as_str(), &e))?;
            let status = response.status();

            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get("location")
                    .and_then(|value| value.to_str().ok())
                else {
                    return Err(DownloadError::UnexpectedStatus {
                        url: current.to_string(),
                        status: status.as_u16(),
                    });
                };
                hop += 1;
                let next = self.redirect_target(&current, location, hop)?;
                debug!("following redirect {hop} from {current} to {next}");
                current = next;
                continue;
            }

            if status.as_u16() == 404 {
                return Err(DownloadError::NotFound {
                    url: current.to_string(),
                });
            }
            if !status.is_success() {
                return Err(DownloadError::UnexpectedStatus {
                    url: current.to_string(),
                    status: status.as_u16(),
                });
            }
            return self.write_body(current.as_str(), response.into_body(), dest);
        }
    }
}

fn parse_url(url: &str) -> Result<Url, DownloadError> {
    Url::parse(url).map_err(|err| DownloadError::InvalidUrl {
        url: url.to_owned(),
        reason: err.to_string(),
    })
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(status) => DownloadError::UnexpectedStatus {
            url: url.to_owned(),
            status: *status,
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

//! Error types for local runtime library resolution.
//!
//! Component errors are wrapped with a stable prefix naming the failed stage
//! ("download failed", "verification failed", "extraction failed") and
//! [`InstallerError::kind`] exposes the failure category so callers can
//! branch without matching on message text.

use crate::artefact::download::DownloadError;
use crate::artefact::error::ArtefactError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::mirror::MirrorError;
use crate::artefact::verification::VerificationError;
use crate::lock::LockError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Broad failure category of an [`InstallerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration; never retried.
    Configuration,
    /// Fetching failed on every mirror after retries.
    Network,
    /// Checksum or signature verification failed; never retried.
    Integrity,
    /// A download or extracted member exceeded the size limit.
    ResourceLimit,
    /// The download lock could not be acquired or released.
    Concurrency,
    /// A local filesystem operation failed.
    Io,
}

/// Errors that can occur while resolving the runtime library.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Neither a path nor auto-download is configured.
    #[error(
        "local runtime library path is not configured: set library.path, CHROMA_LIB_PATH, or enable library.auto_download"
    )]
    NotConfigured,

    /// The configured version tag is invalid.
    #[error("invalid local library version: {source}")]
    InvalidVersion {
        /// The validation failure.
        #[source]
        source: ArtefactError,
    },

    /// The auto-detected version tag is invalid.
    #[error("invalid detected local library version: {source}")]
    InvalidDetectedVersion {
        /// The validation failure.
        #[source]
        source: ArtefactError,
    },

    /// The host platform has no published library.
    #[error(transparent)]
    UnsupportedPlatform(ArtefactError),

    /// The cache root could not be determined.
    #[error("failed to determine local library cache dir: {reason}")]
    CacheDir {
        /// Why the directory could not be determined.
        reason: String,
    },

    /// A release asset could not be fetched.
    #[error("local library download failed: {0}")]
    Download(#[from] MirrorError),

    /// A checksum or signature check failed.
    #[error("local library verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// The library could not be extracted from the archive.
    #[error("local library extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// The download lock failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A cache filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Filesystem {
        /// What was being attempted, e.g. "create cache directory".
        action: &'static str,
        /// The path involved.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Extraction reported success but the library is missing or empty.
    #[error("local runtime library {path} is missing or empty after extraction")]
    LibraryMissing {
        /// The expected library path.
        path: Utf8PathBuf,
    },

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl InstallerError {
    /// Return the failure category.
    ///
    /// # Examples
    ///
    /// ```
    /// use chroma_local_installer::error::{ErrorKind, InstallerError};
    ///
    /// assert_eq!(InstallerError::NotConfigured.kind(), ErrorKind::Configuration);
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured
            | Self::InvalidVersion { .. }
            | Self::InvalidDetectedVersion { .. }
            | Self::UnsupportedPlatform(_)
            | Self::CacheDir { .. } => ErrorKind::Configuration,
            Self::Download(err) => mirror_kind(err),
            Self::Verification(_) => ErrorKind::Integrity,
            Self::Extraction(err) => extraction_kind(err),
            Self::Lock(_) => ErrorKind::Concurrency,
            Self::Filesystem { .. } | Self::LibraryMissing { .. } | Self::WriteFailed { .. } => {
                ErrorKind::Io
            }
        }
    }

    pub(crate) fn filesystem(
        action: &'static str,
        path: impl Into<Utf8PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Filesystem {
            action,
            path,
            source,
        }
    }
}

fn mirror_kind(err: &MirrorError) -> ErrorKind {
    match err {
        MirrorError::NoMirrors => ErrorKind::Configuration,
        MirrorError::ResourceLimit { .. } => ErrorKind::ResourceLimit,
        MirrorError::Exhausted { failures, .. } => {
            let all_local = !failures.is_empty()
                && failures
                    .iter()
                    .all(|failure| matches!(failure.error, DownloadError::Io(_)));
            if all_local {
                ErrorKind::Io
            } else {
                ErrorKind::Network
            }
        }
    }
}

fn extraction_kind(err: &ExtractionError) -> ErrorKind {
    match err {
        ExtractionError::Io(_) => ErrorKind::Io,
        ExtractionError::MemberTooLarge { .. } | ExtractionError::SizeLimitExceeded { .. } => {
            ErrorKind::ResourceLimit
        }
        ExtractionError::PathTraversal { .. }
        | ExtractionError::MemberNotFound { .. }
        | ExtractionError::InvalidSize { .. }
        | ExtractionError::SizeMismatch { .. } => ErrorKind::Integrity,
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

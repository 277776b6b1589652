//! Error types for version tags and platforms.
//!
//! Each variant provides a descriptive message identifying the invalid input
//! and the constraint that was violated.

use thiserror::Error;

/// Errors arising from invalid artefact-related values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtefactError {
    /// The host operating system has no published runtime library.
    #[error("unsupported OS for local runtime download: {os}")]
    UnsupportedOs {
        /// The rejected operating system identifier.
        os: String,
    },

    /// The host architecture has no published runtime library for its OS.
    #[error("unsupported architecture for {os} local runtime download: {arch}")]
    UnsupportedArch {
        /// The operating system identifier.
        os: String,
        /// The rejected architecture identifier.
        arch: String,
    },

    /// A version tag contains characters outside the allowlist.
    #[error(
        "local library version must contain only ASCII letters, digits, '.', '_' and '-': {value:?}"
    )]
    InvalidVersionTag {
        /// The rejected version string.
        value: String,
    },

    /// A version tag normalised to nothing where a concrete version is needed.
    #[error("local library version cannot be empty")]
    EmptyVersionTag,
}

/// Result type alias using [`ArtefactError`].
pub type Result<T> = std::result::Result<T, ArtefactError>;

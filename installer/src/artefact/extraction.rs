//! Single-member extraction from `.tar.gz` release archives.
//!
//! Only the named library is written. Every entry path is checked for
//! traversal (absolute paths or `..` components reject the whole archive),
//! and the copy is capped independently of the size the tar header declares.

use flate2::read::GzDecoder;
use log::debug;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path};
use thiserror::Error;

/// Permission bits applied to the extracted library.
#[cfg(unix)]
const LIBRARY_FILE_MODE: u32 = 0o700;

/// Permission bits applied to the directory holding the library.
#[cfg(unix)]
const LIBRARY_DIR_MODE: u32 = 0o700;

/// Trait for extracting a library from an archive, enabling test mocking.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::extraction::TarGzExtractor;
///
/// let extractor = TarGzExtractor::new(500 * 1024 * 1024);
/// // Use extractor.extract_member(archive, "libchroma_shim.so", dest) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactExtractor {
    /// Extract `member` from the archive at `archive_path` to `dest_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
    /// escape the destination, [`ExtractionError::MemberNotFound`] if no
    /// regular file is named `member`, a size error if the member is empty
    /// or too large, and [`ExtractionError::Io`] on I/O failures.
    fn extract_member(
        &self,
        archive_path: &Path,
        member: &str,
        dest_path: &Path,
    ) -> Result<(), ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive has no regular file with the requested name.
    #[error("library {member} not found in archive")]
    MemberNotFound {
        /// The requested member name.
        member: String,
    },

    /// The tar header declares an empty member.
    #[error("library {member} has invalid size {size} in archive")]
    InvalidSize {
        /// The requested member name.
        member: String,
        /// The declared size.
        size: u64,
    },

    /// The tar header declares a member above the size limit.
    #[error("library {member} exceeds max allowed size: {size} bytes > {max} bytes")]
    MemberTooLarge {
        /// The requested member name.
        member: String,
        /// The declared size.
        size: u64,
        /// The configured limit.
        max: u64,
    },

    /// More bytes than the limit were read for the member.
    #[error("extracted library {member} exceeds max allowed size of {max} bytes")]
    SizeLimitExceeded {
        /// The requested member name.
        member: String,
        /// The configured limit.
        max: u64,
    },

    /// The number of bytes written differs from the declared size.
    #[error("extracted library size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        /// The declared size.
        expected: u64,
        /// The number of bytes written.
        actual: u64,
    },
}

impl ExtractionError {
    /// Whether the failure is a size-limit violation.
    #[must_use]
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::MemberTooLarge { .. } | Self::SizeLimitExceeded { .. }
        )
    }
}

/// Default extractor using the `flate2` and `tar` crates.
///
/// Validates each entry path before inspecting it to guard against path
/// traversal attacks (zip-slip).
#[derive(Debug, Clone, Copy)]
pub struct TarGzExtractor {
    max_bytes: u64,
}

impl TarGzExtractor {
    /// Create an extractor that refuses members larger than `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    fn write_member(
        &self,
        entry: &mut impl Read,
        member: &str,
        declared: u64,
        dest_path: &Path,
    ) -> Result<(), ExtractionError> {
        prepare_parent(dest_path)?;
        let mut out = create_library_file(dest_path)?;
        let result = copy_bounded(entry, &mut out, member, declared, self.max_bytes)
            .and_then(|()| out.sync_all().map_err(ExtractionError::from));
        drop(out);
        if let Err(err) = result {
            let _ = fs::remove_file(dest_path);
            return Err(err);
        }
        set_library_permissions(dest_path)?;
        debug!("extracted {member} ({declared} bytes) to {}", dest_path.display());
        Ok(())
    }
}

impl ArtefactExtractor for TarGzExtractor {
    fn extract_member(
        &self,
        archive_path: &Path,
        member: &str,
        dest_path: &Path,
    ) -> Result<(), ExtractionError> {
        let file = fs::File::open(archive_path)?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));

        for entry_result in archive.entries()? {
            let mut entry = entry_result?;
            let entry_path = entry.path()?.into_owned();

            validate_entry_path(&entry_path)?;

            if !entry.header().entry_type().is_file() || !member_matches(&entry_path, member) {
                continue;
            }

            let declared = entry.header().size()?;
            if declared == 0 {
                return Err(ExtractionError::InvalidSize {
                    member: member.to_owned(),
                    size: declared,
                });
            }
            if declared > self.max_bytes {
                return Err(ExtractionError::MemberTooLarge {
                    member: member.to_owned(),
                    size: declared,
                    max: self.max_bytes,
                });
            }
            return self.write_member(&mut entry, member, declared, dest_path);
        }

        Err(ExtractionError::MemberNotFound {
            member: member.to_owned(),
        })
    }
}

/// Whether an entry path names `member`, allowing a leading `./`.
fn member_matches(entry_path: &Path, member: &str) -> bool {
    let wanted = Path::new(member);
    entry_path == wanted
        || entry_path
            .strip_prefix(".")
            .is_ok_and(|stripped| stripped == wanted)
}

fn copy_bounded(
    entry: &mut impl Read,
    out: &mut fs::File,
    member: &str,
    declared: u64,
    max_bytes: u64,
) -> Result<(), ExtractionError> {
    let mut limited = entry.take(max_bytes.saturating_add(1));
    let written = io::copy(&mut limited, out)?;
    if written > max_bytes {
        return Err(ExtractionError::SizeLimitExceeded {
            member: member.to_owned(),
            max: max_bytes,
        });
    }
    if written != declared {
        return Err(ExtractionError::SizeMismatch {
            expected: declared,
            actual: written,
        });
    }
    Ok(())
}

fn prepare_parent(dest_path: &Path) -> io::Result<()> {
    let Some(parent) = dest_path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };
    fs::create_dir_all(parent)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(parent, fs::Permissions::from_mode(LIBRARY_DIR_MODE))?;
    }
    Ok(())
}

fn create_library_file(dest_path: &Path) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(LIBRARY_FILE_MODE);
    }
    options.open(dest_path)
}

/// Apply fixed permissions regardless of the process umask or archive mode.
fn set_library_permissions(dest_path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest_path, fs::Permissions::from_mode(LIBRARY_FILE_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = dest_path;
    }
    Ok(())
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    if path.is_absolute() || path.has_root() {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(ExtractionError::PathTraversal {
                path: path.display().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;

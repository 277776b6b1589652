//! Directory resolution abstraction for the library cache.
//!
//! The cache root defaults to `<home>/.cache/chroma/local_shim` on every
//! platform so that separately built clients sharing a home directory also
//! share one cache. The home directory comes from `directories-next` behind
//! the [`BaseDirs`] trait so tests can substitute it.

use camino::Utf8PathBuf;
use std::path::PathBuf;

use crate::error::{InstallerError, Result};

/// Abstraction over platform directories, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Return the current user's home directory, if known.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }
}

/// Build the default cache root: `<home>/.cache/chroma/local_shim`.
///
/// # Errors
///
/// Returns [`InstallerError::CacheDir`] when the home directory is unknown
/// or not valid UTF-8.
pub fn default_cache_dir(dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    let home = dirs.home_dir().ok_or_else(|| InstallerError::CacheDir {
        reason: "home directory is unknown".to_owned(),
    })?;
    let home = Utf8PathBuf::from_path_buf(home).map_err(|path| InstallerError::CacheDir {
        reason: format!("home directory is not valid UTF-8: {}", path.display()),
    })?;
    Ok(home.join(".cache").join("chroma").join("local_shim"))
}

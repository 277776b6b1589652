//! Configuration and resolution of the Chroma local runtime library.
//!
//! Embedded-runtime clients call [`resolve_library_path`] with a
//! [`LocalRuntimeConfig`] to obtain the path of the shared library to load.
//! The heavy lifting (mirror downloads, signature and checksum
//! verification, extraction and cross-process locking) lives in the
//! `chroma-local-installer` crate.

pub mod config;

use camino::Utf8PathBuf;

pub use chroma_local_installer::error::{ErrorKind, InstallerError};
pub use config::{ConfigError, DownloadSettings, LibrarySettings, LocalRuntimeConfig};

/// Resolve the local runtime library path for `config`.
///
/// An explicit `library.path` is returned unchecked, then `CHROMA_LIB_PATH`,
/// and otherwise the library is downloaded into the cache when
/// `library.auto_download` is set.
///
/// # Errors
///
/// Returns an [`InstallerError`] whose [`InstallerError::kind`] classifies
/// the failure.
///
/// # Examples
///
/// ```
/// use chroma_local::{LocalRuntimeConfig, resolve_library_path};
///
/// let config = LocalRuntimeConfig::from_toml_str("[library]\npath = \"/opt/chroma/libchroma_shim.so\"\n")
///     .expect("valid config");
/// let path = resolve_library_path(&config).expect("explicit path");
/// assert_eq!(path, "/opt/chroma/libchroma_shim.so");
/// ```
pub fn resolve_library_path(config: &LocalRuntimeConfig) -> Result<Utf8PathBuf, InstallerError> {
    let (resolver, environment) = config.clone().into_parts();
    chroma_local_installer::resolver::resolve_library_path(&resolver, &environment)
}

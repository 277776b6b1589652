//! Resolution of the local runtime library path.
//!
//! [`resolve_library_path`] decides, in order:
//!
//! 1. an explicitly configured path, returned verbatim;
//! 2. the `CHROMA_LIB_PATH` environment variable, returned verbatim;
//! 3. failure when auto-download is disabled;
//! 4. otherwise the configured or detected version is validated before any
//!    cache or network access, and the download pipeline populates
//!    `<cache>/<version>/<platform>/<library>`.
//!
//! The environment-facing capabilities sit behind [`RuntimeEnvironment`] so
//! tests can observe which ones a resolution touched.

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::artefact::version_tag::{LibraryVersionTag, normalize_version_tag};
use crate::artefact::verification::TrustPolicy;
use crate::budget::{DownloadBudget, ReleaseMirrors};
use crate::dirs::{SystemBaseDirs, default_cache_dir};
use crate::error::{InstallerError, Result};
use crate::pipeline::ensure_library_downloaded;

/// Environment variable holding an explicit library path.
pub const LIBRARY_PATH_ENV: &str = "CHROMA_LIB_PATH";

/// Library version used when none is configured and none was pinned at
/// build time.
pub const DEFAULT_LIBRARY_VERSION: &str = "v0.3.1";

/// What the caller configured for library resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Explicit library path; wins over everything else.
    pub library_path: Option<Utf8PathBuf>,
    /// Library version to download; detected when unset.
    pub library_version: Option<String>,
    /// Cache root; `<home>/.cache/chroma/local_shim` when unset.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Whether the library may be downloaded.
    pub auto_download: bool,
}

/// Environment capabilities used during resolution.
#[cfg_attr(test, mockall::automock)]
pub trait RuntimeEnvironment {
    /// Return the library path from the environment, if set.
    fn library_path_override(&self) -> Option<Utf8PathBuf>;

    /// Return the library version this build expects, unvalidated.
    fn detect_version(&self) -> String;

    /// Return the default cache root.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::CacheDir`] when it cannot be determined.
    fn default_cache_dir(&self) -> Result<Utf8PathBuf>;

    /// Ensure the library for `version` is present under `cache_dir` and
    /// return its path.
    ///
    /// # Errors
    ///
    /// Returns the pipeline failure.
    fn ensure_downloaded(
        &self,
        version: &LibraryVersionTag,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf>;
}

/// The process environment, the home directory and the HTTP pipeline.
#[derive(Debug, Clone, Default)]
pub struct SystemEnvironment {
    /// Download limits and lock timings.
    pub budget: DownloadBudget,
    /// Release mirrors.
    pub mirrors: ReleaseMirrors,
    /// Signature trust policy.
    pub trust: TrustPolicy,
}

impl RuntimeEnvironment for SystemEnvironment {
    fn library_path_override(&self) -> Option<Utf8PathBuf> {
        let raw = std::env::var_os(LIBRARY_PATH_ENV)?.into_string().ok()?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Utf8PathBuf::from(trimmed))
    }

    fn detect_version(&self) -> String {
        option_env!("CHROMA_LOCAL_LIBRARY_VERSION")
            .unwrap_or(DEFAULT_LIBRARY_VERSION)
            .to_owned()
    }

    fn default_cache_dir(&self) -> Result<Utf8PathBuf> {
        default_cache_dir(&SystemBaseDirs)
    }

    fn ensure_downloaded(
        &self,
        version: &LibraryVersionTag,
        cache_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        ensure_library_downloaded(version, cache_dir, &self.budget, &self.mirrors, &self.trust)
    }
}

/// Resolve the runtime library path for `config`.
///
/// # Errors
///
/// Returns [`InstallerError::NotConfigured`] when nothing is configured and
/// auto-download is off, [`InstallerError::InvalidVersion`] or
/// [`InstallerError::InvalidDetectedVersion`] for a bad version tag, and
/// any error from the download pipeline.
pub fn resolve_library_path(
    config: &ResolverConfig,
    env: &dyn RuntimeEnvironment,
) -> Result<Utf8PathBuf> {
    if let Some(path) = non_blank(config.library_path.as_deref()) {
        debug!("using configured local runtime library {path}");
        return Ok(path.to_owned());
    }
    if let Some(path) = env.library_path_override() {
        debug!("using local runtime library from {LIBRARY_PATH_ENV}: {path}");
        return Ok(path);
    }
    if !config.auto_download {
        return Err(InstallerError::NotConfigured);
    }

    let version = resolve_version(config.library_version.as_deref(), env)?;
    let cache_dir = match non_blank(config.cache_dir.as_deref()) {
        Some(dir) => dir.to_owned(),
        None => env.default_cache_dir()?,
    };
    debug!("resolving local runtime library {version} in {cache_dir}");
    env.ensure_downloaded(&version, &cache_dir)
}

fn non_blank(path: Option<&Utf8Path>) -> Option<&Utf8Path> {
    path.filter(|path| !path.as_str().trim().is_empty())
}

/// Validate the configured version, or the detected one when the
/// configured value is absent or a placeholder. A placeholder detection
/// falls back to [`DEFAULT_LIBRARY_VERSION`].
fn resolve_version(
    configured: Option<&str>,
    env: &dyn RuntimeEnvironment,
) -> Result<LibraryVersionTag> {
    if let Some(raw) = configured {
        let normalized = normalize_version_tag(raw)
            .map_err(|source| InstallerError::InvalidVersion { source })?;
        if !normalized.is_empty() {
            return LibraryVersionTag::try_from(normalized)
                .map_err(|source| InstallerError::InvalidVersion { source });
        }
    }
    let detected = normalize_version_tag(&env.detect_version())
        .map_err(|source| InstallerError::InvalidDetectedVersion { source })?;
    let tag = if detected.is_empty() {
        DEFAULT_LIBRARY_VERSION
    } else {
        detected.as_str()
    };
    LibraryVersionTag::try_from(tag)
        .map_err(|source| InstallerError::InvalidDetectedVersion { source })
}

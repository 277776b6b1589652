//! Local runtime configuration loaded from TOML.
//!
//! Client construction reads a `[library]` table describing where the local
//! runtime library lives (or whether it may be downloaded) and an optional
//! `[download]` table overriding the installer's production limits and
//! mirrors. Every field is optional: an empty document yields the defaults,
//! which resolve the library only through `CHROMA_LIB_PATH`.
//!
//! ```toml
//! [library]
//! auto_download = true
//! version = "v0.3.1"
//!
//! [download]
//! attempts = 5
//! fallback_base_url = ""
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use chroma_local_installer::budget::{DownloadBudget, ReleaseMirrors};
use chroma_local_installer::resolver::{ResolverConfig, SystemEnvironment};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a [`LocalRuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read local runtime config {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid.
    #[error("invalid local runtime config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for locating the local runtime library.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalRuntimeConfig {
    /// Where the library lives and whether it may be downloaded.
    pub library: LibrarySettings,
    /// Overrides for download limits and release mirrors.
    pub download: DownloadSettings,
}

/// The `[library]` table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LibrarySettings {
    /// Explicit library path. It is returned as-is, without existence
    /// checks, and takes precedence over `CHROMA_LIB_PATH`.
    pub path: Option<Utf8PathBuf>,
    /// Library version to download; the version pinned at build time is
    /// used when unset.
    pub version: Option<String>,
    /// Cache root for downloaded libraries.
    pub cache_dir: Option<Utf8PathBuf>,
    /// Whether the library may be downloaded when no path is configured.
    pub auto_download: bool,
}

/// The `[download]` table. Unset values keep the production defaults.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadSettings {
    /// Largest accepted download or extracted library, in bytes.
    pub max_artifact_bytes: Option<u64>,
    /// Attempts against each mirror.
    pub attempts: Option<u32>,
    /// Seconds to wait for another process holding the download lock.
    pub lock_wait_timeout_secs: Option<u64>,
    /// Seconds after which an unrefreshed lock file is considered abandoned.
    pub lock_stale_after_secs: Option<u64>,
    /// Seconds between lock heartbeats; zero disables the heartbeat.
    pub heartbeat_interval_secs: Option<u64>,
    /// Primary release mirror.
    pub primary_base_url: Option<String>,
    /// Fallback release mirror. A blank value disables the fallback.
    pub fallback_base_url: Option<String>,
}

impl LocalRuntimeConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, wrongly typed
    /// values and unknown fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use chroma_local::LocalRuntimeConfig;
    ///
    /// let config = LocalRuntimeConfig::from_toml_str("[library]\nauto_download = true\n")
    ///     .expect("valid config");
    /// assert!(config.library.auto_download);
    /// assert!(config.library.path.is_none());
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_owned(),
            source: error,
        })?;
        Self::from_toml_str(&source)
    }

    /// Split the configuration into the installer's resolver inputs and
    /// production environment.
    #[must_use]
    pub fn into_parts(self) -> (ResolverConfig, SystemEnvironment) {
        let resolver = ResolverConfig {
            library_path: self.library.path,
            library_version: self.library.version,
            cache_dir: self.library.cache_dir,
            auto_download: self.library.auto_download,
        };
        let environment = SystemEnvironment {
            budget: self.download.budget(),
            mirrors: self.download.mirrors(),
            ..SystemEnvironment::default()
        };
        (resolver, environment)
    }
}

impl DownloadSettings {
    fn budget(&self) -> DownloadBudget {
        let defaults = DownloadBudget::default();
        let mut lock = defaults.lock;
        if let Some(secs) = self.lock_wait_timeout_secs {
            lock.wait_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.lock_stale_after_secs {
            lock.stale_after = Duration::from_secs(secs);
        }
        if let Some(secs) = self.heartbeat_interval_secs {
            lock.heartbeat_interval = Duration::from_secs(secs);
        }
        DownloadBudget {
            max_artifact_bytes: self
                .max_artifact_bytes
                .unwrap_or(defaults.max_artifact_bytes),
            attempts_per_mirror: self.attempts.unwrap_or(defaults.attempts_per_mirror),
            lock,
            ..defaults
        }
    }

    fn mirrors(&self) -> ReleaseMirrors {
        let defaults = ReleaseMirrors::default();
        ReleaseMirrors::new(
            self.primary_base_url
                .clone()
                .unwrap_or(defaults.primary),
            self.fallback_base_url.clone().or(defaults.fallback),
        )
    }
}

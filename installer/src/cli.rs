//! CLI argument definitions for the local runtime installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::budget::{
    DEFAULT_FALLBACK_BASE_URL, DEFAULT_PRIMARY_BASE_URL, DownloadBudget, ReleaseMirrors,
};
use crate::resolver::{ResolverConfig, SystemEnvironment};
use camino::Utf8PathBuf;
use clap::Parser;
use std::time::Duration;

/// Download, verify and cache the Chroma local runtime library.
#[derive(Parser, Debug, Clone)]
#[command(name = "chroma-local-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Download, verify and cache the Chroma local runtime library.\n\n",
    "The library archive is fetched from the release mirrors, its checksum is ",
    "checked against the signed SHA256SUMS manifest, and the library is ",
    "extracted into a version-scoped cache directory shared by every process ",
    "on this machine. The resolved library path is printed to stdout.\n\n",
    "If CHROMA_LIB_PATH is set, its value is printed without downloading.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Pre-populate the default cache in a CI image:\n",
    "    $ chroma-local-installer --quiet\n\n",
    "  Install a specific version into a custom cache:\n",
    "    $ chroma-local-installer --library-version v0.3.1 --cache-dir /opt/chroma\n\n",
    "  Use only an internal mirror:\n",
    "    $ chroma-local-installer --base-url https://mirror.internal/chroma --fallback-url ''",
))]
pub struct Cli {
    /// Library version to install [default: the version this build pins].
    #[arg(long, value_name = "VERSION")]
    pub library_version: Option<String>,

    /// Cache root [default: ~/.cache/chroma/local_shim].
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<Utf8PathBuf>,

    /// Primary release mirror.
    #[arg(long, value_name = "URL", default_value = DEFAULT_PRIMARY_BASE_URL)]
    pub base_url: String,

    /// Fallback release mirror; an empty value disables the fallback.
    #[arg(long, value_name = "URL", default_value = DEFAULT_FALLBACK_BASE_URL)]
    pub fallback_url: String,

    /// Attempts against each mirror before moving on.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub attempts: u32,

    /// Seconds to wait for another process holding the download lock.
    #[arg(long, value_name = "SECS", default_value_t = 45)]
    pub lock_timeout: u64,

    /// Suppress progress output.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// Build the resolver configuration; downloading is always enabled.
    #[must_use]
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            library_path: None,
            library_version: self.library_version.clone(),
            cache_dir: self.cache_dir.clone(),
            auto_download: true,
        }
    }

    /// Build the production environment from the mirror and budget flags.
    #[must_use]
    pub fn environment(&self) -> SystemEnvironment {
        let defaults = DownloadBudget::default();
        let fallback = Some(self.fallback_url.trim().to_owned()).filter(|url| !url.is_empty());
        SystemEnvironment {
            budget: DownloadBudget {
                attempts_per_mirror: self.attempts,
                lock: crate::budget::LockSettings {
                    wait_timeout: Duration::from_secs(self.lock_timeout),
                    ..defaults.lock
                },
                ..defaults
            },
            mirrors: ReleaseMirrors::new(self.base_url.clone(), fallback),
            ..SystemEnvironment::default()
        }
    }
}

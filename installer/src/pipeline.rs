//! Download pipeline that populates one cache entry.
//!
//! The pipeline runs under the cross-process download lock with its
//! heartbeat running:
//!
//! 1. re-check whether another process installed the library while we
//!    waited for the lock;
//! 2. fetch `SHA256SUMS`, `SHA256SUMS.sig` and `SHA256SUMS.pem`, each with
//!    mirror fallback, and verify the manifest signature;
//! 3. look up the archive digest, reuse a cached archive only if it still
//!    matches, otherwise fetch and verify it;
//! 4. extract the library to a staging file and rename it into place.
//!
//! Nothing is extracted from an archive whose digest has not been checked
//! against a manifest whose signature has been verified.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use std::io;
use std::sync::{Mutex, PoisonError};

use crate::artefact::checksums::{checksum_for, verify_artifact_file};
use crate::artefact::download::{ArtefactDownloader, HttpDownloader};
use crate::artefact::extraction::{ArtefactExtractor, TarGzExtractor};
use crate::artefact::mirror::MirrorFetcher;
use crate::artefact::naming::{
    CHECKSUMS_ASSET, CHECKSUMS_CERTIFICATE_ASSET, CHECKSUMS_SIGNATURE_ASSET,
};
use crate::artefact::signature::verify_checksums_signature;
use crate::artefact::target::PlatformAsset;
use crate::artefact::verification::TrustPolicy;
use crate::artefact::version_tag::LibraryVersionTag;
use crate::budget::{DownloadBudget, ReleaseMirrors};
use crate::cache::CacheLayout;
use crate::error::{InstallerError, Result};
use crate::lock::{DownloadLock, create_private_dir};

/// Serialises downloads within this process; the lock file only excludes
/// other processes.
static PROCESS_DOWNLOAD_GUARD: Mutex<()> = Mutex::new(());

/// Download and install the host platform's library for `version` using
/// the production HTTP downloader and `.tar.gz` extractor.
///
/// Returns the library path. An already populated cache entry is returned
/// without network access.
///
/// # Errors
///
/// Returns [`InstallerError::UnsupportedPlatform`] when the host has no
/// published library, and any pipeline failure described on
/// [`DownloadPipeline::ensure_library_downloaded`].
pub fn ensure_library_downloaded(
    version: &LibraryVersionTag,
    cache_root: &Utf8Path,
    budget: &DownloadBudget,
    mirrors: &ReleaseMirrors,
    trust: &TrustPolicy,
) -> Result<Utf8PathBuf> {
    let asset = PlatformAsset::host().map_err(InstallerError::UnsupportedPlatform)?;
    let downloader = HttpDownloader::new(budget);
    let extractor = TarGzExtractor::new(budget.max_artifact_bytes);
    DownloadPipeline::new(budget, mirrors, trust, &downloader, &extractor)
        .ensure_library_downloaded(version, cache_root, asset)
}

/// The download pipeline with injected transport and extraction.
pub struct DownloadPipeline<'a> {
    budget: &'a DownloadBudget,
    mirrors: &'a ReleaseMirrors,
    trust: &'a TrustPolicy,
    downloader: &'a dyn ArtefactDownloader,
    extractor: &'a dyn ArtefactExtractor,
}

impl<'a> DownloadPipeline<'a> {
    /// Create a pipeline. Tests inject mock downloaders and extractors.
    #[must_use]
    pub fn new(
        budget: &'a DownloadBudget,
        mirrors: &'a ReleaseMirrors,
        trust: &'a TrustPolicy,
        downloader: &'a dyn ArtefactDownloader,
        extractor: &'a dyn ArtefactExtractor,
    ) -> Self {
        Self {
            budget,
            mirrors,
            trust,
            downloader,
            extractor,
        }
    }

    /// Ensure `<cache_root>/<version>/<platform>/<library>` exists and
    /// return its path.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Lock`] when the download lock cannot be
    /// acquired or released, [`InstallerError::Download`] when an asset
    /// cannot be fetched, [`InstallerError::Verification`] on signature or
    /// checksum failure, [`InstallerError::Extraction`] when the archive is
    /// unsafe or lacks the library, and [`InstallerError::Filesystem`] for
    /// cache I/O failures.
    pub fn ensure_library_downloaded(
        &self,
        version: &LibraryVersionTag,
        cache_root: &Utf8Path,
        asset: PlatformAsset,
    ) -> Result<Utf8PathBuf> {
        let layout = CacheLayout::new(cache_root, version, asset);
        let library_path = layout.library_path();
        if library_ready(&library_path) {
            debug!("using cached local runtime library {library_path}");
            return Ok(library_path);
        }

        let _guard = PROCESS_DOWNLOAD_GUARD
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let target_dir = layout.target_dir();
        create_private_dir(target_dir.as_std_path())
            .map_err(InstallerError::filesystem("create cache directory", &target_dir))?;

        let lock = DownloadLock::acquire(layout.lock_path().as_std_path(), &self.budget.lock)?;
        let outcome = match lock.start_heartbeat(self.budget.lock.heartbeat_interval) {
            Ok(mut heartbeat) => {
                let outcome = self.populate(version, &layout);
                if let Err(err) = heartbeat.stop() {
                    warn!("{err}");
                }
                outcome
            }
            Err(err) => Err(err.into()),
        };

        match (outcome, lock.release()) {
            (Ok(path), Ok(())) => Ok(path),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!("{release_err}");
                Err(err)
            }
        }
    }

    fn populate(&self, version: &LibraryVersionTag, layout: &CacheLayout) -> Result<Utf8PathBuf> {
        let library_path = layout.library_path();
        if library_ready(&library_path) {
            debug!("local runtime library {library_path} was installed while waiting for the lock");
            return Ok(library_path);
        }

        let fetcher = MirrorFetcher::new(self.downloader, self.mirrors, self.budget);
        let expected = self.verified_archive_digest(&fetcher, version, layout)?;
        self.ensure_archive(&fetcher, version, layout, &expected)?;
        self.install_library(layout)?;
        Ok(library_path)
    }

    /// Fetch and verify the signed manifest, returning the archive digest.
    fn verified_archive_digest(
        &self,
        fetcher: &MirrorFetcher<'_>,
        version: &LibraryVersionTag,
        layout: &CacheLayout,
    ) -> Result<String> {
        let scratch = tempfile::Builder::new()
            .prefix(".checksums-")
            .tempdir_in(layout.target_dir())
            .map_err(InstallerError::filesystem(
                "create scratch directory in",
                layout.target_dir(),
            ))?;
        let fetch = |asset: &str| -> Result<Vec<u8>> {
            let dest = scratch.path().join(asset);
            let base = fetcher.fetch_with_fallback(version, asset, &dest)?;
            debug!("fetched {asset} from {base}");
            fs::read(&dest).map_err(|source| InstallerError::Filesystem {
                action: "read release asset",
                path: Utf8PathBuf::from(asset),
                source,
            })
        };

        let manifest = fetch(CHECKSUMS_ASSET)?;
        let signature = fetch(CHECKSUMS_SIGNATURE_ASSET)?;
        let certificate = fetch(CHECKSUMS_CERTIFICATE_ASSET)?;
        verify_checksums_signature(&manifest, &signature, &certificate, version, self.trust)?;
        Ok(checksum_for(&manifest, &layout.archive_name().filename())?)
    }

    fn ensure_archive(
        &self,
        fetcher: &MirrorFetcher<'_>,
        version: &LibraryVersionTag,
        layout: &CacheLayout,
        expected: &str,
    ) -> Result<()> {
        let archive_path = layout.archive_path();
        if archive_path.is_file() {
            match verify_artifact_file(archive_path.as_std_path(), expected) {
                Ok(()) => {
                    debug!("reusing verified archive {archive_path}");
                    return Ok(());
                }
                Err(err) => {
                    warn!("discarding cached archive {archive_path}: {err}");
                    remove_if_present(&archive_path)
                        .map_err(InstallerError::filesystem("remove cached archive", &archive_path))?;
                }
            }
        }

        let archive_name = layout.archive_name().filename();
        let base = fetcher.fetch_with_fallback(version, &archive_name, archive_path.as_std_path())?;
        debug!("fetched {archive_name} from {base}");
        if let Err(err) = verify_artifact_file(archive_path.as_std_path(), expected) {
            if let Err(remove_err) = remove_if_present(&archive_path) {
                warn!("failed to remove rejected archive {archive_path}: {remove_err}");
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn install_library(&self, layout: &CacheLayout) -> Result<()> {
        let staging = layout.staging_library_path();
        let library_path = layout.library_path();
        remove_if_present(&staging)
            .map_err(InstallerError::filesystem("remove stale staging file", &staging))?;

        let member = layout.archive_name().asset().library_file_name();
        if let Err(err) = self.extractor.extract_member(
            layout.archive_path().as_std_path(),
            member,
            staging.as_std_path(),
        ) {
            if let Err(remove_err) = remove_if_present(&staging) {
                warn!("failed to remove staging file {staging}: {remove_err}");
            }
            return Err(err.into());
        }

        fs::rename(&staging, &library_path)
            .map_err(InstallerError::filesystem("install library at", &library_path))?;
        if !library_ready(&library_path) {
            return Err(InstallerError::LibraryMissing { path: library_path });
        }
        debug!("installed local runtime library {library_path}");
        Ok(())
    }
}

/// Whether `path` is a non-empty regular file.
fn library_ready(path: &Utf8Path) -> bool {
    fs::metadata(path).is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
}

fn remove_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

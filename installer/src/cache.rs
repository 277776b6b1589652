//! Layout of the version-scoped library cache.
//!
//! ```text
//! <root>/.download.lock
//! <root>/<version>/<platform>/<library file>
//! <root>/<version>/<platform>/<archive name>
//! ```
//!
//! Everything below `<root>/<version>/<platform>` is written once under the
//! download lock and never modified afterwards.

use camino::{Utf8Path, Utf8PathBuf};

use crate::artefact::naming::ArchiveName;
use crate::artefact::target::PlatformAsset;
use crate::artefact::version_tag::LibraryVersionTag;
use crate::lock::LOCK_FILE_NAME;

/// Suffix of the staging file extraction writes before renaming.
const STAGING_SUFFIX: &str = ".tmp";

/// Paths for one `(version, platform)` entry of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: Utf8PathBuf,
    version: LibraryVersionTag,
    asset: PlatformAsset,
}

impl CacheLayout {
    /// Describe the cache entry for `version` and `asset` under `root`.
    #[must_use]
    pub fn new(root: &Utf8Path, version: &LibraryVersionTag, asset: PlatformAsset) -> Self {
        Self {
            root: root.to_owned(),
            version: version.clone(),
            asset,
        }
    }

    /// Return the lock file guarding the whole cache root.
    #[must_use]
    pub fn lock_path(&self) -> Utf8PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Return `<root>/<version>/<platform>`.
    #[must_use]
    pub fn target_dir(&self) -> Utf8PathBuf {
        self.root
            .join(self.version.as_str())
            .join(self.asset.platform())
    }

    /// Return the final library path.
    #[must_use]
    pub fn library_path(&self) -> Utf8PathBuf {
        self.target_dir().join(self.asset.library_file_name())
    }

    /// Return the path extraction writes before the final rename.
    #[must_use]
    pub fn staging_library_path(&self) -> Utf8PathBuf {
        let mut name = self.asset.library_file_name().to_owned();
        name.push_str(STAGING_SUFFIX);
        self.target_dir().join(name)
    }

    /// Return the archive's name for this entry.
    #[must_use]
    pub fn archive_name(&self) -> ArchiveName {
        ArchiveName::new(&self.version, self.asset)
    }

    /// Return where the downloaded archive is kept.
    #[must_use]
    pub fn archive_path(&self) -> Utf8PathBuf {
        self.asset_path(&self.archive_name().filename())
    }

    /// Return where a downloaded release asset named `name` is kept.
    #[must_use]
    pub fn asset_path(&self, name: &str) -> Utf8PathBuf {
        self.target_dir().join(name)
    }
}

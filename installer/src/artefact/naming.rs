//! Release asset naming and URL construction.
//!
//! Every version publishes a checksum manifest, its detached signature, the
//! signing certificate and one archive per platform, all under
//! `<base>/<version>/`. Archives are named
//! `chroma-go-local-<version>-<platform>.tar.gz`.

use super::target::PlatformAsset;
use super::version_tag::LibraryVersionTag;
use std::fmt;

/// File name of the checksum manifest asset.
pub const CHECKSUMS_ASSET: &str = "SHA256SUMS";

/// File name of the detached, base64-encoded manifest signature.
pub const CHECKSUMS_SIGNATURE_ASSET: &str = "SHA256SUMS.sig";

/// File name of the base64-wrapped PEM signing certificate.
pub const CHECKSUMS_CERTIFICATE_ASSET: &str = "SHA256SUMS.pem";

/// The fixed prefix for all archive names.
const ARCHIVE_PREFIX: &str = "chroma-go-local";

/// The fixed file extension for archives.
const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// A fully-qualified release archive name.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::naming::ArchiveName;
/// use chroma_local_installer::artefact::target::PlatformAsset;
/// use chroma_local_installer::artefact::version_tag::LibraryVersionTag;
///
/// let version: LibraryVersionTag = "v0.3.1".try_into().expect("valid tag");
/// let asset = PlatformAsset::lookup("linux", "x86_64").expect("supported");
///
/// let name = ArchiveName::new(&version, asset);
/// assert_eq!(name.to_string(), "chroma-go-local-v0.3.1-linux-amd64.tar.gz");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    version: LibraryVersionTag,
    asset: PlatformAsset,
}

impl ArchiveName {
    /// Create an archive name from validated components.
    #[must_use]
    pub fn new(version: &LibraryVersionTag, asset: PlatformAsset) -> Self {
        Self {
            version: version.clone(),
            asset,
        }
    }

    /// Return the version component.
    #[must_use]
    pub fn version(&self) -> &LibraryVersionTag {
        &self.version
    }

    /// Return the platform component.
    #[must_use]
    pub fn asset(&self) -> PlatformAsset {
        self.asset
    }

    /// Return the filename as a string without consuming the value.
    #[must_use]
    pub fn filename(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{ARCHIVE_PREFIX}-{}-{}{ARCHIVE_EXTENSION}",
            self.version,
            self.asset.platform()
        )
    }
}

/// Build the URL of `asset` for `version` beneath a mirror base URL.
///
/// Trailing slashes on the base are ignored.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::naming::asset_url;
/// use chroma_local_installer::artefact::version_tag::LibraryVersionTag;
///
/// let version: LibraryVersionTag = "v0.3.1".try_into().expect("valid tag");
/// assert_eq!(
///     asset_url("https://mirror.test/releases/", &version, "SHA256SUMS"),
///     "https://mirror.test/releases/v0.3.1/SHA256SUMS"
/// );
/// ```
#[must_use]
pub fn asset_url(base: &str, version: &LibraryVersionTag, asset: &str) -> String {
    format!("{}/{version}/{asset}", base.trim_end_matches('/'))
}

//! Platform lookup for the published runtime library builds.
//!
//! Only three OS/architecture pairs have release archives. Any other host is
//! rejected before the resolver touches the network or the cache.

use super::error::{ArtefactError, Result};
use std::fmt;

/// A platform with a published runtime library archive.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::target::PlatformAsset;
///
/// let asset = PlatformAsset::lookup("linux", "x86_64").expect("supported");
/// assert_eq!(asset.platform(), "linux-amd64");
/// assert_eq!(asset.library_file_name(), "libchroma_shim.so");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformAsset {
    platform: &'static str,
    library_file_name: &'static str,
}

impl PlatformAsset {
    /// Resolve the asset for an operating system and architecture pair.
    ///
    /// Accepts both Rust (`std::env::consts`) and release naming
    /// (`darwin`, `amd64`, `arm64`) for the identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ArtefactError::UnsupportedOs`] or
    /// [`ArtefactError::UnsupportedArch`] when no archive is published.
    pub fn lookup(os: &str, arch: &str) -> Result<Self> {
        let arch_name = match arch {
            "x86_64" | "amd64" => "amd64",
            "aarch64" | "arm64" => "arm64",
            other => other,
        };
        let (platform, library_file_name) = match os {
            "linux" => match arch_name {
                "amd64" => ("linux-amd64", "libchroma_shim.so"),
                _ => return Err(unsupported_arch(os, arch)),
            },
            "macos" | "darwin" => match arch_name {
                "arm64" => ("darwin-arm64", "libchroma_shim.dylib"),
                _ => return Err(unsupported_arch(os, arch)),
            },
            "windows" => match arch_name {
                "amd64" => ("windows-amd64", "chroma_shim.dll"),
                _ => return Err(unsupported_arch(os, arch)),
            },
            _ => {
                return Err(ArtefactError::UnsupportedOs { os: os.to_owned() });
            }
        };
        Ok(Self {
            platform,
            library_file_name,
        })
    }

    /// Resolve the asset for the host this binary was compiled for.
    ///
    /// # Errors
    ///
    /// Returns an error when the host platform has no published archive.
    pub fn host() -> Result<Self> {
        Self::lookup(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Return the platform identifier used in archive names and cache paths.
    #[must_use]
    pub fn platform(&self) -> &'static str {
        self.platform
    }

    /// Return the file name of the shared library inside the archive.
    #[must_use]
    pub fn library_file_name(&self) -> &'static str {
        self.library_file_name
    }
}

impl fmt::Display for PlatformAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.platform)
    }
}

fn unsupported_arch(os: &str, arch: &str) -> ArtefactError {
    ArtefactError::UnsupportedArch {
        os: os.to_owned(),
        arch: arch.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::linux("linux", "x86_64", "linux-amd64", "libchroma_shim.so")]
    #[case::linux_release_naming("linux", "amd64", "linux-amd64", "libchroma_shim.so")]
    #[case::macos("macos", "aarch64", "darwin-arm64", "libchroma_shim.dylib")]
    #[case::darwin("darwin", "arm64", "darwin-arm64", "libchroma_shim.dylib")]
    #[case::windows("windows", "x86_64", "windows-amd64", "chroma_shim.dll")]
    fn resolves_supported_platforms(
        #[case] os: &str,
        #[case] arch: &str,
        #[case] platform: &str,
        #[case] library: &str,
    ) {
        let asset = PlatformAsset::lookup(os, arch).expect("supported platform");
        assert_eq!(asset.platform(), platform);
        assert_eq!(asset.library_file_name(), library);
    }

    #[rstest]
    #[case::linux_arm("linux", "aarch64")]
    #[case::macos_intel("macos", "x86_64")]
    #[case::windows_arm("windows", "aarch64")]
    fn rejects_unsupported_architecture(#[case] os: &str, #[case] arch: &str) {
        let err = PlatformAsset::lookup(os, arch).expect_err("unsupported arch");
        assert!(
            matches!(err, ArtefactError::UnsupportedArch { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn rejects_unsupported_os() {
        let err = PlatformAsset::lookup("freebsd", "x86_64").expect_err("unsupported os");
        assert_eq!(err.to_string(), "unsupported OS for local runtime download: freebsd");
    }

    #[test]
    fn display_shows_platform() {
        let asset = PlatformAsset::lookup("windows", "x86_64").expect("supported");
        assert_eq!(asset.to_string(), "windows-amd64");
    }
}

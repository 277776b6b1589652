//! Library version tag normalisation.
//!
//! Version tags are interpolated into cache paths and download URLs, so the
//! accepted alphabet is restricted to ASCII letters, digits, `.`, `_` and
//! `-`. Separators and URL metacharacters never reach a path or a request.

use super::error::{ArtefactError, Result};
use std::fmt;

/// Placeholder reported for unversioned development builds.
const DEVEL_PLACEHOLDER: &str = "(devel)";

fn is_valid_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'
}

/// Normalise a raw version string into its tag form.
///
/// Surrounding whitespace is trimmed and a leading `v` is added when
/// missing. Empty input and the `(devel)` placeholder normalise to the empty
/// string; callers decide whether that is acceptable.
///
/// # Errors
///
/// Returns [`ArtefactError::InvalidVersionTag`] when the value contains any
/// character outside the allowlist.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::version_tag::normalize_version_tag;
///
/// assert_eq!(normalize_version_tag("0.2.0").expect("valid"), "v0.2.0");
/// assert_eq!(normalize_version_tag("(devel)").expect("valid"), "");
/// assert!(normalize_version_tag("../v1").is_err());
/// ```
pub fn normalize_version_tag(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == DEVEL_PLACEHOLDER {
        return Ok(String::new());
    }
    if !trimmed.chars().all(is_valid_tag_char) {
        return Err(ArtefactError::InvalidVersionTag {
            value: trimmed.to_owned(),
        });
    }
    if trimmed.starts_with('v') {
        Ok(trimmed.to_owned())
    } else {
        Ok(format!("v{trimmed}"))
    }
}

/// A normalised, non-empty library version tag (e.g. `v0.3.1`).
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::version_tag::LibraryVersionTag;
///
/// let tag: LibraryVersionTag = "0.3.1".try_into().expect("valid tag");
/// assert_eq!(tag.as_str(), "v0.3.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryVersionTag(String);

impl LibraryVersionTag {
    /// Return the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for LibraryVersionTag {
    type Error = ArtefactError;

    fn try_from(value: &str) -> Result<Self> {
        let normalized = normalize_version_tag(value)?;
        if normalized.is_empty() {
            return Err(ArtefactError::EmptyVersionTag);
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for LibraryVersionTag {
    type Error = ArtefactError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl AsRef<str> for LibraryVersionTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryVersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

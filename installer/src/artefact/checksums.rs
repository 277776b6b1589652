//! Checksum manifest lookup and artefact digest verification.
//!
//! Manifests use the `sha256sum` line format: a hex digest, whitespace, then
//! the file name. The BSD binary-mode marker (`*filename`) is accepted.

use super::sha256_digest::Sha256Digest;
use super::verification::VerificationError;
use std::path::Path;

/// Look up the digest recorded for `filename` in a checksum manifest.
///
/// The returned digest is lowercased. Blank and single-field lines are
/// skipped; the first matching entry wins.
///
/// # Errors
///
/// Returns [`VerificationError::ChecksumNotFound`] when no line names
/// `filename`.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::checksums::checksum_for;
///
/// let manifest = b"DEADBEEF  *lib.tar.gz\n";
/// assert_eq!(checksum_for(manifest, "lib.tar.gz").expect("present"), "deadbeef");
/// ```
pub fn checksum_for(manifest: &[u8], filename: &str) -> Result<String, VerificationError> {
    let text = String::from_utf8_lossy(manifest);
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let digest = fields.next()?;
            let name = fields.next()?;
            Some((digest, name.strip_prefix('*').unwrap_or(name)))
        })
        .find(|(_, name)| *name == filename)
        .map(|(digest, _)| digest.to_ascii_lowercase())
        .ok_or_else(|| VerificationError::ChecksumNotFound {
            filename: filename.to_owned(),
        })
}

/// Verify that `bytes` hash to `expected`.
///
/// # Errors
///
/// Returns [`VerificationError::ChecksumMismatch`] when the digests differ,
/// or [`VerificationError::MalformedChecksum`] when `expected` is blank.
pub fn verify_artifact(bytes: &[u8], expected: &str) -> Result<(), VerificationError> {
    ensure_expected_present(expected, "in-memory artefact")?;
    compare(&Sha256Digest::of_bytes(bytes), expected, "in-memory artefact")
}

/// Verify that the file at `path` hashes to `expected`.
///
/// # Errors
///
/// Returns [`VerificationError::Read`] when the file cannot be read and
/// [`VerificationError::ChecksumMismatch`] when the digests differ.
pub fn verify_artifact_file(path: &Path, expected: &str) -> Result<(), VerificationError> {
    let subject = path.display().to_string();
    ensure_expected_present(expected, &subject)?;
    let actual = Sha256Digest::of_file(path).map_err(|err| VerificationError::Read {
        path: subject.clone(),
        reason: err.to_string(),
    })?;
    compare(&actual, expected, &subject)
}

fn ensure_expected_present(expected: &str, subject: &str) -> Result<(), VerificationError> {
    if expected.trim().is_empty() {
        return Err(VerificationError::MalformedChecksum {
            filename: subject.to_owned(),
            reason: "expected checksum cannot be empty".to_owned(),
        });
    }
    Ok(())
}

fn compare(actual: &Sha256Digest, expected: &str, subject: &str) -> Result<(), VerificationError> {
    if actual.matches_hex(expected) {
        Ok(())
    } else {
        Err(VerificationError::ChecksumMismatch {
            subject: subject.to_owned(),
            expected: expected.trim().to_ascii_lowercase(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ABC_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[rstest]
    #[case::bsd_uppercase("DEADBEEF  *filename\n")]
    #[case::gnu_lowercase("deadbeef  filename\n")]
    #[case::among_others("0000  other\ndeadbeef  filename\nffff  third\n")]
    #[case::crlf_and_blank_lines("\r\n\r\ndeadbeef  filename\r\n")]
    fn resolves_checksum_in_both_formats(#[case] manifest: &str) {
        let digest = checksum_for(manifest.as_bytes(), "filename").expect("entry present");
        assert_eq!(digest, "deadbeef");
    }

    #[test]
    fn missing_entry_is_reported() {
        let err = checksum_for(b"deadbeef  other\n", "filename").expect_err("absent");
        assert_eq!(err.to_string(), "checksum entry not found for asset filename");
    }

    #[test]
    fn name_must_match_exactly() {
        let result = checksum_for(b"deadbeef  filename.bak\n", "filename");
        assert!(result.is_err());
    }

    #[test]
    fn verify_artifact_accepts_matching_bytes() {
        assert!(verify_artifact(b"abc", ABC_DIGEST).is_ok());
        assert!(verify_artifact(b"abc", &ABC_DIGEST.to_ascii_uppercase()).is_ok());
    }

    #[test]
    fn verify_artifact_rejects_mismatch() {
        let err = verify_artifact(b"abd", ABC_DIGEST).expect_err("mismatch");
        assert!(err.to_string().contains("checksum verification failed"));
    }

    #[test]
    fn verify_artifact_rejects_empty_expectation() {
        let err = verify_artifact(b"abc", "  ").expect_err("empty");
        assert!(matches!(err, VerificationError::MalformedChecksum { .. }));
    }

    #[test]
    fn verify_artifact_file_hashes_contents() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("archive.tar.gz");
        std::fs::write(&path, b"abc").expect("write file");

        assert!(verify_artifact_file(&path, ABC_DIGEST).is_ok());
        let err = verify_artifact_file(&path, &"0".repeat(64)).expect_err("mismatch");
        assert!(err.to_string().contains("checksum verification failed"));
    }

    #[test]
    fn verify_artifact_file_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = verify_artifact_file(&dir.path().join("absent"), ABC_DIGEST)
            .expect_err("missing file");
        assert!(matches!(err, VerificationError::Read { .. }));
    }
}

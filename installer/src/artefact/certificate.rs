//! Signing certificate decoding and validation.
//!
//! The release pipeline publishes its short-lived signing certificate as a
//! base64-wrapped PEM document. [`SigningCertificate::from_asset`] accepts
//! either the wrapped form or plain PEM, and
//! [`SigningCertificate::validate`] applies the trust checks in a fixed order,
//! stopping at the first failure.

use super::verification::{OIDC_ISSUER_EXTENSION_OID, SignatureError, TrustAnchors};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use std::time::{SystemTime, UNIX_EPOCH};
use x509_parser::der_parser::der::parse_der_utf8string;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, X509Certificate};

/// PEM label required for the certificate block.
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Decode a base64 payload, tolerating embedded whitespace and missing
/// padding.
///
/// # Errors
///
/// Returns [`SignatureError::EmptyPayload`] when nothing remains after
/// stripping whitespace and [`SignatureError::InvalidBase64`] when neither
/// the padded nor the unpadded alphabet accepts the input.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::certificate::decode_base64;
///
/// assert_eq!(decode_base64(b"aGVs\nbG8=", "signature").expect("valid"), b"hello");
/// assert_eq!(decode_base64(b"aGVsbG8", "signature").expect("valid"), b"hello");
/// ```
pub fn decode_base64(raw: &[u8], what: &'static str) -> Result<Vec<u8>, SignatureError> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(SignatureError::EmptyPayload { what });
    }
    STANDARD.decode(&compact).or_else(|padded_err| {
        STANDARD_NO_PAD
            .decode(&compact)
            .map_err(|raw_err| SignatureError::InvalidBase64 {
                what,
                reason: format!("{padded_err}; without padding: {raw_err}"),
            })
    })
}

/// A DER-encoded X.509 certificate extracted from a PEM document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCertificate {
    der: Vec<u8>,
}

impl SigningCertificate {
    /// Decode the certificate release asset, which is either plain PEM or
    /// base64-wrapped PEM.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first decoding failure.
    pub fn from_asset(raw: &[u8]) -> Result<Self, SignatureError> {
        let trimmed = raw.trim_ascii();
        if trimmed.is_empty() {
            return Err(SignatureError::EmptyPayload {
                what: "certificate",
            });
        }
        if contains(trimmed, b"BEGIN CERTIFICATE") {
            return Self::from_pem(trimmed);
        }
        let pem = decode_base64(trimmed, "certificate")?;
        Self::from_pem(&pem)
    }

    /// Decode a single PEM `CERTIFICATE` block with no trailing data.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidPem`] when the framing is wrong and
    /// [`SignatureError::InvalidCertificate`] when the DER is malformed.
    pub fn from_pem(pem: &[u8]) -> Result<Self, SignatureError> {
        let (remainder, block) =
            parse_x509_pem(pem.trim_ascii()).map_err(|err| SignatureError::InvalidPem {
                reason: format!("failed to decode certificate PEM: {err}"),
            })?;
        if !block.label.trim().eq_ignore_ascii_case(CERTIFICATE_LABEL) {
            return Err(SignatureError::InvalidPem {
                reason: format!(
                    "unexpected PEM block type {:?}: expected {CERTIFICATE_LABEL}",
                    block.label
                ),
            });
        }
        if !remainder.trim_ascii().is_empty() {
            return Err(SignatureError::InvalidPem {
                reason: "certificate PEM contains unexpected trailing data".to_owned(),
            });
        }
        let certificate = Self {
            der: block.contents,
        };
        certificate.parse()?;
        Ok(certificate)
    }

    /// Parse the DER into a borrowed certificate view.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidCertificate`] when the DER is
    /// malformed or followed by trailing bytes.
    pub fn parse(&self) -> Result<X509Certificate<'_>, SignatureError> {
        let (remainder, certificate) =
            X509Certificate::from_der(&self.der).map_err(|err| {
                SignatureError::InvalidCertificate {
                    reason: err.to_string(),
                }
            })?;
        if !remainder.is_empty() {
            return Err(SignatureError::InvalidCertificate {
                reason: format!("{} trailing bytes after certificate", remainder.len()),
            });
        }
        Ok(certificate)
    }

    /// Validate the certificate against the release trust requirements.
    ///
    /// Checks run in order: validity start, chain to `anchors`, code-signing
    /// usage, URI identity, then the OIDC issuer extension. Certificates
    /// past their expiry are accepted because release certificates are
    /// short-lived and downloads happen long after signing.
    ///
    /// # Errors
    ///
    /// Returns the [`SignatureError`] of the first failing check.
    pub fn validate(
        &self,
        expected_identity: &str,
        expected_issuer: &str,
        anchors: &TrustAnchors,
    ) -> Result<(), SignatureError> {
        let certificate = self.parse()?;
        ensure_started(&certificate)?;
        verify_chain(&certificate, anchors)?;
        ensure_code_signing(&certificate)?;
        ensure_identity(&certificate, expected_identity)?;
        ensure_issuer(&certificate, expected_issuer)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

fn ensure_started(certificate: &X509Certificate<'_>) -> Result<(), SignatureError> {
    let not_before = &certificate.validity().not_before;
    if not_before.timestamp() > unix_now() {
        return Err(SignatureError::NotYetValid {
            not_before: not_before.to_string(),
        });
    }
    Ok(())
}

fn ensure_code_signing(certificate: &X509Certificate<'_>) -> Result<(), SignatureError> {
    match certificate.extended_key_usage() {
        Ok(Some(usage)) if usage.value.code_signing => Ok(()),
        _ => Err(SignatureError::MissingCodeSigningUsage),
    }
}

fn ensure_identity(
    certificate: &X509Certificate<'_>,
    expected: &str,
) -> Result<(), SignatureError> {
    let matches = certificate
        .subject_alternative_name()
        .ok()
        .flatten()
        .is_some_and(|san| {
            san.value
                .general_names
                .iter()
                .any(|name| matches!(name, GeneralName::URI(uri) if *uri == expected))
        });
    if matches {
        Ok(())
    } else {
        Err(SignatureError::IdentityMismatch {
            expected: expected.to_owned(),
        })
    }
}

fn ensure_issuer(certificate: &X509Certificate<'_>, expected: &str) -> Result<(), SignatureError> {
    let extension = certificate
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == OIDC_ISSUER_EXTENSION_OID)
        .ok_or(SignatureError::MissingIssuer {
            oid: OIDC_ISSUER_EXTENSION_OID,
        })?;
    let actual = decode_issuer(extension.value).ok_or(SignatureError::UndecodableIssuer {
        oid: OIDC_ISSUER_EXTENSION_OID,
    })?;
    if actual == expected {
        Ok(())
    } else {
        Err(SignatureError::IssuerMismatch {
            expected: expected.to_owned(),
            actual,
        })
    }
}

/// Decode the issuer extension value.
///
/// Newer certificates wrap the issuer in a DER `UTF8String`; older ones
/// store the raw UTF-8 bytes.
fn decode_issuer(value: &[u8]) -> Option<String> {
    if let Ok((remainder, object)) = parse_der_utf8string(value) {
        if remainder.is_empty() {
            if let Ok(text) = object.as_str() {
                return Some(text.to_owned());
            }
        }
    }
    let text = std::str::from_utf8(value).ok()?.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn parse_anchors(pems: &[String]) -> Result<Vec<SigningCertificate>, SignatureError> {
    pems.iter()
        .map(|pem| {
            SigningCertificate::from_pem(pem.as_bytes()).map_err(|err| {
                SignatureError::UntrustedChain {
                    reason: format!("failed to load trust anchor: {err}"),
                }
            })
        })
        .collect()
}

fn verify_chain(leaf: &X509Certificate<'_>, anchors: &TrustAnchors) -> Result<(), SignatureError> {
    let root_anchors = parse_anchors(&anchors.roots)?;
    let intermediate_anchors = parse_anchors(&anchors.intermediates)?;
    let roots = root_anchors
        .iter()
        .map(SigningCertificate::parse)
        .collect::<Result<Vec<_>, _>>()?;
    let intermediates = intermediate_anchors
        .iter()
        .map(SigningCertificate::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if roots.is_empty() {
        return Err(SignatureError::UntrustedChain {
            reason: "no root certificates configured".to_owned(),
        });
    }

    let trusted = if intermediates.is_empty() {
        roots.iter().any(|root| issued_by(leaf, root))
    } else {
        intermediates.iter().any(|intermediate| {
            issued_by(leaf, intermediate) && roots.iter().any(|root| issued_by(intermediate, root))
        })
    };
    if trusted {
        Ok(())
    } else {
        Err(SignatureError::UntrustedChain {
            reason: "certificate is not issued by a pinned certificate authority".to_owned(),
        })
    }
}

/// Whether `issuer` is a CA that signed `child` while `issuer` was valid.
fn issued_by(child: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    let issued_at = child.validity().not_before.timestamp();
    let issuer_validity = issuer.validity();
    issuer.is_ca()
        && child.issuer().as_raw() == issuer.subject().as_raw()
        && issued_at >= issuer_validity.not_before.timestamp()
        && issued_at <= issuer_validity.not_after.timestamp()
        && child.verify_signature(Some(issuer.public_key())).is_ok()
}

#[cfg(test)]
#[path = "certificate_tests.rs"]
mod tests;

//! Trust policy and error types for release verification.
//!
//! A [`TrustPolicy`] captures everything needed to decide whether a signed
//! checksum manifest came from the release pipeline: the expected signing
//! identity, the OIDC issuer recorded in the certificate, and the pinned
//! certificate authorities the signing certificate must chain to. The policy
//! is a value type; the checks themselves live in
//! [`certificate`](super::certificate) and [`signature`](super::signature).

use super::version_tag::LibraryVersionTag;
use thiserror::Error;

/// Placeholder substituted with the version tag in identity templates.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Signing identity of the release workflow, parameterised by version.
pub const DEFAULT_IDENTITY_TEMPLATE: &str =
    "https://github.com/amikos-tech/chroma-go-local/.github/workflows/release.yml@refs/tags/{version}";

/// OIDC issuer that authenticated the release workflow.
pub const DEFAULT_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Certificate extension carrying the OIDC issuer.
pub const OIDC_ISSUER_EXTENSION_OID: &str = "1.3.6.1.4.1.57264.1.1";

/// Pinned Sigstore Fulcio intermediate certificate.
///
/// Published at <https://fulcio.sigstore.dev/api/v1/rootCert>.
pub const FULCIO_INTERMEDIATE_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICGjCCAaGgAwIBAgIUALnViVfnU0brJasmRkHrn/UnfaQwCgYIKoZIzj0EAwMw
KjEVMBMGA1UEChMMc2lnc3RvcmUuZGV2MREwDwYDVQQDEwhzaWdzdG9yZTAeFw0y
MjA0MTMyMDA2MTVaFw0zMTEwMDUxMzU2NThaMDcxFTATBgNVBAoTDHNpZ3N0b3Jl
LmRldjEeMBwGA1UEAxMVc2lnc3RvcmUtaW50ZXJtZWRpYXRlMHYwEAYHKoZIzj0C
AQYFK4EEACIDYgAE8RVS/ysH+NOvuDZyPIZtilgUF9NlarYpAd9HP1vBBH1U5CV7
7LSS7s0ZiH4nE7Hv7ptS6LvvR/STk798LVgMzLlJ4HeIfF3tHSaexLcYpSASr1kS
0N/RgBJz/9jWCiXno3sweTAOBgNVHQ8BAf8EBAMCAQYwEwYDVR0lBAwwCgYIKwYB
BQUHAwMwEgYDVR0TAQH/BAgwBgEB/wIBADAdBgNVHQ4EFgQU39Ppz1YkEZb5qNjp
KFWixi4YZD8wHwYDVR0jBBgwFoAUWMAeX5FFpWapesyQoZMi0CrFxfowCgYIKoZI
zj0EAwMDZwAwZAIwPCsQK4DYiZYDPIaDi5HFKnfxXx6ASSVmERfsynYBiX2X6SJR
nZU84/9DZdnFvvxmAjBOt6QpBlc4J/0DxvkTCqpclvziL6BCCPnjdlIB3Pu3BxsP
mygUY7Ii2zbdCdliiow=
-----END CERTIFICATE-----";

/// Pinned Sigstore Fulcio root certificate.
///
/// Published at <https://fulcio.sigstore.dev/api/v1/rootCert>.
pub const FULCIO_ROOT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIIB9zCCAXygAwIBAgIUALZNAPFdxHPwjeDloDwyYChAO/4wCgYIKoZIzj0EAwMw
KjEVMBMGA1UEChMMc2lnc3RvcmUuZGV2MREwDwYDVQQDEwhzaWdzdG9yZTAeFw0y
MTEwMDcxMzU2NTlaFw0zMTEwMDUxMzU2NThaMCoxFTATBgNVBAoTDHNpZ3N0b3Jl
LmRldjERMA8GA1UEAxMIc2lnc3RvcmUwdjAQBgcqhkjOPQIBBgUrgQQAIgNiAAT7
XeFT4rb3PQGwS4IajtLk3/OlnpgangaBclYpsYBr5i+4ynB07ceb3LP0OIOZdxex
X69c5iVuyJRQ+Hz05yi+UF3uBWAlHpiS5sh0+H2GHE7SXrk1EC5m1Tr19L9gg92j
YzBhMA4GA1UdDwEB/wQEAwIBBjAPBgNVHRMBAf8EBTADAQH/MB0GA1UdDgQWBBRY
wB5fkUWlZql6zJChkyLQKsXF+jAfBgNVHSMEGDAWgBRYwB5fkUWlZql6zJChkyLQ
KsXF+jAKBggqhkjOPQQDAwNpADBmAjEAj1nHeXZp+13NWBNa+EDsDP8G1WWg1tCM
WP/WHPqpaVo0jhsweNFZgSs0eE7wYI4qAjEA2WB9ot98sIkoF3vZYdd3/VtWB5b9
TNMea7Ix/stJ5TfcLLeABLE4BNJOsQ4vnBHJ
-----END CERTIFICATE-----";

/// Certificate authorities a signing certificate must chain to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchors {
    /// PEM-encoded root certificates.
    pub roots: Vec<String>,
    /// PEM-encoded intermediate certificates. When empty the signing
    /// certificate must be issued directly by a root.
    pub intermediates: Vec<String>,
}

impl TrustAnchors {
    /// Anchors consisting of a single root and no intermediates.
    #[must_use]
    pub fn with_root(root_pem: impl Into<String>) -> Self {
        Self {
            roots: vec![root_pem.into()],
            intermediates: Vec::new(),
        }
    }
}

impl Default for TrustAnchors {
    /// The pinned Sigstore Fulcio root and intermediate.
    fn default() -> Self {
        Self {
            roots: vec![FULCIO_ROOT_PEM.to_owned()],
            intermediates: vec![FULCIO_INTERMEDIATE_PEM.to_owned()],
        }
    }
}

/// Policy governing which signed checksum manifests are trusted.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::verification::TrustPolicy;
/// use chroma_local_installer::artefact::version_tag::LibraryVersionTag;
///
/// let policy = TrustPolicy::default();
/// let version: LibraryVersionTag = "v0.3.1".try_into().expect("valid tag");
/// assert!(policy.identity_for(&version).ends_with("@refs/tags/v0.3.1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    /// Expected URI SAN, with `{version}` standing in for the version tag.
    pub identity_template: String,
    /// Expected value of the OIDC issuer extension.
    pub oidc_issuer: String,
    /// Certificate authorities the signing certificate must chain to.
    pub anchors: TrustAnchors,
}

impl TrustPolicy {
    /// Return the signing identity expected for `version`.
    #[must_use]
    pub fn identity_for(&self, version: &LibraryVersionTag) -> String {
        self.identity_template
            .replace(VERSION_PLACEHOLDER, version.as_str())
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            identity_template: DEFAULT_IDENTITY_TEMPLATE.to_owned(),
            oidc_issuer: DEFAULT_OIDC_ISSUER.to_owned(),
            anchors: TrustAnchors::default(),
        }
    }
}

/// A failed step while validating a checksum manifest signature.
///
/// These are always reported wrapped in
/// [`VerificationError::ChecksumsSignature`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// A base64 payload was empty after stripping whitespace.
    #[error("{what} payload is empty")]
    EmptyPayload {
        /// Which payload was empty.
        what: &'static str,
    },

    /// A base64 payload could not be decoded with or without padding.
    #[error("invalid base64 payload for {what}: {reason}")]
    InvalidBase64 {
        /// Which payload failed to decode.
        what: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },

    /// The certificate PEM framing is malformed.
    #[error("invalid certificate PEM: {reason}")]
    InvalidPem {
        /// Description of the framing problem.
        reason: String,
    },

    /// The certificate DER could not be parsed.
    #[error("failed to parse certificate: {reason}")]
    InvalidCertificate {
        /// Parser diagnostic.
        reason: String,
    },

    /// The certificate's validity period has not started.
    #[error("certificate is not yet valid: valid starting at {not_before}")]
    NotYetValid {
        /// Start of the validity period.
        not_before: String,
    },

    /// The certificate does not chain to a configured trust anchor.
    #[error("certificate chain verification failed: {reason}")]
    UntrustedChain {
        /// Why no chain could be built.
        reason: String,
    },

    /// The certificate lacks the code-signing extended key usage.
    #[error("certificate is missing code signing extended key usage")]
    MissingCodeSigningUsage,

    /// No URI SAN equals the expected release identity.
    #[error("certificate identity does not match expected release identity {expected}")]
    IdentityMismatch {
        /// The identity that was required.
        expected: String,
    },

    /// The OIDC issuer extension is absent.
    #[error("certificate missing OIDC issuer extension {oid}")]
    MissingIssuer {
        /// Extension OID in dotted form.
        oid: &'static str,
    },

    /// The OIDC issuer extension could not be decoded as a string.
    #[error("failed to decode certificate extension {oid}")]
    UndecodableIssuer {
        /// Extension OID in dotted form.
        oid: &'static str,
    },

    /// The OIDC issuer extension holds an unexpected value.
    #[error("certificate OIDC issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The issuer that was required.
        expected: String,
        /// The issuer found in the certificate.
        actual: String,
    },

    /// The certificate key type is not supported.
    #[error("unsupported certificate public key: {algorithm}")]
    UnsupportedKey {
        /// Algorithm OID or curve description.
        algorithm: String,
    },

    /// The signature does not verify against the certificate key.
    #[error("{algorithm} signature verification failed")]
    BadSignature {
        /// Signature scheme that was attempted.
        algorithm: &'static str,
    },
}

/// Errors arising from release verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Any failure while validating the manifest signature or certificate.
    #[error("checksums signature verification failed: {0}")]
    ChecksumsSignature(#[from] SignatureError),

    /// The manifest has no entry for the requested file.
    #[error("checksum entry not found for asset {filename}")]
    ChecksumNotFound {
        /// The file name that was looked up.
        filename: String,
    },

    /// The manifest entry for the requested file is not a SHA-256 digest.
    #[error("checksum entry for asset {filename} is malformed: {reason}")]
    MalformedChecksum {
        /// The file name that was looked up.
        filename: String,
        /// Why the digest was rejected.
        reason: String,
    },

    /// The computed digest differs from the manifest entry.
    #[error("checksum verification failed for {subject}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// What was hashed (file path or description).
        subject: String,
        /// Digest from the manifest.
        expected: String,
        /// Digest that was computed.
        actual: String,
    },

    /// Reading a file to hash failed.
    #[error("failed to read {path} for checksum verification: {reason}")]
    Read {
        /// The file that could not be read.
        path: String,
        /// Underlying I/O error.
        reason: String,
    },
}

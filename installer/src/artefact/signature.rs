//! Detached signature verification for checksum manifests.
//!
//! The manifest signature is made with the signing certificate's key:
//! ECDSA (P-256 or P-384, ASN.1 DER) or RSA PKCS#1 v1.5 over the SHA-256
//! digest of the manifest, or Ed25519 over the manifest bytes themselves.

use super::certificate::{SigningCertificate, decode_base64};
use super::verification::{SignatureError, TrustPolicy, VerificationError};
use super::version_tag::LibraryVersionTag;
use log::debug;
use sha2::{Digest, Sha256};
use x509_parser::prelude::X509Certificate;

const EC_PUBLIC_KEY_OID: &str = "1.2.840.10045.2.1";
const ED25519_OID: &str = "1.3.101.112";
const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// Uncompressed SEC1 point length for P-256.
const P256_POINT_LEN: usize = 65;
/// Uncompressed SEC1 point length for P-384.
const P384_POINT_LEN: usize = 97;

/// Verify a checksum manifest against its detached signature and
/// certificate assets.
///
/// `signature_asset` is the base64 signature file and `certificate_asset`
/// the (optionally base64-wrapped) PEM certificate file, both as served by
/// the mirror. Every step short-circuits; the first failure is reported as
/// [`VerificationError::ChecksumsSignature`].
///
/// # Errors
///
/// Returns [`VerificationError::ChecksumsSignature`] when decoding, any
/// certificate check, or the signature itself fails.
pub fn verify_checksums_signature(
    manifest: &[u8],
    signature_asset: &[u8],
    certificate_asset: &[u8],
    version: &LibraryVersionTag,
    policy: &TrustPolicy,
) -> Result<(), VerificationError> {
    let signature = decode_base64(signature_asset, "signature")?;
    let certificate = SigningCertificate::from_asset(certificate_asset)?;
    let identity = policy.identity_for(version);
    certificate.validate(&identity, &policy.oidc_issuer, &policy.anchors)?;
    verify_blob_signature(&certificate.parse()?, manifest, &signature)?;
    debug!("checksum manifest signature verified for identity {identity}");
    Ok(())
}

/// Verify `signature` over `payload` with the certificate's public key.
///
/// # Errors
///
/// Returns [`SignatureError::BadSignature`] when verification fails and
/// [`SignatureError::UnsupportedKey`] for key types other than EC P-256,
/// EC P-384, RSA and Ed25519.
pub fn verify_blob_signature(
    certificate: &X509Certificate<'_>,
    payload: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    if signature.is_empty() {
        return Err(SignatureError::EmptyPayload { what: "signature" });
    }
    let spki = certificate.public_key();
    let algorithm = spki.algorithm.algorithm.to_id_string();
    let key: &[u8] = spki.subject_public_key.data.as_ref();

    match algorithm.as_str() {
        EC_PUBLIC_KEY_OID => verify_ecdsa(key, payload, signature),
        ED25519_OID => verify_ed25519(key, payload, signature),
        RSA_ENCRYPTION_OID => verify_rsa(key, payload, signature),
        _ => Err(SignatureError::UnsupportedKey { algorithm }),
    }
}

fn verify_ecdsa(key: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    use p256::ecdsa::signature::hazmat::PrehashVerifier;

    let digest = Sha256::digest(payload);
    let bad = || SignatureError::BadSignature { algorithm: "ECDSA" };
    match key.len() {
        P256_POINT_LEN => {
            let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(key).map_err(|_| bad())?;
            let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| bad())?;
            verifying_key.verify_prehash(&digest, &sig).map_err(|_| bad())
        }
        P384_POINT_LEN => {
            let verifying_key = p384::ecdsa::VerifyingKey::from_sec1_bytes(key).map_err(|_| bad())?;
            let sig = p384::ecdsa::Signature::from_der(signature).map_err(|_| bad())?;
            verifying_key.verify_prehash(&digest, &sig).map_err(|_| bad())
        }
        other => Err(SignatureError::UnsupportedKey {
            algorithm: format!("EC key with {other}-byte point"),
        }),
    }
}

fn verify_rsa(key: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::signature::Verifier;

    let bad = || SignatureError::BadSignature {
        algorithm: "RSA PKCS#1 v1.5",
    };
    let public_key = rsa::RsaPublicKey::from_pkcs1_der(key).map_err(|_| bad())?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);
    let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| bad())?;
    verifying_key.verify(payload, &sig).map_err(|_| bad())
}

fn verify_ed25519(key: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    let bad = || SignatureError::BadSignature {
        algorithm: "Ed25519",
    };
    let key_bytes: &[u8; 32] = key.try_into().map_err(|_| bad())?;
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(key_bytes).map_err(|_| bad())?;
    let sig = ed25519_dalek::Signature::from_slice(signature).map_err(|_| bad())?;
    verifying_key.verify_strict(payload, &sig).map_err(|_| bad())
}

//! Unit tests for signing certificate decoding and validation.

use super::*;
use crate::artefact::verification::{DEFAULT_OIDC_ISSUER, TrustPolicy};
use crate::artefact::version_tag::LibraryVersionTag;
use crate::test_utils::{CertificateOptions, IssuerEncoding, SigningFixture};
use rstest::{fixture, rstest};

#[fixture]
fn version() -> LibraryVersionTag {
    LibraryVersionTag::try_from("v0.3.1").expect("valid tag")
}

fn expected_identity(version: &LibraryVersionTag) -> String {
    TrustPolicy::default().identity_for(version)
}

fn validate_with(
    options: &CertificateOptions,
    version: &LibraryVersionTag,
) -> Result<(), SignatureError> {
    let signer = SigningFixture::with_options(options).expect("signing fixture");
    let certificate =
        SigningCertificate::from_asset(&signer.certificate_asset()).expect("decode certificate");
    certificate.validate(
        &expected_identity(version),
        DEFAULT_OIDC_ISSUER,
        &signer.trust_policy().anchors,
    )
}

#[rstest]
fn accepts_release_certificate(version: LibraryVersionTag) {
    let result = validate_with(&CertificateOptions::for_version(&version), &version);
    assert!(result.is_ok(), "unexpected error: {result:?}");
}

#[rstest]
fn accepts_raw_utf8_issuer_extension(version: LibraryVersionTag) {
    let options = CertificateOptions {
        issuer_encoding: IssuerEncoding::RawUtf8,
        ..CertificateOptions::for_version(&version)
    };
    let result = validate_with(&options, &version);
    assert!(result.is_ok(), "unexpected error: {result:?}");
}

#[rstest]
fn rejects_missing_issuer_extension(version: LibraryVersionTag) {
    let options = CertificateOptions {
        issuer_encoding: IssuerEncoding::Omitted,
        ..CertificateOptions::for_version(&version)
    };
    assert_eq!(
        validate_with(&options, &version),
        Err(SignatureError::MissingIssuer {
            oid: OIDC_ISSUER_EXTENSION_OID
        })
    );
}

#[rstest]
fn rejects_certificate_without_code_signing(version: LibraryVersionTag) {
    let options = CertificateOptions {
        code_signing: false,
        ..CertificateOptions::for_version(&version)
    };
    assert_eq!(
        validate_with(&options, &version),
        Err(SignatureError::MissingCodeSigningUsage)
    );
}

#[rstest]
fn rejects_other_workflow_identity(version: LibraryVersionTag) {
    let options = CertificateOptions {
        identity: "https://github.com/someone/else/.github/workflows/release.yml@refs/tags/v0.3.1"
            .to_owned(),
        ..CertificateOptions::for_version(&version)
    };
    let err = validate_with(&options, &version).expect_err("identity mismatch");
    assert!(matches!(err, SignatureError::IdentityMismatch { .. }));
}

#[rstest]
fn rejects_certificate_not_yet_valid(version: LibraryVersionTag) {
    let options = CertificateOptions {
        not_before_year: Some(2999),
        ..CertificateOptions::for_version(&version)
    };
    let err = validate_with(&options, &version).expect_err("not yet valid");
    assert!(matches!(err, SignatureError::NotYetValid { .. }), "{err:?}");
}

#[rstest]
fn rejects_leaf_signed_by_another_root(version: LibraryVersionTag) {
    let signer = SigningFixture::for_version(&version).expect("signing fixture");
    let stranger = SigningFixture::for_version(&version).expect("second fixture");
    let certificate =
        SigningCertificate::from_pem(signer.certificate_pem().as_bytes()).expect("decode");

    let err = certificate
        .validate(
            &expected_identity(&version),
            DEFAULT_OIDC_ISSUER,
            &stranger.trust_policy().anchors,
        )
        .expect_err("foreign root");
    assert!(matches!(err, SignatureError::UntrustedChain { .. }));
}

#[rstest]
fn rejects_leaf_used_as_its_own_anchor(version: LibraryVersionTag) {
    let signer = SigningFixture::for_version(&version).expect("signing fixture");
    let certificate =
        SigningCertificate::from_pem(signer.certificate_pem().as_bytes()).expect("decode");

    let err = certificate
        .validate(
            &expected_identity(&version),
            DEFAULT_OIDC_ISSUER,
            &TrustAnchors::with_root(signer.certificate_pem()),
        )
        .expect_err("leaf is not a CA");
    assert!(matches!(err, SignatureError::UntrustedChain { .. }));
}

#[rstest]
fn chains_through_configured_intermediate(version: LibraryVersionTag) {
    let signer = SigningFixture::for_version(&version).expect("signing fixture");
    let certificate =
        SigningCertificate::from_pem(signer.certificate_pem().as_bytes()).expect("decode");
    let anchors = TrustAnchors {
        roots: vec![signer.root_pem().to_owned()],
        intermediates: vec![signer.root_pem().to_owned()],
    };

    // The root is self-signed, so it also chains to itself as intermediate.
    assert!(
        certificate
            .validate(&expected_identity(&version), DEFAULT_OIDC_ISSUER, &anchors)
            .is_ok()
    );
}

#[test]
fn empty_certificate_asset_is_rejected() {
    assert_eq!(
        SigningCertificate::from_asset(b" \n\t"),
        Err(SignatureError::EmptyPayload {
            what: "certificate"
        })
    );
}

#[test]
fn non_certificate_pem_block_is_rejected() {
    let pem = b"-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
    let err = SigningCertificate::from_pem(pem).expect_err("wrong label");
    assert!(matches!(err, SignatureError::InvalidPem { .. }), "{err:?}");
}

#[rstest]
fn trailing_pem_data_is_rejected(version: LibraryVersionTag) {
    let signer = SigningFixture::for_version(&version).expect("signing fixture");
    let doubled = format!("{}{}", signer.certificate_pem(), signer.root_pem());
    let err = SigningCertificate::from_pem(doubled.as_bytes()).expect_err("two blocks");
    assert!(matches!(err, SignatureError::InvalidPem { .. }), "{err:?}");
}

#[test]
fn undecodable_base64_certificate_is_rejected() {
    let err = SigningCertificate::from_asset(b"@@@@").expect_err("bad base64");
    assert!(matches!(err, SignatureError::InvalidBase64 { .. }), "{err:?}");
}

#[rstest]
#[case::der_string(&[0x0c, 0x03, b'a', b'b', b'c'], Some("abc"))]
#[case::raw_text(b"https://token.actions.githubusercontent.com", Some(DEFAULT_OIDC_ISSUER))]
#[case::blank(b"   ", None)]
#[case::invalid_utf8(&[0xff, 0xfe], None)]
fn issuer_extension_decoding(#[case] value: &[u8], #[case] expected: Option<&str>) {
    assert_eq!(decode_issuer(value).as_deref(), expected);
}

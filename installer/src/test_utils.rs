//! Shared test utilities for the installer crate.
//!
//! These fixtures stand in for a release mirror: [`ReleaseServer`] serves
//! assets over loopback HTTP, [`SigningFixture`] signs checksum manifests
//! with a throwaway certificate chain, and [`ReleaseAssets`] bundles a
//! complete, correctly signed release for one platform.

use crate::artefact::naming::{
    ArchiveName, CHECKSUMS_ASSET, CHECKSUMS_CERTIFICATE_ASSET, CHECKSUMS_SIGNATURE_ASSET,
};
use crate::artefact::target::PlatformAsset;
use crate::artefact::verification::{
    DEFAULT_OIDC_ISSUER, OIDC_ISSUER_EXTENSION_OID, TrustAnchors, TrustPolicy,
};
use crate::artefact::version_tag::LibraryVersionTag;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use p256::ecdsa::signature::Signer;
use p256::pkcs8::DecodePrivateKey;
use rsa::signature::SignatureEncoding;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, ExtendedKeyUsagePurpose,
    Ia5String, IsCa, KeyPair, SanType,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Result type for fixture construction.
pub type FixtureResult<T> = std::result::Result<T, Box<dyn Error + Send + Sync>>;

/// Computes the lowercase hexadecimal SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Formats one GNU `sha256sum` manifest line.
pub fn manifest_line(digest: &str, filename: &str) -> String {
    format!("{digest}  {filename}\n")
}

/// Builds a `.tar.gz` archive of regular files.
///
/// Entry names are written into the header verbatim, so callers can create
/// `./`-prefixed, absolute or `..` entries that `tar::Builder` would refuse.
///
/// # Panics
///
/// Panics if a name exceeds the 100-byte ustar name field or the archive
/// cannot be written to memory.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        let raw_name = &mut header.as_old_mut().name;
        assert!(name.len() < raw_name.len(), "entry name too long: {name}");
        raw_name
            .get_mut(..name.len())
            .expect("name fits")
            .copy_from_slice(name.as_bytes());
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *content).expect("append entry");
    }
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .expect("finish archive")
}

/// How the OIDC issuer extension is encoded in a fixture certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerEncoding {
    /// Wrapped in a DER `UTF8String`.
    DerUtf8String,
    /// Stored as raw UTF-8 bytes.
    RawUtf8,
    /// The extension is absent.
    Omitted,
}

/// Fixed 2048-bit RSA key for RSA leaves; generating one per test is slow.
const RSA_LEAF_KEY_PEM: &str = include_str!("../fixtures/rsa-leaf-key.pem");

/// Key type of a fixture leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKey {
    /// ECDSA P-256, signing over the SHA-256 digest.
    EcdsaP256,
    /// RSA PKCS#1 v1.5 with SHA-256.
    Rsa,
}

/// Knobs for the leaf certificate of a [`SigningFixture`].
#[derive(Debug, Clone)]
pub struct CertificateOptions {
    /// URI SAN of the leaf.
    pub identity: String,
    /// OIDC issuer extension value.
    pub oidc_issuer: String,
    /// Encoding of the issuer extension.
    pub issuer_encoding: IssuerEncoding,
    /// Whether the leaf carries the code-signing extended key usage.
    pub code_signing: bool,
    /// Overrides the leaf's validity start to 1 January of this year.
    pub not_before_year: Option<i32>,
    /// Key type of the leaf.
    pub leaf_key: LeafKey,
}

impl CertificateOptions {
    /// Options matching the default trust policy for `version`.
    pub fn for_version(version: &LibraryVersionTag) -> Self {
        Self {
            identity: TrustPolicy::default().identity_for(version),
            oidc_issuer: DEFAULT_OIDC_ISSUER.to_owned(),
            issuer_encoding: IssuerEncoding::DerUtf8String,
            code_signing: true,
            not_before_year: None,
            leaf_key: LeafKey::EcdsaP256,
        }
    }
}

enum FixtureSigner {
    EcdsaP256(p256::ecdsa::SigningKey),
    Rsa(rsa::pkcs1v15::SigningKey<Sha256>),
}

/// A throwaway root CA and leaf (ECDSA P-256 unless configured otherwise)
/// that sign checksum manifests.
pub struct SigningFixture {
    root_pem: String,
    leaf_pem: String,
    signer: FixtureSigner,
}

impl SigningFixture {
    /// Create a fixture whose leaf satisfies the default policy for
    /// `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if certificate generation fails.
    pub fn for_version(version: &LibraryVersionTag) -> FixtureResult<Self> {
        Self::with_options(&CertificateOptions::for_version(version))
    }

    /// Create a fixture with a customised leaf certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if certificate generation fails.
    pub fn with_options(options: &CertificateOptions) -> FixtureResult<Self> {
        let root_key = KeyPair::generate()?;
        let mut root_params = CertificateParams::new(Vec::<String>::new())?;
        root_params
            .distinguished_name
            .push(DnType::CommonName, "chroma-local test root");
        root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let root = root_params.self_signed(&root_key)?;

        let leaf_key = match options.leaf_key {
            LeafKey::EcdsaP256 => KeyPair::generate()?,
            LeafKey::Rsa => {
                KeyPair::from_pem_and_sign_algo(RSA_LEAF_KEY_PEM, &rcgen::PKCS_RSA_SHA256)?
            }
        };
        let mut leaf_params = CertificateParams::new(Vec::<String>::new())?;
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, "chroma-local test signer");
        leaf_params.subject_alt_names =
            vec![SanType::URI(Ia5String::try_from(options.identity.clone())?)];
        if options.code_signing {
            leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::CodeSigning];
        }
        if let Some(content) = issuer_extension(&options.oidc_issuer, options.issuer_encoding) {
            leaf_params.custom_extensions = vec![CustomExtension::from_oid_content(
                &oid_arcs(OIDC_ISSUER_EXTENSION_OID)?,
                content,
            )];
        }
        if let Some(year) = options.not_before_year {
            leaf_params.not_before = rcgen::date_time_ymd(year, 1, 1);
        }
        let leaf = leaf_params.signed_by(&leaf_key, &root, &root_key)?;

        let signer = match options.leaf_key {
            LeafKey::EcdsaP256 => FixtureSigner::EcdsaP256(
                p256::ecdsa::SigningKey::from_pkcs8_der(&leaf_key.serialize_der())
                    .map_err(|err| format!("invalid fixture signing key: {err}"))?,
            ),
            LeafKey::Rsa => FixtureSigner::Rsa(rsa::pkcs1v15::SigningKey::new(
                rsa::RsaPrivateKey::from_pkcs8_pem(RSA_LEAF_KEY_PEM)
                    .map_err(|err| format!("invalid fixture RSA key: {err}"))?,
            )),
        };
        Ok(Self {
            root_pem: root.pem(),
            leaf_pem: leaf.pem(),
            signer,
        })
    }

    /// Returns the raw signature over `payload`: DER for ECDSA, PKCS#1 v1.5
    /// for RSA.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        match &self.signer {
            FixtureSigner::EcdsaP256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(payload);
                signature.to_der().as_bytes().to_vec()
            }
            FixtureSigner::Rsa(key) => key.sign(payload).to_vec(),
        }
    }

    /// Returns the `SHA256SUMS.sig` asset for `payload`.
    pub fn signature_asset(&self, payload: &[u8]) -> Vec<u8> {
        STANDARD.encode(self.sign(payload)).into_bytes()
    }

    /// Returns the leaf certificate as PEM.
    pub fn certificate_pem(&self) -> &str {
        &self.leaf_pem
    }

    /// Returns the `SHA256SUMS.pem` asset: the leaf PEM, base64-wrapped.
    pub fn certificate_asset(&self) -> Vec<u8> {
        STANDARD.encode(self.leaf_pem.as_bytes()).into_bytes()
    }

    /// Returns the root CA as PEM.
    pub fn root_pem(&self) -> &str {
        &self.root_pem
    }

    /// Returns the default policy with the fixture root as sole anchor.
    pub fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy {
            anchors: TrustAnchors::with_root(self.root_pem.clone()),
            ..TrustPolicy::default()
        }
    }
}

fn issuer_extension(issuer: &str, encoding: IssuerEncoding) -> Option<Vec<u8>> {
    match encoding {
        IssuerEncoding::DerUtf8String => {
            let mut content = vec![0x0c];
            content.extend(der_length(issuer.len()));
            content.extend_from_slice(issuer.as_bytes());
            Some(content)
        }
        IssuerEncoding::RawUtf8 => Some(issuer.as_bytes().to_vec()),
        IssuerEncoding::Omitted => None,
    }
}

fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|byte| *byte == 0)
        .collect();
    let mut encoded = vec![0x80 | bytes.len() as u8];
    encoded.extend(bytes);
    encoded
}

fn oid_arcs(oid: &str) -> FixtureResult<Vec<u64>> {
    oid.split('.')
        .map(|arc| arc.parse::<u64>().map_err(Into::into))
        .collect()
}

/// A complete, correctly signed release for one version and platform.
pub struct ReleaseAssets {
    /// Release version.
    pub version: LibraryVersionTag,
    /// Platform the archive targets.
    pub asset: PlatformAsset,
    /// Library bytes inside the archive.
    pub library: Vec<u8>,
    /// The `.tar.gz` archive.
    pub archive: Vec<u8>,
    /// The `SHA256SUMS` manifest.
    pub manifest: Vec<u8>,
    /// The `SHA256SUMS.sig` asset.
    pub signature: Vec<u8>,
    /// The `SHA256SUMS.pem` asset.
    pub certificate: Vec<u8>,
    signer: SigningFixture,
}

impl ReleaseAssets {
    /// Build a release whose archive holds `library` as `./<library file>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the signing fixture cannot be created.
    pub fn build(
        version: &LibraryVersionTag,
        asset: PlatformAsset,
        library: &[u8],
    ) -> FixtureResult<Self> {
        let member = format!("./{}", asset.library_file_name());
        let archive = tar_gz(&[
            ("./README.md", b"chroma local runtime\n".as_slice()),
            (member.as_str(), library),
        ]);
        let archive_name = ArchiveName::new(version, asset).filename();
        let manifest = format!(
            "{}{}",
            manifest_line(&sha256_hex(b"other platform"), "chroma-go-local-other.tar.gz"),
            manifest_line(&sha256_hex(&archive), &archive_name)
        )
        .into_bytes();
        let signer = SigningFixture::for_version(version)?;
        Ok(Self {
            version: version.clone(),
            asset,
            library: library.to_vec(),
            signature: signer.signature_asset(&manifest),
            certificate: signer.certificate_asset(),
            archive,
            manifest,
            signer,
        })
    }

    /// Returns the archive file name.
    pub fn archive_name(&self) -> String {
        ArchiveName::new(&self.version, self.asset).filename()
    }

    /// Returns the URL path an asset is served under.
    pub fn path_for(&self, asset: &str) -> String {
        format!("/{}/{asset}", self.version)
    }

    /// Returns server routes for all four release assets.
    pub fn routes(&self) -> HashMap<String, Route> {
        [
            (CHECKSUMS_ASSET.to_owned(), self.manifest.clone()),
            (CHECKSUMS_SIGNATURE_ASSET.to_owned(), self.signature.clone()),
            (CHECKSUMS_CERTIFICATE_ASSET.to_owned(), self.certificate.clone()),
            (self.archive_name(), self.archive.clone()),
        ]
        .into_iter()
        .map(|(asset, body)| (self.path_for(&asset), Route::Body(body)))
        .collect()
    }

    /// Returns a policy trusting this release's signer.
    pub fn trust_policy(&self) -> TrustPolicy {
        self.signer.trust_policy()
    }
}

/// How the [`ReleaseServer`] answers a path.
#[derive(Debug, Clone)]
pub enum Route {
    /// Respond 200 with the body.
    Body(Vec<u8>),
    /// Respond with an empty body and the status code.
    Status(u16),
    /// Respond 302 with a `Location` header.
    Redirect(String),
    /// Respond 200 with the body sent chunked, without a `Content-Length`.
    Streamed(Vec<u8>),
}

/// A loopback HTTP server serving release assets from memory.
///
/// Unknown paths answer 404. The server stops when dropped.
pub struct ReleaseServer {
    server: Arc<tiny_http::Server>,
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    worker: Option<JoinHandle<()>>,
}

impl ReleaseServer {
    /// Start serving `routes` on an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub fn start(routes: HashMap<String, Route>) -> FixtureResult<Self> {
        let server = Arc::new(tiny_http::Server::http("127.0.0.1:0")?);
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or("release server is not listening on TCP")?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let worker_server = Arc::clone(&server);
        let worker_requests = Arc::clone(&requests);
        let worker = thread::spawn(move || {
            while let Ok(request) = worker_server.recv() {
                let path = request.url().to_owned();
                if let Ok(mut seen) = worker_requests.lock() {
                    seen.push(path.clone());
                }
                let _ = request.respond(respond_to(routes.get(&path)));
            }
        });

        Ok(Self {
            server,
            base_url: format!("http://{addr}"),
            requests,
            worker: Some(worker),
        })
    }

    /// Returns the server's base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Returns the request paths received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl Drop for ReleaseServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn respond_to(route: Option<&Route>) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    match route {
        Some(Route::Body(body)) => tiny_http::Response::from_data(body.clone()),
        Some(Route::Status(code)) => {
            tiny_http::Response::from_data(Vec::new()).with_status_code(*code)
        }
        Some(Route::Redirect(location)) => {
            let response = tiny_http::Response::from_data(Vec::new()).with_status_code(302);
            match tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes()) {
                Ok(header) => response.with_header(header),
                Err(()) => response,
            }
        }
        Some(Route::Streamed(body)) => tiny_http::Response::new(
            tiny_http::StatusCode(200),
            Vec::new(),
            std::io::Cursor::new(body.clone()),
            None,
            None,
        ),
        None => tiny_http::Response::from_data(Vec::new()).with_status_code(404),
    }
}

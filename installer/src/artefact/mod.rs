//! Release artefacts: naming, transport, verification and extraction.
//!
//! # Sub-modules
//!
//! - [`error`] - Validation errors for versions and platforms.
//! - [`version_tag`] - Release tag normalisation (`LibraryVersionTag`).
//! - [`target`] - Supported platform table (`PlatformAsset`).
//! - [`naming`] - Archive and checksum asset names, asset URLs.
//! - [`sha256_digest`] - SHA-256 digest newtype (`Sha256Digest`).
//! - [`checksums`] - `SHA256SUMS` parsing and artefact digest checks.
//! - [`verification`] - Trust policy and verification failure types.
//! - [`certificate`] - Signing certificate parsing and validation.
//! - [`signature`] - Checksum manifest signature verification.
//! - [`download`] - Bounded HTTP downloads behind a trait seam.
//! - [`mirror`] - Retrying fetches across release mirrors.
//! - [`extraction`] - Single-member `.tar.gz` extraction with traversal
//!   protection.

pub mod certificate;
pub mod checksums;
pub mod download;
pub mod error;
pub mod extraction;
pub mod mirror;
pub mod naming;
pub mod sha256_digest;
pub mod signature;
pub mod target;
pub mod verification;
pub mod version_tag;

//! Chroma local runtime installer library.
//!
//! This crate locates the Chroma local runtime shared library, downloading
//! it when necessary. Downloads are fetched from release mirrors, checked
//! against a signed `SHA256SUMS` manifest, and extracted into a cache shared
//! by every process on the machine under a cross-process lock. It is used by
//! the `chroma-local-installer` CLI binary and by client construction in the
//! root crate.
//!
//! # Modules
//!
//! - [`artefact`] - Release naming, transport, verification and extraction
//! - [`budget`] - Download limits, lock timings and release mirrors
//! - [`cache`] - Version-scoped cache layout
//! - [`cli`] - Command-line argument definitions
//! - [`dirs`] - Home directory abstraction and the default cache root
//! - [`error`] - Installer error type and error classification
//! - [`lock`] - Cross-process download lock with heartbeat
//! - [`output`] - Output helpers for the CLI
//! - [`pipeline`] - The download, verify and install pipeline
//! - [`resolver`] - Library path resolution

pub mod artefact;
pub mod budget;
pub mod cache;
pub mod cli;
pub mod dirs;
pub mod error;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod resolver;
#[cfg(feature = "test-support")]
pub mod test_utils;

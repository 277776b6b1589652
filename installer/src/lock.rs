//! Cross-process download lock for a cache directory.
//!
//! The lock is a file created with `create_new`, so exactly one process can
//! hold it. The file records the holder's PID and its modification time is
//! the liveness signal: waiters evict a lock whose mtime is older than the
//! staleness threshold, and holders run a [`Heartbeat`] that keeps the mtime
//! fresh for as long as they work.
//!
//! The lock only excludes other processes. Two threads of one process
//! acquiring the same path will simply wait on each other until timeout.

use crate::budget::LockSettings;
use filetime::FileTime;
use log::{debug, warn};
use std::fmt;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// File name of the lock inside the cache root.
pub const LOCK_FILE_NAME: &str = ".download.lock";

/// Smallest heartbeat period; shorter intervals are rounded up.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// The step of lock release that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    /// Flushing and closing the lock file handle.
    Close,
    /// Deleting the lock file.
    Remove,
}

/// One failed step of lock release.
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Which step failed.
    pub step: ReleaseStep,
    /// The underlying I/O error.
    pub source: io::Error,
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            ReleaseStep::Close => write!(f, "failed to close download lock file: {}", self.source),
            ReleaseStep::Remove => {
                write!(f, "failed to remove download lock file: {}", self.source)
            }
        }
    }
}

/// Errors arising from the download lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The directory holding the lock could not be created.
    #[error("failed to create lock directory {path}: {source}")]
    CreateDirectory {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The lock file could not be created for a reason other than being
    /// held.
    #[error("failed to create lock file {path}: {source}")]
    Create {
        /// The lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An existing lock file could not be inspected.
    #[error("failed to stat lock file {path}: {source}")]
    Inspect {
        /// The lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A stale lock file could not be removed.
    #[error("failed to remove stale lock file {path}: {source}")]
    StaleRemoval {
        /// The lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The lock stayed held for the whole wait timeout.
    #[error("timeout waiting for lock: {}", path.display())]
    Timeout {
        /// The lock file path.
        path: PathBuf,
    },

    /// The heartbeat thread could not be started.
    #[error("failed to start download lock heartbeat for {path}: {source}")]
    HeartbeatSpawn {
        /// The lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The heartbeat stopped after failing to refresh the lock file.
    #[error("failed to refresh download lock file {path}: {reason}")]
    HeartbeatFailed {
        /// The lock file path.
        path: PathBuf,
        /// Description of the refresh failure.
        reason: String,
    },

    /// One or both release steps failed.
    #[error("failed to release download lock {path}: {}", join_failures(.failures))]
    Release {
        /// The lock file path.
        path: PathBuf,
        /// The failed steps, in order.
        failures: Vec<ReleaseFailure>,
    },
}

fn join_failures(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// An exclusively held lock file.
///
/// Dropping the lock without calling [`DownloadLock::release`] removes the
/// file on a best-effort basis.
#[derive(Debug)]
pub struct DownloadLock {
    path: PathBuf,
    file: Option<File>,
}

impl DownloadLock {
    /// Acquire the lock at `path`, waiting up to `settings.wait_timeout`.
    ///
    /// While the file exists, each poll checks whether its mtime is older
    /// than `settings.stale_after`; if so, and the file is unchanged on a
    /// second look, it is removed and acquisition retried immediately.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] when the lock stays held,
    /// [`LockError::StaleRemoval`] when a stale lock cannot be removed, and
    /// other [`LockError`] variants for unexpected I/O failures.
    pub fn acquire(path: &Path, settings: &LockSettings) -> Result<Self, LockError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            create_private_dir(dir).map_err(|source| LockError::CreateDirectory {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let deadline = Instant::now() + settings.wait_timeout;
        loop {
            match create_lock_file(path) {
                Ok(file) => {
                    debug!("acquired download lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        file: Some(file),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(LockError::Create {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }

            if evict_if_stale(path, settings.stale_after)? {
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                });
            }
            thread::sleep(settings.poll_interval.min(deadline - now));
        }
    }

    /// Start refreshing the lock file's mtime every `interval`.
    ///
    /// A zero interval returns an inert heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::HeartbeatSpawn`] if the thread cannot start.
    pub fn start_heartbeat(&self, interval: Duration) -> Result<Heartbeat, LockError> {
        Heartbeat::start(&self.path, interval)
    }

    /// Close the handle and delete the lock file.
    ///
    /// Both steps are attempted; each failure is reported separately. A
    /// lock file that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Release`] listing the failed steps.
    pub fn release(mut self) -> Result<(), LockError> {
        let mut failures = Vec::new();
        if let Some(file) = self.file.take() {
            if let Err(source) = file.sync_all() {
                failures.push(ReleaseFailure {
                    step: ReleaseStep::Close,
                    source,
                });
            }
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("released download lock {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => failures.push(ReleaseFailure {
                step: ReleaseStep::Remove,
                source,
            }),
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LockError::Release {
                path: self.path.clone(),
                failures,
            })
        }
    }
}

impl Drop for DownloadLock {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

pub(crate) fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn create_lock_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    if let Err(err) = write!(file, "{}", std::process::id()).and_then(|()| file.sync_all()) {
        warn!("failed to record PID in download lock {}: {err}", path.display());
    }
    Ok(file)
}

/// Remove the lock file at `path` if it is stale. Returns whether the caller
/// should retry creation immediately.
fn evict_if_stale(path: &Path, stale_after: Duration) -> Result<bool, LockError> {
    let Some(first) = stat_lock(path)? else {
        return Ok(true);
    };
    if lock_age(&first) <= stale_after {
        return Ok(false);
    }

    let Some(second) = stat_lock(path)? else {
        return Ok(true);
    };
    if !same_lock_file(&first, &second) || lock_age(&second) <= stale_after {
        return Ok(false);
    }

    match fs::remove_file(path) {
        Ok(()) => {
            warn!(
                "removed stale download lock {} (unrefreshed for {:?})",
                path.display(),
                lock_age(&second)
            );
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(source) => Err(LockError::StaleRemoval {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn stat_lock(path: &Path) -> Result<Option<Metadata>, LockError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LockError::Inspect {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn lock_age(metadata: &Metadata) -> Duration {
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .unwrap_or(Duration::ZERO)
}

/// Whether two observations describe the same, unmodified lock file.
fn same_lock_file(first: &Metadata, second: &Metadata) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if first.dev() != second.dev() || first.ino() != second.ino() {
            return false;
        }
    }
    first.len() == second.len() && first.modified().ok() == second.modified().ok()
}

/// A background thread refreshing a lock file's modification time.
///
/// [`Heartbeat::stop`] is idempotent and blocks until the thread exits.
/// Dropping a running heartbeat stops it.
#[derive(Debug)]
pub struct Heartbeat {
    path: PathBuf,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<Result<(), String>>>,
}

impl Heartbeat {
    fn start(path: &Path, interval: Duration) -> Result<Self, LockError> {
        if interval.is_zero() {
            return Ok(Self {
                path: path.to_path_buf(),
                stop_tx: None,
                worker: None,
            });
        }
        let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        let (stop_tx, stop_rx) = mpsc::channel();
        let worker_path = path.to_path_buf();
        let worker = thread::Builder::new()
            .name("download-lock-heartbeat".to_owned())
            .spawn(move || refresh_until_stopped(&worker_path, interval, &stop_rx))
            .map_err(|source| LockError::HeartbeatSpawn {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    /// Stop the heartbeat and wait for its thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::HeartbeatFailed`] if a refresh failed for a
    /// reason other than the lock file disappearing. The failure is reported
    /// by the call that joins the thread; later calls return `Ok`.
    pub fn stop(&mut self) -> Result<(), LockError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let reason = match worker.join() {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(reason)) => reason,
            Err(_) => "heartbeat thread panicked".to_owned(),
        };
        Err(LockError::HeartbeatFailed {
            path: self.path.clone(),
            reason,
        })
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("{err}");
        }
    }
}

fn refresh_until_stopped(
    path: &Path,
    interval: Duration,
    stop_rx: &mpsc::Receiver<()>,
) -> Result<(), String> {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                match filetime::set_file_mtime(path, FileTime::now()) {
                    Ok(()) => debug!("refreshed download lock {}", path.display()),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                    Err(err) => return Err(err.to_string()),
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

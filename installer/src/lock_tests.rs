//! Unit tests for the cross-process download lock.

use super::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn lock_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

fn fast_settings() -> LockSettings {
    LockSettings {
        wait_timeout: Duration::from_millis(300),
        stale_after: Duration::from_secs(600),
        poll_interval: Duration::from_millis(20),
        heartbeat_interval: Duration::ZERO,
    }
}

fn age_file(path: &Path, by: Duration) {
    let past = SystemTime::now() - by;
    filetime::set_file_mtime(path, FileTime::from_system_time(past)).expect("set mtime");
}

#[rstest]
fn acquire_records_pid_and_release_removes_file(lock_dir: TempDir) {
    let path = lock_dir.path().join("cache").join(LOCK_FILE_NAME);
    let lock = DownloadLock::acquire(&path, &fast_settings()).expect("acquire");

    let contents = fs::read_to_string(&path).expect("read lock");
    assert_eq!(contents, std::process::id().to_string());

    lock.release().expect("release");
    assert!(!path.exists());
}

#[cfg(unix)]
#[rstest]
fn lock_file_and_directory_are_private(lock_dir: TempDir) {
    use std::os::unix::fs::PermissionsExt;

    let dir = lock_dir.path().join("cache");
    let path = dir.join(LOCK_FILE_NAME);
    let lock = DownloadLock::acquire(&path, &fast_settings()).expect("acquire");

    let file_mode = fs::metadata(&path).expect("stat").permissions().mode() & 0o777;
    let dir_mode = fs::metadata(&dir).expect("stat").permissions().mode() & 0o777;
    assert_eq!(file_mode & 0o077, 0, "lock file mode {file_mode:o}");
    assert_eq!(dir_mode & 0o077, 0, "lock dir mode {dir_mode:o}");
    lock.release().expect("release");
}

#[rstest]
fn held_lock_times_out(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    let held = DownloadLock::acquire(&path, &fast_settings()).expect("first acquire");

    let started = Instant::now();
    let err = DownloadLock::acquire(&path, &fast_settings()).expect_err("second acquire");
    assert!(matches!(err, LockError::Timeout { .. }));
    assert!(err.to_string().contains("timeout waiting for lock"));
    assert!(started.elapsed() >= Duration::from_millis(300));

    held.release().expect("release");
}

#[rstest]
fn lock_is_acquired_once_released(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    let held = DownloadLock::acquire(&path, &fast_settings()).expect("first acquire");

    let waiter_path = path.clone();
    let waiter = thread::spawn(move || {
        let settings = LockSettings {
            wait_timeout: Duration::from_secs(5),
            ..fast_settings()
        };
        DownloadLock::acquire(&waiter_path, &settings).map(DownloadLock::release)
    });

    thread::sleep(Duration::from_millis(100));
    held.release().expect("release");

    waiter
        .join()
        .expect("waiter thread")
        .expect("waiter acquires")
        .expect("waiter releases");
}

#[rstest]
fn stale_lock_is_taken_over(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    fs::write(&path, "99999").expect("write abandoned lock");
    age_file(&path, Duration::from_secs(60));

    let settings = LockSettings {
        stale_after: Duration::from_secs(5),
        ..fast_settings()
    };
    let lock = DownloadLock::acquire(&path, &settings).expect("take over stale lock");
    assert_eq!(
        fs::read_to_string(&path).expect("read lock"),
        std::process::id().to_string()
    );
    lock.release().expect("release");
}

#[rstest]
fn fresh_foreign_lock_is_respected(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    fs::write(&path, "99999").expect("write foreign lock");

    let err = DownloadLock::acquire(&path, &fast_settings()).expect_err("still held");
    assert!(matches!(err, LockError::Timeout { .. }));
    assert!(path.exists());
}

#[cfg(unix)]
#[rstest]
fn unremovable_stale_lock_is_reported(lock_dir: TempDir) {
    use std::os::unix::fs::PermissionsExt;

    // Root ignores directory write permissions.
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let dir = lock_dir.path().join("locked");
    fs::create_dir(&dir).expect("create dir");
    let path = dir.join(LOCK_FILE_NAME);
    fs::write(&path, "99999").expect("write abandoned lock");
    age_file(&path, Duration::from_secs(60));
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).expect("chmod");

    let settings = LockSettings {
        stale_after: Duration::ZERO,
        ..fast_settings()
    };
    let result = DownloadLock::acquire(&path, &settings);
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).expect("restore");

    let err = result.expect_err("stale removal fails");
    assert!(matches!(err, LockError::StaleRemoval { .. }));
    assert!(err.to_string().contains("failed to remove stale lock file"));
}

#[rstest]
fn heartbeat_keeps_lock_fresh(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    let settings = LockSettings {
        wait_timeout: Duration::from_millis(700),
        stale_after: Duration::from_millis(1500),
        poll_interval: Duration::from_millis(20),
        heartbeat_interval: Duration::from_millis(100),
    };
    let lock = DownloadLock::acquire(&path, &settings).expect("acquire");
    age_file(&path, Duration::from_secs(10));

    let mut heartbeat = lock
        .start_heartbeat(settings.heartbeat_interval)
        .expect("start heartbeat");
    thread::sleep(settings.heartbeat_interval * 3);

    let age = lock_age(&fs::metadata(&path).expect("stat"));
    assert!(age < Duration::from_secs(1), "lock not refreshed: {age:?}");

    let err = DownloadLock::acquire(&path, &settings).expect_err("holder is alive");
    assert!(matches!(err, LockError::Timeout { .. }));

    heartbeat.stop().expect("stop heartbeat");
    lock.release().expect("release");
}

#[rstest]
fn heartbeat_stop_is_idempotent(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    let lock = DownloadLock::acquire(&path, &fast_settings()).expect("acquire");
    let mut heartbeat = lock
        .start_heartbeat(Duration::from_millis(20))
        .expect("start heartbeat");

    heartbeat.stop().expect("first stop");
    heartbeat.stop().expect("second stop");
    lock.release().expect("release");
}

#[rstest]
fn heartbeat_stops_quietly_when_lock_file_vanishes(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    let lock = DownloadLock::acquire(&path, &fast_settings()).expect("acquire");
    let mut heartbeat = lock
        .start_heartbeat(Duration::from_millis(20))
        .expect("start heartbeat");

    fs::remove_file(&path).expect("remove lock file");
    thread::sleep(Duration::from_millis(100));

    heartbeat.stop().expect("vanished file is not a failure");
    lock.release().expect("release tolerates missing file");
}

#[rstest]
fn heartbeat_failure_is_reported_once(lock_dir: TempDir) {
    let not_a_dir = lock_dir.path().join("plain-file");
    fs::write(&not_a_dir, b"").expect("create file");
    let mut heartbeat =
        Heartbeat::start(&not_a_dir.join(LOCK_FILE_NAME), Duration::from_millis(20))
            .expect("start heartbeat");
    thread::sleep(Duration::from_millis(100));

    let err = heartbeat.stop().expect_err("refresh through a file fails");
    assert!(matches!(err, LockError::HeartbeatFailed { .. }));
    assert!(err.to_string().contains("failed to refresh download lock file"));
    heartbeat.stop().expect("failure already reported");
}

#[test]
fn zero_interval_heartbeat_is_inert() {
    let mut heartbeat =
        Heartbeat::start(Path::new("/nonexistent/lock"), Duration::ZERO).expect("start");
    assert!(heartbeat.worker.is_none());
    heartbeat.stop().expect("stop");
}

#[rstest]
fn dropping_lock_removes_file(lock_dir: TempDir) {
    let path = lock_dir.path().join(LOCK_FILE_NAME);
    {
        let _lock = DownloadLock::acquire(&path, &fast_settings()).expect("acquire");
        assert!(path.exists());
    }
    assert!(!path.exists());
}

#[test]
fn release_failure_lists_each_step() {
    let err = LockError::Release {
        path: PathBuf::from("/cache/.download.lock"),
        failures: vec![
            ReleaseFailure {
                step: ReleaseStep::Close,
                source: io::Error::other("disk gone"),
            },
            ReleaseFailure {
                step: ReleaseStep::Remove,
                source: io::Error::other("read-only"),
            },
        ],
    };
    let message = err.to_string();
    assert!(message.contains("failed to close download lock file: disk gone"));
    assert!(message.contains("failed to remove download lock file: read-only"));
}

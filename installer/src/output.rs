//! User-facing output for the installer CLI.
//!
//! Progress goes to stderr so that stdout carries nothing but the resolved
//! library path, which callers capture in scripts.

use camino::Utf8Path;
use std::io::Write;

use crate::error::{InstallerError, Result};

/// Write a line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Write the resolved library path to `stdout`.
///
/// # Errors
///
/// Returns [`InstallerError::WriteFailed`] if the path cannot be written.
pub fn write_library_path(stdout: &mut dyn Write, path: &Utf8Path) -> Result<()> {
    writeln!(stdout, "{path}")
        .and_then(|()| stdout.flush())
        .map_err(|source| InstallerError::WriteFailed { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn stderr_line_is_newline_terminated() {
        let mut stderr = Vec::new();
        write_stderr_line(&mut stderr, "Resolving local runtime library...");
        assert_eq!(stderr, b"Resolving local runtime library...\n");
    }

    #[test]
    fn stderr_write_failures_are_ignored() {
        write_stderr_line(&mut BrokenPipe, "lost");
    }

    #[test]
    fn library_path_is_printed_alone() {
        let mut stdout = Vec::new();
        write_library_path(&mut stdout, Utf8Path::new("/cache/v0.3.1/linux-amd64/lib.so"))
            .expect("write");
        assert_eq!(stdout, b"/cache/v0.3.1/linux-amd64/lib.so\n");
    }

    #[test]
    fn library_path_write_failure_is_reported() {
        let err = write_library_path(&mut BrokenPipe, Utf8Path::new("/x")).expect_err("broken");
        assert!(matches!(err, InstallerError::WriteFailed { .. }));
    }
}

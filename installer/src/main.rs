//! Chroma local runtime installer CLI entrypoint.
//!
//! This binary resolves the local runtime library the same way client
//! construction does, downloading and verifying it into the shared cache
//! when needed, and prints the library path to stdout.

use chroma_local_installer::cli::Cli;
use chroma_local_installer::error::Result;
use chroma_local_installer::output::{write_library_path, write_stderr_line};
use chroma_local_installer::resolver::{RuntimeEnvironment, resolve_library_path};
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &cli.environment(), &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(
    cli: &Cli,
    env: &dyn RuntimeEnvironment,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if !cli.quiet {
        write_stderr_line(stderr, "Resolving local runtime library...");
    }
    let path = resolve_library_path(&cli.resolver_config(), env)?;
    if !cli.quiet {
        write_stderr_line(stderr, format!("Local runtime library ready: {path}"));
    }
    write_library_path(stdout, &path)
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::{Utf8Path, Utf8PathBuf};
    use chroma_local_installer::artefact::version_tag::LibraryVersionTag;
    use chroma_local_installer::error::InstallerError;

    /// An environment that "downloads" by returning a path in the cache.
    struct CachedEnvironment;

    impl RuntimeEnvironment for CachedEnvironment {
        fn library_path_override(&self) -> Option<Utf8PathBuf> {
            None
        }

        fn detect_version(&self) -> String {
            "v0.3.1".to_owned()
        }

        fn default_cache_dir(&self) -> Result<Utf8PathBuf> {
            Ok(Utf8PathBuf::from("/cache"))
        }

        fn ensure_downloaded(
            &self,
            version: &LibraryVersionTag,
            cache_dir: &Utf8Path,
        ) -> Result<Utf8PathBuf> {
            Ok(cache_dir
                .join(version.as_str())
                .join("linux-amd64")
                .join("libchroma_shim.so"))
        }
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(InstallerError::NotConfigured), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("local runtime library path is not configured"));
    }

    #[test]
    fn run_prints_only_the_path_to_stdout() {
        let cli = Cli::parse_from(["chroma-local-installer", "--library-version", "0.2.0"]);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        run(&cli, &CachedEnvironment, &mut stdout, &mut stderr).expect("run succeeds");

        assert_eq!(stdout, b"/cache/v0.2.0/linux-amd64/libchroma_shim.so\n");
        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("Local runtime library ready"));
    }

    #[test]
    fn quiet_run_writes_nothing_to_stderr() {
        let cli = Cli::parse_from(["chroma-local-installer", "--quiet"]);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        run(&cli, &CachedEnvironment, &mut stdout, &mut stderr).expect("run succeeds");

        assert!(stderr.is_empty());
        assert!(!stdout.is_empty());
    }

    #[test]
    fn invalid_version_flag_fails() {
        let cli = Cli::parse_from(["chroma-local-installer", "--library-version", "../x"]);
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let err = run(&cli, &CachedEnvironment, &mut stdout, &mut stderr).expect_err("invalid");
        assert!(matches!(err, InstallerError::InvalidVersion { .. }));
        assert!(stdout.is_empty());
    }
}

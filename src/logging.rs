//! Tracing subscriber setup for `bosh-connect`.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How much to print on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    /// `--verbose`: handshake progress.
    Default,
    /// `--verbose=wire`: also raw request/response bodies.
    Wire,
}

impl Verbosity {
    pub fn from_flag(value: Option<&str>) -> Self {
        match value {
            None => Verbosity::Quiet,
            Some("wire") => Verbosity::Wire,
            Some(_) => Verbosity::Default,
        }
    }

    fn directives(self) -> &'static str {
        match self {
            Verbosity::Quiet => "bosh_client=warn,bosh_connect=warn,warn",
            Verbosity::Default => "bosh_client=info,bosh_connect=info,warn",
            Verbosity::Wire => "bosh_client=debug,bosh::wire=debug,bosh_connect=info,warn",
        }
    }
}

/// Filter for one layer: `RUST_LOG` wins over the command line.
fn filter(verbosity: Verbosity) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(verbosity.directives())
    }
}

/// Default directory for `--log-file` without a directory component.
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bosh-connect")
        .join("logs")
}

/// Install the global subscriber: stderr always, plus a daily-rotating file
/// when `log_file` is given. Keep the returned guard alive until exit or
/// buffered file lines are lost.
pub fn init(verbosity: Verbosity, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter(verbosity));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(default_log_dir);
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "bosh-connect.log".to_string());

            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Warning: could not create log directory '{}': {}", dir.display(), e);
            }

            let file_appender = tracing_appender::rolling::daily(&dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(filter(Verbosity::Wire));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flag() {
        assert_eq!(Verbosity::from_flag(None), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flag(Some("default")), Verbosity::Default);
        assert_eq!(Verbosity::from_flag(Some("wire")), Verbosity::Wire);
    }

    #[test]
    fn test_wire_directives_enable_wire_target() {
        assert!(Verbosity::Wire.directives().contains("bosh::wire=debug"));
        assert!(!Verbosity::Default.directives().contains("bosh::wire"));
    }

    #[test]
    fn test_default_log_dir_is_namespaced() {
        assert!(default_log_dir().ends_with("bosh-connect/logs"));
    }
}

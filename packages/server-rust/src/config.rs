//! Service configuration loaded from flags, environment, and `.env` files.
//!
//! Precedence, highest first: command-line flag, process environment
//! (including values overlaid from env files), built-in default.

use std::path::Path;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, ValueEnum};
use svctmpl_core::{DuplicateKeys, Severity};

/// Errors raised while assembling [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required value is missing or a value failed to parse.
    #[error(transparent)]
    Invalid(#[from] clap::Error),
}

/// Top-level configuration for the `svctmpl` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "svctmpl",
    about = "Service template with request correlation and context-scoped logging",
    version
)]
pub struct Config {
    #[command(flatten)]
    pub service: ServiceConfig,
    #[command(flatten)]
    pub http: HttpConfig,
    #[command(flatten)]
    pub grpc: GrpcConfig,
    #[command(flatten)]
    pub log: LogConfig,
}

impl Config {
    /// Overlays each env file onto the process environment, then parses
    /// flags and environment. Missing env files are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required value is missing or
    /// a value cannot be parsed.
    pub fn load(env_files: &[&Path]) -> Result<Self, ConfigError> {
        Self::load_from(std::env::args_os(), env_files)
    }

    /// Like [`Config::load`] but with explicit arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a required value is missing or
    /// a value cannot be parsed.
    pub fn load_from<I, T>(args: I, env_files: &[&Path]) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        for file in env_files {
            // Later files override earlier ones and the inherited environment.
            dotenvy::from_filename_override(file).ok();
        }
        Ok(Self::try_parse_from(args)?)
    }
}

/// Service identity and minimum log severity.
#[derive(Debug, Clone, Args)]
pub struct ServiceConfig {
    /// Service name, bound to every log record as `service`.
    #[arg(long = "service-name", env = "SERVICE_NAME")]
    pub name: String,
    /// Service version, bound to every log record as `version`.
    #[arg(
        id = "service_version",
        long = "service-version",
        env = "SERVICE_VERSION",
        default_value = "0.0.0-dev"
    )]
    pub version: String,
    /// Minimum severity written by the log sink.
    #[arg(long = "log-level", env = "SERVICE_LOG_LEVEL", default_value = "info")]
    pub log_level: Severity,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Args)]
pub struct HttpConfig {
    #[arg(id = "http_host", long = "http-host", env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    #[arg(id = "http_port", long = "http-port", env = "HTTP_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Maximum time a request may take before the server answers 408.
    #[arg(
        long = "http-request-timeout-secs",
        env = "HTTP_REQUEST_TIMEOUT_SECS",
        default_value_t = 30
    )]
    pub request_timeout_secs: u64,
    /// Copy the request's `X-Request-ID` onto the response.
    #[arg(
        long = "http-echo-request-id",
        env = "HTTP_ECHO_REQUEST_ID",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub echo_request_id: bool,
}

impl HttpConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            echo_request_id: true,
        }
    }
}

/// gRPC listener settings.
#[derive(Debug, Clone, Args)]
pub struct GrpcConfig {
    #[arg(id = "grpc_host", long = "grpc-host", env = "GRPC_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    #[arg(id = "grpc_port", long = "grpc-port", env = "GRPC_PORT", default_value_t = 9090)]
    pub port: u16,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Destination stream for log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogOutput {
    #[default]
    Stderr,
    Stdout,
}

/// Log sink settings.
#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    #[arg(
        long = "log-output",
        env = "LOG_OUTPUT",
        value_enum,
        default_value_t = LogOutput::Stderr
    )]
    pub output: LogOutput,
    /// How repeated field keys are written: `append` or `last-write-wins`.
    #[arg(long = "log-duplicate-keys", env = "LOG_DUPLICATE_KEYS", default_value = "append")]
    pub duplicate_keys: DuplicateKeys,
    /// Development mode: `dpanic` records also panic.
    #[arg(
        long = "log-development",
        env = "LOG_DEVELOPMENT",
        default_value_t = false,
        action = ArgAction::Set
    )]
    pub development: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            duplicate_keys: DuplicateKeys::Append,
            development: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Config::command().debug_assert();
    }

    #[test]
    fn defaults_apply_when_only_name_given() {
        let config = Config::try_parse_from(["svctmpl", "--service-name", "orders"]).unwrap();

        assert_eq!(config.service.name, "orders");
        assert_eq!(config.service.version, "0.0.0-dev");
        assert_eq!(config.service.log_level, Severity::Info);
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.request_timeout(), Duration::from_secs(30));
        assert!(config.http.echo_request_id);
        assert_eq!(config.grpc.port, 9090);
        assert_eq!(config.log.output, LogOutput::Stderr);
        assert_eq!(config.log.duplicate_keys, DuplicateKeys::Append);
        assert!(!config.log.development);
    }

    #[test]
    fn load_without_version_flag_uses_default_version() {
        let config = Config::load_from(["svctmpl", "--service-name", "orders"], &[]).unwrap();

        assert_eq!(config.service.name, "orders");
        assert_eq!(config.service.version, "0.0.0-dev");
    }

    #[test]
    fn version_flag_sets_service_version() {
        let config = Config::load_from(
            ["svctmpl", "--service-name", "orders", "--service-version", "2.0.1"],
            &[],
        )
        .unwrap();

        assert_eq!(config.service.version, "2.0.1");
    }

    #[test]
    fn struct_defaults_match_flag_defaults() {
        let parsed = Config::try_parse_from(["svctmpl", "--service-name", "orders"]).unwrap();
        let http = HttpConfig::default();
        let grpc = GrpcConfig::default();

        assert_eq!(http.host, parsed.http.host);
        assert_eq!(http.port, parsed.http.port);
        assert_eq!(http.request_timeout_secs, parsed.http.request_timeout_secs);
        assert_eq!(http.echo_request_id, parsed.http.echo_request_id);
        assert_eq!(grpc.host, parsed.grpc.host);
        assert_eq!(grpc.port, parsed.grpc.port);
        assert_eq!(LogConfig::default().duplicate_keys, parsed.log.duplicate_keys);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "svctmpl",
            "--service-name",
            "orders",
            "--log-level",
            "warning",
            "--http-port",
            "8181",
            "--http-echo-request-id",
            "false",
            "--log-duplicate-keys",
            "last-write-wins",
            "--log-output",
            "stdout",
        ])
        .unwrap();

        assert_eq!(config.service.log_level, Severity::Warn);
        assert_eq!(config.http.port, 8181);
        assert!(!config.http.echo_request_id);
        assert_eq!(config.log.duplicate_keys, DuplicateKeys::LastWriteWins);
        assert_eq!(config.log.output, LogOutput::Stdout);
    }

    #[test]
    fn invalid_level_is_rejected() {
        let err = Config::try_parse_from([
            "svctmpl",
            "--service-name",
            "orders",
            "--log-level",
            "loud",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn env_file_supplies_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SVCTMPL_TEST_ONLY=1").unwrap();
        writeln!(file, "SERVICE_NAME=from-env-file").unwrap();

        let config = Config::load_from(["svctmpl"], &[file.path()]).unwrap();

        assert_eq!(config.service.name, "from-env-file");
        assert_eq!(std::env::var("SVCTMPL_TEST_ONLY").as_deref(), Ok("1"));
    }

    #[test]
    fn missing_env_file_is_skipped() {
        let config = Config::load_from(
            ["svctmpl", "--service-name", "orders"],
            &[Path::new("/nonexistent/svctmpl.env")],
        )
        .unwrap();
        assert_eq!(config.service.name, "orders");
    }
}

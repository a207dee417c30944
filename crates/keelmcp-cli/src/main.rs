//! Reference MCP server binary.
//!
//! `keelmcp stdio` serves on stdin/stdout; `keelmcp sse` and
//! `keelmcp http` serve the HTTP framings. Exit codes: 0 on clean
//! shutdown, 1 on a fatal startup error, 2 on invalid configuration.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use keelmcp_auth::{JwksCache, JwtValidator, ValidationOptions};
use keelmcp_protocol::types::LogLevel;
use keelmcp_server::{McpServer, McpServerBuilder};

mod reference;

#[derive(Parser)]
#[command(name = "keelmcp", version, about = "Reference MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Minimum log level for sessions and process logging
    #[arg(long, env = "MCP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// OAuth issuer; enables bearer validation on HTTP transports
    #[arg(long, env = "MCP_OAUTH_ISSUER")]
    oauth_issuer: Option<String>,

    /// Expected token audience
    #[arg(long, env = "MCP_OAUTH_AUDIENCE")]
    oauth_audience: Option<String>,

    /// Expected authorized party (azp claim)
    #[arg(long, env = "MCP_OAUTH_AZP")]
    oauth_azp: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve over stdin/stdout
    Stdio,
    /// Serve the HTTP+SSE framing
    Sse {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Serve the streamable HTTP framing
    Http {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Exit code for invalid configuration.
const EXIT_CONFIG: u8 = 2;
/// Exit code for fatal startup or serve errors.
const EXIT_FATAL: u8 = 1;

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let ip: IpAddr = host
        .parse()
        .map_err(|_| format!("invalid host address: {host}"))?;
    Ok(SocketAddr::new(ip, port))
}

fn apply_auth(builder: McpServerBuilder, cli: &Cli, resource: &str) -> McpServerBuilder {
    let Some(issuer) = &cli.oauth_issuer else {
        return builder;
    };
    let options = ValidationOptions {
        expected_issuer: Some(issuer.clone()),
        expected_audience: cli.oauth_audience.clone(),
        expected_authorized_party: cli.oauth_azp.clone(),
        ..Default::default()
    };
    let validator = JwtValidator::new(issuer.clone(), options, JwksCache::new());
    let metadata_url = format!("{resource}/.well-known/oauth-protected-resource");
    builder.bearer_auth(Arc::new(validator), metadata_url)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Ok(level) = cli.log_level.parse::<LogLevel>() else {
        eprintln!("invalid MCP_LOG_LEVEL: {}", cli.log_level);
        return ExitCode::from(EXIT_CONFIG);
    };
    if cli.oauth_issuer.is_none() && (cli.oauth_audience.is_some() || cli.oauth_azp.is_some()) {
        eprintln!("MCP_OAUTH_AUDIENCE/MCP_OAUTH_AZP require MCP_OAUTH_ISSUER");
        return ExitCode::from(EXIT_CONFIG);
    }

    // On stdio the protocol owns stdout; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_filter(level))),
        )
        .with_writer(std::io::stderr)
        .init();

    let run = async {
        match &cli.command {
            Command::Stdio => {
                let server = reference::build(McpServer::builder().default_log_level(level)).build();
                server.serve_stdio().await
            }
            Command::Sse { host, port } => {
                let addr = parse_addr(host, *port).map_err(ConfigError)?;
                let resource = format!("http://{addr}");
                let builder = apply_auth(
                    reference::build(McpServer::builder().default_log_level(level)),
                    &cli,
                    &resource,
                );
                builder.build().serve_sse(addr).await
            }
            Command::Http { host, port } => {
                let addr = parse_addr(host, *port).map_err(ConfigError)?;
                let resource = format!("http://{addr}");
                let builder = apply_auth(
                    reference::build(McpServer::builder().default_log_level(level)),
                    &cli,
                    &resource,
                );
                builder.build().serve_http(addr).await
            }
        }
    };

    match run.await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(config) = err_as_config(&err) {
                eprintln!("{config}");
                return ExitCode::from(EXIT_CONFIG);
            }
            error!(error = %err, "server failed");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Marker wrapping configuration failures so `main` can pick exit code 2.
#[derive(Debug)]
struct ConfigError(String);

impl From<ConfigError> for keelmcp_server::ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(format!("configuration: {}", err.0))
    }
}

fn err_as_config(err: &keelmcp_server::ServerError) -> Option<&str> {
    match err {
        keelmcp_server::ServerError::Internal(message) => {
            message.strip_prefix("configuration: ")
        }
        _ => None,
    }
}

/// Map the MCP level ladder onto a tracing filter directive.
fn tracing_filter(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info | LogLevel::Notice => "info",
        LogLevel::Warning => "warn",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_parse_or_report_config_errors() {
        assert!(parse_addr("127.0.0.1", 8080).is_ok());
        assert!(parse_addr("::1", 9000).is_ok());
        assert!(parse_addr("not-a-host", 8080).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["keelmcp", "stdio"]);
        assert!(matches!(cli.command, Command::Stdio));

        let cli = Cli::parse_from(["keelmcp", "sse", "--host", "0.0.0.0", "--port", "9000"]);
        match cli.command {
            Command::Sse { host, port } => {
                assert_eq!(host, "0.0.0.0");
                assert_eq!(port, 9000);
            }
            _ => panic!("expected sse"),
        }

        let cli = Cli::parse_from(["keelmcp", "http"]);
        assert!(matches!(cli.command, Command::Http { .. }));
    }

    #[test]
    fn tracing_filter_covers_the_ladder() {
        assert_eq!(tracing_filter(LogLevel::Debug), "debug");
        assert_eq!(tracing_filter(LogLevel::Emergency), "error");
    }
}

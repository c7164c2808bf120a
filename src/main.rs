//! zsetkv server binary
//!
//! Parses flags, sets up logging, starts the expiry sweeper and serves
//! RESP clients until Ctrl+C.

use anyhow::{bail, Context};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zsetkv::commands::{CommandHandler, CommandMetrics};
use zsetkv::connection::{handle_connection, ConnectionStats};
use zsetkv::storage::{start_expiry_sweeper, StorageEngine};

/// Server configuration
#[derive(Debug)]
struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: zsetkv::DEFAULT_HOST.to_string(),
            port: zsetkv::DEFAULT_PORT,
        }
    }
}

/// What the command line asked for.
enum Invocation {
    Serve(Config),
    Help,
    Version,
}

impl Config {
    /// Parses `--host/-h`, `--port/-p`, `--help` and `--version/-v`.
    fn from_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Invocation> {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => {
                    config.host = args.next().context("--host requires a value")?;
                }
                "--port" | "-p" => {
                    let port = args.next().context("--port requires a value")?;
                    config.port = port
                        .parse()
                        .with_context(|| format!("invalid port number: {}", port))?;
                }
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                other => bail!("unknown argument: {}", other),
            }
        }

        Ok(Invocation::Serve(config))
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"zsetkv - in-memory store for expiring strings and sorted sets

USAGE:
    zsetkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: {host})
    -p, --port <PORT>    Port to listen on (default: {port})
    -v, --version        Print version information
        --help           Print this help message

Log verbosity follows RUST_LOG (default: info).

CONNECTING:
    $ redis-cli -p {port}
    127.0.0.1:{port}> ZADD board 10 alice 20 bob
    (integer) 2
    127.0.0.1:{port}> ZRANGE board 0 -1
    1) "alice"
    2) "bob"
    127.0.0.1:{port}> SET session abc EX 60
    OK
"#,
        host = zsetkv::DEFAULT_HOST,
        port = zsetkv::DEFAULT_PORT,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Ok(Invocation::Serve(config)) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("zsetkv version {}", zsetkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let storage = Arc::new(StorageEngine::new());
    let metrics = Arc::new(CommandMetrics::new());
    let stats = Arc::new(ConnectionStats::new());
    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(address = %address, version = zsetkv::VERSION, "zsetkv listening");

    let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&metrics));

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received");
        }
    }

    let snapshot = metrics.snapshot();
    info!(
        connections = stats.connections_accepted(),
        commands = snapshot.total_commands,
        errors = snapshot.errors,
        keys = storage.total_keys(),
        "Server shutdown complete"
    );
    Ok(())
}

async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => error!(error = %e, "Failed to accept connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Invocation> {
        Config::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let Ok(Invocation::Serve(config)) = parse(&[]) else {
            panic!("expected a serve invocation");
        };
        assert_eq!(config.bind_address(), "127.0.0.1:6379");
    }

    #[test]
    fn test_host_and_port() {
        let Ok(Invocation::Serve(config)) = parse(&["-h", "0.0.0.0", "--port", "7000"]) else {
            panic!("expected a serve invocation");
        };
        assert_eq!(config.bind_address(), "0.0.0.0:7000");
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse(&["--port"]).is_err());
        assert!(parse(&["--port", "seventy"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(matches!(parse(&["--help"]), Ok(Invocation::Help)));
        assert!(matches!(parse(&["-v"]), Ok(Invocation::Version)));
    }
}

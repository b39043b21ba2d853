//! CLI entry point for the datastream live-update bridge.
//!
//! This binary runs the streaming server, or follows a stream as a client.
//!
//! # Usage
//!
//! ```bash
//! datastream [OPTIONS] <COMMAND>
//!
//! # Serve ./static/data/*.json on the default address
//! datastream serve --root .
//!
//! # Poll instead of using OS notifications (network mounts, containers)
//! datastream serve --root /srv/site --poll-interval-ms 1000
//!
//! # Print the record count of every snapshot
//! datastream follow --source static/data/reels.json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use ds_client::{subscribe, HttpTransport, SubscribeOptions};
use ds_core::{Config, Snapshot};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Streams JSON data files to clients as server-sent events.
#[derive(Parser)]
#[command(name = "datastream", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file. Command-line flags override its values.
    #[arg(short, long, global = true, env = "DATASTREAM_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the stream endpoint.
    Serve {
        /// Directory that `data_source` paths are resolved against.
        #[arg(short, long, env = "DATASTREAM_ROOT")]
        root: Option<Utf8PathBuf>,

        /// Address to listen on.
        #[arg(short, long, env = "DATASTREAM_BIND")]
        bind: Option<SocketAddr>,

        /// Directory prefix every data source must start with.
        #[arg(long, env = "DATASTREAM_TRUSTED_DIR")]
        trusted_dir: Option<String>,

        /// Extension every data source must end with, including the dot.
        #[arg(long, env = "DATASTREAM_EXTENSION")]
        extension: Option<String>,

        /// Window in which rapid writes collapse into one update.
        #[arg(long, env = "DATASTREAM_DEBOUNCE_MS")]
        debounce_ms: Option<u64>,

        /// Poll for changes at this interval instead of using OS notifications.
        #[arg(long, env = "DATASTREAM_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,
    },

    /// Subscribe to a data source and print each snapshot.
    Follow {
        /// Data source to subscribe to.
        #[arg(short, long)]
        source: String,

        /// Stream endpoint URL.
        #[arg(
            short,
            long,
            env = "DATASTREAM_URL",
            default_value = "http://127.0.0.1:5173/api/data-stream"
        )]
        url: String,

        /// Delay before the first reconnect; doubles on each further attempt.
        #[arg(long, env = "DATASTREAM_RETRY_BASE_MS")]
        retry_base_ms: Option<u64>,

        /// Reconnect attempts before giving up.
        #[arg(long, env = "DATASTREAM_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Print full snapshots as JSON instead of record counts.
        #[arg(long)]
        json: bool,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `hyper` and `mio` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},hyper=warn,mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Loads the `--config` file, or defaults when none is given.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
fn load_config(cli: &Cli) -> color_eyre::Result<Config> {
    match &cli.config {
        Some(path) => Config::from_file(path)
            .map_err(|e| color_eyre::eyre::eyre!("Failed to load config {path}: {e}")),
        None => Ok(Config::default()),
    }
}

/// Applies `serve` flags over `config` and validates the result.
///
/// # Errors
///
/// Returns an error if the root is not a directory or an option is invalid.
fn build_serve_config(cli: &Cli, mut config: Config) -> color_eyre::Result<Config> {
    let Commands::Serve {
        root,
        bind,
        trusted_dir,
        extension,
        debounce_ms,
        poll_interval_ms,
    } = &cli.command
    else {
        return Ok(config);
    };

    if let Some(root) = root {
        config.server.root.clone_from(root);
    }
    if let Some(bind) = bind {
        config.server.bind = *bind;
    }
    if let Some(dir) = trusted_dir {
        config.trust.trusted_dir.clone_from(dir);
    }
    if let Some(ext) = extension {
        config.trust.extension.clone_from(ext);
    }
    if let Some(ms) = debounce_ms {
        config.watch.debounce_ms = *ms;
    }
    if poll_interval_ms.is_some() {
        config.watch.poll_interval_ms = *poll_interval_ms;
    }

    config.validate()?;

    let root = &config.server.root;
    if !root.exists() {
        return Err(color_eyre::eyre::eyre!("Root does not exist: {root}"));
    }
    if !root.is_dir() {
        return Err(color_eyre::eyre::eyre!("Root is not a directory: {root}"));
    }

    Ok(config)
}

/// Builds subscription options from `follow` flags over `config`.
///
/// # Errors
///
/// Returns an error if the URL is invalid.
fn build_follow_options(cli: &Cli, config: &Config) -> color_eyre::Result<SubscribeOptions> {
    let Commands::Follow {
        source,
        url,
        retry_base_ms,
        max_retries,
        ..
    } = &cli.command
    else {
        return Err(color_eyre::eyre::eyre!("not a follow command"));
    };

    let mut retry = config.retry;
    if let Some(ms) = retry_base_ms {
        retry.base_interval_ms = *ms;
    }
    if let Some(max) = max_retries {
        retry.max_attempts = *max;
    }

    let mut checked = config.clone();
    checked.retry = retry;
    checked.validate()?;

    Ok(SubscribeOptions::new(url, source.clone())?.with_retry(retry))
}

/// Resolves once SIGINT (or SIGTERM on Unix) arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("Received shutdown signal");
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the server until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
async fn run_serve(config: Config) -> color_eyre::Result<()> {
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    ds_server::serve(config, shutdown).await?;
    Ok(())
}

/// Follows a stream, printing each snapshot until interrupted or exhausted.
///
/// # Errors
///
/// Returns an error if the retry budget runs out or stdout fails.
async fn run_follow(options: SubscribeOptions, json: bool) -> color_eyre::Result<()> {
    info!(url = %options.stream_url(), "Following");

    let (sink, mut snapshots) = watch::channel(Snapshot::empty());
    let subscription = subscribe(options, Snapshot::extract, sink, HttpTransport::new()?);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot, json)?;
            }
            _ = subscription.closed() => break,
            () = &mut shutdown => {
                subscription.close();
                break;
            }
        }
    }

    subscription.wait().await?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints one snapshot to stdout.
fn print_snapshot(snapshot: &Snapshot, json: bool) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    if json {
        writeln!(handle, "{}", snapshot.to_json())?;
    } else {
        let noun = if snapshot.len() == 1 { "record" } else { "records" };
        writeln!(handle, "{} {noun}", snapshot.len())?;
    }
    handle.flush()
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    let config = load_config(&cli)?;
    match &cli.command {
        Commands::Serve { .. } => {
            let config = build_serve_config(&cli, config)?;
            run_serve(config).await
        }
        Commands::Follow { json, .. } => {
            let options = build_follow_options(&cli, &config)?;
            run_follow(options, *json).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("datastream").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_serve_flags_override_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = parse(&[
            "serve",
            "--root",
            root,
            "--bind",
            "0.0.0.0:8080",
            "--trusted-dir",
            "public/feeds",
            "--poll-interval-ms",
            "1000",
        ]);

        let config = build_serve_config(&cli, Config::default()).unwrap();
        assert_eq!(config.server.root.as_str(), root);
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.trust.trusted_dir, "public/feeds");
        assert_eq!(config.trust.extension, ".json");
        assert_eq!(config.watch.poll_interval_ms, Some(1000));
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn test_serve_rejects_missing_root() {
        let cli = parse(&["serve", "--root", "/nonexistent/datastream/root"]);
        assert!(build_serve_config(&cli, Config::default()).is_err());
    }

    #[test]
    fn test_serve_rejects_invalid_options() {
        let cli = parse(&["serve", "--extension", "json"]);
        assert!(build_serve_config(&cli, Config::default()).is_err());
    }

    #[test]
    fn test_config_file_is_layered_under_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("datastream.json");
        std::fs::write(
            &path,
            r#"{"retry": {"base_interval_ms": 250, "max_attempts": 9}}"#,
        )
        .unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "follow",
            "--source",
            "static/data/reels.json",
            "--max-retries",
            "2",
        ]);
        let config = load_config(&cli).unwrap();
        let options = build_follow_options(&cli, &config).unwrap();

        assert_eq!(options.retry.base_interval_ms, 250);
        assert_eq!(options.retry.max_attempts, 2);
        assert_eq!(options.data_source, "static/data/reels.json");
        assert_eq!(
            options.endpoint.as_str(),
            "http://127.0.0.1:5173/api/data-stream"
        );
    }

    #[test]
    fn test_follow_rejects_bad_url() {
        let cli = parse(&["follow", "--source", "static/data/a.json", "--url", "nope"]);
        assert!(build_follow_options(&cli, &Config::default()).is_err());
    }
}

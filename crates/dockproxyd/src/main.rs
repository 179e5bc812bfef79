// # dockproxyd - Docker-driven nginx proxy controller
//
// This binary is a THIN integration layer. All reconciliation logic lives in
// dockproxy-core; this file only:
// 1. Reads configuration from flags and environment variables
// 2. Initializes logging and the tokio runtime
// 3. Wires the Docker runtime, nginx engine and file store together
// 4. Runs one of the commands below and maps the outcome to an exit code
//
// ## Commands
//
// - `generate [--reload]`: one reconciliation pass, then exit
// - `watch`: startup pass, then follow container lifecycle events
// - `validate`: run the nginx configuration test only
//
// ## Configuration
//
// Every flag has an environment variable fallback:
//
// - `LOG_LEVEL`: trace, debug, info, warn, error (default: info)
// - `DOCKER_HOST`: Docker endpoint (default: unix:///var/run/docker.sock)
// - `NGINX_STREAM_CONFIG_PATH`: stream document path
// - `NGINX_HTTP_CONFIG_PATH`: http document path
// - `NGINX_VALIDATE_CMD`: configuration test command (default: nginx -t)
// - `NGINX_RELOAD_CMD`: reload command (default: nginx -s reload)
// - `PROXY_NETWORK`: network to create at watch startup if missing
// - `DOCKPROXY_DEBOUNCE_MS`: quiet period before a pass (default: 2000)
//
// ## Example
//
// ```bash
// export NGINX_STREAM_CONFIG_PATH=/etc/nginx/conf.d/proxy.conf
// export NGINX_RELOAD_CMD="docker exec nginx nginx -s reload"
//
// dockproxyd watch
// ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockproxy_core::traits::{ContainerRuntime, DocumentKind, ProxyEngine};
use dockproxy_core::{
    ControllerEvent, FileDocumentStore, ProxyConfig, ReconcileController, SyncOutcome,
};
use dockproxy_docker::DockerRuntime;
use dockproxy_nginx::NginxEngine;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (failed pass, lost event stream, forced exit)
    RuntimeError = 2,
}

impl From<ProxyExitCode> for ExitCode {
    fn from(code: ProxyExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Keeps nginx proxy configuration in sync with labeled Docker containers")]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Log verbosity
    #[clap(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Docker endpoint (unix:// or tcp://)
    #[clap(
        long,
        global = true,
        env = "DOCKER_HOST",
        default_value = "unix:///var/run/docker.sock"
    )]
    docker_host: String,

    /// Path of the generated stream document
    #[clap(
        long,
        global = true,
        env = "NGINX_STREAM_CONFIG_PATH",
        default_value = "/etc/nginx/conf.d/proxy.conf"
    )]
    stream_config_path: PathBuf,

    /// Path of the generated http document
    #[clap(
        long,
        global = true,
        env = "NGINX_HTTP_CONFIG_PATH",
        default_value = "/etc/nginx/conf.d/http-proxy.conf"
    )]
    http_config_path: PathBuf,

    /// Command that tests the nginx configuration
    #[clap(long, global = true, env = "NGINX_VALIDATE_CMD", default_value = "nginx -t")]
    validate_cmd: String,

    /// Command that reloads nginx
    #[clap(
        long,
        global = true,
        env = "NGINX_RELOAD_CMD",
        default_value = "nginx -s reload"
    )]
    reload_cmd: String,

    /// Network to ensure exists before watching
    #[clap(long, global = true, env = "PROXY_NETWORK")]
    network: Option<String>,

    /// Quiet period after the last event before a pass runs
    #[clap(long, global = true, env = "DOCKPROXY_DEBOUNCE_MS", default_value_t = 2000)]
    debounce_ms: u64,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Generate the configuration once and exit
    Generate {
        /// Test and reload nginx when a document changed
        #[clap(long)]
        reload: bool,
    },
    /// Generate at startup, then regenerate on container lifecycle events
    Watch,
    /// Run the nginx configuration test and exit
    Validate,
}

impl Cli {
    fn proxy_config(&self) -> ProxyConfig {
        let mut config = ProxyConfig::new();
        config.runtime.docker_host = self.docker_host.clone();
        config.runtime.network = self.network.clone();
        config.output.stream_config_path = self.stream_config_path.clone();
        config.output.http_config_path = self.http_config_path.clone();
        config.engine.validate_cmd = self.validate_cmd.clone();
        config.engine.reload_cmd = self.reload_cmd.clone();
        config.controller.debounce_ms = self.debounce_ms;
        config
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ProxyExitCode::ConfigError.into();
        }
    };

    let config = cli.proxy_config();
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ProxyExitCode::ConfigError.into();
    }

    // Logs go to stderr so command summaries stay on stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ProxyExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProxyExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match cli.command {
            Command::Generate { reload } => run_generate(config, reload).await,
            Command::Watch => run_watch(config).await,
            Command::Validate => run_validate(config).await,
        }
    });

    code.into()
}

/// Everything a reconciliation pass needs, connected and ready
struct Components {
    runtime: DockerRuntime,
    engine: NginxEngine,
    store: FileDocumentStore,
}

async fn connect(config: &ProxyConfig) -> Result<Components> {
    let runtime = DockerRuntime::connect(&config.runtime.docker_host, config.runtime.event_buffer)
        .await
        .with_context(|| format!("Failed to connect to Docker at {}", config.runtime.docker_host))?;

    let store = FileDocumentStore::new(
        &config.output.stream_config_path,
        &config.output.http_config_path,
    )
    .await
    .context("Failed to prepare output paths")?;

    Ok(Components {
        runtime,
        engine: NginxEngine::from_config(&config.engine),
        store,
    })
}

fn controller(
    components: Components,
    config: &ProxyConfig,
) -> Result<(ReconcileController, mpsc::Receiver<ControllerEvent>)> {
    ReconcileController::new(
        Box::new(components.runtime),
        Box::new(components.engine),
        Box::new(components.store),
        config.controller.clone(),
    )
    .context("Failed to create controller")
}

/// Run one pass, optionally followed by a configuration test and reload
async fn run_generate(config: ProxyConfig, reload: bool) -> ProxyExitCode {
    let (controller, _events) = match connect(&config)
        .await
        .and_then(|components| controller(components, &config))
    {
        Ok(built) => built,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return ProxyExitCode::ConfigError;
        }
    };

    let cancel = CancellationToken::new();
    let result = if reload {
        controller.reconcile(&cancel).await
    } else {
        controller.sync_documents(&cancel).await
    };

    match result {
        Ok(outcome) => {
            print_outcome(&config, &outcome);
            ProxyExitCode::CleanShutdown
        }
        Err(e) => {
            eprintln!("✗ Generation failed: {}", e);
            ProxyExitCode::RuntimeError
        }
    }
}

fn print_outcome(config: &ProxyConfig, outcome: &SyncOutcome) {
    println!(
        "✓ {} target(s), {} skipped",
        outcome.targets, outcome.skipped
    );
    for (kind, commit, path) in [
        (DocumentKind::Stream, &outcome.stream, &config.output.stream_config_path),
        (DocumentKind::Http, &outcome.http, &config.output.http_config_path),
    ] {
        let status = if commit.changed { "written" } else { "unchanged" };
        println!(
            "  {} {} ({}) {}",
            kind,
            path.display(),
            commit.fingerprint.short(),
            status
        );
    }
}

/// Run the configuration test only
async fn run_validate(config: ProxyConfig) -> ProxyExitCode {
    let engine = NginxEngine::from_config(&config.engine);

    match engine.validate().await {
        Ok(()) => {
            println!("✓ nginx configuration is valid");
            ProxyExitCode::CleanShutdown
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            ProxyExitCode::RuntimeError
        }
    }
}

/// Run the controller until a shutdown signal or a fatal error
async fn run_watch(config: ProxyConfig) -> ProxyExitCode {
    let components = match connect(&config).await {
        Ok(components) => components,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return ProxyExitCode::ConfigError;
        }
    };

    if let Some(network) = &config.runtime.network
        && let Err(e) = components.runtime.ensure_network(network).await
    {
        error!("Failed to ensure network {}: {}", network, e);
        return ProxyExitCode::ConfigError;
    }

    let (controller, events) = match controller(components, &config) {
        Ok(built) => built,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return ProxyExitCode::ConfigError;
        }
    };

    let cancel = CancellationToken::new();
    if let Err(e) = spawn_signal_handler(cancel.clone()) {
        error!("Startup failed: {:#}", e);
        return ProxyExitCode::ConfigError;
    }

    let event_logger = tokio::spawn(log_events(events));

    let result = controller.run(cancel).await;
    drop(controller);
    if let Err(e) = event_logger.await {
        warn!("Controller event logger failed: {}", e);
    }

    match result {
        Ok(()) => {
            info!("dockproxyd stopped");
            ProxyExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Controller error: {}", e);
            ProxyExitCode::RuntimeError
        }
    }
}

async fn log_events(mut events: mpsc::Receiver<ControllerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ControllerEvent::ReconcileFailed { error } => warn!("pass failed: {}", error),
            other => debug!("controller event: {:?}", other),
        }
    }
}

/// Install the shutdown handler
///
/// The first SIGTERM or SIGINT cancels the controller, which finishes an
/// in-flight pass before returning. A second signal exits immediately.
#[cfg(unix)]
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    tokio::spawn(async move {
        let first = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received {}, shutting down (send again to force)", first);
        cancel.cancel();

        let second = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        warn!("Received {} during shutdown, exiting immediately", second);
        std::process::exit(ProxyExitCode::RuntimeError as i32);
    });

    Ok(())
}

/// Install the shutdown handler (CTRL-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Received CTRL-C, shutting down (press again to force)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received CTRL-C during shutdown, exiting immediately");
            std::process::exit(ProxyExitCode::RuntimeError as i32);
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    /// Declared default of a flag, independent of the process environment
    fn declared_default(id: &str) -> Option<String> {
        Cli::command()
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_default_values().first())
            .map(|value| value.to_string_lossy().into_owned())
    }

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let config = ProxyConfig::default();

        assert_eq!(declared_default("log_level").as_deref(), Some("info"));
        assert_eq!(
            declared_default("docker_host"),
            Some(config.runtime.docker_host.clone())
        );
        assert_eq!(
            declared_default("stream_config_path"),
            Some(config.output.stream_config_path.display().to_string())
        );
        assert_eq!(
            declared_default("http_config_path"),
            Some(config.output.http_config_path.display().to_string())
        );
        assert_eq!(
            declared_default("validate_cmd"),
            Some(config.engine.validate_cmd.clone())
        );
        assert_eq!(
            declared_default("reload_cmd"),
            Some(config.engine.reload_cmd.clone())
        );
        assert_eq!(
            declared_default("debounce_ms"),
            Some(config.controller.debounce_ms.to_string())
        );
        assert_eq!(declared_default("network"), None);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_subcommand() {
        let cli = Cli::try_parse_from(["dockproxyd", "watch"]).unwrap();
        assert!(matches!(cli.command, Command::Watch));
    }

    #[test]
    fn test_generate_reload_flag() {
        let cli = Cli::try_parse_from(["dockproxyd", "generate", "--reload"]).unwrap();
        assert!(matches!(cli.command, Command::Generate { reload: true }));

        let cli = Cli::try_parse_from(["dockproxyd", "generate"]).unwrap();
        assert!(matches!(cli.command, Command::Generate { reload: false }));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "dockproxyd",
            "--network",
            "proxy",
            "--debounce-ms",
            "500",
            "--reload-cmd",
            "docker exec nginx nginx -s reload",
            "watch",
        ])
        .unwrap();
        let config = cli.proxy_config();

        assert_eq!(config.runtime.network.as_deref(), Some("proxy"));
        assert_eq!(config.controller.debounce_ms, 500);
        assert_eq!(config.engine.reload_cmd, "docker exec nginx nginx -s reload");
    }

    #[test]
    fn test_log_level_parsing() {
        let mut cli = Cli::try_parse_from(["dockproxyd", "validate"]).unwrap();
        cli.log_level = "DEBUG".to_string();
        assert_eq!(cli.log_level().unwrap(), Level::DEBUG);

        cli.log_level = "loud".to_string();
        assert!(cli.log_level().is_err());
    }

    #[test]
    fn test_identical_output_paths_rejected() {
        let cli = Cli::try_parse_from([
            "dockproxyd",
            "--stream-config-path",
            "/tmp/proxy.conf",
            "--http-config-path",
            "/tmp/proxy.conf",
            "generate",
        ])
        .unwrap();
        assert!(cli.proxy_config().validate().is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProxyExitCode::CleanShutdown as u8, 0);
        assert_eq!(ProxyExitCode::ConfigError as u8, 1);
        assert_eq!(ProxyExitCode::RuntimeError as u8, 2);
    }
}

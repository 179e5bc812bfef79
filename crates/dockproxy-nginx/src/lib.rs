// # nginx Proxy Engine
//
// This crate provides the nginx implementation of `ProxyEngine`.
//
// ## Commands
//
// Both operations are operator-supplied shell command lines run through
// `sh -c`, so they can be wrapped (`docker exec`, `sudo`, ...) without code
// changes. Defaults are `nginx -t` and `nginx -s reload`.
//
// ## Output
//
// stderr is redirected into stdout inside the shell, so the captured output
// keeps the order in which the command wrote it. It is returned verbatim in
// the error on failure. nginx reports configuration errors on stderr.
//
// ## Reload Throttling
//
// A reload requested less than `min_reload_interval` after the previous
// successful reload completed waits out the remainder. Reloads are
// serialized; only a successful reload restarts the interval.

use dockproxy_core::config::EngineConfig;
use dockproxy_core::traits::ProxyEngine;
use dockproxy_core::{Error, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const ENGINE_NAME: &str = "nginx";

/// nginx engine driven by shell commands
#[derive(Debug)]
pub struct NginxEngine {
    validate_cmd: String,
    reload_cmd: String,
    min_reload_interval: Duration,
    /// Completion time of the last successful reload
    last_reload: Mutex<Option<Instant>>,
}

impl NginxEngine {
    pub fn new(
        validate_cmd: impl Into<String>,
        reload_cmd: impl Into<String>,
        min_reload_interval: Duration,
    ) -> Self {
        Self {
            validate_cmd: validate_cmd.into(),
            reload_cmd: reload_cmd.into(),
            min_reload_interval,
            last_reload: Mutex::new(None),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.validate_cmd.clone(),
            config.reload_cmd.clone(),
            config.min_reload_interval(),
        )
    }
}

/// Run a command line through `sh -c`, returning status and combined output
///
/// The script starts with `exec 2>&1`, so both streams share one pipe and
/// interleave as written. Anything left on stderr (the shell failing before
/// the redirect) is appended.
async fn run_shell(command_line: &str) -> std::io::Result<(ExitStatus, String)> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(format!("exec 2>&1\n{command_line}"))
        .stdin(Stdio::null())
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status, combined))
}

#[async_trait::async_trait]
impl ProxyEngine for NginxEngine {
    async fn validate(&self) -> Result<()> {
        debug!("running config test: {}", self.validate_cmd);

        let (status, output) = run_shell(&self.validate_cmd).await.map_err(|e| {
            Error::validation(
                ENGINE_NAME,
                format!("failed to run {:?}: {}", self.validate_cmd, e),
                "",
            )
        })?;

        if !status.success() {
            return Err(Error::validation(ENGINE_NAME, status.to_string(), output));
        }

        debug!("config test passed");
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut last_reload = self.last_reload.lock().await;

        if let Some(previous) = *last_reload {
            let elapsed = previous.elapsed();
            if elapsed < self.min_reload_interval {
                let wait = self.min_reload_interval - elapsed;
                warn!("throttling reload, waiting {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        debug!("running reload: {}", self.reload_cmd);
        let (status, output) = run_shell(&self.reload_cmd).await.map_err(|e| {
            Error::reload(
                ENGINE_NAME,
                format!("failed to run {:?}: {}", self.reload_cmd, e),
                "",
            )
        })?;

        if !status.success() {
            return Err(Error::reload(ENGINE_NAME, status.to_string(), output));
        }

        *last_reload = Some(Instant::now());
        info!("nginx reloaded");
        Ok(())
    }

    fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }
}

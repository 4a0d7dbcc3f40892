//! Routing reload hook.
//!
//! After a site is created, renamed or deleted the front web server has to
//! pick up the new set of directories. The reload runs detached from the
//! request: its outcome is logged and counted but never changes the
//! response.

use crate::metrics;
use async_trait::async_trait;
use plinth_core::config::RoutingConfig;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Longest stderr excerpt kept in a reload error.
const MAX_STDERR_LEN: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("failed to spawn reload command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("reload command timed out after {0:?}")]
    Timeout(Duration),

    #[error("reload command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Signals the routing layer that the set of sites changed.
#[async_trait]
pub trait RouteReloader: Send + Sync {
    async fn reload(&self) -> Result<(), ReloadError>;
}

/// Reloader used when no command is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReloader;

#[async_trait]
impl RouteReloader for NoopReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        Ok(())
    }
}

/// Runs an external command, e.g. `nginx -s reload`.
#[derive(Clone, Debug)]
pub struct CommandReloader {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandReloader {
    /// Returns `None` for an empty argv.
    pub fn new(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl RouteReloader for CommandReloader {
    async fn reload(&self) -> Result<(), ReloadError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ReloadError::Timeout(self.timeout))??;

        if output.status.success() {
            return Ok(());
        }

        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.len() > MAX_STDERR_LEN {
            let mut cut = MAX_STDERR_LEN;
            while !stderr.is_char_boundary(cut) {
                cut -= 1;
            }
            stderr.truncate(cut);
        }
        Err(ReloadError::Failed {
            status: output.status.to_string(),
            stderr,
        })
    }
}

/// Build the reloader described by `config`.
pub fn from_config(config: &RoutingConfig) -> Arc<dyn RouteReloader> {
    let timeout = Duration::from_secs(config.reload_timeout_secs.max(1));
    match config
        .reload_command
        .as_deref()
        .and_then(|argv| CommandReloader::new(argv, timeout))
    {
        Some(reloader) => {
            tracing::info!(program = %reloader.program, "Routing reload command configured");
            Arc::new(reloader)
        }
        None => Arc::new(NoopReloader),
    }
}

/// Run a reload in the background.
pub fn spawn_reload(reloader: Arc<dyn RouteReloader>, reason: &'static str) {
    tokio::spawn(async move {
        match reloader.reload().await {
            Ok(()) => {
                metrics::ROUTING_RELOADS.with_label_values(&["ok"]).inc();
                tracing::debug!(reason, "Routing reloaded");
            }
            Err(e) => {
                metrics::ROUTING_RELOADS.with_label_values(&["failed"]).inc();
                tracing::warn!(reason, error = %e, "Routing reload failed");
            }
        }
    });
}

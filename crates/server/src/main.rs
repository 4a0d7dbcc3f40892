//! plinth server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use plinth_core::config::AppConfig;
use plinth_server::bootstrap::ensure_admin_token;
use plinth_server::{AppState, create_router, routing};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable prefix for configuration overrides.
const ENV_PREFIX: &str = "PLINTH_";

/// plinth - static site upload service
#[derive(Parser, Debug)]
#[command(name = "plinthd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "PLINTH_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Layer the optional TOML file under `PLINTH_` environment variables.
fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %config_path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!("No config file found at {}", config_path.display());
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with(ENV_PREFIX) && key != "PLINTH_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: plinthd --config /path/to/config.toml \
                (see config/server.example.toml)\n  \
             2. Environment variables: PLINTH_SITES__ROOT=/srv/sites \
             PLINTH_ADMIN__TOKEN_HASH=sha256:YOUR_TOKEN_HASH_HERE plinthd\n\n\
             Set PLINTH_CONFIG to specify a default config file path."
        );
    }

    if !has_config_file {
        tracing::info!("Using environment variables for configuration");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("plinth v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(Path::new(&args.config))?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    plinth_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = plinth_storage::from_config(&config.sites)
        .await
        .context("failed to initialize site storage")?;
    storage
        .health_check()
        .await
        .context("sites root health check failed")?;
    tracing::info!(root = %storage.root().display(), "Site storage initialized");

    let metadata = plinth_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    ensure_admin_token(metadata.as_ref(), &config.admin).await?;

    let reloader = routing::from_config(&config.routing);

    let state = AppState::new(config.clone(), storage, metadata, reloader);

    let _sweeper = state.spawn_scratch_sweeper();
    tracing::info!(
        interval_secs = state.scratch_sweep_interval().as_secs(),
        "Scratch sweeper spawned"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_reads_toml_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"
max_upload_bytes = 1048576

[sites]
root = "/srv/sites"
base_domain = "example.org"

[metadata]
type = "sqlite"
path = "/var/lib/plinth/metadata.db"

[admin]
token_hash = "sha256:17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"

[routing]
reload_command = ["nginx", "-s", "reload"]
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.max_upload_bytes, 1_048_576);
        assert_eq!(config.sites.base_domain, "example.org");
        assert_eq!(config.archive.max_entries, 100);
        assert_eq!(
            config.routing.reload_command.as_deref(),
            Some(&["nginx".to_string(), "-s".to_string(), "reload".to_string()][..])
        );
        assert!(config.validate().is_ok());
    }
}

//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted upload body in bytes.
    /// Enforced before the archive is inspected.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Where and how materialized sites are stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SitesConfig {
    /// Root directory; every site directory lives directly beneath it.
    #[serde(default = "default_sites_root")]
    pub root: PathBuf,
    /// Scratch directory for in-flight upload buffers.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Domain that site identifiers are prefixed onto.
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    /// OS user that owns materialized files. Falls back to the process user.
    #[serde(default)]
    pub owner_user: Option<String>,
    /// OS group that owns materialized files (the web server's group).
    #[serde(default = "default_owner_group")]
    pub owner_group: Option<String>,
    /// Mode applied to site directories.
    #[serde(default = "default_dir_mode")]
    pub dir_mode: u32,
    /// Mode applied to site files.
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
    /// Scratch files older than this are swept (seconds).
    #[serde(default = "default_scratch_max_age_secs")]
    pub scratch_max_age_secs: u64,
    /// Interval between scratch sweeps (seconds).
    #[serde(default = "default_scratch_sweep_interval_secs")]
    pub scratch_sweep_interval_secs: u64,
}

fn default_sites_root() -> PathBuf {
    PathBuf::from("/var/lib/plinth/sites")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/var/lib/plinth/scratch")
}

fn default_base_domain() -> String {
    "tinchost.uz".to_string()
}

fn default_owner_group() -> Option<String> {
    Some("www-data".to_string())
}

fn default_dir_mode() -> u32 {
    0o770
}

fn default_file_mode() -> u32 {
    0o660
}

fn default_scratch_max_age_secs() -> u64 {
    3600
}

fn default_scratch_sweep_interval_secs() -> u64 {
    600
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            root: default_sites_root(),
            scratch_dir: default_scratch_dir(),
            base_domain: default_base_domain(),
            owner_user: None,
            owner_group: default_owner_group(),
            dir_mode: default_dir_mode(),
            file_mode: default_file_mode(),
            scratch_max_age_secs: default_scratch_max_age_secs(),
            scratch_sweep_interval_secs: default_scratch_sweep_interval_secs(),
        }
    }
}

impl SitesConfig {
    /// Validate site storage invariants.
    pub fn validate(&self) -> Result<(), String> {
        if !self.root.is_absolute() {
            return Err(format!(
                "sites.root must be an absolute path, got {}",
                self.root.display()
            ));
        }
        if self.base_domain.trim().is_empty() {
            return Err("sites.base_domain cannot be empty".to_string());
        }
        if self.file_mode & 0o111 != 0 {
            return Err(format!(
                "sites.file_mode {:o} must not grant execute permission",
                self.file_mode
            ));
        }
        if self.dir_mode & 0o700 != 0o700 {
            return Err(format!(
                "sites.dir_mode {:o} must grant the owner full access",
                self.dir_mode
            ));
        }
        if self.scratch_sweep_interval_secs == 0 {
            // tokio::time::interval panics on a zero period
            return Err("sites.scratch_sweep_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Limits applied to uploaded archives before extraction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Maximum number of entries (directories included).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Maximum path depth in segments.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum uncompressed size of a single file.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_entries() -> usize {
    100
}

fn default_max_depth() -> usize {
    10
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_depth: default_max_depth(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl ArchiveConfig {
    /// Validate archive limits.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 || self.max_depth == 0 || self.max_file_bytes == 0 {
            return Err("archive limits must all be greater than 0".to_string());
        }
        Ok(())
    }
}

/// External routing reload hook.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Command (argv) run after sites are created, renamed or deleted,
    /// e.g. `["systemctl", "reload", "nginx"]`. Unset disables reloads.
    #[serde(default)]
    pub reload_command: Option<Vec<String>>,
    /// Kill the reload command after this many seconds.
    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,
}

fn default_reload_timeout_secs() -> u64 {
    30
}

impl RoutingConfig {
    /// Validate the reload hook.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(cmd) = &self.reload_command
            && cmd.first().is_none_or(|program| program.trim().is_empty())
        {
            return Err("routing.reload_command must name a program".to_string());
        }
        Ok(())
    }
}

/// Admin token configuration.
///
/// The admin token provides initial access to create users and issue their
/// tokens. If the token hash changes between restarts, the previous admin
/// token is revoked and a new one is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Pre-computed hash of the admin token (SHA256 hex, 64 characters).
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
    /// Description for the admin token.
    pub token_description: Option<String>,
}

impl AdminConfig {
    /// Create a test configuration whose hash is that of `test-admin-token`.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            // SHA256 of "test-admin-token"
            token_hash: "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
                .to_string(),
            token_description: Some("Test admin token".to_string()),
        }
    }

    /// The configured hash without its optional `sha256:` prefix, lowercased
    /// to match the digests computed at authentication time.
    pub fn normalized_hash(&self) -> String {
        self.token_hash
            .strip_prefix("sha256:")
            .unwrap_or(&self.token_hash)
            .to_ascii_lowercase()
    }

    /// Validate the token hash shape.
    pub fn validate(&self) -> Result<(), String> {
        let hash = self.normalized_hash();
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("admin.token_hash must be a 64-character SHA256 hex digest".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// How long a writer waits on a locked database, in seconds.
        #[serde(default = "default_sqlite_busy_timeout_secs")]
        busy_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer PLINTH_METADATA__PASSWORD env var over storing in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_sqlite_busy_timeout_secs() -> Option<u64> {
    Some(5)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            busy_timeout_secs: default_sqlite_busy_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Site storage configuration.
    #[serde(default)]
    pub sites: SitesConfig,
    /// Archive validation limits.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Admin token configuration (required).
    pub admin: AdminConfig,
    /// Routing reload hook.
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite metadata, no routing reload
    /// and a dummy admin token. Callers point `sites` at a temp dir.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            sites: SitesConfig::default(),
            archive: ArchiveConfig::default(),
            metadata: MetadataConfig::default(),
            admin: AdminConfig::for_testing(),
            routing: RoutingConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than 0".to_string());
        }
        self.sites.validate()?;
        self.archive.validate()?;
        self.metadata.validate()?;
        self.admin.validate()?;
        self.routing.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::for_testing();
        assert_eq!(config.server.max_upload_bytes, 104_857_600);
        assert_eq!(config.archive.max_entries, 100);
        assert_eq!(config.archive.max_depth, 10);
        assert_eq!(config.archive.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(config.sites.base_domain, "tinchost.uz");
        assert_eq!(config.sites.dir_mode, 0o770);
        assert_eq!(config.sites.file_mode, 0o660);
        assert!(config.routing.reload_command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sites_deserialize_partial() {
        let json = r#"{"root": "/srv/sites", "base_domain": "example.org"}"#;
        let config: SitesConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/sites"));
        assert_eq!(config.base_domain, "example.org");
        assert_eq!(config.owner_group.as_deref(), Some("www-data"));
        assert_eq!(config.scratch_max_age_secs, 3600);
    }

    #[test]
    fn test_sites_validate_rejects_relative_root() {
        let config = SitesConfig {
            root: PathBuf::from("sites"),
            ..SitesConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sites_validate_rejects_executable_files() {
        let config = SitesConfig {
            file_mode: 0o755,
            ..SitesConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_routing_validate_rejects_empty_command() {
        let config = RoutingConfig {
            reload_command: Some(vec![]),
            reload_timeout_secs: 5,
        };
        assert!(config.validate().is_err());

        let config = RoutingConfig {
            reload_command: Some(vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]),
            reload_timeout_secs: 5,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_validate_hash_shape() {
        let mut admin = AdminConfig::for_testing();
        assert!(admin.validate().is_ok());
        admin.token_hash = "not-a-hash".to_string();
        assert!(admin.validate().is_err());
    }

    #[test]
    fn test_admin_hash_prefix_and_case_normalized() {
        let plain = AdminConfig::for_testing();
        let prefixed = AdminConfig {
            token_hash: format!("sha256:{}", plain.token_hash.to_uppercase()),
            token_description: None,
        };
        assert!(prefixed.validate().is_ok());
        assert_eq!(prefixed.normalized_hash(), plain.token_hash);
    }

    #[test]
    fn test_postgres_validate() {
        let json = r#"{"type":"postgres","host":"localhost"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{"type":"postgres","url":"postgres://localhost/plinth"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }
}

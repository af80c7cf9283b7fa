use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 8460;
const DEFAULT_LOG: &str = "info";
const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `[storage]` section — S3-compatible object store settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageToml {
    /// "s3" (default) or "memory" (local development, nothing persisted).
    pub driver: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for R2 / MinIO; omit for AWS proper.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Public CDN/base URL mapped to the bucket. When set, confirmed
    /// artifacts get stable public URLs instead of 7-day signed GETs.
    pub public_base_url: Option<String>,
}

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP listen port (default: 8460).
    port: Option<u16>,
    /// Bind address (default: 0.0.0.0 — this is a network-facing backend).
    bind: Option<String>,
    /// Log level filter string, e.g. "debug", "info,oasis=trace".
    log: Option<String>,
    /// Allowed CORS origins for the dashboard SPA. Empty = same-origin only.
    cors_origins: Option<Vec<String>>,
    storage: Option<StorageToml>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── StorageConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriver {
    S3,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub driver: StorageDriver,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    fn from_layers(toml: Option<StorageToml>) -> Self {
        let toml = toml.unwrap_or_default();
        let driver = match std::env::var("OASIS_STORAGE_DRIVER")
            .ok()
            .or(toml.driver)
            .as_deref()
        {
            Some("memory") => StorageDriver::Memory,
            _ => StorageDriver::S3,
        };
        Self {
            driver,
            bucket: std::env::var("OASIS_S3_BUCKET").ok().or(toml.bucket),
            region: std::env::var("OASIS_S3_REGION").ok().or(toml.region),
            endpoint: std::env::var("OASIS_S3_ENDPOINT").ok().or(toml.endpoint),
            access_key_id: std::env::var("OASIS_S3_ACCESS_KEY_ID")
                .ok()
                .or(toml.access_key_id),
            secret_access_key: std::env::var("OASIS_S3_SECRET_ACCESS_KEY")
                .ok()
                .or(toml.secret_access_key),
            public_base_url: std::env::var("OASIS_PUBLIC_BASE_URL")
                .ok()
                .or(toml.public_base_url)
                // Stored URLs are joined as `{base}/{key}`.
                .map(|u| u.trim_end_matches('/').to_string()),
        }
    }
}

// ─── OasisConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OasisConfig {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub log: String,
    pub cors_origins: Vec<String>,
    pub storage: StorageConfig,
    /// Default page size for admin list endpoints.
    pub default_page_limit: i64,
    /// Hard cap on requested page size.
    pub max_page_limit: i64,
}

impl OasisConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(port: Option<u16>, data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let bind = toml.bind.unwrap_or_else(|| "0.0.0.0".to_string());
        let log = log.or(toml.log).unwrap_or_else(|| DEFAULT_LOG.to_string());
        let cors_origins = toml.cors_origins.unwrap_or_default();
        let storage = StorageConfig::from_layers(toml.storage);

        Self {
            port,
            bind,
            data_dir,
            log,
            cors_origins,
            storage,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
        }
    }
}

fn default_data_dir() -> PathBuf {
    // Self-hosted deployments usually set OASIS_DATA_DIR; ~/.oasis is the
    // bare-metal fallback.
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".oasis");
    }
    PathBuf::from(".oasis")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = OasisConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.log, "info");
        assert_eq!(cfg.bind, "0.0.0.0");
    }

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 9000\nlog = \"debug\"\n\n[storage]\ndriver = \"memory\"\n",
        )
        .unwrap();

        let cfg = OasisConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log, "debug");
        assert_eq!(cfg.storage.driver, StorageDriver::Memory);

        let cfg = OasisConfig::new(Some(9001), Some(dir.path().to_path_buf()), None);
        assert_eq!(cfg.port, 9001);
    }

    #[test]
    fn public_base_url_loses_trailing_slash() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[storage]\npublic_base_url = \"https://cdn.example.com/\"\n",
        )
        .unwrap();
        let cfg = OasisConfig::new(None, Some(dir.path().to_path_buf()), None);
        assert_eq!(
            cfg.storage.public_base_url.as_deref(),
            Some("https://cdn.example.com")
        );
    }
}

// docbridge configuration
// Persistent settings shared by every provider adapter

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration handed to the registry and to every adapter.
///
/// Every section defaults independently so that configuration files written by
/// older releases keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub onedrive: OneDriveSettings,
    /// Where connected provider sessions are persisted
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
            operations: OperationsConfig::default(),
            local: LocalConfig::default(),
            templates: TemplatesConfig::default(),
            logging: LoggingConfig::default(),
            onedrive: OneDriveSettings::default(),
            store_path: default_store_path(),
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether to verify TLS certificates (default: true)
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            verify_cert: true,
            user_agent: default_user_agent(),
        }
    }
}

/// Retry policy for 429/5xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Server-side job polling and listing pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Delay between two status polls of a server-side job
    pub poll_interval_ms: u64,
    /// Polls before a job is declared stuck
    pub max_polls: u32,
    /// Items requested per page from paginated backends
    pub page_size: usize,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_polls: 600,
            page_size: 40,
        }
    }
}

/// Local filesystem provider roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub documents_dir: PathBuf,
    pub trash_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        let documents_dir = dirs::document_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("Docbridge");
        let trash_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docbridge")
            .join("Trash");

        Self {
            documents_dir,
            trash_dir,
        }
    }
}

/// Bundled empty-document templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory containing `new/<lang-REGION>/new.<ext>`
    pub template_dir: PathBuf,
    /// Preferred locale, `en-US` style
    pub locale: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            template_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docbridge")
                .join("templates"),
            locale: "en-US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub default_directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "docbridge=info".to_string(),
        }
    }
}

/// OAuth2 application registration used to refresh OneDrive tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneDriveSettings {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_onedrive_token_url")]
    pub token_url: String,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
}

impl Default for OneDriveSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            token_url: default_onedrive_token_url(),
            api_base: default_graph_api_base(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("docbridge/{}", env!("CARGO_PKG_VERSION"))
}

fn default_onedrive_token_url() -> String {
    "https://login.microsoftonline.com/common/oauth2/v2.0/token".to_string()
}

fn default_graph_api_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_store_path() -> PathBuf {
    config_dir().join("providers.json")
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("docbridge")
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> anyhow::Result<CoreConfig> {
    if !path.exists() {
        return Ok(CoreConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Load the configuration from the default location, falling back to defaults
/// when the file is unreadable.
pub fn load_config_or_default() -> CoreConfig {
    let path = default_config_path();
    match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default configuration: {:#}", e);
            CoreConfig::default()
        }
    }
}

/// Save configuration to disk, creating the parent directory as needed
pub fn save_config(config: &CoreConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;

    tracing::info!("Configuration saved to {:?}", path);
    Ok(())
}

/// Validate configuration values that would otherwise fail deep inside an adapter
pub fn validate_config(config: &CoreConfig) -> anyhow::Result<()> {
    if config.operations.page_size == 0 {
        bail!("operations.page_size must be greater than zero");
    }
    if config.operations.poll_interval_ms == 0 {
        bail!("operations.poll_interval_ms must be greater than zero");
    }
    if config.http.timeout_secs == 0 {
        bail!("http.timeout_secs must be greater than zero");
    }
    if config.local.documents_dir == config.local.trash_dir {
        bail!("local.trash_dir must differ from local.documents_dir");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.verify_cert);
        assert_eq!(config.operations.poll_interval_ms, 1000);
        assert_eq!(config.operations.page_size, 40);
        assert_eq!(config.templates.locale, "en-US");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_partial_config_backward_compat() {
        // Older files only knew about the HTTP section
        let json = r#"{"http":{"timeout_secs":10}}"#;
        let config: CoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.http.timeout_secs, 10);
        assert!(config.http.verify_cert);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.onedrive.api_base, "https://graph.microsoft.com/v1.0");
        assert!(config.store_path.ends_with("providers.json"));
    }

    #[test]
    fn test_validate_config() {
        let mut config = CoreConfig::default();
        config.operations.page_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = CoreConfig::default();
        config.operations.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = CoreConfig::default();
        config.local.trash_dir = config.local.documents_dir.clone();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = CoreConfig::default();
        config.operations.page_size = 25;
        config.templates.locale = "de-DE".to_string();
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.operations.page_size, 25);
        assert_eq!(loaded.templates.locale, "de-DE");
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.operations.max_polls, 600);
    }

    #[test]
    fn test_load_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}

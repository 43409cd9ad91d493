// Configuration module for tvstream-catalog
// Handles XDG-compliant directory paths and TOML configuration file

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::metadata::ProviderOrder;
use crate::services::webshare::WEBSHARE_API_BASE;

const APP_NAME: &str = "tvstream-catalog";
const CONFIG_FILENAME: &str = "config.toml";

/// Bounds for the catalog page size
pub const MIN_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Server configuration
    pub server: ServerConfig,

    /// Directory paths (overrides XDG defaults)
    pub paths: PathsConfig,

    /// Upstream search API
    pub webshare: WebshareConfig,

    /// Catalog paging and filter thresholds
    pub catalog: CatalogConfig,

    /// Metadata provider configuration
    pub metadata: MetadataConfig,

    /// Metadata lookup cache
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port (default: 8097)
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8097,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Override data directory (cache database location)
    pub data_dir: Option<PathBuf>,

    /// Override config directory
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebshareConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,

    /// Search category sent with every query (default: video)
    pub category: String,
}

impl Default for WebshareConfig {
    fn default() -> Self {
        Self {
            base_url: WEBSHARE_API_BASE.to_string(),
            user_agent: concat!("tvstream-catalog/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 15,
            category: "video".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Items per catalog page (default: 40, clamped to 20..=100)
    pub page_size: u32,

    /// Movies smaller than this are dropped when filtering by kind
    pub min_movie_size_mb: u64,

    /// Episodes smaller than this are dropped when filtering by kind
    pub min_episode_size_mb: u64,

    /// Movies whose cleaned title is shorter than this are dropped
    pub min_movie_title_len: usize,

    /// Look up metadata for every accepted item (default: true)
    pub enrich_results: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: 40,
            min_movie_size_mb: 100,
            min_episode_size_mb: 50,
            min_movie_title_len: 3,
            enrich_results: true,
        }
    }
}

impl CatalogConfig {
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Provider priority (default: tmdb_first)
    pub provider_order: ProviderOrder,

    /// TMDB API key (optional, enables TMDB metadata)
    pub tmdb_api_key: Option<String>,

    /// Metadata language (default: cs-CZ)
    pub language: String,

    /// Search region, empty to disable (default: CZ)
    pub region: String,

    pub csfd_user_agent: String,

    /// Per-request timeout for providers
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            provider_order: ProviderOrder::default(),
            tmdb_api_key: None,
            language: "cs-CZ".to_string(),
            region: "CZ".to_string(),
            csfd_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            timeout_secs: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            _ => Err(format!("unknown cache backend '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where lookups are remembered (default: memory)
    pub backend: CacheBackend,

    /// Entry lifetime in minutes (default: never expires)
    pub ttl_minutes: Option<u64>,

    /// Upper bound for the memory backend (default: unbounded)
    pub max_entries: Option<usize>,

    /// Interval for deleting expired sqlite rows (default: 60, 0 to disable)
    pub prune_interval_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl_minutes: None,
            max_entries: None,
            prune_interval_minutes: 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_minutes.map(|m| Duration::from_secs(m * 60))
    }
}

/// Application paths following XDG Base Directory Specification on Unix
/// On other platforms, falls back to the current directory or platform-specific locations
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for configuration files (config.toml)
    /// XDG: $XDG_CONFIG_HOME/tvstream-catalog or ~/.config/tvstream-catalog
    pub config_dir: PathBuf,

    /// Directory for persistent data (metadata cache database)
    /// XDG: $XDG_DATA_HOME/tvstream-catalog or ~/.local/share/tvstream-catalog
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Create application paths using XDG directories (or fallbacks)
    ///
    /// Priority order:
    /// 1. Environment variables (TVSTREAM_CONFIG_DIR, TVSTREAM_DATA_DIR)
    /// 2. Config file overrides
    /// 3. XDG/platform directories
    /// 4. Current directory fallback
    pub fn new(config_overrides: &PathsConfig) -> Self {
        Self {
            config_dir: Self::resolve_dir(
                "TVSTREAM_CONFIG_DIR",
                &config_overrides.config_dir,
                dirs::config_dir(),
            ),
            data_dir: Self::resolve_dir(
                "TVSTREAM_DATA_DIR",
                &config_overrides.data_dir,
                dirs::data_dir(),
            ),
        }
    }

    /// Create application paths using current directory (portable mode)
    pub fn current_dir() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            config_dir: cwd.clone(),
            data_dir: cwd,
        }
    }

    fn resolve_dir(
        env_var: &str,
        config_override: &Option<PathBuf>,
        platform_dir: Option<PathBuf>,
    ) -> PathBuf {
        if let Ok(path) = std::env::var(env_var) {
            return PathBuf::from(path);
        }

        if let Some(ref path) = config_override {
            return path.clone();
        }

        if let Some(dir) = platform_dir {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Get the metadata cache database path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("metadata-cache.db")
    }

    /// Get the database URL for SQLite
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database_path().display())
    }

    /// Get the config file path
    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILENAME)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }

    /// Log the configured paths
    pub fn log_paths(&self) {
        tracing::info!("Configuration directory: {}", self.config_dir.display());
        tracing::info!("Data directory: {}", self.data_dir.display());
        tracing::debug!("Config file: {}", self.config_file_path().display());
    }
}

/// Application configuration - combines TOML file with environment overrides
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Application paths
    pub paths: AppPaths,

    /// Server port
    pub port: u16,

    /// Bind address
    pub bind_address: String,

    pub webshare: WebshareConfig,

    pub catalog: CatalogConfig,

    /// Metadata providers, with env overrides applied
    pub metadata: MetadataConfig,

    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from TOML file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. TOML config file
    /// 3. Default values
    pub fn load() -> Self {
        let portable_mode = std::env::var("TVSTREAM_PORTABLE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        if portable_mode {
            tracing::info!("Running in portable mode (using current directory)");
            return Self::portable();
        }

        // First, determine config directory to find config.toml
        let config_dir = Self::find_config_dir();

        let config_file = Self::load_config_file(&config_dir);

        Self::build(config_file)
    }

    /// Create a portable configuration (current directory for everything)
    fn portable() -> Self {
        let paths = AppPaths::current_dir();
        let config_file = Self::load_config_file(&paths.config_dir);
        Self {
            paths,
            ..Self::build(config_file)
        }
    }

    /// Find the config directory (for locating config.toml)
    fn find_config_dir() -> PathBuf {
        if let Ok(path) = std::env::var("TVSTREAM_CONFIG_DIR") {
            return PathBuf::from(path);
        }

        if let Some(dir) = dirs::config_dir() {
            return dir.join(APP_NAME);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Load and parse the TOML config file
    fn load_config_file(config_dir: &std::path::Path) -> ConfigFile {
        let config_path = config_dir.join(CONFIG_FILENAME);

        if !config_path.exists() {
            tracing::debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
            return ConfigFile::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    ConfigFile::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                ConfigFile::default()
            }
        }
    }

    /// Build configuration from config file with environment overrides
    fn build(config_file: ConfigFile) -> Self {
        let paths = AppPaths::new(&config_file.paths);

        // Port: env > config > default
        let port = Self::env_port().unwrap_or(config_file.server.port);

        let bind_address =
            Self::env_bind_address().unwrap_or_else(|| config_file.server.bind_address.clone());

        let mut catalog = config_file.catalog;
        if let Some(size) = Self::env_parsed::<u32>("CATALOG_PAGE_SIZE") {
            catalog.page_size = size;
        }

        let mut metadata = config_file.metadata;
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            metadata.tmdb_api_key = Some(key);
        }
        metadata.tmdb_api_key = metadata.tmdb_api_key.filter(|k| !k.trim().is_empty());
        if let Some(order) = Self::env_parsed::<ProviderOrder>("METADATA_PROVIDER_ORDER") {
            metadata.provider_order = order;
        }
        if let Ok(language) = std::env::var("METADATA_LANGUAGE") {
            metadata.language = language;
        }
        if let Ok(region) = std::env::var("METADATA_REGION") {
            metadata.region = region;
        }

        let mut cache = config_file.cache;
        if let Some(backend) = Self::env_parsed::<CacheBackend>("CACHE_BACKEND") {
            cache.backend = backend;
        }

        Self {
            paths,
            port,
            bind_address,
            webshare: config_file.webshare,
            catalog,
            metadata,
            cache,
        }
    }

    fn env_port() -> Option<u16> {
        Self::env_parsed("TVSTREAM_PORT")
    }

    fn env_bind_address() -> Option<String> {
        std::env::var("TVSTREAM_BIND_ADDRESS").ok()
    }

    fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        let value = std::env::var(name).ok()?;
        match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!("Ignoring invalid {}='{}'", name, value);
                None
            }
        }
    }

    /// Get the database URL, with override from DATABASE_URL env var
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.paths.database_url())
    }

    /// Log configuration status
    pub fn log_config(&self) {
        self.paths.log_paths();
        tracing::info!("Server listening on {}:{}", self.bind_address, self.port);
        tracing::info!("Upstream search: {}", self.webshare.base_url);
        tracing::info!(
            "Catalog page size: {} (enrichment {})",
            self.catalog.effective_page_size(),
            if self.catalog.enrich_results { "on" } else { "off" }
        );

        let order = self.metadata.provider_order.names();
        if order.is_empty() {
            tracing::info!("Metadata providers: none");
        } else {
            tracing::info!("Metadata providers: {}", order.join(" > "));
        }
        if order.contains(&"tmdb") && self.metadata.tmdb_api_key.is_none() {
            tracing::info!("Hint: Add tmdb_api_key to config.toml or set TMDB_API_KEY env var");
        }

        match self.cache.backend {
            CacheBackend::Memory => tracing::info!("Metadata cache: memory"),
            CacheBackend::Sqlite => tracing::info!("Metadata cache: sqlite"),
        }
        if let Some(ttl) = self.cache.ttl_minutes {
            tracing::debug!("Metadata cache TTL: {} minutes", ttl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_dir_paths() {
        let paths = AppPaths::current_dir();
        assert!(paths.config_dir.is_absolute() || paths.config_dir == PathBuf::from("."));
        assert_eq!(paths.config_dir, paths.data_dir);
        assert!(paths.database_path().starts_with(&paths.data_dir));
    }

    #[test]
    fn test_database_url_format() {
        let paths = AppPaths::current_dir();
        let url = paths.database_url();
        assert!(url.starts_with("sqlite:"));
        assert!(url.ends_with("metadata-cache.db?mode=rwc"));
    }

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();
        assert_eq!(config.server.port, 8097);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.webshare.base_url, "https://webshare.cz/api");
        assert_eq!(config.webshare.category, "video");
        assert_eq!(config.catalog.effective_page_size(), 40);
        assert_eq!(config.metadata.provider_order, ProviderOrder::TmdbFirst);
        assert!(config.metadata.tmdb_api_key.is_none());
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl(), None);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[server]
port = 9000
bind_address = "127.0.0.1"

[catalog]
page_size = 60
min_movie_size_mb = 300
enrich_results = false

[metadata]
provider_order = "csfd_only"
tmdb_api_key = "test_key"
region = ""

[cache]
backend = "sqlite"
ttl_minutes = 1440

[paths]
data_dir = "/custom/data"
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.catalog.page_size, 60);
        assert_eq!(config.catalog.min_movie_size_mb, 300);
        assert_eq!(config.catalog.min_episode_size_mb, 50);
        assert!(!config.catalog.enrich_results);
        assert_eq!(config.metadata.provider_order, ProviderOrder::CsfdOnly);
        assert_eq!(config.metadata.tmdb_api_key, Some("test_key".to_string()));
        assert_eq!(config.metadata.region, "");
        assert_eq!(config.metadata.language, "cs-CZ");
        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(86400)));
        assert_eq!(config.paths.data_dir, Some(PathBuf::from("/custom/data")));
    }

    #[test]
    fn test_partial_config_toml() {
        let toml_str = r#"
[webshare]
timeout_secs = 30
"#;
        let config: ConfigFile = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8097); // default
        assert_eq!(config.webshare.timeout_secs, 30); // from file
        assert_eq!(config.webshare.category, "video");
    }

    #[test]
    fn test_unknown_provider_order_is_rejected() {
        let result: Result<ConfigFile, _> = toml::from_str(
            r#"
[metadata]
provider_order = "imdb_first"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_page_size_is_clamped() {
        let mut catalog = CatalogConfig::default();
        catalog.page_size = 5;
        assert_eq!(catalog.effective_page_size(), MIN_PAGE_SIZE);
        catalog.page_size = 500;
        assert_eq!(catalog.effective_page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_cache_backend_from_str() {
        assert_eq!("SQLite".parse::<CacheBackend>(), Ok(CacheBackend::Sqlite));
        assert!("redis".parse::<CacheBackend>().is_err());
    }
}

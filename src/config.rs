use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExplorerError;
use crate::i18n::Lang;

pub const DEFAULT_CONFIG_FILE: &str = "mtl-data.json";
pub const DEFAULT_API_BASE: &str = "https://donnees.montreal.ca/api/3/action";
pub const DEFAULT_PAGE_SIZE: usize = 1_000;
pub const CATALOG_PAGE_SIZE: usize = 100;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub language: Option<Lang>,
    #[serde(default)]
    pub default_max_rows: Option<usize>,
    #[serde(default)]
    pub export_dir: Option<String>,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub cache: CacheSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchSection {
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_base_secs: Option<u64>,
    #[serde(default)]
    pub page_pause_ms: Option<u64>,
    #[serde(default)]
    pub catalog_pause_ms: Option<u64>,
    #[serde(default)]
    pub page_timeout_secs: Option<u64>,
    #[serde(default)]
    pub metadata_timeout_secs: Option<u64>,
    #[serde(default)]
    pub catalog_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default)]
    pub metadata_ttl_secs: Option<u64>,
    #[serde(default)]
    pub catalog_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub datastore_search: String,
    pub resource_show: String,
    pub package_search: String,
}

impl Endpoints {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            datastore_search: format!("{base}/datastore_search"),
            resource_show: format!("{base}/resource_show"),
            package_search: format!("{base}/package_search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub page: Duration,
    pub metadata: Duration,
    pub catalog: Duration,
    pub download: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub endpoints: Endpoints,
    pub language: Lang,
    pub default_max_rows: Option<usize>,
    pub export_dir: Option<PathBuf>,
    pub page_size: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub page_pause: Duration,
    pub catalog_pause: Duration,
    pub timeouts: Timeouts,
    pub metadata_ttl: Duration,
    pub catalog_ttl: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `mtl-data.json` in the working directory when present.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ExplorerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ExplorerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ExplorerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ExplorerError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let fetch = config.fetch;
        let cache = config.cache;

        let page_size = fetch.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(ExplorerError::ConfigParse(
                "fetch.page_size must be positive".to_string(),
            ));
        }
        let max_attempts = fetch.max_attempts.unwrap_or(5);
        if max_attempts == 0 {
            return Err(ExplorerError::ConfigParse(
                "fetch.max_attempts must be positive".to_string(),
            ));
        }
        if config.default_max_rows == Some(0) {
            return Err(ExplorerError::ConfigParse(
                "default_max_rows must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            endpoints: Endpoints::from_base(config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)),
            language: config.language.unwrap_or_default(),
            default_max_rows: config.default_max_rows,
            export_dir: config.export_dir.map(PathBuf::from),
            page_size,
            max_attempts,
            backoff_base: Duration::from_secs(fetch.backoff_base_secs.unwrap_or(5)),
            page_pause: Duration::from_millis(fetch.page_pause_ms.unwrap_or(300)),
            catalog_pause: Duration::from_millis(fetch.catalog_pause_ms.unwrap_or(200)),
            timeouts: Timeouts {
                page: Duration::from_secs(fetch.page_timeout_secs.unwrap_or(60)),
                metadata: Duration::from_secs(fetch.metadata_timeout_secs.unwrap_or(15)),
                catalog: Duration::from_secs(fetch.catalog_timeout_secs.unwrap_or(30)),
                download: Duration::from_secs(fetch.download_timeout_secs.unwrap_or(120)),
            },
            metadata_ttl: Duration::from_secs(cache.metadata_ttl_secs.unwrap_or(30 * 60)),
            catalog_ttl: Duration::from_secs(cache.catalog_ttl_secs.unwrap_or(60 * 60)),
        })
    }
}

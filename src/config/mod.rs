mod file_config;

pub use file_config::{CatalogConfig, DownloadConfig, ExportConfig, FileConfig, SearchConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOG_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_CATALOG_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
pub const DEFAULT_SEARCH_API_BASE: &str = "https://api-v2.soundcloud.com";
pub const DEFAULT_SEARCH_WEB_BASE: &str = "https://soundcloud.com";
pub const DEFAULT_EXPORT_FOLDER_NAME: &str = "Cratedigger";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub download_root: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub source_playlist_id: Option<String>,
    pub max_concurrent_downloads: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub download_root: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    // Feature configs (with defaults)
    pub catalog: CatalogSettings,
    pub search: SearchSettings,
    pub download: DownloadSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub playlist_id: Option<String>,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub timeout: Duration,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            playlist_id: None,
            api_base_url: DEFAULT_CATALOG_API_BASE.to_string(),
            accounts_base_url: DEFAULT_CATALOG_ACCOUNTS_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub result_limit: usize,
    pub api_base_url: String,
    pub web_base_url: String,
    pub client_id: Option<String>,
    pub timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            result_limit: 5,
            api_base_url: DEFAULT_SEARCH_API_BASE.to_string(),
            web_base_url: DEFAULT_SEARCH_WEB_BASE.to_string(),
            client_id: None,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub max_concurrent: usize,
    pub ffmpeg_path: String,
    pub bitrate: String,
    /// Longest wait for a connection or for the next chunk of a stream.
    pub request_timeout: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            ffmpeg_path: "ffmpeg".to_string(),
            bitrate: "320k".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub folder_name: String,
    /// Prefix substituted for `download_root` in exported locations.
    pub media_root: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            folder_name: DEFAULT_EXPORT_FOLDER_NAME.to_string(),
            media_root: None,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let download_root = file
            .download_root
            .map(PathBuf::from)
            .or_else(|| cli.download_root.clone())
            .unwrap_or_else(|| db_dir.join("downloads"));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let catalog_file = file.catalog.unwrap_or_default();
        let catalog_defaults = CatalogSettings::default();
        let catalog = CatalogSettings {
            client_id: catalog_file.client_id,
            client_secret: catalog_file.client_secret,
            playlist_id: catalog_file
                .playlist_id
                .or_else(|| cli.source_playlist_id.clone()),
            api_base_url: catalog_file
                .api_base_url
                .unwrap_or(catalog_defaults.api_base_url),
            accounts_base_url: catalog_file
                .accounts_base_url
                .unwrap_or(catalog_defaults.accounts_base_url),
            timeout: catalog_file
                .timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(catalog_defaults.timeout),
        };

        let search_file = file.search.unwrap_or_default();
        let search_defaults = SearchSettings::default();
        let max_attempts = search_file
            .max_attempts
            .unwrap_or(search_defaults.max_attempts);
        if max_attempts == 0 {
            bail!("search.max_attempts must be at least 1");
        }
        let search = SearchSettings {
            max_attempts,
            initial_delay: search_file
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(search_defaults.initial_delay),
            result_limit: search_file
                .result_limit
                .unwrap_or(search_defaults.result_limit),
            api_base_url: search_file
                .api_base_url
                .unwrap_or(search_defaults.api_base_url),
            web_base_url: search_file
                .web_base_url
                .unwrap_or(search_defaults.web_base_url),
            client_id: search_file.client_id,
            timeout: search_file
                .timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(search_defaults.timeout),
        };

        let download_file = file.download.unwrap_or_default();
        let download_defaults = DownloadSettings::default();
        let max_concurrent = download_file
            .max_concurrent
            .or(cli.max_concurrent_downloads)
            .unwrap_or(download_defaults.max_concurrent);
        if max_concurrent == 0 {
            bail!("max_concurrent_downloads must be at least 1");
        }
        let download = DownloadSettings {
            max_concurrent,
            ffmpeg_path: download_file
                .ffmpeg_path
                .unwrap_or(download_defaults.ffmpeg_path),
            bitrate: download_file.bitrate.unwrap_or(download_defaults.bitrate),
            request_timeout: download_file
                .request_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(download_defaults.request_timeout),
        };

        let export_file = file.export.unwrap_or_default();
        let export = ExportSettings {
            folder_name: export_file
                .folder_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_EXPORT_FOLDER_NAME.to_string()),
            media_root: export_file.media_root.map(PathBuf::from),
        };

        Ok(Self {
            db_dir,
            download_root,
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            catalog,
            search,
            download,
            export,
        })
    }

    pub fn track_db_path(&self) -> PathBuf {
        self.db_dir.join("cratedigger.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

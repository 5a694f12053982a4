use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use std::{fmt::Debug, path::PathBuf};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cratedigger_server::analysis::SpectralAnalyzer;
use cratedigger_server::catalog::SpotifyCatalogClient;
use cratedigger_server::config;
use cratedigger_server::download_manager::{
    DownloadManager, FfmpegTranscoder, SoundCloudStreamFetcher,
};
use cratedigger_server::library::{ensure_dir, LibraryPaths};
use cratedigger_server::match_search::SoundCloudSearchClient;
use cratedigger_server::playlist::PlaylistReconciler;
use cratedigger_server::rekordbox::RekordboxExporter;
use cratedigger_server::server::{metrics, run_server, RequestsLoggingLevel};
use cratedigger_server::{ServerConfig, ServerState, SqliteTrackStore, TrackStore};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding cratedigger.db. Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Where downloaded tracks and playlist folders live. Defaults to <db_dir>/downloads.
    #[clap(long, value_parser = parse_path)]
    pub download_root: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Catalog playlist new tracks are discovered from.
    #[clap(long)]
    pub source_playlist_id: Option<String>,

    /// How many downloads may run at the same time.
    #[clap(long)]
    pub max_concurrent_downloads: Option<usize>,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            download_root: args.download_root.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            source_playlist_id: args.source_playlist_id.clone(),
            max_concurrent_downloads: args.max_concurrent_downloads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = config::CliConfig::from(&cli_args);
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  download_root: {:?}", app_config.download_root);
    info!("  port: {}", app_config.port);
    info!(
        "  max_concurrent_downloads: {}",
        app_config.download.max_concurrent
    );

    let track_db_path = app_config.track_db_path();
    info!("Opening SQLite track database at {:?}...", track_db_path);
    let track_store: Arc<dyn TrackStore> = Arc::new(SqliteTrackStore::new(&track_db_path)?);

    tokio::fs::create_dir_all(&app_config.download_root)
        .await
        .with_context(|| format!("Failed to create {:?}", app_config.download_root))?;
    let paths = LibraryPaths::new(app_config.download_root.clone());
    ensure_dir(&paths.partial_dir()).await;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let catalog = Arc::new(SpotifyCatalogClient::from_settings(&app_config.catalog)?);
    let searcher = Arc::new(SoundCloudSearchClient::from_settings(&app_config.search)?);
    let fetcher = Arc::new(SoundCloudStreamFetcher::from_settings(
        &app_config.search,
        &app_config.download,
    )?);
    let download_manager = Arc::new(DownloadManager::new(
        track_store.clone(),
        fetcher,
        Arc::new(FfmpegTranscoder::from_settings(&app_config.download)),
        Arc::new(SpectralAnalyzer),
        paths.clone(),
        app_config.download.max_concurrent,
    ));
    let reconciler = Arc::new(PlaylistReconciler::new(track_store.clone(), paths));

    let mut exporter = RekordboxExporter::new(track_store.clone(), &app_config.export.folder_name);
    if let Some(media_root) = &app_config.export.media_root {
        info!(
            "Export locations rewritten from {:?} to {:?}",
            app_config.download_root, media_root
        );
        exporter = exporter.with_media_root(&app_config.download_root, media_root);
    }

    let state = ServerState {
        config: ServerConfig {
            requests_logging_level: app_config.logging_level.clone(),
            port: app_config.port,
            metrics_port: app_config.metrics_port,
            frontend_dir_path: app_config.frontend_dir_path.clone(),
            source_playlist_id: app_config.catalog.playlist_id.clone(),
            search_result_limit: app_config.search.result_limit,
        },
        start_time: Instant::now(),
        hash: env!("GIT_HASH").to_string(),
        track_store,
        catalog,
        searcher,
        download_manager,
        reconciler,
        exporter: Arc::new(exporter),
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    tokio::select! {
        result = run_server(state) => {
            if let Err(e) = &result {
                error!("Server stopped: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use media_hooks::{
    clients::{
        build_http_client, AniOpenClient, BangumiClient, DoubanClient, QbittorrentClient,
        TmdbApi, TmdbClient, TorrentClient, TransmissionClient,
    },
    config::{Config, DownloaderKind},
    database::Database,
    plugins::{
        AniStrmPlugin, BangumiSyncPlugin, CloudStrmPlugin, DoubanSyncPlugin, LogCleanerPlugin,
        PluginRegistry, TrackerEditorPlugin,
    },
    scheduler::SchedulerService,
    utils::RetryConfig,
    web::WebServer,
};

#[derive(Parser)]
#[command(name = "media-hooks")]
#[command(version)]
#[command(about = "Webhook-driven media automation plugins")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging with specified level
    let log_filter = if cli.log_level == "trace" {
        format!("media_hooks={},tower_http=trace", cli.log_level)
    } else {
        format!("media_hooks={}", cli.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting media-hooks v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    let problems = config.validate();
    if !problems.is_empty() {
        warn!("{} configuration problems, affected plugins stay inert", problems.len());
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    let http = build_http_client(&config.http)?;
    let retry = RetryConfig::from_http(&config.http);
    let timezone = config.timezone();
    let (mut scheduler, scheduler_handle) = SchedulerService::new(timezone);

    let tmdb: Option<Arc<dyn TmdbApi>> = config
        .tmdb
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(|key| Arc::new(TmdbClient::new(http.clone(), &config.tmdb.base_url, key)) as Arc<dyn TmdbApi>);
    if tmdb.is_none() {
        info!("No TMDB api key, episode lookups use the media server's titles only");
    }

    let bangumi = Arc::new(BangumiClient::new(
        http.clone(),
        &config.bangumi_sync.base_url,
        config.bangumi_sync.token.as_deref().unwrap_or_default(),
    ));
    let douban = Arc::new(DoubanClient::new(
        http.clone(),
        &config.douban_sync.search_url,
        &config.douban_sync.movie_url,
        config.douban_sync.cookie.as_deref().unwrap_or_default(),
    ));
    let ani = Arc::new(AniOpenClient::new(
        http.clone(),
        &config.ani_strm.list_url,
        &config.ani_strm.resource_url,
    ));
    let tracker = &config.tracker_editor;
    let downloader: Arc<dyn TorrentClient> = match tracker.downloader {
        DownloaderKind::Qbittorrent => Arc::new(QbittorrentClient::new(
            http.clone(),
            &tracker.host,
            tracker.port,
            &tracker.username,
            &tracker.password,
        )),
        DownloaderKind::Transmission => Arc::new(TransmissionClient::new(
            http.clone(),
            &tracker.host,
            tracker.port,
            &tracker.username,
            &tracker.password,
        )),
    };

    let mut registry = PluginRegistry::new(database.clone());
    registry.register(Arc::new(BangumiSyncPlugin::new(
        &config.bangumi_sync,
        bangumi,
        tmdb.clone(),
        &config.tmdb.language,
        database.clone(),
        retry.clone(),
    )));
    registry.register(Arc::new(DoubanSyncPlugin::new(
        &config.douban_sync,
        douban,
        tmdb,
        &config.tmdb.language,
        database.clone(),
        retry.clone(),
    )));
    registry.register(Arc::new(CloudStrmPlugin::new(
        config.cloud_strm.clone(),
        database.clone(),
        retry,
        scheduler_handle,
    )));
    registry.register(Arc::new(AniStrmPlugin::new(config.ani_strm.clone(), ani, timezone)));
    registry.register(Arc::new(LogCleanerPlugin::new(config.log_cleaner.clone())));
    registry.register(Arc::new(TrackerEditorPlugin::new(
        config.tracker_editor.clone(),
        downloader,
    )));

    let jobs = registry.register_jobs(&mut scheduler);
    info!("{} scheduled jobs registered", jobs);

    tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Scheduler service failed: {}", e);
        }
    });

    let web_server = WebServer::new(Arc::new(config), Arc::new(registry))?;
    info!(
        "Starting web server on {}:{}",
        web_server.host(),
        web_server.port()
    );
    web_server.serve().await?;

    Ok(())
}

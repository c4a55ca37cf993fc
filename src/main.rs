/// Alert@Postas: Signal Hub
///
/// What it does:
///   1. Keeps the list of betting signals and their green/red outcomes
///   2. Pushes alerts, resolutions and the daily report to Telegram
///   3. Proxies API-Football fixtures for the dashboard (empty list on failure)
///   4. Optionally journals signals to SQLite so a restart replays them
///
/// Run:
///   cargo run --bin signal-hub

mod config;
mod http;
mod routes;
mod signal_db;

use anyhow::{Context, Result};
use chrono::Utc;
use config::HubConfig;
use dotenv::dotenv;
use fixture_feed::{ApiFootballFeed, FixtureFeed};
use logger::{now_iso, EventLogger, HubStartedEvent};
use routes::{HubState, RouteSettings};
use signal_db::DbConfig;
use signal_store::SignalStore;
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;
use telegram_notifier::{DisabledSink, NotificationSink, TelegramSink};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cfg = HubConfig::from_env()?;

    info!("=== Alert@Postas Signal Hub ===");
    info!("Bind: {} | policy: {:?} | threshold: {}%", cfg.bind, cfg.resolution_policy, cfg.signal_threshold);
    info!("Telegram: {}", if cfg.telegram_enabled() { "enabled" } else { "disabled" });

    // Single writer per journal file
    let mut journal_lock = match &cfg.signal_db_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let lock_path = path.with_extension("lock");
            let file = File::create(&lock_path)
                .with_context(|| format!("create lock file {}", lock_path.display()))?;
            Some(fd_lock::RwLock::new(file))
        }
        None => None,
    };
    let _journal_guard = match journal_lock.as_mut() {
        Some(lock) => match lock.try_write() {
            Ok(guard) => {
                info!("Acquired journal lock.");
                Some(guard)
            }
            Err(_) => {
                warn!("Another signal-hub already owns {:?}! Exiting.", cfg.signal_db_path);
                return Ok(());
            }
        },
        None => None,
    };

    let (store, db_tx) = match &cfg.signal_db_path {
        Some(path) => {
            let conn = signal_db::open(path)?;
            let journaled = signal_db::load_signals(&conn)?;
            drop(conn);
            let store = SignalStore::from_signals(cfg.resolution_policy, journaled);
            info!("Journal {}: restored {} signals", path.display(), store.len());
            (store, Some(signal_db::spawn_db_writer(DbConfig { path: path.clone() })))
        }
        None => {
            warn!("SIGNAL_DB_PATH not set, signals live in memory only");
            (SignalStore::new(cfg.resolution_policy), None)
        }
    };
    let restored_signals = store.len();

    let feed: Arc<dyn FixtureFeed> = Arc::new(ApiFootballFeed::new(
        cfg.api_football_url.clone(),
        cfg.api_football_key.clone(),
        cfg.api_timezone.clone(),
        cfg.upstream_timeout,
    ));
    if !feed.is_configured() {
        warn!("API_FOOTBALL_KEY not set, fixture endpoints will serve []");
    }

    let sink: Arc<dyn NotificationSink> = match (&cfg.telegram_token, &cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramSink::new(token.clone(), chat_id.clone(), cfg.upstream_timeout)),
        _ => {
            warn!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, notifications disabled");
            Arc::new(DisabledSink)
        }
    };

    let logger = Arc::new(EventLogger::new(&cfg.log_dir));
    info!("Audit log: {}", logger.log_dir().display());
    logger.log_quiet(&HubStartedEvent {
        ts:               now_iso(),
        event:            "HUB_STARTED",
        bind:             cfg.bind.to_string(),
        restored_signals,
        journal:          cfg.signal_db_path.as_ref().map(|p| p.display().to_string()),
        telegram_enabled: sink.is_enabled(),
        feed_enabled:     feed.is_configured(),
    });

    let state = HubState {
        store: Arc::new(RwLock::new(store)),
        feed,
        sink,
        logger,
        db_tx,
        settings: Arc::new(RouteSettings {
            signal_threshold:  cfg.signal_threshold,
            future_games_days: cfg.future_games_days,
            cors_allow_origin: cfg.cors_allow_origin.clone(),
            started_at:        Utc::now(),
        }),
    };

    let listener = TcpListener::bind(cfg.bind).await.context("http bind")?;
    info!("signal-hub listening on http://{}", cfg.bind);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("http accept")?;
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        debug!("http handler err {}: {:#}", peer, e);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn handle_connection(mut stream: TcpStream, state: HubState) -> Result<()> {
    let cors = state.settings.cors_allow_origin.clone();

    let req = match timeout(REQUEST_READ_TIMEOUT, http::read_request(&mut stream)).await {
        Ok(Ok(Some(req))) => req,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => {
            let resp = http::HttpResponse::error(400, format!("bad request: {e}"));
            http::write_response(&mut stream, &resp, &cors).await?;
            return Err(e);
        }
        Err(_) => anyhow::bail!("request read timed out"),
    };

    let started = Instant::now();
    let resp = routes::handle(&req, &state).await;
    debug!(
        "{} {} -> {} ({} ms)",
        req.method,
        req.path,
        resp.status,
        started.elapsed().as_millis()
    );
    http::write_response(&mut stream, &resp, &cors).await
}

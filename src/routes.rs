//! Route table and handlers. Every handler works on a shared `HubState`; the
//! store lock is always released before any Telegram or fixtures call, while
//! journal messages are queued under it so the writer sees mutations in order.

use crate::http::{HttpRequest, HttpResponse};
use crate::signal_db::{DbBotEventRow, DbMsg};
use chrono::{DateTime, NaiveDate, Utc};
use fixture_feed::{Fixture, FixtureFeed, FixtureQuery};
use logger::{
    now_iso, BotControlEvent, DailyReportEvent, EventLogger, SignalCreatedEvent, SignalResolvedEvent,
    UpstreamDegradedEvent,
};
use serde::Deserialize;
use serde_json::json;
use signal_store::{BotStatus, NewSignal, SignalFilter, SignalStatus, SignalStore, StoreError};
use std::sync::Arc;
use telegram_notifier::{messages, NotificationSink};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub signal_threshold:  u8,
    pub future_games_days: u32,
    pub cors_allow_origin: String,
    pub started_at:        DateTime<Utc>,
}

#[derive(Clone)]
pub struct HubState {
    pub store:    Arc<RwLock<SignalStore>>,
    pub feed:     Arc<dyn FixtureFeed>,
    pub sink:     Arc<dyn NotificationSink>,
    pub logger:   Arc<EventLogger>,
    pub db_tx:    Option<mpsc::Sender<DbMsg>>,
    pub settings: Arc<RouteSettings>,
}

impl HubState {
    fn journal(&self, msg: DbMsg) {
        if let Some(tx) = &self.db_tx {
            if let Err(e) = tx.try_send(msg) {
                warn!("signal journal unavailable: {}", e);
            }
        }
    }

    fn degraded(&self, upstream: &str, endpoint: &str, error: String) {
        self.logger.log_quiet(&UpstreamDegradedEvent {
            ts:       now_iso(),
            event:    "UPSTREAM_DEGRADED",
            upstream: upstream.to_string(),
            endpoint: endpoint.to_string(),
            error,
        });
    }

    /// Sends through the sink; a failure is logged and reported as `false`.
    async fn notify(&self, text: &str, endpoint: &str) -> bool {
        if !self.sink.is_enabled() {
            return false;
        }
        let delivered = self.sink.send_message(text).await;
        if !delivered {
            self.degraded("telegram", endpoint, "sendMessage not delivered".to_string());
        }
        delivered
    }

    /// Availability over correctness: any feed failure becomes an empty list.
    async fn fixtures_or_empty(&self, query: FixtureQuery, endpoint: &str) -> Vec<Fixture> {
        match self.feed.fetch_fixtures(&query).await {
            Ok(fixtures) => fixtures,
            Err(e) => {
                warn!("fixtures {} failed, serving []: {}", query.label(), e);
                self.degraded("fixtures", endpoint, e.to_string());
                Vec::new()
            }
        }
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Health,
    Signals,
    SignalById,
    SignalUpdate,
    BotControl,
    DailyReport,
    Stats,
    FutureGames,
    Games,
    TelegramSend,
}

const ROUTES: &[(&str, Route, &[&str])] = &[
    ("/health", Route::Health, &["GET"]),
    ("/api/v1/signals", Route::Signals, &["GET", "POST"]),
    ("/api/v1/signal-update", Route::SignalUpdate, &["POST"]),
    ("/api/v1/bot/control", Route::BotControl, &["GET", "POST"]),
    ("/api/v1/daily-report", Route::DailyReport, &["GET"]),
    ("/api/v1/stats", Route::Stats, &["GET"]),
    ("/api/v1/future-games", Route::FutureGames, &["GET"]),
    ("/api/v1/games", Route::Games, &["GET"]),
    ("/api/v1/telegram/send", Route::TelegramSend, &["POST"]),
];

const SIGNAL_BY_ID_PREFIX: &str = "/api/v1/signals/";
const GET_ONLY: &[&str] = &["GET"];

fn resolve_route(path: &str) -> Option<(Route, &'static [&'static str])> {
    if let Some((_, route, methods)) = ROUTES.iter().find(|(p, _, _)| *p == path) {
        return Some((*route, *methods));
    }
    match path.strip_prefix(SIGNAL_BY_ID_PREFIX) {
        Some(id) if !id.is_empty() && !id.contains('/') => Some((Route::SignalById, GET_ONLY)),
        _ => None,
    }
}

/// Handlers return the error response in `Err` so `?` can short-circuit.
type Reply = Result<HttpResponse, HttpResponse>;

pub async fn handle(req: &HttpRequest, state: &HubState) -> HttpResponse {
    if req.method == "OPTIONS" {
        return HttpResponse::no_content();
    }

    let Some((route, methods)) = resolve_route(&req.path) else {
        return HttpResponse::error(404, format!("no route for {}", req.path));
    };
    if !methods.contains(&req.method.as_str()) {
        return HttpResponse::error(405, format!("{} not allowed on {}", req.method, req.path));
    }

    let reply = match (route, req.method.as_str()) {
        (Route::Health, _) => health(state).await,
        (Route::Signals, "GET") => list_signals(req, state).await,
        (Route::Signals, _) => create_signal(req, state).await,
        (Route::SignalById, _) => signal_by_id(req, state).await,
        (Route::SignalUpdate, _) => update_signal(req, state).await,
        (Route::BotControl, "GET") => bot_status(state).await,
        (Route::BotControl, _) => bot_control(req, state).await,
        (Route::DailyReport, _) => daily_report(req, state).await,
        (Route::Stats, _) => stats(req, state).await,
        (Route::FutureGames, _) => future_games(state).await,
        (Route::Games, _) => games(req, state).await,
        (Route::TelegramSend, _) => telegram_send(req, state).await,
    };
    reply.unwrap_or_else(|err| err)
}

// ── Request helpers ──────────────────────────────────────────────────────────

fn store_error(e: StoreError) -> HttpResponse {
    let status = match e {
        StoreError::NotFound(_) => 404,
        StoreError::AlreadyResolved { .. } => 409,
        StoreError::InvalidArgument(_) => 400,
    };
    HttpResponse::error(status, e.to_string())
}

fn json_body<T: serde::de::DeserializeOwned>(req: &HttpRequest) -> Result<T, HttpResponse> {
    if req.body.is_empty() {
        return Err(HttpResponse::error(400, "missing JSON body"));
    }
    req.json()
        .map_err(|e| HttpResponse::error(400, format!("invalid JSON body: {e}")))
}

fn date_param(req: &HttpRequest) -> Result<Option<NaiveDate>, HttpResponse> {
    day_param(req, "date")
}

fn day_param(req: &HttpRequest, key: &str) -> Result<Option<NaiveDate>, HttpResponse> {
    req.query_param(key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| HttpResponse::error(400, format!("invalid {key} '{raw}', expected YYYY-MM-DD")))
        })
        .transpose()
}

fn number_param<T: std::str::FromStr>(req: &HttpRequest, key: &str) -> Result<Option<T>, HttpResponse> {
    req.query_param(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| HttpResponse::error(400, format!("invalid {key} '{raw}', expected a non-negative integer")))
        })
        .transpose()
}

fn signal_filter(req: &HttpRequest) -> Result<SignalFilter, HttpResponse> {
    let status = req
        .query_param("status")
        .map(|raw| raw.parse::<SignalStatus>())
        .transpose()
        .map_err(store_error)?;
    Ok(SignalFilter {
        status,
        module: req.query_param("module").map(str::to_string),
        date: date_param(req)?,
        from: day_param(req, "from")?,
        to: day_param(req, "to")?,
        user_id: req.query_param("userId").map(str::to_string),
    })
}

const DEFAULT_PAGE_LIMIT: usize = 100;
const MAX_PAGE_LIMIT: usize = 1000;
const DEFAULT_STATS_WINDOW_DAYS: u32 = 7;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health(state: &HubState) -> Reply {
    let store = state.store.read().await;
    let uptime = Utc::now().signed_duration_since(state.settings.started_at);
    Ok(HttpResponse::ok(&json!({
        "status": "healthy",
        "service": "Alert@Postas signal hub",
        "version": env!("CARGO_PKG_VERSION"),
        "resolutionPolicy": store.policy().as_str(),
        "timestamp": now_iso(),
        "uptimeSecs": uptime.num_seconds(),
        "botStatus": store.bot_status(),
        "signals": store.len(),
        "feedConfigured": state.feed.is_configured(),
        "telegramEnabled": state.sink.is_enabled(),
    })))
}

/// Plain array unless `limit`/`offset` is given, then a `SignalPage`.
async fn list_signals(req: &HttpRequest, state: &HubState) -> Reply {
    let filter = signal_filter(req)?;
    let limit = number_param::<usize>(req, "limit")?;
    let offset = number_param::<usize>(req, "offset")?;

    let store = state.store.read().await;
    if limit.is_none() && offset.is_none() {
        return Ok(HttpResponse::ok(&store.signals(&filter)));
    }
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT);
    Ok(HttpResponse::ok(&store.page(&filter, limit, offset.unwrap_or(0))))
}

async fn signal_by_id(req: &HttpRequest, state: &HubState) -> Reply {
    let id = req.path.trim_start_matches(SIGNAL_BY_ID_PREFIX);
    match state.store.read().await.get(id) {
        Some(signal) => Ok(HttpResponse::ok(signal)),
        None => Err(store_error(StoreError::NotFound(id.to_string()))),
    }
}

async fn create_signal(req: &HttpRequest, state: &HubState) -> Reply {
    let new: NewSignal = json_body(req)?;

    let (signal, running) = {
        let mut store = state.store.write().await;
        let signal = store.add_signal(new).map_err(store_error)?;
        state.journal(DbMsg::SignalUpsert(Box::new(signal.clone())));
        (signal, store.bot_status() == BotStatus::Running)
    };

    let eligible = running && signal.confidence >= state.settings.signal_threshold;
    let dispatched = if eligible {
        state
            .notify(&messages::format_signal_alert(&signal), "/api/v1/signals")
            .await
    } else {
        false
    };

    info!(
        id = %signal.id,
        confidence = signal.confidence,
        dispatched,
        "signal created: {} [{}]",
        signal.match_name(),
        signal.module
    );
    state.logger.log_quiet(&SignalCreatedEvent {
        ts:         now_iso(),
        event:      "SIGNAL_CREATED",
        signal_id:  signal.id.clone(),
        home:       signal.home_team.clone(),
        away:       signal.away_team.clone(),
        league:     signal.league.clone(),
        module:     signal.module.clone(),
        prediction: signal.prediction.clone(),
        confidence: signal.confidence,
        dispatched,
    });

    Ok(HttpResponse::json(
        201,
        &json!({ "success": true, "signal": signal, "dispatched": dispatched }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalUpdateBody {
    signal_id: String,
    result:    String,
    is_win:    bool,
}

async fn update_signal(req: &HttpRequest, state: &HubState) -> Reply {
    let body: SignalUpdateBody = json_body(req)?;

    let signal = {
        let mut store = state.store.write().await;
        let signal = store
            .update_signal(&body.signal_id, &body.result, body.is_win)
            .map_err(store_error)?;
        state.journal(DbMsg::SignalUpsert(Box::new(signal.clone())));
        signal
    };

    let notified = state
        .notify(&messages::format_signal_update(&signal), "/api/v1/signal-update")
        .await;

    info!(id = %signal.id, status = %signal.status, notified, "signal resolved: {}", signal.match_name());
    state.logger.log_quiet(&SignalResolvedEvent {
        ts:        now_iso(),
        event:     "SIGNAL_RESOLVED",
        signal_id: signal.id.clone(),
        module:    signal.module.clone(),
        result:    body.result,
        status:    signal.status.to_string(),
        notified,
    });

    Ok(HttpResponse::ok(&json!({ "success": true, "signal": signal, "notified": notified })))
}

async fn bot_status(state: &HubState) -> Reply {
    let bot = state.store.read().await.bot_state();
    Ok(HttpResponse::ok(&bot))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BotAction {
    Start,
    Stop,
    Analyze,
}

#[derive(Debug, Deserialize)]
struct BotControlBody {
    action: BotAction,
}

async fn bot_control(req: &HttpRequest, state: &HubState) -> Reply {
    let body: BotControlBody = json_body(req)?;

    let (action, changed, status, response) = match body.action {
        BotAction::Start | BotAction::Stop => {
            let start = matches!(body.action, BotAction::Start);
            let (changed, status) = {
                let mut store = state.store.write().await;
                let changed = if start { store.start_bot() } else { store.stop_bot() };
                (changed, store.bot_status())
            };
            let action = if start { "start" } else { "stop" };
            if changed {
                state.journal(DbMsg::BotEvent(DbBotEventRow {
                    ts:     Utc::now(),
                    action: action.to_string(),
                    status: status.to_string(),
                }));
            }
            let message = match (start, changed) {
                (true, true) => "Bot started",
                (true, false) => "Bot already running",
                (false, true) => "Bot stopped",
                (false, false) => "Bot already stopped",
            };
            let response = json!({ "success": true, "message": message, "status": status, "changed": changed });
            (action, changed, status, response)
        }
        BotAction::Analyze => {
            let analysis = state.store.read().await.analyze();
            let status = analysis.status;
            let response = json!({
                "success": true,
                "message": analysis.message.clone(),
                "status": status,
                "analysis": analysis,
            });
            ("analyze", false, status, response)
        }
    };

    info!("bot control: {} -> {} (changed={})", action, status, changed);
    state.logger.log_quiet(&BotControlEvent {
        ts:     now_iso(),
        event:  "BOT_CONTROL",
        action: action.to_string(),
        status: status.to_string(),
        changed,
    });

    Ok(HttpResponse::ok(&response))
}

async fn daily_report(req: &HttpRequest, state: &HubState) -> Reply {
    let date = date_param(req)?.unwrap_or_else(today);
    let report = state.store.read().await.daily_stats(date);

    let notified = state
        .notify(&messages::format_daily_report(&report), "/api/v1/daily-report")
        .await;

    info!(
        "daily report {}: {} signals, {}G/{}R, accuracy {}% (notified={})",
        report.date, report.stats.total, report.stats.greens, report.stats.reds, report.stats.accuracy, notified
    );
    state.logger.log_quiet(&DailyReportEvent {
        ts:       now_iso(),
        event:    "DAILY_REPORT",
        date:     report.date.to_string(),
        total:    report.stats.total,
        greens:   report.stats.greens,
        reds:     report.stats.reds,
        pending:  report.stats.pending,
        accuracy: report.stats.accuracy,
        notified,
    });

    Ok(HttpResponse::ok(&json!({ "success": true, "report": report, "notified": notified })))
}

async fn stats(req: &HttpRequest, state: &HubState) -> Reply {
    let days = number_param::<u32>(req, "days")?.unwrap_or(DEFAULT_STATS_WINDOW_DAYS);
    let store = state.store.read().await;
    let system = json!({
        "botStatus": store.bot_status(),
        "threshold": state.settings.signal_threshold,
        "totalSignals": store.len(),
    });

    let date = today();
    let window = store.window_stats(days, date);
    let body = match req.query_param("userId") {
        Some(user_id) => {
            let filter = SignalFilter {
                user_id: Some(user_id.to_string()),
                ..SignalFilter::on_date(date)
            };
            json!({
                "date": date,
                "userId": user_id,
                "signals": store.stats(&filter),
                "window": window,
                "system": system,
            })
        }
        None => json!({
            "date": date,
            "signals": store.daily_stats(date).stats,
            "window": window,
            "system": system,
        }),
    };
    Ok(HttpResponse::ok(&body))
}

async fn future_games(state: &HubState) -> Reply {
    let query = FixtureQuery::upcoming(today(), state.settings.future_games_days);
    let fixtures = state.fixtures_or_empty(query, "/api/v1/future-games").await;
    Ok(HttpResponse::ok(&fixtures))
}

async fn games(req: &HttpRequest, state: &HubState) -> Reply {
    let query = match req.query_param("status") {
        Some("live") => FixtureQuery::Live,
        Some("upcoming") => FixtureQuery::upcoming(today(), state.settings.future_games_days),
        None | Some("today") | Some("all") => FixtureQuery::OnDate(date_param(req)?.unwrap_or_else(today)),
        Some(other) => {
            return Err(HttpResponse::error(
                400,
                format!("unknown games status '{other}', expected live|today|upcoming"),
            ))
        }
    };
    let fixtures = state.fixtures_or_empty(query, "/api/v1/games").await;
    Ok(HttpResponse::ok(&fixtures))
}

#[derive(Debug, Deserialize)]
struct TelegramSendBody {
    message: String,
}

async fn telegram_send(req: &HttpRequest, state: &HubState) -> Reply {
    let body: TelegramSendBody = json_body(req)?;
    if body.message.trim().is_empty() {
        return Err(HttpResponse::error(400, "message must not be blank"));
    }
    // free text goes out in Markdown mode like every other message
    let text = messages::escape_markdown(&body.message);
    let delivered = state.notify(&text, "/api/v1/telegram/send").await;
    Ok(HttpResponse::ok(&json!({ "success": delivered })))
}

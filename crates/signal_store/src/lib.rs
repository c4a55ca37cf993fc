//! Alert@Postas: Signal Store
//!
//! Signal lifecycle (pending → green | red), bot run-state (stopped ⇄ running)
//! and daily statistics. Synchronous and I/O free: the hub wraps one instance
//! in `Arc<RwLock<_>>` and never holds the lock across network calls.

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

mod stats;

pub use stats::{accuracy_pct, average_confidence, DailyStats, ModuleBreakdown, SignalStats, WindowStats};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("signal {0} not found")]
    NotFound(String),

    #[error("signal {id} already resolved as {status}")]
    AlreadyResolved { id: String, status: SignalStatus },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// ── Status enums ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Green,
    Red,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Green => "green",
            SignalStatus::Red => "red",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, SignalStatus::Pending)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(SignalStatus::Pending),
            "green" => Ok(SignalStatus::Green),
            "red" => Ok(SignalStatus::Red),
            other => Err(StoreError::InvalidArgument(format!("unknown signal status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    #[default]
    Stopped,
    Running,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Running => "running",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `update_signal` does with a signal that is already green or red.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Reject with `AlreadyResolved`.
    #[default]
    Strict,
    /// Overwrite; the last write wins.
    LastWriteWins,
}

impl ResolutionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::Strict => "strict",
            ResolutionPolicy::LastWriteWins => "last_write_wins",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ResolutionPolicy::Strict),
            "last_write_wins" | "legacy" => Ok(ResolutionPolicy::LastWriteWins),
            other => Err(StoreError::InvalidArgument(format!("unknown resolution policy '{other}'"))),
        }
    }
}

// ── Signal ───────────────────────────────────────────────────────────────────

/// Caller-supplied part of a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSignal {
    pub home_team:  String,
    pub away_team:  String,
    pub league:     String,
    pub module:     String,     // "Winner (1X2)", "BTTS", "Over/Under 2.5" ...
    pub prediction: String,
    pub confidence: u8,         // 0–100
    #[serde(default)]
    pub user_id:    Option<String>,
    #[serde(default)]
    pub fixture_id: Option<u64>,
}

impl NewSignal {
    fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("homeTeam", &self.home_team),
            ("awayTeam", &self.away_team),
            ("league", &self.league),
            ("module", &self.module),
            ("prediction", &self.prediction),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidArgument(format!("{field} must not be blank")));
            }
        }
        if self.confidence > 100 {
            return Err(StoreError::InvalidArgument(format!(
                "confidence must be within 0..=100, got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id:           String,
    pub home_team:    String,
    pub away_team:    String,
    pub league:       String,
    pub module:       String,
    pub prediction:   String,
    pub confidence:   u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id:      Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_id:   Option<u64>,
    pub status:       SignalStatus,
    #[serde(default)]
    pub result:       Option<String>,
    #[serde(default)]
    pub is_win:       Option<bool>,
    #[serde(default)]
    pub final_update: Option<String>,
    pub created_at:   DateTime<Utc>,
    pub updated_at:   DateTime<Utc>,
}

impl Signal {
    pub fn match_name(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Pending signals carry no outcome; resolved ones carry all of it and
    /// the status agrees with `is_win`.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            SignalStatus::Pending => {
                self.is_win.is_none() && self.result.is_none() && self.final_update.is_none()
            }
            SignalStatus::Green => self.is_win == Some(true) && self.result.is_some(),
            SignalStatus::Red => self.is_win == Some(false) && self.result.is_some(),
        }
    }
}

fn final_update_text(is_win: bool, at: DateTime<Utc>) -> String {
    let label = if is_win { "✅ Green" } else { "❌ Red" };
    format!("{label} ⏰ {}", at.format("%H:%M:%S"))
}

// ── Filters, bot state, analysis ─────────────────────────────────────────────

/// AND-combined listing filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    pub status:  Option<SignalStatus>,
    pub module:  Option<String>,
    /// UTC calendar day of `created_at`.
    pub date:    Option<NaiveDate>,
    /// Inclusive UTC day range of `created_at`.
    pub from:    Option<NaiveDate>,
    pub to:      Option<NaiveDate>,
    pub user_id: Option<String>,
}

impl SignalFilter {
    pub fn on_date(date: NaiveDate) -> Self {
        Self { date: Some(date), ..Self::default() }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from: Some(from), to: Some(to), ..Self::default() }
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        let day = signal.created_at.date_naive();
        if self.status.is_some_and(|status| signal.status != status) {
            return false;
        }
        if self.module.as_deref().is_some_and(|module| signal.module != module) {
            return false;
        }
        if self.date.is_some_and(|date| day != date) {
            return false;
        }
        if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
            return false;
        }
        if let Some(user_id) = &self.user_id {
            if signal.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One page of a filtered listing; `total` counts every match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPage {
    pub signals: Vec<Signal>,
    pub total:   usize,
    pub limit:   usize,
    pub offset:  usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotState {
    pub status:     BotStatus,
    pub changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub message:         String,
    pub status:          BotStatus,
    pub pending:         usize,
    pub signals_created: usize,
}

pub const MAX_WINDOW_DAYS: u32 = 366;

// ── SignalStore ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SignalStore {
    signals:    Vec<Signal>,
    bot:        BotState,
    policy:     ResolutionPolicy,
    last_id_ms: i64,
}

impl SignalStore {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    /// Rebuilds a store from journaled signals. Inconsistent or duplicate rows
    /// are skipped; the bot always comes back `stopped`.
    pub fn from_signals(policy: ResolutionPolicy, signals: Vec<Signal>) -> Self {
        let mut store = Self::new(policy);
        for signal in signals {
            if !signal.is_consistent() {
                warn!("skipping inconsistent journaled signal {} ({})", signal.id, signal.status);
                continue;
            }
            if store.signals.iter().any(|s| s.id == signal.id) {
                warn!("skipping duplicate journaled signal {}", signal.id);
                continue;
            }
            if let Ok(ms) = signal.id.parse::<i64>() {
                store.last_id_ms = store.last_id_ms.max(ms);
            }
            store.signals.push(signal);
        }
        debug!("signal store restored with {} signals", store.signals.len());
        store
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.id == id)
    }

    /// Millisecond timestamp, bumped past the previous id when two signals
    /// land in the same millisecond (or the clock steps back).
    fn next_id(&mut self, now: DateTime<Utc>) -> String {
        let ms = now.timestamp_millis().max(self.last_id_ms + 1);
        self.last_id_ms = ms;
        ms.to_string()
    }

    pub fn add_signal(&mut self, new: NewSignal) -> Result<Signal, StoreError> {
        self.add_signal_at(new, Utc::now())
    }

    pub fn add_signal_at(&mut self, new: NewSignal, now: DateTime<Utc>) -> Result<Signal, StoreError> {
        new.validate()?;

        let signal = Signal {
            id:           self.next_id(now),
            home_team:    new.home_team,
            away_team:    new.away_team,
            league:       new.league,
            module:       new.module,
            prediction:   new.prediction,
            confidence:   new.confidence,
            user_id:      new.user_id,
            fixture_id:   new.fixture_id,
            status:       SignalStatus::Pending,
            result:       None,
            is_win:       None,
            final_update: None,
            created_at:   now,
            updated_at:   now,
        };

        debug!(id = %signal.id, module = %signal.module, "signal added: {}", signal.match_name());
        self.signals.push(signal.clone());
        Ok(signal)
    }

    pub fn update_signal(&mut self, id: &str, result: &str, is_win: bool) -> Result<Signal, StoreError> {
        self.update_signal_at(id, result, is_win, Utc::now())
    }

    pub fn update_signal_at(
        &mut self,
        id:     &str,
        result: &str,
        is_win: bool,
        now:    DateTime<Utc>,
    ) -> Result<Signal, StoreError> {
        if result.trim().is_empty() {
            return Err(StoreError::InvalidArgument("result must not be blank".to_string()));
        }

        let policy = self.policy;
        let signal = self
            .signals
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if signal.status.is_resolved() {
            match policy {
                ResolutionPolicy::Strict => {
                    return Err(StoreError::AlreadyResolved {
                        id:     signal.id.clone(),
                        status: signal.status,
                    });
                }
                ResolutionPolicy::LastWriteWins => {
                    warn!("re-resolving signal {} (was {})", signal.id, signal.status);
                }
            }
        }

        signal.status = if is_win { SignalStatus::Green } else { SignalStatus::Red };
        signal.result = Some(result.to_string());
        signal.is_win = Some(is_win);
        signal.final_update = Some(final_update_text(is_win, now));
        signal.updated_at = now;

        debug!(id = %signal.id, status = %signal.status, "signal resolved");
        Ok(signal.clone())
    }

    /// Matching signals, most recently created first.
    pub fn signals(&self, filter: &SignalFilter) -> Vec<Signal> {
        // reverse insertion order + stable sort: ties stay newest-first
        let mut out: Vec<Signal> = self
            .signals
            .iter()
            .rev()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// `limit` signals after skipping `offset`, same order as `signals`.
    pub fn page(&self, filter: &SignalFilter, limit: usize, offset: usize) -> SignalPage {
        let matching = self.signals(filter);
        let total = matching.len();
        let signals = matching.into_iter().skip(offset).take(limit).collect();
        SignalPage { signals, total, limit, offset }
    }

    /// Aggregate over the last `days` UTC days ending on `to`, clamped to
    /// `1..=MAX_WINDOW_DAYS`.
    pub fn window_stats(&self, days: u32, to: NaiveDate) -> WindowStats {
        let days = days.clamp(1, MAX_WINDOW_DAYS);
        let from = to
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .unwrap_or(NaiveDate::MIN);
        let filter = SignalFilter::between(from, to);
        let matching: Vec<&Signal> = self.signals.iter().filter(|s| filter.matches(s)).collect();
        let stats = SignalStats::from_signals(matching.iter().copied());
        WindowStats {
            days,
            from,
            to,
            resolved: stats.resolved(),
            avg_confidence: average_confidence(matching.iter().copied()),
            stats,
        }
    }

    pub fn stats(&self, filter: &SignalFilter) -> SignalStats {
        SignalStats::from_signals(self.signals.iter().filter(|s| filter.matches(s)))
    }

    pub fn daily_stats(&self, date: NaiveDate) -> DailyStats {
        DailyStats {
            date,
            stats: self.stats(&SignalFilter::on_date(date)),
        }
    }

    pub fn daily_stats_today(&self) -> DailyStats {
        self.daily_stats(Utc::now().date_naive())
    }

    pub fn bot_state(&self) -> BotState {
        self.bot
    }

    pub fn bot_status(&self) -> BotStatus {
        self.bot.status
    }

    /// Returns true when the bot actually changed state.
    pub fn start_bot(&mut self) -> bool {
        self.set_bot_status(BotStatus::Running, Utc::now())
    }

    /// Returns true when the bot actually changed state.
    pub fn stop_bot(&mut self) -> bool {
        self.set_bot_status(BotStatus::Stopped, Utc::now())
    }

    fn set_bot_status(&mut self, status: BotStatus, now: DateTime<Utc>) -> bool {
        if self.bot.status == status {
            return false;
        }
        self.bot = BotState { status, changed_at: Some(now) };
        true
    }

    /// Acknowledges an analysis pass. Creates nothing and changes nothing.
    pub fn analyze(&self) -> AnalysisResult {
        let pending = self
            .signals
            .iter()
            .filter(|s| s.status == SignalStatus::Pending)
            .count();
        AnalysisResult {
            message: "Analysis complete (no signals dispatched)".to_string(),
            status: self.bot.status,
            pending,
            signals_created: 0,
        }
    }
}

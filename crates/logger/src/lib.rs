/// Alert@Postas: Logger
/// JSONL audit stream, one file per UTC day: `<log_dir>/YYYY-MM-DD.jsonl`

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("cannot create log dir {:?}: {}", dir, e);
        }
        Self { log_dir: dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let path  = self.path_for(Utc::now().date_naive());
        let line  = serde_json::to_string(event).context("serialize event")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Audit logging must never break a request; failures only go to tracing.
    pub fn log_quiet<T: Serialize>(&self, event: &T) {
        if let Err(e) = self.log(event) {
            tracing::debug!("event log write failed: {:#}", e);
        }
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct HubStartedEvent {
    pub ts:               String,
    pub event:            &'static str,   // "HUB_STARTED"
    pub bind:             String,
    pub restored_signals: usize,
    pub journal:          Option<String>,
    pub telegram_enabled: bool,
    pub feed_enabled:     bool,
}

#[derive(Serialize, Debug)]
pub struct SignalCreatedEvent {
    pub ts:         String,
    pub event:      &'static str,   // "SIGNAL_CREATED"
    pub signal_id:  String,
    pub home:       String,
    pub away:       String,
    pub league:     String,
    pub module:     String,
    pub prediction: String,
    pub confidence: u8,
    pub dispatched: bool,           // alert sent to Telegram
}

#[derive(Serialize, Debug)]
pub struct SignalResolvedEvent {
    pub ts:        String,
    pub event:     &'static str,   // "SIGNAL_RESOLVED"
    pub signal_id: String,
    pub module:    String,
    pub result:    String,
    pub status:    String,         // "green" | "red"
    pub notified:  bool,
}

#[derive(Serialize, Debug)]
pub struct BotControlEvent {
    pub ts:      String,
    pub event:   &'static str,   // "BOT_CONTROL"
    pub action:  String,         // "start" | "stop" | "analyze"
    pub status:  String,
    pub changed: bool,
}

#[derive(Serialize, Debug)]
pub struct DailyReportEvent {
    pub ts:       String,
    pub event:    &'static str,   // "DAILY_REPORT"
    pub date:     String,
    pub total:    usize,
    pub greens:   usize,
    pub reds:     usize,
    pub pending:  usize,
    pub accuracy: f64,
    pub notified: bool,
}

#[derive(Serialize, Debug)]
pub struct UpstreamDegradedEvent {
    pub ts:       String,
    pub event:    &'static str,   // "UPSTREAM_DEGRADED"
    pub upstream: String,         // "fixtures" | "telegram"
    pub endpoint: String,
    pub error:    String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(dir.path().join("logs"));
        assert!(logger.log_dir().is_dir());

        for changed in [true, false] {
            logger
                .log(&BotControlEvent {
                    ts:      now_iso(),
                    event:   "BOT_CONTROL",
                    action:  "start".to_string(),
                    status:  "running".to_string(),
                    changed,
                })
                .unwrap();
        }

        let path = logger.path_for(Utc::now().date_naive());
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "BOT_CONTROL");
        assert_eq!(first["changed"], true);
    }

    #[test]
    fn daily_file_name() {
        let logger = EventLogger::new(std::env::temp_dir());
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert!(logger.path_for(day).ends_with("2026-10-18.jsonl"));
    }
}

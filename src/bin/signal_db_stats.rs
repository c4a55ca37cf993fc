//! Prints journal counts and the daily report for a date (default: today, UTC).
//!
//!   cargo run --bin signal-db-stats -- 2026-10-18

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use signal_store::{ResolutionPolicy, Signal, SignalStore};

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let db_path = std::env::var("SIGNAL_DB_PATH").unwrap_or_else(|_| "data/signals.db".to_string());
    let conn = Connection::open(&db_path).with_context(|| format!("open db at {db_path}"))?;

    let date = match std::env::args().nth(1) {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    println!("db_path={db_path}");
    for t in ["signals", "bot_events"] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))
            .with_context(|| format!("count {t}"))?;
        println!("{t}: {count}");
    }

    let last_bot: Option<(String, String, String)> = conn
        .query_row(
            "SELECT ts, action, status FROM bot_events ORDER BY id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .context("read last bot event")?;

    match last_bot {
        Some((ts, action, status)) => println!("last_bot_event: ts={ts} action={action} status={status}"),
        None => println!("last_bot_event: <none>"),
    }

    let mut stmt = conn
        .prepare("SELECT payload_json FROM signals ORDER BY created_at ASC")
        .context("prepare signals")?;
    let signals: Vec<Signal> = stmt
        .query_map([], |r| r.get::<_, String>(0))
        .context("query signals")?
        .filter_map(|row| row.ok())
        .filter_map(|payload| serde_json::from_str(&payload).ok())
        .collect();

    let store = SignalStore::from_signals(ResolutionPolicy::default(), signals);
    let daily = store.daily_stats(date);
    let s = &daily.stats;

    println!(
        "report {}: total={} greens={} reds={} pending={} accuracy={}%",
        daily.date, s.total, s.greens, s.reds, s.pending, s.accuracy
    );
    for (module, m) in &s.breakdown {
        println!("  {module}: total={} {}G/{}R ({}%)", m.total, m.greens, m.reds, m.accuracy());
    }

    Ok(())
}

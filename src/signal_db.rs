//! SQLite journal of signals. The in-memory store stays authoritative; every
//! created or resolved signal is upserted here by a dedicated writer thread so
//! a restart can replay the list. Bot state is deliberately not journaled.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use signal_store::Signal;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DbBotEventRow {
    pub ts:     DateTime<Utc>,
    pub action: String,
    pub status: String,
}

#[derive(Debug)]
pub enum DbMsg {
    SignalUpsert(Box<Signal>),
    BotEvent(DbBotEventRow),
}

pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            status TEXT NOT NULL,
            module TEXT NOT NULL,
            user_id TEXT,
            payload_json TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_signals_created ON signals(created_at);
        CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status);

        CREATE TABLE IF NOT EXISTS bot_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT NOT NULL,
            action TEXT NOT NULL,
            status TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_bot_events_ts ON bot_events(ts);
        "#,
    )
    .context("init schema")?;
    Ok(())
}

/// Journaled signals in creation order. Rows that no longer decode are skipped.
pub fn load_signals(conn: &Connection) -> Result<Vec<Signal>> {
    let mut stmt = conn
        .prepare("SELECT id, payload_json FROM signals ORDER BY created_at ASC, LENGTH(id) ASC, id ASC")
        .context("prepare load")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .context("query signals")?;

    let mut signals = Vec::new();
    for row in rows {
        let (id, payload) = row.context("read signal row")?;
        match serde_json::from_str::<Signal>(&payload) {
            Ok(signal) => signals.push(signal),
            Err(e) => warn!("journal row {} unreadable, skipping: {}", id, e),
        }
    }
    Ok(signals)
}

pub fn spawn_db_writer(cfg: DbConfig) -> mpsc::Sender<DbMsg> {
    let (tx, mut rx) = mpsc::channel::<DbMsg>(10_000);

    std::thread::spawn(move || {
        let result: Result<()> = (|| {
            let conn = open(&cfg.path)?;
            while let Some(msg) = rx.blocking_recv() {
                // a failed write must not stop the journal
                if let Err(e) = apply_msg(&conn, msg) {
                    warn!("[signal-db] write failed: {:#}", e);
                }
            }
            debug!("[signal-db] channel closed, writer exiting");
            Ok(())
        })();

        if let Err(e) = result {
            error!("[signal-db] fatal: {:#}", e);
        }
    });

    tx
}

/// Fixed-width UTC timestamps so text comparison in SQL follows time order.
fn journal_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Upserts never move a row backwards: an older snapshot, or a pending one
/// arriving after the resolution, leaves the stored row untouched.
pub fn apply_msg(conn: &Connection, msg: DbMsg) -> Result<()> {
    match msg {
        DbMsg::SignalUpsert(s) => {
            let payload_json = serde_json::to_string(&s).context("serialize signal")?;
            conn.execute(
                r#"
                INSERT INTO signals(id, created_at, updated_at, status, module, user_id, payload_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at=excluded.updated_at,
                    status=excluded.status,
                    payload_json=excluded.payload_json
                WHERE excluded.updated_at >= signals.updated_at
                  AND NOT (signals.status <> 'pending' AND excluded.status = 'pending')
                "#,
                params![
                    s.id,
                    journal_ts(s.created_at),
                    journal_ts(s.updated_at),
                    s.status.as_str(),
                    s.module,
                    s.user_id,
                    payload_json,
                ],
            )?;
        }
        DbMsg::BotEvent(r) => {
            conn.execute(
                "INSERT INTO bot_events(ts, action, status) VALUES (?1, ?2, ?3)",
                params![journal_ts(r.ts), r.action, r.status],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_store::{NewSignal, ResolutionPolicy, SignalStatus, SignalStore};

    fn new_signal(module: &str) -> NewSignal {
        NewSignal {
            home_team:  "Vitória SC".to_string(),
            away_team:  "Moreirense".to_string(),
            league:     "Primeira Liga".to_string(),
            module:     module.to_string(),
            prediction: "Over 2.5".to_string(),
            confidence: 87,
            user_id:    Some("u7".to_string()),
            fixture_id: Some(1_208_100),
        }
    }

    #[test]
    fn journal_round_trip_keeps_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("data/signals.db")).unwrap();

        let mut store = SignalStore::new(ResolutionPolicy::Strict);
        let a = store.add_signal(new_signal("Over/Under")).unwrap();
        let b = store.add_signal(new_signal("BTTS")).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(a.clone()))).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(b.clone()))).unwrap();

        let resolved = store.update_signal(&a.id, "3-1", true).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(resolved))).unwrap();
        apply_msg(
            &conn,
            DbMsg::BotEvent(DbBotEventRow {
                ts:     Utc::now(),
                action: "start".to_string(),
                status: "running".to_string(),
            }),
        )
        .unwrap();

        let loaded = load_signals(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, a.id);
        assert_eq!(loaded[0].status, SignalStatus::Green);
        assert_eq!(loaded[1], b);

        let restored = SignalStore::from_signals(ResolutionPolicy::Strict, loaded);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.daily_stats(a.created_at.date_naive()).stats.greens, 1);
    }

    #[test]
    fn late_snapshots_do_not_rewind_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("signals.db")).unwrap();

        let mut store = SignalStore::new(ResolutionPolicy::Strict);
        let pending = store.add_signal(new_signal("Winner")).unwrap();
        let green = store.update_signal(&pending.id, "2-0", true).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(green.clone()))).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(pending))).unwrap();

        let mut restored = SignalStore::from_signals(ResolutionPolicy::Strict, load_signals(&conn).unwrap());
        assert_eq!(restored.get(&green.id).unwrap().status, SignalStatus::Green);
        assert!(matches!(
            restored.update_signal(&green.id, "0-1", false),
            Err(signal_store::StoreError::AlreadyResolved { .. })
        ));
    }

    #[test]
    fn older_resolution_loses_to_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("signals.db")).unwrap();

        let mut store = SignalStore::new(ResolutionPolicy::LastWriteWins);
        let sig = store.add_signal(new_signal("Winner")).unwrap();
        let t0 = sig.created_at;
        let first = store.update_signal_at(&sig.id, "2-0", true, t0 + chrono::Duration::seconds(1)).unwrap();
        let second = store.update_signal_at(&sig.id, "2-3", false, t0 + chrono::Duration::seconds(2)).unwrap();

        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(second))).unwrap();
        apply_msg(&conn, DbMsg::SignalUpsert(Box::new(first))).unwrap();

        let loaded = load_signals(&conn).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, SignalStatus::Red);
        assert_eq!(loaded[0].result.as_deref(), Some("2-3"));
    }

    #[test]
    fn corrupt_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("signals.db")).unwrap();
        conn.execute(
            "INSERT INTO signals(id, created_at, updated_at, status, module, payload_json) VALUES ('1', 'x', 'x', 'pending', 'A', 'not json')",
            [],
        )
        .unwrap();
        assert!(load_signals(&conn).unwrap().is_empty());
    }

    #[tokio::test]
    async fn writer_thread_persists_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.db");
        let tx = spawn_db_writer(DbConfig { path: path.clone() });

        let mut store = SignalStore::new(ResolutionPolicy::Strict);
        let sig = store.add_signal(new_signal("Winner")).unwrap();
        tx.send(DbMsg::SignalUpsert(Box::new(sig.clone()))).await.unwrap();
        drop(tx);

        let mut loaded = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            loaded = load_signals(&open(&path).unwrap()).unwrap();
            if !loaded.is_empty() {
                break;
            }
        }
        assert_eq!(loaded, vec![sig]);
    }
}

//! Hub configuration: `.env` + environment variables with defaults.

use anyhow::{anyhow, Context, Result};
use signal_store::ResolutionPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Upper bound for the upcoming-fixtures window.
const MAX_FUTURE_GAMES_DAYS: u32 = 90;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind:              SocketAddr,
    pub api_football_key:  Option<String>,
    pub api_football_url:  String,
    pub api_timezone:      Option<String>,
    pub telegram_token:    Option<String>,
    pub telegram_chat_id:  Option<String>,
    /// Minimum confidence for a new signal to be pushed to Telegram.
    pub signal_threshold:  u8,
    pub resolution_policy: ResolutionPolicy,
    pub future_games_days: u32,
    pub upstream_timeout:  Duration,
    pub cors_allow_origin: String,
    pub signal_db_path:    Option<PathBuf>,
    pub log_dir:           PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind:              SocketAddr::from(([0, 0, 0, 0], 8787)),
            api_football_key:  None,
            api_football_url:  fixture_feed::DEFAULT_BASE_URL.to_string(),
            api_timezone:      Some("Europe/Lisbon".to_string()),
            telegram_token:    None,
            telegram_chat_id:  None,
            signal_threshold:  85,
            resolution_policy: ResolutionPolicy::Strict,
            future_games_days: 7,
            upstream_timeout:  Duration::from_secs(10),
            cors_allow_origin: "*".to_string(),
            signal_db_path:    None,
            log_dir:           PathBuf::from("logs"),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `lookup` returns the raw value of a variable; blank counts as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let bind = match get("SIGNAL_HUB_BIND") {
            Some(v) => v.parse::<SocketAddr>().with_context(|| format!("Invalid SIGNAL_HUB_BIND '{v}'"))?,
            None => defaults.bind,
        };

        let resolution_policy = match get("RESOLUTION_POLICY") {
            Some(v) => v.parse::<ResolutionPolicy>().map_err(|e| anyhow!("Invalid RESOLUTION_POLICY: {e}"))?,
            None => defaults.resolution_policy,
        };

        let signal_threshold = parse_or(get("SIGNAL_THRESHOLD"), "SIGNAL_THRESHOLD", defaults.signal_threshold);
        let signal_threshold = if signal_threshold > 100 {
            warn!("SIGNAL_THRESHOLD {} above 100, clamping", signal_threshold);
            100
        } else {
            signal_threshold
        };

        let future_games_days = parse_or(get("FUTURE_GAMES_DAYS"), "FUTURE_GAMES_DAYS", defaults.future_games_days);
        let future_games_days = if future_games_days > MAX_FUTURE_GAMES_DAYS {
            warn!("FUTURE_GAMES_DAYS {} above {}, clamping", future_games_days, MAX_FUTURE_GAMES_DAYS);
            MAX_FUTURE_GAMES_DAYS
        } else {
            future_games_days
        };

        Ok(Self {
            bind,
            api_football_key:  get("API_FOOTBALL_KEY"),
            api_football_url:  get("API_FOOTBALL_URL").unwrap_or(defaults.api_football_url),
            api_timezone:      get("API_FOOTBALL_TIMEZONE").or(defaults.api_timezone),
            telegram_token:    get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id:  get("TELEGRAM_CHAT_ID"),
            signal_threshold,
            resolution_policy,
            future_games_days,
            upstream_timeout:  Duration::from_secs(parse_or(
                get("UPSTREAM_TIMEOUT_SECS"),
                "UPSTREAM_TIMEOUT_SECS",
                defaults.upstream_timeout.as_secs(),
            )),
            cors_allow_origin: get("CORS_ALLOW_ORIGIN").unwrap_or(defaults.cors_allow_origin),
            signal_db_path:    get("SIGNAL_DB_PATH").map(PathBuf::from),
            log_dir:           get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
        })
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_token.is_some() && self.telegram_chat_id.is_some()
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(v) => v.parse().unwrap_or_else(|_| {
            warn!("Invalid {}='{}', using default {}", key, v, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<HubConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HubConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind.port(), 8787);
        assert_eq!(cfg.signal_threshold, 85);
        assert_eq!(cfg.resolution_policy, ResolutionPolicy::Strict);
        assert_eq!(cfg.future_games_days, 7);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(10));
        assert_eq!(cfg.cors_allow_origin, "*");
        assert!(cfg.signal_db_path.is_none());
        assert!(!cfg.telegram_enabled());
    }

    #[test]
    fn overrides_from_env() {
        let cfg = config(&[
            ("SIGNAL_HUB_BIND", "127.0.0.1:9000"),
            ("SIGNAL_THRESHOLD", "70"),
            ("RESOLUTION_POLICY", "last_write_wins"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-100200"),
            ("SIGNAL_DB_PATH", "data/signals.db"),
            ("API_FOOTBALL_KEY", "  "),
        ])
        .unwrap();
        assert_eq!(cfg.bind.to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.signal_threshold, 70);
        assert_eq!(cfg.resolution_policy, ResolutionPolicy::LastWriteWins);
        assert!(cfg.telegram_enabled());
        assert_eq!(cfg.signal_db_path, Some(PathBuf::from("data/signals.db")));
        assert!(cfg.api_football_key.is_none());
    }

    #[test]
    fn bad_numbers_fall_back_and_threshold_is_clamped() {
        let cfg = config(&[("FUTURE_GAMES_DAYS", "week"), ("SIGNAL_THRESHOLD", "150")]).unwrap();
        assert_eq!(cfg.future_games_days, 7);
        assert_eq!(cfg.signal_threshold, 100);

        let cfg = config(&[("FUTURE_GAMES_DAYS", "4294967295")]).unwrap();
        assert_eq!(cfg.future_games_days, MAX_FUTURE_GAMES_DAYS);
    }

    #[test]
    fn bad_bind_or_policy_is_an_error() {
        assert!(config(&[("SIGNAL_HUB_BIND", "nowhere")]).is_err());
        assert!(config(&[("RESOLUTION_POLICY", "sometimes")]).is_err());
    }
}

//! Aggregates over signal sets.

use crate::{Signal, SignalStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// greens / (greens + reds) in percent, one decimal. Pending signals do not
/// count; no resolved signals means 0.
pub fn accuracy_pct(greens: usize, reds: usize) -> f64 {
    let resolved = greens + reds;
    if resolved == 0 {
        return 0.0;
    }
    let raw = greens as f64 / resolved as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBreakdown {
    pub total:  usize,
    pub greens: usize,
    pub reds:   usize,
}

impl ModuleBreakdown {
    pub fn accuracy(&self) -> f64 {
        accuracy_pct(self.greens, self.reds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub total:     usize,
    pub greens:    usize,
    pub reds:      usize,
    pub pending:   usize,
    pub accuracy:  f64,
    pub breakdown: BTreeMap<String, ModuleBreakdown>,
}

impl SignalStats {
    pub fn from_signals<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Self {
        let mut stats = SignalStats::default();

        for signal in signals {
            stats.total += 1;
            let module = stats.breakdown.entry(signal.module.clone()).or_default();
            module.total += 1;
            match signal.status {
                SignalStatus::Green => {
                    stats.greens += 1;
                    module.greens += 1;
                }
                SignalStatus::Red => {
                    stats.reds += 1;
                    module.reds += 1;
                }
                SignalStatus::Pending => stats.pending += 1,
            }
        }

        stats.accuracy = accuracy_pct(stats.greens, stats.reds);
        stats
    }

    pub fn resolved(&self) -> usize {
        self.greens + self.reds
    }
}

/// Stats for signals created on one UTC calendar day. Serialized flat:
/// `{date, total, greens, reds, pending, accuracy, breakdown}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date:  NaiveDate,
    #[serde(flatten)]
    pub stats: SignalStats,
}

/// Mean confidence in percent, two decimals; 0 for an empty set.
pub fn average_confidence<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> f64 {
    let (sum, count) = signals
        .into_iter()
        .fold((0u64, 0u64), |(sum, n), s| (sum + u64::from(s.confidence), n + 1));
    if count == 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 * 100.0).round() / 100.0
}

/// Rolling window of `days` UTC days ending on `to` (inclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub days:           u32,
    pub from:           NaiveDate,
    pub to:             NaiveDate,
    pub resolved:       usize,
    pub avg_confidence: f64,
    #[serde(flatten)]
    pub stats:          SignalStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_rounds_to_one_decimal() {
        assert_eq!(accuracy_pct(2, 1), 66.7);
        assert_eq!(accuracy_pct(1, 2), 33.3);
        assert_eq!(accuracy_pct(1, 0), 100.0);
        assert_eq!(accuracy_pct(0, 4), 0.0);
        assert_eq!(accuracy_pct(0, 0), 0.0);
    }

    #[test]
    fn daily_stats_serialize_flat() {
        let mut stats = SignalStats::default();
        stats.total = 1;
        stats.pending = 1;
        stats.breakdown.insert("BTTS".to_string(), ModuleBreakdown { total: 1, greens: 0, reds: 0 });
        let daily = DailyStats {
            date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            stats,
        };

        let json = serde_json::to_value(&daily).unwrap();
        assert_eq!(json["date"], "2026-10-18");
        assert_eq!(json["total"], 1);
        assert_eq!(json["pending"], 1);
        assert_eq!(json["breakdown"]["BTTS"]["total"], 1);
    }

    #[test]
    fn window_stats_serialize_camel_case_and_flat() {
        let window = WindowStats {
            days:           7,
            from:           NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
            to:             NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            resolved:       0,
            avg_confidence: 81.5,
            stats:          SignalStats::default(),
        };
        let json = serde_json::to_value(&window).unwrap();
        assert_eq!(json["from"], "2026-10-12");
        assert_eq!(json["avgConfidence"], 81.5);
        assert_eq!(json["accuracy"], 0.0);
    }
}

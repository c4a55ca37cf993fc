/// Alert@Postas: Fixture Feed
///
/// API-Football v3 (`/fixtures`) client behind the `FixtureFeed` trait.
/// The hub only passes fixtures through; odds and scores are not interpreted.
/// Callers decide what a failure means (the dashboard degrades to `[]`).

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("API_FOOTBALL_KEY not configured")]
    MissingApiKey,

    #[error("fixtures request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fixtures API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("fixtures API error: {0}")]
    Api(String),

    #[error("invalid fixtures payload: {0}")]
    Decode(#[from] serde_json::Error),
}

// ── Query ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureQuery {
    /// Not-started fixtures in `[from, to]`.
    Upcoming { from: NaiveDate, to: NaiveDate },
    OnDate(NaiveDate),
    Live,
}

impl FixtureQuery {
    /// `[today, today + days]`; a window past the calendar end stops at `NaiveDate::MAX`.
    pub fn upcoming(today: NaiveDate, days: u32) -> Self {
        FixtureQuery::Upcoming {
            from: today,
            to:   today
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            FixtureQuery::Upcoming { from, to } => vec![
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
                ("status", "NS".to_string()),
            ],
            FixtureQuery::OnDate(date) => vec![("date", date.format("%Y-%m-%d").to_string())],
            FixtureQuery::Live => vec![("live", "all".to_string())],
        }
    }

    pub fn label(&self) -> String {
        match self {
            FixtureQuery::Upcoming { from, to } => format!("upcoming {from}..{to}"),
            FixtureQuery::OnDate(date) => format!("date {date}"),
            FixtureQuery::Live => "live".to_string(),
        }
    }
}

// ── Dashboard fixture ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id:         u64,
    pub home_team:  String,
    pub away_team:  String,
    pub league:     String,
    pub league_id:  u64,
    pub country:    String,
    pub date:       String,          // ISO 8601 from the API, kept as-is
    pub status:     String,          // "NS", "1H", "HT", "FT" ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed:    Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_goals: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub away_goals: Option<u32>,
}

// ── API-Football structs ─────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ApiFootballResponse {
    #[serde(default)]
    errors:   Value,
    #[serde(default)]
    response: Vec<ApiFixtureItem>,
}

#[derive(Deserialize, Debug)]
struct ApiFixtureItem {
    fixture: ApiFixture,
    league:  ApiLeague,
    teams:   ApiTeams,
    #[serde(default)]
    goals:   ApiGoals,
}

#[derive(Deserialize, Debug)]
struct ApiFixture {
    id:     u64,
    date:   String,
    #[serde(default)]
    status: Option<ApiStatus>,
}

#[derive(Deserialize, Debug)]
struct ApiStatus {
    short:   Option<String>,
    elapsed: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct ApiLeague {
    id:      u64,
    name:    String,
    country: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiTeams {
    home: ApiTeam,
    away: ApiTeam,
}

#[derive(Deserialize, Debug)]
struct ApiTeam {
    name: String,
}

#[derive(Deserialize, Debug, Default)]
struct ApiGoals {
    home: Option<u32>,
    away: Option<u32>,
}

impl From<ApiFixtureItem> for Fixture {
    fn from(item: ApiFixtureItem) -> Self {
        let (status, elapsed) = match item.fixture.status {
            Some(s) => (s.short.unwrap_or_default(), s.elapsed),
            None => (String::new(), None),
        };
        Fixture {
            id:         item.fixture.id,
            home_team:  item.teams.home.name,
            away_team:  item.teams.away.name,
            league:     item.league.name,
            league_id:  item.league.id,
            country:    item.league.country.unwrap_or_default(),
            date:       item.fixture.date,
            status,
            elapsed,
            home_goals: item.goals.home,
            away_goals: item.goals.away,
        }
    }
}

/// API-Football reports quota/auth problems with HTTP 200 and a non-empty
/// `errors` field (array or object).
fn api_error(errors: &Value) -> Option<String> {
    match errors {
        Value::Null => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn parse_response(body: &str) -> Result<Vec<Fixture>, FeedError> {
    let parsed: ApiFootballResponse = serde_json::from_str(body)?;
    if let Some(err) = api_error(&parsed.errors) {
        return Err(FeedError::Api(err));
    }
    Ok(parsed.response.into_iter().map(Fixture::from).collect())
}

// ── FixtureFeed ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait FixtureFeed: Send + Sync {
    async fn fetch_fixtures(&self, query: &FixtureQuery) -> Result<Vec<Fixture>, FeedError>;

    /// False when the feed cannot possibly succeed (no credentials).
    fn is_configured(&self) -> bool {
        true
    }
}

pub struct ApiFootballFeed {
    client:   reqwest::Client,
    base_url: String,
    api_key:  Option<String>,
    timezone: Option<String>,
}

impl ApiFootballFeed {
    pub fn new(
        base_url: impl Into<String>,
        api_key:  Option<String>,
        timezone: Option<String>,
        timeout:  Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key:  api_key.filter(|k| !k.trim().is_empty()),
            timezone: timezone.filter(|tz| !tz.trim().is_empty()),
        }
    }

    fn fixtures_url(&self) -> String {
        format!("{}/fixtures", self.base_url)
    }

    fn host(&self) -> Option<String> {
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

#[async_trait]
impl FixtureFeed for ApiFootballFeed {
    async fn fetch_fixtures(&self, query: &FixtureQuery) -> Result<Vec<Fixture>, FeedError> {
        let key = self.api_key.as_deref().ok_or(FeedError::MissingApiKey)?;

        let mut params = query.params();
        if let Some(tz) = &self.timezone {
            params.push(("timezone", tz.clone()));
        }

        let mut req = self
            .client
            .get(self.fixtures_url())
            .header("x-apisports-key", key)
            .header("x-rapidapi-key", key)
            .query(&params);
        if let Some(host) = self.host() {
            req = req.header("x-rapidapi-host", host);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                body:   body.chars().take(200).collect(),
            });
        }

        let fixtures = parse_response(&body)?;
        debug!("API-Football {}: {} fixtures", query.label(), fixtures.len());
        Ok(fixtures)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

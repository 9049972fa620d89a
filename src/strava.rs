use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::models::WorkoutType;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const STRAVA_AUTH_URL: &str = "https://www.strava.com/oauth/authorize";
const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";
const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8765/callback";
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Upper bound on activity pages per fetch
pub const MAX_PAGES: u32 = 10;
pub const DEFAULT_PER_PAGE: u32 = 50;

/// ---------------------------------------------------------------------------
/// OAuth Data Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StravaConfig {
  pub client_id: String,
  pub client_secret: String,
  pub redirect_uri: String,
  pub auth_url: String,
  pub token_url: String,
  pub api_base: String,
}

impl StravaConfig {
  pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
    Self {
      client_id: client_id.into(),
      client_secret: client_secret.into(),
      redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
      auth_url: STRAVA_AUTH_URL.to_string(),
      token_url: STRAVA_TOKEN_URL.to_string(),
      api_base: STRAVA_API_BASE.to_string(),
    }
  }

  pub fn from_env() -> Result<Self, StravaError> {
    let mut config = Self::new(
      env::var("STRAVA_CLIENT_ID")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_ID".into()))?,
      env::var("STRAVA_CLIENT_SECRET")
        .map_err(|_| StravaError::MissingConfig("STRAVA_CLIENT_SECRET".into()))?,
    );

    if let Some(app_url) = env::var("APP_URL").ok().filter(|v| !v.trim().is_empty()) {
      config.redirect_uri = format!("{}/callback", app_url.trim_end_matches('/'));
    }

    Ok(config)
  }

  /// Point every endpoint at `base` (mock servers)
  pub fn with_base_url(mut self, base: &str) -> Self {
    self.auth_url = format!("{}/oauth/authorize", base);
    self.token_url = format!("{}/oauth/token", base);
    self.api_base = format!("{}/api/v3", base);
    self
  }
}

/// Response from Strava token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: i64,
  pub athlete: Option<AthleteInfo>,
}

/// Basic athlete info returned with tokens
#[derive(Debug, Deserialize)]
pub struct AthleteInfo {
  pub id: i64,
  pub firstname: Option<String>,
  pub lastname: Option<String>,
}

impl AthleteInfo {
  pub fn display_name(&self) -> String {
    format!(
      "{} {}",
      self.firstname.as_deref().unwrap_or_default(),
      self.lastname.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string()
  }
}

/// Stored token state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StravaTokens {
  pub access_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl StravaTokens {
  pub fn from_response(resp: TokenResponse) -> Self {
    Self {
      access_token: resp.access_token,
      refresh_token: resp.refresh_token,
      expires_at: DateTime::from_timestamp(resp.expires_at, 0).unwrap_or_else(Utc::now),
    }
  }

  pub fn needs_refresh(&self) -> bool {
    self.needs_refresh_at(Utc::now())
  }

  pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
    let buffer = Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
    now + buffer >= self.expires_at
  }
}

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StravaError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("OAuth error: {0}")]
  OAuth(String),

  #[error("Strava API error ({status}): {body}")]
  Api { status: u16, body: String },

  #[error("Callback server error: {0}")]
  Server(String),

  #[error("Database error: {0}")]
  Database(String),

  #[error("Not authenticated with Strava")]
  NotAuthenticated,
}

impl From<crate::db::StoreError> for StravaError {
  fn from(e: crate::db::StoreError) -> Self {
    StravaError::Database(e.to_string())
  }
}

impl From<sqlx::Error> for StravaError {
  fn from(e: sqlx::Error) -> Self {
    StravaError::Database(e.to_string())
  }
}

impl Serialize for StravaError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// OAuth URL Generation
/// ---------------------------------------------------------------------------

pub fn build_auth_url(config: &StravaConfig) -> Result<String, StravaError> {
  let mut url = Url::parse(&config.auth_url).map_err(|e| StravaError::OAuth(e.to_string()))?;

  url
    .query_pairs_mut()
    .append_pair("client_id", &config.client_id)
    .append_pair("redirect_uri", &config.redirect_uri)
    .append_pair("response_type", "code")
    .append_pair("scope", "activity:read_all")
    .append_pair("approval_prompt", "auto");

  Ok(url.to_string())
}

/// ---------------------------------------------------------------------------
/// Token Exchange + Refresh
/// ---------------------------------------------------------------------------

async fn request_tokens(
  config: &StravaConfig,
  grant: &[(&str, &str)],
  action: &str,
) -> Result<TokenResponse, StravaError> {
  let mut form = vec![
    ("client_id", config.client_id.as_str()),
    ("client_secret", config.client_secret.as_str()),
  ];
  form.extend_from_slice(grant);

  let response = Client::new().post(&config.token_url).form(&form).send().await?;

  if !response.status().is_success() {
    let status = response.status().as_u16();
    let error_text = response.text().await.unwrap_or_default();
    return Err(StravaError::OAuth(format!(
      "{} failed ({}): {}",
      action, status, error_text
    )));
  }

  Ok(response.json().await?)
}

pub async fn exchange_code_for_tokens(
  config: &StravaConfig,
  code: &str,
) -> Result<StravaTokens, StravaError> {
  let resp = request_tokens(
    config,
    &[("code", code), ("grant_type", "authorization_code")],
    "Token exchange",
  )
  .await?;

  if let Some(athlete) = &resp.athlete {
    tracing::info!(athlete_id = athlete.id, name = %athlete.display_name(), "Strava athlete connected");
  }
  Ok(StravaTokens::from_response(resp))
}

pub async fn refresh_tokens(
  config: &StravaConfig,
  refresh_token: &str,
) -> Result<StravaTokens, StravaError> {
  let resp = request_tokens(
    config,
    &[("refresh_token", refresh_token), ("grant_type", "refresh_token")],
    "Token refresh",
  )
  .await?;
  Ok(StravaTokens::from_response(resp))
}

/// ---------------------------------------------------------------------------
/// OAuth Callback Listener
/// ---------------------------------------------------------------------------

/// Accept connections on the redirect URI's port until one carries `code` or
/// `error`, or the timeout elapses.
pub async fn wait_for_callback(
  redirect_uri: &str,
  timeout_seconds: u64,
) -> Result<String, StravaError> {
  let redirect = Url::parse(redirect_uri).map_err(|e| StravaError::Server(e.to_string()))?;
  let port = redirect
    .port_or_known_default()
    .ok_or_else(|| StravaError::Server(format!("No port in redirect URI {}", redirect_uri)))?;

  let listener = TcpListener::bind(("127.0.0.1", port))
    .await
    .map_err(|e| StravaError::Server(format!("Failed to bind port {}: {}", port, e)))?;

  tracing::info!(port, "Waiting for Strava OAuth callback");

  let accept_loop = async {
    loop {
      let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| StravaError::Server(e.to_string()))?;

      let mut buffer = [0u8; 2048];
      let n = stream.read(&mut buffer).await.unwrap_or(0);
      let request = String::from_utf8_lossy(&buffer[..n]);

      match parse_callback(&request) {
        Some(Ok(code)) => {
          let _ = stream.write_all(callback_page(200, "Connected to Strava. You can close this window.").as_bytes()).await;
          return Ok(code);
        }
        Some(Err(error)) => {
          let _ = stream.write_all(callback_page(400, &format!("Connection failed: {}", error)).as_bytes()).await;
          return Err(StravaError::OAuth(error));
        }
        // favicon and other stray requests
        None => continue,
      }
    }
  };

  tokio::time::timeout(std::time::Duration::from_secs(timeout_seconds), accept_loop)
    .await
    .map_err(|_| StravaError::Server("Callback timeout - no response received".into()))?
}

/// Code (Ok) or error (Err) from the request line, None for unrelated paths
fn parse_callback(request: &str) -> Option<Result<String, String>> {
  let target = request.lines().next()?.split_whitespace().nth(1)?;
  let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
  if url.path() != "/callback" {
    return None;
  }

  let mut code = None;
  let mut error = None;
  for (key, value) in url.query_pairs() {
    match key.as_ref() {
      "code" => code = Some(value.into_owned()),
      "error" => error = Some(value.into_owned()),
      _ => {}
    }
  }

  match (code, error) {
    (Some(code), _) => Some(Ok(code)),
    (None, Some(error)) => Some(Err(error)),
    (None, None) => None,
  }
}

fn callback_page(status: u16, message: &str) -> String {
  let reason = if status == 200 { "OK" } else { "Bad Request" };
  let body = format!(
    "<!DOCTYPE html><html><head><title>Training Log</title></head><body style=\"font-family: system-ui; text-align: center; padding: 50px;\"><p>{}</p></body></html>",
    message
  );
  format!(
    "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
    status,
    reason,
    body.len(),
    body
  )
}

/// ---------------------------------------------------------------------------
/// Strava API - Activity Fetching
/// ---------------------------------------------------------------------------

/// Activity summary from Strava API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaActivity {
  pub id: i64,
  #[serde(default)]
  pub name: String,
  /// Strava uses "type" for legacy and "sport_type" for newer activities
  #[serde(rename = "type", default)]
  pub activity_type: String,
  #[serde(default)]
  pub sport_type: Option<String>,
  /// Local wall-clock start, e.g. "2026-03-10T07:15:00Z"
  #[serde(default)]
  pub start_date_local: String,
  #[serde(default)]
  pub moving_time: i64,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub total_elevation_gain: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<f64>,
}

impl StravaActivity {
  /// Calendar date the athlete did the activity, from the local start time
  pub fn local_date(&self) -> Option<NaiveDate> {
    let prefix = self.start_date_local.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
  }

  pub fn minutes(&self) -> u32 {
    (self.moving_time.max(0) as f64 / 60.0).round() as u32
  }

  pub fn is_run(&self) -> bool {
    is_run_type(&self.activity_type)
  }

  /// `Strava: <name> · <km> km · HR avg <bpm> bpm · <m>m D+`
  pub fn notes(&self) -> String {
    let mut parts = vec![format!("Strava: {}", self.name)];
    if let Some(distance) = self.distance.filter(|d| *d > 0.0) {
      parts.push(format!("{:.2} km", distance / 1000.0));
    }
    if let Some(hr) = self.average_heartrate.filter(|hr| *hr > 0.0) {
      parts.push(format!("HR avg {} bpm", hr.round() as i64));
    }
    if let Some(gain) = self.total_elevation_gain.filter(|g| *g > 0.0) {
      parts.push(format!("{}m D+", gain.round() as i64));
    }
    parts.join(" · ")
  }
}

pub fn is_run_type(strava_type: &str) -> bool {
  matches!(
    strava_type.to_lowercase().as_str(),
    "run" | "trail run" | "trailrun" | "virtualrun"
  )
}

/// Strava activity type -> log type. Unknown cardio counts as a run.
pub fn map_strava_type(strava_type: &str) -> WorkoutType {
  let t = strava_type.to_lowercase();
  if is_run_type(&t) {
    return WorkoutType::Run;
  }
  match t.as_str() {
    "weighttraining" | "crossfit" | "workout" | "yoga" | "pilates" => WorkoutType::Gym,
    "walk" | "hike" => WorkoutType::Rest,
    _ => WorkoutType::Run,
  }
}

/// Fetch activities after `after` (epoch seconds), following pages until a
/// short page or MAX_PAGES.
pub async fn fetch_activities(
  config: &StravaConfig,
  access_token: &str,
  after: i64,
  per_page: u32,
) -> Result<Vec<StravaActivity>, StravaError> {
  let client = Client::new();
  let url = format!("{}/athlete/activities", config.api_base);
  let mut all = Vec::new();

  for page in 1..=MAX_PAGES {
    let response = client
      .get(&url)
      .query(&[
        ("after", after.to_string()),
        ("per_page", per_page.to_string()),
        ("page", page.to_string()),
      ])
      .header("Authorization", format!("Bearer {}", access_token))
      .send()
      .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(StravaError::NotAuthenticated);
    }

    if !response.status().is_success() {
      let status = response.status().as_u16();
      let body = response.text().await.unwrap_or_default();
      return Err(StravaError::Api { status, body });
    }

    let batch: Vec<StravaActivity> = response.json().await?;
    let batch_len = batch.len();
    tracing::debug!(page, count = batch_len, "Fetched Strava activity page");
    all.extend(batch);

    if batch_len < per_page as usize {
      break;
    }
  }

  Ok(all)
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

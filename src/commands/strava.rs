use crate::db::{AppState, DbPool};
use crate::models::{Workout, WorkoutSource};
use crate::strava::{
  build_auth_url, exchange_code_for_tokens, fetch_activities, map_strava_type, refresh_tokens,
  wait_for_callback, StravaActivity, StravaConfig, StravaError, StravaTokens, DEFAULT_PER_PAGE,
};
use crate::workouts::upsert_workout;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Minimum gap between two cooldown-respecting syncs
pub const SYNC_COOLDOWN_SECONDS: i64 = 3600;
pub const CALLBACK_TIMEOUT_SECONDS: u64 = 120;

/// ---------------------------------------------------------------------------
/// Start OAuth Flow
/// ---------------------------------------------------------------------------

/// Authorization URL the athlete opens in a browser
pub fn strava_auth_url(config: &StravaConfig) -> Result<String, StravaError> {
  build_auth_url(config)
}

/// ---------------------------------------------------------------------------
/// Exchange Code
/// ---------------------------------------------------------------------------

/// Exchanges `code` for tokens and stores them. Without a code, waits on the
/// redirect URI for the OAuth callback first.
pub async fn strava_connect(
  state: &AppState,
  config: &StravaConfig,
  code: Option<String>,
  timeout_seconds: u64,
) -> Result<(), StravaError> {
  let code = match code {
    Some(code) => code,
    None => wait_for_callback(&config.redirect_uri, timeout_seconds).await?,
  };

  let tokens = exchange_code_for_tokens(config, &code).await?;
  save_tokens(&state.db, &tokens).await?;

  tracing::info!(expires_at = %tokens.expires_at, "Strava OAuth completed");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Check Authentication Status
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StravaAuthStatus {
  pub is_authenticated: bool,
  pub expires_at: Option<String>,
  pub needs_refresh: bool,
  pub last_sync_at: Option<String>,
}

pub async fn strava_auth_status(state: &AppState) -> Result<StravaAuthStatus, StravaError> {
  let last_sync_at = last_sync_at(&state.db).await?.map(|t| t.to_rfc3339());

  match load_tokens(&state.db).await? {
    Some(tokens) => Ok(StravaAuthStatus {
      is_authenticated: true,
      expires_at: Some(tokens.expires_at.to_rfc3339()),
      needs_refresh: tokens.needs_refresh(),
      last_sync_at,
    }),
    None => Ok(StravaAuthStatus {
      is_authenticated: false,
      expires_at: None,
      needs_refresh: false,
      last_sync_at,
    }),
  }
}

/// ---------------------------------------------------------------------------
/// Refresh Tokens
/// ---------------------------------------------------------------------------

pub async fn strava_refresh(state: &AppState, config: &StravaConfig) -> Result<(), StravaError> {
  let existing = load_tokens(&state.db)
    .await?
    .ok_or(StravaError::NotAuthenticated)?;

  let new_tokens = refresh_tokens(config, &existing.refresh_token).await?;
  save_tokens(&state.db, &new_tokens).await?;

  tracing::info!("Strava tokens refreshed");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Disconnect Strava
/// ---------------------------------------------------------------------------

pub async fn strava_disconnect(state: &AppState) -> Result<(), StravaError> {
  sqlx::query(
    "UPDATE sync_state SET access_token = NULL, refresh_token = NULL,
         token_expires_at = NULL WHERE source = 'strava'",
  )
  .execute(&state.db)
  .await?;

  tracing::info!("Strava disconnected");
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Get Valid Access Token (with auto-refresh)
/// ---------------------------------------------------------------------------

pub async fn get_valid_access_token(
  db: &DbPool,
  config: &StravaConfig,
) -> Result<String, StravaError> {
  let mut tokens = load_tokens(db).await?.ok_or(StravaError::NotAuthenticated)?;

  if tokens.needs_refresh() {
    tokens = refresh_tokens(config, &tokens.refresh_token).await?;
    save_tokens(db, &tokens).await?;
    tracing::info!("Strava tokens auto-refreshed");
  }

  Ok(tokens.access_token)
}

/// ---------------------------------------------------------------------------
/// Database Helpers
/// ---------------------------------------------------------------------------

pub async fn save_tokens(db: &DbPool, tokens: &StravaTokens) -> Result<(), StravaError> {
  sqlx::query(
    r#"
        INSERT INTO sync_state (source, access_token, refresh_token, token_expires_at)
        VALUES ('strava', ?1, ?2, ?3)
        ON CONFLICT(source) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            token_expires_at = excluded.token_expires_at
        "#,
  )
  .bind(&tokens.access_token)
  .bind(&tokens.refresh_token)
  .bind(tokens.expires_at)
  .execute(db)
  .await?;

  Ok(())
}

pub async fn load_tokens(db: &DbPool) -> Result<Option<StravaTokens>, StravaError> {
  let row: Option<(Option<String>, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
    "SELECT access_token, refresh_token, token_expires_at
             FROM sync_state WHERE source = 'strava'",
  )
  .fetch_optional(db)
  .await?;

  match row {
    Some((Some(access), Some(refresh), Some(expires))) => Ok(Some(StravaTokens {
      access_token: access,
      refresh_token: refresh,
      expires_at: expires,
    })),
    _ => Ok(None),
  }
}

async fn last_sync_at(db: &DbPool) -> Result<Option<DateTime<Utc>>, StravaError> {
  let value: Option<Option<DateTime<Utc>>> =
    sqlx::query_scalar("SELECT last_sync_at FROM sync_state WHERE source = 'strava'")
      .fetch_optional(db)
      .await?;
  Ok(value.flatten())
}

async fn update_sync_time(
  db: &DbPool,
  synced_at: DateTime<Utc>,
  last_activity_at: Option<DateTime<Utc>>,
) -> Result<(), StravaError> {
  sqlx::query(
    r#"
    INSERT INTO sync_state (source, last_sync_at, last_activity_at)
    VALUES ('strava', ?1, ?2)
    ON CONFLICT(source) DO UPDATE SET
      last_sync_at = excluded.last_sync_at,
      last_activity_at = COALESCE(excluded.last_activity_at, sync_state.last_activity_at)
    "#,
  )
  .bind(synced_at)
  .bind(last_activity_at)
  .execute(db)
  .await?;

  Ok(())
}

/// ---------------------------------------------------------------------------
/// Sync Activities from Strava
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
  pub days_back: u32,
  pub runs_only: bool,
  pub respect_cooldown: bool,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      days_back: 7,
      runs_only: true,
      respect_cooldown: false,
    }
  }
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
  /// Activities returned by Strava
  pub total: usize,
  /// After the runs-only filter
  pub considered: usize,
  pub synced: usize,
  pub skipped: usize,
  pub cooldown_active: bool,
}

/// Import recent Strava activities as `source=strava` workouts, one per date.
/// Entries already logged for the same date are overwritten.
pub async fn strava_sync(
  state: &AppState,
  config: &StravaConfig,
  options: SyncOptions,
  now: DateTime<Utc>,
) -> Result<SyncResult, StravaError> {
  if options.respect_cooldown {
    if let Some(last) = last_sync_at(&state.db).await? {
      if now - last < Duration::seconds(SYNC_COOLDOWN_SECONDS) {
        tracing::info!(last_sync_at = %last, "Strava sync skipped: cooldown active");
        return Ok(SyncResult {
          cooldown_active: true,
          ..SyncResult::default()
        });
      }
    }
  }

  let access_token = get_valid_access_token(&state.db, config).await?;
  let after = (now - Duration::days(options.days_back as i64)).timestamp();
  let activities = fetch_activities(config, &access_token, after, DEFAULT_PER_PAGE).await?;

  let considered: Vec<&StravaActivity> = activities
    .iter()
    .filter(|a| !options.runs_only || a.is_run())
    .collect();

  let mut result = SyncResult {
    total: activities.len(),
    considered: considered.len(),
    ..SyncResult::default()
  };
  let mut latest: Option<DateTime<Utc>> = None;

  for activity in considered {
    match save_activity(&state.db, activity).await {
      Ok(()) => {
        result.synced += 1;
        if let Ok(started) = DateTime::parse_from_rfc3339(&activity.start_date_local) {
          let started = started.with_timezone(&Utc);
          latest = latest.max(Some(started));
        }
      }
      Err(e) => {
        tracing::warn!(activity_id = activity.id, error = %e, "Skipping Strava activity");
        result.skipped += 1;
      }
    }
  }

  update_sync_time(&state.db, now, latest).await?;

  tracing::info!(
    total = result.total,
    synced = result.synced,
    skipped = result.skipped,
    "Strava sync complete"
  );

  Ok(result)
}

/// Write one activity as the workout for its local date
async fn save_activity(db: &DbPool, activity: &StravaActivity) -> Result<(), StravaError> {
  let date = activity.local_date().ok_or_else(|| StravaError::Api {
    status: 0,
    body: format!("Unparseable start date {:?}", activity.start_date_local),
  })?;

  let workout = Workout {
    date,
    workout_type: map_strava_type(&activity.activity_type),
    minutes: Some(activity.minutes()),
    rpe: None,
    notes: Some(activity.notes()),
    source: WorkoutSource::Strava,
  };

  upsert_workout(db, &workout).await?;
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::WorkoutType;
  use crate::test_utils::*;
  use crate::workouts::{read_workouts, workout_on};
  use serde_json::json;

  fn valid_tokens() -> StravaTokens {
    StravaTokens {
      access_token: "token".into(),
      refresh_token: "refresh".into(),
      expires_at: Utc::now() + Duration::hours(6),
    }
  }

  async fn mock_activities(server: &mut mockito::ServerGuard, body: serde_json::Value) -> mockito::Mock {
    server
      .mock("GET", "/api/v3/athlete/activities")
      .match_query(mockito::Matcher::Any)
      .match_header("authorization", "Bearer token")
      .with_status(200)
      .with_body(body.to_string())
      .create_async()
      .await
  }

  #[tokio::test]
  async fn test_strava_auth_status() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    let status = strava_auth_status(&state).await.unwrap();
    assert!(!status.is_authenticated);
    assert!(status.last_sync_at.is_none());

    save_tokens(&pool, &valid_tokens()).await.unwrap();
    let status = strava_auth_status(&state).await.unwrap();
    assert!(status.is_authenticated);
    assert!(!status.needs_refresh);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_strava_disconnect_clears_tokens() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    strava_disconnect(&state).await.unwrap();

    save_tokens(&pool, &valid_tokens()).await.unwrap();
    strava_disconnect(&state).await.unwrap();
    assert!(load_tokens(&pool).await.unwrap().is_none());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_strava_sync_no_auth() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    let config = StravaConfig::new("id", "secret").with_base_url("http://127.0.0.1:9");

    let result = strava_sync(&state, &config, SyncOptions::default(), Utc::now()).await;
    assert!(matches!(result, Err(StravaError::NotAuthenticated)));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_sync_imports_runs_and_overwrites_manual_entry() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    save_tokens(&pool, &valid_tokens()).await.unwrap();
    upsert_workout(&pool, &workout(date(2026, 3, 10), WorkoutType::Gym, Some(20), Some(4.0)))
      .await
      .unwrap();

    let mut server = mockito::Server::new_async().await;
    let config = StravaConfig::new("id", "secret").with_base_url(&server.url());
    let activity = serde_json::to_value(mock_strava_activity()).unwrap();
    let m = mock_activities(
      &mut server,
      json!([
        activity,
        {"id": 2, "name": "Legs", "type": "WeightTraining", "start_date_local": "2026-03-09T18:00:00Z", "moving_time": 2400},
        {"id": 3, "name": "Broken", "type": "Run", "start_date_local": "", "moving_time": 600}
      ]),
    )
    .await;

    let result = strava_sync(&state, &config, SyncOptions::default(), Utc::now())
      .await
      .unwrap();
    assert_eq!(
      result,
      SyncResult {
        total: 3,
        considered: 2,
        synced: 1,
        skipped: 1,
        cooldown_active: false,
      }
    );
    m.assert_async().await;

    let imported = workout_on(&pool, date(2026, 3, 10)).await.unwrap().unwrap();
    assert_eq!(imported.source, WorkoutSource::Strava);
    assert_eq!(imported.workout_type, WorkoutType::Run);
    assert_eq!(imported.minutes, Some(52));
    assert_eq!(imported.rpe, None);
    assert!(imported.notes.unwrap().starts_with("Strava: Morning Run"));
    assert_eq!(read_workouts(&pool).await.unwrap().len(), 1);

    let status = strava_auth_status(&state).await.unwrap();
    assert!(status.last_sync_at.is_some());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_sync_all_types_when_not_runs_only() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    save_tokens(&pool, &valid_tokens()).await.unwrap();

    let mut server = mockito::Server::new_async().await;
    let config = StravaConfig::new("id", "secret").with_base_url(&server.url());
    let _m = mock_activities(
      &mut server,
      json!([
        {"id": 2, "name": "Legs", "type": "WeightTraining", "start_date_local": "2026-03-09T18:00:00Z", "moving_time": 2400}
      ]),
    )
    .await;

    let options = SyncOptions {
      runs_only: false,
      ..SyncOptions::default()
    };
    let result = strava_sync(&state, &config, options, Utc::now()).await.unwrap();
    assert_eq!(result.synced, 1);

    let imported = workout_on(&pool, date(2026, 3, 9)).await.unwrap().unwrap();
    assert_eq!(imported.workout_type, WorkoutType::Gym);
    assert_eq!(imported.minutes, Some(40));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_sync_cooldown() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    save_tokens(&pool, &valid_tokens()).await.unwrap();

    let now = Utc::now();
    update_sync_time(&pool, now - Duration::minutes(10), None).await.unwrap();

    // No mock server: a fetch would fail, so success proves nothing was fetched
    let config = StravaConfig::new("id", "secret").with_base_url("http://127.0.0.1:9");
    let options = SyncOptions {
      respect_cooldown: true,
      ..SyncOptions::default()
    };
    let result = strava_sync(&state, &config, options, now).await.unwrap();
    assert!(result.cooldown_active);
    assert_eq!(result.total, 0);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_expired_token_is_refreshed_before_use() {
    let pool = setup_test_db().await;
    save_tokens(
      &pool,
      &StravaTokens {
        access_token: "old".into(),
        refresh_token: "r1".into(),
        expires_at: Utc::now() - Duration::minutes(1),
      },
    )
    .await
    .unwrap();

    let mut server = mockito::Server::new_async().await;
    let config = StravaConfig::new("id", "secret").with_base_url(&server.url());
    let m = server
      .mock("POST", "/oauth/token")
      .with_status(200)
      .with_body(r#"{"access_token":"fresh","refresh_token":"r2","expires_at":1893456000}"#)
      .create_async()
      .await;

    let token = get_valid_access_token(&pool, &config).await.unwrap();
    assert_eq!(token, "fresh");
    m.assert_async().await;

    let stored = load_tokens(&pool).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token, "r2");

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_connect_with_code() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    let mut server = mockito::Server::new_async().await;
    let config = StravaConfig::new("id", "secret").with_base_url(&server.url());
    let _m = server
      .mock("POST", "/oauth/token")
      .match_body(mockito::Matcher::UrlEncoded("code".into(), "abc".into()))
      .with_status(200)
      .with_body(r#"{"access_token":"a","refresh_token":"r","expires_at":1893456000,"athlete":{"id":7,"firstname":"Ada","lastname":null}}"#)
      .create_async()
      .await;

    strava_connect(&state, &config, Some("abc".into()), 1).await.unwrap();
    assert!(strava_auth_status(&state).await.unwrap().is_authenticated);

    teardown_test_db(pool).await;
  }
}

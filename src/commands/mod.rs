pub mod coach;
pub mod export;
pub mod log;
pub mod overrides;
pub mod plan;
pub mod stats;
pub mod strava;

use crate::coach::CoachError;
use crate::db::{AppState, StoreError};
use crate::export::ExportError;
use crate::llm::LlmError;
use crate::models::{SyncState, Workout};
use crate::workouts::read_workouts;
use serde::Serialize;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Llm(#[from] LlmError),

  #[error(transparent)]
  Coach(#[from] CoachError),

  #[error(transparent)]
  Export(#[from] ExportError),
}

impl From<sqlx::Error> for CommandError {
  fn from(e: sqlx::Error) -> Self {
    CommandError::Store(StoreError::from(e))
  }
}

impl From<serde_json::Error> for CommandError {
  fn from(e: serde_json::Error) -> Self {
    CommandError::Store(StoreError::from(e))
  }
}

impl Serialize for CommandError {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: serde::Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Log + Sync State
/// ---------------------------------------------------------------------------

/// Newest first, at most `limit` entries
pub async fn get_workouts(state: &AppState, limit: usize) -> Result<Vec<Workout>, CommandError> {
  let mut workouts = read_workouts(&state.db).await?;
  workouts.truncate(limit);
  Ok(workouts)
}

pub async fn get_sync_state(state: &AppState) -> Result<Vec<SyncState>, CommandError> {
  let rows = sqlx::query_as::<_, SyncState>("SELECT * FROM sync_state ORDER BY source")
    .fetch_all(&state.db)
    .await?;
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::*;

  #[tokio::test]
  async fn test_get_workouts_limits_newest_first() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    seed_test_workouts(&pool, date(2026, 3, 10), 5).await;

    let workouts = get_workouts(&state, 2).await.unwrap();
    assert_eq!(workouts.len(), 2);
    assert_eq!(workouts[0].date, date(2026, 3, 10));
    assert_eq!(workouts[1].date, date(2026, 3, 9));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_get_sync_state_hides_tokens() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };
    assert!(get_sync_state(&state).await.unwrap().is_empty());

    sqlx::query("INSERT INTO sync_state (source, access_token) VALUES ('strava', 'secret')")
      .execute(&pool)
      .await
      .unwrap();

    let rows = get_sync_state(&state).await.unwrap();
    assert_eq!(rows.len(), 1);
    let json = serde_json::to_string(&rows[0]).unwrap();
    assert!(!json.contains("secret"));

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_command_error_serializes_as_message() {
    let err = CommandError::InvalidInput("RPE must be between 1 and 10".into());
    assert_eq!(
      serde_json::to_value(&err).unwrap(),
      serde_json::json!("Invalid input: RPE must be between 1 and 10")
    );
  }
}

use crate::db::AppState;
use crate::models::{OverrideAuthor, PlanOverride, WorkoutType};
use crate::overrides::{load_overrides, override_history, save_overrides, upsert_overrides, OverrideHistoryEntry};
use crate::plan::OverrideMap;
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use super::CommandError;

/// Fields of a manual override; `created_at` is stamped on write
#[derive(Debug, Clone)]
pub struct OverrideInput {
  pub plan_type: WorkoutType,
  pub title: String,
  pub target_minutes: Option<i32>,
  pub rpe: Option<String>,
  pub details: Vec<String>,
  pub coach_note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DatedOverride {
  pub date: NaiveDate,
  #[serde(flatten)]
  pub entry: PlanOverride,
}

pub async fn set_override(
  state: &AppState,
  date: NaiveDate,
  input: OverrideInput,
) -> Result<DatedOverride, CommandError> {
  let title = input.title.trim();
  if title.is_empty() {
    return Err(CommandError::InvalidInput("title must not be empty".into()));
  }

  let entry = PlanOverride {
    plan_type: input.plan_type,
    title: title.to_string(),
    target_minutes: input.target_minutes,
    rpe: input.rpe,
    details: input.details,
    coach_note: input.coach_note,
    created_at: Utc::now(),
  };

  let mut entries = OverrideMap::new();
  entries.insert(date, entry.clone());
  upsert_overrides(&state.db, &entries, OverrideAuthor::Manual).await?;

  Ok(DatedOverride { date, entry })
}

/// Current overrides, oldest date first
pub async fn list_overrides(state: &AppState) -> Result<Vec<DatedOverride>, CommandError> {
  Ok(
    load_overrides(&state.db)
      .await?
      .into_iter()
      .map(|(date, entry)| DatedOverride { date, entry })
      .collect(),
  )
}

/// Drop the current override for `date`; the history is left untouched.
/// Returns whether one existed.
pub async fn clear_override(state: &AppState, date: NaiveDate) -> Result<bool, CommandError> {
  let mut overrides = load_overrides(&state.db).await?;
  if overrides.remove(&date).is_none() {
    return Ok(false);
  }
  save_overrides(&state.db, &overrides).await?;
  tracing::info!(%date, "Override cleared");
  Ok(true)
}

pub async fn get_override_history(
  state: &AppState,
  date: NaiveDate,
) -> Result<Vec<OverrideHistoryEntry>, CommandError> {
  Ok(override_history(&state.db, date).await?)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::*;

  fn input(title: &str) -> OverrideInput {
    OverrideInput {
      plan_type: WorkoutType::Rest,
      title: title.to_string(),
      target_minutes: None,
      rpe: None,
      details: vec![],
      coach_note: None,
    }
  }

  #[tokio::test]
  async fn test_set_list_clear() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    set_override(&state, date(2026, 3, 10), input("Injury rest")).await.unwrap();
    set_override(&state, date(2026, 3, 8), input("Travel")).await.unwrap();

    let listed = list_overrides(&state).await.unwrap();
    let dates: Vec<_> = listed.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![date(2026, 3, 8), date(2026, 3, 10)]);

    assert!(clear_override(&state, date(2026, 3, 8)).await.unwrap());
    assert!(!clear_override(&state, date(2026, 3, 8)).await.unwrap());
    assert_eq!(list_overrides(&state).await.unwrap().len(), 1);

    // History still has the cleared entry
    let history = get_override_history(&state, date(2026, 3, 8)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].author, OverrideAuthor::Manual);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_blank_title_rejected() {
    let pool = setup_test_db().await;
    let state = AppState { db: pool.clone() };

    let result = set_override(&state, date(2026, 3, 10), input("   ")).await;
    assert!(matches!(result, Err(CommandError::InvalidInput(_))));
    assert!(list_overrides(&state).await.unwrap().is_empty());

    teardown_test_db(pool).await;
  }
}

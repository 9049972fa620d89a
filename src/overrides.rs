//! Override store: current override per date plus an append-only history.
//!
//! `plan_overrides` is the materialized current state. Every write through
//! `upsert_overrides` is also recorded in `plan_override_history` with its
//! author, in the same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::db::StoreError;
use crate::models::{OverrideAuthor, PlanOverride};
use crate::plan::{iso_date_key, OverrideMap};

/// One recorded override write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideHistoryEntry {
  pub id: i64,
  pub date: NaiveDate,
  pub author: OverrideAuthor,
  pub recorded_at: DateTime<Utc>,
  #[serde(rename = "override")]
  pub entry: PlanOverride,
}

/// Current overrides keyed by date. Malformed rows are logged and skipped.
pub async fn load_overrides(pool: &SqlitePool) -> Result<OverrideMap, StoreError> {
  let rows = sqlx::query("SELECT date, override_json FROM plan_overrides ORDER BY date")
    .fetch_all(pool)
    .await?;

  let mut overrides = OverrideMap::new();
  for row in rows {
    let key: String = row.try_get("date")?;
    let json: String = row.try_get("override_json")?;

    let Ok(date) = NaiveDate::parse_from_str(&key, "%Y-%m-%d") else {
      tracing::warn!(key = %key, "Skipping override with malformed date key");
      continue;
    };
    match serde_json::from_str::<PlanOverride>(&json) {
      Ok(entry) => {
        overrides.insert(date, entry);
      }
      Err(e) => tracing::warn!(%date, error = %e, "Skipping malformed override"),
    }
  }

  Ok(overrides)
}

/// Replace the whole override set. Dates missing from `overrides` are deleted.
pub async fn save_overrides(pool: &SqlitePool, overrides: &OverrideMap) -> Result<(), StoreError> {
  let mut tx = pool.begin().await?;

  sqlx::query("DELETE FROM plan_overrides").execute(&mut *tx).await?;
  for (date, entry) in overrides {
    insert_current(&mut tx, *date, entry).await?;
  }

  tx.commit().await?;
  tracing::debug!(count = overrides.len(), "Override set replaced");
  Ok(())
}

/// Write each entry (last write wins per date) and append it to the history
pub async fn upsert_overrides(
  pool: &SqlitePool,
  entries: &OverrideMap,
  author: OverrideAuthor,
) -> Result<usize, StoreError> {
  let mut tx = pool.begin().await?;

  for (date, entry) in entries {
    insert_current(&mut tx, *date, entry).await?;

    sqlx::query(
      r#"
      INSERT INTO plan_override_history (date, override_json, author, recorded_at)
      VALUES (?1, ?2, ?3, ?4)
      "#,
    )
    .bind(iso_date_key(*date))
    .bind(serde_json::to_string(entry)?)
    .bind(author.to_string())
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;
  }

  tx.commit().await?;
  tracing::info!(count = entries.len(), %author, "Plan overrides written");
  Ok(entries.len())
}

async fn insert_current(
  tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
  date: NaiveDate,
  entry: &PlanOverride,
) -> Result<(), StoreError> {
  sqlx::query(
    r#"
    INSERT INTO plan_overrides (date, override_json, created_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(date) DO UPDATE SET
      override_json = excluded.override_json,
      created_at = excluded.created_at
    "#,
  )
  .bind(iso_date_key(date))
  .bind(serde_json::to_string(entry)?)
  .bind(entry.created_at)
  .execute(&mut **tx)
  .await?;
  Ok(())
}

/// Every recorded write for `date`, oldest first
pub async fn override_history(
  pool: &SqlitePool,
  date: NaiveDate,
) -> Result<Vec<OverrideHistoryEntry>, StoreError> {
  let rows = sqlx::query(
    r#"
    SELECT id, override_json, author, recorded_at
    FROM plan_override_history
    WHERE date = ?1
    ORDER BY id
    "#,
  )
  .bind(iso_date_key(date))
  .fetch_all(pool)
  .await?;

  let mut history = Vec::with_capacity(rows.len());
  for row in rows {
    let id: i64 = row.try_get("id")?;
    let json: String = row.try_get("override_json")?;
    let author: String = row.try_get("author")?;

    let author = match author.parse::<OverrideAuthor>() {
      Ok(a) => a,
      Err(e) => {
        tracing::warn!(id, error = %e, "Skipping history row with unknown author");
        continue;
      }
    };
    let entry = match serde_json::from_str::<PlanOverride>(&json) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::warn!(id, error = %e, "Skipping malformed history row");
        continue;
      }
    };

    history.push(OverrideHistoryEntry {
      id,
      date,
      author,
      recorded_at: row.try_get("recorded_at")?,
      entry,
    });
  }

  Ok(history)
}

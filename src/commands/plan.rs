use crate::config::ProgramConfig;
use crate::db::AppState;
use crate::overrides::load_overrides;
use crate::periodization::ProgramMeta;
use crate::plan::{plan_range, plan_with_overrides, DatedPlanItem};
use chrono::NaiveDate;
use serde::Serialize;

use super::CommandError;

/// Longest window `get_plan_range` will generate
pub const MAX_PLAN_DAYS: u32 = 366;

#[derive(Debug, Serialize)]
pub struct MetaView {
  pub date: NaiveDate,
  #[serde(flatten)]
  pub meta: ProgramMeta,
  pub is_deload_week: bool,
}

pub fn get_meta(program: &ProgramConfig, date: NaiveDate) -> MetaView {
  let meta = program.meta_for(date);
  MetaView {
    date,
    meta,
    is_deload_week: meta.is_deload_week(),
  }
}

/// Merged plan for a single date
pub async fn get_plan_for_day(
  state: &AppState,
  program: &ProgramConfig,
  date: NaiveDate,
) -> Result<DatedPlanItem, CommandError> {
  let overrides = load_overrides(&state.db).await?;
  Ok(DatedPlanItem {
    date,
    item: plan_with_overrides(date, program, &overrides),
  })
}

pub async fn get_plan_range(
  state: &AppState,
  program: &ProgramConfig,
  from: NaiveDate,
  days: u32,
) -> Result<Vec<DatedPlanItem>, CommandError> {
  if days == 0 || days > MAX_PLAN_DAYS {
    return Err(CommandError::InvalidInput(format!(
      "days must be between 1 and {}",
      MAX_PLAN_DAYS
    )));
  }
  let overrides = load_overrides(&state.db).await?;
  Ok(plan_range(from, days, program, &overrides))
}

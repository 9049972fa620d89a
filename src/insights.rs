//! Short textual observations derived from KPIs and the volume trend.

use chrono::NaiveDate;

use crate::config::ProgramConfig;
use crate::models::Workout;
use crate::stats::{compute_kpis, compute_trend, DateRange};

/// Weeks of history used for the volume comparison
const TREND_WEEKS: u32 = 4;
/// Week-over-week change (percent) worth mentioning
const VOLUME_CHANGE_THRESHOLD: i64 = 10;

/// Insights in a fixed order: completion, RPE, streak, volume
pub fn generate_insights(
  workouts: &[Workout],
  range: DateRange,
  program: &ProgramConfig,
  today: NaiveDate,
) -> Vec<String> {
  let kpis = compute_kpis(workouts, range, workouts, program, today);
  let mut insights = Vec::new();

  let pct = kpis.completion_pct;
  if pct >= 90 {
    insights.push(format!("Completion at {}%: excellent consistency.", pct));
  } else if pct >= 70 {
    insights.push(format!("Completion at {}%: good rhythm, keep it up.", pct));
  } else if pct > 0 {
    insights.push(format!("Completion at {}%: room to improve adherence.", pct));
  }

  if let Some(rpe) = kpis.avg_rpe {
    if rpe >= 8.0 {
      insights.push(format!(
        "High average RPE ({}/10): consider a deload or lower intensity.",
        rpe
      ));
    } else if rpe >= 6.0 {
      insights.push(format!(
        "Average RPE {}/10: moderate-high load, watch for fatigue.",
        rpe
      ));
    } else {
      insights.push(format!("Average RPE {}/10: load under control.", rpe));
    }
  }

  if kpis.streak >= 7 {
    insights.push(format!("Active streak of {} consecutive days.", kpis.streak));
  }

  let trend = compute_trend(workouts, TREND_WEEKS, today);
  if let [.., prev, recent] = trend.as_slice() {
    if prev.minutes > 0 {
      let change = volume_change_pct(prev.minutes, recent.minutes);
      if change > VOLUME_CHANGE_THRESHOLD {
        insights.push(format!("Volume +{}% vs previous week.", change));
      } else if change < -VOLUME_CHANGE_THRESHOLD {
        insights.push(format!("Volume {}% vs previous week.", change));
      }
    }
  }

  insights
}

/// Rounded percent change from `prev` to `recent`; `prev` must be non-zero
fn volume_change_pct(prev: u64, recent: u64) -> i64 {
  let prev = prev as f64;
  (((recent as f64 - prev) / prev) * 100.0).round() as i64
}

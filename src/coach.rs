//! Tool-using coach
//!
//! The model sees four tools (recent workouts, upcoming plan, modify plan,
//! weekly review). `run_coach` alternates model calls and tool executions until
//! the model answers without tools, the iteration budget runs out, or the
//! caller cancels. Partial progress is always returned.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::ProgramConfig;
use crate::db::StoreError;
use crate::insights::generate_insights;
use crate::llm::{ClaudeClient, ContentBlock, LlmError, Message, MessagesResponse, Role, ToolDefinition};
use crate::models::{OverrideAuthor, PlanOverride, WorkoutType};
use crate::overrides::{load_overrides, upsert_overrides};
use crate::plan::{plan_range, plan_with_overrides, OverrideMap};
use crate::stats::{compute_kpis, total_minutes, DateRange};
use crate::workouts::read_workouts;

pub const DEFAULT_MAX_ITERATIONS: u32 = 8;
const MAX_TOKENS: u32 = 1200;
const MAX_DAYS_BACK: u32 = 365;
const MAX_DAYS_AHEAD: u32 = 60;

/// ---------------------------------------------------------------------------
/// Model Seam
/// ---------------------------------------------------------------------------

#[async_trait]
pub trait CoachModel: Send + Sync {
  async fn respond(
    &self,
    system: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
  ) -> Result<MessagesResponse, LlmError>;
}

#[async_trait]
impl CoachModel for ClaudeClient {
  async fn respond(
    &self,
    system: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
  ) -> Result<MessagesResponse, LlmError> {
    self.create_message(system, messages, tools, MAX_TOKENS).await
  }
}

/// ---------------------------------------------------------------------------
/// Cancellation + Progress
/// ---------------------------------------------------------------------------

/// Shared flag checked before every model call and tool call
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CoachProgress {
  ModelCall { iteration: u32 },
  ToolStarted { name: String },
  ToolFinished { name: String, is_error: bool },
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
  Completed,
  IterationLimit,
  Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachOutcome {
  /// Last non-empty text the model produced
  pub reply: String,
  pub tools_used: Vec<String>,
  pub iterations: u32,
  pub stop_reason: StopReason,
}

pub struct CoachOptions {
  pub max_iterations: u32,
  pub cancel: CancelToken,
  pub progress: Option<mpsc::UnboundedSender<CoachProgress>>,
}

impl Default for CoachOptions {
  fn default() -> Self {
    Self {
      max_iterations: DEFAULT_MAX_ITERATIONS,
      cancel: CancelToken::new(),
      progress: None,
    }
  }
}

impl CoachOptions {
  fn emit(&self, event: CoachProgress) {
    if let Some(tx) = &self.progress {
      // Receiver gone means nobody is listening; keep going.
      let _ = tx.send(event);
    }
  }
}

/// Everything tools need to read and write
pub struct CoachContext<'a> {
  pub db: &'a SqlitePool,
  pub program: &'a ProgramConfig,
  pub today: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
pub enum CoachError {
  #[error("LLM error: {0}")]
  Llm(#[from] LlmError),

  #[error("Conversation is empty")]
  EmptyConversation,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
  #[error("Unknown tool: {0}")]
  UnknownTool(String),

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// ---------------------------------------------------------------------------
/// Tool Definitions
/// ---------------------------------------------------------------------------

pub fn tool_definitions() -> Vec<ToolDefinition> {
  vec![
    ToolDefinition {
      name: "get_recent_workouts".into(),
      description: "Get the athlete's recent workout history with the plan for each day. Use this to analyze trends, volume and RPE.".into(),
      input_schema: json!({
        "type": "object",
        "properties": {
          "days_back": {"type": "integer", "description": "How many days back to look (default 14)"}
        }
      }),
    },
    ToolDefinition {
      name: "get_upcoming_plan".into(),
      description: "Get the planned sessions for the next N days, including overrides.".into(),
      input_schema: json!({
        "type": "object",
        "properties": {
          "days_ahead": {"type": "integer", "description": "How many days ahead to show (default 7)"}
        }
      }),
    },
    ToolDefinition {
      name: "modify_plan".into(),
      description: "Override the plan for specific dates. Each override fully replaces that day's session.".into(),
      input_schema: json!({
        "type": "object",
        "properties": {
          "overrides": {
            "type": "array",
            "items": {
              "type": "object",
              "properties": {
                "date": {"type": "string", "description": "YYYY-MM-DD"},
                "type": {"type": "string", "enum": ["run", "gym", "rest"]},
                "title": {"type": "string"},
                "target_minutes": {"type": "integer"},
                "rpe": {"type": "string", "description": "Target RPE range, e.g. '6-7'"},
                "details": {"type": "array", "items": {"type": "string"}},
                "coach_note": {"type": "string", "description": "Why this change was made"}
              },
              "required": ["date", "type", "title", "details"]
            }
          }
        },
        "required": ["overrides"]
      }),
    },
    ToolDefinition {
      name: "weekly_review".into(),
      description: "KPIs and insights for the current Monday-start week.".into(),
      input_schema: json!({"type": "object", "properties": {}}),
    },
  ]
}

pub fn system_prompt(program: &ProgramConfig, today: NaiveDate) -> String {
  let meta = program.meta_for(today);
  format!(
    "You are a personal running coach. Be direct, use concrete numbers from the tools, and say when data is missing.\n\
     Today is {today}. Program week {week}, phase {phase} (week {phase_week} of phase), {weeks_to_race} weeks to race day ({race}).\n\
     Weekly structure: strength Mon/Fri, easy run Tue, quality run Thu, long run Sun, rest Wed/Sat. Every 4th week is a deload.\n\
     Use modify_plan to change sessions instead of only suggesting changes.",
    today = today,
    week = meta.week_index,
    phase = meta.phase,
    phase_week = meta.phase_week,
    weeks_to_race = meta.weeks_to_race,
    race = program.race_date,
  )
}

/// ---------------------------------------------------------------------------
/// Tool Execution
/// ---------------------------------------------------------------------------

fn parse_args<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, ToolError> {
  let input = if input.is_null() { json!({}) } else { input.clone() };
  serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct RecentWorkoutsArgs {
  #[serde(default = "default_days_back")]
  days_back: u32,
}

fn default_days_back() -> u32 {
  14
}

#[derive(Debug, Deserialize)]
struct UpcomingPlanArgs {
  #[serde(default = "default_days_ahead")]
  days_ahead: u32,
}

fn default_days_ahead() -> u32 {
  7
}

#[derive(Debug, Deserialize)]
struct ModifyPlanArgs {
  overrides: Vec<OverrideInput>,
}

#[derive(Debug, Deserialize)]
struct OverrideInput {
  date: NaiveDate,
  #[serde(rename = "type")]
  plan_type: WorkoutType,
  title: String,
  #[serde(default, alias = "targetMinutes")]
  target_minutes: Option<i32>,
  #[serde(default)]
  rpe: Option<String>,
  #[serde(default)]
  details: Vec<String>,
  #[serde(default, alias = "coachNote")]
  coach_note: Option<String>,
}

pub async fn execute_tool(ctx: &CoachContext<'_>, name: &str, input: &Value) -> Result<String, ToolError> {
  match name {
    "get_recent_workouts" => {
      let args: RecentWorkoutsArgs = parse_args(input)?;
      recent_workouts(ctx, args.days_back.clamp(1, MAX_DAYS_BACK)).await
    }
    "get_upcoming_plan" => {
      let args: UpcomingPlanArgs = parse_args(input)?;
      upcoming_plan(ctx, args.days_ahead.clamp(1, MAX_DAYS_AHEAD)).await
    }
    "modify_plan" => {
      let args: ModifyPlanArgs = parse_args(input)?;
      modify_plan(ctx, args.overrides).await
    }
    "weekly_review" => weekly_review(ctx).await,
    other => Err(ToolError::UnknownTool(other.to_string())),
  }
}

async fn recent_workouts(ctx: &CoachContext<'_>, days_back: u32) -> Result<String, ToolError> {
  let cutoff = ctx.today - Duration::days(days_back as i64);
  let overrides = load_overrides(ctx.db).await?;
  let recent: Vec<_> = read_workouts(ctx.db)
    .await?
    .into_iter()
    .filter(|w| w.date >= cutoff && w.date <= ctx.today)
    .collect();

  if recent.is_empty() {
    return Ok(format!("No workouts in the last {} days.", days_back));
  }

  let total = total_minutes(&recent);
  let runs = recent.iter().filter(|w| w.workout_type == WorkoutType::Run).count();
  let gym = recent.iter().filter(|w| w.workout_type == WorkoutType::Gym).count();
  let rpes: Vec<f64> = recent.iter().filter_map(|w| w.rpe).collect();
  let avg_rpe = if rpes.is_empty() {
    "n/a".to_string()
  } else {
    format!("{:.1}", rpes.iter().sum::<f64>() / rpes.len() as f64)
  };

  let mut out = format!(
    "LAST {} DAYS ({} workouts)\nSummary: {} min total | {} runs + {} gym | avg RPE {}\n\n",
    days_back,
    recent.len(),
    total,
    runs,
    gym,
    avg_rpe
  );

  for w in &recent {
    let planned = plan_with_overrides(w.date, ctx.program, &overrides);
    let status = if planned.plan_type == w.workout_type { "done" } else { "CHANGED" };
    out.push_str(&format!(
      "{} | {} | {} min | RPE {} | Plan: {} ({})",
      w.date,
      w.workout_type,
      w.minutes.map(|m| m.to_string()).unwrap_or_else(|| "?".into()),
      w.rpe.map(|r| r.to_string()).unwrap_or_else(|| "?".into()),
      planned.title,
      status
    ));
    if let Some(notes) = &w.notes {
      out.push_str(&format!(" | {}", notes));
    }
    out.push_str(&format!(" [{}]\n", w.source));
  }

  Ok(out)
}

async fn upcoming_plan(ctx: &CoachContext<'_>, days_ahead: u32) -> Result<String, ToolError> {
  let overrides = load_overrides(ctx.db).await?;
  let mut out = format!("PLAN FOR THE NEXT {} DAYS\n", days_ahead);

  for day in plan_range(ctx.today, days_ahead, ctx.program, &overrides) {
    let item = &day.item;
    out.push_str(&format!(
      "{} ({}) | {} | {}",
      day.date,
      day.date.format("%a"),
      item.plan_type,
      item.title
    ));
    if let Some(minutes) = item.target_minutes {
      out.push_str(&format!(" | {} min", minutes));
    }
    if let Some(rpe) = &item.rpe {
      out.push_str(&format!(" | RPE {}", rpe));
    }
    if item.is_override {
      out.push_str(" [OVERRIDE]");
    }
    if let Some(note) = &item.coach_note {
      out.push_str(&format!(" | Note: {}", note));
    }
    out.push('\n');
  }

  Ok(out)
}

async fn modify_plan(ctx: &CoachContext<'_>, inputs: Vec<OverrideInput>) -> Result<String, ToolError> {
  if inputs.is_empty() {
    return Err(ToolError::InvalidInput("overrides must not be empty".into()));
  }

  let now = Utc::now();
  let entries: OverrideMap = inputs
    .into_iter()
    .map(|o| {
      (
        o.date,
        PlanOverride {
          plan_type: o.plan_type,
          title: o.title,
          target_minutes: o.target_minutes,
          rpe: o.rpe,
          details: o.details,
          coach_note: o.coach_note,
          created_at: now,
        },
      )
    })
    .collect();

  let count = upsert_overrides(ctx.db, &entries, OverrideAuthor::Coach).await?;
  let dates: Vec<String> = entries.keys().map(|d| d.to_string()).collect();
  Ok(format!("Plan updated for {} day(s): {}.", count, dates.join(", ")))
}

async fn weekly_review(ctx: &CoachContext<'_>) -> Result<String, ToolError> {
  let workouts = read_workouts(ctx.db).await?;
  let week = DateRange::week_of(ctx.today);
  let kpis = compute_kpis(&workouts, week, &workouts, ctx.program, ctx.today);
  let insights = generate_insights(&workouts, week, ctx.program, ctx.today);

  let review = json!({
    "week_start": week.start,
    "kpis": kpis,
    "insights": insights,
  });
  serde_json::to_string_pretty(&review).map_err(|e| ToolError::Store(StoreError::from(e)))
}

/// ---------------------------------------------------------------------------
/// Coach Loop
/// ---------------------------------------------------------------------------

pub async fn run_coach(
  model: &dyn CoachModel,
  ctx: &CoachContext<'_>,
  history: Vec<Message>,
  options: &CoachOptions,
) -> Result<CoachOutcome, CoachError> {
  if history.is_empty() {
    return Err(CoachError::EmptyConversation);
  }

  let system = system_prompt(ctx.program, ctx.today);
  let tools = tool_definitions();
  let mut messages = history;
  let mut outcome = CoachOutcome {
    reply: String::new(),
    tools_used: Vec::new(),
    iterations: 0,
    stop_reason: StopReason::IterationLimit,
  };

  while outcome.iterations < options.max_iterations {
    if options.cancel.is_cancelled() {
      return Ok(cancelled(outcome, options));
    }

    outcome.iterations += 1;
    options.emit(CoachProgress::ModelCall {
      iteration: outcome.iterations,
    });

    let response = model.respond(&system, &messages, &tools).await?;
    let text = response.text();
    if !text.trim().is_empty() {
      outcome.reply = text;
    }

    let calls = response.tool_calls();
    if calls.is_empty() {
      outcome.stop_reason = StopReason::Completed;
      return Ok(outcome);
    }

    let mut results = Vec::with_capacity(calls.len());
    for (id, name, input) in calls {
      if options.cancel.is_cancelled() {
        return Ok(cancelled(outcome, options));
      }

      outcome.tools_used.push(name.to_string());
      options.emit(CoachProgress::ToolStarted { name: name.to_string() });

      let (content, is_error) = match execute_tool(ctx, name, input).await {
        Ok(content) => (content, false),
        Err(e) => {
          tracing::warn!(tool = name, error = %e, "Coach tool failed");
          (format!("Error executing {}: {}", name, e), true)
        }
      };
      tracing::info!(tool = name, is_error, "Coach tool executed");
      options.emit(CoachProgress::ToolFinished {
        name: name.to_string(),
        is_error,
      });

      results.push(ContentBlock::ToolResult {
        tool_use_id: id.to_string(),
        content,
        is_error,
      });
    }

    messages.push(Message {
      role: Role::Assistant,
      content: response.content.clone(),
    });
    messages.push(Message {
      role: Role::User,
      content: results,
    });
  }

  tracing::info!(iterations = outcome.iterations, "Coach stopped at iteration limit");
  Ok(outcome)
}

fn cancelled(mut outcome: CoachOutcome, options: &CoachOptions) -> CoachOutcome {
  tracing::info!(iterations = outcome.iterations, "Coach cancelled");
  options.emit(CoachProgress::Cancelled);
  outcome.stop_reason = StopReason::Cancelled;
  outcome
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

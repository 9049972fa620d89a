use crate::coach::{run_coach, CoachContext, CoachModel, CoachOptions, CoachOutcome};
use crate::config::ProgramConfig;
use crate::db::AppState;
use crate::llm::Message;
use chrono::NaiveDate;

use super::CommandError;

/// One coach turn: prior conversation plus the athlete's new question
pub async fn ask_coach(
  state: &AppState,
  program: &ProgramConfig,
  model: &dyn CoachModel,
  history: Vec<Message>,
  question: &str,
  options: &CoachOptions,
  today: NaiveDate,
) -> Result<CoachOutcome, CommandError> {
  let question = question.trim();
  if question.is_empty() {
    return Err(CommandError::InvalidInput("question must not be empty".into()));
  }

  let mut messages = history;
  messages.push(Message::user_text(question));

  let ctx = CoachContext {
    db: &state.db,
    program,
    today,
  };
  let outcome = run_coach(model, &ctx, messages, options).await?;

  tracing::info!(
    iterations = outcome.iterations,
    tools = outcome.tools_used.len(),
    stop_reason = ?outcome.stop_reason,
    "Coach turn finished"
  );
  Ok(outcome)
}

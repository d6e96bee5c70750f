//! Worksheet generation behind the HTTP API and the in-process gateway.
//!
//! This includes:
//!   - Building prompts from the request and the configured templates
//!   - Calling the AI client and decoding its JSON reply into problems
//!   - Title suggestions with a theme-based fallback that never fails
//!   - Mapping failures to the user-facing messages of each endpoint

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::domain::Problem;
use crate::openai::LlmError;
use crate::protocol::{GenerateIn, GeneratedWorksheet, RegenerateOneIn, SuggestTitleIn, SuggestTitleOut};
use crate::state::AppState;
use crate::util::{fill_template, trunc_for_log};

const GENERATE_TEMPERATURE: f32 = 0.8;
const TITLE_TEMPERATURE: f32 = 0.9;

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("AI service is not configured (OPENAI_API_KEY)")]
  Disabled,
  #[error("AI reply could not be parsed")]
  Unparseable,
  #[error("{0}")]
  Upstream(String),
}

impl From<LlmError> for GenerationError {
  fn from(e: LlmError) -> Self {
    match e {
      LlmError::Parse | LlmError::EmptyReply => GenerationError::Unparseable,
      other => GenerationError::Upstream(other.to_string()),
    }
  }
}

impl GenerationError {
  /// Message for a failed full generation.
  pub fn generate_message(&self) -> String {
    match self {
      GenerationError::Unparseable => "AIの応答をパースできませんでした。もう一度お試しください。".into(),
      other => format!("生成中にエラーが発生しました: {}", other),
    }
  }

  /// Message for a failed single-problem regeneration.
  pub fn regenerate_message(&self) -> String {
    match self {
      GenerationError::Unparseable => "AIの応答をパースできませんでした。".into(),
      other => format!("再生成中にエラーが発生しました: {}", other),
    }
  }
}

fn notes_or_none(notes: &str) -> &str {
  if notes.trim().is_empty() { "なし" } else { notes }
}

pub fn build_generate_prompt(tpl: &str, req: &GenerateIn) -> String {
  let count = req.count.to_string();
  let formats = req.formats.join("、");
  fill_template(tpl, &[
    ("grade", req.grade.as_str()),
    ("subject", req.subject.as_str()),
    ("theme", req.theme.as_str()),
    ("notes", notes_or_none(&req.notes)),
    ("formats", formats.as_str()),
    ("difficulty", req.difficulty.as_str()),
    ("count", count.as_str()),
  ])
}

pub fn build_regenerate_prompt(tpl: &str, req: &RegenerateOneIn) -> String {
  let number = req.problem_number.to_string();
  let formats = req.formats.join("、");
  fill_template(tpl, &[
    ("grade", req.grade.as_str()),
    ("subject", req.subject.as_str()),
    ("theme", req.theme.as_str()),
    ("notes", notes_or_none(&req.notes)),
    ("formats", formats.as_str()),
    ("difficulty", req.difficulty.as_str()),
    ("problem_number", number.as_str()),
    ("current_question", req.current_question.as_str()),
  ])
}

/// Generate a full worksheet. Problems come back numbered 1..N, at most `count`.
#[instrument(level = "info", skip(state, req), fields(grade = %req.grade, subject = %req.subject, count = req.count, formats = req.formats.len()))]
pub async fn generate_worksheet(state: &AppState, req: &GenerateIn) -> Result<GeneratedWorksheet, GenerationError> {
  let oa = state.openai.as_ref().ok_or(GenerationError::Disabled)?;
  let user = build_generate_prompt(&state.prompts.generate_template, req);
  let value = oa.chat_json(&state.prompts.system, &user, GENERATE_TEMPERATURE).await?;

  let mut sheet: GeneratedWorksheet = serde_json::from_value(value).map_err(|e| {
    error!(target: "generation", error = %e, "Reply JSON does not match the worksheet shape");
    GenerationError::Unparseable
  })?;

  let wanted = req.count as usize;
  if wanted > 0 && sheet.problems.len() > wanted {
    warn!(target: "generation", got = sheet.problems.len(), wanted, "Model returned extra problems; truncating");
    sheet.problems.truncate(wanted);
  } else if sheet.problems.len() < wanted {
    warn!(target: "generation", got = sheet.problems.len(), wanted, "Model returned fewer problems than requested");
  }
  for (i, p) in sheet.problems.iter_mut().enumerate() {
    p.number = i as u32 + 1;
  }
  sheet.title = sheet.title.filter(|t| !t.trim().is_empty());

  info!(target: "generation", problems = sheet.problems.len(), has_title = sheet.title.is_some(), "Worksheet generated");
  Ok(sheet)
}

/// Generate one replacement problem, numbered as requested.
#[instrument(level = "info", skip(state, req), fields(problem_number = req.problem_number))]
pub async fn regenerate_problem(state: &AppState, req: &RegenerateOneIn) -> Result<Problem, GenerationError> {
  let oa = state.openai.as_ref().ok_or(GenerationError::Disabled)?;
  let user = build_regenerate_prompt(&state.prompts.regenerate_template, req);
  let value = oa.chat_json(&state.prompts.system, &user, GENERATE_TEMPERATURE).await?;

  let mut problem: Problem = serde_json::from_value(value).map_err(|e| {
    error!(target: "generation", error = %e, "Reply JSON does not match the problem shape");
    GenerationError::Unparseable
  })?;
  problem.number = req.problem_number;

  info!(
    target: "generation",
    kind = %problem.kind.label(),
    question_preview = %trunc_for_log(&problem.question, 30),
    "Problem regenerated"
  );
  Ok(problem)
}

/// Ask for title ideas. Any failure degrades to a single theme-based title.
#[instrument(level = "info", skip(state, req), fields(subject = %req.subject))]
pub async fn suggest_titles(state: &AppState, req: &SuggestTitleIn) -> SuggestTitleOut {
  let fallback = || SuggestTitleOut { titles: vec![format!("{} ワークシート", req.theme)] };

  let Some(oa) = &state.openai else {
    warn!(target: "generation", "AI disabled; serving fallback title");
    return fallback();
  };
  let user = fill_template(&state.prompts.suggest_title_template, &[
    ("grade", req.grade.as_str()),
    ("subject", req.subject.as_str()),
    ("theme", req.theme.as_str()),
  ]);

  match oa.chat_json(&state.prompts.system, &user, TITLE_TEMPERATURE).await {
    Ok(v) => match serde_json::from_value::<SuggestTitleOut>(v) {
      Ok(out) => SuggestTitleOut {
        titles: out.titles.into_iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect(),
      },
      Err(e) => {
        error!(target: "generation", error = %e, "Title reply has an unexpected shape; serving fallback");
        fallback()
      }
    },
    Err(e) => {
      error!(target: "generation", error = %e, "Title suggestion failed; serving fallback");
      fallback()
    }
  }
}

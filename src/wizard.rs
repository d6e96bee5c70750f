//! Wizard steps, the request being assembled across them, and the step machine.
//!
//! Forward transitions validate the step being left; backward transitions are
//! unconditional. Validation checks fields in a fixed order and reports the
//! first missing one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::domain::{Difficulty, ProblemType, Subject};

/// Ordered wizard stages. Serialized as their 1-based number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WizardStep {
  Identify = 1,
  Topic = 2,
  Format = 3,
  Review = 4,
  Done = 5,
}

impl WizardStep {
  pub fn number(self) -> u8 { self as u8 }
}

impl TryFrom<u8> for WizardStep {
  type Error = String;
  fn try_from(n: u8) -> Result<Self, Self::Error> {
    match n {
      1 => Ok(WizardStep::Identify),
      2 => Ok(WizardStep::Topic),
      3 => Ok(WizardStep::Format),
      4 => Ok(WizardStep::Review),
      5 => Ok(WizardStep::Done),
      other => Err(format!("no wizard step {}", other)),
    }
  }
}

impl From<WizardStep> for u8 {
  fn from(s: WizardStep) -> u8 { s.number() }
}

/// Free-text inputs of the wizard form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
  SchoolName,
  TeacherName,
  Grade,
  Theme,
  Notes,
  Title,
}

pub const DEFAULT_COUNT: u32 = 5;
pub const DEFAULT_COLOR_THEME: &str = "soft";

/// Everything entered in steps 1-3, plus presentation choices.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetRequest {
  pub school_name: String,
  pub teacher_name: String,
  pub grade: String,
  pub subject: Option<Subject>,
  pub theme: String,
  pub notes: String,
  pub formats: BTreeSet<ProblemType>,
  pub difficulty: Option<Difficulty>,
  pub count: u32,
  pub title: String,
  pub color_theme: String,
}

impl Default for WorksheetRequest {
  fn default() -> Self {
    Self {
      school_name: String::new(),
      teacher_name: String::new(),
      grade: String::new(),
      subject: None,
      theme: String::new(),
      notes: String::new(),
      formats: BTreeSet::new(),
      difficulty: None,
      count: DEFAULT_COUNT,
      title: String::new(),
      color_theme: DEFAULT_COLOR_THEME.to_string(),
    }
  }
}

impl WorksheetRequest {
  /// Store a text input, trimmed the way the form saves it.
  pub fn set_text(&mut self, field: TextField, value: &str) {
    let value = value.trim().to_string();
    match field {
      TextField::SchoolName => self.school_name = value,
      TextField::TeacherName => self.teacher_name = value,
      TextField::Grade => self.grade = value,
      TextField::Theme => self.theme = value,
      TextField::Notes => self.notes = value,
      TextField::Title => self.title = value,
    }
  }

  pub fn select_subject(&mut self, subject: Subject) {
    self.subject = Some(subject);
  }

  /// Multi-select chip: flips membership, returns whether the format is now selected.
  pub fn toggle_format(&mut self, format: ProblemType) -> bool {
    if self.formats.remove(&format) {
      false
    } else {
      self.formats.insert(format);
      true
    }
  }

  pub fn select_difficulty(&mut self, difficulty: Difficulty) {
    self.difficulty = Some(difficulty);
  }

  pub fn select_count(&mut self, count: u32) {
    self.count = count;
  }

  pub fn format_labels(&self) -> Vec<String> {
    self.formats.iter().map(|f| f.label().to_string()).collect()
  }

  /// Title shown on the sheet: the chosen one, else derived from the theme.
  pub fn display_title(&self) -> String {
    if self.title.is_empty() {
      format!("{} ワークシート", self.theme)
    } else {
      self.title.clone()
    }
  }
}

/// First required field found missing when leaving a step forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MissingField {
  #[error("学校名を入力してください")]
  SchoolName,
  #[error("先生のお名前を入力してください")]
  TeacherName,
  #[error("対象学年を選んでください")]
  Grade,
  #[error("教科を選んでください")]
  Subject,
  #[error("テーマ・単元を入力してください")]
  Theme,
  #[error("問題形式を1つ以上選んでください")]
  Formats,
  #[error("難易度を選んでください")]
  Difficulty,
  #[error("問題数を選んでください")]
  Count,
}

/// Validate the fields a step owns, in their fixed order.
pub fn validate(step: WizardStep, req: &WorksheetRequest) -> Result<(), MissingField> {
  match step {
    WizardStep::Identify => {
      if req.school_name.trim().is_empty() { return Err(MissingField::SchoolName); }
      if req.teacher_name.trim().is_empty() { return Err(MissingField::TeacherName); }
      if req.grade.is_empty() { return Err(MissingField::Grade); }
      Ok(())
    }
    WizardStep::Topic => {
      if req.subject.is_none() { return Err(MissingField::Subject); }
      if req.theme.trim().is_empty() { return Err(MissingField::Theme); }
      Ok(())
    }
    WizardStep::Format => {
      if req.formats.is_empty() { return Err(MissingField::Formats); }
      if req.difficulty.is_none() { return Err(MissingField::Difficulty); }
      if req.count == 0 { return Err(MissingField::Count); }
      Ok(())
    }
    WizardStep::Review | WizardStep::Done => Ok(()),
  }
}

/// Current-step pointer plus transition rules.
#[derive(Clone, Debug)]
pub struct StepMachine {
  current: WizardStep,
}

impl Default for StepMachine {
  fn default() -> Self { Self { current: WizardStep::Identify } }
}

impl StepMachine {
  pub fn current(&self) -> WizardStep { self.current }

  /// Move to `target`. Forward moves validate the current step first and leave
  /// the pointer untouched on failure.
  #[instrument(level = "debug", skip(self, req), fields(from = self.current.number(), to = target.number()))]
  pub fn request_transition(&mut self, target: WizardStep, req: &WorksheetRequest) -> Result<WizardStep, MissingField> {
    if target > self.current {
      if let Err(missing) = validate(self.current, req) {
        debug!(target: "wizard", step = self.current.number(), %missing, "Forward transition refused");
        return Err(missing);
      }
    }
    self.current = target;
    Ok(target)
  }

  /// Unconditional return to the first step.
  pub fn reset(&mut self) {
    self.current = WizardStep::Identify;
  }
}

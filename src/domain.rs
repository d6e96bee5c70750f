//! Domain models shared by the wizard core and the generation service:
//! problem types, subjects, difficulties and the problem itself.

use serde::{Deserialize, Deserializer, Serialize};

/// Pedagogical format of a problem. Decides how the problem is rendered.
///
/// The AI service answers with free-text labels; they are parsed exactly once
/// into this enum so rendering never has to inspect strings again.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProblemType {
  OneAnswer,
  FillIn,
  MultipleChoice,
  TrueFalse,
  ShortAnswer,
  Essay,
  Ordering,
  Matching,
  /// Unrecognized label, kept verbatim.
  Other(String),
}

impl ProblemType {
  /// All chip values in display order.
  pub const KNOWN: [ProblemType; 8] = [
    ProblemType::OneAnswer,
    ProblemType::FillIn,
    ProblemType::MultipleChoice,
    ProblemType::TrueFalse,
    ProblemType::ShortAnswer,
    ProblemType::Essay,
    ProblemType::Ordering,
    ProblemType::Matching,
  ];

  pub fn label(&self) -> &str {
    match self {
      ProblemType::OneAnswer => "一問一答",
      ProblemType::FillIn => "穴埋め問題",
      ProblemType::MultipleChoice => "選択問題",
      ProblemType::TrueFalse => "○×クイズ",
      ProblemType::ShortAnswer => "記述式（短答）",
      ProblemType::Essay => "記述式（長文）",
      ProblemType::Ordering => "並べ替え問題",
      ProblemType::Matching => "マッチング",
      ProblemType::Other(label) => label,
    }
  }

  /// Parse a free-text type label. First matching rule wins; the order mirrors
  /// the rendering table (true/false before matching before ordering, ...).
  pub fn from_label(label: &str) -> Self {
    let s = label.trim();
    let lower = s.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| s.contains(k) || lower.contains(k));

    if has(&["○×", "〇×", "true/false", "true-false"]) {
      ProblemType::TrueFalse
    } else if has(&["マッチング", "matching"]) {
      ProblemType::Matching
    } else if has(&["並べ替え", "ordering"]) {
      ProblemType::Ordering
    } else if has(&["一問一答", "one-answer"]) {
      ProblemType::OneAnswer
    } else if has(&["穴埋め", "fill-in"]) {
      ProblemType::FillIn
    } else if has(&["短答", "short-answer"]) {
      ProblemType::ShortAnswer
    } else if has(&["長文", "essay"]) {
      ProblemType::Essay
    } else if has(&["選択", "multiple-choice"]) {
      ProblemType::MultipleChoice
    } else {
      ProblemType::Other(s.to_string())
    }
  }
}

impl Default for ProblemType {
  fn default() -> Self { ProblemType::Other(String::new()) }
}

impl From<String> for ProblemType {
  fn from(s: String) -> Self { ProblemType::from_label(&s) }
}

impl From<ProblemType> for String {
  fn from(t: ProblemType) -> Self { t.label().to_string() }
}

/// School subject (single-select chip group).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
  #[serde(rename = "国語")] Japanese,
  #[serde(rename = "算数")] Arithmetic,
  #[serde(rename = "数学")] Mathematics,
  #[serde(rename = "理科")] Science,
  #[serde(rename = "社会")] SocialStudies,
  #[serde(rename = "英語")] English,
  #[serde(rename = "生活")] LifeEnvironment,
  #[serde(rename = "音楽")] Music,
  #[serde(rename = "図画工作")] ArtsAndCrafts,
  #[serde(rename = "家庭")] HomeEconomics,
  #[serde(rename = "体育")] PhysicalEducation,
  #[serde(rename = "道徳")] Ethics,
}

impl Subject {
  pub fn label(self) -> &'static str {
    match self {
      Subject::Japanese => "国語",
      Subject::Arithmetic => "算数",
      Subject::Mathematics => "数学",
      Subject::Science => "理科",
      Subject::SocialStudies => "社会",
      Subject::English => "英語",
      Subject::LifeEnvironment => "生活",
      Subject::Music => "音楽",
      Subject::ArtsAndCrafts => "図画工作",
      Subject::HomeEconomics => "家庭",
      Subject::PhysicalEducation => "体育",
      Subject::Ethics => "道徳",
    }
  }
}

/// Difficulty level (single-select chip group).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
  #[serde(rename = "基礎")] Basic,
  #[serde(rename = "標準")] Standard,
  #[serde(rename = "発展")] Advanced,
}

impl Difficulty {
  pub fn label(self) -> &'static str {
    match self {
      Difficulty::Basic => "基礎",
      Difficulty::Standard => "標準",
      Difficulty::Advanced => "発展",
    }
  }
}

/// One worksheet problem as exchanged with the generation service.
///
/// `number` is owned by the collection and rewritten on every structural change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Problem {
  #[serde(default, deserialize_with = "lenient_number")]
  pub number: u32,
  #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
  pub kind: ProblemType,
  #[serde(default, deserialize_with = "lenient_text")]
  pub question: String,
  #[serde(default, deserialize_with = "lenient_list")]
  pub choices: Vec<String>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub answer: String,
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_opt_text")]
  pub explanation: Option<String>,
}

#[cfg(test)]
impl Problem {
  pub fn new(kind: ProblemType, question: impl Into<String>, answer: impl Into<String>) -> Self {
    Self {
      number: 0,
      kind,
      question: question.into(),
      choices: Vec::new(),
      answer: answer.into(),
      explanation: None,
    }
  }

  pub fn with_choices<I, S>(mut self, choices: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.choices = choices.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
    self.explanation = Some(explanation.into());
    self
  }
}

// --- Lenient decoding: models do not always respect the requested types ---

fn value_to_text(v: serde_json::Value) -> String {
  use serde_json::Value;
  match v {
    Value::Null => String::new(),
    Value::String(s) => s,
    Value::Bool(b) => if b { "○".into() } else { "×".into() },
    Value::Number(n) => n.to_string(),
    Value::Array(items) => items.into_iter().map(value_to_text).collect::<Vec<_>>().join("、"),
    other => other.to_string(),
  }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  let v = serde_json::Value::deserialize(d)?;
  Ok(value_to_text(v))
}

fn lenient_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  let s = lenient_text(d)?;
  Ok(if s.trim().is_empty() { None } else { Some(s) })
}

/// Numbers are rewritten by the collection, so anything unreadable is 0.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
  use serde_json::Value;
  let n = match Value::deserialize(d)? {
    Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
    Value::String(s) => {
      let s = s.trim();
      s.parse::<u64>().ok().or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
    }
    _ => None,
  };
  Ok(n.and_then(|n| u32::try_from(n).ok()).unwrap_or(0))
}

fn lenient_kind<'de, D: Deserializer<'de>>(d: D) -> Result<ProblemType, D::Error> {
  use serde_json::Value;
  Ok(match Value::deserialize(d)? {
    Value::Null => ProblemType::default(),
    other => ProblemType::from_label(&value_to_text(other)),
  })
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
  use serde_json::Value;
  Ok(match Value::deserialize(d)? {
    Value::Null => Vec::new(),
    Value::Array(items) => items.into_iter().map(value_to_text).collect(),
    other => vec![value_to_text(other)],
  })
}

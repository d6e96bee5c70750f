//! Pure projection of problems into student-view and answer-view structures,
//! plus the HTML markup the front-end drops into its A4 pages.
//!
//! Which choice layout and which answer space a problem gets depends only on
//! its `ProblemType` and whether it carries choices:
//!
//! | type         | choices layout              | answer space            |
//! |--------------|-----------------------------|-------------------------|
//! | true/false   | 2-column grid, bare labels  | none                    |
//! | matching     | bulleted single column      | none                    |
//! | ordering     | bracketed single column     | standard                |
//! | other        | lettered single column      | none                    |
//! | one-answer, fill-in, short-answer | -      | standard                |
//! | essay        | -                           | large                   |
//! | anything left with neither        | -      | standard                |

use serde::Serialize;

use crate::domain::{Problem, ProblemType};
use crate::util::escape_html;
use crate::wizard::WorksheetRequest;

const CIRCLED_NUMBERS: [&str; 20] = [
  "①", "②", "③", "④", "⑤", "⑥", "⑦", "⑧", "⑨", "⑩",
  "⑪", "⑫", "⑬", "⑭", "⑮", "⑯", "⑰", "⑱", "⑲", "⑳",
];

const CHOICE_LABELS: [&str; 8] = ["ア", "イ", "ウ", "エ", "オ", "カ", "キ", "ク"];

/// Number glyph for a 0-based position: circled up to 20, plain integer after.
pub fn number_glyph(index: usize) -> String {
  CIRCLED_NUMBERS
    .get(index)
    .map(|g| g.to_string())
    .unwrap_or_else(|| (index + 1).to_string())
}

/// Label for the n-th (0-based) choice of a lettered block. Past the eighth
/// choice the 1-based number is used.
pub fn choice_label(index: usize) -> String {
  CHOICE_LABELS
    .get(index)
    .map(|l| l.to_string())
    .unwrap_or_else(|| (index + 1).to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceLayout {
  /// Two columns of bare labels (○ / ×).
  Grid,
  /// One column, each item prefixed with ・
  Bulleted,
  /// One column, each item as `[ item ]`.
  Bracketed,
  /// One column, each item prefixed with ア. イ. ウ. ...
  Lettered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSpace {
  Standard,
  Large,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChoiceItem {
  pub label: Option<String>,
  pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChoiceBlock {
  pub layout: ChoiceLayout,
  pub items: Vec<ChoiceItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StudentView {
  pub index: usize,
  pub glyph: String,
  pub question: String,
  pub choices: Option<ChoiceBlock>,
  pub answer_space: Option<AnswerSpace>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerView {
  pub glyph: String,
  pub answer: String,
  pub explanation: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedProblem {
  pub theme: String,
  pub student: StudentView,
  pub answer: AnswerView,
}

/// Render one problem at a 0-based position.
pub fn render(problem: &Problem, index: usize, color_theme: &str) -> RenderedProblem {
  let glyph = number_glyph(index);
  let choices = choice_block(problem);

  let mut answer_space = match (&problem.kind, &choices) {
    (ProblemType::Ordering, Some(_)) => Some(AnswerSpace::Standard),
    _ => None,
  };
  match problem.kind {
    ProblemType::OneAnswer | ProblemType::FillIn | ProblemType::ShortAnswer => {
      answer_space = Some(AnswerSpace::Standard);
    }
    ProblemType::Essay => answer_space = Some(AnswerSpace::Large),
    _ => {
      if choices.is_none() && answer_space.is_none() {
        answer_space = Some(AnswerSpace::Standard);
      }
    }
  }

  RenderedProblem {
    theme: color_theme.to_string(),
    student: StudentView {
      index,
      glyph: glyph.clone(),
      question: problem.question.clone(),
      choices,
      answer_space,
    },
    answer: AnswerView {
      glyph,
      answer: problem.answer.clone(),
      explanation: problem.explanation.clone().filter(|e| !e.is_empty()),
    },
  }
}

fn choice_block(problem: &Problem) -> Option<ChoiceBlock> {
  if problem.choices.is_empty() {
    return None;
  }
  let layout = match problem.kind {
    ProblemType::TrueFalse => ChoiceLayout::Grid,
    ProblemType::Matching => ChoiceLayout::Bulleted,
    ProblemType::Ordering => ChoiceLayout::Bracketed,
    _ => ChoiceLayout::Lettered,
  };
  let items = problem
    .choices
    .iter()
    .enumerate()
    .map(|(i, text)| ChoiceItem {
      label: (layout == ChoiceLayout::Lettered).then(|| choice_label(i)),
      text: text.clone(),
    })
    .collect();
  Some(ChoiceBlock { layout, items })
}

impl RenderedProblem {
  /// Markup for the student sheet, including the no-print edit controls.
  pub fn student_markup(&self) -> String {
    let s = &self.student;
    let i = s.index;
    let mut html = format!(
      "<div class=\"problem-item\" data-index=\"{i}\">\
<div class=\"problem-actions no-print\">\
<button class=\"problem-action-btn\" title=\"この問題を再生成\" data-action=\"regenerate_one\" data-index=\"{i}\">🔄</button>\
<button class=\"problem-action-btn\" title=\"上へ移動\" data-action=\"move_problem\" data-index=\"{i}\" data-direction=\"-1\">↑</button>\
<button class=\"problem-action-btn\" title=\"下へ移動\" data-action=\"move_problem\" data-index=\"{i}\" data-direction=\"1\">↓</button>\
<button class=\"problem-action-btn danger\" title=\"削除\" data-action=\"delete_problem\" data-index=\"{i}\">✕</button>\
</div>\
<div class=\"problem-header\"><span class=\"problem-number\">{glyph}</span>\
<div class=\"problem-question\" contenteditable=\"true\" data-index=\"{i}\">{question}</div></div>",
      glyph = escape_html(&s.glyph),
      question = escape_html(&s.question),
    );

    if let Some(block) = &s.choices {
      let style = match block.layout {
        ChoiceLayout::Grid => " style=\"grid-template-columns: 1fr 1fr;\"",
        ChoiceLayout::Bulleted | ChoiceLayout::Bracketed => " style=\"grid-template-columns: 1fr;\"",
        ChoiceLayout::Lettered => "",
      };
      html.push_str(&format!("<div class=\"problem-choices\"{}>", style));
      for item in &block.items {
        let text = escape_html(&item.text);
        let inner = match (block.layout, &item.label) {
          (ChoiceLayout::Grid, _) => format!("<span class=\"problem-choice-label\">{}</span>", text),
          (ChoiceLayout::Bulleted, _) => format!("・{}", text),
          (ChoiceLayout::Bracketed, _) => format!("[ {} ]", text),
          (ChoiceLayout::Lettered, label) => format!(
            "<span class=\"problem-choice-label\">{}.</span> {}",
            escape_html(label.as_deref().unwrap_or_default()),
            text
          ),
        };
        html.push_str(&format!("<div class=\"problem-choice\">{}</div>", inner));
      }
      html.push_str("</div>");
    }

    match s.answer_space {
      Some(AnswerSpace::Standard) => html.push_str("<div class=\"answer-space\"></div>"),
      Some(AnswerSpace::Large) => html.push_str("<div class=\"answer-space large\"></div>"),
      None => {}
    }
    html.push_str("</div>");
    html
  }

  /// Markup for the answer-key sheet.
  pub fn answer_markup(&self) -> String {
    let a = &self.answer;
    let explanation = a
      .explanation
      .as_deref()
      .map(|e| format!("<div class=\"answer-explanation\">📖 {}</div>", escape_html(e)))
      .unwrap_or_default();
    format!(
      "<div class=\"answer-item\"><div class=\"answer-header\">\
<span class=\"answer-number\">{}</span>\
<div class=\"answer-content\"><div class=\"answer-value\">答え：{}</div>{}</div></div></div>",
      escape_html(&a.glyph),
      escape_html(&a.answer),
      explanation
    )
  }
}

/// Which pages a render pass produces. Printing narrows to one side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
  Both,
  StudentOnly,
  AnswerOnly,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SheetHeader {
  pub school_name: String,
  pub teacher_name: String,
  pub title: String,
  pub grade: String,
  pub subject: String,
  pub difficulty: String,
}

/// A full render pass over the collection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedWorksheet {
  pub mode: ViewMode,
  pub theme: String,
  pub header: SheetHeader,
  pub problems: Vec<RenderedProblem>,
}

pub fn render_worksheet(req: &WorksheetRequest, problems: &[Problem], mode: ViewMode) -> RenderedWorksheet {
  RenderedWorksheet {
    mode,
    theme: req.color_theme.clone(),
    header: SheetHeader {
      school_name: req.school_name.clone(),
      teacher_name: format!("{} 先生", req.teacher_name),
      title: req.display_title(),
      grade: req.grade.clone(),
      subject: req.subject.map(|s| s.label().to_string()).unwrap_or_default(),
      difficulty: req.difficulty.map(|d| d.label().to_string()).unwrap_or_default(),
    },
    problems: problems
      .iter()
      .enumerate()
      .map(|(i, p)| render(p, i, &req.color_theme))
      .collect(),
  }
}

impl RenderedWorksheet {
  fn page(&self, id: &str, body: String) -> String {
    let h = &self.header;
    format!(
      "<div class=\"a4-page theme-{theme}\" id=\"{id}\">\
<div class=\"sheet-header\"><div class=\"sheet-school\">{school}</div>\
<div class=\"sheet-teacher\">{teacher}</div>\
<h1 class=\"sheet-title\">{title}</h1>\
<div class=\"sheet-meta\"><span>{grade}</span><span>{subject}</span><span>{difficulty}</span></div></div>\
{body}</div>",
      theme = escape_html(&self.theme),
      school = escape_html(&h.school_name),
      teacher = escape_html(&h.teacher_name),
      title = escape_html(&h.title),
      grade = escape_html(&h.grade),
      subject = escape_html(&h.subject),
      difficulty = escape_html(&h.difficulty),
    )
  }

  /// Student page markup, empty when the mode excludes it.
  pub fn student_html(&self) -> String {
    if self.mode == ViewMode::AnswerOnly {
      return String::new();
    }
    let body: String = self.problems.iter().map(RenderedProblem::student_markup).collect();
    self.page("studentPage", format!("<div id=\"problemsContainer\">{}</div>", body))
  }

  /// Answer-key page markup, empty when the mode excludes it.
  pub fn answer_html(&self) -> String {
    if self.mode == ViewMode::StudentOnly {
      return String::new();
    }
    let body: String = self.problems.iter().map(RenderedProblem::answer_markup).collect();
    self.page("answerPage", format!("<div id=\"answersContainer\">{}</div>", body))
  }
}

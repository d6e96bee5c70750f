//! Public protocol structs for the HTTP generation API and the wizard WebSocket.
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::collection::Direction;
use crate::domain::{Difficulty, Problem, ProblemType, Subject};
use crate::render::{RenderedWorksheet, ViewMode};
use crate::wizard::{TextField, WizardStep, WorksheetRequest};

//
// HTTP request/response DTOs (generation service)
//

/// Request fields are lenient: anything missing defaults, like a form post.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestTitleIn {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub theme: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestTitleOut {
    #[serde(default)]
    pub titles: Vec<String>,
}

fn default_count() -> u32 {
    5
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerateIn {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegenerateOneIn {
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub difficulty: String,
    #[serde(rename = "problemNumber", default = "first_problem")]
    pub problem_number: u32,
    #[serde(rename = "currentQuestion", default)]
    pub current_question: String,
}

fn first_problem() -> u32 {
    1
}

/// Successful `/api/generate` body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedWorksheet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub problems: Vec<Problem>,
}

/// Domain-level failure body shared by the generation endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//
// WebSocket: one wizard session per connection
//

/// User actions the wizard front-end sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Ask for a full `snapshot` (after a page reload).
    Sync,
    SetField {
        field: TextField,
        value: String,
    },
    SelectSubject {
        subject: Subject,
    },
    ToggleFormat {
        format: ProblemType,
    },
    SelectDifficulty {
        difficulty: Difficulty,
    },
    SelectCount {
        count: u32,
    },
    GoToStep {
        step: WizardStep,
    },
    SuggestTitles,
    SelectTitle {
        title: String,
    },
    Generate,
    RegenerateOne {
        index: usize,
    },
    RegenerateAll {
        #[serde(default)]
        confirmed: bool,
    },
    MoveProblem {
        index: usize,
        direction: Direction,
    },
    DeleteProblem {
        index: usize,
        #[serde(default)]
        confirmed: bool,
    },
    UpdateProblemText {
        index: usize,
        text: String,
    },
    ChangeColorTheme {
        theme: String,
    },
    Print {
        view: PrintView,
    },
    CreateAnother,
}

/// Which half of the worksheet goes to the printer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintView {
    Student,
    Answer,
}

impl PrintView {
    pub fn mode(self) -> ViewMode {
        match self {
            PrintView::Student => ViewMode::StudentOnly,
            PrintView::Answer => ViewMode::AnswerOnly,
        }
    }
}

/// Messages the server pushes back to the wizard front-end.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Snapshot {
        step: WizardStep,
        busy: bool,
        request: WorksheetRequest,
        /// Format chips in display order.
        format_choices: Vec<ProblemType>,
        title_suggestions: Vec<String>,
        problems: Vec<Problem>,
        #[serde(skip_serializing_if = "Option::is_none")]
        preview: Option<RenderedWorksheet>,
    },
    Toast {
        message: String,
    },
    Progress {
        active: bool,
    },
    Control {
        control: String,
        enabled: bool,
    },
    Step {
        step: WizardStep,
    },
    Preview {
        worksheet: RenderedWorksheet,
        student_html: String,
        answer_html: String,
    },
    TitleSuggestions {
        titles: Vec<String>,
    },
    Title {
        title: String,
    },
    Print {
        view: PrintView,
        html: String,
    },
    /// Ask the user; resend the same action with `confirmed: true` on yes.
    ConfirmRequired {
        message: String,
    },
    Error {
        message: String,
    },
}

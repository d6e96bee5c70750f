//! One wizard session: owns the worksheet request, the step machine and the
//! problem collection, and turns user actions into state changes plus UI events.
//!
//! Gateway calls are split in two halves so a session loop can keep serving
//! local edits while a request is out:
//!   - `begin` checks preconditions, refuses overlap, disables the triggering
//!     control and returns a `Ticket` with the prepared call
//!   - `complete` always restores the control, then applies the result unless
//!     the ticket went stale (reset, reordering, or a step back since it was issued)

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::collection::{DeleteError, Direction, ProblemCollection};
use crate::domain::{Difficulty, ProblemType, Subject};
use crate::gateway::{GatewayCall, GatewayError, Reply};
#[cfg(test)]
use crate::gateway::{dispatch, GenerationGateway};
use crate::protocol::{GenerateIn, GeneratedWorksheet, PrintView, RegenerateOneIn, SuggestTitleIn};
use crate::render::{render_worksheet, RenderedWorksheet, ViewMode};
use crate::wizard::{validate, StepMachine, TextField, WizardStep, WorksheetRequest};

const MSG_BUSY: &str = "処理中です。しばらくお待ちください";
const MSG_NEED_TOPIC: &str = "教科とテーマを先に入力してください";
const MSG_EMPTY_RESULT: &str = "問題を生成できませんでした。もう一度お試しください。";

/// A user-facing trigger that is disabled while its request is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
  SuggestTitle,
  Generate,
  RegenerateOne,
  RegenerateAll,
}

impl Control {
  pub fn name(self) -> &'static str {
    match self {
      Control::SuggestTitle => "suggest_title",
      Control::Generate => "generate",
      Control::RegenerateOne => "regenerate_one",
      Control::RegenerateAll => "regenerate_all",
    }
  }
}

/// Generation-class user actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
  SuggestTitles,
  Generate,
  RegenerateOne(usize),
  RegenerateAll,
}

impl Action {
  fn control(self) -> Control {
    match self {
      Action::SuggestTitles => Control::SuggestTitle,
      Action::Generate => Control::Generate,
      Action::RegenerateOne(_) => Control::RegenerateOne,
      Action::RegenerateAll => Control::RegenerateAll,
    }
  }

  /// Title suggestions only disable their button; the rest cover the page.
  fn shows_progress(self) -> bool {
    !matches!(self, Action::SuggestTitles)
  }

  fn transport_message(self) -> &'static str {
    match self {
      Action::SuggestTitles => "タイトル提案でエラーが発生しました",
      Action::Generate => "生成中にエラーが発生しました。もう一度お試しください。",
      Action::RegenerateOne(_) | Action::RegenerateAll => "再生成中にエラーが発生しました",
    }
  }
}

/// Proof of an in-flight request. Hand it back to `complete` exactly once.
#[derive(Debug)]
pub struct Ticket {
  id: u64,
  epoch: u64,
  step: WizardStep,
  action: Action,
}

/// What the presentation layer should show next.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
  Toast(String),
  Progress(bool),
  ControlEnabled { control: Control, enabled: bool },
  StepChanged(WizardStep),
  Preview(RenderedWorksheet),
  TitleSuggestions(Vec<String>),
  TitleChanged(String),
}

/// Side-effecting yes/no prompt.
pub trait Confirm: Send {
  fn confirm(&mut self, message: &str) -> bool;
}

impl<F: FnMut(&str) -> bool + Send> Confirm for F {
  fn confirm(&mut self, message: &str) -> bool { self(message) }
}

#[derive(Debug, Error)]
pub enum PrintError {
  #[error("印刷する問題がありません")]
  NothingToPrint,
  #[error("印刷できませんでした: {0}")]
  Failed(String),
}

/// External "send the review page to paper" capability.
pub trait Printer {
  fn print(&mut self, view: PrintView, sheet: &RenderedWorksheet) -> Result<(), PrintError>;
}

/// Sets the transient print mode and clears it on every exit path.
struct PrintModeGuard<'a> {
  slot: &'a mut Option<PrintView>,
}

impl<'a> PrintModeGuard<'a> {
  fn enter(slot: &'a mut Option<PrintView>, view: PrintView) -> Self {
    *slot = Some(view);
    Self { slot }
  }
}

impl Drop for PrintModeGuard<'_> {
  fn drop(&mut self) {
    *self.slot = None;
  }
}

#[derive(Debug, Default)]
pub struct WizardController {
  request: WorksheetRequest,
  steps: StepMachine,
  problems: ProblemCollection,
  title_suggestions: Vec<String>,
  preview: Option<RenderedWorksheet>,
  print_mode: Option<PrintView>,
  in_flight: Option<u64>,
  next_ticket: u64,
  epoch: u64,
  events: Vec<UiEvent>,
}

impl WizardController {
  pub fn new() -> Self { Self::default() }

  pub fn request(&self) -> &WorksheetRequest { &self.request }

  pub fn step(&self) -> WizardStep { self.steps.current() }

  /// Panel on screen: the review page while printing, else the current step.
  pub fn visible_step(&self) -> WizardStep {
    if self.print_mode.is_some() { WizardStep::Review } else { self.steps.current() }
  }

  pub fn problems(&self) -> &ProblemCollection { &self.problems }

  pub fn title_suggestions(&self) -> &[String] { &self.title_suggestions }

  /// Result of the last render pass.
  pub fn preview(&self) -> Option<&RenderedWorksheet> { self.preview.as_ref() }

  pub fn is_busy(&self) -> bool { self.in_flight.is_some() }

  pub fn drain_events(&mut self) -> Vec<UiEvent> { std::mem::take(&mut self.events) }

  fn toast(&mut self, message: impl Into<String>) {
    self.events.push(UiEvent::Toast(message.into()));
  }

  // --- form input ---

  pub fn set_field(&mut self, field: TextField, value: &str) {
    self.request.set_text(field, value);
  }

  pub fn select_subject(&mut self, subject: Subject) { self.request.select_subject(subject); }

  pub fn toggle_format(&mut self, format: ProblemType) -> bool { self.request.toggle_format(format) }

  pub fn select_difficulty(&mut self, difficulty: Difficulty) { self.request.select_difficulty(difficulty); }

  pub fn select_count(&mut self, count: u32) { self.request.select_count(count); }

  /// Pick one of the suggested titles and hide the suggestion list.
  pub fn select_title(&mut self, title: &str) {
    self.request.set_text(TextField::Title, title);
    self.title_suggestions.clear();
    self.events.push(UiEvent::TitleChanged(self.request.title.clone()));
  }

  pub fn change_color_theme(&mut self, theme: &str) {
    self.request.color_theme = theme.trim().to_string();
    if !self.problems.is_empty() {
      self.render_preview();
    }
  }

  // --- navigation ---

  /// Returns whether the step changed. Refusals surface the missing field.
  #[instrument(level = "debug", skip(self), fields(from = self.step().number()))]
  pub fn go_to_step(&mut self, target: WizardStep) -> bool {
    match self.steps.request_transition(target, &self.request) {
      Err(missing) => {
        self.toast(missing.to_string());
        false
      }
      Ok(step) => {
        info!(target: "wizard", step = step.number(), "Step changed");
        self.events.push(UiEvent::StepChanged(step));
        if step == WizardStep::Review && !self.problems.is_empty() {
          self.render_preview();
        }
        true
      }
    }
  }

  /// Clear problems and title, back to the first step. Outstanding tickets go stale.
  pub fn reset(&mut self) {
    self.problems.clear();
    self.request.title.clear();
    self.title_suggestions.clear();
    self.preview = None;
    self.epoch += 1;
    self.steps.reset();
    self.events.push(UiEvent::TitleChanged(String::new()));
    self.events.push(UiEvent::StepChanged(WizardStep::Identify));
  }

  pub fn create_another(&mut self) {
    self.reset();
    self.toast("新しいワークシートを作成できます");
  }

  // --- collection editing ---

  pub fn render_preview(&mut self) {
    let sheet = render_worksheet(&self.request, self.problems.as_slice(), ViewMode::Both);
    self.preview = Some(sheet.clone());
    self.events.push(UiEvent::Preview(sheet));
  }

  /// In-place question edit from the student sheet. No re-render.
  pub fn update_problem_text(&mut self, index: usize, text: &str) {
    if !self.problems.update_text(index, text) {
      debug!(target: "wizard", index, "Ignoring text edit for missing problem");
    }
  }

  pub fn move_problem(&mut self, index: usize, direction: Direction) {
    if self.problems.move_by(index, direction) {
      self.epoch += 1;
      self.render_preview();
      self.toast("問題の順番を変更しました");
    }
  }

  pub fn delete_problem(&mut self, index: usize, confirm: &mut dyn Confirm) {
    let result = self
      .problems
      .delete(index, |i| confirm.confirm(&format!("問題{}を削除しますか？", i + 1)));
    match result {
      Ok(_) => {
        self.epoch += 1;
        self.render_preview();
        self.toast("問題を削除しました");
      }
      Err(DeleteError::MinimumRequired) => self.toast(DeleteError::MinimumRequired.to_string()),
      Err(DeleteError::OutOfRange) | Err(DeleteError::Cancelled) => {}
    }
  }

  // --- generation ---

  fn generate_in(&self) -> GenerateIn {
    let r = &self.request;
    GenerateIn {
      grade: r.grade.clone(),
      subject: r.subject.map(|s| s.label().to_string()).unwrap_or_default(),
      theme: r.theme.clone(),
      notes: r.notes.clone(),
      formats: r.format_labels(),
      difficulty: r.difficulty.map(|d| d.label().to_string()).unwrap_or_default(),
      count: r.count,
    }
  }

  /// Check preconditions and claim the single in-flight slot.
  #[instrument(level = "debug", skip(self, confirm))]
  pub fn begin(&mut self, action: Action, confirm: &mut dyn Confirm) -> Option<(Ticket, GatewayCall)> {
    if self.in_flight.is_some() {
      self.toast(MSG_BUSY);
      return None;
    }

    let call = match action {
      Action::SuggestTitles => {
        let Some(subject) = self.request.subject.filter(|_| !self.request.theme.is_empty()) else {
          self.toast(MSG_NEED_TOPIC);
          return None;
        };
        GatewayCall::SuggestTitles(SuggestTitleIn {
          grade: self.request.grade.clone(),
          subject: subject.label().to_string(),
          theme: self.request.theme.clone(),
        })
      }
      Action::Generate => {
        if let Err(missing) = validate(WizardStep::Format, &self.request) {
          self.toast(missing.to_string());
          return None;
        }
        GatewayCall::Generate(self.generate_in())
      }
      Action::RegenerateOne(index) => {
        let current_question = self.problems.get(index)?.question.clone();
        let base = self.generate_in();
        GatewayCall::RegenerateOne(RegenerateOneIn {
          grade: base.grade,
          subject: base.subject,
          theme: base.theme,
          notes: base.notes,
          formats: base.formats,
          difficulty: base.difficulty,
          problem_number: index as u32 + 1,
          current_question,
        })
      }
      Action::RegenerateAll => {
        if !confirm.confirm("すべての問題を再生成しますか？") {
          return None;
        }
        GatewayCall::Generate(self.generate_in())
      }
    };

    self.next_ticket += 1;
    let ticket = Ticket { id: self.next_ticket, epoch: self.epoch, step: self.steps.current(), action };
    self.in_flight = Some(ticket.id);
    self.events.push(UiEvent::ControlEnabled { control: action.control(), enabled: false });
    if action.shows_progress() {
      self.events.push(UiEvent::Progress(true));
    }
    debug!(target: "wizard", ticket = ticket.id, epoch = ticket.epoch, ?action, "Request started");
    Some((ticket, call))
  }

  /// Release the in-flight slot and apply the result. Returns whether state changed.
  #[instrument(level = "debug", skip(self, ticket, result), fields(ticket = ticket.id, action = ?ticket.action))]
  pub fn complete(&mut self, ticket: Ticket, result: Result<Reply, GatewayError>) -> bool {
    if self.in_flight == Some(ticket.id) {
      self.in_flight = None;
    }
    if ticket.action.shows_progress() {
      self.events.push(UiEvent::Progress(false));
    }
    self.events.push(UiEvent::ControlEnabled { control: ticket.action.control(), enabled: true });

    if ticket.epoch != self.epoch {
      info!(target: "wizard", ticket = ticket.id, "Discarding response issued before a reset or reorder");
      return false;
    }
    if self.steps.current() < ticket.step {
      info!(target: "wizard", ticket = ticket.id, issued_at = ticket.step.number(), now_at = self.steps.current().number(), "Discarding response issued on a later step");
      return false;
    }

    let reply = match result {
      Ok(reply) => reply,
      Err(GatewayError::Domain(message)) => {
        self.toast(message);
        return false;
      }
      Err(GatewayError::Transport(e)) => {
        warn!(target: "wizard", error = %e, "Generation request failed in transport");
        self.toast(ticket.action.transport_message());
        return false;
      }
    };

    match (ticket.action, reply) {
      (Action::SuggestTitles, Reply::Titles(titles)) => {
        if titles.is_empty() {
          return false;
        }
        self.adopt_title(titles.first().map(String::as_str));
        self.title_suggestions = titles.clone();
        self.events.push(UiEvent::TitleSuggestions(titles));
        true
      }
      (Action::Generate, Reply::Worksheet(sheet)) => {
        if !self.accept_worksheet(sheet) {
          return false;
        }
        if !self.go_to_step(WizardStep::Review) {
          self.render_preview();
        }
        true
      }
      (Action::RegenerateAll, Reply::Worksheet(sheet)) => {
        if !self.accept_worksheet(sheet) {
          return false;
        }
        self.render_preview();
        self.toast("すべての問題を再生成しました");
        true
      }
      (Action::RegenerateOne(index), Reply::Problem(problem)) => {
        if !self.problems.replace_one(index, problem) {
          return false;
        }
        self.render_preview();
        self.toast(format!("問題{}を再生成しました", index + 1));
        true
      }
      (action, _) => {
        warn!(target: "wizard", ?action, "Gateway answered with a reply of the wrong kind");
        self.toast(action.transport_message());
        false
      }
    }
  }

  fn adopt_title(&mut self, suggested: Option<&str>) {
    if !self.request.title.is_empty() {
      return;
    }
    if let Some(title) = suggested.map(str::trim).filter(|t| !t.is_empty()) {
      self.request.title = title.to_string();
      self.events.push(UiEvent::TitleChanged(self.request.title.clone()));
    }
  }

  fn accept_worksheet(&mut self, sheet: GeneratedWorksheet) -> bool {
    if sheet.problems.is_empty() {
      self.toast(MSG_EMPTY_RESULT);
      return false;
    }
    self.problems.replace_all(sheet.problems);
    info!(target: "wizard", problems = self.problems.len(), "Collection replaced");
    self.epoch += 1;
    self.adopt_title(sheet.title.as_deref());
    true
  }

  // --- printing ---

  /// Print one half of the worksheet. The print mode is reverted even when
  /// the printer fails.
  #[instrument(level = "info", skip(self, printer))]
  pub fn print(&mut self, view: PrintView, printer: &mut dyn Printer) -> Result<(), PrintError> {
    if self.problems.is_empty() {
      self.toast(PrintError::NothingToPrint.to_string());
      return Err(PrintError::NothingToPrint);
    }

    let result = {
      let _mode = PrintModeGuard::enter(&mut self.print_mode, view);
      let sheet = render_worksheet(&self.request, self.problems.as_slice(), view.mode());
      printer.print(view, &sheet)
    };

    match &result {
      Ok(()) => info!(target: "wizard", ?view, "Worksheet sent to printer"),
      Err(e) => {
        warn!(target: "wizard", ?view, error = %e, "Printing failed");
        self.toast(e.to_string());
      }
    }
    result
  }
}

#[cfg(test)]
impl WizardController {
  /// `begin`, await the gateway, `complete`.
  pub async fn run<G>(&mut self, gateway: &G, action: Action, confirm: &mut dyn Confirm) -> bool
  where
    G: GenerationGateway + ?Sized,
  {
    let Some((ticket, call)) = self.begin(action, confirm) else {
      return false;
    };
    let result = dispatch(gateway, call).await;
    self.complete(ticket, result)
  }

  pub async fn suggest_titles<G: GenerationGateway + ?Sized>(&mut self, gateway: &G) -> bool {
    self.run(gateway, Action::SuggestTitles, &mut |_: &str| true).await
  }

  pub async fn generate<G: GenerationGateway + ?Sized>(&mut self, gateway: &G) -> bool {
    self.run(gateway, Action::Generate, &mut |_: &str| true).await
  }

  pub async fn regenerate_one<G: GenerationGateway + ?Sized>(&mut self, gateway: &G, index: usize) -> bool {
    self.run(gateway, Action::RegenerateOne(index), &mut |_: &str| true).await
  }

  pub async fn regenerate_all<G: GenerationGateway + ?Sized>(&mut self, gateway: &G, confirm: &mut dyn Confirm) -> bool {
    self.run(gateway, Action::RegenerateAll, confirm).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Problem;
  use crate::render::{AnswerSpace, ChoiceLayout};
  use async_trait::async_trait;
  use std::sync::Mutex;

  struct FakeGateway {
    titles: Result<Vec<String>, GatewayError>,
    worksheet: Result<GeneratedWorksheet, GatewayError>,
    problem: Result<Problem, GatewayError>,
    calls: Mutex<Vec<GatewayCall>>,
  }

  impl FakeGateway {
    fn new() -> Self {
      Self {
        titles: Ok(vec![]),
        worksheet: Ok(GeneratedWorksheet::default()),
        problem: Err(GatewayError::Domain("unused".into())),
        calls: Mutex::new(vec![]),
      }
    }

    fn calls(&self) -> Vec<GatewayCall> { self.calls.lock().unwrap().clone() }
  }

  #[async_trait]
  impl GenerationGateway for FakeGateway {
    async fn suggest_titles(&self, req: &SuggestTitleIn) -> Result<Vec<String>, GatewayError> {
      self.calls.lock().unwrap().push(GatewayCall::SuggestTitles(req.clone()));
      self.titles.clone()
    }
    async fn generate_problems(&self, req: &GenerateIn) -> Result<GeneratedWorksheet, GatewayError> {
      self.calls.lock().unwrap().push(GatewayCall::Generate(req.clone()));
      self.worksheet.clone()
    }
    async fn regenerate_problem(&self, req: &RegenerateOneIn) -> Result<Problem, GatewayError> {
      self.calls.lock().unwrap().push(GatewayCall::RegenerateOne(req.clone()));
      self.problem.clone()
    }
  }

  fn choice_problem(i: usize) -> Problem {
    Problem::new(ProblemType::from_label("選択式"), format!("問題{}", i), "ア")
      .with_choices(["ア案", "イ案", "ウ案", "エ案"])
  }

  fn five_choice_sheet() -> GeneratedWorksheet {
    GeneratedWorksheet { title: Some("AIのタイトル".into()), problems: (0..5).map(choice_problem).collect() }
  }

  /// Steps 1-3 filled, sitting on the format step.
  fn at_format_step() -> WizardController {
    let mut c = WizardController::new();
    c.set_field(TextField::SchoolName, "みどり小学校");
    c.set_field(TextField::TeacherName, "佐藤");
    c.set_field(TextField::Grade, "小学6年");
    assert!(c.go_to_step(WizardStep::Topic));
    c.select_subject(Subject::SocialStudies);
    c.set_field(TextField::Theme, "江戸時代");
    assert!(c.go_to_step(WizardStep::Format));
    c.toggle_format(ProblemType::from_label("選択式"));
    c.select_difficulty(Difficulty::Standard);
    c.select_count(5);
    c.drain_events();
    c
  }

  async fn generated() -> WizardController {
    let mut c = at_format_step();
    let mut gw = FakeGateway::new();
    gw.worksheet = Ok(five_choice_sheet());
    assert!(c.generate(&gw).await);
    c.drain_events();
    c
  }

  fn toasts(events: &[UiEvent]) -> Vec<String> {
    events
      .iter()
      .filter_map(|e| match e {
        UiEvent::Toast(m) => Some(m.clone()),
        _ => None,
      })
      .collect()
  }

  fn numbers(c: &WizardController) -> Vec<u32> {
    c.problems().iter().map(|p| p.number).collect()
  }

  #[test]
  fn forward_step_with_missing_field_reports_and_stays() {
    let mut c = WizardController::new();
    c.set_field(TextField::SchoolName, "みどり小学校");
    assert!(!c.go_to_step(WizardStep::Topic));
    assert_eq!(c.step(), WizardStep::Identify);
    assert_eq!(toasts(&c.drain_events()), vec!["先生のお名前を入力してください".to_string()]);
  }

  #[tokio::test]
  async fn generate_populates_collection_and_enters_review() {
    let mut c = at_format_step();
    let mut gw = FakeGateway::new();
    gw.worksheet = Ok(five_choice_sheet());

    assert!(c.generate(&gw).await);
    assert_eq!(c.step(), WizardStep::Review);
    assert_eq!(numbers(&c), vec![1, 2, 3, 4, 5]);
    assert_eq!(c.request().title, "AIのタイトル");
    assert!(!c.is_busy());

    let preview = c.preview().unwrap();
    assert_eq!(preview.problems.len(), 5);
    for p in &preview.problems {
      assert_eq!(p.student.choices.as_ref().map(|b| b.layout), Some(ChoiceLayout::Lettered));
      assert_eq!(p.student.answer_space, None::<AnswerSpace>);
    }

    match &gw.calls()[..] {
      [GatewayCall::Generate(req)] => {
        assert_eq!(req.formats, vec!["選択問題".to_string()]);
        assert_eq!(req.difficulty, "標準");
        assert_eq!(req.count, 5);
        assert_eq!(req.subject, "社会");
      }
      other => panic!("unexpected calls: {:?}", other),
    }

    let events = c.drain_events();
    assert_eq!(events.first(), Some(&UiEvent::ControlEnabled { control: Control::Generate, enabled: false }));
    assert!(events.contains(&UiEvent::Progress(true)));
    assert!(events.contains(&UiEvent::Progress(false)));
    assert!(events.contains(&UiEvent::ControlEnabled { control: Control::Generate, enabled: true }));
    assert!(events.contains(&UiEvent::StepChanged(WizardStep::Review)));
    assert_eq!(events.iter().filter(|e| matches!(e, UiEvent::Preview(_))).count(), 1);
  }

  #[tokio::test]
  async fn generate_keeps_user_title() {
    let mut c = at_format_step();
    c.set_field(TextField::Title, "江戸のくらし");
    let mut gw = FakeGateway::new();
    gw.worksheet = Ok(five_choice_sheet());
    assert!(c.generate(&gw).await);
    assert_eq!(c.request().title, "江戸のくらし");
  }

  #[tokio::test]
  async fn domain_error_leaves_state_untouched() {
    let mut c = at_format_step();
    let mut gw = FakeGateway::new();
    gw.worksheet = Err(GatewayError::Domain("生成中にエラーが発生しました: quota".into()));

    assert!(!c.generate(&gw).await);
    assert!(c.problems().is_empty());
    assert_eq!(c.step(), WizardStep::Format);
    assert!(!c.is_busy());
    let events = c.drain_events();
    assert_eq!(toasts(&events), vec!["生成中にエラーが発生しました: quota".to_string()]);
    assert!(events.contains(&UiEvent::Progress(false)));
  }

  #[tokio::test]
  async fn transport_error_shows_generic_message_and_restores_control() {
    let mut c = generated().await;
    let mut gw = FakeGateway::new();
    gw.problem = Err(GatewayError::Transport("connection reset".into()));
    let before = c.problems().clone();

    assert!(!c.regenerate_one(&gw, 1).await);
    assert_eq!(c.problems(), &before);
    let events = c.drain_events();
    assert_eq!(toasts(&events), vec!["再生成中にエラーが発生しました".to_string()]);
    assert!(events.contains(&UiEvent::ControlEnabled { control: Control::RegenerateOne, enabled: true }));
    assert!(!c.is_busy());
  }

  #[tokio::test]
  async fn empty_problem_list_is_refused() {
    let mut c = at_format_step();
    let gw = FakeGateway::new();
    assert!(!c.generate(&gw).await);
    assert!(c.problems().is_empty());
    assert_eq!(c.step(), WizardStep::Format);
    assert_eq!(toasts(&c.drain_events()), vec![MSG_EMPTY_RESULT.to_string()]);
  }

  #[tokio::test]
  async fn generate_validates_format_step_first() {
    let mut c = at_format_step();
    c.toggle_format(ProblemType::MultipleChoice);
    let gw = FakeGateway::new();
    assert!(!c.generate(&gw).await);
    assert!(gw.calls().is_empty());
    assert_eq!(toasts(&c.drain_events()), vec!["問題形式を1つ以上選んでください".to_string()]);
  }

  #[tokio::test]
  async fn regenerate_one_replaces_only_that_slot() {
    let mut c = generated().await;
    let before = c.problems().clone();
    let mut gw = FakeGateway::new();
    gw.problem = Ok(Problem::new(ProblemType::TrueFalse, "新しい問題", "○").with_choices(["○", "×"]));

    assert!(c.regenerate_one(&gw, 2).await);
    assert_eq!(numbers(&c), vec![1, 2, 3, 4, 5]);
    assert_eq!(c.problems().get(2).map(|p| p.question.as_str()), Some("新しい問題"));
    for i in [0, 1, 3, 4] {
      assert_eq!(c.problems().get(i), before.get(i));
    }
    match &gw.calls()[..] {
      [GatewayCall::RegenerateOne(req)] => {
        assert_eq!(req.problem_number, 3);
        assert_eq!(req.current_question, "問題2");
      }
      other => panic!("unexpected calls: {:?}", other),
    }
    assert_eq!(toasts(&c.drain_events()), vec!["問題3を再生成しました".to_string()]);

    let tf = &c.preview().unwrap().problems[2];
    assert_eq!(tf.student.choices.as_ref().map(|b| b.layout), Some(ChoiceLayout::Grid));
    assert_eq!(tf.student.answer_space, None);
  }

  #[tokio::test]
  async fn regenerate_one_out_of_range_is_silent() {
    let mut c = generated().await;
    let gw = FakeGateway::new();
    assert!(!c.regenerate_one(&gw, 9).await);
    assert!(gw.calls().is_empty());
    assert!(c.drain_events().is_empty());
  }

  #[tokio::test]
  async fn regenerate_all_needs_confirmation() {
    let mut c = generated().await;
    let mut gw = FakeGateway::new();
    gw.worksheet = Ok(GeneratedWorksheet { title: None, problems: (10..13).map(choice_problem).collect() });

    assert!(!c.regenerate_all(&gw, &mut |_: &str| false).await);
    assert!(gw.calls().is_empty());
    assert_eq!(c.problems().len(), 5);

    let mut asked = Vec::new();
    assert!(c.regenerate_all(&gw, &mut |m: &str| { asked.push(m.to_string()); true }).await);
    assert_eq!(asked, vec!["すべての問題を再生成しますか？".to_string()]);
    assert_eq!(numbers(&c), vec![1, 2, 3]);
    assert_eq!(c.step(), WizardStep::Review);
    assert!(toasts(&c.drain_events()).contains(&"すべての問題を再生成しました".to_string()));
  }

  #[test]
  fn overlapping_request_is_rejected() {
    let mut c = at_format_step();
    let (ticket, _call) = c.begin(Action::Generate, &mut |_: &str| true).unwrap();
    assert!(c.is_busy());
    assert!(c.begin(Action::SuggestTitles, &mut |_: &str| true).is_none());
    assert_eq!(toasts(&c.drain_events()), vec![MSG_BUSY.to_string()]);

    c.complete(ticket, Err(GatewayError::Transport("timeout".into())));
    assert!(!c.is_busy());
    assert!(c.begin(Action::SuggestTitles, &mut |_: &str| true).is_some());
  }

  #[tokio::test]
  async fn response_after_reorder_is_discarded() {
    let mut c = generated().await;
    let (ticket, call) = c.begin(Action::RegenerateOne(2), &mut |_: &str| true).unwrap();
    assert!(matches!(call, GatewayCall::RegenerateOne(_)));

    c.move_problem(2, Direction::Up);
    let after_move = c.problems().clone();
    let applied = c.complete(ticket, Ok(Reply::Problem(Problem::new(ProblemType::Essay, "遅れた応答", "x"))));

    assert!(!applied);
    assert_eq!(c.problems(), &after_move);
    assert!(!c.is_busy());
  }

  #[test]
  fn response_after_reset_is_discarded() {
    let mut c = at_format_step();
    let (ticket, _) = c.begin(Action::Generate, &mut |_: &str| true).unwrap();
    c.create_another();
    assert_eq!(c.step(), WizardStep::Identify);

    assert!(!c.complete(ticket, Ok(Reply::Worksheet(five_choice_sheet()))));
    assert!(c.problems().is_empty());
    assert_eq!(c.step(), WizardStep::Identify);
    assert!(c.request().title.is_empty());
  }

  #[test]
  fn response_after_stepping_back_is_discarded() {
    let mut c = at_format_step();
    let (ticket, _) = c.begin(Action::Generate, &mut |_: &str| true).unwrap();
    assert!(c.go_to_step(WizardStep::Identify));
    c.drain_events();

    assert!(!c.complete(ticket, Ok(Reply::Worksheet(five_choice_sheet()))));
    assert!(c.problems().is_empty());
    assert_eq!(c.step(), WizardStep::Identify);
    assert!(!c.is_busy());
    assert!(c.drain_events().contains(&UiEvent::Progress(false)));
  }

  #[tokio::test]
  async fn response_on_same_or_later_step_still_applies() {
    let mut c = generated().await;
    let mut gw = FakeGateway::new();
    gw.problem = Ok(Problem::new(ProblemType::Essay, "新しい問題", "自由"));
    let (ticket, call) = c.begin(Action::RegenerateOne(1), &mut |_: &str| true).unwrap();
    assert!(c.go_to_step(WizardStep::Done));

    let result = dispatch(&gw, call).await;
    assert!(c.complete(ticket, result));
    assert_eq!(c.problems().get(1).map(|p| p.question.as_str()), Some("新しい問題"));
    assert_eq!(numbers(&c), vec![1, 2, 3, 4, 5]);
  }

  #[tokio::test]
  async fn title_suggestions_need_subject_and_theme() {
    let mut c = WizardController::new();
    let mut gw = FakeGateway::new();
    gw.titles = Ok(vec!["江戸たんけん".into(), "江戸のひみつ".into()]);
    assert!(!c.suggest_titles(&gw).await);
    assert_eq!(toasts(&c.drain_events()), vec![MSG_NEED_TOPIC.to_string()]);

    let mut c = at_format_step();
    assert!(c.suggest_titles(&gw).await);
    assert_eq!(c.title_suggestions(), ["江戸たんけん".to_string(), "江戸のひみつ".to_string()]);
    assert_eq!(c.request().title, "江戸たんけん");
    let events = c.drain_events();
    assert!(!events.contains(&UiEvent::Progress(true)));

    c.select_title("江戸のひみつ");
    assert_eq!(c.request().title, "江戸のひみつ");
    assert!(c.title_suggestions().is_empty());
  }

  #[tokio::test]
  async fn empty_suggestions_are_not_an_error() {
    let mut c = at_format_step();
    let gw = FakeGateway::new();
    assert!(!c.suggest_titles(&gw).await);
    assert!(toasts(&c.drain_events()).is_empty());
    assert!(c.request().title.is_empty());
  }

  #[tokio::test]
  async fn delete_guards_minimum_and_confirms() {
    let mut c = at_format_step();
    let mut gw = FakeGateway::new();
    gw.worksheet = Ok(GeneratedWorksheet { title: None, problems: vec![choice_problem(0)] });
    assert!(c.generate(&gw).await);
    c.drain_events();

    let mut asked = false;
    c.delete_problem(0, &mut |_: &str| { asked = true; true });
    assert!(!asked);
    assert_eq!(c.problems().len(), 1);
    assert_eq!(toasts(&c.drain_events()), vec!["最低1問は必要です".to_string()]);

    let mut c = generated().await;
    c.delete_problem(1, &mut |_: &str| false);
    assert_eq!(c.problems().len(), 5);
    assert!(c.drain_events().is_empty());

    let mut prompt = String::new();
    c.delete_problem(1, &mut |m: &str| { prompt = m.to_string(); true });
    assert_eq!(prompt, "問題2を削除しますか？");
    assert_eq!(numbers(&c), vec![1, 2, 3, 4]);
    assert_eq!(toasts(&c.drain_events()), vec!["問題を削除しました".to_string()]);
  }

  #[tokio::test]
  async fn move_rerenders_and_text_edit_does_not() {
    let mut c = generated().await;
    c.update_problem_text(0, "書きかえた問題");
    assert_eq!(c.problems().get(0).map(|p| p.question.as_str()), Some("書きかえた問題"));
    assert!(c.drain_events().is_empty());

    c.move_problem(0, Direction::Up);
    assert!(c.drain_events().is_empty());

    c.move_problem(0, Direction::Down);
    assert_eq!(c.problems().get(1).map(|p| p.question.as_str()), Some("書きかえた問題"));
    let events = c.drain_events();
    assert!(events.iter().any(|e| matches!(e, UiEvent::Preview(_))));
    assert_eq!(toasts(&events), vec!["問題の順番を変更しました".to_string()]);
  }

  #[tokio::test]
  async fn returning_to_review_renders_again() {
    let mut c = generated().await;
    assert!(c.go_to_step(WizardStep::Done));
    assert!(c.go_to_step(WizardStep::Format));
    c.drain_events();
    assert!(c.go_to_step(WizardStep::Review));
    assert!(c.drain_events().iter().any(|e| matches!(e, UiEvent::Preview(_))));

    c.change_color_theme("pop");
    assert_eq!(c.preview().map(|p| p.theme.as_str()), Some("pop"));
  }

  struct RecordingPrinter {
    fail: bool,
    jobs: Vec<(PrintView, ViewMode)>,
  }

  impl Printer for RecordingPrinter {
    fn print(&mut self, view: PrintView, sheet: &RenderedWorksheet) -> Result<(), PrintError> {
      self.jobs.push((view, sheet.mode));
      if self.fail { Err(PrintError::Failed("no printer".into())) } else { Ok(()) }
    }
  }

  #[tokio::test]
  async fn print_mode_reverts_even_on_failure() {
    let mut c = generated().await;
    assert!(c.go_to_step(WizardStep::Done));

    let mut printer = RecordingPrinter { fail: false, jobs: vec![] };
    c.print(PrintView::Student, &mut printer).unwrap();
    c.print(PrintView::Answer, &mut printer).unwrap();
    assert_eq!(printer.jobs, vec![(PrintView::Student, ViewMode::StudentOnly), (PrintView::Answer, ViewMode::AnswerOnly)]);
    assert_eq!(c.print_mode, None);
    assert_eq!(c.visible_step(), WizardStep::Done);

    let mut broken = RecordingPrinter { fail: true, jobs: vec![] };
    assert!(c.print(PrintView::Answer, &mut broken).is_err());
    assert_eq!(c.print_mode, None);
    assert_eq!(c.visible_step(), WizardStep::Done);
    assert_eq!(toasts(&c.drain_events()), vec!["印刷できませんでした: no printer".to_string()]);
  }

  #[test]
  fn printing_nothing_is_refused() {
    let mut c = WizardController::new();
    let mut printer = RecordingPrinter { fail: false, jobs: vec![] };
    assert!(matches!(c.print(PrintView::Student, &mut printer), Err(PrintError::NothingToPrint)));
    assert!(printer.jobs.is_empty());
  }

  #[tokio::test]
  async fn create_another_clears_collection_and_title() {
    let mut c = generated().await;
    c.create_another();
    assert!(c.problems().is_empty());
    assert!(c.request().title.is_empty());
    assert_eq!(c.step(), WizardStep::Identify);
    assert_eq!(c.request().school_name, "みどり小学校");
    assert!(toasts(&c.drain_events()).contains(&"新しいワークシートを作成できます".to_string()));
  }
}

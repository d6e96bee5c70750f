//! WebSocket upgrade + wizard session loop. Each connection owns one
//! `WizardController`; client messages are user actions, and everything the
//! controller emits goes back as JSON messages.
//!
//! A generation request stays in flight while the loop keeps reading the socket,
//! so local edits (reorder, delete, text) are served immediately.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::controller::{Action, Confirm, PrintError, Printer, Ticket, UiEvent, WizardController};
use crate::gateway::{dispatch, GatewayError, GenerationGateway, Reply, ServiceGateway};
use crate::domain::ProblemType;
use crate::protocol::{ClientWsMessage, PrintView, ServerWsMessage};
use crate::render::RenderedWorksheet;
use crate::state::AppState;

type ReplyFuture = Pin<Box<dyn Future<Output = Result<Reply, GatewayError>> + Send>>;

/// A gateway call the session is waiting on.
struct InFlight {
  ticket: Ticket,
  reply: ReplyFuture,
}

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let session = Uuid::new_v4();
  info!(target: "worksheet_backend", %session, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, Session::new(session, state)))
}

#[instrument(level = "info", skip(socket, session), fields(session = %session.id))]
async fn handle_ws(mut socket: WebSocket, mut session: Session) {
  info!(target: "worksheet_backend", "WebSocket connected");
  let mut inflight: Option<InFlight> = None;
  let mut outgoing = vec![session.snapshot()];

  loop {
    for msg in outgoing.drain(..) {
      let out = serde_json::to_string(&msg).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
      });
      if let Err(e) = socket.send(Message::Text(out)).await {
        error!(target: "worksheet_backend", error = %e, "WS send error");
        return;
      }
    }

    outgoing = tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(action) => {
              debug!(target: "worksheet_backend", "WS received: {:?}", &action);
              let (out, started) = session.handle(action);
              if let Some(started) = started {
                inflight = Some(started);
              }
              out
            }
            Err(e) => vec![ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) }],
          },
          Message::Ping(payload) => {
            let _ = socket.send(Message::Pong(payload)).await;
            continue;
          }
          Message::Close(_) => break,
          _ => continue,
        }
      }
      result = next_reply(&mut inflight), if inflight.is_some() => {
        match inflight.take() {
          Some(done) => session.finish(done.ticket, result),
          None => continue,
        }
      }
    };
  }
  info!(target: "worksheet_backend", "WebSocket disconnected");
}

async fn next_reply(inflight: &mut Option<InFlight>) -> Result<Reply, GatewayError> {
  match inflight {
    Some(f) => f.reply.as_mut().await,
    None => std::future::pending().await,
  }
}

/// Records the prompt when the client has not confirmed yet.
struct ClientConfirm {
  confirmed: bool,
  asked: Option<String>,
}

impl ClientConfirm {
  fn new(confirmed: bool) -> Self { Self { confirmed, asked: None } }

  fn into_message(self) -> Option<ServerWsMessage> {
    self.asked.map(|message| ServerWsMessage::ConfirmRequired { message })
  }
}

impl Confirm for ClientConfirm {
  fn confirm(&mut self, message: &str) -> bool {
    if !self.confirmed {
      self.asked = Some(message.to_string());
    }
    self.confirmed
  }
}

/// Hands the rendered page to the browser, which owns the actual print dialog.
struct SocketPrinter<'a> {
  out: &'a mut Vec<ServerWsMessage>,
}

impl Printer for SocketPrinter<'_> {
  fn print(&mut self, view: PrintView, sheet: &RenderedWorksheet) -> Result<(), PrintError> {
    let html = match view {
      PrintView::Student => sheet.student_html(),
      PrintView::Answer => sheet.answer_html(),
    };
    if html.is_empty() {
      return Err(PrintError::Failed("empty page".into()));
    }
    self.out.push(ServerWsMessage::Print { view, html });
    Ok(())
  }
}

/// One wizard per connection.
struct Session {
  id: Uuid,
  wizard: WizardController,
  gateway: Arc<dyn GenerationGateway>,
}

impl Session {
  fn new(id: Uuid, state: Arc<AppState>) -> Self {
    let gateway: Arc<dyn GenerationGateway> = match &state.remote_generation {
      Some(remote) => Arc::new(remote.clone()),
      None => Arc::new(ServiceGateway::new(state.clone())),
    };
    Self { id, wizard: WizardController::new(), gateway }
  }

  fn snapshot(&self) -> ServerWsMessage {
    let w = &self.wizard;
    ServerWsMessage::Snapshot {
      step: w.visible_step(),
      busy: w.is_busy(),
      request: w.request().clone(),
      format_choices: ProblemType::KNOWN.to_vec(),
      title_suggestions: w.title_suggestions().to_vec(),
      problems: w.problems().iter().cloned().collect(),
      preview: w.preview().cloned(),
    }
  }

  /// Apply one client action. Returns the messages to send and, for
  /// generation actions, the call to wait on.
  fn handle(&mut self, msg: ClientWsMessage) -> (Vec<ServerWsMessage>, Option<InFlight>) {
    let mut out = Vec::new();
    let mut started = None;
    let w = &mut self.wizard;

    match msg {
      ClientWsMessage::Ping => out.push(ServerWsMessage::Pong),
      ClientWsMessage::Sync => out.push(self.snapshot()),
      ClientWsMessage::SetField { field, value } => w.set_field(field, &value),
      ClientWsMessage::SelectSubject { subject } => w.select_subject(subject),
      ClientWsMessage::ToggleFormat { format } => {
        w.toggle_format(format);
      }
      ClientWsMessage::SelectDifficulty { difficulty } => w.select_difficulty(difficulty),
      ClientWsMessage::SelectCount { count } => w.select_count(count),
      ClientWsMessage::GoToStep { step } => {
        w.go_to_step(step);
      }
      ClientWsMessage::SelectTitle { title } => w.select_title(&title),
      ClientWsMessage::SuggestTitles => started = self.start(Action::SuggestTitles, &mut out, true),
      ClientWsMessage::Generate => started = self.start(Action::Generate, &mut out, true),
      ClientWsMessage::RegenerateOne { index } => started = self.start(Action::RegenerateOne(index), &mut out, true),
      ClientWsMessage::RegenerateAll { confirmed } => started = self.start(Action::RegenerateAll, &mut out, confirmed),
      ClientWsMessage::MoveProblem { index, direction } => w.move_problem(index, direction),
      ClientWsMessage::DeleteProblem { index, confirmed } => {
        let mut confirm = ClientConfirm::new(confirmed);
        w.delete_problem(index, &mut confirm);
        out.extend(confirm.into_message());
      }
      ClientWsMessage::UpdateProblemText { index, text } => w.update_problem_text(index, &text),
      ClientWsMessage::ChangeColorTheme { theme } => w.change_color_theme(&theme),
      ClientWsMessage::Print { view } => {
        let mut printer = SocketPrinter { out: &mut out };
        if let Err(e) = w.print(view, &mut printer) {
          debug!(target: "wizard", session = %self.id, error = %e, "Print request not fulfilled");
        }
      }
      ClientWsMessage::CreateAnother => w.create_another(),
    }

    let mut events = self.events();
    events.append(&mut out);
    (events, started)
  }

  fn start(&mut self, action: Action, out: &mut Vec<ServerWsMessage>, confirmed: bool) -> Option<InFlight> {
    let mut confirm = ClientConfirm::new(confirmed);
    let begun = self.wizard.begin(action, &mut confirm);
    out.extend(confirm.into_message());

    let (ticket, call) = begun?;
    let gateway = Arc::clone(&self.gateway);
    let reply: ReplyFuture = Box::pin(async move { dispatch(&*gateway, call).await });
    Some(InFlight { ticket, reply })
  }

  fn finish(&mut self, ticket: Ticket, result: Result<Reply, GatewayError>) -> Vec<ServerWsMessage> {
    if let Err(e) = &result {
      warn!(target: "wizard", session = %self.id, error = %e, "Generation request failed");
    }
    self.wizard.complete(ticket, result);
    self.events()
  }

  fn events(&mut self) -> Vec<ServerWsMessage> {
    self.wizard.drain_events().into_iter().map(to_server_message).collect()
  }
}

fn to_server_message(event: UiEvent) -> ServerWsMessage {
  match event {
    UiEvent::Toast(message) => ServerWsMessage::Toast { message },
    UiEvent::Progress(active) => ServerWsMessage::Progress { active },
    UiEvent::ControlEnabled { control, enabled } => ServerWsMessage::Control { control: control.name().to_string(), enabled },
    UiEvent::StepChanged(step) => ServerWsMessage::Step { step },
    UiEvent::Preview(worksheet) => {
      let student_html = worksheet.student_html();
      let answer_html = worksheet.answer_html();
      ServerWsMessage::Preview { worksheet, student_html, answer_html }
    }
    UiEvent::TitleSuggestions(titles) => ServerWsMessage::TitleSuggestions { titles },
    UiEvent::TitleChanged(title) => ServerWsMessage::Title { title },
  }
}

//! The contract the wizard core uses to reach the generation service, and its
//! two implementations:
//!   - `ServiceGateway`: in-process, calls the generation logic directly
//!     (used by WebSocket wizard sessions)
//!   - `HttpGateway`: talks to a remote `/api/...` deployment over HTTP
//!
//! A `{error}` body is a domain failure. Anything that prevents getting a body
//! at all (network, non-JSON) is a transport failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::Problem;
use crate::generation;
use crate::protocol::{GenerateIn, GeneratedWorksheet, RegenerateOneIn, SuggestTitleIn, SuggestTitleOut};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GatewayError {
  /// The service answered with `{error: ...}`.
  #[error("{0}")]
  Domain(String),
  /// No usable answer: connection, timeout or undecodable body.
  #[error("transport failure: {0}")]
  Transport(String),
}

#[async_trait]
pub trait GenerationGateway: Send + Sync {
  /// Empty means "no suggestions", not an error.
  async fn suggest_titles(&self, req: &SuggestTitleIn) -> Result<Vec<String>, GatewayError>;
  async fn generate_problems(&self, req: &GenerateIn) -> Result<GeneratedWorksheet, GatewayError>;
  async fn regenerate_problem(&self, req: &RegenerateOneIn) -> Result<Problem, GatewayError>;
}

/// A gateway request prepared by the controller.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayCall {
  SuggestTitles(SuggestTitleIn),
  Generate(GenerateIn),
  RegenerateOne(RegenerateOneIn),
}

/// Successful gateway answer, one variant per call.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
  Titles(Vec<String>),
  Worksheet(GeneratedWorksheet),
  Problem(Problem),
}

/// Run a prepared call against a gateway.
pub async fn dispatch<G: GenerationGateway + ?Sized>(gateway: &G, call: GatewayCall) -> Result<Reply, GatewayError> {
  match call {
    GatewayCall::SuggestTitles(req) => gateway.suggest_titles(&req).await.map(Reply::Titles),
    GatewayCall::Generate(req) => gateway.generate_problems(&req).await.map(Reply::Worksheet),
    GatewayCall::RegenerateOne(req) => gateway.regenerate_problem(&req).await.map(Reply::Problem),
  }
}

/// In-process gateway over the shared application state.
#[derive(Clone)]
pub struct ServiceGateway {
  state: Arc<AppState>,
}

impl ServiceGateway {
  pub fn new(state: Arc<AppState>) -> Self { Self { state } }
}

#[async_trait]
impl GenerationGateway for ServiceGateway {
  async fn suggest_titles(&self, req: &SuggestTitleIn) -> Result<Vec<String>, GatewayError> {
    Ok(generation::suggest_titles(&self.state, req).await.titles)
  }

  async fn generate_problems(&self, req: &GenerateIn) -> Result<GeneratedWorksheet, GatewayError> {
    generation::generate_worksheet(&self.state, req)
      .await
      .map_err(|e| GatewayError::Domain(e.generate_message()))
  }

  async fn regenerate_problem(&self, req: &RegenerateOneIn) -> Result<Problem, GatewayError> {
    generation::regenerate_problem(&self.state, req)
      .await
      .map_err(|e| GatewayError::Domain(e.regenerate_message()))
  }
}

/// Remote gateway speaking the `/api/...` JSON contract.
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base_url: String,
}

impl HttpGateway {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
  }

  /// POST a JSON body and return the decoded answer. The status code is not
  /// trusted: failing endpoints still answer with an `{error}` body.
  #[instrument(level = "debug", skip(self, body), fields(%path))]
  async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, GatewayError> {
    let url = format!("{}{}", self.base_url, path);
    let res = self.client.post(&url)
      .header(USER_AGENT, "worksheet-wizard/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;

    let status = res.status();
    let value: serde_json::Value = res.json().await.map_err(|e| {
      warn!(target: "wizard", %status, error = %e, "Generation API answered with a non-JSON body");
      GatewayError::Transport(e.to_string())
    })?;

    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
      debug!(target: "wizard", %status, "Generation API reported a domain error");
      return Err(GatewayError::Domain(message.to_string()));
    }
    serde_json::from_value(value).map_err(|e| GatewayError::Transport(e.to_string()))
  }
}

#[async_trait]
impl GenerationGateway for HttpGateway {
  async fn suggest_titles(&self, req: &SuggestTitleIn) -> Result<Vec<String>, GatewayError> {
    let out: SuggestTitleOut = self.post("/api/suggest-title", req).await?;
    Ok(out.titles)
  }

  async fn generate_problems(&self, req: &GenerateIn) -> Result<GeneratedWorksheet, GatewayError> {
    self.post("/api/generate", req).await
  }

  async fn regenerate_problem(&self, req: &RegenerateOneIn) -> Result<Problem, GatewayError> {
    self.post("/api/regenerate-one", req).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;
  use crate::domain::ProblemType;

  fn gateway(server: &mockito::Server) -> HttpGateway {
    HttpGateway::new(&format!("{}/", server.url()), Duration::from_secs(5)).unwrap()
  }

  fn generate_in() -> GenerateIn {
    GenerateIn {
      grade: "小学3年".into(),
      subject: "社会".into(),
      theme: "わたしたちの町".into(),
      notes: String::new(),
      formats: vec!["穴埋め問題".into()],
      difficulty: "基礎".into(),
      count: 2,
    }
  }

  #[tokio::test]
  async fn generate_decodes_problems_and_title() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/api/generate")
      .match_body(mockito::Matcher::PartialJson(serde_json::json!({"count": 2, "formats": ["穴埋め問題"]})))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"title":"町のひみつ","problems":[{"type":"穴埋め問題","question":"町の（　）","answer":"駅"}]}"#)
      .create_async()
      .await;

    let sheet = gateway(&server).generate_problems(&generate_in()).await.unwrap();
    assert_eq!(sheet.title.as_deref(), Some("町のひみつ"));
    assert_eq!(sheet.problems[0].kind, ProblemType::FillIn);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn error_body_is_a_domain_failure_even_on_500() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/regenerate-one")
      .with_status(500)
      .with_body(r#"{"error":"AIの応答をパースできませんでした。"}"#)
      .create_async()
      .await;

    let req = RegenerateOneIn {
      grade: String::new(),
      subject: String::new(),
      theme: String::new(),
      notes: String::new(),
      formats: vec![],
      difficulty: String::new(),
      problem_number: 2,
      current_question: "前の問題".into(),
    };
    let err = gateway(&server).regenerate_problem(&req).await.unwrap_err();
    assert_eq!(err, GatewayError::Domain("AIの応答をパースできませんでした。".into()));
  }

  #[tokio::test]
  async fn html_error_page_is_a_transport_failure() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/generate")
      .with_status(502)
      .with_body("<html>Bad Gateway</html>")
      .create_async()
      .await;
    let err = gateway(&server).generate_problems(&generate_in()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
  }

  #[tokio::test]
  async fn missing_titles_mean_no_suggestions() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/api/suggest-title")
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;
    let req = SuggestTitleIn { grade: "小学1年".into(), subject: "国語".into(), theme: "ひらがな".into() };
    assert_eq!(gateway(&server).suggest_titles(&req).await.unwrap(), Vec::<String>::new());
  }

  #[tokio::test]
  async fn service_gateway_maps_disabled_ai_to_domain_message() {
    let gw = ServiceGateway::new(Arc::new(AppState::from_parts(None, Prompts::default())));
    match dispatch(&gw, GatewayCall::Generate(generate_in())).await {
      Err(GatewayError::Domain(msg)) => assert!(msg.starts_with("生成中にエラーが発生しました")),
      other => panic!("unexpected: {:?}", other),
    }
    let titles = dispatch(&gw, GatewayCall::SuggestTitles(SuggestTitleIn {
      grade: String::new(),
      subject: String::new(),
      theme: "月".into(),
    }))
    .await;
    assert_eq!(titles, Ok(Reply::Titles(vec!["月 ワークシート".into()])));
  }
}

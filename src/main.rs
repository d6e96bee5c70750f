//! Worksheet Wizard Backend
//!
//! - Five-step worksheet wizard, one session per WebSocket connection
//! - Generation API (title ideas, full worksheet, single-problem regeneration)
//! - Optional OpenAI integration (via environment variables)
//! - Static front-end fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT                  : u16 (default 5000)
//!   STATIC_DIR            : front-end directory (default "./static")
//!   OPENAI_API_KEY        : enables generation if present
//!   OPENAI_BASE_URL       : default "https://api.openai.com/v1"
//!   OPENAI_MODEL          : default "gpt-4o-mini"
//!   OPENAI_TIMEOUT_SECS   : default 60
//!   WORKSHEET_CONFIG_PATH : path to TOML config (prompt overrides)
//!   GENERATION_API_URL    : wizard sessions call this remote API instead of generating in-process
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod state;
mod protocol;
mod openai;
mod generation;
mod wizard;
mod collection;
mod render;
mod gateway;
mod controller;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

const DEFAULT_PORT: u16 = 5000;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());
  let app = build_router(state);

  let port = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .unwrap_or(DEFAULT_PORT);
  let addr = SocketAddr::from(([0, 0, 0, 0], port));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "worksheet_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}

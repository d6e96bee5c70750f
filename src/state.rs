//! Application state shared by every handler and wizard session.
//!
//! This module owns:
//!   - the prompts struct (from TOML or defaults)
//!   - the optional AI client
//!   - the optional remote generation API that wizard sessions use instead of
//!     the in-process service
//!
//! Wizard sessions keep their own state; nothing here is per-user.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::config::{load_agent_config_from_env, Prompts};
use crate::gateway::HttpGateway;
use crate::openai::OpenAI;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone)]
pub struct AppState {
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub remote_generation: Option<HttpGateway>,
}

impl AppState {
    /// Build state from env: load prompt config and init the AI client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_agent_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "worksheet_backend", base_url = %oa.base_url, model = %oa.model, "AI generation enabled.");
        } else {
            warn!(target: "worksheet_backend", "AI generation disabled (no OPENAI_API_KEY). Title suggestions fall back to the theme; generation requests fail.");
        }

        let mut state = Self::from_parts(openai, prompts);
        if let Some(url) = std::env::var("GENERATION_API_URL").ok().filter(|u| !u.trim().is_empty()) {
            match HttpGateway::new(url.trim(), REMOTE_TIMEOUT) {
                Ok(gw) => {
                    info!(target: "worksheet_backend", %url, "Wizard sessions use the remote generation API.");
                    state.remote_generation = Some(gw);
                }
                Err(e) => error!(target: "worksheet_backend", %url, error = %e, "Remote generation API unusable; using in-process generation."),
            }
        }
        state
    }

    pub fn from_parts(openai: Option<OpenAI>, prompts: Prompts) -> Self {
        Self { openai, prompts, remote_generation: None }
    }
}

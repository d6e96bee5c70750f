//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL holds EnvFilter directives, e.g. "debug" or
//!   "info,wizard=debug,generation=debug,worksheet_backend=debug".
//! - LOG_FORMAT=json switches to structured JSON lines; anything else is pretty.
//!
//! Targets in use: `worksheet_backend` (boot, sockets), `wizard` (steps,
//! collection edits, print), `generation` (AI calls).

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,wizard=debug,generation=debug,worksheet_backend=debug,tower_http=info,axum=info";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two builders have different types, so init inside each arm.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

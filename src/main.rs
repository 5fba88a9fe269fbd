//! Sign-In Sandbox
//!
//! Drives the phone sign-in flow of the sign-in core against the in-memory
//! sandbox backend, so the state progression can be watched in the logs.
//!
//! # Usage
//! ```text
//! sign-in-sandbox <phone> [code]
//! ```
//!
//! # Flow
//! 1. Loads configuration and initializes logging
//! 2. Requests an SMS challenge for `<phone>`
//! 3. If `[code]` is given, validates it
//! 4. Prints the final state

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sign_in_core::config::{LoggingSettings, Settings};
use sign_in_core::events::TracingEventSink;
use sign_in_core::machine::SignInStateMachine;
use sign_in_core::sandbox::{SandboxSocialAdapter, SandboxVerificationService};
use sign_in_core::state::State;

/// Initializes the logging system.
///
/// `RUST_LOG` wins over the configured level. JSON output is used when
/// `logging.json` is set.
fn setup_logging(settings: &LoggingSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_writer(std::io::stdout);

    if settings.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(true).try_init()
    }
}

/// Waits until the machine settles in a terminal state.
async fn settle(machine: &SignInStateMachine) -> anyhow::Result<State> {
    let mut states = machine.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(30), states.wait_for(State::is_terminal))
        .await
        .context("timed out waiting for sign-in step")?
        .context("sign-in session closed")?
        .clone();
    Ok(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::new()?;
    setup_logging(&settings.logging).map_err(|e| anyhow::anyhow!(e))?;
    info!("Sign-in sandbox starting up...");

    let mut args = std::env::args().skip(1);
    let Some(phone) = args.next() else {
        bail!("usage: sign-in-sandbox <phone> [code]");
    };
    let code = args.next();

    let machine = SignInStateMachine::new(
        settings.sign_in.options,
        Arc::new(SandboxVerificationService::new(settings.sandbox.clone())),
        Arc::new(SandboxSocialAdapter::new(&settings.sandbox)),
        Arc::new(TracingEventSink),
    )
    .with_policy(settings.sign_in.concurrency);

    machine.request_sms(phone.as_str())?;
    let mut state = settle(&machine).await?;
    info!(state = ?state, "SMS step finished");

    if let Some(code) = code.filter(|_| matches!(state, State::Finished { .. })) {
        machine.validate_sms_code(code, phone.as_str(), |token| {
            info!(%token, "Received exchange token, continue with registration");
        })?;
        state = settle(&machine).await?;
    }

    println!("{:?}", state);
    machine.dispose();
    Ok(())
}

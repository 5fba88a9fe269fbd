//! Sign-In Core Library
//!
//! Orchestrates phone-based and social-provider sign-in into a single
//! observable state progression. The remote calls, the platform social SDK
//! and analytics are collaborators behind traits; this crate owns only the
//! sequencing between them.
//!
//! # Modules
//! - `machine`: the sign-in state machine and its intents
//! - `state`: observable `State`, `SignInOptions` and `ConcurrencyPolicy`
//! - `model`: values exchanged with collaborators
//! - `verification`: SMS, social-id and token redemption backend boundary
//! - `social`: platform social sign-in boundary
//! - `events`: fire-and-forget tracking events and sinks
//! - `config`: configuration loading
//! - `sandbox`: in-memory collaborators for local runs
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use sign_in_core::{
//!     config::Settings,
//!     events::TracingEventSink,
//!     machine::SignInStateMachine,
//!     sandbox::{SandboxSocialAdapter, SandboxVerificationService},
//! };
//!
//! async fn run() {
//!     let settings = Settings::new().expect("Failed to load configuration");
//!     let machine = SignInStateMachine::new(
//!         settings.sign_in.options,
//!         Arc::new(SandboxVerificationService::new(settings.sandbox.clone())),
//!         Arc::new(SandboxSocialAdapter::new(&settings.sandbox)),
//!         Arc::new(TracingEventSink),
//!     );
//!     machine.request_sms("+15551234567").expect("session is live");
//! }
//! ```
//!
//! # License
//! Licensed under the AGPLv3 license.

pub mod config;
pub mod events;
pub mod machine;
pub mod model;
pub mod sandbox;
pub mod social;
pub mod state;
pub mod verification;

pub use machine::{IntentError, SignInStateMachine};
pub use model::{LoginType, SharedError, SmsChallenge, SocialProvider, TokenGrant, UiContext, UserInfo};
pub use state::{ConcurrencyPolicy, SignInOptions, State};

//! Observable sign-in state and the session options fixed at construction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{SharedError, UserInfo};

/// Current stage of a sign-in session.
///
/// Exactly one variant is active at a time. Only the state machine writes it;
/// observers receive clones.
#[derive(Clone)]
pub enum State {
    /// No operation in progress
    Initial,
    /// An asynchronous operation is in flight
    Loading,
    /// The last operation failed; recoverable by issuing a new intent
    Failure { error: SharedError },
    /// Token redemption for an existing account succeeded
    UserIsRegistered,
    /// Social identity validated but no account is linked to it yet
    UserNeedsRegistration { token: String, user_info: UserInfo },
    /// SMS challenge issued, or code validated for an unregistered phone
    Finished {
        code: String,
        phone: String,
        registered: bool,
    },
}

impl State {
    pub fn failure(error: anyhow::Error) -> Self {
        State::Failure {
            error: SharedError::new(error),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, State::Loading)
    }

    /// True for states that need a new intent before anything else happens.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Failure { .. }
                | State::UserIsRegistered
                | State::UserNeedsRegistration { .. }
                | State::Finished { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Initial => "initial",
            State::Loading => "loading",
            State::Failure { .. } => "failure",
            State::UserIsRegistered => "user_is_registered",
            State::UserNeedsRegistration { .. } => "user_needs_registration",
            State::Finished { .. } => "finished",
        }
    }
}

impl Default for State {
    fn default() -> Self {
        State::Initial
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Initial => f.write_str("Initial"),
            State::Loading => f.write_str("Loading"),
            State::UserIsRegistered => f.write_str("UserIsRegistered"),
            State::Failure { error } => f
                .debug_struct("Failure")
                .field("error", &format_args!("{}", error))
                .finish(),
            State::UserNeedsRegistration { token, user_info } => f
                .debug_struct("UserNeedsRegistration")
                .field("token", token)
                .field("user_info", user_info)
                .finish(),
            State::Finished {
                code,
                phone,
                registered,
            } => f
                .debug_struct("Finished")
                .field("code", code)
                .field("phone", phone)
                .field("registered", registered)
                .finish(),
        }
    }
}

/// Which entry points a session offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SignInOptions {
    /// Phone flow only. `restore` turns on data-restore tracking for SMS requests.
    PhoneOnly {
        #[serde(default)]
        restore: bool,
    },
    /// Phone flow plus the social sign-in entry point
    PhoneAndSocial,
}

impl SignInOptions {
    /// Whether SMS requests emit a data-restore event.
    pub fn tracks_restore(&self) -> bool {
        matches!(self, SignInOptions::PhoneOnly { restore: true })
    }
}

impl Default for SignInOptions {
    fn default() -> Self {
        SignInOptions::PhoneOnly { restore: false }
    }
}

/// What to do with an intent issued while another one is still loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// Every intent runs; whichever completes last sets the state.
    #[default]
    LastWriteWins,
    /// Intents are refused while another intent is running, social sign-in
    /// included.
    RejectWhileLoading,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_restoring_phone_flow_tracks() {
        assert!(SignInOptions::PhoneOnly { restore: true }.tracks_restore());
        assert!(!SignInOptions::PhoneOnly { restore: false }.tracks_restore());
        assert!(!SignInOptions::PhoneAndSocial.tracks_restore());
    }

    #[test]
    fn options_deserialize_from_tagged_yaml() {
        let opts: SignInOptions = serde_yaml::from_str("mode: phone_only\nrestore: true\n").unwrap();
        assert_eq!(opts, SignInOptions::PhoneOnly { restore: true });

        let opts: SignInOptions = serde_yaml::from_str("mode: phone_only\n").unwrap();
        assert_eq!(opts, SignInOptions::PhoneOnly { restore: false });

        let opts: SignInOptions = serde_yaml::from_str("mode: phone_and_social\n").unwrap();
        assert_eq!(opts, SignInOptions::PhoneAndSocial);
    }

    #[test]
    fn terminal_classification() {
        assert!(!State::Initial.is_terminal());
        assert!(!State::Loading.is_terminal());
        assert!(State::UserIsRegistered.is_terminal());
        assert!(State::failure(anyhow::anyhow!("boom")).is_terminal());
        assert_eq!(State::default().name(), "initial");
    }

    #[test]
    fn failure_debug_shows_message() {
        let state = State::failure(anyhow::anyhow!("network down"));
        assert_eq!(format!("{:?}", state), "Failure { error: network down }");
    }
}

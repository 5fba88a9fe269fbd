//! Value types exchanged between the sign-in core and its collaborators.
//!
//! Nothing in here performs I/O. The verification backend and the platform
//! social SDK produce and consume these types; the state machine only routes
//! on the few fields it needs (`registered`, `UserInfo::id`).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque error produced by a collaborator.
///
/// The core never classifies or wraps these; it stores them verbatim in
/// [`State::Failure`](crate::state::State::Failure). `Arc` keeps the state
/// cheaply clonable for observers.
pub type SharedError = Arc<anyhow::Error>;

/// Identity providers offered on the social sign-in entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialProvider {
    Apple,
    Facebook,
    Google,
}

impl fmt::Display for SocialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocialProvider::Apple => "apple",
            SocialProvider::Facebook => "facebook",
            SocialProvider::Google => "google",
        };
        f.write_str(name)
    }
}

/// Profile returned by a social provider after a successful platform sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Provider-assigned user identifier
    pub id: Option<String>,
    /// E-mail address, if the user granted it
    pub email: Option<String>,
    /// Display name, if the provider shares one
    pub display_name: Option<String>,
}

impl UserInfo {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Handle to whatever UI surface the platform SDK attaches its sign-in sheet to.
///
/// The core passes it through untouched; only the adapter knows the concrete type.
#[derive(Clone)]
pub struct UiContext(Arc<dyn Any + Send + Sync>);

impl UiContext {
    pub fn new<T: Any + Send + Sync>(handle: T) -> Self {
        Self(Arc::new(handle))
    }

    /// A context for adapters that need no UI attachment.
    pub fn detached() -> Self {
        Self::new(())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for UiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UiContext(..)")
    }
}

/// How a token is redeemed against the account backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum LoginType {
    /// Social login; phone-only finalization passes an empty id.
    Social { social_id: String },
}

impl LoginType {
    pub fn social(social_id: impl Into<String>) -> Self {
        LoginType::Social {
            social_id: social_id.into(),
        }
    }
}

/// Result of issuing an SMS challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsChallenge {
    pub code: String,
    /// Whether the phone number already belongs to an account
    pub registered: bool,
}

/// Exchange token returned by SMS-code or social-id validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub registered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_context_round_trips_the_handle() {
        struct Window(u32);
        let ctx = UiContext::new(Window(7));
        assert_eq!(ctx.downcast_ref::<Window>().map(|w| w.0), Some(7));
        assert!(ctx.downcast_ref::<String>().is_none());
    }

    #[test]
    fn provider_serializes_snake_case() {
        let json = serde_json::to_string(&SocialProvider::Facebook).unwrap();
        assert_eq!(json, "\"facebook\"");
        assert_eq!(SocialProvider::Apple.to_string(), "apple");
    }

    #[test]
    fn login_type_is_tagged() {
        let json = serde_json::to_value(LoginType::social("abc")).unwrap();
        assert_eq!(json["type"], "social");
        assert_eq!(json["social_id"], "abc");
    }
}

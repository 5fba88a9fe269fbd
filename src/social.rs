//! Platform social sign-in boundary.

use async_trait::async_trait;

use crate::model::{SocialProvider, UiContext, UserInfo};

/// Runs the platform SDK sign-in sheet for a provider.
///
/// Single-shot: one call yields one profile or one platform error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialAuthAdapter: Send + Sync {
    async fn sign_in(&self, provider: SocialProvider, ui: UiContext) -> anyhow::Result<UserInfo>;
}

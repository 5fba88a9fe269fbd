//! Verification backend boundary.
//!
//! The sign-in core issues exactly four remote calls: send an SMS challenge,
//! validate the code the user typed, validate a social identity, and redeem an
//! exchange token for an existing account. How they travel over the wire is
//! the implementor's business; timeouts and retries live there too.

use async_trait::async_trait;

use crate::model::{LoginType, SmsChallenge, TokenGrant};

/// Remote verification calls the state machine depends on.
///
/// Errors are returned as `anyhow::Error` and surface unchanged in
/// [`State::Failure`](crate::state::State::Failure).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Issue an SMS challenge to `phone`.
    async fn send_sms(&self, phone: &str) -> anyhow::Result<SmsChallenge>;

    /// Check the code the user entered for `phone`.
    async fn validate_sms(&self, code: &str, phone: &str) -> anyhow::Result<TokenGrant>;

    /// Check a provider-assigned social identifier.
    async fn validate_social_id(&self, social_id: &str) -> anyhow::Result<TokenGrant>;

    /// Redeem an exchange token for an existing account.
    async fn sign_in(&self, token: &str, login_type: LoginType) -> anyhow::Result<()>;
}

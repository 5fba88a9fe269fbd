//! In-memory collaborators for local runs and integration tests.
//!
//! `SandboxVerificationService` answers every SMS request with the configured
//! code and issues `sbx-` prefixed exchange tokens it can later redeem.
//! `SandboxSocialAdapter` returns the identifier configured per provider.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SandboxSettings;
use crate::model::{LoginType, SmsChallenge, SocialProvider, TokenGrant, UiContext, UserInfo};
use crate::social::SocialAuthAdapter;
use crate::verification::VerificationService;

const TOKEN_PREFIX: &str = "sbx-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Invalid verification code for {0}")]
    InvalidCode(String),
    #[error("No SMS challenge pending for {0}")]
    NoPendingChallenge(String),
    #[error("Unknown exchange token")]
    UnknownToken,
    #[error("Provider {0} is not configured")]
    ProviderNotConfigured(SocialProvider),
}

pub struct SandboxVerificationService {
    settings: SandboxSettings,
    registered_phones: HashSet<String>,
    registered_social_ids: HashSet<String>,
    /// Phones with an outstanding challenge
    pending: Mutex<HashSet<String>>,
    /// Tokens handed out and not yet redeemed
    issued: Mutex<HashMap<String, String>>,
}

impl SandboxVerificationService {
    pub fn new(settings: SandboxSettings) -> Self {
        info!(
            registered_phones = settings.registered_phones.len(),
            registered_social_ids = settings.registered_social_ids.len(),
            latency_ms = settings.latency_ms,
            "Creating sandbox verification service"
        );
        Self {
            registered_phones: settings.registered_phones.iter().cloned().collect(),
            registered_social_ids: settings.registered_social_ids.iter().cloned().collect(),
            settings,
            pending: Mutex::new(HashSet::new()),
            issued: Mutex::new(HashMap::new()),
        }
    }

    async fn round_trip(&self) {
        if self.settings.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.latency_ms)).await;
        }
    }

    fn issue_token(&self, subject: &str) -> String {
        let token = format!("{}{}", TOKEN_PREFIX, Uuid::new_v4());
        self.issued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.clone(), subject.to_string());
        token
    }
}

#[async_trait]
impl VerificationService for SandboxVerificationService {
    async fn send_sms(&self, phone: &str) -> anyhow::Result<SmsChallenge> {
        self.round_trip().await;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(phone.to_string());
        debug!(%phone, "Sandbox SMS challenge issued");
        Ok(SmsChallenge {
            code: self.settings.sms_code.clone(),
            registered: self.registered_phones.contains(phone),
        })
    }

    async fn validate_sms(&self, code: &str, phone: &str) -> anyhow::Result<TokenGrant> {
        self.round_trip().await;
        if !self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(phone)
        {
            return Err(SandboxError::NoPendingChallenge(phone.to_string()).into());
        }
        if code != self.settings.sms_code {
            return Err(SandboxError::InvalidCode(phone.to_string()).into());
        }
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(phone);
        Ok(TokenGrant {
            token: self.issue_token(phone),
            registered: self.registered_phones.contains(phone),
        })
    }

    async fn validate_social_id(&self, social_id: &str) -> anyhow::Result<TokenGrant> {
        self.round_trip().await;
        Ok(TokenGrant {
            token: self.issue_token(social_id),
            registered: self.registered_social_ids.contains(social_id),
        })
    }

    async fn sign_in(&self, token: &str, login_type: LoginType) -> anyhow::Result<()> {
        self.round_trip().await;
        let subject = self
            .issued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token)
            .ok_or(SandboxError::UnknownToken)?;
        info!(%subject, ?login_type, "Sandbox sign-in redeemed");
        Ok(())
    }
}

/// Social adapter answering from `SandboxSettings::social_ids`.
///
/// A provider mapped to an empty string yields a profile without an id.
pub struct SandboxSocialAdapter {
    social_ids: HashMap<String, String>,
}

impl SandboxSocialAdapter {
    pub fn new(settings: &SandboxSettings) -> Self {
        Self {
            social_ids: settings.social_ids.clone(),
        }
    }
}

#[async_trait]
impl SocialAuthAdapter for SandboxSocialAdapter {
    async fn sign_in(&self, provider: SocialProvider, _ui: UiContext) -> anyhow::Result<UserInfo> {
        let id = self
            .social_ids
            .get(&provider.to_string())
            .ok_or(SandboxError::ProviderNotConfigured(provider))?;
        Ok(UserInfo {
            id: (!id.is_empty()).then(|| id.clone()),
            email: None,
            display_name: Some(format!("{} sandbox user", provider)),
        })
    }
}

//! Sign-in state machine.
//!
//! Sequences social-profile retrieval, social-id validation, SMS challenge and
//! response, and token redemption for existing accounts into one observable
//! [`State`]. Every intent runs as its own tokio task; the caller observes the
//! result through a `watch` channel.
//!
//! # Flows
//! - Social: platform sign-in → social-id validation → either token redemption
//!   (`UserIsRegistered`) or `UserNeedsRegistration`
//! - SMS request: `send_sms` → `Finished`, plus a data-restore event on
//!   restoring phone-only sessions whatever the outcome
//! - Code validation: `validate_sms` → token redemption for registered phones,
//!   otherwise the exchange token goes to the caller and the state is `Finished`
//!
//! # Concurrency
//! Intents are not serialized. Under [`ConcurrencyPolicy::LastWriteWins`] the
//! last completion overwrites whatever an earlier one published. Under
//! [`ConcurrencyPolicy::RejectWhileLoading`] an intent is refused while any
//! other intent is still running, including a social sign-in whose platform
//! sheet is open.
//!
//! # Teardown
//! Each running intent owns a child of the session's root
//! [`CancellationToken`]. [`SignInStateMachine::dispose`] (also run on drop)
//! cancels them all. Tasks only hold a `Weak` reference to the state cell, so
//! nothing is published once the machine is gone.
//!
//! Intent methods spawn onto the ambient Tokio runtime and must be called
//! from inside one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::events::{DataRestoreParams, EventSink, SignInEvent};
use crate::model::{LoginType, SharedError, SocialProvider, UiContext, UserInfo};
use crate::social::SocialAuthAdapter;
use crate::state::{ConcurrencyPolicy, SignInOptions, State};
use crate::verification::VerificationService;

/// Reasons an intent is refused before anything runs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IntentError {
    #[error("sign-in session has been disposed")]
    Disposed,
    #[error("another sign-in operation is in progress")]
    Busy,
}

/// An admitted intent's id and cancellation token.
struct Reservation {
    id: Uuid,
    token: CancellationToken,
}

/// State cell shared with running intents through `Weak` references.
struct Inner {
    state: watch::Sender<State>,
    running: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Inner {
    fn transition(&self, next: State) {
        let to = next.name();
        let previous = self.state.send_replace(next);
        debug!(from = previous.name(), to, "State transition");
    }

    fn running(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives one sign-in session.
pub struct SignInStateMachine {
    session_id: Uuid,
    options: SignInOptions,
    policy: ConcurrencyPolicy,
    inner: Arc<Inner>,
    root: CancellationToken,
    verification: Arc<dyn VerificationService>,
    social: Arc<dyn SocialAuthAdapter>,
    events: Arc<dyn EventSink>,
}

impl SignInStateMachine {
    pub fn new(
        options: SignInOptions,
        verification: Arc<dyn VerificationService>,
        social: Arc<dyn SocialAuthAdapter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        info!(session = %session_id, ?options, "Creating sign-in session");

        let (state, _) = watch::channel(State::Initial);
        Self {
            session_id,
            options,
            policy: ConcurrencyPolicy::default(),
            inner: Arc::new(Inner {
                state,
                running: Mutex::new(HashMap::new()),
            }),
            root: CancellationToken::new(),
            verification,
            social,
            events,
        }
    }

    pub fn with_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn options(&self) -> SignInOptions {
        self.options
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.inner.state.borrow().clone()
    }

    /// Receiver primed with the current state. Drop it to unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.inner.state.subscribe()
    }

    /// Stream yielding the current state, then every change.
    pub fn states(&self) -> WatchStream<State> {
        WatchStream::new(self.subscribe())
    }

    /// Number of intents still running.
    pub fn in_flight(&self) -> usize {
        self.inner.running().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Sign in through a social provider.
    ///
    /// The platform sheet is not a loading phase; `Loading` starts once the
    /// returned profile is being validated.
    pub fn begin_social_sign_in(
        &self,
        provider: SocialProvider,
        ui: UiContext,
    ) -> Result<(), IntentError> {
        let reservation = self.reserve(false)?;
        let flow = self.flow();
        self.launch("social_sign_in", reservation, async move {
            flow.social_sign_in(provider, ui).await;
        });
        Ok(())
    }

    /// Request an SMS challenge for `phone`.
    pub fn request_sms(&self, phone: impl Into<String>) -> Result<(), IntentError> {
        let phone = phone.into();
        let reservation = self.reserve(true)?;
        let flow = self.flow();
        self.launch("request_sms", reservation, async move {
            flow.request_sms(phone).await;
        });
        Ok(())
    }

    /// Validate the code the user entered.
    ///
    /// `on_exchange_token` runs exactly once, and only when the phone has no
    /// account yet.
    pub fn validate_sms_code<F>(
        &self,
        code: impl Into<String>,
        phone: impl Into<String>,
        on_exchange_token: F,
    ) -> Result<(), IntentError>
    where
        F: FnOnce(String) + Send + 'static,
    {
        let (code, phone) = (code.into(), phone.into());
        let reservation = self.reserve(true)?;
        let flow = self.flow();
        self.launch("validate_sms_code", reservation, async move {
            flow.validate_sms_code(code, phone, on_exchange_token).await;
        });
        Ok(())
    }

    /// Cancel every running intent. Later intents are refused.
    pub fn dispose(&self) {
        if self.root.is_cancelled() {
            return;
        }
        self.root.cancel();
        let cancelled = self.inner.running().drain().count();
        info!(session = %self.session_id, cancelled, "Sign-in session disposed");
    }

    /// Admits an intent and registers its cancellation token.
    ///
    /// The running map stays locked from the policy check until the token is
    /// registered, and `Loading` is written before the task is spawned.
    fn reserve(&self, enters_loading: bool) -> Result<Reservation, IntentError> {
        let mut running = self.inner.running();
        if self.root.is_cancelled() {
            return Err(IntentError::Disposed);
        }
        if self.policy == ConcurrencyPolicy::RejectWhileLoading && !running.is_empty() {
            debug!(session = %self.session_id, in_flight = running.len(), "Rejecting intent while busy");
            return Err(IntentError::Busy);
        }
        if enters_loading {
            self.inner.transition(State::Loading);
        }
        let reservation = Reservation {
            id: Uuid::new_v4(),
            token: self.root.child_token(),
        };
        running.insert(reservation.id, reservation.token.clone());
        Ok(reservation)
    }

    fn flow(&self) -> Flow {
        Flow {
            inner: Arc::downgrade(&self.inner),
            options: self.options,
            verification: Arc::clone(&self.verification),
            social: Arc::clone(&self.social),
            events: Arc::clone(&self.events),
        }
    }

    fn launch<F>(&self, intent: &'static str, reservation: Reservation, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Reservation { id: intent_id, token } = reservation;
        let inner = Arc::downgrade(&self.inner);
        let span = info_span!("sign_in_intent", session = %self.session_id, intent, %intent_id);
        tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => debug!("Intent cancelled"),
                    _ = work => debug!("Intent completed"),
                }
                if let Some(inner) = inner.upgrade() {
                    inner.running().remove(&intent_id);
                }
            }
            .instrument(span),
        );
    }
}

impl Drop for SignInStateMachine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SignInStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInStateMachine")
            .field("session_id", &self.session_id)
            .field("options", &self.options)
            .field("policy", &self.policy)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

/// Everything one running intent needs. Holds the state cell weakly.
struct Flow {
    inner: Weak<Inner>,
    options: SignInOptions,
    verification: Arc<dyn VerificationService>,
    social: Arc<dyn SocialAuthAdapter>,
    events: Arc<dyn EventSink>,
}

impl Flow {
    /// Returns false when the session is gone and the state was left alone.
    fn publish(&self, next: State) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.transition(next);
                true
            }
            None => {
                debug!(dropped = next.name(), "Session gone, dropping completion");
                false
            }
        }
    }

    fn fail(&self, error: SharedError) -> bool {
        warn!("Sign-in step failed: {:#}", error);
        self.publish(State::Failure { error })
    }

    async fn social_sign_in(&self, provider: SocialProvider, ui: UiContext) {
        debug!(%provider, "Starting platform sign-in");
        match self.social.sign_in(provider, ui).await {
            Ok(user_info) => self.validate_social_token(user_info).await,
            Err(e) => {
                self.fail(Arc::new(e));
            }
        }
    }

    async fn validate_social_token(&self, user_info: UserInfo) {
        // Profiles without an id are dropped without touching state.
        let Some(social_id) = user_info.id.clone() else {
            warn!("Social profile has no identifier, leaving state unchanged");
            return;
        };

        if !self.publish(State::Loading) {
            return;
        }
        match self.verification.validate_social_id(&social_id).await {
            Ok(grant) if grant.registered => {
                debug!("Social identity is linked to an account");
                self.finalize_registered_user(&grant.token, &social_id).await;
            }
            Ok(grant) => {
                info!("Social identity needs registration");
                self.publish(State::UserNeedsRegistration {
                    token: grant.token,
                    user_info,
                });
            }
            Err(e) => {
                self.fail(Arc::new(e));
            }
        }
    }

    async fn request_sms(&self, phone: String) {
        debug!(%phone, "Requesting SMS challenge");
        let (published, error) = match self.verification.send_sms(&phone).await {
            Ok(challenge) => {
                info!(%phone, registered = challenge.registered, "SMS challenge issued");
                let published = self.publish(State::Finished {
                    code: challenge.code,
                    phone: phone.clone(),
                    registered: challenge.registered,
                });
                (published, None)
            }
            Err(e) => {
                let error: SharedError = Arc::new(e);
                (self.fail(Arc::clone(&error)), Some(error))
            }
        };
        if published {
            self.track_phone_restore(phone, error);
        }
    }

    fn track_phone_restore(&self, phone: String, error: Option<SharedError>) {
        if !self.options.tracks_restore() {
            return;
        }
        self.events
            .track(SignInEvent::DataRestore(DataRestoreParams::new(phone, error)));
    }

    async fn validate_sms_code<F>(&self, code: String, phone: String, on_exchange_token: F)
    where
        F: FnOnce(String) + Send,
    {
        debug!(%phone, "Validating SMS code");
        match self.verification.validate_sms(&code, &phone).await {
            Ok(grant) if grant.registered => {
                debug!(%phone, "Phone is linked to an account");
                // Phone-only redemption never carries a social id.
                self.finalize_registered_user(&grant.token, "").await;
            }
            Ok(grant) => {
                if self.inner.strong_count() == 0 {
                    debug!("Session gone, skipping exchange token callback");
                    return;
                }
                on_exchange_token(grant.token);
                self.publish(State::Finished {
                    code,
                    phone,
                    registered: false,
                });
            }
            Err(e) => {
                self.fail(Arc::new(e));
            }
        }
    }

    async fn finalize_registered_user(&self, token: &str, social_id: &str) {
        match self.verification.sign_in(token, LoginType::social(social_id)).await {
            Ok(()) => {
                info!("Registered user signed in");
                self.publish(State::UserIsRegistered);
            }
            Err(e) => {
                self.fail(Arc::new(e));
            }
        }
    }
}

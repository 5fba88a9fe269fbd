use std::sync::{Arc, Mutex};
use std::time::Duration;

use sign_in_core::config::{SandboxSettings, Settings};
use sign_in_core::events::{ChannelEventSink, SignInEvent};
use sign_in_core::sandbox::{SandboxSocialAdapter, SandboxVerificationService};
use sign_in_core::{SignInOptions, SignInStateMachine, SocialProvider, State, UiContext};

const SETTINGS: &str = r#"
sign_in:
  options:
    mode: phone_and_social
sandbox:
  sms_code: "0000"
  latency_ms: 5
  registered_phones: ["+15550000001"]
  registered_social_ids: ["fb-registered"]
  social_ids:
    facebook: "abc"
    google: "fb-registered"
    apple: ""
"#;

fn sandbox() -> SandboxSettings {
    Settings::from_yaml_str(SETTINGS).unwrap().sandbox
}

fn machine(options: SignInOptions) -> (SignInStateMachine, tokio::sync::mpsc::UnboundedReceiver<SignInEvent>) {
    let sandbox = sandbox();
    let (events, rx) = ChannelEventSink::new();
    let machine = SignInStateMachine::new(
        options,
        Arc::new(SandboxVerificationService::new(sandbox.clone())),
        Arc::new(SandboxSocialAdapter::new(&sandbox)),
        Arc::new(events),
    );
    (machine, rx)
}

async fn settle(machine: &SignInStateMachine) -> State {
    let mut rx = machine.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(State::is_terminal))
        .await
        .expect("state did not settle")
        .expect("session closed")
        .clone();
    state
}

#[test_log::test(tokio::test)]
async fn phone_only_sms_request_finishes_without_tracking() {
    let (m, mut events) = machine(SignInOptions::PhoneOnly { restore: false });

    m.request_sms("+15551234567").unwrap();
    assert!(m.state().is_loading());

    match settle(&m).await {
        State::Finished {
            code,
            phone,
            registered,
        } => {
            assert_eq!(code, "0000");
            assert_eq!(phone, "+15551234567");
            assert!(!registered);
        }
        other => panic!("unexpected state {:?}", other),
    }
    drop(m);
    assert!(events.recv().await.is_none());
}

#[test_log::test(tokio::test)]
async fn restoring_session_reports_each_sms_request() {
    let (m, mut events) = machine(SignInOptions::PhoneOnly { restore: true });

    m.request_sms("+15550000001").unwrap();
    assert!(matches!(settle(&m).await, State::Finished { registered: true, .. }));

    match events.recv().await {
        Some(SignInEvent::DataRestore(params)) => {
            assert_eq!(params.phone, "+15550000001");
            assert!(params.error.is_none());
        }
        None => panic!("no event tracked"),
    }
}

#[test_log::test(tokio::test)]
async fn new_phone_goes_from_code_to_registration() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.request_sms("+15557654321").unwrap();
    settle(&m).await;

    let tokens = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&tokens);
    m.validate_sms_code("0000", "+15557654321", move |token| {
        sink.lock().unwrap().push(token);
    })
    .unwrap();

    assert!(matches!(settle(&m).await, State::Finished { registered: false, .. }));
    let tokens = tokens.lock().unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].starts_with("sbx-"));
}

#[test_log::test(tokio::test)]
async fn registered_phone_signs_in() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.request_sms("+15550000001").unwrap();
    settle(&m).await;
    m.validate_sms_code("0000", "+15550000001", |_| panic!("registered phones get no exchange token"))
        .unwrap();

    assert!(matches!(settle(&m).await, State::UserIsRegistered));
}

#[test_log::test(tokio::test)]
async fn wrong_code_fails_and_can_be_retried() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.request_sms("+15557654321").unwrap();
    settle(&m).await;

    m.validate_sms_code("9999", "+15557654321", |_| {}).unwrap();
    match settle(&m).await {
        State::Failure { error } => assert!(error.to_string().contains("Invalid verification code")),
        other => panic!("unexpected state {:?}", other),
    }

    m.validate_sms_code("0000", "+15557654321", |_| {}).unwrap();
    assert!(matches!(settle(&m).await, State::Finished { .. }));
}

#[test_log::test(tokio::test)]
async fn facebook_newcomer_needs_registration() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.begin_social_sign_in(SocialProvider::Facebook, UiContext::detached())
        .unwrap();

    match settle(&m).await {
        State::UserNeedsRegistration { token, user_info } => {
            assert!(token.starts_with("sbx-"));
            assert_eq!(user_info.id.as_deref(), Some("abc"));
        }
        other => panic!("unexpected state {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn linked_social_identity_signs_in() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.begin_social_sign_in(SocialProvider::Google, UiContext::detached())
        .unwrap();
    assert!(matches!(settle(&m).await, State::UserIsRegistered));
}

#[test_log::test(tokio::test)]
async fn social_profile_without_id_is_ignored() {
    let (m, _events) = machine(SignInOptions::PhoneAndSocial);

    m.begin_social_sign_in(SocialProvider::Apple, UiContext::detached())
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while m.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert!(matches!(m.state(), State::Initial));
}

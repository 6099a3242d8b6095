//! Pending registrations driven through the store with paused time.
//!
//! Debounce windows and probe latencies are real timers, so the order in
//! which availability answers arrive is controlled by the test.

#![allow(clippy::unwrap_used, clippy::panic)]

use bookclub_auth::error::AuthError;
use bookclub_auth::mocks::{
    ApiCall, MemoryStorage, MockEnvironment, MockHarness, MockIdentityApi, MockPopupOpener,
    RecordingNavigator, mint_token,
};
use bookclub_auth::providers::RegistrationResponse;
use bookclub_auth::state::{Availability, FieldError, RegistrationError};
use bookclub_auth::{
    AuthAction, AuthReducer, AuthState, CallbackQuery, ClientConfig, Field, FlowPhase,
    PendingRegistration, RegistrationStep, Route,
};
use bookclub_runtime::Store;
use bookclub_testing::{epoch, test_clock};
use std::sync::Arc;
use std::time::Duration;

type TestReducer =
    AuthReducer<MockIdentityApi, Arc<MemoryStorage>, RecordingNavigator, MockPopupOpener>;
type TestStore = Store<AuthState, AuthAction, MockEnvironment, TestReducer>;

const DEBOUNCE: Duration = Duration::from_millis(400);

fn harness() -> MockHarness {
    let config = ClientConfig::default()
        .with_username_debounce(DEBOUNCE)
        .with_email_debounce(DEBOUNCE);
    MockHarness::new(config, Arc::new(test_clock()))
}

fn store(h: &MockHarness) -> TestStore {
    Store::new(AuthState::default(), AuthReducer::new(), h.env.clone())
}

async fn settle(store: &TestStore) {
    while store.pending_effects() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn begin(store: &TestStore, step: RegistrationStep) {
    store
        .send(AuthAction::BeginRegistration {
            pending: PendingRegistration::from_token("pending-1"),
            step,
        })
        .await
        .unwrap();
}

async fn type_username(store: &TestStore, value: &str) {
    store
        .send(AuthAction::FieldEdited {
            field: Field::Username,
            value: value.to_string(),
        })
        .await
        .unwrap();
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_username_answer_is_shown() {
    let h = harness();
    h.api.set_username_available("ab", Ok(true), ms(300));
    h.api.set_username_available("abc", Ok(true), ms(300));
    h.api.set_username_available("abcd", Ok(false), ms(50));
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    // Too short: rejected locally, never probed.
    type_username(&store, "ab").await;
    let error = store
        .state(|s| s.registration.as_ref().unwrap().username.error)
        .await;
    assert_eq!(error, Some(FieldError::TooShort));

    // "abc" settles, its probe starts at 400ms and answers at 700ms.
    type_username(&store, "abc").await;
    tokio::time::sleep(ms(450)).await;

    // "abcd" arrives while "abc" is still in flight.
    type_username(&store, "abcd").await;
    tokio::time::sleep(ms(500)).await;
    settle(&store).await;

    assert_eq!(h.api.probed_usernames(), vec!["abc", "abcd"]);
    let username = store
        .state(|s| s.registration.as_ref().unwrap().username.clone())
        .await;
    assert_eq!(username.value, "abcd");
    assert_eq!(username.availability, Availability::Taken);
    assert_eq!(username.error, Some(FieldError::UsernameTaken));
}

#[tokio::test(start_paused = true)]
async fn stale_available_answer_does_not_overwrite_newer_taken() {
    let h = harness();
    h.api.set_username_available("reader", Ok(true), ms(1_000));
    h.api.set_username_available("readers", Ok(false), ms(10));
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    type_username(&store, "reader").await;
    tokio::time::sleep(ms(450)).await;
    type_username(&store, "readers").await;

    // "readers" is answered at ~860ms, "reader" only at ~1400ms.
    tokio::time::sleep(ms(1_500)).await;
    settle(&store).await;

    let username = store
        .state(|s| s.registration.as_ref().unwrap().username.clone())
        .await;
    assert_eq!(username.availability, Availability::Taken);
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_probe_once() {
    let h = harness();
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    for value in ["bor", "borg", "borge", "borges"] {
        type_username(&store, value).await;
        tokio::time::sleep(ms(100)).await;
    }
    tokio::time::sleep(DEBOUNCE).await;
    settle(&store).await;

    assert_eq!(h.api.probed_usernames(), vec!["borges"]);
    let availability = store
        .state(|s| s.registration.as_ref().unwrap().username.availability)
        .await;
    assert_eq!(availability, Availability::Available);
}

#[tokio::test(start_paused = true)]
async fn completing_during_the_username_check_sends_nothing() {
    let h = harness();
    h.api.set_username_available("borges", Ok(true), ms(200));
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    type_username(&store, "borges").await;
    tokio::time::sleep(DEBOUNCE + ms(50)).await;
    store.send(AuthAction::CompleteRegistration).await.unwrap();
    settle(&store).await;

    let username = store
        .state(|s| s.registration.as_ref().unwrap().username.clone())
        .await;
    assert_eq!(username.availability, Availability::Available);
    assert!(
        !h.api
            .calls()
            .iter()
            .any(|call| matches!(call, ApiCall::CompleteRegistration(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn choosing_a_username_signs_in() {
    let h = harness();
    let token = mint_token("borges", Some(9), Some("ROLE_USER"), epoch().timestamp() + 3600);
    h.api.set_complete_registration(Ok(RegistrationResponse {
        token,
        user_id: Some(9),
        username: Some("borges".into()),
        email: Some("borges@example.com".into()),
        name: Some("Jorge".into()),
        role: Some("USER".into()),
    }));
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    type_username(&store, "borges").await;
    tokio::time::sleep(DEBOUNCE + ms(10)).await;
    store.send(AuthAction::CompleteRegistration).await.unwrap();
    settle(&store).await;

    assert!(store.state(|s| s.registration.is_none()).await);
    assert!(matches!(
        store.state(|s| s.flow.phase.clone()).await,
        FlowPhase::Success { .. }
    ));
    assert_eq!(
        h.navigator.routes(),
        vec![Route::CompleteRegistration, Route::Landing]
    );

    let user = h.env.session.current_user().unwrap();
    assert_eq!(user.username, "borges");
    assert_eq!(user.email.as_deref(), Some("borges@example.com"));
    assert!(
        h.api
            .calls()
            .contains(&ApiCall::CompleteRegistration("borges".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn email_required_callback_leads_to_verification() {
    let h = harness();
    h.api.set_submit_email(Ok("Verification email sent".into()));
    let store = store(&h);

    let query = CallbackQuery::parse("error=EMAIL_REQUIRED:pending-42").unwrap();
    store.send(AuthAction::CallbackReceived(query)).await.unwrap();
    settle(&store).await;

    let (step, token) = store
        .state(|s| {
            let registration = s.registration.as_ref().unwrap();
            (
                registration.step.clone(),
                registration.pending.pending_token.clone(),
            )
        })
        .await;
    assert_eq!(step, RegistrationStep::EnterEmail);
    assert_eq!(token, "pending-42");
    assert_eq!(h.navigator.last_route(), Some(Route::EmailRequired));

    store
        .send(AuthAction::FieldEdited {
            field: Field::Email,
            value: " Reader@Example.COM ".into(),
        })
        .await
        .unwrap();
    store.send(AuthAction::SubmitEmail).await.unwrap();
    settle(&store).await;

    let step = store
        .state(|s| s.registration.as_ref().unwrap().step.clone())
        .await;
    assert!(matches!(
        step,
        RegistrationStep::VerificationSent { email } if email == "reader@example.com"
    ));
    assert!(h.env.session.get().is_none());
}

#[tokio::test(start_paused = true)]
async fn expired_pending_token_is_discarded() {
    let h = harness();
    h.api.set_complete_registration(Err(AuthError::PendingTokenExpired));
    let store = store(&h);
    begin(&store, RegistrationStep::ChooseUsername).await;

    type_username(&store, "borges").await;
    tokio::time::sleep(DEBOUNCE + ms(10)).await;
    store.send(AuthAction::CompleteRegistration).await.unwrap();
    settle(&store).await;

    let registration = store
        .state(|s| s.registration.clone().unwrap())
        .await;
    assert_eq!(registration.step, RegistrationStep::Expired);
    assert!(registration.pending.pending_token.is_empty());
    assert_eq!(registration.error, Some(RegistrationError::SessionExpired));

    // A second attempt cannot reuse the discarded token.
    store.send(AuthAction::CompleteRegistration).await.unwrap();
    settle(&store).await;
    let completions = h
        .api
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ApiCall::CompleteRegistration(_)))
        .count();
    assert_eq!(completions, 1);
}

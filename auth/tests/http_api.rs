//! Server responses mapped to identity errors, against a local mock server.

#![allow(clippy::unwrap_used, clippy::panic)]

use bookclub_auth::callback::LinkRequest;
use bookclub_auth::error::AuthError;
use bookclub_auth::providers::{
    CompleteRegistrationRequest, HttpIdentityApi, IdentityApi, LinkResponse,
    PasswordResetRequest, ProfileUpdate, SubmitEmailRequest,
};
use bookclub_auth::state::{LinkStateToken, Password, UserId};
use bookclub_auth::{ClientConfig, ProviderName};
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn api() -> (MockServer, HttpIdentityApi) {
    let server = MockServer::start().await;
    let config = ClientConfig::new(server.uri(), "http://localhost:5173");
    let api = HttpIdentityApi::new(config).unwrap();
    (server, api)
}

fn link_request() -> LinkRequest {
    LinkRequest {
        provider: ProviderName::GitHub,
        provider_id: "gh-77".into(),
        oauth_email: Some("ana@example.com".into()),
        state_token: LinkStateToken("st-1".into()),
    }
}

async fn link_with(status: u16, body: serde_json::Value) -> Result<LinkResponse, AuthError> {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/link"))
        .and(header("authorization", "Bearer t-1"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    api.link("t-1", &link_request()).await
}

#[tokio::test]
async fn link_success_reports_email_mismatch() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/link"))
        .and(body_partial_json(json!({
            "provider": "GITHUB",
            "providerId": "gh-77",
            "stateToken": "st-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "emailMismatch": true,
            "oauthEmail": "ana@example.com",
            "accountEmail": "ana@bookclub.example"
        })))
        .mount(&server)
        .await;

    let LinkResponse::Linked { email_mismatch } = api.link("t-1", &link_request()).await.unwrap()
    else {
        panic!("expected a new link");
    };
    let mismatch = email_mismatch.unwrap();
    assert_eq!(mismatch.oauth_email, "ana@example.com");
    assert_eq!(mismatch.account_email, "ana@bookclub.example");
}

#[tokio::test]
async fn link_conflict_codes_are_distinguished() {
    assert_eq!(
        link_with(200, json!({"code": "ALREADY_LINKED"})).await,
        Ok(LinkResponse::AlreadyLinked)
    );
    assert_eq!(
        link_with(409, json!({"code": "ALREADY_LINKED_ELSEWHERE"})).await,
        Err(AuthError::AlreadyLinkedElsewhere)
    );
    assert_eq!(
        link_with(409, json!({"code": "PROVIDER_ALREADY_LINKED"})).await,
        Err(AuthError::ProviderAlreadyLinked(ProviderName::GitHub))
    );
    assert_eq!(
        link_with(400, json!({"code": "INVALID_STATE_TOKEN"})).await,
        Err(AuthError::InvalidLinkState)
    );
    assert_eq!(
        link_with(401, json!({"error": "Unauthorized"})).await,
        Err(AuthError::SessionExpired)
    );
}

#[tokio::test]
async fn disconnect_uses_the_provider_path() {
    let (server, api) = api().await;
    Mock::given(method("DELETE"))
        .and(path("/api/oauth/disconnect/GOOGLE"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "LAST_AUTH_METHOD",
            "message": "Cannot remove last authentication method"
        })))
        .mount(&server)
        .await;

    assert_eq!(
        api.disconnect("t-1", ProviderName::Google).await,
        Err(AuthError::LastAuthMethod)
    );
}

#[tokio::test]
async fn connect_url_is_read_from_the_body() {
    let (server, api) = api().await;
    Mock::given(method("GET"))
        .and(path("/api/oauth/connect/github"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authUrl": "https://github.com/login/oauth/authorize?state=st-1"
        })))
        .mount(&server)
        .await;

    assert_eq!(
        api.connect_url("t-1", ProviderName::GitHub).await.unwrap(),
        "https://github.com/login/oauth/authorize?state=st-1"
    );
}

#[tokio::test]
async fn pending_token_rejections_require_a_restart() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/complete-registration"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "Invalid or expired registration token"})),
        )
        .mount(&server)
        .await;

    let result = api
        .complete_registration(&CompleteRegistrationRequest {
            pending_token: "pending-1".into(),
            username: "borges".into(),
            name: None,
        })
        .await;
    assert_eq!(result, Err(AuthError::PendingTokenExpired));
    assert!(result.unwrap_err().requires_restart());
}

#[tokio::test]
async fn taken_username_on_completion() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/complete-registration"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "USERNAME_TAKEN"})),
        )
        .mount(&server)
        .await;

    let result = api
        .complete_registration(&CompleteRegistrationRequest {
            pending_token: "pending-1".into(),
            username: "borges".into(),
            name: None,
        })
        .await;
    assert_eq!(result, Err(AuthError::UsernameTaken));
}

#[tokio::test]
async fn existing_account_on_email_submission() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/submit-email"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": "ACCOUNT_EXISTS",
            "message": "An account with this email already exists"
        })))
        .mount(&server)
        .await;

    let result = api
        .submit_email(&SubmitEmailRequest {
            pending_token: "pending-1".into(),
            email: "ana@example.com".into(),
            username: None,
            name: None,
        })
        .await;
    assert_eq!(result, Err(AuthError::AccountExists));
}

#[tokio::test]
async fn availability_probes_treat_conflict_as_taken() {
    let (server, api) = api().await;
    Mock::given(method("GET"))
        .and(path("/api/available/username"))
        .and(query_param("username", "borges"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/available/username"))
        .and(query_param("username", "pessoa"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    assert!(!api.username_available("borges").await.unwrap());
    assert!(api.username_available("pessoa").await.unwrap());
}

#[tokio::test]
async fn unverified_login_is_its_own_error() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "Email not verified"})),
        )
        .mount(&server)
        .await;

    assert_eq!(
        api.login("ana", "secret").await,
        Err(AuthError::EmailNotVerified)
    );
}

#[tokio::test]
async fn password_reset_round_trip() {
    let (server, api) = api().await;
    Mock::given(method("POST"))
        .and(path("/api/forgot-password"))
        .and(body_partial_json(json!({"email": "ana@example.com"})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reset-password"))
        .and(query_param("token", "reset-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/reset-password"))
        .and(query_param("token", "stale"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/reset-password"))
        .and(body_partial_json(json!({"token": "reset-1", "password": "Str0ng!pass"})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    api.request_password_reset("ana@example.com").await.unwrap();
    assert!(api.validate_reset_token("reset-1").await.unwrap());
    assert!(!api.validate_reset_token("stale").await.unwrap());
    api.reset_password(&PasswordResetRequest {
        token: "reset-1".into(),
        password: "Str0ng!pass".into(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn expired_reset_link_is_its_own_error() {
    let (server, api) = api().await;
    Mock::given(method("PUT"))
        .and(path("/api/reset-password"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "Token expired"})),
        )
        .mount(&server)
        .await;

    let result = api
        .reset_password(&PasswordResetRequest {
            token: "reset-1".into(),
            password: "Str0ng!pass".into(),
        })
        .await;
    assert_eq!(result, Err(AuthError::ResetTokenInvalid));
}

#[tokio::test]
async fn profile_update_sends_the_user_part_and_reads_the_new_token() {
    let (server, api) = api().await;
    Mock::given(method("PUT"))
        .and(path("/api/user/7"))
        .and(header("authorization", "Bearer t-1"))
        .and(body_string_contains(r#""mail":"ana@example.com""#))
        .and(body_string_contains(r#""username":"ana_b""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t-2",
            "user": {"id": 7, "username": "ana_b", "hasPassword": true}
        })))
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        username: Some("ana_b".into()),
        email: Some("ana@example.com".into()),
        password: Some(Password::from("secret1")),
    };
    let response = api.update_profile("t-1", UserId(7), &update).await.unwrap();

    assert_eq!(response.token.as_deref(), Some("t-2"));
    let user = response.user.unwrap();
    assert_eq!(user.username, "ana_b");
    assert!(user.has_password);
}

#[tokio::test]
async fn profile_update_without_a_body_is_a_success() {
    let (server, api) = api().await;
    Mock::given(method("PUT"))
        .and(path("/api/user/7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        email: Some("ana@example.com".into()),
        ..ProfileUpdate::default()
    };
    let response = api.update_profile("t-1", UserId(7), &update).await.unwrap();
    assert_eq!(response.token, None);
    assert_eq!(response.user, None);
}

#[tokio::test]
async fn profile_update_conflicts() {
    let (server, api) = api().await;
    Mock::given(method("PUT"))
        .and(path("/api/user/7"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"message": "Username already exists"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/user/8"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let update = ProfileUpdate {
        username: Some("borges".into()),
        ..ProfileUpdate::default()
    };
    assert_eq!(
        api.update_profile("t-1", UserId(7), &update).await,
        Err(AuthError::UsernameTaken)
    );
    assert_eq!(
        api.update_profile("t-1", UserId(8), &update).await,
        Err(AuthError::SessionExpired)
    );
}

#[tokio::test]
async fn unreachable_server() {
    let config = ClientConfig::new("http://127.0.0.1:9", "http://localhost:5173");
    let api = HttpIdentityApi::new(config).unwrap();

    assert!(matches!(api.health().await, Err(AuthError::Unreachable(_))));
}

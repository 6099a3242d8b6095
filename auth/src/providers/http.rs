//! HTTP implementation of [`IdentityApi`] over `reqwest`.

use crate::callback::LinkRequest;
use crate::config::ClientConfig;
use crate::constants::codes;
use crate::error::{AuthError, Result};
use crate::providers::identity::{
    CompleteRegistrationRequest, IdentityApi, LinkResponse, LoginResponse, PasswordResetRequest,
    ProfileResponse, ProfileUpdate, RegisterRequest, RegistrationResponse, SubmitEmailRequest,
};
use crate::state::{EmailMismatch, ProviderName, UserId};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Identity API client for the forum server.
///
/// # Example
///
/// ```no_run
/// use bookclub_auth::ClientConfig;
/// use bookclub_auth::providers::HttpIdentityApi;
///
/// let api = HttpIdentityApi::new(ClientConfig::default())?;
/// # Ok::<(), bookclub_auth::AuthError>(())
/// ```
#[derive(Clone, Debug)]
pub struct HttpIdentityApi {
    client: Client,
    config: Arc<ClientConfig>,
}

/// Error body shape shared by the identity endpoints.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A non-2xx response, read once.
struct Failure {
    status: StatusCode,
    body: ErrorBody,
    raw: String,
}

impl Failure {
    async fn read(response: Response) -> Self {
        let status = response.status();
        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&raw).unwrap_or_default();
        Self { status, body, raw }
    }

    fn has_code(&self, code: &str) -> bool {
        self.body.code.as_deref() == Some(code) || self.body.error.as_deref() == Some(code)
    }

    /// Case-insensitive search across the code, error, message and raw text.
    fn mentions(&self, phrase: &str) -> bool {
        let phrase = phrase.to_lowercase();
        [
            self.body.code.as_deref(),
            self.body.error.as_deref(),
            self.body.message.as_deref(),
            Some(self.raw.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|text| text.to_lowercase().contains(&phrase))
    }

    fn message(&self) -> String {
        self.body
            .message
            .clone()
            .or_else(|| self.body.error.clone())
            .unwrap_or_else(|| self.raw.clone())
    }

    fn pending_token_rejected(&self) -> bool {
        self.has_code(codes::PENDING_TOKEN_EXPIRED)
            || self.mentions("expired")
            || self.mentions("invalid token")
            || self.mentions("invalid pending")
            || self.mentions("already used")
    }

    fn into_error(self) -> AuthError {
        tracing::debug!(status = self.status.as_u16(), "Identity request failed");
        AuthError::Server {
            status: self.status.as_u16(),
            message: self.message(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectUrlBody {
    auth_url: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    email_mismatch: bool,
    #[serde(default)]
    oauth_email: Option<String>,
    #[serde(default)]
    account_email: Option<String>,
}

#[derive(Default, Deserialize)]
struct MessageBody {
    #[serde(default)]
    message: String,
}

impl HttpIdentityApi {
    /// Create a client for `config.server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Create a client sharing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: Client, config: ClientConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn url(&self, path: &str) -> String {
        self.config.api_url(path)
    }

    async fn probe(&self, path: &str, key: &str, value: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(path))
            .query(&[(key, value)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            _ => Err(Failure::read(response).await.into_error()),
        }
    }
}

impl IdentityApi for HttpIdentityApi {
    #[tracing::instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let failure = Failure::read(response).await;
        if failure.mentions("not verified") {
            Err(AuthError::EmailNotVerified)
        } else if matches!(
            failure.status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST
        ) {
            Err(AuthError::InvalidCredentials)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, request), fields(username = %request.username))]
    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url("/register"))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let failure = Failure::read(response).await;
        if failure.has_code(codes::USERNAME_TAKEN) || failure.mentions("username already") {
            Err(AuthError::UsernameTaken)
        } else if failure.has_code(codes::ACCOUNT_EXISTS)
            || failure.mentions("email already")
            || failure.mentions("already exists")
        {
            Err(AuthError::AccountExists)
        } else if failure.status == StatusCode::BAD_REQUEST {
            Err(AuthError::Validation(failure.message()))
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip_all)]
    async fn verify_email(&self, token: &str) -> Result<LoginResponse> {
        let response = self
            .client
            .get(self.url("/verify-email"))
            .query(&[("token", token)])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let failure = Failure::read(response).await;
        if failure.status.is_client_error() {
            Err(AuthError::VerificationTokenInvalid)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self))]
    async fn resend_verification(&self, email: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/resend-verification"))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Failure::read(response).await.into_error())
        }
    }

    #[tracing::instrument(skip(self, request), fields(email = %request.email))]
    async fn submit_email(&self, request: &SubmitEmailRequest) -> Result<String> {
        let response = self
            .client
            .post(self.url("/oauth/submit-email"))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            let body: MessageBody = response.json().await.unwrap_or_default();
            return Ok(body.message);
        }

        let failure = Failure::read(response).await;
        if failure.mentions(codes::ACCOUNT_EXISTS) || failure.mentions("already exists") {
            Err(AuthError::AccountExists)
        } else if failure.has_code(codes::USERNAME_TAKEN) || failure.mentions("already taken") {
            Err(AuthError::UsernameTaken)
        } else if failure.pending_token_rejected() {
            Err(AuthError::PendingTokenExpired)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, request), fields(username = %request.username))]
    async fn complete_registration(
        &self,
        request: &CompleteRegistrationRequest,
    ) -> Result<RegistrationResponse> {
        let response = self
            .client
            .post(self.url("/oauth/complete-registration"))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let failure = Failure::read(response).await;
        if failure.mentions(codes::USERNAME_TAKEN) || failure.mentions("already taken") {
            Err(AuthError::UsernameTaken)
        } else if failure.mentions(codes::ACCOUNT_EXISTS) {
            Err(AuthError::AccountExists)
        } else if failure.pending_token_rejected() {
            Err(AuthError::PendingTokenExpired)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, bearer))]
    async fn connect_url(&self, bearer: &str, provider: ProviderName) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/oauth/connect/{}", provider.path_segment())))
            .bearer_auth(bearer)
            .send()
            .await?;

        if response.status().is_success() {
            let body: ConnectUrlBody = response.json().await?;
            return Ok(body.auth_url);
        }

        let failure = Failure::read(response).await;
        if failure.status == StatusCode::UNAUTHORIZED {
            Err(AuthError::SessionExpired)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, bearer, request), fields(provider = %request.provider))]
    async fn link(&self, bearer: &str, request: &LinkRequest) -> Result<LinkResponse> {
        let response = self
            .client
            .post(self.url("/oauth/link"))
            .bearer_auth(bearer)
            .json(&serde_json::json!({
                "provider": request.provider.as_str(),
                "providerId": request.provider_id,
                "oauthEmail": request.oauth_email,
                "stateToken": request.state_token.0,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            let body: LinkBody = response.json().await.unwrap_or_default();
            if body.code.as_deref() == Some(codes::ALREADY_LINKED) {
                return Ok(LinkResponse::AlreadyLinked);
            }
            let email_mismatch = body.email_mismatch.then(|| EmailMismatch {
                oauth_email: body.oauth_email.unwrap_or_default(),
                account_email: body.account_email.unwrap_or_default(),
            });
            return Ok(LinkResponse::Linked { email_mismatch });
        }

        let failure = Failure::read(response).await;
        if failure.has_code(codes::ALREADY_LINKED_ELSEWHERE) {
            Err(AuthError::AlreadyLinkedElsewhere)
        } else if failure.has_code(codes::PROVIDER_ALREADY_LINKED) {
            Err(AuthError::ProviderAlreadyLinked(request.provider))
        } else if failure.has_code(codes::ALREADY_LINKED) {
            Ok(LinkResponse::AlreadyLinked)
        } else if failure.has_code(codes::INVALID_STATE_TOKEN) || failure.mentions("state token") {
            Err(AuthError::InvalidLinkState)
        } else if failure.status == StatusCode::UNAUTHORIZED {
            Err(AuthError::SessionExpired)
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, bearer))]
    async fn disconnect(&self, bearer: &str, provider: ProviderName) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/oauth/disconnect/{}", provider.as_str())))
            .bearer_auth(bearer)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let failure = Failure::read(response).await;
        if failure.has_code(codes::LAST_AUTH_METHOD) {
            Err(AuthError::LastAuthMethod)
        } else if failure.status == StatusCode::UNAUTHORIZED {
            Err(AuthError::SessionExpired)
        } else {
            Err(failure.into_error())
        }
    }

    async fn username_available(&self, username: &str) -> Result<bool> {
        self.probe("/available/username", "username", username).await
    }

    async fn email_available(&self, email: &str) -> Result<bool> {
        self.probe("/available/mail", "mail", email).await
    }

    #[tracing::instrument(skip(self))]
    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/forgot-password"))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let failure = Failure::read(response).await;
        if failure.status == StatusCode::BAD_REQUEST {
            Err(AuthError::Validation(failure.message()))
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip_all)]
    async fn validate_reset_token(&self, token: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/reset-password"))
            .query(&[("token", token)])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            status if status.is_client_error() => Ok(false),
            _ => Err(Failure::read(response).await.into_error()),
        }
    }

    #[tracing::instrument(skip_all)]
    async fn reset_password(&self, request: &PasswordResetRequest) -> Result<()> {
        let response = self
            .client
            .put(self.url("/reset-password"))
            .json(request)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let failure = Failure::read(response).await;
        if matches!(failure.status, StatusCode::NOT_FOUND | StatusCode::GONE)
            || failure.mentions("expired")
            || failure.mentions("invalid token")
            || failure.mentions("invalid or")
        {
            Err(AuthError::ResetTokenInvalid)
        } else if failure.status == StatusCode::BAD_REQUEST {
            Err(AuthError::Validation(failure.message()))
        } else {
            Err(failure.into_error())
        }
    }

    #[tracing::instrument(skip(self, bearer, update))]
    async fn update_profile(
        &self,
        bearer: &str,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<ProfileResponse> {
        let user = Part::text(update.to_body(user_id).to_string()).mime_str("application/json")?;
        let response = self
            .client
            .put(self.url(&format!("/user/{user_id}")))
            .bearer_auth(bearer)
            .multipart(Form::new().part("user", user))
            .send()
            .await?;

        if response.status().is_success() {
            let raw = response.text().await?;
            if raw.trim().is_empty() {
                return Ok(ProfileResponse::default());
            }
            return Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Ignoring unrecognised profile response body");
                ProfileResponse::default()
            }));
        }

        let failure = Failure::read(response).await;
        if failure.status == StatusCode::UNAUTHORIZED {
            Err(AuthError::SessionExpired)
        } else if failure.has_code(codes::USERNAME_TAKEN) || failure.mentions("username already") {
            Err(AuthError::UsernameTaken)
        } else if failure.has_code(codes::ACCOUNT_EXISTS)
            || failure.mentions("email already")
            || failure.mentions("mail already")
        {
            Err(AuthError::AccountExists)
        } else if failure.status == StatusCode::BAD_REQUEST {
            Err(AuthError::Validation(failure.message()))
        } else {
            Err(failure.into_error())
        }
    }

    async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/oauth/health")).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Failure::read(response).await.into_error())
        }
    }
}

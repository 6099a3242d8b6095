//! Mock identity server API for testing.

use crate::callback::LinkRequest;
use crate::error::{AuthError, Result};
use crate::providers::{
    CompleteRegistrationRequest, IdentityApi, LinkResponse, LoginResponse, PasswordResetRequest,
    ProfileResponse, ProfileUpdate, RegisterRequest, RegistrationResponse, SubmitEmailRequest,
};
use crate::state::{ProviderName, UserId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A recorded API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    /// `login` for a username.
    Login(String),
    /// `register` for a username.
    Register(String),
    /// `verify_email`.
    VerifyEmail,
    /// `resend_verification` for an address.
    ResendVerification(String),
    /// `submit_email` for an address.
    SubmitEmail(String),
    /// `complete_registration` with a username.
    CompleteRegistration(String),
    /// `connect_url` for a provider.
    ConnectUrl(ProviderName),
    /// `link` for a provider.
    Link(ProviderName),
    /// `disconnect` for a provider.
    Disconnect(ProviderName),
    /// Username availability probe.
    UsernameAvailable(String),
    /// Email availability probe.
    EmailAvailable(String),
    /// `request_password_reset` for an address.
    RequestPasswordReset(String),
    /// `validate_reset_token`.
    ValidateResetToken,
    /// `reset_password`.
    ResetPassword,
    /// `update_profile` for an account.
    UpdateProfile(UserId),
    /// `health`.
    Health,
}

#[derive(Debug, Clone)]
struct Probe {
    result: Result<bool>,
    latency: Duration,
}

#[derive(Debug, Default)]
struct Script {
    login: Option<Result<LoginResponse>>,
    register: Option<Result<()>>,
    verify_email: Option<Result<LoginResponse>>,
    resend_verification: Option<Result<()>>,
    submit_email: Option<Result<String>>,
    complete_registration: Option<Result<RegistrationResponse>>,
    connect_url: Option<Result<String>>,
    link: Option<Result<LinkResponse>>,
    disconnect: Option<Result<()>>,
    health: Option<Result<()>>,
    request_password_reset: Option<Result<()>>,
    validate_reset_token: Option<Result<bool>>,
    reset_password: Option<Result<()>>,
    update_profile: Option<Result<ProfileResponse>>,
    usernames: HashMap<String, Probe>,
    emails: HashMap<String, Probe>,
    calls: Vec<ApiCall>,
}

/// Scripted identity server.
///
/// Each operation answers with whatever was scripted for it, or a `501`
/// server error if nothing was. Availability probes answer "free" unless a
/// value was scripted, and can be given a latency to model slow requests.
/// Clones share the script.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityApi {
    script: Arc<Mutex<Script>>,
}

fn unscripted<T>(operation: &str) -> Result<T> {
    Err(AuthError::Server {
        status: 501,
        message: format!("{operation} not scripted"),
    })
}

impl MockIdentityApi {
    /// Create a mock with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<T: Clone>(
        &self,
        call: ApiCall,
        pick: impl FnOnce(&Script) -> &Option<Result<T>>,
        operation: &str,
    ) -> Result<T> {
        let mut script = self.script();
        script.calls.push(call);
        pick(&script).clone().unwrap_or_else(|| unscripted(operation))
    }

    /// Script the login response.
    pub fn set_login(&self, result: Result<LoginResponse>) {
        self.script().login = Some(result);
    }

    /// Script the registration response.
    pub fn set_register(&self, result: Result<()>) {
        self.script().register = Some(result);
    }

    /// Script the email verification response.
    pub fn set_verify_email(&self, result: Result<LoginResponse>) {
        self.script().verify_email = Some(result);
    }

    /// Script the resend response.
    pub fn set_resend_verification(&self, result: Result<()>) {
        self.script().resend_verification = Some(result);
    }

    /// Script the email submission response.
    pub fn set_submit_email(&self, result: Result<String>) {
        self.script().submit_email = Some(result);
    }

    /// Script the registration completion response.
    pub fn set_complete_registration(&self, result: Result<RegistrationResponse>) {
        self.script().complete_registration = Some(result);
    }

    /// Script the connect URL response.
    pub fn set_connect_url(&self, result: Result<String>) {
        self.script().connect_url = Some(result);
    }

    /// Script the link response.
    pub fn set_link(&self, result: Result<LinkResponse>) {
        self.script().link = Some(result);
    }

    /// Script the disconnect response.
    pub fn set_disconnect(&self, result: Result<()>) {
        self.script().disconnect = Some(result);
    }

    /// Script the health response.
    pub fn set_health(&self, result: Result<()>) {
        self.script().health = Some(result);
    }

    /// Script the password reset request response.
    pub fn set_request_password_reset(&self, result: Result<()>) {
        self.script().request_password_reset = Some(result);
    }

    /// Script the reset token validation response.
    pub fn set_validate_reset_token(&self, result: Result<bool>) {
        self.script().validate_reset_token = Some(result);
    }

    /// Script the password reset response.
    pub fn set_reset_password(&self, result: Result<()>) {
        self.script().reset_password = Some(result);
    }

    /// Script the profile update response.
    pub fn set_update_profile(&self, result: Result<ProfileResponse>) {
        self.script().update_profile = Some(result);
    }

    /// Script the availability of `username`, answered after `latency`.
    pub fn set_username_available(
        &self,
        username: impl Into<String>,
        result: Result<bool>,
        latency: Duration,
    ) {
        self.script()
            .usernames
            .insert(username.into(), Probe { result, latency });
    }

    /// Script the availability of `email`, answered after `latency`.
    pub fn set_email_available(
        &self,
        email: impl Into<String>,
        result: Result<bool>,
        latency: Duration,
    ) {
        self.script()
            .emails
            .insert(email.into(), Probe { result, latency });
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script().calls.clone()
    }

    /// Usernames probed so far, in order.
    #[must_use]
    pub fn probed_usernames(&self) -> Vec<String> {
        self.script()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::UsernameAvailable(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    fn probe(
        &self,
        call: ApiCall,
        value: &str,
        field: fn(&Script) -> &HashMap<String, Probe>,
    ) -> Probe {
        let mut script = self.script();
        script.calls.push(call);
        field(&script).get(value).cloned().unwrap_or(Probe {
            result: Ok(true),
            latency: Duration::ZERO,
        })
    }
}

impl IdentityApi for MockIdentityApi {
    fn login(
        &self,
        username: &str,
        _password: &str,
    ) -> impl Future<Output = Result<LoginResponse>> + Send {
        let result = self.record(ApiCall::Login(username.to_string()), |s| &s.login, "login");
        async move { result }
    }

    fn register(&self, request: &RegisterRequest) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(
            ApiCall::Register(request.username.clone()),
            |s| &s.register,
            "register",
        );
        async move { result }
    }

    fn verify_email(&self, _token: &str) -> impl Future<Output = Result<LoginResponse>> + Send {
        let result = self.record(ApiCall::VerifyEmail, |s| &s.verify_email, "verify_email");
        async move { result }
    }

    fn resend_verification(&self, email: &str) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(
            ApiCall::ResendVerification(email.to_string()),
            |s| &s.resend_verification,
            "resend_verification",
        );
        async move { result }
    }

    fn submit_email(
        &self,
        request: &SubmitEmailRequest,
    ) -> impl Future<Output = Result<String>> + Send {
        let result = self.record(
            ApiCall::SubmitEmail(request.email.clone()),
            |s| &s.submit_email,
            "submit_email",
        );
        async move { result }
    }

    fn complete_registration(
        &self,
        request: &CompleteRegistrationRequest,
    ) -> impl Future<Output = Result<RegistrationResponse>> + Send {
        let result = self.record(
            ApiCall::CompleteRegistration(request.username.clone()),
            |s| &s.complete_registration,
            "complete_registration",
        );
        async move { result }
    }

    fn connect_url(
        &self,
        _bearer: &str,
        provider: ProviderName,
    ) -> impl Future<Output = Result<String>> + Send {
        let result = self.record(ApiCall::ConnectUrl(provider), |s| &s.connect_url, "connect_url");
        async move { result }
    }

    fn link(
        &self,
        _bearer: &str,
        request: &LinkRequest,
    ) -> impl Future<Output = Result<LinkResponse>> + Send {
        let result = self.record(ApiCall::Link(request.provider), |s| &s.link, "link");
        async move { result }
    }

    fn disconnect(
        &self,
        _bearer: &str,
        provider: ProviderName,
    ) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(ApiCall::Disconnect(provider), |s| &s.disconnect, "disconnect");
        async move { result }
    }

    fn username_available(&self, username: &str) -> impl Future<Output = Result<bool>> + Send {
        let probe = self.probe(
            ApiCall::UsernameAvailable(username.to_string()),
            username,
            |s| &s.usernames,
        );
        async move {
            if !probe.latency.is_zero() {
                tokio::time::sleep(probe.latency).await;
            }
            probe.result
        }
    }

    fn email_available(&self, email: &str) -> impl Future<Output = Result<bool>> + Send {
        let probe = self.probe(ApiCall::EmailAvailable(email.to_string()), email, |s| &s.emails);
        async move {
            if !probe.latency.is_zero() {
                tokio::time::sleep(probe.latency).await;
            }
            probe.result
        }
    }

    fn request_password_reset(&self, email: &str) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(
            ApiCall::RequestPasswordReset(email.to_string()),
            |s| &s.request_password_reset,
            "request_password_reset",
        );
        async move { result }
    }

    fn validate_reset_token(&self, _token: &str) -> impl Future<Output = Result<bool>> + Send {
        let result = self.record(
            ApiCall::ValidateResetToken,
            |s| &s.validate_reset_token,
            "validate_reset_token",
        );
        async move { result }
    }

    fn reset_password(
        &self,
        _request: &PasswordResetRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(ApiCall::ResetPassword, |s| &s.reset_password, "reset_password");
        async move { result }
    }

    fn update_profile(
        &self,
        _bearer: &str,
        user_id: UserId,
        _update: &ProfileUpdate,
    ) -> impl Future<Output = Result<ProfileResponse>> + Send {
        let result = self.record(
            ApiCall::UpdateProfile(user_id),
            |s| &s.update_profile,
            "update_profile",
        );
        async move { result }
    }

    fn health(&self) -> impl Future<Output = Result<()>> + Send {
        let result = self.record(ApiCall::Health, |s| &s.health, "health");
        async move { result }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_operations_fail() {
        let api = MockIdentityApi::new();
        let result = api.health().await;
        assert!(matches!(result, Err(AuthError::Server { status: 501, .. })));
        assert_eq!(api.calls(), vec![ApiCall::Health]);
    }

    #[tokio::test]
    async fn probes_default_to_available() {
        let api = MockIdentityApi::new();
        api.set_username_available("taken", Ok(false), Duration::ZERO);

        assert!(api.username_available("free").await.unwrap());
        assert!(!api.username_available("taken").await.unwrap());
        assert_eq!(api.probed_usernames(), vec!["free", "taken"]);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_latency_is_simulated() {
        let api = MockIdentityApi::new();
        api.set_username_available("slow", Ok(true), Duration::from_millis(300));

        let start = tokio::time::Instant::now();
        api.username_available("slow").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}

//! Pending-registration reducer.
//!
//! Resolves a provider login that authenticated a person but not an
//! account: collect an email (then verification continues from the
//! email), or choose a username (then the account is created and signed
//! in).
//!
//! # Debounced validation
//!
//! Every edit bumps the field's generation. Locally invalid values are
//! never sent to the server. Valid ones open a debounce window
//! (cancellable, so a newer edit supersedes it); when the window closes
//! for the current generation an availability probe starts. Probes are not
//! cancelled: their result carries the generation and value it checked,
//! and is dropped if the field has moved on.

use super::{EMAIL_DEBOUNCE, USERNAME_DEBOUNCE, debounce_id, navigate};
use crate::actions::AuthAction;
use crate::environment::AuthEnvironment;
use crate::error::AuthError;
use crate::providers::{
    CompleteRegistrationRequest, IdentityApi, KeyValueStorage, Navigator, PopupOpener,
    RegistrationResponse, SubmitEmailRequest,
};
use crate::state::{
    AuthState, Availability, FailureReason, Field, FieldError, FlowPhase, LoginFailure,
    PendingRegistration, RegistrationError, RegistrationState, RegistrationStep, Route, Session,
};
use crate::utils::{is_valid_email, is_valid_username, normalize_email};
use bookclub_core::effect::Effect;
use bookclub_core::reducer::Reducer;
use bookclub_core::{SmallVec, smallvec};
use std::marker::PhantomData;

/// Pending-registration reducer.
pub struct RegistrationReducer<A, S, N, P> {
    _phantom: PhantomData<fn() -> (A, S, N, P)>,
}

impl<A, S, N, P> RegistrationReducer<A, S, N, P> {
    /// Create a new registration reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<A, S, N, P> Default for RegistrationReducer<A, S, N, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, N, P> Clone for RegistrationReducer<A, S, N, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// The value a probe would check: trimmed, and lowercased for emails.
fn probe_value(field: Field, value: &str) -> String {
    match field {
        Field::Username => value.trim().to_string(),
        Field::Email => normalize_email(value),
    }
}

/// Validate `field` locally. `None` means the value may be sent to the
/// server.
fn local_error(field: Field, value: &str) -> Option<FieldError> {
    match field {
        Field::Username if !is_valid_username(value) => Some(FieldError::TooShort),
        Field::Email if !is_valid_email(value) => Some(FieldError::InvalidEmail),
        _ => None,
    }
}

const fn taken_error(field: Field) -> FieldError {
    match field {
        Field::Username => FieldError::UsernameTaken,
        Field::Email => FieldError::AccountExists,
    }
}

/// The pending token can no longer be used. Discard it; the user has to
/// start a new provider login.
fn expire(registration: &mut RegistrationState) {
    tracing::info!("Pending registration expired");
    metrics::counter!("auth.registration.expired").increment(1);
    registration.step = RegistrationStep::Expired;
    registration.pending.pending_token.clear();
    registration.error = Some(RegistrationError::SessionExpired);
}

/// Optional text, `None` when blank.
fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl<A, S, N, P> RegistrationReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    /// Open the debounce window for `field`, or cancel it if the value is
    /// locally invalid.
    fn schedule_check(
        registration: &mut RegistrationState,
        field: Field,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> Effect<AuthAction> {
        let state = registration.field_mut(field);
        state.generation += 1;
        state.error = None;

        if state.value.trim().is_empty() {
            state.availability = Availability::Idle;
            return Effect::Cancel {
                id: debounce_id(field),
            };
        }

        if let Some(error) = local_error(field, &probe_value(field, &state.value)) {
            state.availability = Availability::Invalid;
            state.error = Some(error);
            return Effect::Cancel {
                id: debounce_id(field),
            };
        }

        state.availability = Availability::Checking;
        let duration = match field {
            Field::Username => env.config.username_debounce,
            Field::Email => env.config.email_debounce,
        };
        Effect::Delay {
            duration,
            action: Box::new(AuthAction::DebounceElapsed {
                field,
                generation: state.generation,
            }),
        }
        .cancellable(debounce_id(field))
    }

    fn probe(field: Field, generation: u64, value: String, api: A) -> Effect<AuthAction> {
        Effect::Future(Box::pin(async move {
            let result = match field {
                Field::Username => api.username_available(&value).await,
                Field::Email => api.email_available(&value).await,
            };
            Some(AuthAction::AvailabilityChecked {
                field,
                generation,
                value,
                result,
            })
        }))
    }

    fn begin(
        state: &mut AuthState,
        pending: PendingRegistration,
        step: RegistrationStep,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        tracing::info!(step = ?step, "Starting pending registration");
        let route = match step {
            RegistrationStep::ChooseUsername => Route::CompleteRegistration,
            _ => Route::EmailRequired,
        };

        let mut registration = RegistrationState::new(pending, step);
        let check = if registration.username.value.is_empty() {
            Effect::None
        } else {
            Self::schedule_check(&mut registration, Field::Username, env)
        };
        state.registration = Some(registration);

        smallvec![check, navigate(&env.navigator, route)]
    }

    fn on_availability(
        registration: &mut RegistrationState,
        field: Field,
        generation: u64,
        value: &str,
        result: Result<bool, AuthError>,
    ) {
        let state = registration.field_mut(field);
        if state.generation != generation || probe_value(field, &state.value) != value {
            tracing::debug!(
                field = field.as_str(),
                generation,
                current = state.generation,
                "Discarding stale availability result"
            );
            return;
        }

        match result {
            Ok(true) => {
                state.availability = Availability::Available;
                state.error = None;
            },
            Ok(false) => {
                state.availability = Availability::Taken;
                state.error = Some(taken_error(field));
            },
            Err(error) => {
                tracing::warn!(field = field.as_str(), %error, "Availability probe failed");
                state.availability = Availability::Unknown;
            },
        }
    }

    fn submit_email(
        registration: &mut RegistrationState,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        if registration.submitting || registration.step != RegistrationStep::EnterEmail {
            return smallvec![Effect::None];
        }

        let email = normalize_email(&registration.email.value);
        if !is_valid_email(&email) {
            registration.email.availability = Availability::Invalid;
            registration.email.error = Some(FieldError::InvalidEmail);
            return smallvec![Effect::None];
        }
        if registration.email.availability == Availability::Taken {
            registration.email.error = Some(FieldError::AccountExists);
            return smallvec![Effect::None];
        }

        registration.submitting = true;
        registration.error = None;

        let username = non_blank(&registration.username.value);
        let request = SubmitEmailRequest {
            pending_token: registration.pending.pending_token.clone(),
            email: email.clone(),
            username: username.filter(|u| is_valid_username(u)),
            name: registration.display_name.clone(),
        };
        let api = env.api.clone();

        smallvec![
            Effect::Cancel { id: EMAIL_DEBOUNCE },
            Effect::Future(Box::pin(async move {
                let result = api.submit_email(&request).await;
                Some(AuthAction::EmailSubmitted { email, result })
            })),
        ]
    }

    fn complete(
        registration: &mut RegistrationState,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        if registration.submitting
            || matches!(
                registration.step,
                RegistrationStep::Expired | RegistrationStep::VerificationSent { .. }
            )
        {
            return smallvec![Effect::None];
        }

        let username = registration.username.value.trim().to_string();
        if !is_valid_username(&username) {
            registration.username.availability = Availability::Invalid;
            registration.username.error = Some(FieldError::TooShort);
            return smallvec![Effect::None];
        }
        match registration.username.availability {
            Availability::Taken => {
                registration.username.error = Some(FieldError::UsernameTaken);
                return smallvec![Effect::None];
            },
            Availability::Checking => {
                tracing::debug!("Username check still open, not completing yet");
                return smallvec![Effect::None];
            },
            _ => {},
        }

        registration.submitting = true;
        registration.error = None;

        let request = CompleteRegistrationRequest {
            pending_token: registration.pending.pending_token.clone(),
            username,
            name: registration.display_name.clone(),
        };
        let api = env.api.clone();

        smallvec![
            Effect::Cancel {
                id: USERNAME_DEBOUNCE
            },
            Effect::Future(Box::pin(async move {
                let result = api.complete_registration(&request).await;
                Some(AuthAction::RegistrationCompleted { result })
            })),
        ]
    }

    fn on_completed(
        state: &mut AuthState,
        result: Result<RegistrationResponse, AuthError>,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        let Some(registration) = state.registration.as_mut() else {
            return smallvec![Effect::None];
        };
        registration.submitting = false;

        let response = match result {
            Ok(response) => response,
            Err(AuthError::UsernameTaken) => {
                registration.username.availability = Availability::Taken;
                registration.username.error = Some(FieldError::UsernameTaken);
                return smallvec![Effect::None];
            },
            Err(AuthError::AccountExists) => {
                tracing::info!("Email belongs to an existing account, sending to login");
                state.registration = None;
                state.flow.phase = FlowPhase::Failure(LoginFailure::new(FailureReason::Provider(
                    AuthError::AccountExists.to_string(),
                )));
                return smallvec![navigate(&env.navigator, Route::Login)];
            },
            Err(error) if error.requires_restart() => {
                expire(registration);
                return smallvec![Effect::None];
            },
            Err(error) => {
                tracing::warn!(%error, "Registration completion failed");
                registration.error = Some(RegistrationError::Failed(error.to_string()));
                return smallvec![Effect::None];
            },
        };

        let session = Session::new(response.token.clone());
        let established = match response.user() {
            Some(user) => env.session.establish_with_user(session, user),
            None => env.session.establish(session),
        };

        match established {
            Ok(user) => {
                tracing::info!(username = %user.username, "Registration completed");
                metrics::counter!("auth.registration.completed").increment(1);
                state.registration = None;
                state.flow.phase = FlowPhase::Success { user };
                smallvec![navigate(&env.navigator, Route::Landing)]
            },
            Err(error) => {
                tracing::warn!(%error, "Server issued an unusable token");
                if let Some(registration) = state.registration.as_mut() {
                    registration.error = Some(RegistrationError::Failed(error.to_string()));
                }
                smallvec![Effect::None]
            },
        }
    }

    /// Actions against the form of a registration in progress.
    fn reduce_form(
        registration: &mut RegistrationState,
        action: AuthAction,
        env: &AuthEnvironment<A, S, N, P>,
    ) -> SmallVec<[Effect<AuthAction>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════════
            // Field Editing
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::FieldEdited { field, value } => {
                registration.field_mut(field).value = value;
                smallvec![Self::schedule_check(registration, field, env)]
            },

            AuthAction::DisplayNameEdited { name } => {
                registration.display_name = non_blank(&name);
                smallvec![Effect::None]
            },

            AuthAction::DebounceElapsed { field, generation } => {
                let current = registration.field(field);
                if current.generation != generation
                    || current.availability != Availability::Checking
                {
                    return smallvec![Effect::None];
                }
                let value = probe_value(field, &current.value);
                tracing::debug!(field = field.as_str(), generation, "Checking availability");
                smallvec![Self::probe(field, generation, value, env.api.clone())]
            },

            AuthAction::AvailabilityChecked {
                field,
                generation,
                value,
                result,
            } => {
                Self::on_availability(registration, field, generation, &value, result);
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Email Submission
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::SubmitEmail => Self::submit_email(registration, env),

            AuthAction::EmailSubmitted { email, result } => {
                registration.submitting = false;
                match result {
                    Ok(_) => {
                        tracing::info!("Verification email sent for pending registration");
                        metrics::counter!("auth.registration.email_submitted").increment(1);
                        registration.step = RegistrationStep::VerificationSent { email };
                    },
                    Err(AuthError::AccountExists) => {
                        registration.email.availability = Availability::Taken;
                        registration.email.error = Some(FieldError::AccountExists);
                    },
                    Err(AuthError::UsernameTaken) => {
                        registration.username.availability = Availability::Taken;
                        registration.username.error = Some(FieldError::UsernameTaken);
                    },
                    Err(error) if error.requires_restart() => expire(registration),
                    Err(error) => {
                        tracing::warn!(%error, "Email submission failed");
                        registration.error = Some(RegistrationError::Failed(error.to_string()));
                    },
                }
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Completion
            // ═══════════════════════════════════════════════════════════════════
            AuthAction::CompleteRegistration => Self::complete(registration, env),

            _ => smallvec![Effect::None],
        }
    }
}

impl<A, S, N, P> Reducer for RegistrationReducer<A, S, N, P>
where
    A: IdentityApi + Clone + 'static,
    S: KeyValueStorage + 'static,
    N: Navigator + Clone + 'static,
    P: PopupOpener + Clone + 'static,
{
    type State = AuthState;
    type Action = AuthAction;
    type Environment = AuthEnvironment<A, S, N, P>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AuthAction::BeginRegistration { pending, step } => Self::begin(state, pending, step, env),
            AuthAction::RegistrationCompleted { result } => Self::on_completed(state, result, env),
            AuthAction::AbandonRegistration => {
                tracing::info!("Pending registration abandoned");
                state.registration = None;
                if matches!(state.flow.phase, FlowPhase::EmailRequired(_)) {
                    state.flow.phase = FlowPhase::Idle;
                }
                smallvec![
                    Effect::Cancel {
                        id: USERNAME_DEBOUNCE
                    },
                    Effect::Cancel { id: EMAIL_DEBOUNCE },
                    navigate(&env.navigator, Route::Login),
                ]
            },
            other => match state.registration.as_mut() {
                Some(registration) => Self::reduce_form(registration, other, env),
                None => {
                    tracing::debug!("No pending registration, ignoring action");
                    smallvec![Effect::None]
                },
            },
        }
    }
}

//! # Bookclub Authentication
//!
//! The identity subsystem of the bookclub client: OAuth logins by redirect
//! or popup, pending registrations that still need an email or a username,
//! linking and unlinking providers on an existing account, and the one
//! session store everything else reads.
//!
//! ## Architecture
//!
//! Identity is implemented as reducers and effects:
//!
//! ```text
//! Action → Reducer → (State, Effects) → Effect Execution → More Actions
//! ```
//!
//! Server calls, navigation, popups and timers are effects; their results
//! come back as actions. Credentials are only ever written through the
//! [`SessionStore`], whose synchronous operations run inside the reducers.
//!
//! ## Example: redirect login callback
//!
//! ```rust,ignore
//! use bookclub_auth::*;
//! use bookclub_runtime::Store;
//!
//! let store = Store::new(AuthState::default(), AuthReducer::new(), env);
//!
//! // The callback page loaded with ?token=...
//! let query = CallbackQuery::parse(location_search)?;
//! store.send(AuthAction::CallbackReceived(query)).await?;
//!
//! // Signed in, and the host was asked to show the landing view.
//! let user = env.session.current_user();
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod actions;
pub mod callback;
pub mod category;
pub mod claims;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod popup;
pub mod presentation;
pub mod providers;
pub mod reducers;
pub mod session;
pub mod state;
pub mod stores;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use actions::AuthAction;
pub use callback::{CallbackQuery, ConnectCallback, LinkRequest};
pub use category::ErrorCategory;
pub use claims::{Claims, ClaimsError};
pub use config::ClientConfig;
pub use environment::AuthEnvironment;
pub use error::{AuthError, ErrorKind, Result};
pub use popup::{PopupMessage, PopupResponder, WindowMessage};
pub use reducers::AuthReducer;
pub use session::SessionStore;
pub use state::{
    AuthState, AuthUser, Field, FlowPhase, LinkResult, PendingRegistration, PopupId,
    ProviderName, RegistrationStep, Role, Route, Session, UserId,
};

//! Identity providers.
//!
//! Traits for everything the identity reducers reach outside themselves
//! for: the server API, durable storage, navigation and popup windows.
//! Reducers depend on the traits; hosts inject implementations.
//!
//! This enables:
//! - **Testing**: in-memory mocks with scripted responses and latencies
//! - **Production**: [`HttpIdentityApi`] and
//!   [`FileStorage`](crate::stores::FileStorage)

pub mod http;
pub mod identity;
pub mod navigator;
pub mod storage;

pub use http::HttpIdentityApi;
pub use identity::{
    CompleteRegistrationRequest, IdentityApi, LinkResponse, LoginResponse, PasswordResetRequest,
    ProfileResponse, ProfileUpdate, RegisterRequest, RegistrationResponse, SubmitEmailRequest,
};
pub use navigator::{Navigator, PopupOpener};
pub use storage::{KeyValueStorage, StorageWrite};

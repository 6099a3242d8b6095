//! Identity constants.
//!
//! Storage keys, reserved markers and the error codes the server uses.

/// Keys in durable client storage. All three are removed together on logout.
pub mod storage_keys {
    /// Bearer token.
    pub const AUTH_TOKEN: &str = "auth_token";

    /// Refresh token, when the server issued one.
    pub const REFRESH_TOKEN: &str = "refresh_token";

    /// JSON snapshot of the last known `AuthUser`.
    pub const AUTH_USER: &str = "auth_user";

    /// Every key the session owns.
    pub const ALL: [&str; 3] = [AUTH_TOKEN, REFRESH_TOKEN, AUTH_USER];
}

/// Reserved prefix on a callback `error` that carries a pending token.
pub const EMAIL_REQUIRED_PREFIX: &str = "EMAIL_REQUIRED:";

/// Role prefix some server responses carry (`ROLE_ADMIN`).
pub const ROLE_PREFIX: &str = "ROLE_";

/// Normalized administrator role.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Role assigned when neither claims nor server name one.
pub const DEFAULT_ROLE: &str = "USER";

/// Minimum username length accepted by the server.
pub const MIN_USERNAME_LEN: usize = 3;

/// Password length bounds on the reset form.
pub const RESET_PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=60;

/// Minimum length of a password set from the profile.
pub const MIN_PROFILE_PASSWORD_LEN: usize = 6;

/// Error codes found in server response bodies.
pub mod codes {
    /// Link request for a pairing that already exists (success no-op).
    pub const ALREADY_LINKED: &str = "ALREADY_LINKED";

    /// Provider identity bound to another account.
    pub const ALREADY_LINKED_ELSEWHERE: &str = "ALREADY_LINKED_ELSEWHERE";

    /// Current account already has another identity for the provider.
    pub const PROVIDER_ALREADY_LINKED: &str = "PROVIDER_ALREADY_LINKED";

    /// Disconnect would remove the last sign-in method.
    pub const LAST_AUTH_METHOD: &str = "LAST_AUTH_METHOD";

    /// Chosen username is taken.
    pub const USERNAME_TAKEN: &str = "USERNAME_TAKEN";

    /// Email belongs to an existing account.
    pub const ACCOUNT_EXISTS: &str = "ACCOUNT_EXISTS";

    /// Link state token unknown, expired or bound to another account.
    pub const INVALID_STATE_TOKEN: &str = "INVALID_STATE_TOKEN";

    /// Pending registration token expired or already consumed.
    pub const PENDING_TOKEN_EXPIRED: &str = "PENDING_TOKEN_EXPIRED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_distinct() {
        let mut keys = storage_keys::ALL.to_vec();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"auth_token"));
    }

    #[test]
    fn email_required_marker_splits_off_the_pending_token() {
        let error = "EMAIL_REQUIRED:abc123";
        assert_eq!(error.strip_prefix(EMAIL_REQUIRED_PREFIX), Some("abc123"));
    }
}

//! Local input validation.

use crate::constants::{MIN_PROFILE_PASSWORD_LEN, MIN_USERNAME_LEN, RESET_PASSWORD_LEN};

/// Loose syntactic email check: `local@domain.tld`, no whitespace, one `@`.
///
/// ```
/// use bookclub_auth::utils::is_valid_email;
///
/// assert!(is_valid_email("reader@books.io"));
/// assert!(!is_valid_email("reader@books"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Whether a username is long enough to be worth checking with the server.
#[must_use]
pub fn is_valid_username(username: &str) -> bool {
    username.trim().chars().count() >= MIN_USERNAME_LEN
}

/// Normalize an email for comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Why a new password is not acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordProblem {
    /// Password and confirmation differ.
    Mismatch,
    /// Outside the allowed length.
    Length,
    /// Missing an uppercase letter, a lowercase letter, a digit or a
    /// symbol.
    Weak,
}

impl PasswordProblem {
    /// Short message for a validation error.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Mismatch => "passwords do not match",
            Self::Length => "password must be between 8 and 60 characters",
            Self::Weak => {
                "password must contain uppercase, lowercase, number, and special character"
            },
        }
    }
}

/// Check a new password chosen through a reset link.
///
/// ```
/// use bookclub_auth::utils::{PasswordProblem, check_reset_password};
///
/// assert_eq!(check_reset_password("Str0ng!pass", "Str0ng!pass"), Ok(()));
/// assert_eq!(check_reset_password("weakpassword", "weakpassword"), Err(PasswordProblem::Weak));
/// ```
///
/// # Errors
///
/// Returns the first [`PasswordProblem`] found.
pub fn check_reset_password(password: &str, confirmation: &str) -> Result<(), PasswordProblem> {
    if password != confirmation {
        return Err(PasswordProblem::Mismatch);
    }
    if !RESET_PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(PasswordProblem::Length);
    }

    let upper = password.chars().any(char::is_uppercase);
    let lower = password.chars().any(char::is_lowercase);
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());
    if upper && lower && digit && symbol {
        Ok(())
    } else {
        Err(PasswordProblem::Weak)
    }
}

/// Whether a password set from the profile is long enough.
#[must_use]
pub fn is_valid_profile_password(password: &str) -> bool {
    password.chars().count() >= MIN_PROFILE_PASSWORD_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at.example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@b@c.de"));
    }

    #[test]
    fn username_length_is_counted_after_trimming() {
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("  ab  "));
        assert!(is_valid_username("abc"));
    }

    #[test]
    fn email_comparison_ignores_case_and_padding() {
        assert_eq!(normalize_email(" Ana@Books.IO "), "ana@books.io");
    }

    #[test]
    fn reset_passwords_need_every_character_class() {
        assert_eq!(check_reset_password("Abcdef1!", "Abcdef1!"), Ok(()));
        assert_eq!(check_reset_password("Abcdef1!", "Abcdef1?"), Err(PasswordProblem::Mismatch));
        assert_eq!(check_reset_password("Ab1!", "Ab1!"), Err(PasswordProblem::Length));
        let long = format!("Aa1!{}", "x".repeat(57));
        assert_eq!(check_reset_password(&long, &long), Err(PasswordProblem::Length));
        assert_eq!(check_reset_password("abcdef1!", "abcdef1!"), Err(PasswordProblem::Weak));
        assert_eq!(check_reset_password("Abcdefg!", "Abcdefg!"), Err(PasswordProblem::Weak));
        assert_eq!(check_reset_password("Abcdefg1", "Abcdefg1"), Err(PasswordProblem::Weak));
    }

    #[test]
    fn profile_passwords_only_need_length() {
        assert!(!is_valid_profile_password("abcde"));
        assert!(is_valid_profile_password("abcdef"));
    }
}

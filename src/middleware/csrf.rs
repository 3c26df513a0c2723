//! CSRF protection for form posts.
//!
//! One token per session, stored in the session cookie and rendered into
//! every form as the hidden field `csrf_token`:
//!
//! ```html,ignore
//! <form method="post">
//!     <input type="hidden" name="csrf_token" value="{{ client.get_csrf_token() }}">
//! </form>
//! ```
//!
//! Handlers call `validate_csrf_token` before touching any state.
use actix_web::{error, Error};
use rand::{distributions::Alphanumeric, Rng};

pub const CSRF_TOKEN_LENGTH: usize = 32;
pub const CSRF_FIELD: &str = "csrf_token";
const CSRF_SESSION_KEY: &str = "csrf_token";

pub fn generate_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Get or create the CSRF token for the current session.
///
/// Called by `ClientCtx` on every request, so templates always have a token.
pub fn get_or_create_csrf_token(session: &actix_session::Session) -> Result<String, Error> {
    match session.get::<String>(CSRF_SESSION_KEY) {
        Ok(Some(token)) => Ok(token),
        _ => {
            let token = generate_csrf_token();
            session
                .insert(CSRF_SESSION_KEY, token.clone())
                .map_err(|_| error::ErrorInternalServerError("Failed to store CSRF token"))?;
            Ok(token)
        }
    }
}

/// Compares the submitted token with the session's. 403 on mismatch.
pub fn validate_csrf_token(
    session: &actix_session::Session,
    provided_token: &str,
) -> Result<(), Error> {
    let expected_token = session
        .get::<String>(CSRF_SESSION_KEY)
        .map_err(|_| error::ErrorInternalServerError("Failed to get CSRF token"))?
        .ok_or_else(|| error::ErrorForbidden("CSRF token not found in session"))?;

    if !constant_time_eq(provided_token.as_bytes(), expected_token.as_bytes()) {
        log::warn!("CSRF token validation failed");
        return Err(error::ErrorForbidden("Invalid CSRF token"));
    }

    Ok(())
}

/// Validates the `csrf_token` entry of a loosely typed form.
pub fn validate_form_token(
    session: &actix_session::Session,
    form: &std::collections::HashMap<String, String>,
) -> Result<(), Error> {
    let token = form
        .get(CSRF_FIELD)
        .ok_or_else(|| error::ErrorBadRequest("CSRF token missing"))?;
    validate_csrf_token(session, token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_distinct_and_sized() {
        let a = generate_csrf_token();
        let b = generate_csrf_token();
        assert_eq!(a.len(), CSRF_TOKEN_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

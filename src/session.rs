//! Password hashing and cookie session bookkeeping.
//!
//! The session cookie carries the user id, an expiry timestamp and a blake3
//! hash of the stored password hash. Changing the password changes that hash,
//! which invalidates every other session of the user.

use crate::orm::users;
use actix_session::Session;
use actix_web::{error, Error};
use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::Utc;
use once_cell::sync::Lazy;
use sea_orm::{DatabaseConnection, EntityTrait};

const SESSION_USER_ID: &str = "user_id";
const SESSION_AUTH_HASH: &str = "auth_hash";
const SESSION_EXPIRES_AT: &str = "expires_at";

/// Verified against when the username is unknown, so both failures cost the same.
pub static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("not-a-real-password").unwrap_or_default());

pub fn get_argon2() -> Argon2<'static> {
    Argon2::default()
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(get_argon2()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// False for a wrong password and for a malformed stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => get_argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("verify_password: unreadable password hash: {}", e);
            false
        }
    }
}

/// Fingerprint of the stored password hash kept in the cookie.
pub fn auth_hash(password_hash: &str) -> String {
    blake3::hash(password_hash.as_bytes()).to_hex().to_string()
}

/// Session lifetime in seconds for a fresh login.
pub fn session_lifetime_secs(remember_me: bool) -> i64 {
    let security = crate::app_config::security();
    if remember_me {
        i64::from(security.remember_me_days) * 24 * 60 * 60
    } else {
        i64::from(security.session_timeout_minutes) * 60
    }
}

/// Binds the session to `user`. The session id is renewed first.
pub fn start_session(session: &Session, user: &users::Model, remember_me: bool) -> Result<(), Error> {
    let expires_at = Utc::now().timestamp() + session_lifetime_secs(remember_me);

    session.renew();
    session
        .insert(SESSION_USER_ID, user.id)
        .and_then(|_| session.insert(SESSION_AUTH_HASH, auth_hash(&user.password)))
        .and_then(|_| session.insert(SESSION_EXPIRES_AT, expires_at))
        .map_err(|e| {
            log::error!("start_session: {}", e);
            error::ErrorInternalServerError("Unable to start session.")
        })
}

/// Re-binds the current session after the user changed their own password.
pub fn refresh_auth_hash(session: &Session, user: &users::Model) -> Result<(), Error> {
    session
        .insert(SESSION_AUTH_HASH, auth_hash(&user.password))
        .map_err(|e| {
            log::error!("refresh_auth_hash: {}", e);
            error::ErrorInternalServerError("Unable to update session.")
        })
}

/// Drops all session state under a fresh session id. Unlike a purge the
/// cookie survives, so a flash can still be attached afterwards.
pub fn end_session(session: &Session) {
    session.clear();
    session.renew();
}

/// Drops the login but keeps the CSRF token and pending flashes.
fn clear_identity(session: &Session) {
    session.remove(SESSION_USER_ID);
    session.remove(SESSION_AUTH_HASH);
    session.remove(SESSION_EXPIRES_AT);
}

/// Resolves the logged in user, if any.
///
/// Expired sessions, sessions of deactivated users and sessions whose
/// password fingerprint no longer matches are logged out.
pub async fn authenticate_client_by_session(
    session: &Session,
    db: &DatabaseConnection,
) -> Option<users::Model> {
    let user_id = match session.get::<i32>(SESSION_USER_ID) {
        Ok(Some(id)) => id,
        Ok(None) => return None,
        Err(e) => {
            log::debug!("authenticate_client_by_session: bad user_id: {}", e);
            clear_identity(session);
            return None;
        }
    };

    let expires_at = session.get::<i64>(SESSION_EXPIRES_AT).ok().flatten();
    if expires_at.map_or(true, |t| t < Utc::now().timestamp()) {
        log::debug!("Session for user {} expired", user_id);
        clear_identity(session);
        return None;
    }

    let user = match users::Entity::find_by_id(user_id).one(db).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            clear_identity(session);
            return None;
        }
        Err(e) => {
            log::error!("authenticate_client_by_session: {}", e);
            return None;
        }
    };

    let stored = session.get::<String>(SESSION_AUTH_HASH).ok().flatten();
    if !user.is_active || stored.as_deref() != Some(auth_hash(&user.password).as_str()) {
        log::debug!("Session for user {} no longer valid", user_id);
        clear_identity(session);
        return None;
    }

    Some(user)
}

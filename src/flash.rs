//! One-shot messages stored in the session and shown on the next page.

use actix_session::Session;
use serde::{Deserialize, Serialize};

const FLASH_SESSION_KEY: &str = "_flashes";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

impl FlashMessage {
    /// CSS class used by the base template.
    pub fn css_class(&self) -> &'static str {
        match self.level {
            FlashLevel::Success => "flash flash-success",
            FlashLevel::Info => "flash flash-info",
            FlashLevel::Warning => "flash flash-warning",
            FlashLevel::Error => "flash flash-error",
        }
    }
}

pub fn push<S: Into<String>>(session: &Session, level: FlashLevel, message: S) {
    let mut queue = session
        .get::<Vec<FlashMessage>>(FLASH_SESSION_KEY)
        .ok()
        .flatten()
        .unwrap_or_default();
    queue.push(FlashMessage {
        level,
        message: message.into(),
    });
    if let Err(e) = session.insert(FLASH_SESSION_KEY, queue) {
        log::error!("flash::push: {}", e);
    }
}

pub fn success<S: Into<String>>(session: &Session, message: S) {
    push(session, FlashLevel::Success, message)
}

pub fn info<S: Into<String>>(session: &Session, message: S) {
    push(session, FlashLevel::Info, message)
}

pub fn warning<S: Into<String>>(session: &Session, message: S) {
    push(session, FlashLevel::Warning, message)
}

pub fn error<S: Into<String>>(session: &Session, message: S) {
    push(session, FlashLevel::Error, message)
}

/// Removes and returns every queued message.
pub fn take(session: &Session) -> Vec<FlashMessage> {
    session
        .remove_as::<Vec<FlashMessage>>(FLASH_SESSION_KEY)
        .and_then(Result::ok)
        .unwrap_or_default()
}

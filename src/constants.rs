//! Application-wide constants
//!
//! This module contains constants used throughout the application.

/// Study levels a course or student may be placed in.
pub const LEVELS: [i32; 4] = [1, 2, 3, 4];

/// Extensions accepted for lecture uploads. Compared case-insensitively.
pub const ALLOWED_LECTURE_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "ppt", "pptx", "mp4", "mp3", "jpg", "png", "zip",
];

/// Extensions accepted for profile images.
pub const ALLOWED_PROFILE_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Storage prefix for lecture files, followed by `YYYY/MM/`.
pub const LECTURES_PREFIX: &str = "lectures";

/// Storage prefix for profile images.
pub const PROFILES_PREFIX: &str = "profiles";

pub const DEFAULT_ACADEMIC_YEAR: &str = "2025/2026";

pub const DEFAULT_CREDIT_HOURS: i32 = 3;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Default username displayed for unauthenticated users
pub const GUEST_USERNAME: &str = "Guest";

pub fn level_label(level: Option<i32>) -> &'static str {
    match level {
        Some(1) => "Level 1",
        Some(2) => "Level 2",
        Some(3) => "Level 3",
        Some(4) => "Level 4",
        _ => "-",
    }
}

/// Formats a byte count as B, KB or MB.
pub fn human_size(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let b = bytes.max(0) as f64;
    if b < KB {
        format!("{} B", bytes.max(0))
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / MB)
    }
}

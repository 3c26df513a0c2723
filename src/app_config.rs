//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with SACM_, sections split by `__`)
//! 2. Config file (config.toml)
//! 3. Default values
//!
//! Secrets like the session key and database password are read directly from
//! the environment and never from the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// Site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub description: String,
    pub base_url: String,
    /// Address the HTTP server binds to
    pub bind_address: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "S-ACM".to_string(),
            description: "Academic content management".to_string(),
            base_url: "http://localhost:8000".to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Session lifetime in minutes when "remember me" is not ticked
    pub session_timeout_minutes: u32,
    /// Session lifetime in days when "remember me" is ticked
    pub remember_me_days: u32,
    /// Only send the session cookie over HTTPS
    pub secure_cookies: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_timeout_minutes: 120,
            remember_me_days: 14,
            secure_cookies: false,
        }
    }
}

/// Content limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in MB
    pub max_upload_size_mb: u32,
    /// Profile image size limit in MB
    pub max_profile_image_size_mb: u32,
    /// Items shown in each "recent" dashboard panel
    pub dashboard_recent: u64,
    /// Rows per page on admin listings
    pub admin_page_size: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size_mb: 50,
            max_profile_image_size_mb: 5,
            dashboard_recent: 5,
            admin_page_size: 25,
        }
    }
}

impl LimitsConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_size_mb as usize * 1024 * 1024
    }

    pub fn max_profile_image_bytes(&self) -> usize {
        self.max_profile_image_size_mb as usize * 1024 * 1024
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for uploaded media, served under /media
    pub media_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_root: "./media".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub security: SecurityConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g. SACM_SITE__NAME, SACM_STORAGE__MEDIA_ROOT
            .add_source(
                Environment::with_prefix("SACM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reload configuration from file
    pub fn reload() -> Result<(), ConfigError> {
        let new_config = Self::load()?;
        if let Ok(mut config) = APP_CONFIG.write() {
            *config = new_config;
            log::info!("Configuration reloaded");
        }
        Ok(())
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = get_config();
    log::info!(
        "Configuration loaded: site.name = {}, storage.media_root = {}",
        config.site.name,
        config.storage.media_root
    );
}

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

pub fn site() -> SiteConfig {
    get_config().site
}

pub fn security() -> SecurityConfig {
    get_config().security
}

pub fn limits() -> LimitsConfig {
    get_config().limits
}

pub fn storage() -> StorageConfig {
    get_config().storage
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.site.name, "S-ACM");
        assert_eq!(config.security.session_timeout_minutes, 120);
        assert_eq!(config.limits.dashboard_recent, 5);
        assert_eq!(config.storage.media_root, "./media");
    }

    #[test]
    fn test_upload_limit_in_bytes() {
        let limits = LimitsConfig {
            max_upload_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(limits.max_upload_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[site]
name = "Test Academy"
base_url = "https://academy.example.com"

[security]
remember_me_days = 30

[storage]
media_root = "/var/lib/sacm/media"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.site.name, "Test Academy");
        assert_eq!(config.site.base_url, "https://academy.example.com");
        assert_eq!(config.security.remember_me_days, 30);
        assert_eq!(config.storage.media_root, "/var/lib/sacm/media");
        // Unspecified values keep their defaults.
        assert_eq!(config.security.session_timeout_minutes, 120);
        assert_eq!(config.limits.admin_page_size, 25);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        std::env::set_var("SACM_LIMITS__MAX_UPLOAD_SIZE_MB", "7");
        let config = AppConfig::load_from_path("/nonexistent/config.toml").unwrap();
        std::env::remove_var("SACM_LIMITS__MAX_UPLOAD_SIZE_MB");

        assert_eq!(config.limits.max_upload_size_mb, 7);
    }

    #[test]
    #[serial]
    fn test_missing_config_file_uses_defaults() {
        let config = AppConfig::load_from_path("/nonexistent/config.toml").unwrap();
        assert_eq!(config.site.name, "S-ACM");
        assert_eq!(config.limits.max_profile_image_size_mb, 5);
    }
}

//! Configuration management for formgate
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `FORMGATE_` prefix)
//! 2. `./formgate.toml` (or an explicit path)
//! 3. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # formgate.toml
//! [csrf]
//! secret = "change-me-to-a-long-random-value"
//! token_timeout_secs = 300
//!
//! [session]
//! cookie_name = "formgate_session"
//! max_age_secs = 86400
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use formgate::config::FormgateConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = FormgateConfig::load()?;
//! let timeout = config.csrf.token_timeout_secs;
//! # Ok(())
//! # }
//! ```

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// CSRF grant settings.
///
/// The secret is the HMAC key behind every token signature and must be
/// treated as a confidential credential; `Debug` output redacts it.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfSettings {
    /// HMAC key for token signatures.
    pub secret: String,

    /// Grant lifetime in seconds.
    pub token_timeout_secs: u64,

    /// Name of the hidden input carrying the token.
    pub form_field: String,

    /// Name of the hidden input carrying the page/form reference.
    pub form_ref_field: String,

    /// Path prefix of the keep-alive endpoint the injected script posts to.
    pub keep_alive_path: String,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_timeout_secs: 300,
            form_field: "csrf_token".to_string(),
            form_ref_field: "form_ref".to_string(),
            keep_alive_path: "/csrf/keepalive".to_string(),
        }
    }
}

impl std::fmt::Debug for CsrfSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfSettings")
            .field("secret", &"<redacted>")
            .field("token_timeout_secs", &self.token_timeout_secs)
            .field("form_field", &self.form_field)
            .field("form_ref_field", &self.form_ref_field)
            .field("keep_alive_path", &self.keep_alive_path)
            .finish()
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie name for the session id.
    pub cookie_name: String,

    /// Session TTL in seconds.
    pub max_age_secs: u64,

    /// HTTP-only cookie (recommended: true).
    pub http_only: bool,

    /// Secure cookie (HTTPS only).
    pub secure: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "formgate_session".to_string(),
            max_age_secs: 86400, // 24 hours
            http_only: true,
            secure: !cfg!(debug_assertions),
        }
    }
}

/// Complete formgate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormgateConfig {
    /// CSRF grant settings.
    #[serde(default)]
    pub csrf: CsrfSettings,

    /// Session cookie settings.
    #[serde(default)]
    pub session: SessionSettings,
}

impl FormgateConfig {
    /// Load configuration from `./formgate.toml` and `FORMGATE_*` environment
    /// variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a source fails to parse or when no signing
    /// secret is configured.
    pub fn load() -> anyhow::Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file("formgate.toml"))
                .merge(Env::prefixed("FORMGATE_").split("__")),
        )
    }

    /// Load configuration from a specific TOML file, still honoring
    /// `FORMGATE_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when the file fails to parse or when no signing
    /// secret is configured.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed("FORMGATE_").split("__")),
        )
    }

    fn extract(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract()?;
        if config.csrf.secret.is_empty() {
            anyhow::bail!("csrf.secret must be configured (FORMGATE_CSRF__SECRET)");
        }
        Ok(config)
    }
}

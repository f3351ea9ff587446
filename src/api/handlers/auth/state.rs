//! Auth state and configuration shared by the login, session and guard handlers.

use secrecy::{ExposeSecret, SecretString};
use std::{fmt, sync::Arc, time::Duration};
use tracing::warn;

use super::{
    codec::{SessionCodec, SessionError},
    throttle::LoginThrottle,
    utils::constant_time_eq,
};

pub const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct AuthConfig {
    admin_user: String,
    admin_password: Option<SecretString>,
    session_ttl_seconds: u64,
    session_cookie_secure: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            admin_password: None,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_cookie_secure: false,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_admin_user(mut self, user: &str) -> Self {
        self.admin_user = user.trim().to_string();
        self
    }

    /// An empty password counts as unset.
    #[must_use]
    pub fn with_admin_password(mut self, password: Option<SecretString>) -> Self {
        self.admin_password = password.filter(|secret| !secret.expose_secret().is_empty());
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_cookie_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn admin_user(&self) -> &str {
        &self.admin_user
    }

    #[must_use]
    pub fn admin_password(&self) -> Option<&SecretString> {
        self.admin_password.as_ref()
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> u64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.session_cookie_secure
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_user", &self.admin_user)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("session_cookie_secure", &self.session_cookie_secure)
            .finish()
    }
}

#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    codec: SessionCodec,
    throttle: Arc<LoginThrottle>,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the signing key cannot be set up.
    pub fn new(config: AuthConfig, throttle: Arc<LoginThrottle>) -> Result<Self, SessionError> {
        let codec = SessionCodec::new(
            config.admin_password(),
            Duration::from_secs(config.session_ttl_seconds()),
        )?;
        if codec.uses_fallback_secret() {
            warn!(
                "ADMIN_PASSWORD is not set: sessions are signed with an insecure development secret and every login is refused"
            );
        }
        Ok(Self {
            config,
            codec,
            throttle,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    #[must_use]
    pub fn throttle(&self) -> Arc<LoginThrottle> {
        self.throttle.clone()
    }

    /// True only for the configured admin user and password.
    ///
    /// The user is compared after trimming. Without a configured password
    /// nothing matches.
    #[must_use]
    pub fn credentials_match(&self, user: &str, password: &str) -> bool {
        let Some(expected) = self.config.admin_password() else {
            return false;
        };
        let user_ok = user.trim() == self.config.admin_user();
        let password_ok = constant_time_eq(
            password.as_bytes(),
            expected.expose_secret().as_bytes(),
        );
        user_ok && password_ok
    }
}

use crate::{
    api::{
        self,
        handlers::auth::{
            AuthConfig, AuthState,
            storage::{FileThrottleStore, MemoryThrottleStore, ThrottleStore},
            throttle::{LoginThrottle, ThrottleConfig},
        },
    },
    cli::{commands::throttle::StoreKind, telemetry},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub admin_user: String,
    pub admin_password: Option<SecretString>,
    pub session_ttl_seconds: u64,
    pub secure_cookies: bool,
    pub login_max_attempts: u32,
    pub login_block_minutes: u64,
    pub throttle_store: StoreKind,
    pub throttle_prune_seconds: u64,
}

fn build_store(kind: StoreKind) -> Box<dyn ThrottleStore> {
    match kind {
        StoreKind::Memory => {
            debug!("Login throttle uses in-memory counters");
            Box::new(MemoryThrottleStore::new())
        }
        StoreKind::File(path) => {
            info!("Login throttle uses {}", path.display());
            Box::new(FileThrottleStore::new(path))
        }
    }
}

/// Build the shared auth state from parsed arguments.
///
/// # Errors
/// Returns an error if the session signing key cannot be set up.
pub fn auth_state(args: &Args, store: Box<dyn ThrottleStore>) -> Result<Arc<AuthState>> {
    let throttle_config = ThrottleConfig::new()
        .with_max_attempts(args.login_max_attempts)
        .with_block_minutes(args.login_block_minutes);
    let throttle = Arc::new(LoginThrottle::new(throttle_config, store));

    let auth_config = AuthConfig::new()
        .with_admin_user(&args.admin_user)
        .with_admin_password(args.admin_password.clone())
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_session_cookie_secure(args.secure_cookies);

    let state =
        AuthState::new(auth_config, throttle).context("Failed to set up session signing")?;
    Ok(Arc::new(state))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the auth state cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let store = build_store(args.throttle_store.clone());
    let auth_state = auth_state(&args, store)?;

    debug!(
        admin_user = auth_state.config().admin_user(),
        max_attempts = args.login_max_attempts,
        block_minutes = args.login_block_minutes,
        "Auth configured"
    );

    let result = api::new(
        args.port,
        auth_state,
        Duration::from_secs(args.throttle_prune_seconds),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, currently always the API
//! server with its auth and throttle configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_PORT, auth, throttle};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(5175);

    let auth_opts = auth::Options::parse(matches)?;
    let throttle_opts = throttle::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        admin_user: auth_opts.admin_user,
        admin_password: auth_opts.admin_password,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        secure_cookies: auth_opts.secure_cookies,
        login_max_attempts: throttle_opts.max_attempts,
        login_block_minutes: throttle_opts.block_minutes,
        throttle_store: throttle_opts.store,
        throttle_prune_seconds: throttle_opts.prune_seconds,
    }))
}

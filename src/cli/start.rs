use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::{Context, Result};

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Load `.env` from the working directory; a missing file is fine.
fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err).context("Failed to load .env"),
    }
}

/// Main entry point for the CLI - builds and returns the Action
///
/// # Errors
///
/// Returns an error if `.env` loading, argument parsing, telemetry
/// initialization, or action dispatch fails
pub fn start() -> Result<Action> {
    // 1. Environment from .env, before clap reads env-backed arguments
    load_dotenv()?;

    // 2. Parse command-line arguments
    let matches = commands::new().get_matches();

    // 3. Extract verbosity level
    let verbosity_level = get_verbosity_level(
        matches
            .get_one::<u8>(commands::logging::ARG_VERBOSITY)
            .copied()
            .unwrap_or(0),
    );

    // 4. Initialize telemetry
    telemetry::init(verbosity_level)?;

    // 5. Dispatch to appropriate action
    let action = dispatch::handler(&matches)?;

    Ok(action)
}

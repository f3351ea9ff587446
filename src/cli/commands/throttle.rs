use crate::api::handlers::auth::{
    storage::DEFAULT_THROTTLE_FILE,
    throttle::{DEFAULT_BLOCK_MINUTES, DEFAULT_MAX_ATTEMPTS},
};
use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use std::path::PathBuf;

pub const ARG_LOGIN_MAX_ATTEMPTS: &str = "login-max-attempts";
pub const ARG_LOGIN_BLOCK_MINUTES: &str = "login-block-minutes";
pub const ARG_THROTTLE_STORE: &str = "throttle-store";
pub const ARG_THROTTLE_FILE: &str = "throttle-file";
pub const ARG_THROTTLE_PRUNE_SECONDS: &str = "throttle-prune-seconds";

/// Where failed-login counters live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    File(PathBuf),
}

#[derive(Debug)]
pub struct Options {
    pub max_attempts: u32,
    pub block_minutes: u64,
    pub store: StoreKind,
    pub prune_seconds: u64,
}

impl Options {
    /// Parse login throttle arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the file store is selected without a path.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let store = match matches
            .get_one::<String>(ARG_THROTTLE_STORE)
            .map(String::as_str)
        {
            Some("file") => {
                let path = matches
                    .get_one::<String>(ARG_THROTTLE_FILE)
                    .map(|path| path.trim())
                    .filter(|path| !path.is_empty())
                    .ok_or_else(|| {
                        anyhow::anyhow!("missing required argument: --{ARG_THROTTLE_FILE}")
                    })?;
                StoreKind::File(PathBuf::from(path))
            }
            _ => StoreKind::Memory,
        };

        Ok(Self {
            max_attempts: matches
                .get_one::<u32>(ARG_LOGIN_MAX_ATTEMPTS)
                .copied()
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            block_minutes: matches
                .get_one::<u64>(ARG_LOGIN_BLOCK_MINUTES)
                .copied()
                .unwrap_or(DEFAULT_BLOCK_MINUTES),
            store,
            prune_seconds: matches
                .get_one::<u64>(ARG_THROTTLE_PRUNE_SECONDS)
                .copied()
                .unwrap_or(60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_MAX_ATTEMPTS)
                .long(ARG_LOGIN_MAX_ATTEMPTS)
                .help("Failed logins from one address before it is blocked")
                .env("LOGIN_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_BLOCK_MINUTES)
                .long(ARG_LOGIN_BLOCK_MINUTES)
                .help("How long a blocked address is refused, in minutes")
                .env("LOGIN_BLOCK_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_THROTTLE_STORE)
                .long(ARG_THROTTLE_STORE)
                .help("Failed-login counter storage")
                .long_help(
                    "Failed-login counter storage. 'memory' is per process and resets on restart; 'file' is shared by every process using the same file.",
                )
                .env("LOGIN_THROTTLE_STORE")
                .default_value("memory")
                .value_parser(PossibleValuesParser::new(["memory", "file"])),
        )
        .arg(
            Arg::new(ARG_THROTTLE_FILE)
                .long(ARG_THROTTLE_FILE)
                .help("JSON file for the file-backed counter store")
                .env("LOGIN_THROTTLE_FILE")
                .default_value(DEFAULT_THROTTLE_FILE),
        )
        .arg(
            Arg::new(ARG_THROTTLE_PRUNE_SECONDS)
                .long(ARG_THROTTLE_PRUNE_SECONDS)
                .help("Interval for sweeping expired blocks, 0 disables the sweep")
                .env("LOGIN_THROTTLE_PRUNE_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const VARS: [&str; 5] = [
        "LOGIN_MAX_ATTEMPTS",
        "LOGIN_BLOCK_MINUTES",
        "LOGIN_THROTTLE_STORE",
        "LOGIN_THROTTLE_FILE",
        "LOGIN_THROTTLE_PRUNE_SECONDS",
    ];

    fn command() -> Command {
        with_args(Command::new("elephants"))
    }

    #[test]
    fn defaults() -> Result<()> {
        temp_env::with_vars_unset(VARS, || {
            let matches = command().try_get_matches_from(["elephants"])?;
            let options = Options::parse(&matches)?;
            assert_eq!(options.max_attempts, 5);
            assert_eq!(options.block_minutes, 15);
            assert_eq!(options.store, StoreKind::Memory);
            assert_eq!(options.prune_seconds, 60);
            Ok(())
        })
    }

    #[test]
    fn file_store_from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("LOGIN_MAX_ATTEMPTS", Some("3")),
                ("LOGIN_BLOCK_MINUTES", Some("1")),
                ("LOGIN_THROTTLE_STORE", Some("file")),
                ("LOGIN_THROTTLE_FILE", Some("/var/lib/elephants/attempts.json")),
                ("LOGIN_THROTTLE_PRUNE_SECONDS", Some("0")),
            ],
            || {
                let matches = command().try_get_matches_from(["elephants"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.max_attempts, 3);
                assert_eq!(options.block_minutes, 1);
                assert_eq!(
                    options.store,
                    StoreKind::File(PathBuf::from("/var/lib/elephants/attempts.json"))
                );
                assert_eq!(options.prune_seconds, 0);
                Ok(())
            },
        )
    }

    #[test]
    fn file_store_uses_default_path() -> Result<()> {
        temp_env::with_vars_unset(VARS, || {
            let matches =
                command().try_get_matches_from(["elephants", "--throttle-store", "file"])?;
            let options = Options::parse(&matches)?;
            assert_eq!(
                options.store,
                StoreKind::File(PathBuf::from("storage/login_attempts.json"))
            );
            Ok(())
        })
    }

    #[test]
    fn invalid_values_fail_fast() {
        temp_env::with_vars_unset(VARS, || {
            for args in [
                ["elephants", "--throttle-store", "redis"],
                ["elephants", "--login-max-attempts", "0"],
                ["elephants", "--login-block-minutes", "-1"],
                ["elephants", "--login-block-minutes", "0"],
            ] {
                assert!(command().try_get_matches_from(args).is_err());
            }
        });
    }

    #[test]
    fn blank_file_path_is_rejected() {
        temp_env::with_vars_unset(VARS, || {
            let matches = command().try_get_matches_from([
                "elephants",
                "--throttle-store",
                "file",
                "--throttle-file",
                " ",
            ]);
            assert!(matches.is_ok());
            if let Ok(matches) = matches {
                assert!(Options::parse(&matches).is_err());
            }
        });
    }
}

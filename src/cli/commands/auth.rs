use clap::{Arg, ArgAction, ArgMatches, Command, builder::BoolishValueParser};
use secrecy::SecretString;

pub const ARG_ADMIN_USER: &str = "admin-user";
pub const ARG_ADMIN_PASSWORD: &str = "admin-password";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SECURE_COOKIES: &str = "secure-cookies";

#[derive(Debug)]
pub struct Options {
    pub admin_user: String,
    pub admin_password: Option<SecretString>,
    pub session_ttl_seconds: u64,
    pub secure_cookies: bool,
}

impl Options {
    /// Parse admin and session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the admin user is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let admin_user = matches
            .get_one::<String>(ARG_ADMIN_USER)
            .map(|user| user.trim().to_string())
            .unwrap_or_default();
        if admin_user.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_ADMIN_USER}");
        }

        // An empty ADMIN_PASSWORD in .env means "not set".
        let admin_password = matches
            .get_one::<String>(ARG_ADMIN_PASSWORD)
            .filter(|password| !password.is_empty())
            .map(|password| SecretString::from(password.clone()));

        Ok(Self {
            admin_user,
            admin_password,
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(86_400),
            secure_cookies: matches.get_flag(ARG_SECURE_COOKIES),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_USER)
                .long(ARG_ADMIN_USER)
                .help("The only username accepted by the login endpoint")
                .env("ADMIN_USER")
                .default_value("admin"),
        )
        .arg(
            Arg::new(ARG_ADMIN_PASSWORD)
                .long(ARG_ADMIN_PASSWORD)
                .help("Admin password, also the session signing key")
                .long_help(
                    "Admin password, also the session signing key. When unset, every login is refused and sessions are signed with an insecure development key.",
                )
                .env("ADMIN_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SECURE_COOKIES)
                .long(ARG_SECURE_COOKIES)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("SESSION_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    fn command() -> Command {
        with_args(Command::new("elephants"))
    }

    #[test]
    fn defaults() -> Result<()> {
        temp_env::with_vars(
            [
                ("ADMIN_USER", None::<&str>),
                ("ADMIN_PASSWORD", None),
                ("SESSION_TTL_SECONDS", None),
                ("SESSION_COOKIE_SECURE", None),
            ],
            || {
                let matches = command().try_get_matches_from(["elephants"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.admin_user, "admin");
                assert!(options.admin_password.is_none());
                assert_eq!(options.session_ttl_seconds, 86_400);
                assert!(!options.secure_cookies);
                Ok(())
            },
        )
    }

    #[test]
    fn from_env() -> Result<()> {
        temp_env::with_vars(
            [
                ("ADMIN_USER", Some(" editor ")),
                ("ADMIN_PASSWORD", Some("s3cret")),
                ("SESSION_TTL_SECONDS", Some("3600")),
                ("SESSION_COOKIE_SECURE", Some("true")),
            ],
            || {
                let matches = command().try_get_matches_from(["elephants"])?;
                let options = Options::parse(&matches)?;
                assert_eq!(options.admin_user, "editor");
                assert_eq!(
                    options.admin_password.as_ref().map(|p| p.expose_secret()),
                    Some("s3cret")
                );
                assert_eq!(options.session_ttl_seconds, 3600);
                assert!(options.secure_cookies);
                Ok(())
            },
        )
    }

    #[test]
    fn empty_password_is_unset() -> Result<()> {
        temp_env::with_vars([("ADMIN_PASSWORD", Some(""))], || {
            let matches = command().try_get_matches_from(["elephants"])?;
            assert!(Options::parse(&matches)?.admin_password.is_none());
            Ok(())
        })
    }

    #[test]
    fn blank_user_is_rejected() {
        temp_env::with_vars([("ADMIN_USER", None::<&str>)], || {
            let matches = command().try_get_matches_from(["elephants", "--admin-user", "  "]);
            assert!(matches.is_ok());
            if let Ok(matches) = matches {
                assert!(Options::parse(&matches).is_err());
            }
        });
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let result =
            command().try_get_matches_from(["elephants", "--session-ttl-seconds", "0"]);
        assert!(result.is_err());
    }
}

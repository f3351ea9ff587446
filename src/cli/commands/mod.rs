pub mod auth;
pub mod logging;
pub mod throttle;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("elephants")
        .about("Club website admin backend: sessions and login throttling")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("5175")
                .env("PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = auth::with_args(command);
    let command = throttle::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "elephants");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Club website admin backend: sessions and login throttling".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port() {
        temp_env::with_vars([("PORT", None::<&str>)], || {
            let matches = new().get_matches_from(vec!["elephants"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(5175));

            let matches = new().get_matches_from(vec!["elephants", "-p", "8080"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(8080));
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("PORT", Some("443")),
                ("ADMIN_USER", Some("root")),
                ("ELEPHANTS_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["elephants"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>(auth::ARG_ADMIN_USER).cloned(),
                    Some("root".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("ELEPHANTS_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["elephants"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        temp_env::with_vars([("ELEPHANTS_LOG_LEVEL", None::<&str>)], || {
            let matches = new().get_matches_from(vec!["elephants", "-vvv"]);
            assert_eq!(
                matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                Some(3)
            );
        });
    }

    #[test]
    fn test_invalid_port_fails() {
        let result = new().try_get_matches_from(vec!["elephants", "--port", "70000"]);
        assert!(result.is_err());
    }
}

use clap::{Arg, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Accepts `0`-`4` or a level name.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>()
            && parsed <= 4
        {
            return Ok(parsed);
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("IAM_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_named_levels() {
        let parser = validator_log_level();
        let command = Command::new("t").arg(Arg::new("level").value_parser(parser));
        for (input, expected) in [("0", 0u8), ("4", 4), ("WARN", 1), ("debug", 3)] {
            let matches = command.clone().try_get_matches_from(["t", input]);
            assert!(matches.is_ok(), "{input} should parse");
            if let Ok(matches) = matches {
                assert_eq!(matches.get_one::<u8>("level").copied(), Some(expected));
            }
        }
        assert!(command.clone().try_get_matches_from(["t", "9"]).is_err());
        assert!(command.try_get_matches_from(["t", "loud"]).is_err());
    }
}

use base64ct::{Base64, Encoding};
use clap::{builder::ValueParser, Arg, Command};
use url::Url;

pub const ARG_PORT: &str = "port";
pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_URL_LOGIN_KEY: &str = "url-login-key";
pub const ARG_PRIVATE_KEY: &str = "private-key";
pub const ARG_ID_TOKEN_TTL_SECONDS: &str = "id-token-ttl-seconds";
pub const ARG_RATE_LIMIT_REQUESTS: &str = "rate-limit-requests";
pub const ARG_RATE_LIMIT_WINDOW_SECONDS: &str = "rate-limit-window-seconds";

pub const MIN_KEY_LENGTH: usize = 32;

/// Decode a base64 server key.
///
/// # Errors
/// Returns an error if the value is not base64 or shorter than `MIN_KEY_LENGTH` bytes.
pub fn decode_key(value: &str) -> Result<Vec<u8>, String> {
    let key = Base64::decode_vec(value.trim()).map_err(|_| "key is not valid base64".to_string())?;
    if key.len() < MIN_KEY_LENGTH {
        return Err(format!(
            "key must be at least {MIN_KEY_LENGTH} bytes, got {}",
            key.len()
        ));
    }
    Ok(key)
}

#[must_use]
pub fn validator_key() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<String, String> {
        decode_key(value).map(|_| value.trim().to_string())
    })
}

#[must_use]
pub fn validator_url() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<Url, String> {
        let url = Url::parse(value).map_err(|err| format!("invalid URL: {err}"))?;
        if url.cannot_be_a_base() {
            return Err("URL cannot be used as a base".to_string());
        }
        Ok(url)
    })
}

pub(crate) fn arg_base_url() -> Arg {
    Arg::new(ARG_BASE_URL)
        .long("base-url")
        .help("Public URL of this service; id token issuer and base of login links")
        .env("ONEGATE_BASE_URL")
        .default_value("http://localhost:9000")
        .value_parser(validator_url())
}

pub(crate) fn arg_url_login_key() -> Arg {
    Arg::new(ARG_URL_LOGIN_KEY)
        .long("url-login-key")
        .help("Base64 HS256 key for login links (at least 32 bytes)")
        .env("ONEGATE_URL_LOGIN_KEY")
        .hide_env_values(true)
        .required(true)
        .value_parser(validator_key())
}

#[must_use]
pub fn command() -> Command {
    Command::new("serve")
        .about("Run the HTTP server")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("9000")
                .env("ONEGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(arg_base_url())
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long("session-key")
                .help("Base64 key for session cookie MACs (at least 32 bytes)")
                .env("ONEGATE_SESSION_KEY")
                .hide_env_values(true)
                .required(true)
                .value_parser(validator_key()),
        )
        .arg(arg_url_login_key())
        .arg(
            Arg::new(ARG_PRIVATE_KEY)
                .long("private-key")
                .help("Path to the P-256 PEM key that signs id tokens")
                .env("ONEGATE_PRIVATE_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ID_TOKEN_TTL_SECONDS)
                .long("id-token-ttl-seconds")
                .help("Id token validity in seconds")
                .env("ONEGATE_ID_TOKEN_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_REQUESTS)
                .long("rate-limit-requests")
                .help("Requests allowed per client IP and window")
                .env("ONEGATE_RATE_LIMIT_REQUESTS")
                .default_value("50")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_SECONDS)
                .long("rate-limit-window-seconds")
                .help("Rate limit window in seconds")
                .env("ONEGATE_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    // 32 bytes
    const KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    #[test]
    fn test_decode_key() {
        assert_eq!(decode_key(KEY).unwrap(), b"0123456789abcdef0123456789abcdef");
        assert!(decode_key("c2hvcnQ=").unwrap_err().contains("at least 32 bytes"));
        assert!(decode_key("not base64!").is_err());
    }

    #[test]
    fn test_defaults() {
        let matches = command().get_matches_from(vec![
            "serve",
            "--session-key",
            KEY,
            "--url-login-key",
            KEY,
            "--private-key",
            "/etc/onegate/id_token.pem",
        ]);
        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9000));
        assert_eq!(
            matches.get_one::<Url>(ARG_BASE_URL).map(Url::as_str),
            Some("http://localhost:9000/")
        );
        assert_eq!(
            matches.get_one::<u64>(ARG_ID_TOKEN_TTL_SECONDS).copied(),
            Some(600)
        );
        assert_eq!(
            matches.get_one::<u32>(ARG_RATE_LIMIT_REQUESTS).copied(),
            Some(50)
        );
        assert_eq!(
            matches.get_one::<u64>(ARG_RATE_LIMIT_WINDOW_SECONDS).copied(),
            Some(60)
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("ONEGATE_PORT", Some("443")),
                ("ONEGATE_BASE_URL", Some("https://sso.example")),
                ("ONEGATE_SESSION_KEY", Some(KEY)),
                ("ONEGATE_URL_LOGIN_KEY", Some(KEY)),
                ("ONEGATE_PRIVATE_KEY", Some("/tmp/key.pem")),
                ("ONEGATE_RATE_LIMIT_REQUESTS", Some("5")),
            ],
            || {
                let matches = command().get_matches_from(vec!["serve"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(443));
                assert_eq!(
                    matches.get_one::<Url>(ARG_BASE_URL).map(Url::as_str),
                    Some("https://sso.example/")
                );
                assert_eq!(
                    matches.get_one::<String>(ARG_PRIVATE_KEY).map(String::as_str),
                    Some("/tmp/key.pem")
                );
                assert_eq!(
                    matches.get_one::<u32>(ARG_RATE_LIMIT_REQUESTS).copied(),
                    Some(5)
                );
            },
        );
    }

    #[test]
    fn test_rejects_short_keys() {
        temp_env::with_vars([("ONEGATE_URL_LOGIN_KEY", None::<&str>)], || {
            let result = command().try_get_matches_from(vec![
                "serve",
                "--session-key",
                "c2hvcnQ=",
                "--url-login-key",
                KEY,
                "--private-key",
                "/tmp/key.pem",
            ]);
            assert!(result.is_err());
        });
    }
}

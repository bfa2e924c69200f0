//! Token signing and session lifecycle arguments.

use crate::auth::RotationPolicy;
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_MAX_SESSIONS: &str = "max-sessions";
pub const ARG_ROTATION_POLICY: &str = "rotation-policy";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug)]
pub struct Options {
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: Option<u64>,
    pub max_sessions: usize,
    pub rotation_policy: RotationPolicy,
    pub cookie_secure: bool,
}

impl Options {
    /// Parse token and session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a signing secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let secret = |id: &str| -> anyhow::Result<SecretString> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => {
                    Ok(SecretString::from(value.clone()))
                }
                _ => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            access_token_secret: secret(ARG_ACCESS_TOKEN_SECRET)?,
            refresh_token_secret: secret(ARG_REFRESH_TOKEN_SECRET)?,
            access_ttl_seconds: matches
                .get_one::<u64>(ARG_ACCESS_TTL_SECONDS)
                .copied()
                .unwrap_or(86_400),
            refresh_ttl_seconds: matches.get_one::<u64>(ARG_REFRESH_TTL_SECONDS).copied(),
            max_sessions: matches
                .get_one::<usize>(ARG_MAX_SESSIONS)
                .copied()
                .unwrap_or(5),
            rotation_policy: matches
                .get_one::<RotationPolicy>(ARG_ROTATION_POLICY)
                .copied()
                .unwrap_or_default(),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HS256 secret for access tokens (at least 32 bytes)")
                .env("ISSUEGATE_ACCESS_TOKEN_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HS256 secret for refresh tokens (32+ bytes, distinct from the access one)")
                .env("ISSUEGATE_REFRESH_TOKEN_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("ISSUEGATE_ACCESS_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh token and session TTL in seconds (default: 30x access TTL)")
                .env("ISSUEGATE_REFRESH_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_SESSIONS)
                .long(ARG_MAX_SESSIONS)
                .help("Live sessions per user before all are evicted on the next sign-in")
                .env("ISSUEGATE_MAX_SESSIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_ROTATION_POLICY)
                .long(ARG_ROTATION_POLICY)
                .help("What happens to a refresh session after rotation: retain or revoke")
                .env("ISSUEGATE_ROTATION_POLICY")
                .default_value("retain")
                .value_parser(|value: &str| value.parse::<RotationPolicy>()),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the refresh cookie Secure (serve over HTTPS)")
                .env("ISSUEGATE_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
}

//! Session backend arguments.

use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use std::{fmt, str::FromStr, time::Duration};

pub const ARG_SESSION_BACKEND: &str = "session-backend";
pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionBackend {
    Redis,
    Memory,
}

impl FromStr for SessionBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("invalid session backend: {other}")),
        }
    }
}

impl fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug)]
pub struct Options {
    pub backend: SessionBackend,
    pub redis_url: String,
    pub timeout: Duration,
}

impl Options {
    /// Parse session backend arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the Redis backend is selected without a URL.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let backend = matches
            .get_one::<String>(ARG_SESSION_BACKEND)
            .map_or(Ok(SessionBackend::Redis), |value| value.parse())
            .map_err(|err| anyhow::anyhow!(err))?;

        let redis_url = matches
            .get_one::<String>(ARG_REDIS_URL)
            .cloned()
            .filter(|value| !value.trim().is_empty());
        let redis_url = match (backend, redis_url) {
            (_, Some(url)) => url,
            (SessionBackend::Memory, None) => String::new(),
            (SessionBackend::Redis, None) => {
                anyhow::bail!("missing required argument: --{ARG_REDIS_URL}")
            }
        };

        let timeout_ms = matches
            .get_one::<u64>(ARG_STORE_TIMEOUT_MS)
            .copied()
            .unwrap_or(3000);

        Ok(Self {
            backend,
            redis_url,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_BACKEND)
                .long(ARG_SESSION_BACKEND)
                .help("Where refresh sessions are stored; memory is process-local")
                .env("ISSUEGATE_SESSION_BACKEND")
                .default_value("redis")
                .value_parser(PossibleValuesParser::new(["redis", "memory"])),
        )
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis connection URL for the session store")
                .env("ISSUEGATE_REDIS_URL")
                .default_value("redis://127.0.0.1:6379"),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Deadline for each session store call in milliseconds")
                .env("ISSUEGATE_STORE_TIMEOUT_MS")
                .default_value("3000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

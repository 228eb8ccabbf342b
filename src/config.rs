//! Experiment configuration and input parsing

use crate::error::{Error, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Default port for plaintext IMAP upgraded with STARTTLS.
pub const IMAP_PORT: &str = "143";

/// Default port for IMAP over implicit TLS.
pub const IMAPS_PORT: &str = "993";

/// Experiment options.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline shared by DNS resolution and every session.
    pub timeout: Duration,
    /// Number of keep-alive round trips after the banner.
    pub noop_count: u8,
    /// Skip certificate verification during the TLS handshake.
    pub no_tls_verify: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            noop_count: 10,
            no_tls_verify: false,
        }
    }
}

impl Config {
    /// Load the experiment options from environment variables
    ///
    /// Reads from `.env` file if present. Optional (with defaults):
    /// - `IMAP_PROBE_TIMEOUT` in seconds (default: `30`)
    /// - `IMAP_PROBE_NOOP_COUNT` (default: `10`)
    /// - `IMAP_PROBE_NO_TLS_VERIFY` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let timeout = match env::var("IMAP_PROBE_TIMEOUT") {
            Ok(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| Error::Config(format!("Invalid IMAP_PROBE_TIMEOUT: {e}")))?,
            ),
            Err(_) => defaults.timeout,
        };
        let noop_count = match env::var("IMAP_PROBE_NOOP_COUNT") {
            Ok(v) => v
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PROBE_NOOP_COUNT: {e}")))?,
            Err(_) => defaults.noop_count,
        };
        let no_tls_verify = match env::var("IMAP_PROBE_NO_TLS_VERIFY") {
            Ok(v) => parse_bool(&v).ok_or_else(|| {
                Error::Config(format!("Invalid IMAP_PROBE_NO_TLS_VERIFY: {v}"))
            })?,
            Err(_) => defaults.no_tls_verify,
        };

        Ok(Self {
            timeout,
            noop_count,
            no_tls_verify,
        })
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Target settings derived from the measurement input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: String,
    pub forced_tls: bool,
    pub noop_count: u8,
}

impl RuntimeConfig {
    /// Parse an `imap://` or `imaps://` input.
    ///
    /// `imap` targets negotiate TLS in-band with STARTTLS and default to
    /// port 143. `imaps` targets start TLS immediately and default to 993.
    pub fn parse(input: &str, noop_count: u8) -> Result<Self> {
        if input.is_empty() {
            return Err(Error::NoInput);
        }

        let parsed = Url::parse(input).map_err(|e| Error::NotAnUrl(e.to_string()))?;
        let forced_tls = match parsed.scheme() {
            "imap" => false,
            "imaps" => true,
            _ => return Err(Error::InvalidScheme),
        };

        let port = parsed.port().map_or_else(
            || {
                if forced_tls { IMAPS_PORT } else { IMAP_PORT }.to_string()
            },
            |p| p.to_string(),
        );

        let host = match parsed.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => String::new(),
        };

        Ok(Self {
            host,
            port,
            forced_tls,
            noop_count,
        })
    }
}

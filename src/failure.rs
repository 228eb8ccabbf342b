//! Error to failure-string classification
//!
//! Maps the errors produced by the resolver, the dialer, the TLS
//! handshaker and stream I/O onto the canonical failure strings used in
//! the archival data format, so that equivalent faults render the same
//! way on every platform.

use rustls::{AlertDescription, CertificateError};
use std::io;
use std::net::{IpAddr, SocketAddr};

pub const FAILURE_CONNECTION_REFUSED: &str = "connection_refused";
pub const FAILURE_CONNECTION_RESET: &str = "connection_reset";
pub const FAILURE_CONNECTION_ABORTED: &str = "connection_aborted";
pub const FAILURE_HOST_UNREACHABLE: &str = "host_unreachable";
pub const FAILURE_NETWORK_UNREACHABLE: &str = "network_unreachable";
pub const FAILURE_ADDRESS_IN_USE: &str = "address_in_use";
pub const FAILURE_ADDRESS_NOT_AVAILABLE: &str = "address_not_available";
pub const FAILURE_NOT_CONNECTED: &str = "not_connected";
pub const FAILURE_GENERIC_TIMEOUT: &str = "generic_timeout_error";
pub const FAILURE_INTERRUPTED: &str = "interrupted";
pub const FAILURE_EOF: &str = "eof_error";
pub const FAILURE_DNS_NXDOMAIN: &str = "dns_nxdomain_error";
pub const FAILURE_DNS_NO_ANSWER: &str = "dns_no_answer";
pub const FAILURE_DNS_TEMPORARY: &str = "dns_temporary_failure";
pub const FAILURE_SSL_INVALID_HOSTNAME: &str = "ssl_invalid_hostname";
pub const FAILURE_SSL_UNKNOWN_AUTHORITY: &str = "ssl_unknown_authority";
pub const FAILURE_SSL_INVALID_CERTIFICATE: &str = "ssl_invalid_certificate";
pub const FAILURE_SSL_FAILED_HANDSHAKE: &str = "ssl_failed_handshake";

/// Replacement for IP addresses found in unclassified error messages.
pub const SCRUBBED: &str = "[scrubbed]";

/// Classify an I/O error, including TLS errors wrapped by `tokio-rustls`.
#[must_use]
pub fn new_failure(err: &io::Error) -> String {
    if let Some(tls) = err.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) {
        if let Some(failure) = classify_tls(tls) {
            return failure.to_string();
        }
        return unknown_failure(&tls.to_string());
    }

    let failure = match err.kind() {
        io::ErrorKind::ConnectionRefused => FAILURE_CONNECTION_REFUSED,
        io::ErrorKind::ConnectionReset => FAILURE_CONNECTION_RESET,
        io::ErrorKind::ConnectionAborted => FAILURE_CONNECTION_ABORTED,
        io::ErrorKind::HostUnreachable => FAILURE_HOST_UNREACHABLE,
        io::ErrorKind::NetworkUnreachable => FAILURE_NETWORK_UNREACHABLE,
        io::ErrorKind::AddrInUse => FAILURE_ADDRESS_IN_USE,
        io::ErrorKind::AddrNotAvailable => FAILURE_ADDRESS_NOT_AVAILABLE,
        io::ErrorKind::NotConnected => FAILURE_NOT_CONNECTED,
        io::ErrorKind::TimedOut => FAILURE_GENERIC_TIMEOUT,
        io::ErrorKind::Interrupted => FAILURE_INTERRUPTED,
        io::ErrorKind::UnexpectedEof => FAILURE_EOF,
        _ => return unknown_failure(&err.to_string()),
    };
    failure.to_string()
}

/// Classify an error returned by the system resolver.
///
/// `getaddrinfo` errors reach us as plain messages, so the suffix of
/// the message is all there is to go on.
#[must_use]
pub fn new_resolver_failure(err: &io::Error) -> String {
    if matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    ) {
        return new_failure(err);
    }

    let msg = err.to_string();
    let failure = if msg.ends_with("Name or service not known")
        || msg.ends_with("nodename nor servname provided, or not known")
        || msg.ends_with("no such host")
    {
        FAILURE_DNS_NXDOMAIN
    } else if msg.ends_with("No address associated with hostname") {
        FAILURE_DNS_NO_ANSWER
    } else if msg.ends_with("Temporary failure in name resolution") {
        FAILURE_DNS_TEMPORARY
    } else {
        return new_failure(err);
    };
    failure.to_string()
}

fn classify_tls(err: &rustls::Error) -> Option<&'static str> {
    match err {
        rustls::Error::InvalidCertificate(cert) => Some(classify_certificate(cert)),
        rustls::Error::AlertReceived(alert) => classify_alert(*alert),
        _ => None,
    }
}

fn classify_certificate(err: &CertificateError) -> &'static str {
    // Newer rustls releases report the `*Context` variants with extra
    // details attached, so compare on the variant name.
    let name = format!("{err:?}");
    if name.starts_with("NotValidForName") {
        FAILURE_SSL_INVALID_HOSTNAME
    } else if name.starts_with("UnknownIssuer") {
        FAILURE_SSL_UNKNOWN_AUTHORITY
    } else {
        FAILURE_SSL_INVALID_CERTIFICATE
    }
}

const fn classify_alert(alert: AlertDescription) -> Option<&'static str> {
    match alert {
        AlertDescription::HandshakeFailure | AlertDescription::DecryptError => {
            Some(FAILURE_SSL_FAILED_HANDSHAKE)
        }
        AlertDescription::BadCertificate
        | AlertDescription::UnsupportedCertificate
        | AlertDescription::CertificateRevoked
        | AlertDescription::CertificateExpired
        | AlertDescription::CertificateUnknown => Some(FAILURE_SSL_INVALID_CERTIFICATE),
        AlertDescription::UnknownCA => Some(FAILURE_SSL_UNKNOWN_AUTHORITY),
        AlertDescription::UnrecognisedName => Some(FAILURE_SSL_INVALID_HOSTNAME),
        _ => None,
    }
}

fn unknown_failure(msg: &str) -> String {
    scrub(&format!("unknown_failure: {msg}"))
}

/// Replace every IP address (or IP:port pair) in `s` with [`SCRUBBED`].
#[must_use]
pub fn scrub(s: &str) -> String {
    let is_addr_char = |c: char| c.is_ascii_hexdigit() || c == ':' || c == '.';

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find(is_addr_char) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(|c: char| !is_addr_char(c)).unwrap_or(tail.len());
        let token = &tail[..end];
        let candidate = token.trim_end_matches(['.', ':']);
        if candidate.parse::<IpAddr>().is_ok() || candidate.parse::<SocketAddr>().is_ok() {
            out.push_str(SCRUBBED);
            out.push_str(&token[candidate.len()..]);
        } else {
            out.push_str(token);
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

//! IMAP protocol driver and result types
//!
//! [`Imap`] plugs IMAP syntax into the generic exchange: the greeting
//! (or the post-STARTTLS `CAPABILITY` response) must advertise
//! capabilities, and each keep-alive is a tagged `NOOP`.

use crate::archival::{ArchivalDnsLookupResult, ArchivalTcpConnectResult, ArchivalTlsHandshakeResult};
use crate::protocol::{LineProtocol, Reply};
use crate::runner::{HostSink, RunSink, StartTls};
use serde::{Deserialize, Serialize};

/// STARTTLS request sent on plaintext IMAP connections.
pub const STARTTLS_REQUEST: &str = "A1 STARTTLS\r\n";

/// Tagged completion expected for [`STARTTLS_REQUEST`].
pub const STARTTLS_ACK: &str = "A1 OK";

/// STARTTLS negotiation on plaintext IMAP connections.
pub const STARTTLS: StartTls<'static> = StartTls {
    protocol: "imap",
    request: STARTTLS_REQUEST,
    ack: STARTTLS_ACK,
    tag: "A1",
};

/// IMAP line syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Imap;

impl Imap {
    fn noop_tag(iteration: u8) -> String {
        format!("N{iteration}")
    }
}

impl LineProtocol for Imap {
    fn name(&self) -> &str {
        "imap"
    }

    fn capability_marker(&self) -> &str {
        "CAPABILITY"
    }

    fn capability_request(&self) -> Option<String> {
        // RFC 3501 6.2.1: no greeting follows STARTTLS.
        Some("A2 CAPABILITY\r\n".to_string())
    }

    fn keepalive_request(&self, iteration: u8) -> String {
        format!("{} NOOP\r\n", Self::noop_tag(iteration))
    }

    fn keepalive_reply(&self, iteration: u8, line: &str) -> Reply {
        let tag = Self::noop_tag(iteration);
        let mut words = line.split_whitespace();
        if words.next() != Some(tag.as_str()) {
            return Reply::Continue;
        }
        match words.next() {
            Some(status) if status.eq_ignore_ascii_case("OK") => Reply::Ok,
            _ => Reply::Rejected,
        }
    }
}

/// Results for an entire host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestKeys {
    #[serde(rename = "hostname")]
    pub host: String,
    pub queries: Vec<ArchivalDnsLookupResult>,
    /// One entry per attempted address, in processing order.
    pub runs: Vec<IndividualTestKeys>,
    /// Host-global failure (DNS resolution).
    pub failure: Option<String>,
}

impl TestKeys {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl HostSink for TestKeys {
    type Run = IndividualTestKeys;

    fn hostname(&mut self, host: &str) {
        self.host = host.to_string();
    }

    fn dns_results(&mut self, results: Vec<ArchivalDnsLookupResult>) {
        self.queries.extend(results);
    }

    fn failed(&mut self, failure: String) {
        self.failure = Some(failure);
    }

    fn new_run(&mut self, ip: &str, port: &str) -> &mut IndividualTestKeys {
        self.runs.push(IndividualTestKeys::new(ip, port));
        let last = self.runs.len() - 1;
        &mut self.runs[last]
    }
}

/// Results for a single IP/port pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualTestKeys {
    pub tcp_connect: Vec<ArchivalTcpConnectResult>,
    #[serde(rename = "tls_handshakes")]
    pub tls_handshake: Option<ArchivalTlsHandshakeResult>,
    pub failure: Option<String>,
    #[serde(rename = "failed_step")]
    pub failure_step: Option<String>,
    pub ip: String,
    pub port: String,
    #[serde(skip)]
    noop_counter: u8,
}

impl IndividualTestKeys {
    #[must_use]
    pub fn new(ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: port.into(),
            ..Self::default()
        }
    }

    /// Number of successful NOOP round trips.
    #[must_use]
    pub const fn noop_counter(&self) -> u8 {
        self.noop_counter
    }
}

impl RunSink for IndividualTestKeys {
    fn ip_port(&mut self, ip: &str, port: &str) {
        self.ip = ip.to_string();
        self.port = port.to_string();
    }

    fn connect_results(&mut self, results: Vec<ArchivalTcpConnectResult>) {
        self.tcp_connect.extend(results);
    }

    fn handshake_result(&mut self, result: ArchivalTlsHandshakeResult) {
        self.tls_handshake = Some(result);
    }

    fn failed_step(&mut self, failure: String, step: &str) {
        self.failure = Some(failure);
        self.failure_step = Some(step.to_string());
    }

    fn record_keepalive(&mut self) -> u8 {
        self.noop_counter = self.noop_counter.saturating_add(1);
        self.noop_counter
    }

    fn keepalives(&self) -> u8 {
        self.noop_counter
    }
}

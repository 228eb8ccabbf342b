//! Instrumented resolver, dialer and TLS handshaker
//!
//! Every operation performed through a [`Trace`] is recorded as an
//! archival entry with times relative to the measurement start. The
//! query methods drain what was recorded since they were last called,
//! so each caller sees only its own events.

use crate::archival::{
    ArchivalBinaryData, ArchivalDnsAnswer, ArchivalDnsLookupResult, ArchivalTcpConnectResult,
    ArchivalTcpConnectStatus, ArchivalTlsHandshakeResult,
};
use crate::context::MeasurementContext;
use crate::failure::{new_failure, new_resolver_failure};
use rustls::ProtocolVersion;
use rustls::pki_types::ServerName;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

/// Message used when the resolver succeeds without any address.
const NO_ANSWER: &str = "no answer from DNS server";

/// Collects archival events for one measurement.
#[derive(Debug)]
pub struct Trace {
    index: i64,
    zero: Instant,
    dns_lookups: Vec<ArchivalDnsLookupResult>,
    tcp_connects: Vec<ArchivalTcpConnectResult>,
    tls_handshakes: Vec<ArchivalTlsHandshakeResult>,
}

impl Trace {
    /// Create a trace whose events carry `index` as transaction ID and
    /// measure time from `zero`.
    #[must_use]
    pub const fn new(index: i64, zero: Instant) -> Self {
        Self {
            index,
            zero,
            dns_lookups: Vec::new(),
            tcp_connects: Vec::new(),
            tls_handshakes: Vec::new(),
        }
    }

    fn elapsed(&self) -> f64 {
        self.zero.elapsed().as_secs_f64()
    }

    /// Resolve `host` with the system resolver.
    ///
    /// Returns the addresses in resolver order without duplicates, or
    /// the classified failure.
    pub async fn lookup_host(
        &mut self,
        ctx: &MeasurementContext,
        host: &str,
    ) -> Result<Vec<IpAddr>, String> {
        let t0 = self.elapsed();
        let res = ctx
            .run(async {
                let mut addrs: Vec<IpAddr> = Vec::new();
                for sa in tokio::net::lookup_host((host, 0)).await? {
                    if !addrs.contains(&sa.ip()) {
                        addrs.push(sa.ip());
                    }
                }
                if addrs.is_empty() {
                    return Err(io::Error::other(NO_ANSWER));
                }
                Ok(addrs)
            })
            .await;
        let t = self.elapsed();

        let (answers, failure) = match &res {
            Ok(addrs) => (addrs.iter().map(|ip| dns_answer(*ip)).collect(), None),
            Err(e) => (Vec::new(), Some(new_resolver_failure(e))),
        };
        debug!("lookup {} -> {:?} {:?}", host, res.as_ref().ok(), failure);

        self.dns_lookups.push(ArchivalDnsLookupResult {
            answers,
            engine: "getaddrinfo".to_string(),
            failure: failure.clone(),
            hostname: host.to_string(),
            query_type: "ANY".to_string(),
            resolver_hostname: None,
            resolver_port: None,
            resolver_address: String::new(),
            t0,
            t,
            tags: Vec::new(),
            transaction_id: self.index,
        });

        res.map_err(|_| failure.unwrap_or_default())
    }

    /// Open a TCP connection to `addr`.
    pub async fn dial_tcp(
        &mut self,
        ctx: &MeasurementContext,
        addr: SocketAddr,
    ) -> Result<TcpStream, String> {
        let t0 = self.elapsed();
        let res = ctx.run(TcpStream::connect(addr)).await;
        let t = self.elapsed();

        let failure = res.as_ref().err().map(new_failure);
        self.tcp_connects.push(ArchivalTcpConnectResult {
            ip: addr.ip().to_string(),
            port: addr.port(),
            status: ArchivalTcpConnectStatus {
                blocked: None,
                failure: failure.clone(),
                success: failure.is_none(),
            },
            t0,
            t,
            tags: Vec::new(),
            transaction_id: self.index,
        });

        res.map_err(|_| failure.unwrap_or_default())
    }

    /// Perform a TLS handshake over `stream`.
    pub async fn tls_handshake(
        &mut self,
        ctx: &MeasurementContext,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
        stream: TcpStream,
        no_tls_verify: bool,
    ) -> Result<TlsStream<TcpStream>, String> {
        let address = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let sni = server_name.to_str().into_owned();

        let t0 = self.elapsed();
        let res = ctx.run(connector.connect(server_name, stream)).await;
        let t = self.elapsed();

        let mut record = ArchivalTlsHandshakeResult {
            network: "tcp".to_string(),
            address,
            cipher_suite: String::new(),
            failure: None,
            negotiated_protocol: String::new(),
            no_tls_verify,
            peer_certificates: Vec::new(),
            server_name: sni,
            t0,
            t,
            tags: Vec::new(),
            tls_version: String::new(),
            transaction_id: self.index,
        };

        match &res {
            Ok(tls) => {
                let conn = tls.get_ref().1;
                if let Some(suite) = conn.negotiated_cipher_suite() {
                    record.cipher_suite = format!("{:?}", suite.suite());
                }
                if let Some(version) = conn.protocol_version() {
                    record.tls_version = tls_version_string(version);
                }
                if let Some(alpn) = conn.alpn_protocol() {
                    record.negotiated_protocol = String::from_utf8_lossy(alpn).into_owned();
                }
                if let Some(certs) = conn.peer_certificates() {
                    record.peer_certificates = certs
                        .iter()
                        .map(|c| ArchivalBinaryData(c.as_ref().to_vec()))
                        .collect();
                }
            }
            Err(e) => record.failure = Some(new_failure(e)),
        }

        let failure = record.failure.clone();
        self.tls_handshakes.push(record);
        res.map_err(|_| failure.unwrap_or_default())
    }

    /// DNS lookups recorded since the previous call.
    pub fn dns_lookups(&mut self) -> Vec<ArchivalDnsLookupResult> {
        std::mem::take(&mut self.dns_lookups)
    }

    /// TCP connect attempts recorded since the previous call.
    pub fn tcp_connects(&mut self) -> Vec<ArchivalTcpConnectResult> {
        std::mem::take(&mut self.tcp_connects)
    }

    /// First TLS handshake recorded since the previous call.
    pub fn first_tls_handshake(&mut self) -> Option<ArchivalTlsHandshakeResult> {
        std::mem::take(&mut self.tls_handshakes).into_iter().next()
    }
}

fn dns_answer(ip: IpAddr) -> ArchivalDnsAnswer {
    match ip {
        IpAddr::V4(v4) => ArchivalDnsAnswer {
            answer_type: "A".to_string(),
            ipv4: v4.to_string(),
            ipv6: String::new(),
            ttl: None,
        },
        IpAddr::V6(v6) => ArchivalDnsAnswer {
            answer_type: "AAAA".to_string(),
            ipv4: String::new(),
            ipv6: v6.to_string(),
            ttl: None,
        },
    }
}

fn tls_version_string(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1".to_string(),
        other => format!("{other:?}"),
    }
}

//! Multi-address TCP/TLS session runner
//!
//! [`TcpRunner`] resolves a host and opens one [`TcpSession`] per
//! resolved address. A session starts as plaintext TCP and can be
//! upgraded to TLS either immediately ([`TcpSession::handshake`]) or
//! after an in-band request ([`TcpSession::start_tls`] with a
//! [`StartTls`] description). The
//! application exchange then runs over whichever stream is active.
//!
//! The runner never knows the concrete result shape: it reports
//! through the [`HostSink`] and [`RunSink`] capabilities.

use crate::archival::{ArchivalDnsLookupResult, ArchivalTcpConnectResult, ArchivalTlsHandshakeResult};
use crate::context::MeasurementContext;
use crate::failure::new_failure;
use crate::tls::server_name;
use crate::trace::Trace;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

pub const STEP_TCP_CONNECT: &str = "tcp_connect";
pub const STEP_TLS_HANDSHAKE: &str = "tls_handshake";
pub const STEP_STARTTLS_WRITE: &str = "starttls_write";
pub const STEP_STARTTLS_WAIT_OK: &str = "starttls_wait_ok";

/// Longest line accepted from the peer before giving up.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Plaintext exchange that negotiates TLS in-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTls<'a> {
    /// Protocol name used in failure messages.
    pub protocol: &'a str,
    /// Written before waiting for the acknowledgement unless empty.
    pub request: &'a str,
    /// Substring of the line that acknowledges the request.
    pub ack: &'a str,
    /// Tag of the request's completion. A line carrying it without
    /// `ack` is a refusal.
    pub tag: &'a str,
}

impl StartTls<'_> {
    fn is_refusal(&self, line: &str) -> bool {
        !self.tag.is_empty() && line.split_whitespace().next() == Some(self.tag)
    }
}

/// Host-level result capabilities.
pub trait HostSink {
    type Run: RunSink;

    fn hostname(&mut self, host: &str);

    fn dns_results(&mut self, results: Vec<ArchivalDnsLookupResult>);

    /// Record a host-global failure (DNS resolution).
    fn failed(&mut self, failure: String);

    /// Append a new per-address result and return it for recording.
    fn new_run(&mut self, ip: &str, port: &str) -> &mut Self::Run;
}

/// Per-address result capabilities.
pub trait RunSink {
    fn ip_port(&mut self, ip: &str, port: &str);

    fn connect_results(&mut self, results: Vec<ArchivalTcpConnectResult>);

    fn handshake_result(&mut self, result: ArchivalTlsHandshakeResult);

    /// Record the failure and the step that produced it.
    fn failed_step(&mut self, failure: String, step: &str);

    /// Count one successful keep-alive round trip, returning the new
    /// total.
    fn record_keepalive(&mut self) -> u8;

    fn keepalives(&self) -> u8;
}

/// Coordinates the sessions of one host under a single deadline.
pub struct TcpRunner {
    trace: Trace,
    ctx: MeasurementContext,
    connector: TlsConnector,
    server_name: String,
    no_tls_verify: bool,
}

impl TcpRunner {
    /// `server_name` is used for SNI and certificate verification on
    /// every address.
    #[must_use]
    pub fn new(
        trace: Trace,
        ctx: MeasurementContext,
        connector: TlsConnector,
        server_name: impl Into<String>,
        no_tls_verify: bool,
    ) -> Self {
        Self {
            trace,
            ctx,
            connector,
            server_name: server_name.into(),
            no_tls_verify,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &MeasurementContext {
        &self.ctx
    }

    /// Resolve `host`, recording the lookups into `tk`.
    ///
    /// On failure the host-level failure is set and no address should
    /// be attempted.
    pub async fn resolve<H: HostSink>(&mut self, tk: &mut H, host: &str) -> Option<Vec<IpAddr>> {
        tk.hostname(host);
        debug!("Resolving {}", host);

        let res = self.trace.lookup_host(&self.ctx, host).await;
        tk.dns_results(self.trace.dns_lookups());

        match res {
            Ok(addrs) => {
                info!("Resolved {} to {} address(es)", host, addrs.len());
                Some(addrs)
            }
            Err(failure) => {
                warn!("Resolving {} failed: {}", host, failure);
                tk.failed(failure);
                None
            }
        }
    }

    /// Start a session to `addr:port`.
    ///
    /// A per-address result is appended to `tk` whether or not the
    /// connection succeeds.
    pub async fn conn<'a, H: HostSink>(
        &'a mut self,
        tk: &'a mut H,
        addr: IpAddr,
        port: &str,
    ) -> Option<TcpSession<'a, H::Run>> {
        let run = tk.new_run(&addr.to_string(), port);

        let Ok(port_num) = port.parse::<u16>() else {
            run.failed_step(format!("invalid port: {port}"), STEP_TCP_CONNECT);
            return None;
        };
        let sa = SocketAddr::new(addr, port_num);
        run.ip_port(&sa.ip().to_string(), port);
        debug!("Connecting to {}", sa);

        let res = self.trace.dial_tcp(&self.ctx, sa).await;
        run.connect_results(self.trace.tcp_connects());

        match res {
            Ok(stream) => Some(TcpSession {
                runner: self,
                run,
                addr: sa,
                conn: Conn::Plain(stream),
                pending: Vec::new(),
                upgraded_in_band: false,
            }),
            Err(failure) => {
                warn!("Connecting to {} failed: {}", sa, failure);
                run.failed_step(failure, STEP_TCP_CONNECT);
                None
            }
        }
    }
}

enum Conn {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

/// Which stream a session currently exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Plaintext,
    Tls,
    Closed,
}

/// One connection to one resolved address.
///
/// The session owns its socket. Dropping it, or calling
/// [`close`](Self::close), closes exactly the active connection: the
/// TLS stream once a handshake succeeded, the raw socket otherwise.
pub struct TcpSession<'a, R: RunSink> {
    runner: &'a mut TcpRunner,
    run: &'a mut R,
    addr: SocketAddr,
    conn: Conn,
    pending: Vec<u8>,
    upgraded_in_band: bool,
}

impl<R: RunSink> TcpSession<'_, R> {
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self.conn {
            Conn::Plain(_) => SessionState::Plaintext,
            Conn::Tls(_) => SessionState::Tls,
            Conn::Closed => SessionState::Closed,
        }
    }

    /// The per-address result this session records into.
    pub const fn run(&mut self) -> &mut R {
        &mut *self.run
    }

    /// Whether TLS was negotiated with [`start_tls`](Self::start_tls).
    #[must_use]
    pub const fn upgraded_in_band(&self) -> bool {
        self.upgraded_in_band
    }

    pub fn failed_step(&mut self, failure: String, step: &str) {
        warn!("{} failed at {}: {}", self.addr, step, failure);
        self.run.failed_step(failure, step);
    }

    /// Upgrade the connection to TLS.
    ///
    /// Returns `true` without doing anything when already upgraded.
    pub async fn handshake(&mut self) -> bool {
        let stream = match std::mem::replace(&mut self.conn, Conn::Closed) {
            Conn::Tls(tls) => {
                self.conn = Conn::Tls(tls);
                return true;
            }
            Conn::Plain(stream) => stream,
            Conn::Closed => {
                self.failed_step("connection_already_closed".to_string(), STEP_TLS_HANDSHAKE);
                return false;
            }
        };

        let name = match server_name(&self.runner.server_name) {
            Ok(name) => name,
            Err(e) => {
                self.failed_step(format!("ssl_invalid_hostname: {e}"), STEP_TLS_HANDSHAKE);
                return false;
            }
        };

        debug!("TLS handshake with {}", self.addr);
        let runner = &mut *self.runner;
        let res = runner
            .trace
            .tls_handshake(&runner.ctx, &runner.connector, name, stream, runner.no_tls_verify)
            .await;
        if let Some(hs) = runner.trace.first_tls_handshake() {
            self.run.handshake_result(hs);
        }

        match res {
            Ok(tls) => {
                if !self.pending.is_empty() {
                    warn!(
                        "Discarding {} plaintext byte(s) received before TLS",
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                self.conn = Conn::Tls(Box::new(tls));
                true
            }
            Err(failure) => {
                self.failed_step(failure, STEP_TLS_HANDSHAKE);
                false
            }
        }
    }

    /// Negotiate TLS in-band, then perform the handshake.
    ///
    /// Writes the request and reads lines until one contains the
    /// acknowledgement. A tagged refusal ends the session right away
    /// instead of waiting for the deadline.
    pub async fn start_tls(&mut self, upgrade: &StartTls<'_>) -> bool {
        if self.state() == SessionState::Tls {
            return true;
        }

        if !upgrade.request.is_empty()
            && let Err(e) = self.write_all(upgrade.request.as_bytes()).await
        {
            self.failed_step(new_failure(&e), STEP_STARTTLS_WRITE);
            return false;
        }

        loop {
            match self.read_line().await {
                Ok(line) if line.contains(upgrade.ack) => {
                    debug!("STARTTLS acknowledged: {}", line.trim_end());
                    break;
                }
                Ok(line) if upgrade.is_refusal(&line) => {
                    self.failed_step(
                        format!(
                            "Received unexpected {} response: {}",
                            upgrade.protocol.to_uppercase(),
                            line
                        ),
                        STEP_STARTTLS_WAIT_OK,
                    );
                    return false;
                }
                Ok(line) => debug!("Skipping line before STARTTLS ack: {}", line.trim_end()),
                Err(e) => {
                    self.failed_step(new_failure(&e), STEP_STARTTLS_WAIT_OK);
                    return false;
                }
            }
        }

        self.upgraded_in_band = self.handshake().await;
        self.upgraded_in_band
    }

    /// Read one `\n`-terminated line from the active connection.
    ///
    /// The terminator is kept. End of stream before a full line is an
    /// `UnexpectedEof` error.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.pending.len() > MAX_LINE_LEN {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long"));
            }

            let n = self.read_some(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "EOF"));
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }

    /// Write `data` to the active connection and flush it.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let ctx = &self.runner.ctx;
        match &mut self.conn {
            Conn::Plain(s) => {
                ctx.run(async {
                    s.write_all(data).await?;
                    s.flush().await
                })
                .await
            }
            Conn::Tls(s) => {
                ctx.run(async {
                    s.write_all(data).await?;
                    s.flush().await
                })
                .await
            }
            Conn::Closed => Err(closed()),
        }
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let ctx = &self.runner.ctx;
        match &mut self.conn {
            Conn::Plain(s) => ctx.run(s.read(buf)).await,
            Conn::Tls(s) => ctx.run(s.read(buf)).await,
            Conn::Closed => Err(closed()),
        }
    }

    /// Shut down and release the active connection.
    pub async fn close(mut self) {
        let ctx = &self.runner.ctx;
        let res = match &mut self.conn {
            Conn::Plain(s) => ctx.run(s.shutdown()).await,
            Conn::Tls(s) => ctx.run(s.shutdown()).await,
            Conn::Closed => Ok(()),
        };
        if let Err(e) = res {
            debug!("Closing {}: {}", self.addr, e);
        }
        self.conn = Conn::Closed;
        debug!("Closed session to {}", self.addr);
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

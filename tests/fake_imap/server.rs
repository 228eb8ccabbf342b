//! In-process fake IMAP server for integration testing
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   (port 993 style) TLS handshake right away
//!       |
//!   Server sends greeting: "* OK [CAPABILITY ...] ready\r\n"
//!       |
//!   (port 143 style) Client sends "A1 STARTTLS", server answers
//!   "A1 OK", TLS handshake, client re-issues CAPABILITY
//!       |
//!   Client sends tagged NOOPs: "N1 NOOP" -> "N1 OK NOOP completed"
//! ```
//!
//! Every mode in [`Mode`] exists to reproduce one way a connection can
//! break on a network that interferes with mail traffic.

use super::behavior::{Behavior, Mode};
use super::handlers::{
    handle_capability, handle_noop, handle_starttls, refuse_starttls, reject_noop,
};
use super::io::{drain, write_line};
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A fake IMAP server that runs on localhost with an OS-assigned port.
///
/// The server generates a self-signed TLS certificate at startup using
/// `rcgen`, so no cert files are needed. Clients must run with
/// certificate verification disabled.
pub struct FakeImapServer {
    port: u16,
    /// Handle to the background task so it lives as long as the server.
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a new fake IMAP server that applies `behavior` to every
    /// connection.
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let behavior = Arc::new(behavior);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, &behavior).await;
                });
            }
        });

        Self {
            port,
            _handle: handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// STARTTLS-style input pointing at this server.
    pub fn imap_url(&self) -> String {
        format!("imap://127.0.0.1:{}", self.port)
    }

    /// Implicit-TLS-style input pointing at this server.
    pub fn imaps_url(&self) -> String {
        format!("imaps://127.0.0.1:{}", self.port)
    }
}

async fn handle_connection(stream: TcpStream, acceptor: TlsAcceptor, behavior: &Behavior) {
    match behavior.mode {
        Mode::Silent => drain(&mut BufReader::new(stream)).await,
        Mode::PlaintextOnTlsPort => {
            let mut reader = BufReader::new(stream);
            if write_line(&mut reader, &behavior.greeting).await.is_ok() {
                drain(&mut reader).await;
            }
        }
        Mode::ImplicitTls => {
            let Ok(tls_stream) = acceptor.accept(stream).await else {
                return;
            };
            let mut reader = BufReader::new(tls_stream);
            if write_line(&mut reader, &behavior.greeting).await.is_err() {
                return;
            }
            handle_imap_session(reader, behavior).await;
        }
        Mode::RefuseStartTls => {
            let mut reader = BufReader::new(stream);
            if write_line(&mut reader, &behavior.greeting).await.is_err() {
                return;
            }
            let mut line = String::new();
            if reader.read_line(&mut line).await.is_err() {
                return;
            }
            let tag = line.split_whitespace().next().unwrap_or("*").to_string();
            if refuse_starttls(&tag, &mut reader).await.is_ok() {
                drain(&mut reader).await;
            }
        }
        Mode::StartTls | Mode::PlaintextAfterStartTls => {
            let mut reader = BufReader::new(stream);
            if write_line(&mut reader, &behavior.greeting).await.is_err() {
                return;
            }
            if !wait_starttls(&mut reader).await {
                return;
            }
            if behavior.mode == Mode::PlaintextAfterStartTls {
                // Wait for the ClientHello so the reply is read as a record.
                let mut hello = [0u8; 512];
                if reader.read(&mut hello).await.is_err() {
                    return;
                }
                let _ = write_line(&mut reader, "* BYE this is not TLS\r\n").await;
                drain(&mut reader).await;
                return;
            }

            let tcp = reader.into_inner();
            let Ok(tls_stream) = acceptor.accept(tcp).await else {
                return;
            };
            handle_imap_session(BufReader::new(tls_stream), behavior).await;
        }
    }
}

/// Read the STARTTLS command on the plaintext stream and acknowledge
/// it. Any other command is refused and ends the connection.
async fn wait_starttls(reader: &mut BufReader<TcpStream>) -> bool {
    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return false;
    }

    let parts: Vec<&str> = line.trim().splitn(2, ' ').collect();
    if parts.len() < 2 {
        return false;
    }
    let tag = parts[0];
    if !parts[1].eq_ignore_ascii_case("STARTTLS") {
        let resp = format!("{tag} BAD Expected STARTTLS\r\n");
        let _ = write_line(reader, &resp).await;
        return false;
    }

    handle_starttls(tag, reader).await.is_ok()
}

/// Run the encrypted command loop.
///
/// Commands are decoded with `imap-codec`. Only CAPABILITY, NOOP and
/// LOGOUT are understood; everything else gets a tagged BAD.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    behavior: &Behavior,
) {
    let codec = CommandCodec::default();
    let mut noops = 0;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();
        let res = match command.body {
            CommandBody::Capability => handle_capability(tag, &mut reader).await,
            CommandBody::Noop => {
                if behavior.noop_limit.is_some_and(|limit| noops >= limit) {
                    // Vanish mid-session, as a middlebox cutting the flow would.
                    break;
                }
                noops += 1;
                if behavior.noop_reject == Some(noops) {
                    reject_noop(tag, &mut reader).await
                } else {
                    handle_noop(tag, behavior.exists, &mut reader).await
                }
            }
            CommandBody::Logout => {
                let _ = write_line(&mut reader, "* BYE\r\n").await;
                let _ = write_line(&mut reader, &format!("{tag} OK LOGOUT completed\r\n")).await;
                break;
            }
            _ => write_line(&mut reader, &format!("{tag} BAD Unknown command\r\n")).await,
        };
        if res.is_err() {
            break;
        }
    }
}

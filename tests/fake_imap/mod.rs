//! Fake IMAP server for integration testing
//!
//! This module provides an in-process IMAP server that speaks just
//! enough of the protocol to exercise a probe end-to-end, and can be
//! told to misbehave the way interfered-with networks do:
//!
//! TCP -> greeting -> (STARTTLS) -> TLS handshake -> CAPABILITY / NOOP
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS setup, and connection dispatch
//! - `handlers/` -- one file per IMAP command (CAPABILITY, NOOP, ...)
//! - `behavior` -- what the server does on each connection (builder)
//! - `io` -- shared write helpers

mod behavior;
mod io;
mod server;

pub use behavior::Behavior;
pub use server::FakeImapServer;

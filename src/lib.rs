//! IMAP network-interference measurement probe
//!
//! Resolves the host of an `imap://` or `imaps://` target and, for every
//! resolved address, connects, upgrades to TLS (directly or with
//! STARTTLS), checks the capability banner and sends a bounded number
//! of `NOOP` keep-alives. Each step that fails is recorded with a
//! failure string and a failed-step tag so that the results can be
//! analysed for signs of interference.
//!
//! The session machinery in [`runner`] and [`protocol`] is independent
//! of IMAP: other line-oriented protocols plug in through
//! [`LineProtocol`] and their own [`HostSink`] / [`RunSink`] results.

pub mod archival;
mod config;
mod context;
mod error;
pub mod failure;
mod imap;
mod measurer;
pub mod protocol;
pub mod runner;
mod tls;
pub mod trace;

pub use config::{Config, IMAP_PORT, IMAPS_PORT, RuntimeConfig};
pub use context::MeasurementContext;
pub use error::{Error, Result};
pub use imap::{Imap, IndividualTestKeys, STARTTLS, STARTTLS_ACK, STARTTLS_REQUEST, TestKeys};
pub use measurer::{Measurement, Measurer, SummaryKeys, TEST_NAME, TEST_VERSION};
pub use protocol::{LineProtocol, Reply, run_exchange};
pub use runner::{HostSink, RunSink, SessionState, StartTls, TcpRunner, TcpSession};
pub use tls::{server_name, tls_connector};
pub use trace::Trace;

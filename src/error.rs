//! Error types for imap-probe
//!
//! Only configuration problems discovered before any network activity
//! are reported through [`Error`]. Network failures are recorded in the
//! measurement results as failure strings instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no input provided")]
    NoInput,

    #[error("input is not an URL: {0}")]
    NotAnUrl(String),

    #[error("scheme must be imap(s)")]
    InvalidScheme,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

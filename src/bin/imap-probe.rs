#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for measuring IMAP reachability of a host

use clap::Parser;
use imap_probe::{Config, Measurer};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-probe")]
#[command(about = "Measure IMAP/STARTTLS/IMAPS reachability across all addresses of a host")]
struct Args {
    /// Target URL (imap://host[:port] or imaps://host[:port])
    input: String,

    /// Overall deadline in seconds (default: IMAP_PROBE_TIMEOUT or 30)
    #[arg(long)]
    timeout: Option<u64>,

    /// Number of NOOP keep-alives (default: IMAP_PROBE_NOOP_COUNT or 10)
    #[arg(long)]
    noop_count: Option<u8>,

    /// Do not verify the server certificate
    #[arg(long)]
    no_tls_verify: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(n) = args.noop_count {
        config.noop_count = n;
    }
    if args.no_tls_verify {
        config.no_tls_verify = true;
    }

    let measurer = Measurer::new(config);
    let measurement = measurer.measure(&args.input).await?;

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&measurement)?);
    } else {
        println!("{}", serde_json::to_string(&measurement)?);
    }

    Ok(())
}

//! IMAP measurement entry point

use crate::config::{Config, RuntimeConfig};
use crate::context::MeasurementContext;
use crate::error::{Error, Result};
use crate::imap::{Imap, STARTTLS, TestKeys};
use crate::protocol::run_exchange;
use crate::runner::{RunSink, TcpRunner, TcpSession};
use crate::tls::tls_connector;
use crate::trace::Trace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Instant;
use tracing::{debug, info};

pub const TEST_NAME: &str = "imap";
pub const TEST_VERSION: &str = "0.0.1";
pub const DATA_FORMAT_VERSION: &str = "0.2.0";

/// Measures an `imap://` or `imaps://` target across all addresses of
/// its host.
#[derive(Debug, Clone, Default)]
pub struct Measurer {
    config: Config,
}

impl Measurer {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn experiment_name(&self) -> &'static str {
        TEST_NAME
    }

    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn experiment_version(&self) -> &'static str {
        TEST_VERSION
    }

    /// Run the measurement for `input` under `ctx`.
    ///
    /// Only invalid input is an error. DNS and per-address failures are
    /// recorded in the returned [`TestKeys`]. Event times are relative
    /// to `zero`.
    pub async fn run(
        &self,
        ctx: &MeasurementContext,
        input: &str,
        zero: Instant,
    ) -> Result<TestKeys> {
        let rc = RuntimeConfig::parse(input, self.config.noop_count)?;
        let (mut tk, mut runner) = self.prepare(ctx, &rc, zero)?;

        let Some(addrs) = runner.resolve(&mut tk, &rc.host).await else {
            return Ok(tk);
        };
        sweep(&mut runner, &mut tk, &addrs, &rc).await;

        Ok(tk)
    }

    /// Like [`run`](Self::run), but measure `addrs` as the addresses of
    /// the input's host instead of resolving it.
    pub async fn run_addresses(
        &self,
        ctx: &MeasurementContext,
        input: &str,
        addrs: &[IpAddr],
        zero: Instant,
    ) -> Result<TestKeys> {
        let rc = RuntimeConfig::parse(input, self.config.noop_count)?;
        let (mut tk, mut runner) = self.prepare(ctx, &rc, zero)?;
        sweep(&mut runner, &mut tk, addrs, &rc).await;
        Ok(tk)
    }

    fn prepare(
        &self,
        ctx: &MeasurementContext,
        rc: &RuntimeConfig,
        zero: Instant,
    ) -> Result<(TestKeys, TcpRunner)> {
        let connector = tls_connector(self.config.no_tls_verify)
            .map_err(|e| Error::Config(format!("TLS setup failed: {e}")))?;

        let tk = TestKeys::new(rc.host.clone());
        let runner = TcpRunner::new(
            Trace::new(0, zero),
            ctx.clone(),
            connector,
            rc.host.clone(),
            self.config.no_tls_verify,
        );
        Ok((tk, runner))
    }

    /// Run the measurement with a fresh context bounded by the
    /// configured timeout and wrap the results in a [`Measurement`].
    pub async fn measure(&self, input: &str) -> Result<Measurement> {
        let start_time = Utc::now();
        let zero = Instant::now();
        let ctx = MeasurementContext::with_timeout(self.config.timeout);

        let test_keys = self.run(&ctx, input, zero).await?;

        Ok(Measurement::new(
            input,
            start_time,
            zero.elapsed().as_secs_f64(),
            test_keys,
        ))
    }

    /// Summary of a finished measurement. Anomaly detection is not
    /// implemented for this experiment.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn summary_keys(&self, _tk: &TestKeys) -> SummaryKeys {
        SummaryKeys { is_anomaly: false }
    }
}

/// Measure every address in order. A failed address never stops the
/// ones after it.
async fn sweep(
    runner: &mut TcpRunner,
    tk: &mut TestKeys,
    addrs: &[IpAddr],
    rc: &RuntimeConfig,
) {
    for &addr in addrs {
        let Some(mut session) = runner.conn(tk, addr, &rc.port).await else {
            continue;
        };
        let ok = measure_session(&mut session, rc).await;
        debug!("Session to {} succeeded: {}", session.addr(), ok);
        session.close().await;
    }
}

async fn measure_session<R: RunSink>(session: &mut TcpSession<'_, R>, rc: &RuntimeConfig) -> bool {
    if rc.forced_tls {
        info!("Running direct TLS mode to {}", session.addr());
        if !session.handshake().await {
            return false;
        }
    } else {
        info!("Running StartTLS mode to {}", session.addr());
        if !session.start_tls(&STARTTLS).await {
            return false;
        }
    }

    run_exchange(&Imap, session, rc.noop_count).await
}

/// A complete measurement as written to the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub data_format_version: String,
    pub input: String,
    pub measurement_start_time: String,
    pub test_name: String,
    pub test_runtime: f64,
    pub test_version: String,
    pub test_keys: TestKeys,
}

impl Measurement {
    fn new(input: &str, start: DateTime<Utc>, runtime: f64, test_keys: TestKeys) -> Self {
        Self {
            data_format_version: DATA_FORMAT_VERSION.to_string(),
            input: input.to_string(),
            measurement_start_time: start.format("%Y-%m-%d %H:%M:%S").to_string(),
            test_name: TEST_NAME.to_string(),
            test_runtime: runtime,
            test_version: TEST_VERSION.to_string(),
            test_keys,
        }
    }
}

/// Summary keys for this experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryKeys {
    #[serde(skip)]
    pub is_anomaly: bool,
}

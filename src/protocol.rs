//! Banner check and keep-alive exchange for line-oriented protocols
//!
//! A protocol only has to describe its syntax through [`LineProtocol`];
//! [`run_exchange`] drives any established [`TcpSession`] with it.

use crate::failure::new_failure;
use crate::runner::{RunSink, TcpSession};
use tracing::{debug, info, warn};

/// How a line read after a keep-alive request relates to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Not the completion of this request; keep reading.
    Continue,
    /// The request completed successfully.
    Ok,
    /// The server answered the request with an error.
    Rejected,
}

/// Syntax of a line-oriented protocol with a capability banner and a
/// keep-alive command.
pub trait LineProtocol {
    /// Lowercase protocol name, used in failed-step tags.
    fn name(&self) -> &str;

    /// Substring the capability line must contain.
    fn capability_marker(&self) -> &str;

    /// Request to send before reading the capability line when TLS was
    /// negotiated in-band and the server does not greet again.
    ///
    /// This is the only write before the banner check. Its failure is
    /// tagged `{name}_write_capability`, separately from the read.
    fn capability_request(&self) -> Option<String>;

    /// Keep-alive request for the 1-based `iteration`.
    fn keepalive_request(&self, iteration: u8) -> String;

    /// Classify `line` as a response to keep-alive `iteration`.
    fn keepalive_reply(&self, iteration: u8, line: &str) -> Reply;
}

/// Check the capability banner, then perform up to `keepalive_target`
/// keep-alive round trips.
///
/// Returns `true` only if the banner was valid and the keep-alive
/// counter reached the target.
pub async fn run_exchange<P, R>(
    proto: &P,
    session: &mut TcpSession<'_, R>,
    keepalive_target: u8,
) -> bool
where
    P: LineProtocol + ?Sized,
    R: RunSink,
{
    let name = proto.name().to_string();
    debug!("Starting {} exchange with {}", name, session.addr());

    if session.upgraded_in_band()
        && let Some(request) = proto.capability_request()
        && let Err(e) = session.write_all(request.as_bytes()).await
    {
        session.failed_step(new_failure(&e), &format!("{name}_write_capability"));
        return false;
    }

    let line = match session.read_line().await {
        Ok(line) => line,
        Err(e) => {
            session.failed_step(new_failure(&e), &format!("{name}_wait_capability"));
            return false;
        }
    };
    if !line.contains(proto.capability_marker()) {
        session.failed_step(
            format!(
                "Received unexpected {} response: {}",
                name.to_uppercase(),
                line
            ),
            &format!("{name}_wrong_capability"),
        );
        return false;
    }
    info!("{} capability received from {}", name, session.addr());

    if keepalive_target == 0 {
        return true;
    }

    'keepalive: while session.run().keepalives() < keepalive_target {
        let iteration = session.run().keepalives() + 1;
        let step = format!("{name}_noop_{iteration}");
        debug!("{} keep-alive iteration {}", name, iteration);

        let request = proto.keepalive_request(iteration);
        if let Err(e) = session.write_all(request.as_bytes()).await {
            session.failed_step(new_failure(&e), &step);
            break;
        }

        loop {
            let line = match session.read_line().await {
                Ok(line) => line,
                Err(e) => {
                    session.failed_step(new_failure(&e), &step);
                    break 'keepalive;
                }
            };
            match proto.keepalive_reply(iteration, &line) {
                Reply::Continue => {}
                Reply::Ok => {
                    session.run().record_keepalive();
                    break;
                }
                Reply::Rejected => {
                    session.failed_step(
                        format!(
                            "Received unexpected {} response: {}",
                            name.to_uppercase(),
                            line
                        ),
                        &step,
                    );
                    break 'keepalive;
                }
            }
        }
    }

    let done = session.run().keepalives();
    if done == keepalive_target {
        info!("Completed {} keep-alive round trip(s)", done);
        true
    } else {
        warn!("Keep-alive traffic failed at iteration {}", done + 1);
        false
    }
}

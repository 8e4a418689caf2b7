//! Emit command: UDP heartbeat traffic source.
//!
//! Sends a fixed payload to one target at a fixed interval, giving the
//! capture something predictable to record.

use std::io;
use std::net::{SocketAddr, UdpSocket};

use thiserror::Error;

use crate::cli::EmitArgs;
use crate::logger::Logger;
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;

use super::CommandResult;

/// Errors from the heartbeat emitter.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("failed to open UDP socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to send to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Result of emit command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitResult {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
}

/// Execute the emit command.
///
/// Runs until `args.count` datagrams have been sent or shutdown is requested.
pub fn execute_emit<S, H, L>(
    args: &EmitArgs,
    sleeper: &S,
    shutdown: &H,
    logger: &L,
) -> CommandResult<EmitResult>
where
    S: Sleeper,
    H: ShutdownCheck,
    L: Logger,
{
    args.validate()?;

    let bind_addr = if args.target.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr).map_err(EmitError::Bind)?;
    let payload = args.payload.as_bytes();

    logger.info(&format!(
        "Sending {}-byte heartbeat to {} every {}ms",
        payload.len(),
        args.target,
        args.interval_ms
    ));

    let mut result = EmitResult {
        datagrams_sent: 0,
        bytes_sent: 0,
    };

    while !shutdown.should_stop() {
        if args.count.is_some_and(|count| result.datagrams_sent >= count) {
            break;
        }

        let sent = socket
            .send_to(payload, args.target)
            .map_err(|source| EmitError::Send {
                target: args.target,
                source,
            })?;
        result.datagrams_sent += 1;
        result.bytes_sent += sent as u64;
        logger.debug(&format!("Sent datagram {}", result.datagrams_sent));

        sleeper.sleep(args.interval());
    }

    logger.info(&format!(
        "Sent {} datagrams ({} bytes)",
        result.datagrams_sent, result.bytes_sent
    ));
    Ok(result)
}

// ABOUTME: Client-side error type covering dial, frame, and downstream-writer failures
// ABOUTME: Structured per-operation, converted from underlying I/O and frame errors

use std::io;
use thiserror::Error;

use crate::frame::FrameError;

/// Errors surfaced by [`crate::client::session::ClientSession`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dialing the transport failed. Never surfaced directly -- retried with
    /// backoff -- unless the session is closed mid-dial.
    #[error("dial error: {0}")]
    Dial(#[from] io::Error),

    /// A frame-level protocol violation, or a transport read/write failure
    /// once connected.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The payload exceeds the configured MTU; the transport was never
    /// touched.
    #[error("packet too large: {actual} bytes exceeds mtu {mtu}")]
    PacketTooLarge { mtu: usize, actual: usize },

    /// The user-supplied downstream sink (e.g. the TUN device) failed.
    /// Terminal for the session.
    #[error("downstream sink error: {0}")]
    Downstream(io::Error),

    /// `close()` was called, or the session is otherwise permanently dead.
    #[error("client session closed")]
    Closed,
}

pub type ClientResult<T> = Result<T, ClientError>;

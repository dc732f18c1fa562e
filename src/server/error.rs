// ABOUTME: Server-side error types for the accept loop, handshake, and client registry

use std::io;
use thiserror::Error;

use crate::frame::FrameError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener itself failed permanently; `serve` returns this.
    #[error("listener error: {0}")]
    Listener(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("frame error during handshake: {0}")]
    Frame(#[from] FrameError),

    /// The first frame's payload was not a 36-byte ASCII Client ID.
    #[error("invalid client id: expected 36 bytes, got {0}")]
    InvalidClientId(usize),

    #[error("peer closed before sending a client id")]
    NoClientId,
}

use std::io;

use thiserror::Error;

use crate::attach::AttachError;

pub type Result<T> = std::result::Result<T, DebugError>;

#[derive(Error, Debug)]
pub enum DebugError {
    /// No socket yet (target not connected) or the socket was already
    /// cleared by the receive loop on exit.
    #[error("debuggee is not connected")]
    NotConnected,
    /// The connection went away while a request was in flight; pending
    /// requests are drained with this error on process exit.
    #[error("debuggee connection closed")]
    ConnectionClosed,
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error(transparent)]
    Wire(#[from] pylon_wire::WireError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

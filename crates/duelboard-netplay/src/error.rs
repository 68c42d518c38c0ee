//! Netplay error types.

use thiserror::Error;

use crate::session::SessionState;

/// Transport failures. Each one ends the link and returns the session to idle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("stream closed: {0}")]
    StreamClosed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl LinkError {
    /// Classify an I/O error raised while opening a link.
    pub fn from_open(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                Self::StreamClosed(err.to_string())
            }
            _ => Self::PeerUnreachable(err.to_string()),
        }
    }
}

/// Why a local move was refused. No frame is sent and nothing changes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    #[error("it is not your turn")]
    NotYourTurn,

    #[error("cell is already taken")]
    CellOccupied,

    #[error("the round is over")]
    GameFinished,

    #[error("cell is off the board")]
    OutOfBounds,

    #[error("roles have not been agreed yet")]
    RolesUnassigned,
}

#[derive(Error, Debug)]
pub enum NetplayError {
    #[error("not connected to a peer")]
    NotConnected,

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] duelboard_netproto::ProtoError),

    #[error("move rejected: {0}")]
    MoveRejected(#[from] MoveRejection),

    #[error("{command} is not allowed while {state}")]
    InvalidCommand {
        command: &'static str,
        state: SessionState,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("stale state rejected: {0}")]
    RejectedState(String),

    #[error("channel send error")]
    ChannelSend,
}

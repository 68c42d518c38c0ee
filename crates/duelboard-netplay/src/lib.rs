//! Two-peer tic-tac-toe sessions over a byte stream.
//!
//! Peers open one stream, agree who moves first, then mirror every move as a
//! full board snapshot.
//!
//! # Architecture
//!
//! - [`transport`]: Stream backends behind the [`Transport`] trait (TCP included)
//! - [`link`]: Reader/writer tasks for an open stream
//! - [`negotiator`]: First-move claim/confirm handshake
//! - [`game`]: Move validation and remote state adoption
//! - [`rules`]: Win, loss and draw evaluation
//! - [`controller`]: Session state machine, free of I/O
//! - [`handler`]: The task that drives the controller
//! - [`session`]: Session states and the shared snapshot view
//! - [`config`]: Peer options
//! - [`error`]: Error types

pub mod config;
pub mod controller;
pub mod error;
pub mod game;
pub mod handler;
pub mod link;
pub mod negotiator;
pub mod rules;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use config::PeerConfig;
pub use controller::SessionController;
pub use error::{LinkError, MoveRejection, NetplayError};
pub use handler::{PeerCommand, PeerEvent, SessionHandler};
pub use negotiator::RoleAssignment;
pub use session::{ConnectionStatus, LinkSide, SessionSnapshot, SessionState, SessionView};
pub use transport::{TcpTransport, Transport};

//! Wire protocol for duelboard peer sessions.
//!
//! Every frame is one JSON object terminated by `\n`. The stream carries no
//! other framing, so [`framing::LineFramer`] owns message boundaries and
//! [`codec`] turns a single line into a [`messages::Message`].

pub mod board;
pub mod codec;
pub mod constants;
pub mod error;
pub mod framing;
pub mod messages;

pub use board::{Board, Cell, GameResult, Symbol};
pub use codec::{decode_frame, encode_frame};
pub use error::ProtoError;
pub use framing::LineFramer;
pub use messages::{GameState, Message, MessageKind, PeerId, RuleVariant};

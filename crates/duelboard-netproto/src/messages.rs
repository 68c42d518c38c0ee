use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::board::{Board, GameResult};
use crate::error::ProtoError;

/// Stable identity of one peer, e.g. its transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ProtoError> {
        Self::try_from(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PeerId {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            return Err(ProtoError::EmptyPeerId);
        }
        Ok(Self(value))
    }
}

impl From<PeerId> for String {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Win condition in force for a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RuleVariant {
    /// Completing three in a row wins.
    Standard,
    /// Completing three in a row loses.
    #[default]
    Misere,
}

/// Full game state carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub turn: u32,
    pub result: GameResult,
    #[serde(default)]
    pub reset: bool,
}

impl GameState {
    /// A cleared state flagged so the peer mirrors the clear.
    pub fn reset_marker() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Proposes which peer moves first.
    Claim {
        state: GameState,
        first_mover: PeerId,
        rule: RuleVariant,
    },
    /// Finalizes a claim; authoritative for both peers.
    Confirm {
        state: GameState,
        player1: PeerId,
        player2: PeerId,
        rule: RuleVariant,
    },
    /// Complete board snapshot after a move or a reset.
    #[serde(rename = "state")]
    StateUpdate { state: GameState },
}

/// Discriminant of [`Message`], handy for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MessageKind {
    Claim,
    Confirm,
    StateUpdate,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Claim { .. } => MessageKind::Claim,
            Self::Confirm { .. } => MessageKind::Confirm,
            Self::StateUpdate { .. } => MessageKind::StateUpdate,
        }
    }

    pub fn state(&self) -> &GameState {
        match self {
            Self::Claim { state, .. }
            | Self::Confirm { state, .. }
            | Self::StateUpdate { state } => state,
        }
    }
}

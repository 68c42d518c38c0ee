use std::sync::Arc;

use duelboard_netproto::{Board, GameResult, PeerId, RuleVariant, Symbol};
use parking_lot::Mutex;
use strum::Display;

use crate::negotiator::RoleAssignment;

/// Session lifecycle.
///
/// ```text
/// Idle -> Listening | Connecting -> Connected -> HandshakePending -> InGame -> GameOver
/// ```
/// Any state returns to `Idle` when the link drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
    Connecting,
    Connected,
    HandshakePending,
    InGame,
    GameOver,
}

impl SessionState {
    /// True while a link to the peer is up.
    pub fn has_link(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::HandshakePending | Self::InGame | Self::GameOver
        )
    }
}

/// Which end of the link this peer opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LinkSide {
    /// Accepted an inbound connection.
    Listener,
    /// Connected out to the peer.
    Initiator,
}

/// Identities of the two ends of an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub local_id: PeerId,
    pub remote_id: PeerId,
    pub side: LinkSide,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Listening {
        local_addr: Option<String>,
    },
    Connecting {
        address: String,
    },
    Connected {
        peer: PeerId,
        side: LinkSide,
    },
}

impl ConnectionStatus {
    pub fn listen_addr(&self) -> Option<&str> {
        match self {
            Self::Listening { local_addr } => local_addr.as_deref(),
            _ => None,
        }
    }
}

/// Read-only copy of the session, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub session_state: SessionState,
    pub connection_status: ConnectionStatus,
    pub board: Board,
    pub turn: u32,
    pub result: GameResult,
    pub is_local_turn: bool,
    pub local_id: Option<PeerId>,
    pub remote_id: Option<PeerId>,
    pub roles: Option<RoleAssignment>,
    pub local_symbol: Option<Symbol>,
    pub rule: RuleVariant,
    /// Bound address while listening.
    pub listen_addr: Option<String>,
}

/// Cloneable handle the presentation layer reads snapshots from.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    inner: Arc<Mutex<SessionSnapshot>>,
}

impl SessionView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock().clone()
    }

    /// Read one field without cloning the whole snapshot.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&SessionSnapshot) -> R) -> R {
        f(&self.inner.lock())
    }

    pub(crate) fn publish(&self, snapshot: SessionSnapshot) {
        *self.inner.lock() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_starts_idle() {
        let view = SessionView::new();
        let snap = view.snapshot();
        assert_eq!(snap.session_state, SessionState::Idle);
        assert_eq!(snap.connection_status, ConnectionStatus::Disconnected);
        assert!(!snap.is_local_turn);
    }

    #[test]
    fn published_snapshot_is_visible_to_clones() {
        let view = SessionView::new();
        let reader = view.clone();
        view.publish(SessionSnapshot {
            session_state: SessionState::Listening,
            ..SessionSnapshot::default()
        });
        assert_eq!(
            reader.with_snapshot(|s| s.session_state),
            SessionState::Listening
        );
    }

    #[test]
    fn link_states() {
        assert!(!SessionState::Idle.has_link());
        assert!(!SessionState::Connecting.has_link());
        assert!(SessionState::GameOver.has_link());
        assert_eq!(SessionState::HandshakePending.to_string(), "handshake_pending");
    }
}

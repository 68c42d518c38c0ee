//! Session state machine.
//!
//! [`SessionController`] is synchronous and owns no I/O. Each input returns a
//! [`Step`] listing the frames to send and the events to surface; the
//! handler task does the sending.

use duelboard_netproto::{GameResult, GameState, Message, PeerId, RuleVariant, Symbol, decode_frame};
use tracing::{debug, info, warn};

use crate::error::{LinkError, MoveRejection, NetplayError};
use crate::game::{GameSynchronizer, RemoteOutcome};
use crate::handler::PeerEvent;
use crate::negotiator::{ClaimOutcome, ConfirmOutcome, RoleAssignment, RoleNegotiator};
use crate::session::{ConnectionStatus, LinkInfo, SessionSnapshot, SessionState};

/// Frames to send and events to emit after one input.
#[derive(Debug, Default)]
pub struct Step {
    pub outbound: Vec<Message>,
    pub events: Vec<PeerEvent>,
}

impl Step {
    fn send(mut self, msg: Message) -> Self {
        self.outbound.push(msg);
        self
    }

    fn emit(mut self, event: PeerEvent) -> Self {
        self.events.push(event);
        self
    }
}

#[derive(Debug)]
pub struct SessionController {
    state: SessionState,
    rule: RuleVariant,
    keep_roles_on_reset: bool,
    status: ConnectionStatus,
    link: Option<LinkInfo>,
    negotiator: Option<RoleNegotiator>,
    game: GameSynchronizer,
}

impl SessionController {
    pub fn new(rule: RuleVariant, keep_roles_on_reset: bool) -> Self {
        Self {
            state: SessionState::Idle,
            rule,
            keep_roles_on_reset,
            status: ConnectionStatus::Disconnected,
            link: None,
            negotiator: None,
            game: GameSynchronizer::new(rule),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn game_state(&self) -> &GameState {
        self.game.state()
    }

    pub fn is_local_turn(&self) -> bool {
        match (&self.link, &self.negotiator) {
            (Some(link), Some(neg)) if self.state == SessionState::InGame => {
                self.game.is_local_turn(neg.assignment(), &link.local_id)
            }
            _ => false,
        }
    }

    // ---- link lifecycle --------------------------------------------------

    /// Enter `Listening`. The caller has already torn down any old link.
    pub fn begin_listening(&mut self) -> Step {
        let step = self.drop_link(None);
        self.state = SessionState::Listening;
        self.status = ConnectionStatus::Listening { local_addr: None };
        step
    }

    /// Enter `Connecting`. The caller has already torn down any old link.
    pub fn begin_connecting(&mut self, address: &str) -> Step {
        let step = self.drop_link(None);
        self.state = SessionState::Connecting;
        self.status = ConnectionStatus::Connecting {
            address: address.to_string(),
        };
        step
    }

    pub fn on_listening(&mut self, local_addr: String) -> Step {
        if self.state != SessionState::Listening {
            return Step::default();
        }
        info!(%local_addr, "Listening for a peer");
        self.status = ConnectionStatus::Listening {
            local_addr: Some(local_addr.clone()),
        };
        Step::default().emit(PeerEvent::Listening { local_addr })
    }

    pub fn on_link_up(&mut self, link: LinkInfo) -> Step {
        if !matches!(
            self.state,
            SessionState::Listening | SessionState::Connecting
        ) {
            warn!(state = %self.state, "Link opened in unexpected state");
        }
        info!(
            local = %link.local_id,
            remote = %link.remote_id,
            side = %link.side,
            "Connected to peer"
        );
        self.state = SessionState::Connected;
        self.status = ConnectionStatus::Connected {
            peer: link.remote_id.clone(),
            side: link.side,
        };
        self.negotiator = Some(RoleNegotiator::new(&link, self.rule));
        self.game.reset();
        let event = PeerEvent::Connected {
            peer: link.remote_id.clone(),
            side: link.side,
        };
        self.link = Some(link);
        Step::default().emit(event)
    }

    pub fn on_open_failed(&mut self, error: LinkError) -> Step {
        warn!(%error, state = %self.state, "Failed to open link");
        self.clear();
        Step::default().emit(PeerEvent::ConnectFailed { error })
    }

    /// Link dropped (remote or local). `None` means a local disconnect.
    pub fn on_link_down(&mut self, error: Option<LinkError>) -> Step {
        let step = self.drop_link(error);
        self.clear();
        step
    }

    fn drop_link(&mut self, error: Option<LinkError>) -> Step {
        if !self.state.has_link() {
            return Step::default();
        }
        match &error {
            Some(e) => warn!(error = %e, state = %self.state, "Peer link lost"),
            None => info!(state = %self.state, "Peer link closed"),
        }
        self.clear();
        Step::default().emit(PeerEvent::Disconnected { error })
    }

    fn clear(&mut self) {
        self.state = SessionState::Idle;
        self.status = ConnectionStatus::Disconnected;
        self.link = None;
        self.negotiator = None;
        self.game.reset();
    }

    // ---- local commands --------------------------------------------------

    pub fn claim_first_move(&mut self, self_first: bool) -> Result<Step, NetplayError> {
        if self.state != SessionState::Connected {
            return Err(self.invalid("claim_first_move"));
        }
        let neg = self.negotiator.as_mut().ok_or(NetplayError::NotConnected)?;
        let first_mover = neg.claim(self_first)?;
        info!(%first_mover, "Claiming first move");
        self.state = SessionState::HandshakePending;
        Ok(Step::default().send(Message::Claim {
            state: *self.game.state(),
            first_mover,
            rule: self.rule,
        }))
    }

    pub fn local_move(&mut self, row: usize, col: usize) -> Result<Step, NetplayError> {
        match self.state {
            SessionState::InGame => {}
            SessionState::GameOver => return Err(MoveRejection::GameFinished.into()),
            SessionState::Connected | SessionState::HandshakePending => {
                return Err(MoveRejection::RolesUnassigned.into());
            }
            _ => return Err(self.invalid("local_move")),
        }
        let link = self.link.as_ref().ok_or(NetplayError::NotConnected)?;
        let neg = self.negotiator.as_ref().ok_or(NetplayError::NotConnected)?;
        let state = self
            .game
            .apply_local_move(row, col, neg.assignment(), &link.local_id)?;

        let step = Step::default().send(Message::StateUpdate { state });
        Ok(self.after_board_change(step))
    }

    pub fn reset(&mut self) -> Result<Step, NetplayError> {
        if !matches!(
            self.state,
            SessionState::HandshakePending | SessionState::InGame | SessionState::GameOver
        ) {
            return Err(self.invalid("reset"));
        }
        let neg = self.negotiator.as_mut().ok_or(NetplayError::NotConnected)?;
        let previous_first = neg.assignment().map(|r| r.player1.clone());
        neg.reset();
        let reclaim = match previous_first {
            Some(first_mover) if self.keep_roles_on_reset => Some(neg.claim_for(first_mover)?),
            _ => None,
        };
        self.game.reset();
        self.state = SessionState::Connected;
        info!("Resetting round");

        let mut step = Step::default()
            .send(Message::StateUpdate {
                state: GameState::reset_marker(),
            })
            .emit(self.board_event());

        if let Some(first_mover) = reclaim {
            debug!(%first_mover, "Re-claiming previous roles");
            self.state = SessionState::HandshakePending;
            step = step.send(Message::Claim {
                state: *self.game.state(),
                first_mover,
                rule: self.rule,
            });
        }
        Ok(step)
    }

    // ---- inbound frames --------------------------------------------------

    /// Handle one raw line from the peer. Frames that fail to decode or
    /// break a protocol rule are logged and dropped; the link stays up.
    pub fn on_frame(&mut self, frame: &[u8]) -> Step {
        if !self.state.has_link() {
            debug!(state = %self.state, "Frame without a link, dropping");
            return Step::default();
        }
        let msg = match decode_frame(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping undecodable frame");
                return Step::default();
            }
        };
        debug!(kind = %msg.kind(), state = %self.state, "Frame received");
        let result = match msg {
            Message::Claim {
                first_mover, rule, ..
            } => self.on_claim(&first_mover, rule),
            Message::Confirm {
                player1,
                player2,
                rule,
                ..
            } => self.on_confirm(&player1, &player2, rule),
            Message::StateUpdate { state } => self.on_state(&state),
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring frame");
            Step::default()
        })
    }

    fn on_claim(&mut self, first_mover: &PeerId, rule: RuleVariant) -> Result<Step, NetplayError> {
        let local_rule = self.rule;
        let neg = self.negotiator.as_mut().ok_or(NetplayError::NotConnected)?;
        match neg.on_claim(first_mover, rule)? {
            ClaimOutcome::Confirm(roles) => {
                self.game.reset();
                self.state = SessionState::InGame;
                info!(player1 = %roles.player1, player2 = %roles.player2, "Roles agreed");
                let step = Step::default().send(Message::Confirm {
                    state: *self.game.state(),
                    player1: roles.player1.clone(),
                    player2: roles.player2.clone(),
                    rule: local_rule,
                });
                Ok(step.emit(self.handshake_event(roles)))
            }
            ClaimOutcome::Reconfirm(roles) => Ok(Step::default().send(Message::Confirm {
                state: *self.game.state(),
                player1: roles.player1,
                player2: roles.player2,
                rule: local_rule,
            })),
            ClaimOutcome::Ignored => Ok(Step::default()),
            ClaimOutcome::RuleMismatch { remote } => {
                warn!(local = %local_rule, %remote, "Peer claims with a different rule");
                Ok(Step::default().emit(PeerEvent::RuleMismatch {
                    local: local_rule,
                    remote,
                }))
            }
        }
    }

    fn on_confirm(
        &mut self,
        player1: &PeerId,
        player2: &PeerId,
        rule: RuleVariant,
    ) -> Result<Step, NetplayError> {
        let neg = self.negotiator.as_mut().ok_or(NetplayError::NotConnected)?;
        match neg.on_confirm(player1, player2, rule)? {
            ConfirmOutcome::Adopted(roles) => {
                self.game.reset();
                self.state = SessionState::InGame;
                info!(player1 = %roles.player1, player2 = %roles.player2, "Roles confirmed by peer");
                Ok(Step::default().emit(self.handshake_event(roles)))
            }
            ConfirmOutcome::Duplicate => Ok(Step::default()),
            ConfirmOutcome::Ignored => {
                debug!(state = %self.state, "Unsolicited confirm ignored");
                Ok(Step::default())
            }
        }
    }

    fn on_state(&mut self, incoming: &GameState) -> Result<Step, NetplayError> {
        let remote_symbol = self.local_symbol().map(Symbol::other);
        match self.game.apply_remote_state(incoming, remote_symbol)? {
            RemoteOutcome::Reset => Ok(self.on_remote_reset()),
            RemoteOutcome::Duplicate => Ok(Step::default()),
            RemoteOutcome::Applied => Ok(self.after_board_change(Step::default())),
        }
    }

    fn on_remote_reset(&mut self) -> Step {
        info!("Peer reset the round");
        let Some(neg) = self.negotiator.as_mut() else {
            return Step::default();
        };
        let mut step = Step::default().emit(PeerEvent::ResetByPeer);

        // An outstanding claim may have been dropped by the peer's reset;
        // send it again so both ends converge.
        if let Some(first_mover) = neg.pending_claim().cloned() {
            self.state = SessionState::HandshakePending;
            step = step.send(Message::Claim {
                state: *self.game.state(),
                first_mover,
                rule: self.rule,
            });
        } else {
            neg.reset();
            self.state = SessionState::Connected;
        }
        step.emit(self.board_event())
    }

    fn after_board_change(&mut self, step: Step) -> Step {
        let step = step.emit(self.board_event());
        let result = self.game.result();
        if !result.is_terminal() {
            return step;
        }
        self.state = SessionState::GameOver;
        let local_won = match (result, self.local_symbol()) {
            (GameResult::Won(winner), Some(mine)) => Some(winner == mine),
            _ => None,
        };
        info!(?result, ?local_won, "Round over");
        step.emit(PeerEvent::GameOver { result, local_won })
    }

    fn local_symbol(&self) -> Option<Symbol> {
        self.negotiator.as_ref().and_then(RoleNegotiator::local_symbol)
    }

    fn board_event(&self) -> PeerEvent {
        PeerEvent::BoardUpdated {
            state: *self.game.state(),
            is_local_turn: self.is_local_turn(),
        }
    }

    fn handshake_event(&self, roles: RoleAssignment) -> PeerEvent {
        PeerEvent::HandshakeComplete {
            local_first: self.is_local_turn(),
            roles,
        }
    }

    fn invalid(&self, command: &'static str) -> NetplayError {
        NetplayError::InvalidCommand {
            command,
            state: self.state,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.game.state();
        SessionSnapshot {
            session_state: self.state,
            connection_status: self.status.clone(),
            board: state.board,
            turn: state.turn,
            result: state.result,
            is_local_turn: self.is_local_turn(),
            local_id: self.link.as_ref().map(|l| l.local_id.clone()),
            remote_id: self.link.as_ref().map(|l| l.remote_id.clone()),
            roles: self
                .negotiator
                .as_ref()
                .and_then(|n| n.assignment().cloned()),
            local_symbol: self.local_symbol(),
            rule: self.rule,
            listen_addr: self.status.listen_addr().map(str::to_string),
        }
    }
}

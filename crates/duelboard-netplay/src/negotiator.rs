//! First-move negotiation between two peers.
//!
//! One peer sends a claim naming who moves first; the other answers with a
//! confirm carrying the final assignment. The confirm is authoritative: the
//! claimer adopts it verbatim. When both peers claim before either claim
//! lands, the listening side drops its own claim and confirms the
//! initiator's, while the initiator ignores the listener's claim and waits
//! for that confirm.

use duelboard_netproto::{PeerId, RuleVariant, Symbol};
use tracing::{debug, warn};

use crate::error::NetplayError;
use crate::session::{LinkInfo, LinkSide};

/// Who moves first. `player1` plays X, `player2` plays O.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub player1: PeerId,
    pub player2: PeerId,
}

impl RoleAssignment {
    pub fn symbol_of(&self, id: &PeerId) -> Option<Symbol> {
        if *id == self.player1 {
            Some(Symbol::X)
        } else if *id == self.player2 {
            Some(Symbol::O)
        } else {
            None
        }
    }

    pub fn is_player1(&self, id: &PeerId) -> bool {
        self.player1 == *id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePhase {
    Unassigned,
    ClaimSent { first_mover: PeerId },
    Complete(RoleAssignment),
}

/// Reaction to an inbound claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Roles are now fixed; send a confirm with this assignment.
    Confirm(RoleAssignment),
    /// Roles were already fixed to exactly this claim; repeat the confirm.
    Reconfirm(RoleAssignment),
    /// The claim lost a race or conflicts with settled roles.
    Ignored,
    /// The peer plays a different rule; nothing changes.
    RuleMismatch { remote: RuleVariant },
}

/// Reaction to an inbound confirm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Adopted(RoleAssignment),
    Duplicate,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RoleNegotiator {
    local: PeerId,
    remote: PeerId,
    side: LinkSide,
    rule: RuleVariant,
    phase: RolePhase,
}

impl RoleNegotiator {
    pub fn new(link: &LinkInfo, rule: RuleVariant) -> Self {
        Self {
            local: link.local_id.clone(),
            remote: link.remote_id.clone(),
            side: link.side,
            rule,
            phase: RolePhase::Unassigned,
        }
    }

    pub fn phase(&self) -> &RolePhase {
        &self.phase
    }

    pub fn assignment(&self) -> Option<&RoleAssignment> {
        match &self.phase {
            RolePhase::Complete(roles) => Some(roles),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, RolePhase::Complete(_))
    }

    /// Symbol the local peer plays once roles are fixed.
    pub fn local_symbol(&self) -> Option<Symbol> {
        self.assignment().and_then(|r| r.symbol_of(&self.local))
    }

    /// Start a claim. Returns the identity to put in the claim frame.
    pub fn claim(&mut self, self_first: bool) -> Result<PeerId, NetplayError> {
        let first_mover = if self_first {
            self.local.clone()
        } else {
            self.remote.clone()
        };
        self.claim_for(first_mover)
    }

    /// Start a claim naming `first_mover` explicitly.
    pub fn claim_for(&mut self, first_mover: PeerId) -> Result<PeerId, NetplayError> {
        if !matches!(self.phase, RolePhase::Unassigned) {
            return Err(NetplayError::Handshake(
                "a claim is already outstanding or roles are set".to_string(),
            ));
        }
        if !self.is_participant(&first_mover) {
            return Err(NetplayError::Handshake(format!(
                "{first_mover} is not part of this session"
            )));
        }
        self.phase = RolePhase::ClaimSent {
            first_mover: first_mover.clone(),
        };
        Ok(first_mover)
    }

    /// Outstanding claim, if one is waiting for a confirm.
    pub fn pending_claim(&self) -> Option<&PeerId> {
        match &self.phase {
            RolePhase::ClaimSent { first_mover } => Some(first_mover),
            _ => None,
        }
    }

    pub fn on_claim(
        &mut self,
        first_mover: &PeerId,
        rule: RuleVariant,
    ) -> Result<ClaimOutcome, NetplayError> {
        if rule != self.rule {
            return Ok(ClaimOutcome::RuleMismatch { remote: rule });
        }
        if !self.is_participant(first_mover) {
            return Err(NetplayError::Handshake(format!(
                "claim names unknown peer {first_mover}"
            )));
        }

        let claimed = self.assignment_for(first_mover);
        match &self.phase {
            RolePhase::Unassigned => {
                self.phase = RolePhase::Complete(claimed.clone());
                Ok(ClaimOutcome::Confirm(claimed))
            }
            RolePhase::ClaimSent { .. } => match self.side {
                LinkSide::Listener => {
                    debug!(first_mover = %first_mover, "Dropping own claim for the initiator's");
                    self.phase = RolePhase::Complete(claimed.clone());
                    Ok(ClaimOutcome::Confirm(claimed))
                }
                LinkSide::Initiator => {
                    debug!(first_mover = %first_mover, "Ignoring listener claim while own claim is pending");
                    Ok(ClaimOutcome::Ignored)
                }
            },
            RolePhase::Complete(existing) if *existing == claimed => {
                Ok(ClaimOutcome::Reconfirm(claimed))
            }
            RolePhase::Complete(_) => {
                warn!(first_mover = %first_mover, "Claim conflicts with settled roles");
                Ok(ClaimOutcome::Ignored)
            }
        }
    }

    pub fn on_confirm(
        &mut self,
        player1: &PeerId,
        player2: &PeerId,
        rule: RuleVariant,
    ) -> Result<ConfirmOutcome, NetplayError> {
        if rule != self.rule {
            return Err(NetplayError::Handshake(format!(
                "confirm uses rule {rule}, local rule is {}",
                self.rule
            )));
        }
        let pair_ok = (*player1 == self.local && *player2 == self.remote)
            || (*player1 == self.remote && *player2 == self.local);
        if !pair_ok {
            return Err(NetplayError::Handshake(format!(
                "confirm names {player1} and {player2}, expected {} and {}",
                self.local, self.remote
            )));
        }

        let confirmed = RoleAssignment {
            player1: player1.clone(),
            player2: player2.clone(),
        };
        match &self.phase {
            RolePhase::ClaimSent { first_mover } => {
                if *first_mover != confirmed.player1 {
                    warn!(
                        claimed = %first_mover,
                        confirmed = %confirmed.player1,
                        "Confirm differs from our claim, adopting it"
                    );
                }
                self.phase = RolePhase::Complete(confirmed.clone());
                Ok(ConfirmOutcome::Adopted(confirmed))
            }
            RolePhase::Complete(existing) if *existing == confirmed => {
                Ok(ConfirmOutcome::Duplicate)
            }
            _ => Ok(ConfirmOutcome::Ignored),
        }
    }

    /// Forget roles, e.g. after a reset.
    pub fn reset(&mut self) {
        self.phase = RolePhase::Unassigned;
    }

    fn is_participant(&self, id: &PeerId) -> bool {
        *id == self.local || *id == self.remote
    }

    fn assignment_for(&self, first_mover: &PeerId) -> RoleAssignment {
        let second = if *first_mover == self.local {
            self.remote.clone()
        } else {
            self.local.clone()
        };
        RoleAssignment {
            player1: first_mover.clone(),
            player2: second,
        }
    }
}

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::world::PlayerId;

/// Phases of one turn. Each phase has exactly one successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Init,
    Action,
    ActionResolution,
    ApplyingDeltas,
    ResettingActions,
}

impl TurnPhase {
    pub fn next(self) -> TurnPhase {
        match self {
            TurnPhase::Init => TurnPhase::Action,
            TurnPhase::Action => TurnPhase::ActionResolution,
            TurnPhase::ActionResolution => TurnPhase::ApplyingDeltas,
            TurnPhase::ApplyingDeltas => TurnPhase::ResettingActions,
            TurnPhase::ResettingActions => TurnPhase::Action,
        }
    }

    pub fn can_advance_to(self, to: TurnPhase) -> bool {
        self.next() == to
    }
}

/// Result of a seat signalling end-of-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTurnOutcome {
    Accepted { awaiting: usize },
    ReadyToResolve,
}

/// Tracks which seats still owe an end-of-turn signal.
#[derive(Debug, Clone, Default)]
pub struct TurnQueue {
    players: BTreeSet<PlayerId>,
    awaiting: BTreeSet<PlayerId>,
}

impl TurnQueue {
    pub fn new(players: impl IntoIterator<Item = PlayerId>) -> Self {
        let players: BTreeSet<_> = players.into_iter().collect();
        Self {
            awaiting: players.clone(),
            players,
        }
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    pub fn has_ended(&self, player: PlayerId) -> bool {
        self.players.contains(&player) && !self.awaiting.contains(&player)
    }

    pub fn awaiting(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.awaiting.iter().copied()
    }

    /// Returns `None` for a seat that is not registered or already ended.
    pub fn end_turn(&mut self, player: PlayerId) -> Option<EndTurnOutcome> {
        if !self.awaiting.remove(&player) {
            return None;
        }
        if self.awaiting.is_empty() {
            Some(EndTurnOutcome::ReadyToResolve)
        } else {
            Some(EndTurnOutcome::Accepted {
                awaiting: self.awaiting.len(),
            })
        }
    }

    pub fn is_ready(&self) -> bool {
        self.awaiting.is_empty()
    }

    /// Every seat owes a signal again.
    pub fn reset(&mut self) {
        self.awaiting = self.players.clone();
    }
}

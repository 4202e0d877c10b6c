//! Commands issued into the engine and the typed results handed back.

use serde::{Deserialize, Serialize};

use crate::systems::evolution::{EvolutionResult, StagedEvolution};
use crate::turn::TurnPhase;
use crate::world::{CloudId, FlowerTypeId, PlayerId, TileIndex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    PlaceSeed {
        seed_type: FlowerTypeId,
        tile: TileIndex,
        owner: PlayerId,
    },
    RemoveSeed {
        seed_type: FlowerTypeId,
        tile: TileIndex,
        owner: PlayerId,
    },
    PlaceCloud {
        player: PlayerId,
        cloud: CloudId,
        tile: TileIndex,
    },
    SetAutoReplant {
        player: PlayerId,
        tile: TileIndex,
        seed_type: Option<FlowerTypeId>,
    },
    StageSeedForEvolution {
        player: PlayerId,
        seed_type: FlowerTypeId,
    },
    UnstageSeedForEvolution {
        player: PlayerId,
    },
    ResolveEvolution {
        player: PlayerId,
    },
    SelectEvolveChoice {
        player: PlayerId,
        index: usize,
    },
    EndTurn {
        player: PlayerId,
    },
}

impl Command {
    pub fn player(&self) -> PlayerId {
        match self {
            Command::PlaceSeed { owner, .. } | Command::RemoveSeed { owner, .. } => *owner,
            Command::PlaceCloud { player, .. }
            | Command::SetAutoReplant { player, .. }
            | Command::StageSeedForEvolution { player, .. }
            | Command::UnstageSeedForEvolution { player }
            | Command::ResolveEvolution { player }
            | Command::SelectEvolveChoice { player, .. }
            | Command::EndTurn { player } => *player,
        }
    }
}

/// Why a seed could not be placed or removed. The state is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementRejection {
    OutOfBounds,
    UnknownSeedType,
    NotOwner,
    BlockedByFlower,
    BlockedByMountain,
    NoAdjacentFriendlyFlower,
    InsufficientSeeds,
    /// Seeds of a different type are already staged on the tile.
    Blocking,
    NothingToRemove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionRejection {
    UnknownSeedType,
    NotOwner,
    /// A different seed type is already staged this turn.
    DifferentTypeStaged,
    InsufficientSeeds,
    AtHighestStage,
    NothingStaged,
    AlreadyResolved,
    NoPendingChoices,
    ChoiceOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    WrongPhase(TurnPhase),
    UnknownPlayer,
    NotYourTurn,
    UnknownCloud,
    Placement(PlacementRejection),
    Evolution(EvolutionRejection),
}

impl From<PlacementRejection> for Rejection {
    fn from(value: PlacementRejection) -> Self {
        Rejection::Placement(value)
    }
}

impl From<EvolutionRejection> for Rejection {
    fn from(value: EvolutionRejection) -> Self {
        Rejection::Evolution(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    SeedPlaced { remaining: i64 },
    SeedRemoved { remaining: i64 },
    CloudPlaced,
    AutoReplantSet,
    EvolutionStaged(StagedEvolution),
    EvolutionUnstaged,
    EvolutionResolved(EvolutionResult),
    EvolutionSelected { new_type: FlowerTypeId },
    TurnEnded { awaiting: usize },
    TurnAdvanced { turn: u64 },
    Rejected(Rejection),
}

impl CommandOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandOutcome::Rejected(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            CommandOutcome::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }
}

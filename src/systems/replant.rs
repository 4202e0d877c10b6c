use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use crate::{
    commands::{PlacementRejection, Rejection},
    delta::{DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    world::{FlowerTypeId, GameState, PlayerId, TileIndex},
};

/// Auto-replant edits made during the current turn. `None` clears the slot.
/// Later edits to the same slot overwrite earlier ones.
pub const AUTO_REPLANT_EDITS: &str = "auto_replant_edits";

type Edits = BTreeMap<(PlayerId, TileIndex), Option<FlowerTypeId>>;

/// Stage a standing replant instruction for `tile`, or clear it with `None`.
pub fn set_slot(
    state: &GameState,
    delta: &mut GameStateDelta,
    player: PlayerId,
    tile: TileIndex,
    seed_type: Option<&FlowerTypeId>,
) -> Result<(), Rejection> {
    if state.tile(tile).is_none() {
        return Err(PlacementRejection::OutOfBounds.into());
    }
    if let Some(seed_type) = seed_type {
        if state.flower_type(seed_type).is_none() {
            return Err(PlacementRejection::UnknownSeedType.into());
        }
        if state.owner_of_type(seed_type) != Some(player) {
            return Err(PlacementRejection::NotOwner.into());
        }
    }
    stage(delta, player, tile, seed_type.cloned());
    Ok(())
}

/// Clear a slot whose inventory ran dry.
pub fn clear_slot(delta: &mut GameStateDelta, player: PlayerId, tile: TileIndex) {
    stage(delta, player, tile, None);
}

/// Slot value as it will stand after this turn's edits.
pub fn pending_slot(
    state: &GameState,
    delta: &GameStateDelta,
    player: PlayerId,
    tile: TileIndex,
) -> Option<FlowerTypeId> {
    match delta
        .intermediate::<Edits>(AUTO_REPLANT_EDITS)
        .and_then(|edits| edits.get(&(player, tile)))
    {
        Some(edit) => edit.clone(),
        None => state
            .player(player)
            .and_then(|owner| owner.auto_replant.get(&tile).cloned()),
    }
}

fn stage(delta: &mut GameStateDelta, player: PlayerId, tile: TileIndex, seed_type: Option<FlowerTypeId>) {
    delta.add_intermediate_delta::<Edits, _>(AUTO_REPLANT_EDITS, |edits| {
        edits.insert((player, tile), seed_type);
    });
}

/// Writes each slot's final auto-replant edit as one `Replace` or `Delete`.
pub struct ReplantSystem;

impl ReplantSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReplantSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ReplantSystem {
    fn name(&self) -> &str {
        "replant"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        _rng: &mut SeededRandom,
    ) -> Result<()> {
        let Some(edits) = delta.intermediate::<Edits>(AUTO_REPLANT_EDITS).cloned() else {
            return Ok(());
        };
        let mut written = 0usize;
        for ((player, tile), edit) in edits {
            let current = state
                .player(player)
                .and_then(|owner| owner.auto_replant.get(&tile));
            if current == edit.as_ref() {
                continue;
            }
            let path = KeyPath::AutoReplant { player, tile };
            match edit {
                Some(seed_type) => {
                    delta.add_delta(path, DeltaValue::TypeId(seed_type), DeltaOp::Replace)
                }
                None => delta.add_delta(path, DeltaValue::Empty, DeltaOp::Delete),
            }
            written += 1;
        }
        debug!(turn = ctx.turn, slots = written, "auto-replant slots updated");
        Ok(())
    }
}

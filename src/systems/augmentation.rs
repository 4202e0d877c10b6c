use anyhow::Result;
use tracing::debug;

use crate::{
    delta::{DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    world::GameState,
};

/// Counts every augmentation down by one turn and drops the ones that run out.
pub struct AugmentationSystem;

impl AugmentationSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AugmentationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for AugmentationSystem {
    fn name(&self) -> &str {
        "augmentation"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        _rng: &mut SeededRandom,
    ) -> Result<()> {
        let mut expired_total = 0;
        for (flower, augmentations) in state.augmented_flowers() {
            let mut expired = Vec::new();
            for (index, augmentation) in augmentations.iter().enumerate() {
                if augmentation.turns_remaining <= 1 {
                    expired.push(index);
                } else {
                    delta.add_integer(
                        KeyPath::AugmentationTurns {
                            flower: *flower,
                            index,
                        },
                        -1,
                    );
                }
            }
            // Counter updates address pre-removal indices, so the removal goes last.
            if !expired.is_empty() {
                expired_total += expired.len();
                delta.add_delta(
                    KeyPath::Augmentations { flower: *flower },
                    DeltaValue::Indices(expired),
                    DeltaOp::Remove,
                );
            }
        }
        debug!(turn = ctx.turn, expired = expired_total, "augmentations decayed");
        Ok(())
    }
}

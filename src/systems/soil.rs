use std::collections::BTreeSet;

use anyhow::Result;
use tracing::debug;

use crate::{
    delta::{GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    world::{GameState, Nutrient, TileIndex},
};

/// Tiles already degraded during the current turn.
pub const DEGRADED_TILES: &str = "degraded_tiles";

/// Drought (water at or below zero) and flooding (water at the ceiling) strip
/// nutrients from a tile.
pub struct SoilSystem;

impl SoilSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SoilSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SoilSystem {
    fn name(&self) -> &str {
        "soil"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        _rng: &mut SeededRandom,
    ) -> Result<()> {
        let already: BTreeSet<TileIndex> = delta
            .intermediate::<BTreeSet<TileIndex>>(DEGRADED_TILES)
            .cloned()
            .unwrap_or_default();
        let mut degraded = Vec::new();
        for tile in state.tiles() {
            if already.contains(&tile.index) {
                continue;
            }
            if tile.water > 0 && tile.water < ctx.rules.water_ceiling {
                continue;
            }
            for nutrient in Nutrient::ALL {
                delta.add_number(
                    KeyPath::TileNutrient {
                        tile: tile.index,
                        nutrient,
                    },
                    -ctx.rules.degradation,
                );
            }
            degraded.push(tile.index);
        }
        debug!(turn = ctx.turn, tiles = degraded.len(), "soil degraded");
        delta.add_intermediate_delta::<BTreeSet<TileIndex>, _>(DEGRADED_TILES, |set| {
            set.extend(degraded)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rules;
    use crate::world::fixtures::*;

    fn nitrogen(tile: TileIndex) -> KeyPath {
        KeyPath::TileNutrient {
            tile,
            nutrient: Nutrient::Nitrogen,
        }
    }

    #[test]
    fn dry_and_flooded_tiles_degrade() {
        let mut data = grid(3, 1, 50.0, 5);
        data.tiles[0].water = 0;
        data.tiles[2].water = 10;
        let state = GameState::from_data(data).expect("state");
        let rules = Rules::default();
        let ctx = SystemContext { turn: 0, rules: &rules };
        let mut delta = GameStateDelta::new();
        let mut rng = SeededRandom::new(1);
        SoilSystem::new()
            .run(&ctx, &state, &mut delta, &mut rng)
            .expect("run");
        assert_eq!(delta.pending_number(&nitrogen(0)), -20.0);
        assert_eq!(delta.pending_number(&nitrogen(1)), 0.0);
        assert_eq!(delta.pending_number(&nitrogen(2)), -20.0);
    }

    #[test]
    fn second_run_in_same_turn_does_not_double_apply() {
        let mut data = grid(2, 1, 50.0, 5);
        data.tiles[0].water = 0;
        let state = GameState::from_data(data).expect("state");
        let rules = Rules::default();
        let ctx = SystemContext { turn: 0, rules: &rules };
        let mut delta = GameStateDelta::new();
        let mut rng = SeededRandom::new(1);
        let mut system = SoilSystem::new();
        system.run(&ctx, &state, &mut delta, &mut rng).expect("first");
        system.run(&ctx, &state, &mut delta, &mut rng).expect("second");
        assert_eq!(delta.pending_number(&nitrogen(0)), -20.0);
    }
}

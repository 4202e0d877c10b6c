use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use tracing::debug;

use crate::{
    commands::Rejection,
    delta::{DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    world::{CloudId, GameState, Nutrient, PlayerId, TileIndex},
};

/// Clouds placed during the current turn, cloud -> tile.
pub const CLOUD_PLACEMENTS: &str = "cloud_placements";

/// Stage a cloud over a tile for this turn. Clouds drift away again once the
/// turn is committed.
pub fn place_cloud(
    state: &GameState,
    delta: &mut GameStateDelta,
    player: PlayerId,
    cloud: CloudId,
    tile: TileIndex,
) -> Result<(), Rejection> {
    let owner = state.player(player).ok_or(Rejection::UnknownPlayer)?;
    if owner.cloud != Some(cloud) || state.cloud(cloud).is_none() {
        return Err(Rejection::UnknownCloud);
    }
    if state.tile(tile).is_none() {
        return Err(Rejection::Placement(
            crate::commands::PlacementRejection::OutOfBounds,
        ));
    }
    delta.add_intermediate_delta::<BTreeMap<CloudId, TileIndex>, _>(CLOUD_PLACEMENTS, |clouds| {
        clouds.insert(cloud, tile);
    });
    Ok(())
}

/// Tiles currently irrigating: every river plus every cloud, staged or persisted.
/// A river and a cloud on the same tile count once.
pub fn irrigator_tiles(state: &GameState, delta: &GameStateDelta) -> BTreeSet<TileIndex> {
    let staged = delta.intermediate::<BTreeMap<CloudId, TileIndex>>(CLOUD_PLACEMENTS);
    let mut tiles = BTreeSet::new();
    for river in state.rivers() {
        if let Some(index) = state.index_of(river.x as i64, river.y as i64) {
            tiles.insert(index);
        }
    }
    for cloud in state.clouds() {
        let tile = staged
            .and_then(|placements| placements.get(&cloud.id).copied())
            .or(cloud.tile);
        if let Some(tile) = tile {
            tiles.insert(tile);
        }
    }
    tiles
}

/// Rivers and clouds feed nutrients to their own tile at full strength and to
/// neighbours at half strength. Nutrient gains stack across irrigators; the
/// water gain does not.
pub struct IrrigationSystem;

impl IrrigationSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IrrigationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for IrrigationSystem {
    fn name(&self) -> &str {
        "irrigation"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        _rng: &mut SeededRandom,
    ) -> Result<()> {
        let rules = ctx.rules;
        let irrigators = irrigator_tiles(state, delta);
        let mut water_gain: BTreeMap<TileIndex, i64> = BTreeMap::new();

        for &source in &irrigators {
            add_nutrients(delta, source, rules.irrigation_strength);
            let gain = water_gain.entry(source).or_default();
            *gain = (*gain).max(rules.irrigation_water);

            for neighbor in state.adjacent_indices(source) {
                add_nutrients(delta, neighbor, rules.irrigation_strength / 2.0);
                let gain = water_gain.entry(neighbor).or_default();
                *gain = (*gain).max(rules.irrigation_water_adjacent);
            }
        }

        for tile in state.tiles() {
            let change = match water_gain.get(&tile.index) {
                Some(gain) => (*gain).min((rules.irrigation_water_level - tile.water).max(0)),
                None if tile.water > 0 => -rules.evaporation,
                None => 0,
            };
            if change != 0 {
                delta.add_integer(KeyPath::TileWater { tile: tile.index }, change);
            }
        }

        for cloud in state.clouds().filter(|cloud| cloud.tile.is_some()) {
            delta.add_delta(
                KeyPath::CloudTile { cloud: cloud.id },
                DeltaValue::Tile(None),
                DeltaOp::Replace,
            );
        }

        debug!(
            turn = ctx.turn,
            irrigators = irrigators.len(),
            watered = water_gain.len(),
            "irrigation applied"
        );
        Ok(())
    }
}

fn add_nutrients(delta: &mut GameStateDelta, tile: TileIndex, amount: f64) {
    for nutrient in Nutrient::ALL {
        delta.add_number(KeyPath::TileNutrient { tile, nutrient }, amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Rules;
    use crate::world::fixtures::*;
    use crate::world::{Cloud, River};

    fn nitrogen(tile: TileIndex) -> KeyPath {
        KeyPath::TileNutrient {
            tile,
            nutrient: Nutrient::Nitrogen,
        }
    }

    fn run(state: &GameState, delta: &mut GameStateDelta) {
        let rules = Rules::default();
        let ctx = SystemContext { turn: 0, rules: &rules };
        let mut rng = SeededRandom::new(3);
        IrrigationSystem::new()
            .run(&ctx, state, delta, &mut rng)
            .expect("run");
    }

    #[test]
    fn river_feeds_own_tile_fully_and_neighbours_by_half() {
        let mut data = grid(4, 4, 50.0, 5);
        data.rivers.push(River { x: 0, y: 0 });
        let state = GameState::from_data(data).expect("state");
        let mut delta = GameStateDelta::new();
        run(&state, &mut delta);
        assert_eq!(delta.pending_number(&nitrogen(0)), 4.0);
        assert_eq!(delta.pending_number(&nitrogen(1)), 2.0);
        assert_eq!(delta.pending_number(&nitrogen(5)), 2.0);
        assert_eq!(delta.pending_number(&nitrogen(2)), 0.0);
        assert_eq!(delta.pending_integer(&KeyPath::TileWater { tile: 0 }), 1);
        assert_eq!(delta.pending_integer(&KeyPath::TileWater { tile: 2 }), -1);
    }

    #[test]
    fn overlapping_irrigators_stack_nutrients_but_not_water() {
        let mut data = grid(3, 1, 50.0, 2);
        data.rivers.push(River { x: 0, y: 0 });
        data.rivers.push(River { x: 2, y: 0 });
        let state = GameState::from_data(data).expect("state");
        let mut delta = GameStateDelta::new();
        run(&state, &mut delta);
        assert_eq!(delta.pending_number(&nitrogen(1)), 4.0);
        assert_eq!(delta.pending_integer(&KeyPath::TileWater { tile: 1 }), 1);
    }

    #[test]
    fn cloud_on_river_tile_counts_once_and_is_reset() {
        let mut data = grid(2, 1, 50.0, 5);
        data.rivers.push(River { x: 0, y: 0 });
        data.clouds.push(Cloud {
            id: CloudId(1),
            tile: Some(0),
        });
        let state = GameState::from_data(data).expect("state");
        let mut delta = GameStateDelta::new();
        run(&state, &mut delta);
        assert_eq!(delta.pending_number(&nitrogen(0)), 4.0);
        assert_eq!(
            delta.get(&KeyPath::CloudTile { cloud: CloudId(1) }, DeltaOp::Replace),
            Some(&DeltaValue::Tile(None))
        );
    }

    #[test]
    fn staged_cloud_irrigates_and_checks_ownership() {
        let mut data = single_flower();
        data.clouds.push(Cloud {
            id: CloudId(4),
            tile: None,
        });
        data.players[0].cloud = Some(CloudId(4));
        let state = GameState::from_data(data).expect("state");
        let mut delta = GameStateDelta::new();
        assert_eq!(
            place_cloud(&state, &mut delta, PlayerId(1), CloudId(9), 4),
            Err(Rejection::UnknownCloud)
        );
        place_cloud(&state, &mut delta, PlayerId(1), CloudId(4), 8).expect("placed");
        run(&state, &mut delta);
        assert_eq!(delta.pending_number(&nitrogen(8)), 4.0);
        assert_eq!(delta.pending_number(&nitrogen(4)), 2.0);
    }

    #[test]
    fn irrigation_does_not_push_water_past_level() {
        let mut data = grid(1, 1, 50.0, 6);
        data.rivers.push(River { x: 0, y: 0 });
        let state = GameState::from_data(data).expect("state");
        let mut delta = GameStateDelta::new();
        run(&state, &mut delta);
        assert_eq!(delta.pending_integer(&KeyPath::TileWater { tile: 0 }), 0);
    }
}

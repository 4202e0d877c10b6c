//! Seed placement bookkeeping.
//!
//! Placing a seed spends one unit of inventory through the delta and records
//! a claim in the [`PLACED_SEEDS`] intermediate. At commit time
//! [`PlacementSystem`] turns the claims on each tile into at most one new
//! flower.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::{
    commands::PlacementRejection,
    delta::{DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    systems::evolution,
    world::{Flower, FlowerId, FlowerTypeId, GameState, PlayerId, TileIndex},
};

/// Per-tile seed claims made during the current turn.
pub const PLACED_SEEDS: &str = "placed_seeds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedClaim {
    pub owner: PlayerId,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlacedSeeds {
    tiles: BTreeMap<TileIndex, BTreeMap<FlowerTypeId, SeedClaim>>,
}

impl PlacedSeeds {
    pub fn on_tile(&self, tile: TileIndex) -> Option<&BTreeMap<FlowerTypeId, SeedClaim>> {
        self.tiles.get(&tile)
    }

    pub fn count(&self, tile: TileIndex, seed_type: &FlowerTypeId) -> u32 {
        self.tiles
            .get(&tile)
            .and_then(|claims| claims.get(seed_type))
            .map_or(0, |claim| claim.count)
    }

    /// Seeds of `seed_type` that `player` has put down anywhere this turn.
    pub fn placed_by(&self, player: PlayerId, seed_type: &FlowerTypeId) -> u32 {
        self.tiles
            .values()
            .filter_map(|claims| claims.get(seed_type))
            .filter(|claim| claim.owner == player)
            .map(|claim| claim.count)
            .sum()
    }

    pub fn tiles_claimed_by(&self, player: PlayerId) -> BTreeSet<TileIndex> {
        self.tiles
            .iter()
            .filter(|(_, claims)| claims.values().any(|claim| claim.owner == player))
            .map(|(tile, _)| *tile)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileIndex, &BTreeMap<FlowerTypeId, SeedClaim>)> {
        self.tiles.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    fn add(&mut self, tile: TileIndex, seed_type: FlowerTypeId, owner: PlayerId) {
        let claim = self
            .tiles
            .entry(tile)
            .or_default()
            .entry(seed_type)
            .or_insert(SeedClaim { owner, count: 0 });
        claim.count += 1;
    }

    fn take(&mut self, tile: TileIndex, seed_type: &FlowerTypeId) {
        let Some(claims) = self.tiles.get_mut(&tile) else {
            return;
        };
        if let Some(claim) = claims.get_mut(seed_type) {
            claim.count = claim.count.saturating_sub(1);
            if claim.count == 0 {
                claims.remove(seed_type);
            }
        }
        if claims.is_empty() {
            self.tiles.remove(&tile);
        }
    }
}

/// How a placement treats seeds of another type already on the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Any other seed type on the tile blocks the placement.
    Reject,
    /// Foreign seeds may be contested; only a player's own other types block.
    Contest,
}

/// Inventory of `seed_type` still spendable this turn: stored quantity, minus
/// what has been placed or reserved for evolution.
pub fn available_seeds(state: &GameState, delta: &GameStateDelta, seed_type: &FlowerTypeId) -> i64 {
    let stored = state
        .seed_status(seed_type)
        .map_or(0, |status| i64::from(status.quantity));
    let pending = delta.pending_integer(&KeyPath::SeedQuantity {
        flower_type: seed_type.clone(),
    });
    stored + pending - i64::from(evolution::reserved_seeds(state, delta, seed_type))
}

pub fn placed_seeds(delta: &GameStateDelta) -> Option<&PlacedSeeds> {
    delta.intermediate::<PlacedSeeds>(PLACED_SEEDS)
}

/// Every legality check for one more seed of `seed_type` on `tile`.
pub fn check_placement(
    state: &GameState,
    delta: &GameStateDelta,
    seed_type: &FlowerTypeId,
    tile: TileIndex,
    owner: PlayerId,
    policy: ConflictPolicy,
) -> Result<(), PlacementRejection> {
    if state.flower_type(seed_type).is_none() {
        return Err(PlacementRejection::UnknownSeedType);
    }
    if state.owner_of_type(seed_type) != Some(owner) {
        return Err(PlacementRejection::NotOwner);
    }
    if state.tile(tile).is_none() {
        return Err(PlacementRejection::OutOfBounds);
    }
    if state.flower_at(tile).is_some() {
        return Err(PlacementRejection::BlockedByFlower);
    }
    if state.mountain_at(tile).is_some() {
        return Err(PlacementRejection::BlockedByMountain);
    }
    if !state.has_friendly_neighbor(tile, owner) {
        return Err(PlacementRejection::NoAdjacentFriendlyFlower);
    }
    if available_seeds(state, delta, seed_type) < 1 {
        return Err(PlacementRejection::InsufficientSeeds);
    }
    let claims = placed_seeds(delta).and_then(|placed| placed.on_tile(tile));
    let blocked = claims.is_some_and(|claims| {
        claims.iter().any(|(other, claim)| {
            other != seed_type
                && match policy {
                    ConflictPolicy::Reject => true,
                    ConflictPolicy::Contest => claim.owner == owner,
                }
        })
    });
    if blocked {
        return Err(PlacementRejection::Blocking);
    }
    Ok(())
}

/// Stage one seed on a tile. Returns the inventory left afterwards.
pub fn place_seed(
    state: &GameState,
    delta: &mut GameStateDelta,
    seed_type: &FlowerTypeId,
    tile: TileIndex,
    owner: PlayerId,
    policy: ConflictPolicy,
) -> Result<i64, PlacementRejection> {
    check_placement(state, delta, seed_type, tile, owner, policy)?;
    delta.add_integer(
        KeyPath::SeedQuantity {
            flower_type: seed_type.clone(),
        },
        -1,
    );
    let placed = seed_type.clone();
    delta.add_intermediate_delta::<PlacedSeeds, _>(PLACED_SEEDS, |seeds| {
        seeds.add(tile, placed, owner)
    });
    Ok(available_seeds(state, delta, seed_type))
}

/// Take back one previously staged seed.
pub fn remove_seed(
    state: &GameState,
    delta: &mut GameStateDelta,
    seed_type: &FlowerTypeId,
    tile: TileIndex,
    owner: PlayerId,
) -> Result<i64, PlacementRejection> {
    let claim = placed_seeds(delta)
        .and_then(|placed| placed.on_tile(tile))
        .and_then(|claims| claims.get(seed_type).copied());
    match claim {
        Some(claim) if claim.owner == owner && claim.count > 0 => {}
        _ => return Err(PlacementRejection::NothingToRemove),
    }
    delta.add_integer(
        KeyPath::SeedQuantity {
            flower_type: seed_type.clone(),
        },
        1,
    );
    delta.add_intermediate_delta::<PlacedSeeds, _>(PLACED_SEEDS, |seeds| {
        seeds.take(tile, seed_type)
    });
    Ok(available_seeds(state, delta, seed_type))
}

/// Materialises the turn's seed claims into flowers.
///
/// On each tile the owner with the most seeds wins and plants its most
/// numerous type, with the winning count as the new flower's amount. A tie
/// between owners plants nothing. Seeds that do not become a flower are lost.
pub struct PlacementSystem;

impl PlacementSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlacementSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Winning owner and type on one tile, if any.
pub fn resolve_tile(claims: &BTreeMap<FlowerTypeId, SeedClaim>) -> Option<(PlayerId, FlowerTypeId, u32)> {
    let mut totals: BTreeMap<PlayerId, u32> = BTreeMap::new();
    for claim in claims.values() {
        *totals.entry(claim.owner).or_default() += claim.count;
    }
    let best = totals.values().copied().max()?;
    let mut leaders = totals.iter().filter(|(_, total)| **total == best);
    let (owner, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    let mut chosen: Option<(&FlowerTypeId, u32)> = None;
    for (seed_type, claim) in claims.iter().filter(|(_, claim)| claim.owner == *owner) {
        if chosen.map_or(true, |(_, count)| claim.count > count) {
            chosen = Some((seed_type, claim.count));
        }
    }
    chosen.map(|(seed_type, count)| (*owner, seed_type.clone(), count))
}

impl System for PlacementSystem {
    fn name(&self) -> &str {
        "placement"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        _rng: &mut SeededRandom,
    ) -> Result<()> {
        let Some(placed) = placed_seeds(delta).cloned() else {
            return Ok(());
        };

        let mut next_id = state.next_flower_id();
        let mut planted: BTreeMap<PlayerId, Vec<FlowerId>> = BTreeMap::new();
        let mut contested = 0usize;

        for (tile, claims) in placed.iter() {
            if state.flower_at(*tile).is_some() {
                continue;
            }
            let Some(position) = state.tile(*tile) else {
                continue;
            };
            let Some((owner, type_id, count)) = resolve_tile(claims) else {
                contested += 1;
                continue;
            };
            let id = FlowerId(next_id);
            next_id += 1;
            delta.add_delta(
                KeyPath::Flower { flower: id },
                DeltaValue::Flower(Flower {
                    id,
                    x: position.x,
                    y: position.y,
                    type_id,
                    growth: 0,
                    amount: count,
                }),
                DeltaOp::Replace,
            );
            planted.entry(owner).or_default().push(id);
        }

        let count = next_id - state.next_flower_id();
        if count > 0 {
            delta.add_integer(KeyPath::NextFlowerId, count as i64);
        }
        for (player, ids) in planted {
            delta.add_delta(
                KeyPath::PlayerFlowers { player },
                DeltaValue::FlowerIds(ids),
                DeltaOp::Append,
            );
        }
        debug!(turn = ctx.turn, planted = count, contested, "seeds materialised");
        Ok(())
    }
}

//! Computer-controlled seats.
//!
//! Policies act once at the start of each action phase, writing into the same
//! turn delta human commands use and drawing only from the engine's stream.

use tracing::debug;

use crate::{
    config::Rules,
    delta::GameStateDelta,
    rng::SeededRandom,
    systems::{
        evolution::{self, EvolutionResult},
        placement::{self, ConflictPolicy},
    },
    world::{Controller, FlowerTypeId, GameState, PlayerId, TileIndex},
};

/// Everything a policy may touch during its turn.
pub struct PolicyContext<'a> {
    pub state: &'a GameState,
    pub delta: &'a mut GameStateDelta,
    pub rules: &'a Rules,
    pub rng: &'a mut SeededRandom,
    pub player: PlayerId,
}

/// What a policy did with its turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyReport {
    pub seeds_placed: u32,
    pub evolution: Option<EvolutionResult>,
}

pub trait Policy {
    fn name(&self) -> &str;
    fn act(&mut self, ctx: &mut PolicyContext<'_>) -> PolicyReport;
}

/// Policy driving an AI controller. Humans and empty seats have none.
pub fn policy_for(controller: Controller) -> Option<Box<dyn Policy>> {
    match controller {
        Controller::Grower => Some(Box::new(GrowerPolicy::new())),
        Controller::Contester => Some(Box::new(ContesterPolicy::new())),
        Controller::Passive => Some(Box::new(PassivePolicy)),
        Controller::Human | Controller::None => None,
    }
}

/// Spreads seeds around its own flowers and evolves when inventory piles up.
pub struct GrowerPolicy;

impl GrowerPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GrowerPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for GrowerPolicy {
    fn name(&self) -> &str {
        "grower"
    }

    fn act(&mut self, ctx: &mut PolicyContext<'_>) -> PolicyReport {
        grow(ctx)
    }
}

/// A grower that also piles extra seeds onto tiles it shares with opponents.
pub struct ContesterPolicy;

impl ContesterPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ContesterPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy for ContesterPolicy {
    fn name(&self) -> &str {
        "contester"
    }

    fn act(&mut self, ctx: &mut PolicyContext<'_>) -> PolicyReport {
        let mut report = grow(ctx);
        report.seeds_placed += contest(ctx);
        report
    }
}

pub struct PassivePolicy;

impl Policy for PassivePolicy {
    fn name(&self) -> &str {
        "passive"
    }

    fn act(&mut self, _ctx: &mut PolicyContext<'_>) -> PolicyReport {
        PolicyReport::default()
    }
}

/// Weights for placing versus evolving one seed type.
///
/// Few flowers of a type push toward planting; a large flower count relative
/// to the inventory pushes toward evolving. The seeds weight stays fractional.
pub fn priorities(owned_flowers: usize, seeds_available: i64) -> (i64, f64) {
    let owned = owned_flowers as i64;
    let flowers_priority = (10 - owned).max(1);
    let seeds_priority = (owned as f64 - (seeds_available.max(0) as f64).sqrt()).max(1.0);
    (flowers_priority, seeds_priority)
}

/// Draw in `[0, flowers + seeds]`, with the fractional part of the sum
/// dropped from the upper bound. True means place seeds this turn.
fn prefers_placing(rng: &mut SeededRandom, flowers_priority: i64, seeds_priority: f64) -> bool {
    let ceiling = (flowers_priority as f64 + seeds_priority).floor() as i64;
    rng.next_int(0, ceiling) as f64 > seeds_priority
}

fn grow(ctx: &mut PolicyContext<'_>) -> PolicyReport {
    let mut report = PolicyReport::default();
    let Some(player) = ctx.state.player(ctx.player) else {
        return report;
    };
    let seed_types: Vec<FlowerTypeId> = player.seeds.iter().rev().cloned().collect();
    let type_count = seed_types.len() as i64;

    for seed_type in &seed_types {
        let available = placement::available_seeds(ctx.state, ctx.delta, seed_type);
        if available <= 0 {
            continue;
        }
        let owned = ctx
            .state
            .flowers_of(ctx.player)
            .filter(|flower| flower.type_id == *seed_type)
            .count();
        let (flowers_priority, seeds_priority) = priorities(owned, available);

        if prefers_placing(ctx.rng, flowers_priority, seeds_priority) {
            report.seeds_placed += place_around_flowers(ctx, seed_type);
            let left = placement::available_seeds(ctx.state, ctx.delta, seed_type);
            if left > i64::from(ctx.rules.ai_evolve_threshold) * type_count {
                if let Some(result) = evolve(ctx, seed_type) {
                    report.evolution = Some(result);
                }
            }
        } else if let Some(result) = evolve(ctx, seed_type) {
            report.evolution = Some(result);
        }
    }
    debug!(
        player = %ctx.player,
        placed = report.seeds_placed,
        evolved = report.evolution.is_some(),
        "ai turn"
    );
    report
}

/// One seed on every free, fertile tile next to the player's flowers.
fn place_around_flowers(ctx: &mut PolicyContext<'_>, seed_type: &FlowerTypeId) -> u32 {
    let Some(kind) = ctx.state.flower_type(seed_type) else {
        return 0;
    };
    let claimed = placement::placed_seeds(ctx.delta)
        .map(|placed| placed.tiles_claimed_by(ctx.player))
        .unwrap_or_default();
    let candidates: Vec<TileIndex> = ctx
        .state
        .tiles_around_flowers_of(ctx.player)
        .into_iter()
        .filter(|tile| !claimed.contains(tile))
        .filter(|tile| ctx.state.is_requirements_satisfied(*tile, kind))
        .collect();

    let mut placed = 0;
    for tile in candidates {
        let outcome = placement::place_seed(
            ctx.state,
            ctx.delta,
            seed_type,
            tile,
            ctx.player,
            ConflictPolicy::Reject,
        );
        match outcome {
            Ok(remaining) => {
                placed += 1;
                if remaining <= 0 {
                    break;
                }
            }
            Err(_) => continue,
        }
    }
    placed
}

/// Stage the highest affordable tier, roll it, and pick a choice at random.
fn evolve(ctx: &mut PolicyContext<'_>, seed_type: &FlowerTypeId) -> Option<EvolutionResult> {
    if evolution::result(ctx.delta, ctx.player).is_some() {
        return None;
    }
    let available = placement::available_seeds(ctx.state, ctx.delta, seed_type).max(0);
    let target = ctx
        .rules
        .evolution
        .highest_affordable_stage(u32::try_from(available).unwrap_or(u32::MAX));
    if target == 0 {
        return None;
    }
    for _ in 0..target {
        evolution::stage_seed(ctx.state, ctx.delta, ctx.rules, ctx.player, seed_type).ok()?;
    }
    let result =
        evolution::resolve_evolution(ctx.state, ctx.delta, ctx.rules, ctx.rng, ctx.player).ok()?;
    if !result.choices.is_empty() {
        let pick = ctx.rng.next_index(result.choices.len());
        evolution::select_choice(ctx.state, ctx.delta, ctx.player, pick).ok()?;
    }
    evolution::result(ctx.delta, ctx.player).cloned()
}

/// Second wave onto a random subset of this turn's claims that border an
/// opponent's flower.
fn contest(ctx: &mut PolicyContext<'_>) -> u32 {
    let Some(placed) = placement::placed_seeds(ctx.delta) else {
        return 0;
    };
    let mut contested: Vec<(TileIndex, FlowerTypeId)> = placed
        .iter()
        .filter(|(tile, _)| ctx.state.has_foreign_neighbor(**tile, ctx.player))
        .filter_map(|(tile, claims)| {
            claims
                .iter()
                .find(|(_, claim)| claim.owner == ctx.player)
                .map(|(seed_type, _)| (*tile, seed_type.clone()))
        })
        .collect();
    if contested.is_empty() {
        return 0;
    }

    ctx.rng.shuffle(&mut contested);
    let subset = ctx.rng.next_int(1, contested.len() as i64) as usize;
    let wave = ctx.rng.next_int(1, 3);
    let mut placed_count = 0;
    'tiles: for (tile, seed_type) in contested.into_iter().take(subset) {
        for _ in 0..wave {
            match placement::place_seed(
                ctx.state,
                ctx.delta,
                &seed_type,
                tile,
                ctx.player,
                ConflictPolicy::Contest,
            ) {
                Ok(_) => placed_count += 1,
                Err(_) => continue 'tiles,
            }
        }
    }
    debug!(player = %ctx.player, placed = placed_count, "contest wave");
    placed_count
}

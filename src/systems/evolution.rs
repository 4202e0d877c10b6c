//! Seed evolution: stage seeds in tiers, roll an outcome, pick a new flower type.
//!
//! Staging and results are turn-scoped intermediates. Nothing reaches the
//! persisted delta until an outcome spends seeds or a choice is selected.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    commands::EvolutionRejection,
    config::{EvolutionRules, Rules},
    delta::{DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    rng::SeededRandom,
    systems::placement,
    world::{FlowerType, FlowerTypeId, GameState, Nutrient, PlayerId, SeedStatus},
};

/// Seeds staged for evolution this turn, per player.
pub const EVOLUTION_STAGING: &str = "evolution_staging";
/// Outcomes rolled this turn, per player.
pub const EVOLUTION_RESULTS: &str = "evolution_results";

const ADJECTIVES: [&str; 10] = [
    "Hardy", "Vivid", "Wild", "Golden", "Dusky", "Bright", "Sturdy", "Lush", "Creeping", "Velvet",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedEvolution {
    pub flower_type: FlowerTypeId,
    pub stage: usize,
    /// Seeds the stage costs.
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionOutcome {
    Success,
    SuccessPlus,
    SuccessPlus2,
    SuccessPlus3,
    Failure,
}

impl EvolutionOutcome {
    /// Strength of a success, 1-4. Failure is 0.
    pub fn tier(self) -> u32 {
        match self {
            EvolutionOutcome::Failure => 0,
            EvolutionOutcome::Success => 1,
            EvolutionOutcome::SuccessPlus => 2,
            EvolutionOutcome::SuccessPlus2 => 3,
            EvolutionOutcome::SuccessPlus3 => 4,
        }
    }

    pub fn is_success(self) -> bool {
        self != EvolutionOutcome::Failure
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trait {
    TurnsUntilGrown,
    TurnsUntilDead,
    SeedProductionRate,
    Tenacity,
    SoilConsumption,
    GrowthRate,
    NutrientTolerance,
}

impl Trait {
    pub const ALL: [Trait; 7] = [
        Trait::TurnsUntilGrown,
        Trait::TurnsUntilDead,
        Trait::SeedProductionRate,
        Trait::Tenacity,
        Trait::SoilConsumption,
        Trait::GrowthRate,
        Trait::NutrientTolerance,
    ];

    /// Improve `kind` along this trait by `tier` steps.
    fn apply(self, kind: &mut FlowerType, tier: u32, rules: &Rules) {
        let steps = f64::from(tier);
        match self {
            Trait::TurnsUntilGrown => {
                kind.turns_until_grown = kind.turns_until_grown.saturating_sub(tier).max(1)
            }
            Trait::TurnsUntilDead => kind.turns_until_dead += tier,
            Trait::SeedProductionRate => kind.seed_production_rate += 5 * tier,
            Trait::Tenacity => kind.tenacity = (kind.tenacity + 5 * tier).min(100),
            Trait::SoilConsumption => {
                kind.soil_consumption_rate = (kind.soil_consumption_rate - 0.25 * steps).max(0.0)
            }
            Trait::GrowthRate => kind.growth_rate += tier,
            Trait::NutrientTolerance => {
                for nutrient in Nutrient::ALL {
                    let range = kind.requirement_mut(nutrient);
                    range.min = (range.min - 2.5 * steps).max(rules.soil_min);
                    range.max = (range.max + 2.5 * steps).min(rules.soil_max);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionChoice {
    pub base_type: FlowerTypeId,
    pub traits: Vec<Trait>,
    /// Candidate catalog entry. Its id is assigned when the choice is selected.
    pub flower_type: FlowerType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvolutionResult {
    pub player: PlayerId,
    pub base_type: FlowerTypeId,
    pub stage: usize,
    pub spent: u32,
    pub outcome: EvolutionOutcome,
    pub choices: Vec<EvolutionChoice>,
    pub selected: Option<usize>,
}

impl EvolutionResult {
    fn awaits_choice(&self) -> bool {
        self.outcome.is_success() && self.selected.is_none()
    }
}

type Staging = BTreeMap<PlayerId, StagedEvolution>;
type Results = BTreeMap<PlayerId, EvolutionResult>;

pub fn staged(delta: &GameStateDelta, player: PlayerId) -> Option<&StagedEvolution> {
    delta
        .intermediate::<Staging>(EVOLUTION_STAGING)
        .and_then(|staging| staging.get(&player))
}

pub fn result(delta: &GameStateDelta, player: PlayerId) -> Option<&EvolutionResult> {
    delta
        .intermediate::<Results>(EVOLUTION_RESULTS)
        .and_then(|results| results.get(&player))
}

/// Seeds of `seed_type` held back by staging or by a success awaiting a choice.
pub fn reserved_seeds(state: &GameState, delta: &GameStateDelta, seed_type: &FlowerTypeId) -> u32 {
    let Some(owner) = state.owner_of_type(seed_type) else {
        return 0;
    };
    let staged_amount = staged(delta, owner)
        .filter(|stage| stage.flower_type == *seed_type)
        .map_or(0, |stage| stage.amount);
    let awaiting = result(delta, owner)
        .filter(|result| result.awaits_choice() && result.base_type == *seed_type)
        .map_or(0, |result| result.spent);
    staged_amount + awaiting
}

/// Outcome for a draw in `[0, 99]` at `stage`.
///
/// Tiers are checked from the strongest down, each claiming the next slice of
/// the draw range. When two tables overlap at a stage the stronger tier wins
/// the lower draws; whatever is left over is a failure.
pub fn outcome_for_draw(evolution: &EvolutionRules, stage: usize, draw: i64) -> EvolutionOutcome {
    let tiers = [
        (EvolutionOutcome::SuccessPlus3, &evolution.success_plus3),
        (EvolutionOutcome::SuccessPlus2, &evolution.success_plus2),
        (EvolutionOutcome::SuccessPlus, &evolution.success_plus),
        (EvolutionOutcome::Success, &evolution.success),
    ];
    let mut ceiling = 0i64;
    for (outcome, table) in tiers {
        ceiling += i64::from(table.get(stage).copied().unwrap_or(0));
        if draw < ceiling {
            return outcome;
        }
    }
    EvolutionOutcome::Failure
}

pub fn roll_outcome(evolution: &EvolutionRules, stage: usize, rng: &mut SeededRandom) -> EvolutionOutcome {
    outcome_for_draw(evolution, stage, rng.next_int(0, 99))
}

/// Raise `player`'s staged amount of `seed_type` by one tier.
pub fn stage_seed(
    state: &GameState,
    delta: &mut GameStateDelta,
    rules: &Rules,
    player: PlayerId,
    seed_type: &FlowerTypeId,
) -> Result<StagedEvolution, EvolutionRejection> {
    if state.flower_type(seed_type).is_none() {
        return Err(EvolutionRejection::UnknownSeedType);
    }
    if state.owner_of_type(seed_type) != Some(player) {
        return Err(EvolutionRejection::NotOwner);
    }
    if result(delta, player).is_some() {
        return Err(EvolutionRejection::AlreadyResolved);
    }
    let current = match staged(delta, player) {
        Some(stage) if stage.flower_type != *seed_type => {
            return Err(EvolutionRejection::DifferentTypeStaged)
        }
        Some(stage) => stage.stage,
        None => 0,
    };
    let next = current + 1;
    if next > rules.evolution.max_stage() {
        return Err(EvolutionRejection::AtHighestStage);
    }
    // The seeds already staged are available to the next tier.
    let free = placement::available_seeds(state, delta, seed_type)
        + i64::from(rules.evolution.amount_at(current));
    if i64::from(rules.evolution.amount_at(next)) > free {
        return Err(EvolutionRejection::InsufficientSeeds);
    }

    let staged = StagedEvolution {
        flower_type: seed_type.clone(),
        stage: next,
        amount: rules.evolution.amount_at(next),
    };
    let stored = staged.clone();
    delta.add_intermediate_delta::<Staging, _>(EVOLUTION_STAGING, |staging| {
        staging.insert(player, stored);
    });
    debug!(player = %player, seed_type = %seed_type, stage = next, "seed staged for evolution");
    Ok(staged)
}

pub fn unstage_seed(delta: &mut GameStateDelta, player: PlayerId) -> Result<(), EvolutionRejection> {
    if staged(delta, player).is_none() {
        return Err(EvolutionRejection::NothingStaged);
    }
    delta.add_intermediate_delta::<Staging, _>(EVOLUTION_STAGING, |staging| {
        staging.remove(&player);
    });
    Ok(())
}

/// Roll the outcome for whatever `player` has staged.
pub fn resolve_evolution(
    state: &GameState,
    delta: &mut GameStateDelta,
    rules: &Rules,
    rng: &mut SeededRandom,
    player: PlayerId,
) -> Result<EvolutionResult, EvolutionRejection> {
    if result(delta, player).is_some() {
        return Err(EvolutionRejection::AlreadyResolved);
    }
    let stage = staged(delta, player)
        .ok_or(EvolutionRejection::NothingStaged)?
        .stage;
    let outcome = roll_outcome(&rules.evolution, stage, rng);
    resolve_with_draw(state, delta, rules, rng, player, outcome)
}

/// Resolve the staged evolution with a predetermined outcome. Choice
/// generation still draws from `rng`.
pub fn resolve_with_draw(
    state: &GameState,
    delta: &mut GameStateDelta,
    rules: &Rules,
    rng: &mut SeededRandom,
    player: PlayerId,
    outcome: EvolutionOutcome,
) -> Result<EvolutionResult, EvolutionRejection> {
    if result(delta, player).is_some() {
        return Err(EvolutionRejection::AlreadyResolved);
    }
    let staged = staged(delta, player)
        .cloned()
        .ok_or(EvolutionRejection::NothingStaged)?;
    let base = state
        .flower_type(&staged.flower_type)
        .ok_or(EvolutionRejection::UnknownSeedType)?;
    let spent = staged.amount;

    let choices = if outcome.is_success() {
        generate_choices(base, outcome.tier(), rules, rng)
    } else {
        delta.add_integer(
            KeyPath::SeedQuantity {
                flower_type: staged.flower_type.clone(),
            },
            -i64::from(spent),
        );
        Vec::new()
    };

    let result = EvolutionResult {
        player,
        base_type: staged.flower_type.clone(),
        stage: staged.stage,
        spent,
        outcome,
        choices,
        selected: None,
    };
    let stored = result.clone();
    delta.add_intermediate_delta::<Staging, _>(EVOLUTION_STAGING, |staging| {
        staging.remove(&player);
    });
    delta.add_intermediate_delta::<Results, _>(EVOLUTION_RESULTS, |results| {
        results.insert(player, stored);
    });
    info!(
        player = %player,
        base_type = %result.base_type,
        stage = result.stage,
        outcome = ?result.outcome,
        "evolution resolved"
    );
    Ok(result)
}

/// Candidate types cloned from `base`. Tiers 1-2 change one trait, tiers 3-4
/// change two; every change is `tier` steps strong.
pub fn generate_choices(
    base: &FlowerType,
    tier: u32,
    rules: &Rules,
    rng: &mut SeededRandom,
) -> Vec<EvolutionChoice> {
    let trait_count = if tier >= 3 { 2 } else { 1 };
    (0..rules.evolution.choice_count)
        .map(|_| {
            let mut pool = Trait::ALL;
            rng.shuffle(&mut pool);
            let mut traits: Vec<Trait> = pool[..trait_count].to_vec();
            traits.sort();
            let mut kind = base.clone();
            for stat in &traits {
                stat.apply(&mut kind, tier, rules);
            }
            let adjective = ADJECTIVES[rng.next_index(ADJECTIVES.len())];
            kind.name = format!("{adjective} {}", base.name);
            EvolutionChoice {
                base_type: base.id.clone(),
                traits,
                flower_type: kind,
            }
        })
        .collect()
}

/// Next free catalog id: one past the largest numeric id, skipping ids
/// already handed out this turn.
fn next_type_id(state: &GameState, delta: &GameStateDelta) -> FlowerTypeId {
    let highest = state
        .flower_types()
        .filter_map(|kind| kind.id.0.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    let issued = delta
        .intermediate::<Results>(EVOLUTION_RESULTS)
        .map_or(0, |results| {
            results.values().filter(|r| r.selected.is_some()).count() as u64
        });
    FlowerTypeId((highest + 1 + issued).to_string())
}

/// Turn a pending success into a catalog entry owned by `player`.
pub fn select_choice(
    state: &GameState,
    delta: &mut GameStateDelta,
    player: PlayerId,
    index: usize,
) -> Result<FlowerType, EvolutionRejection> {
    let pending = result(delta, player)
        .filter(|result| result.awaits_choice())
        .ok_or(EvolutionRejection::NoPendingChoices)?;
    let choice = pending
        .choices
        .get(index)
        .ok_or(EvolutionRejection::ChoiceOutOfRange)?;
    let spent = pending.spent;
    let base_type = pending.base_type.clone();

    let mut kind = choice.flower_type.clone();
    kind.id = next_type_id(state, delta);

    delta.add_delta(
        KeyPath::FlowerType {
            flower_type: kind.id.clone(),
        },
        DeltaValue::FlowerType(kind.clone()),
        DeltaOp::Replace,
    );
    delta.add_delta(
        KeyPath::SeedStatus {
            flower_type: kind.id.clone(),
        },
        DeltaValue::SeedStatus(SeedStatus {
            type_id: kind.id.clone(),
            quantity: 1,
            progress: 0,
        }),
        DeltaOp::Replace,
    );
    delta.add_delta(
        KeyPath::PlayerSeeds { player },
        DeltaValue::TypeIds(vec![kind.id.clone()]),
        DeltaOp::Append,
    );
    delta.add_integer(
        KeyPath::SeedQuantity {
            flower_type: base_type,
        },
        -i64::from(spent),
    );
    delta.add_intermediate_delta::<Results, _>(EVOLUTION_RESULTS, |results| {
        if let Some(result) = results.get_mut(&player) {
            result.selected = Some(index);
        }
    });
    info!(player = %player, new_type = %kind.id, name = %kind.name, "evolution choice selected");
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::apply_deltas;
    use crate::world::fixtures::*;

    fn stocked(quantity: u32) -> GameState {
        let mut data = single_flower();
        data.seed_status[0].quantity = quantity;
        GameState::from_data(data).expect("state")
    }

    fn stage_to(state: &GameState, delta: &mut GameStateDelta, rules: &Rules, stage: usize) {
        for _ in 0..stage {
            stage_seed(state, delta, rules, PlayerId(1), &"1".into()).expect("stage");
        }
    }

    #[test]
    fn draw_sweep_reaches_only_the_intended_tiers() {
        let evolution = EvolutionRules::default();
        let sweep = |stage: usize| -> BTreeMap<EvolutionOutcome, usize> {
            let mut seen = BTreeMap::new();
            for draw in 0..100 {
                *seen.entry(outcome_for_draw(&evolution, stage, draw)).or_default() += 1;
            }
            seen
        };
        let expected: [&[(EvolutionOutcome, usize)]; 7] = [
            &[(EvolutionOutcome::Failure, 100)],
            &[(EvolutionOutcome::Success, 50), (EvolutionOutcome::Failure, 50)],
            &[(EvolutionOutcome::SuccessPlus, 60), (EvolutionOutcome::Failure, 40)],
            &[(EvolutionOutcome::SuccessPlus2, 70), (EvolutionOutcome::Failure, 30)],
            &[(EvolutionOutcome::SuccessPlus2, 75), (EvolutionOutcome::Failure, 25)],
            &[(EvolutionOutcome::SuccessPlus3, 80), (EvolutionOutcome::Failure, 20)],
            &[(EvolutionOutcome::SuccessPlus3, 90), (EvolutionOutcome::Failure, 10)],
        ];
        for (stage, tiers) in expected.iter().enumerate() {
            let seen = sweep(stage);
            assert_eq!(seen.len(), tiers.len(), "stage {stage}");
            for (outcome, count) in tiers.iter() {
                assert_eq!(seen.get(outcome), Some(count), "stage {stage} {outcome:?}");
            }
        }
    }

    #[test]
    fn overlapping_tables_favour_the_stronger_tier() {
        let mut evolution = EvolutionRules::default();
        evolution.success[2] = 30;
        assert_eq!(outcome_for_draw(&evolution, 2, 59), EvolutionOutcome::SuccessPlus);
        assert_eq!(outcome_for_draw(&evolution, 2, 60), EvolutionOutcome::Success);
        assert_eq!(outcome_for_draw(&evolution, 2, 89), EvolutionOutcome::Success);
        assert_eq!(outcome_for_draw(&evolution, 2, 90), EvolutionOutcome::Failure);
    }

    #[test]
    fn staging_walks_tiers_and_reserves_seeds() {
        let state = stocked(25);
        let rules = Rules::default();
        let mut delta = GameStateDelta::new();
        stage_to(&state, &mut delta, &rules, 2);
        assert_eq!(staged(&delta, PlayerId(1)).map(|s| s.stage), Some(2));
        assert_eq!(placement::available_seeds(&state, &delta, &"1".into()), 5);
        assert_eq!(
            stage_seed(&state, &mut delta, &rules, PlayerId(1), &"1".into()),
            Err(EvolutionRejection::InsufficientSeeds)
        );
        unstage_seed(&mut delta, PlayerId(1)).expect("unstage");
        assert_eq!(placement::available_seeds(&state, &delta, &"1".into()), 25);
        assert_eq!(unstage_seed(&mut delta, PlayerId(1)), Err(EvolutionRejection::NothingStaged));
    }

    #[test]
    fn staging_rejects_foreign_and_unknown_types() {
        let state = stocked(25);
        let rules = Rules::default();
        let mut delta = GameStateDelta::new();
        assert_eq!(
            stage_seed(&state, &mut delta, &rules, PlayerId(2), &"1".into()),
            Err(EvolutionRejection::NotOwner)
        );
        assert_eq!(
            stage_seed(&state, &mut delta, &rules, PlayerId(1), &"7".into()),
            Err(EvolutionRejection::UnknownSeedType)
        );
    }

    #[test]
    fn failure_spends_the_staged_seeds() {
        let state = stocked(25);
        let rules = Rules::default();
        let mut delta = GameStateDelta::new();
        let mut rng = SeededRandom::new(5);
        stage_to(&state, &mut delta, &rules, 1);
        let result =
            resolve_with_draw(&state, &mut delta, &rules, &mut rng, PlayerId(1), EvolutionOutcome::Failure)
                .expect("resolve");
        assert!(result.choices.is_empty());
        assert_eq!(
            delta.pending_integer(&KeyPath::SeedQuantity { flower_type: "1".into() }),
            -10
        );
        assert_eq!(
            resolve_evolution(&state, &mut delta, &rules, &mut rng, PlayerId(1)),
            Err(EvolutionRejection::AlreadyResolved)
        );
        assert_eq!(
            select_choice(&state, &mut delta, PlayerId(1), 0),
            Err(EvolutionRejection::NoPendingChoices)
        );
    }

    #[test]
    fn success_plus_at_stage_two_offers_choices_from_the_staged_type() {
        let state = stocked(25);
        let rules = Rules::default();
        let mut delta = GameStateDelta::new();
        let mut rng = SeededRandom::new(11);
        stage_to(&state, &mut delta, &rules, 2);
        let outcome = outcome_for_draw(&rules.evolution, 2, 59);
        assert_eq!(outcome, EvolutionOutcome::SuccessPlus);
        let result = resolve_with_draw(&state, &mut delta, &rules, &mut rng, PlayerId(1), outcome)
            .expect("resolve");
        assert_eq!(result.choices.len(), 3);
        assert!(result.choices.iter().all(|c| c.base_type == FlowerTypeId::from("1")));
        assert!(result.choices.iter().all(|c| c.traits.len() == 1));
        assert_eq!(result.spent, 20);
        assert_eq!(placement::available_seeds(&state, &delta, &"1".into()), 5);

        assert_eq!(
            select_choice(&state, &mut delta, PlayerId(1), 3),
            Err(EvolutionRejection::ChoiceOutOfRange)
        );
        let created = select_choice(&state, &mut delta, PlayerId(1), 1).expect("select");
        assert_eq!(created.id, FlowerTypeId::from("2"));

        let next = apply_deltas(state, &delta).expect("apply");
        assert_eq!(next.flower_type(&created.id), Some(&created));
        assert_eq!(next.seed_status(&created.id).map(|s| s.quantity), Some(1));
        assert_eq!(next.seed_status(&"1".into()).map(|s| s.quantity), Some(5));
        assert_eq!(next.owner_of_type(&created.id), Some(PlayerId(1)));
    }

    #[test]
    fn stronger_tiers_change_two_traits() {
        let rules = Rules::default();
        let mut rng = SeededRandom::new(2);
        let base = flower_type("1");
        let choices = generate_choices(&base, 4, &rules, &mut rng);
        assert!(choices.iter().all(|c| c.traits.len() == 2));
        assert!(choices.iter().all(|c| c.flower_type.name.ends_with("Type 1")));
        assert!(choices.iter().all(|c| c.flower_type != base));
    }
}

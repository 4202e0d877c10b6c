use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    config::Rules,
    delta::{DeltaAnomaly, DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    engine::{System, SystemContext},
    rng::SeededRandom,
    world::{Flower, FlowerType, GameState, Nutrient, PlayerId, TENACITY_AUGMENTATION},
};

/// Survival chance (0-100) of a starving flower this turn.
///
/// Young flowers are penalised for every turn they are short of maturity; a
/// flower that has starved through its whole death window never survives.
pub fn survival_chance(rules: &Rules, flower: &Flower, kind: &FlowerType, bonus: i64) -> i64 {
    let death_window = kind.turns_until_grown + kind.turns_until_dead;
    if flower.growth >= death_window {
        return 0;
    }
    let immaturity = i64::from(kind.turns_until_grown.saturating_sub(flower.growth));
    let chance =
        i64::from(kind.tenacity) + bonus - i64::from(rules.juvenile_death_penalty) * immaturity;
    chance.clamp(0, 100)
}

/// Nourished flowers grow, mature ones produce seeds, starving ones roll for
/// survival. Every flower eats from its tile either way.
pub struct GrowthSystem;

impl GrowthSystem {
    pub fn new() -> Self {
        Self
    }

    fn tenacity_bonus(state: &GameState, delta: &mut GameStateDelta, flower: &Flower) -> i64 {
        let mut bonus = 0;
        for augmentation in state.augmentations(flower.id) {
            if augmentation.kind == TENACITY_AUGMENTATION {
                bonus += augmentation.value;
            } else {
                warn!(flower = %flower.id, kind = %augmentation.kind, "unknown augmentation kind");
                delta.record_anomaly(DeltaAnomaly::UnknownAugmentation {
                    flower: flower.id,
                    kind: augmentation.kind.clone(),
                });
            }
        }
        bonus
    }
}

impl Default for GrowthSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for GrowthSystem {
    fn name(&self) -> &str {
        "growth"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        state: &GameState,
        delta: &mut GameStateDelta,
        rng: &mut SeededRandom,
    ) -> Result<()> {
        let mut deaths: BTreeMap<PlayerId, Vec<usize>> = BTreeMap::new();
        let mut died = 0usize;

        for flower in state.flowers() {
            let Some(kind) = state.flower_type(&flower.type_id) else {
                continue;
            };
            let Some(tile) = state.index_of(flower.x as i64, flower.y as i64) else {
                continue;
            };

            for nutrient in Nutrient::ALL {
                delta.add_number(
                    KeyPath::TileNutrient { tile, nutrient },
                    -kind.soil_consumption_rate,
                );
            }

            if state.is_requirements_satisfied(tile, kind) {
                if flower.growth < kind.turns_until_grown {
                    delta.add_integer(KeyPath::FlowerGrowth { flower: flower.id }, 1);
                } else if state.seed_status(&kind.id).is_some() {
                    delta.add_integer(
                        KeyPath::SeedProgress {
                            flower_type: kind.id.clone(),
                        },
                        i64::from(kind.seed_production_rate),
                    );
                }
                if kind.growth_rate > 0 {
                    delta.add_integer(
                        KeyPath::FlowerAmount { flower: flower.id },
                        i64::from(kind.growth_rate),
                    );
                }
                continue;
            }

            let bonus = Self::tenacity_bonus(state, delta, flower);
            let survival = survival_chance(ctx.rules, flower, kind, bonus);
            let dies = survival == 0 || rng.next_int(0, 99) >= survival;
            if !dies {
                delta.add_integer(KeyPath::FlowerGrowth { flower: flower.id }, 1);
                continue;
            }

            died += 1;
            delta.add_delta(
                KeyPath::Flower { flower: flower.id },
                DeltaValue::Empty,
                DeltaOp::Delete,
            );
            if !state.augmentations(flower.id).is_empty() {
                delta.add_delta(
                    KeyPath::Augmentations { flower: flower.id },
                    DeltaValue::Empty,
                    DeltaOp::Delete,
                );
            }
            if let Some(owner) = state.owner_of(flower.id) {
                let position = state
                    .player(owner)
                    .and_then(|player| player.flowers.iter().position(|id| *id == flower.id));
                if let Some(position) = position {
                    deaths.entry(owner).or_default().push(position);
                }
            }
        }

        for (player, indices) in deaths {
            delta.add_delta(
                KeyPath::PlayerFlowers { player },
                DeltaValue::Indices(indices),
                DeltaOp::Remove,
            );
        }
        debug!(turn = ctx.turn, died, "growth resolved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::apply_deltas;
    use crate::world::fixtures::*;
    use crate::world::{FlowerAugmentation, FlowerId, FlowerTypeId};

    fn run(state: &GameState, seed: u64) -> GameStateDelta {
        let rules = Rules::default();
        let ctx = SystemContext { turn: 0, rules: &rules };
        let mut delta = GameStateDelta::new();
        let mut rng = SeededRandom::new(seed);
        GrowthSystem::new()
            .run(&ctx, state, &mut delta, &mut rng)
            .expect("run");
        delta
    }

    #[test]
    fn nourished_young_flower_grows_and_eats() {
        let state = GameState::from_data(single_flower()).expect("state");
        let delta = run(&state, 1);
        assert_eq!(delta.pending_integer(&KeyPath::FlowerGrowth { flower: FlowerId(0) }), 1);
        assert_eq!(
            delta.pending_integer(&KeyPath::SeedProgress { flower_type: "1".into() }),
            0
        );
        assert_eq!(
            delta.pending_number(&KeyPath::TileNutrient {
                tile: 0,
                nutrient: Nutrient::Potassium
            }),
            -1.0
        );
    }

    #[test]
    fn mature_flower_produces_instead_of_growing() {
        let mut data = single_flower();
        data.flowers[0].growth = 2;
        let state = GameState::from_data(data).expect("state");
        let delta = run(&state, 1);
        assert_eq!(delta.pending_integer(&KeyPath::FlowerGrowth { flower: FlowerId(0) }), 0);
        assert_eq!(
            delta.pending_integer(&KeyPath::SeedProgress { flower_type: "1".into() }),
            25
        );
    }

    #[test]
    fn starved_past_death_window_always_dies() {
        let mut data = single_flower();
        data.tiles[0].soil = soil(5.0);
        data.flowers[0].growth = 5;
        let state = GameState::from_data(data).expect("state");
        let delta = run(&state, 9);
        let next = apply_deltas(state, &delta).expect("apply");
        assert!(next.flower(FlowerId(0)).is_none());
        assert!(next.player(PlayerId(1)).expect("player").flowers.is_empty());
    }

    #[test]
    fn full_tenacity_flower_survives_starvation() {
        let mut data = single_flower();
        data.tiles[0].soil = soil(5.0);
        data.flower_types[0].tenacity = 100;
        data.flowers[0].growth = 2;
        let state = GameState::from_data(data).expect("state");
        for seed in 0..20 {
            let delta = run(&state, seed);
            assert_eq!(
                delta.pending_integer(&KeyPath::FlowerGrowth { flower: FlowerId(0) }),
                1
            );
            assert!(delta.get(&KeyPath::Flower { flower: FlowerId(0) }, DeltaOp::Delete).is_none());
        }
    }

    #[test]
    fn survival_penalises_immaturity_and_counts_boosts() {
        let rules = Rules::default();
        let kind = flower_type("1");
        let mut young = flower(0, 0, 0, "1");
        assert_eq!(survival_chance(&rules, &young, &kind, 0), 40);
        assert_eq!(survival_chance(&rules, &young, &kind, 70), 100);
        young.growth = 5;
        assert_eq!(survival_chance(&rules, &young, &kind, 70), 0);
    }

    #[test]
    fn unknown_augmentation_is_flagged() {
        let mut data = single_flower();
        data.tiles[0].soil = soil(5.0);
        data.augmentations.insert(
            FlowerId(0),
            vec![FlowerAugmentation {
                kind: "sparkle".into(),
                value: 3,
                turns_remaining: 2,
            }],
        );
        let state = GameState::from_data(data).expect("state");
        let delta = run(&state, 4);
        assert_eq!(
            delta.anomalies(),
            &[DeltaAnomaly::UnknownAugmentation {
                flower: FlowerId(0),
                kind: "sparkle".into()
            }]
        );
    }

    #[test]
    fn flower_without_seed_status_still_grows() {
        let mut data = single_flower();
        data.seed_status.clear();
        data.flowers[0].growth = 2;
        let state = GameState::from_data(data).expect("state");
        let delta = run(&state, 1);
        let next = apply_deltas(state, &delta).expect("apply");
        assert!(next.seed_status(&FlowerTypeId::from("1")).is_none());
    }
}

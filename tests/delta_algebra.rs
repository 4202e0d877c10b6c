//! Applying a delta and then its inverse restores the original state.

use proptest::prelude::*;

use seedling::{
    delta::{apply_deltas, DeltaOp, DeltaValue, GameStateDelta, KeyPath},
    error::DeltaError,
    scenario::ScenarioLoader,
    world::{FlowerAugmentation, FlowerId, GameState, Nutrient, PlayerId},
};

fn baseline() -> GameState {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("scenarios/tiny_plot.yaml")
        .expect("tiny plot scenario")
        .build_state()
        .expect("state")
}

fn nutrient_strategy() -> impl Strategy<Value = Nutrient> {
    prop_oneof![
        Just(Nutrient::Nitrogen),
        Just(Nutrient::Phosphorous),
        Just(Nutrient::Potassium),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn add_then_subtract_restores(
        adds in proptest::collection::vec((0usize..9, nutrient_strategy(), -40i32..40, -4i64..4), 1..16)
    ) {
        let original = baseline();
        let mut forward = GameStateDelta::new();
        let mut inverse = GameStateDelta::new();
        for (tile, nutrient, amount, water) in &adds {
            let amount = f64::from(*amount);
            forward.add_number(KeyPath::TileNutrient { tile: *tile, nutrient: *nutrient }, amount);
            inverse.add_number(KeyPath::TileNutrient { tile: *tile, nutrient: *nutrient }, -amount);
            forward.add_integer(KeyPath::TileWater { tile: *tile }, *water);
            inverse.add_integer(KeyPath::TileWater { tile: *tile }, -*water);
        }
        prop_assert!(forward.len() <= adds.len() * 2);

        let changed = apply_deltas(original.clone(), &forward).expect("forward");
        let restored = apply_deltas(changed, &inverse).expect("inverse");
        prop_assert_eq!(restored, original);
    }

    #[test]
    fn append_then_remove_restores(
        extra in proptest::collection::vec((0i64..20, 1u32..5), 1..6)
    ) {
        let original = baseline();
        let flower = FlowerId(0);
        let appended: Vec<_> = extra
            .iter()
            .map(|(value, turns)| FlowerAugmentation {
                kind: "tenacity".into(),
                value: *value,
                turns_remaining: *turns,
            })
            .collect();

        let mut forward = GameStateDelta::new();
        forward.add_delta(
            KeyPath::Augmentations { flower },
            DeltaValue::Augmentations(appended.clone()),
            DeltaOp::Append,
        );
        let changed = apply_deltas(original.clone(), &forward).expect("forward");
        prop_assert_eq!(changed.augmentations(flower), appended.as_slice());

        let mut inverse = GameStateDelta::new();
        inverse.add_delta(
            KeyPath::Augmentations { flower },
            DeltaValue::Indices((0..appended.len()).collect()),
            DeltaOp::Remove,
        );
        let restored = apply_deltas(changed, &inverse).expect("inverse");
        prop_assert_eq!(restored, original);
    }
}

#[test]
fn delete_then_reinsert_restores() {
    let original = baseline();
    let flower = original.flower(FlowerId(0)).cloned().expect("flower");
    let owner = PlayerId(1);

    let mut forward = GameStateDelta::new();
    forward.add_delta(
        KeyPath::Flower { flower: flower.id },
        DeltaValue::Empty,
        DeltaOp::Delete,
    );
    forward.add_delta(
        KeyPath::PlayerFlowers { player: owner },
        DeltaValue::Indices(vec![0]),
        DeltaOp::Remove,
    );
    let changed = apply_deltas(original.clone(), &forward).expect("forward");
    assert!(changed.flower_at(0).is_none());
    assert_eq!(changed.owner_of(flower.id), None);

    let mut inverse = GameStateDelta::new();
    inverse.add_delta(
        KeyPath::Flower { flower: flower.id },
        DeltaValue::Flower(flower.clone()),
        DeltaOp::Replace,
    );
    inverse.add_delta(
        KeyPath::PlayerFlowers { player: owner },
        DeltaValue::FlowerIds(vec![flower.id]),
        DeltaOp::Append,
    );
    let restored = apply_deltas(changed, &inverse).expect("inverse");
    assert_eq!(restored, original);
}

#[test]
fn delete_leaving_a_dangling_owner_reference_is_fatal() {
    let original = baseline();
    let mut delta = GameStateDelta::new();
    delta.add_delta(
        KeyPath::Flower {
            flower: FlowerId(0),
        },
        DeltaValue::Empty,
        DeltaOp::Delete,
    );
    assert!(apply_deltas(original, &delta).is_err());
}

#[test]
fn add_against_a_missing_flower_is_fatal() {
    let mut delta = GameStateDelta::new();
    delta.add_integer(
        KeyPath::FlowerGrowth {
            flower: FlowerId(42),
        },
        1,
    );
    assert!(matches!(
        apply_deltas(baseline(), &delta),
        Err(DeltaError::MissingKey { .. })
    ));
}

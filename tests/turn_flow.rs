use seedling::{
    commands::PlacementRejection,
    engine::{Engine, EngineBuilder, EngineEvent, EngineSettings},
    error::EngineError,
    scenario::ScenarioLoader,
    turn::TurnPhase,
    world::{FlowerId, FlowerTypeId, GameStateData, PlayerId, SeedStatus},
    Command, CommandOutcome, Rejection,
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn tiny_plot() -> GameStateData {
    let scenario = scenario_loader()
        .load("scenarios/tiny_plot.yaml")
        .expect("tiny plot scenario");
    scenario.build_state().expect("state").to_data()
}

fn build_engine() -> Engine {
    EngineBuilder::new(EngineSettings::new("tiny_plot", Default::default()))
        .with_default_systems()
        .build()
}

fn started(data: GameStateData) -> Engine {
    let mut engine = build_engine();
    engine.load_data(data).expect("load");
    engine.start().expect("start");
    engine
}

const HUMAN: PlayerId = PlayerId(1);

#[test]
fn single_flower_grows_then_produces_seeds() {
    let mut engine = started(tiny_plot());

    for expected in 1..=3 {
        let outcome = engine
            .execute(Command::EndTurn { player: HUMAN })
            .expect("end turn");
        assert_eq!(outcome, CommandOutcome::TurnAdvanced { turn: expected });
        let state = engine.state().expect("state");
        let flower = state.flower(FlowerId(0)).expect("flower");
        let status = state.seed_status(&"1".into()).expect("seeds");
        match expected {
            1 => assert_eq!((flower.growth, status.progress), (1, 0)),
            2 => assert_eq!((flower.growth, status.progress), (2, 0)),
            _ => assert_eq!((flower.growth, status.progress), (2, 25)),
        }
        assert_eq!(flower.amount, 1 + expected as u32);
    }

    let state = engine.state().expect("state");
    let home = state.tile(0).expect("tile");
    assert_eq!(home.soil.nitrogen, 47.0);
    assert_eq!(home.water, 2);
    assert_eq!(state.turn(), 3);
    assert_eq!(engine.phase(), TurnPhase::Action);
}

#[test]
fn second_seed_type_on_a_staged_tile_is_blocked() {
    let mut data = tiny_plot();
    let mut second = data.flower_types[0].clone();
    second.id = FlowerTypeId::from("2");
    second.name = "Poppy".into();
    data.flower_types.push(second);
    data.seed_status.push(SeedStatus {
        type_id: "2".into(),
        quantity: 5,
        progress: 0,
    });
    data.players[0].seeds.push("2".into());
    let mut engine = started(data);

    let first = engine
        .execute(Command::PlaceSeed {
            seed_type: "1".into(),
            tile: 1,
            owner: HUMAN,
        })
        .expect("place");
    assert_eq!(first, CommandOutcome::SeedPlaced { remaining: 4 });

    let blocked = engine
        .execute(Command::PlaceSeed {
            seed_type: "2".into(),
            tile: 1,
            owner: HUMAN,
        })
        .expect("place");
    assert_eq!(
        blocked.rejection(),
        Some(Rejection::Placement(PlacementRejection::Blocking))
    );

    engine
        .execute(Command::EndTurn { player: HUMAN })
        .expect("end turn");
    let state = engine.state().expect("state");
    let planted = state.flower_at(1).expect("planted flower");
    assert_eq!(planted.type_id, FlowerTypeId::from("1"));
    assert_eq!(state.seed_status(&"1".into()).map(|s| s.quantity), Some(4));
    assert_eq!(state.seed_status(&"2".into()).map(|s| s.quantity), Some(5));
    assert!(state
        .player(HUMAN)
        .expect("player")
        .flowers
        .contains(&planted.id));
}

#[test]
fn seed_placed_away_from_friendly_flowers_is_rejected() {
    let mut engine = started(tiny_plot());
    let outcome = engine
        .execute(Command::PlaceSeed {
            seed_type: "1".into(),
            tile: 8,
            owner: HUMAN,
        })
        .expect("place");
    assert_eq!(
        outcome.rejection(),
        Some(Rejection::Placement(
            PlacementRejection::NoAdjacentFriendlyFlower
        ))
    );
    assert!(engine.delta().is_empty());
}

#[test]
fn engine_without_baseline_refuses_work() {
    let mut engine = build_engine();
    assert!(matches!(
        engine.execute(Command::EndTurn { player: HUMAN }),
        Err(EngineError::NoBaseline)
    ));
    assert!(matches!(engine.start(), Err(EngineError::NoBaseline)));
    assert!(matches!(
        engine.advance_turn(),
        Err(EngineError::NoBaseline)
    ));
}

#[test]
fn commands_before_start_are_rejected_with_the_phase() {
    let mut engine = build_engine();
    engine.load_data(tiny_plot()).expect("load");
    let outcome = engine
        .execute(Command::EndTurn { player: HUMAN })
        .expect("execute");
    assert_eq!(
        outcome.rejection(),
        Some(Rejection::WrongPhase(TurnPhase::Init))
    );
}

#[test]
fn a_turn_walks_every_phase_in_order() {
    let mut engine = build_engine();
    engine.load_data(tiny_plot()).expect("load");
    let mut events = engine.subscribe();
    engine.start().expect("start");
    engine
        .execute(Command::EndTurn { player: HUMAN })
        .expect("end turn");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::PhaseChanged { to, .. } => seen.push(format!("{to:?}")),
            EngineEvent::TurnCommitted { turn, .. } => seen.push(format!("Committed({turn})")),
            EngineEvent::EvolutionResolved(_) => {}
        }
    }
    assert_eq!(
        seen,
        vec![
            "Action",
            "ActionResolution",
            "ApplyingDeltas",
            "Committed(1)",
            "ResettingActions",
            "Action",
        ]
    );
}

#[test]
fn ended_seat_cannot_act_until_the_next_turn() {
    let mut data = tiny_plot();
    let mut second = data.players[0].clone();
    second.id = PlayerId(2);
    second.flowers.clear();
    second.seeds.clear();
    data.players.push(second);
    let mut engine = started(data);

    let outcome = engine
        .execute(Command::EndTurn { player: HUMAN })
        .expect("end turn");
    assert_eq!(outcome, CommandOutcome::TurnEnded { awaiting: 1 });
    let again = engine
        .execute(Command::PlaceSeed {
            seed_type: "1".into(),
            tile: 1,
            owner: HUMAN,
        })
        .expect("place");
    assert_eq!(again.rejection(), Some(Rejection::NotYourTurn));
    assert!(matches!(
        engine.advance_turn(),
        Err(EngineError::AwaitingPlayers { awaiting: 1 })
    ));

    let outcome = engine
        .execute(Command::EndTurn {
            player: PlayerId(2),
        })
        .expect("end turn");
    assert_eq!(outcome, CommandOutcome::TurnAdvanced { turn: 1 });
    assert_eq!(engine.awaiting(), vec![HUMAN, PlayerId(2)]);
}

#[test]
fn opponent_seed_of_another_type_blocks_the_tile() {
    let mut data = tiny_plot();
    let mut rival_type = data.flower_types[0].clone();
    rival_type.id = FlowerTypeId::from("2");
    rival_type.name = "Thistle".into();
    data.flower_types.push(rival_type);
    data.seed_status.push(SeedStatus {
        type_id: "2".into(),
        quantity: 5,
        progress: 0,
    });
    let mut rival_flower = data.flowers[0].clone();
    rival_flower.id = FlowerId(1);
    rival_flower.x = 2;
    rival_flower.type_id = "2".into();
    data.flowers.push(rival_flower);
    let mut rival = data.players[0].clone();
    rival.id = PlayerId(2);
    rival.flowers = vec![FlowerId(1)];
    rival.seeds = vec!["2".into()];
    data.players.push(rival);
    let mut engine = started(data);

    let rival_seed = engine
        .execute(Command::PlaceSeed {
            seed_type: "2".into(),
            tile: 1,
            owner: PlayerId(2),
        })
        .expect("place");
    assert!(!rival_seed.is_rejected());

    for _ in 0..2 {
        let outcome = engine
            .execute(Command::PlaceSeed {
                seed_type: "1".into(),
                tile: 1,
                owner: HUMAN,
            })
            .expect("place");
        assert_eq!(
            outcome.rejection(),
            Some(Rejection::Placement(PlacementRejection::Blocking))
        );
    }
    assert_eq!(
        seedling::systems::placement::available_seeds(
            &engine.state().expect("state"),
            engine.delta(),
            &"1".into()
        ),
        5
    );
}

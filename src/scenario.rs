use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
    config::{LoggingConfig, Rules, SaveConfig},
    rng::SeededRandom,
    world::{
        Cloud, CloudId, Controller, Flower, FlowerId, FlowerType, FlowerTypeId, GameState,
        GameStateData, Mountain, Player, PlayerId, Requirement, River, SeedStatus, Soil, TileData,
    },
};

const FLOWER_NAMES: [&str; 8] = [
    "Daisy", "Poppy", "Clover", "Bluebell", "Marigold", "Yarrow", "Thistle", "Primrose",
];

fn default_turns() -> u64 {
    20
}

fn default_water() -> i64 {
    5
}

fn default_starting_seeds() -> u32 {
    10
}

fn default_fertile_min() -> i64 {
    35
}

fn default_fertile_max() -> i64 {
    65
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_turns")]
    pub turns: u64,
    #[serde(default)]
    pub rules: Rules,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub saves: SaveConfig,
    #[serde(default)]
    pub state: Option<GameStateData>,
    #[serde(default)]
    pub generate: Option<GenerateConfig>,
}

/// Parameters for a procedurally generated map.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateConfig {
    pub width: usize,
    pub height: usize,
    pub seed: String,
    pub players: Vec<GeneratedPlayer>,
    #[serde(default)]
    pub rivers: usize,
    #[serde(default)]
    pub mountains: usize,
    #[serde(default = "default_water")]
    pub water: i64,
    #[serde(default = "default_starting_seeds")]
    pub starting_seeds: u32,
    #[serde(default = "default_fertile_min")]
    pub fertile_min: i64,
    #[serde(default = "default_fertile_max")]
    pub fertile_max: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratedPlayer {
    pub id: u32,
    pub controller: Controller,
    /// Starting flower type; a balanced default is used when omitted.
    #[serde(default)]
    pub flower_type: Option<FlowerType>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .rules
            .validate()
            .with_context(|| format!("Invalid rules in {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Initial state: the explicit snapshot when present, otherwise generated.
    pub fn build_state(&self) -> Result<GameState> {
        let data = match (&self.state, &self.generate) {
            (Some(state), _) => state.clone(),
            (None, Some(generate)) => generate_state(generate)?,
            (None, None) => bail!("scenario '{}' has neither state nor generate", self.name),
        };
        GameState::from_data(data)
            .with_context(|| format!("Scenario '{}' has an inconsistent state", self.name))
    }

    pub fn turns(&self, override_turns: Option<u64>) -> u64 {
        override_turns.unwrap_or(self.turns)
    }
}

fn default_flower_type(id: FlowerTypeId, name: &str) -> FlowerType {
    let range = Requirement {
        min: 20.0,
        max: 80.0,
    };
    FlowerType {
        id,
        name: name.to_string(),
        growth_rate: 1,
        soil_consumption_rate: 1.0,
        seed_production_rate: 25,
        nitrogen: range,
        phosphorous: range,
        potassium: range,
        tenacity: 60,
        turns_until_grown: 3,
        turns_until_dead: 3,
    }
}

/// Build a map from `config`. The same config always yields the same map.
pub fn generate_state(config: &GenerateConfig) -> Result<GameStateData> {
    let tile_count = config.width * config.height;
    let features = config.players.len() + config.rivers + config.mountains;
    if tile_count == 0 {
        bail!("generated map must have at least one tile");
    }
    if features > tile_count {
        bail!("{features} features do not fit on a {}x{} map", config.width, config.height);
    }
    if config.fertile_min > config.fertile_max {
        bail!("fertile band {}..{} is empty", config.fertile_min, config.fertile_max);
    }

    let mut rng = SeededRandom::from_seed_str(&config.seed);
    let tiles = (0..tile_count)
        .map(|_| {
            let mut draw = || rng.next_int(config.fertile_min, config.fertile_max) as f64;
            TileData {
                soil: Soil {
                    nitrogen: draw(),
                    phosphorous: draw(),
                    potassium: draw(),
                },
                water: config.water,
            }
        })
        .collect();

    let mut free: Vec<usize> = (0..tile_count).collect();
    rng.shuffle(&mut free);
    let mut free = free.into_iter();
    let mut next_tile = || free.next().context("ran out of free tiles");
    let position = |index: usize| (index % config.width, index / config.width);

    let mut flowers = Vec::new();
    let mut flower_types = Vec::new();
    let mut seed_status = Vec::new();
    let mut players = Vec::new();
    let mut clouds = Vec::new();
    for (slot, seat) in config.players.iter().enumerate() {
        let type_id = FlowerTypeId((slot + 1).to_string());
        let mut kind = seat.flower_type.clone().unwrap_or_else(|| {
            default_flower_type(type_id.clone(), FLOWER_NAMES[slot % FLOWER_NAMES.len()])
        });
        kind.id = type_id.clone();
        let (x, y) = position(next_tile()?);
        let flower_id = FlowerId(slot as u64);
        flowers.push(Flower {
            id: flower_id,
            x,
            y,
            type_id: type_id.clone(),
            growth: kind.turns_until_grown,
            amount: 1,
        });
        seed_status.push(SeedStatus {
            type_id: type_id.clone(),
            quantity: config.starting_seeds,
            progress: 0,
        });
        flower_types.push(kind);
        let cloud = CloudId(seat.id);
        clouds.push(Cloud {
            id: cloud,
            tile: None,
        });
        players.push(Player {
            id: PlayerId(seat.id),
            controller: seat.controller,
            flowers: vec![flower_id],
            seeds: vec![type_id],
            cloud: Some(cloud),
            auto_replant: BTreeMap::new(),
        });
    }

    let mut rivers = Vec::with_capacity(config.rivers);
    for _ in 0..config.rivers {
        let (x, y) = position(next_tile()?);
        rivers.push(River { x, y });
    }
    let mut mountains = Vec::with_capacity(config.mountains);
    for _ in 0..config.mountains {
        let (x, y) = position(next_tile()?);
        mountains.push(Mountain { x, y });
    }

    Ok(GameStateData {
        width: config.width,
        height: config.height,
        tiles,
        flowers,
        mountains,
        rivers,
        clouds,
        flower_types,
        seed_status,
        players,
        augmentations: BTreeMap::new(),
        turn: 0,
        next_flower_id: None,
        random_seed: config.seed.clone(),
        random_state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerateConfig {
        GenerateConfig {
            width: 6,
            height: 5,
            seed: "meadow".into(),
            players: vec![
                GeneratedPlayer {
                    id: 1,
                    controller: Controller::Human,
                    flower_type: None,
                },
                GeneratedPlayer {
                    id: 2,
                    controller: Controller::Grower,
                    flower_type: None,
                },
            ],
            rivers: 2,
            mountains: 3,
            water: 5,
            starting_seeds: 10,
            fertile_min: 35,
            fertile_max: 65,
        }
    }

    #[test]
    fn generation_is_reproducible() {
        let first = generate_state(&config()).expect("first");
        let second = generate_state(&config()).expect("second");
        assert_eq!(first, second);
        let mut other = config();
        other.seed = "heath".into();
        assert_ne!(generate_state(&other).expect("other").tiles, first.tiles);
    }

    #[test]
    fn generated_state_is_consistent() {
        let data = generate_state(&config()).expect("generate");
        assert!(data
            .tiles
            .iter()
            .all(|tile| (35.0..=65.0).contains(&tile.soil.nitrogen)));
        let state = GameState::from_data(data).expect("state");
        assert_eq!(state.flowers().count(), 2);
        assert_eq!(state.rivers().len(), 2);
        assert_eq!(state.mountains().len(), 3);
        assert_eq!(state.owner_of_type(&"2".into()), Some(PlayerId(2)));
        assert_eq!(state.player(PlayerId(1)).and_then(|p| p.cloud), Some(CloudId(1)));
    }

    #[test]
    fn overcrowded_map_is_refused() {
        let mut crowded = config();
        crowded.width = 2;
        crowded.height = 2;
        assert!(generate_state(&crowded).is_err());
    }

    #[test]
    fn scenario_yaml_with_inline_state_parses() {
        let yaml = r#"
name: inline
turns: 3
rules:
  degradation: 10
state:
  width: 1
  height: 1
  random_seed: abc
  tiles:
    - { nitrogen: 50, phosphorous: 50, potassium: 50, water: 5 }
"#;
        let scenario: Scenario = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(scenario.rules.degradation, 10.0);
        assert_eq!(scenario.rules.water_ceiling, 10);
        assert_eq!(scenario.saves.retention, 10);
        let state = scenario.build_state().expect("state");
        assert_eq!(state.tiles().len(), 1);
        assert_eq!(scenario.turns(None), 3);
        assert_eq!(scenario.turns(Some(7)), 7);
    }
}

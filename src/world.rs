use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Rules;
use crate::error::StateError;
use crate::rng::{RandomState, SeededRandom};

/// Row-major position of a tile in the grid.
pub type TileIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowerId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowerTypeId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CloudId(pub u32);

impl fmt::Display for FlowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FlowerTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CloudId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowerTypeId {
    fn from(value: &str) -> Self {
        FlowerTypeId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Nitrogen,
    Phosphorous,
    Potassium,
}

impl Nutrient {
    pub const ALL: [Nutrient; 3] = [
        Nutrient::Nitrogen,
        Nutrient::Phosphorous,
        Nutrient::Potassium,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Soil {
    pub nitrogen: f64,
    pub phosphorous: f64,
    pub potassium: f64,
}

impl Soil {
    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Nitrogen => self.nitrogen,
            Nutrient::Phosphorous => self.phosphorous,
            Nutrient::Potassium => self.potassium,
        }
    }

    pub fn get_mut(&mut self, nutrient: Nutrient) -> &mut f64 {
        match nutrient {
            Nutrient::Nitrogen => &mut self.nitrogen,
            Nutrient::Phosphorous => &mut self.phosphorous,
            Nutrient::Potassium => &mut self.potassium,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub index: TileIndex,
    pub x: usize,
    pub y: usize,
    pub soil: Soil,
    pub water: i64,
}

/// Soil and water of one tile in a flat snapshot; position comes from array order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileData {
    #[serde(flatten)]
    pub soil: Soil,
    pub water: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flower {
    pub id: FlowerId,
    pub x: usize,
    pub y: usize,
    pub type_id: FlowerTypeId,
    pub growth: u32,
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub min: f64,
    pub max: f64,
}

impl Requirement {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowerType {
    pub id: FlowerTypeId,
    pub name: String,
    pub growth_rate: u32,
    pub soil_consumption_rate: f64,
    pub seed_production_rate: u32,
    pub nitrogen: Requirement,
    pub phosphorous: Requirement,
    pub potassium: Requirement,
    /// Base chance (0-100) that a starving flower survives a turn.
    pub tenacity: u32,
    pub turns_until_grown: u32,
    pub turns_until_dead: u32,
}

impl FlowerType {
    pub fn requirement(&self, nutrient: Nutrient) -> &Requirement {
        match nutrient {
            Nutrient::Nitrogen => &self.nitrogen,
            Nutrient::Phosphorous => &self.phosphorous,
            Nutrient::Potassium => &self.potassium,
        }
    }

    pub fn requirement_mut(&mut self, nutrient: Nutrient) -> &mut Requirement {
        match nutrient {
            Nutrient::Nitrogen => &mut self.nitrogen,
            Nutrient::Phosphorous => &mut self.phosphorous,
            Nutrient::Potassium => &mut self.potassium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedStatus {
    pub type_id: FlowerTypeId,
    pub quantity: u32,
    /// Progress toward the next seed, 0-99 between turns.
    pub progress: u32,
}

/// Who makes decisions for a seat at the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Human,
    /// AI that spreads seeds next to its own flowers and evolves when it can.
    Grower,
    /// Grower that also floods tiles bordering opponent flowers.
    Contester,
    /// AI that never acts.
    Passive,
    None,
}

impl Controller {
    pub fn is_ai(self) -> bool {
        matches!(
            self,
            Controller::Grower | Controller::Contester | Controller::Passive
        )
    }

    /// Seats that must signal end-of-turn before the world advances.
    pub fn takes_turns(self) -> bool {
        !matches!(self, Controller::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub controller: Controller,
    #[serde(default)]
    pub flowers: Vec<FlowerId>,
    #[serde(default)]
    pub seeds: Vec<FlowerTypeId>,
    #[serde(default)]
    pub cloud: Option<CloudId>,
    #[serde(default)]
    pub auto_replant: BTreeMap<TileIndex, FlowerTypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mountain {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct River {
    pub x: usize,
    pub y: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloud {
    pub id: CloudId,
    #[serde(default)]
    pub tile: Option<TileIndex>,
}

/// Augmentation kinds the growth calculator understands.
pub const TENACITY_AUGMENTATION: &str = "tenacity";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowerAugmentation {
    pub kind: String,
    pub value: i64,
    pub turns_remaining: u32,
}

/// Flat snapshot used for loading, saving and scenario files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateData {
    pub width: usize,
    pub height: usize,
    pub tiles: Vec<TileData>,
    #[serde(default)]
    pub flowers: Vec<Flower>,
    #[serde(default)]
    pub mountains: Vec<Mountain>,
    #[serde(default)]
    pub rivers: Vec<River>,
    #[serde(default)]
    pub clouds: Vec<Cloud>,
    #[serde(default)]
    pub flower_types: Vec<FlowerType>,
    #[serde(default)]
    pub seed_status: Vec<SeedStatus>,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub augmentations: BTreeMap<FlowerId, Vec<FlowerAugmentation>>,
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub next_flower_id: Option<u64>,
    pub random_seed: String,
    #[serde(default)]
    pub random_state: Option<RandomState>,
}

/// Tile lookups derived from the entity collections. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
struct Lookup {
    flower_at: HashMap<TileIndex, FlowerId>,
    river_at: HashMap<TileIndex, usize>,
    mountain_at: HashMap<TileIndex, usize>,
    flower_owner: HashMap<FlowerId, PlayerId>,
    type_owner: HashMap<FlowerTypeId, PlayerId>,
}

/// Immutable world snapshot for one turn. New instances come from
/// [`GameState::from_data`] or from committing a delta onto a clone.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    width: usize,
    height: usize,
    pub(crate) tiles: Vec<Tile>,
    pub(crate) flowers: BTreeMap<FlowerId, Flower>,
    pub(crate) flower_types: BTreeMap<FlowerTypeId, FlowerType>,
    pub(crate) seed_status: BTreeMap<FlowerTypeId, SeedStatus>,
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) mountains: Vec<Mountain>,
    pub(crate) rivers: Vec<River>,
    pub(crate) clouds: BTreeMap<CloudId, Cloud>,
    pub(crate) augmentations: BTreeMap<FlowerId, Vec<FlowerAugmentation>>,
    pub(crate) turn: u64,
    pub(crate) next_flower_id: u64,
    random_seed: String,
    pub(crate) random_state: RandomState,
    lookup: Lookup,
}

impl GameState {
    pub fn from_data(data: GameStateData) -> Result<Self, StateError> {
        let GameStateData {
            width,
            height,
            tiles,
            flowers,
            mountains,
            rivers,
            clouds,
            flower_types,
            seed_status,
            players,
            augmentations,
            turn,
            next_flower_id,
            random_seed,
            random_state,
        } = data;

        if tiles.len() != width * height {
            return Err(StateError::TileCountMismatch {
                width,
                height,
                actual: tiles.len(),
            });
        }
        let tiles = tiles
            .into_iter()
            .enumerate()
            .map(|(index, tile)| Tile {
                index,
                x: index % width,
                y: index / width,
                soil: tile.soil,
                water: tile.water,
            })
            .collect();
        let next_flower_id = next_flower_id.unwrap_or_else(|| {
            flowers.iter().map(|f| f.id.0 + 1).max().unwrap_or(0)
        });
        let random_state = random_state
            .unwrap_or_else(|| SeededRandom::from_seed_str(&random_seed).state());

        let mut state = Self {
            width,
            height,
            tiles,
            flowers: flowers.into_iter().map(|f| (f.id, f)).collect(),
            flower_types: flower_types
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
            seed_status: seed_status
                .into_iter()
                .map(|s| (s.type_id.clone(), s))
                .collect(),
            players: players.into_iter().map(|p| (p.id, p)).collect(),
            mountains,
            rivers,
            clouds: clouds.into_iter().map(|c| (c.id, c)).collect(),
            augmentations,
            turn,
            next_flower_id,
            random_seed,
            random_state,
            lookup: Lookup::default(),
        };
        state.reindex()?;
        Ok(state)
    }

    pub fn to_data(&self) -> GameStateData {
        GameStateData {
            width: self.width,
            height: self.height,
            tiles: self
                .tiles
                .iter()
                .map(|tile| TileData {
                    soil: tile.soil,
                    water: tile.water,
                })
                .collect(),
            flowers: self.flowers.values().cloned().collect(),
            mountains: self.mountains.clone(),
            rivers: self.rivers.clone(),
            clouds: self.clouds.values().copied().collect(),
            flower_types: self.flower_types.values().cloned().collect(),
            seed_status: self.seed_status.values().cloned().collect(),
            players: self.players.values().cloned().collect(),
            augmentations: self.augmentations.clone(),
            turn: self.turn,
            next_flower_id: Some(self.next_flower_id),
            random_seed: self.random_seed.clone(),
            random_state: Some(self.random_state),
        }
    }

    /// Rebuild tile lookups and check referential integrity. Two flowers on
    /// one tile is fatal.
    pub(crate) fn reindex(&mut self) -> Result<(), StateError> {
        let mut lookup = Lookup::default();

        for flower in self.flowers.values() {
            let tile = self.checked_index("flower", flower.x, flower.y)?;
            if !self.flower_types.contains_key(&flower.type_id) {
                return Err(StateError::UnknownFlowerType {
                    flower: flower.id,
                    flower_type: flower.type_id.clone(),
                });
            }
            if let Some(first) = lookup.flower_at.insert(tile, flower.id) {
                return Err(StateError::DuplicateFlower {
                    tile,
                    first,
                    second: flower.id,
                });
            }
        }
        for (position, river) in self.rivers.iter().enumerate() {
            let tile = self.checked_index("river", river.x, river.y)?;
            lookup.river_at.insert(tile, position);
        }
        for (position, mountain) in self.mountains.iter().enumerate() {
            let tile = self.checked_index("mountain", mountain.x, mountain.y)?;
            lookup.mountain_at.insert(tile, position);
        }
        for cloud in self.clouds.values() {
            if let Some(tile) = cloud.tile {
                if tile >= self.tiles.len() {
                    return Err(StateError::CloudOutOfBounds {
                        cloud: cloud.id,
                        tile,
                    });
                }
            }
        }
        for player in self.players.values() {
            for flower in &player.flowers {
                if !self.flowers.contains_key(flower) {
                    return Err(StateError::UnknownFlower {
                        player: player.id,
                        flower: *flower,
                    });
                }
                lookup.flower_owner.insert(*flower, player.id);
            }
            for seed in player.seeds.iter().chain(player.auto_replant.values()) {
                if !self.flower_types.contains_key(seed) {
                    return Err(StateError::UnknownSeedType {
                        player: player.id,
                        flower_type: seed.clone(),
                    });
                }
            }
            for seed in &player.seeds {
                lookup.type_owner.insert(seed.clone(), player.id);
            }
            if let Some(cloud) = player.cloud {
                if !self.clouds.contains_key(&cloud) {
                    return Err(StateError::UnknownCloud {
                        player: player.id,
                        cloud,
                    });
                }
            }
        }

        self.lookup = lookup;
        Ok(())
    }

    /// Clamp soil and water into range and convert full seed progress into
    /// seeds. Runs once after every commit.
    pub(crate) fn settle(&mut self, rules: &Rules) {
        for tile in &mut self.tiles {
            for nutrient in Nutrient::ALL {
                let value = tile.soil.get_mut(nutrient);
                *value = value.clamp(rules.soil_min, rules.soil_max);
            }
            tile.water = tile.water.clamp(0, rules.water_ceiling);
        }
        let threshold = rules.seed_progress_threshold.max(1);
        for status in self.seed_status.values_mut() {
            status.quantity += status.progress / threshold;
            status.progress %= threshold;
        }
    }

    fn checked_index(&self, entity: &'static str, x: usize, y: usize) -> Result<TileIndex, StateError> {
        self.index_of(x as i64, y as i64)
            .ok_or(StateError::OutOfBounds {
                entity,
                x: x as i64,
                y: y as i64,
            })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn random_state(&self) -> RandomState {
        self.random_state
    }

    pub fn random_seed(&self) -> &str {
        &self.random_seed
    }

    pub fn next_flower_id(&self) -> u64 {
        self.next_flower_id
    }

    pub fn index_of(&self, x: i64, y: i64) -> Option<TileIndex> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, index: TileIndex) -> Option<&Tile> {
        self.tiles.get(index)
    }

    /// Tile at a coordinate, or `None` when the coordinate is off the grid.
    pub fn tile_at(&self, x: i64, y: i64) -> Option<&Tile> {
        self.index_of(x, y).and_then(|index| self.tiles.get(index))
    }

    /// Up to eight neighbours (orthogonal and diagonal), clipped to the grid.
    pub fn tiles_adjacent(&self, x: i64, y: i64) -> Vec<&Tile> {
        let mut adjacent = Vec::with_capacity(8);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if let Some(tile) = self.tile_at(x + dx, y + dy) {
                    adjacent.push(tile);
                }
            }
        }
        adjacent
    }

    pub fn adjacent_indices(&self, index: TileIndex) -> Vec<TileIndex> {
        match self.tiles.get(index) {
            Some(tile) => self
                .tiles_adjacent(tile.x as i64, tile.y as i64)
                .into_iter()
                .map(|t| t.index)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn flowers(&self) -> impl Iterator<Item = &Flower> {
        self.flowers.values()
    }

    pub fn flower(&self, id: FlowerId) -> Option<&Flower> {
        self.flowers.get(&id)
    }

    pub fn flower_at(&self, index: TileIndex) -> Option<&Flower> {
        self.lookup
            .flower_at
            .get(&index)
            .and_then(|id| self.flowers.get(id))
    }

    pub fn river_at(&self, index: TileIndex) -> Option<&River> {
        self.lookup
            .river_at
            .get(&index)
            .and_then(|position| self.rivers.get(*position))
    }

    pub fn mountain_at(&self, index: TileIndex) -> Option<&Mountain> {
        self.lookup
            .mountain_at
            .get(&index)
            .and_then(|position| self.mountains.get(*position))
    }

    pub fn rivers(&self) -> &[River] {
        &self.rivers
    }

    pub fn mountains(&self) -> &[Mountain] {
        &self.mountains
    }

    pub fn flower_types(&self) -> impl Iterator<Item = &FlowerType> {
        self.flower_types.values()
    }

    pub fn flower_type(&self, id: &FlowerTypeId) -> Option<&FlowerType> {
        self.flower_types.get(id)
    }

    pub fn seed_status(&self, id: &FlowerTypeId) -> Option<&SeedStatus> {
        self.seed_status.get(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn clouds(&self) -> impl Iterator<Item = &Cloud> {
        self.clouds.values()
    }

    pub fn cloud(&self, id: CloudId) -> Option<&Cloud> {
        self.clouds.get(&id)
    }

    pub fn augmentations(&self, flower: FlowerId) -> &[FlowerAugmentation] {
        self.augmentations
            .get(&flower)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn augmented_flowers(&self) -> impl Iterator<Item = (&FlowerId, &Vec<FlowerAugmentation>)> {
        self.augmentations.iter()
    }

    pub fn owner_of(&self, flower: FlowerId) -> Option<PlayerId> {
        self.lookup.flower_owner.get(&flower).copied()
    }

    pub fn owner_of_type(&self, flower_type: &FlowerTypeId) -> Option<PlayerId> {
        self.lookup.type_owner.get(flower_type).copied()
    }

    pub fn flowers_of(&self, player: PlayerId) -> impl Iterator<Item = &Flower> {
        self.players
            .get(&player)
            .into_iter()
            .flat_map(|p| p.flowers.iter())
            .filter_map(|id| self.flowers.get(id))
    }

    /// True when any neighbour of `index` holds a flower owned by `player`.
    pub fn has_friendly_neighbor(&self, index: TileIndex, player: PlayerId) -> bool {
        self.adjacent_indices(index).into_iter().any(|neighbor| {
            self.lookup
                .flower_at
                .get(&neighbor)
                .is_some_and(|flower| self.owner_of(*flower) == Some(player))
        })
    }

    /// True when a neighbour of `index` holds a flower owned by anyone but `player`.
    pub fn has_foreign_neighbor(&self, index: TileIndex, player: PlayerId) -> bool {
        self.adjacent_indices(index).into_iter().any(|neighbor| {
            self.lookup.flower_at.get(&neighbor).is_some_and(|flower| {
                matches!(self.owner_of(*flower), Some(owner) if owner != player)
            })
        })
    }

    /// Deduplicated neighbours of every flower `player` owns, in tile order.
    pub fn tiles_around_flowers_of(&self, player: PlayerId) -> BTreeSet<TileIndex> {
        let mut tiles = BTreeSet::new();
        for flower in self.flowers_of(player) {
            for tile in self.tiles_adjacent(flower.x as i64, flower.y as i64) {
                tiles.insert(tile.index);
            }
        }
        tiles
    }

    pub fn is_requirements_satisfied(&self, index: TileIndex, flower_type: &FlowerType) -> bool {
        self.tiles
            .get(index)
            .is_some_and(|tile| is_requirements_satisfied(&tile.soil, flower_type))
    }
}

/// All three nutrients fall inside the type's min/max ranges.
pub fn is_requirements_satisfied(soil: &Soil, flower_type: &FlowerType) -> bool {
    Nutrient::ALL
        .iter()
        .all(|nutrient| flower_type.requirement(*nutrient).contains(soil.get(*nutrient)))
}

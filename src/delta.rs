//! Keyed patch algebra over [`GameState`].
//!
//! A [`GameStateDelta`] is an ordered list of `(path, op, value)` entries plus a
//! bag of turn-scoped intermediate accumulators. Calculators and commands only
//! ever write into a delta; [`apply_deltas`] is the single place that turns a
//! delta into a new state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::error::DeltaError;
use crate::world::{
    CloudId, Flower, FlowerAugmentation, FlowerId, FlowerType, FlowerTypeId, GameState, Nutrient,
    PlayerId, SeedStatus, TileIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeltaOp {
    /// Numeric accumulate into an existing scalar.
    Add,
    /// Set, creating the key when absent.
    Replace,
    Delete,
    /// Concatenate onto a sequence.
    Append,
    /// Drop sequence elements at the given indices.
    Remove,
}

/// Address of one value inside the typed state tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPath {
    TileNutrient { tile: TileIndex, nutrient: Nutrient },
    TileWater { tile: TileIndex },
    Flower { flower: FlowerId },
    FlowerGrowth { flower: FlowerId },
    FlowerAmount { flower: FlowerId },
    FlowerType { flower_type: FlowerTypeId },
    SeedStatus { flower_type: FlowerTypeId },
    SeedQuantity { flower_type: FlowerTypeId },
    SeedProgress { flower_type: FlowerTypeId },
    PlayerFlowers { player: PlayerId },
    PlayerSeeds { player: PlayerId },
    AutoReplant { player: PlayerId, tile: TileIndex },
    CloudTile { cloud: CloudId },
    Augmentations { flower: FlowerId },
    AugmentationTurns { flower: FlowerId, index: usize },
    NextFlowerId,
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::TileNutrient { tile, nutrient } => {
                write!(f, "tiles[{tile}].soil.{nutrient:?}")
            }
            KeyPath::TileWater { tile } => write!(f, "tiles[{tile}].water"),
            KeyPath::Flower { flower } => write!(f, "flowers[{flower}]"),
            KeyPath::FlowerGrowth { flower } => write!(f, "flowers[{flower}].growth"),
            KeyPath::FlowerAmount { flower } => write!(f, "flowers[{flower}].amount"),
            KeyPath::FlowerType { flower_type } => write!(f, "flower_types[{flower_type}]"),
            KeyPath::SeedStatus { flower_type } => write!(f, "seed_status[{flower_type}]"),
            KeyPath::SeedQuantity { flower_type } => {
                write!(f, "seed_status[{flower_type}].quantity")
            }
            KeyPath::SeedProgress { flower_type } => {
                write!(f, "seed_status[{flower_type}].progress")
            }
            KeyPath::PlayerFlowers { player } => write!(f, "players[{player}].flowers"),
            KeyPath::PlayerSeeds { player } => write!(f, "players[{player}].seeds"),
            KeyPath::AutoReplant { player, tile } => {
                write!(f, "players[{player}].auto_replant[{tile}]")
            }
            KeyPath::CloudTile { cloud } => write!(f, "clouds[{cloud}].tile"),
            KeyPath::Augmentations { flower } => write!(f, "augmentations[{flower}]"),
            KeyPath::AugmentationTurns { flower, index } => {
                write!(f, "augmentations[{flower}][{index}].turns_remaining")
            }
            KeyPath::NextFlowerId => write!(f, "next_flower_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeltaValue {
    Number(f64),
    Integer(i64),
    Flower(Flower),
    FlowerType(FlowerType),
    SeedStatus(SeedStatus),
    FlowerIds(Vec<FlowerId>),
    TypeIds(Vec<FlowerTypeId>),
    TypeId(FlowerTypeId),
    Augmentations(Vec<FlowerAugmentation>),
    Tile(Option<TileIndex>),
    Indices(Vec<usize>),
    Empty,
}

impl DeltaValue {
    /// Fold another `Add` value into this one. Returns false on a kind mismatch.
    fn accumulate(&mut self, other: &DeltaValue) -> bool {
        match (self, other) {
            (DeltaValue::Number(total), DeltaValue::Number(more)) => {
                *total += more;
                true
            }
            (DeltaValue::Integer(total), DeltaValue::Integer(more)) => {
                *total += more;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaEntry {
    pub path: KeyPath,
    pub op: DeltaOp,
    pub value: DeltaValue,
}

/// Caller bugs that do not stop a turn but are surfaced for tests and logs.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaAnomaly {
    DuplicateRegistration { path: KeyPath, op: DeltaOp },
    AddKindMismatch { path: KeyPath },
    IntermediateKindMismatch { key: &'static str },
    UnknownAugmentation { flower: FlowerId, kind: String },
}

#[derive(Default)]
pub struct GameStateDelta {
    entries: Vec<DeltaEntry>,
    positions: HashMap<(KeyPath, DeltaOp), usize>,
    intermediates: HashMap<&'static str, Box<dyn Any + Send>>,
    anomalies: Vec<DeltaAnomaly>,
}

impl fmt::Debug for GameStateDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.intermediates.keys().collect();
        keys.sort();
        f.debug_struct("GameStateDelta")
            .field("entries", &self.entries)
            .field("intermediates", &keys)
            .field("anomalies", &self.anomalies)
            .finish()
    }
}

impl GameStateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a patch. `Add` entries on the same path coalesce; any other
    /// repeated `(path, op)` is reported as an anomaly and the newer value is kept.
    pub fn add_delta(&mut self, path: KeyPath, value: DeltaValue, op: DeltaOp) {
        let key = (path, op);
        if let Some(&position) = self.positions.get(&key) {
            let entry = &mut self.entries[position];
            if op == DeltaOp::Add {
                if !entry.value.accumulate(&value) {
                    warn!(path = %key.0, "add with mismatched value kind");
                    self.anomalies
                        .push(DeltaAnomaly::AddKindMismatch { path: key.0 });
                }
                return;
            }
            warn!(path = %key.0, ?op, "duplicate non-additive delta registration");
            entry.value = value;
            self.anomalies.push(DeltaAnomaly::DuplicateRegistration {
                path: key.0,
                op,
            });
            return;
        }
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push(DeltaEntry {
            path: key.0,
            op,
            value,
        });
    }

    pub fn add_number(&mut self, path: KeyPath, amount: f64) {
        self.add_delta(path, DeltaValue::Number(amount), DeltaOp::Add);
    }

    pub fn add_integer(&mut self, path: KeyPath, amount: i64) {
        self.add_delta(path, DeltaValue::Integer(amount), DeltaOp::Add);
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &KeyPath, op: DeltaOp) -> Option<&DeltaValue> {
        self.positions
            .get(&(path.clone(), op))
            .map(|position| &self.entries[*position].value)
    }

    /// Accumulated integer `Add` at `path`, zero when nothing is registered.
    pub fn pending_integer(&self, path: &KeyPath) -> i64 {
        match self.get(path, DeltaOp::Add) {
            Some(DeltaValue::Integer(value)) => *value,
            _ => 0,
        }
    }

    /// Accumulated numeric `Add` at `path`, zero when nothing is registered.
    pub fn pending_number(&self, path: &KeyPath) -> f64 {
        match self.get(path, DeltaOp::Add) {
            Some(DeltaValue::Number(value)) => *value,
            _ => 0.0,
        }
    }

    /// Update a turn-scoped accumulator, creating it with `T::default()` first.
    pub fn add_intermediate_delta<T, F>(&mut self, key: &'static str, update: F)
    where
        T: Any + Default + Send,
        F: FnOnce(&mut T),
    {
        let slot = self
            .intermediates
            .entry(key)
            .or_insert_with(|| Box::new(T::default()));
        match slot.downcast_mut::<T>() {
            Some(value) => update(value),
            None => {
                warn!(key, "intermediate accessed with a different type");
                self.anomalies
                    .push(DeltaAnomaly::IntermediateKindMismatch { key });
            }
        }
    }

    pub fn intermediate<T: Any>(&self, key: &'static str) -> Option<&T> {
        self.intermediates
            .get(key)
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Remove an accumulator and hand back its value.
    pub fn take_intermediate<T: Any>(&mut self, key: &'static str) -> Option<T> {
        let slot = self.intermediates.remove(key)?;
        slot.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn has_intermediates(&self) -> bool {
        !self.intermediates.is_empty()
    }

    pub fn clear_intermediates(&mut self) {
        self.intermediates.clear();
    }

    pub fn anomalies(&self) -> &[DeltaAnomaly] {
        &self.anomalies
    }

    pub(crate) fn record_anomaly(&mut self, anomaly: DeltaAnomaly) {
        self.anomalies.push(anomaly);
    }
}

/// Apply every entry of `delta` to `target` in registration order.
///
/// `target` is expected to be a fresh clone; on error it is dropped, so a
/// failed delta never leaves a partially patched state behind.
pub fn apply_deltas(mut target: GameState, delta: &GameStateDelta) -> Result<GameState, DeltaError> {
    for entry in delta.entries() {
        apply_entry(&mut target, entry)?;
    }
    target.reindex()?;
    Ok(target)
}

fn apply_entry(state: &mut GameState, entry: &DeltaEntry) -> Result<(), DeltaError> {
    let DeltaEntry { path, op, value } = entry;
    let op = *op;
    let missing = || DeltaError::MissingKey {
        path: path.clone(),
        op,
    };
    let unsupported = || DeltaError::UnsupportedOp {
        path: path.clone(),
        op,
    };

    match path {
        KeyPath::TileNutrient { tile, nutrient } => {
            let slot = state
                .tiles
                .get_mut(*tile)
                .ok_or_else(missing)?
                .soil
                .get_mut(*nutrient);
            let amount = number(path, op, value)?;
            match op {
                DeltaOp::Add => *slot += amount,
                DeltaOp::Replace => *slot = amount,
                _ => return Err(unsupported()),
            }
        }
        KeyPath::TileWater { tile } => {
            let slot = &mut state.tiles.get_mut(*tile).ok_or_else(missing)?.water;
            let amount = integer(path, op, value)?;
            match op {
                DeltaOp::Add => *slot += amount,
                DeltaOp::Replace => *slot = amount,
                _ => return Err(unsupported()),
            }
        }
        KeyPath::Flower { flower } => match (op, value) {
            (DeltaOp::Replace, DeltaValue::Flower(new)) => {
                state.flowers.insert(*flower, new.clone());
            }
            (DeltaOp::Delete, _) => {
                state.flowers.remove(flower);
            }
            (DeltaOp::Replace, _) => return Err(mismatch(path, op, "flower")),
            _ => return Err(unsupported()),
        },
        KeyPath::FlowerGrowth { flower } | KeyPath::FlowerAmount { flower } => {
            let target = state.flowers.get_mut(flower).ok_or_else(missing)?;
            let slot = if matches!(path, KeyPath::FlowerGrowth { .. }) {
                &mut target.growth
            } else {
                &mut target.amount
            };
            apply_counter(slot, path, op, value)?;
        }
        KeyPath::FlowerType { flower_type } => match (op, value) {
            (DeltaOp::Replace, DeltaValue::FlowerType(new)) => {
                state.flower_types.insert(flower_type.clone(), new.clone());
            }
            (DeltaOp::Delete, _) => {
                state.flower_types.remove(flower_type);
            }
            (DeltaOp::Replace, _) => return Err(mismatch(path, op, "flower type")),
            _ => return Err(unsupported()),
        },
        KeyPath::SeedStatus { flower_type } => match (op, value) {
            (DeltaOp::Replace, DeltaValue::SeedStatus(new)) => {
                state.seed_status.insert(flower_type.clone(), new.clone());
            }
            (DeltaOp::Delete, _) => {
                state.seed_status.remove(flower_type);
            }
            (DeltaOp::Replace, _) => return Err(mismatch(path, op, "seed status")),
            _ => return Err(unsupported()),
        },
        KeyPath::SeedQuantity { flower_type } | KeyPath::SeedProgress { flower_type } => {
            let status = state.seed_status.get_mut(flower_type).ok_or_else(missing)?;
            let slot = if matches!(path, KeyPath::SeedQuantity { .. }) {
                &mut status.quantity
            } else {
                &mut status.progress
            };
            apply_counter(slot, path, op, value)?;
        }
        KeyPath::PlayerFlowers { player } => {
            let list = &mut state.players.get_mut(player).ok_or_else(missing)?.flowers;
            match (op, value) {
                (DeltaOp::Append, DeltaValue::FlowerIds(ids)) => list.extend(ids.iter().copied()),
                (DeltaOp::Replace, DeltaValue::FlowerIds(ids)) => *list = ids.clone(),
                (DeltaOp::Remove, DeltaValue::Indices(indices)) => {
                    remove_indices(list, indices, path)?
                }
                (DeltaOp::Append | DeltaOp::Replace, _) => {
                    return Err(mismatch(path, op, "flower id list"))
                }
                (DeltaOp::Remove, _) => return Err(mismatch(path, op, "index list")),
                _ => return Err(unsupported()),
            }
        }
        KeyPath::PlayerSeeds { player } => {
            let list = &mut state.players.get_mut(player).ok_or_else(missing)?.seeds;
            match (op, value) {
                (DeltaOp::Append, DeltaValue::TypeIds(ids)) => list.extend(ids.iter().cloned()),
                (DeltaOp::Replace, DeltaValue::TypeIds(ids)) => *list = ids.clone(),
                (DeltaOp::Remove, DeltaValue::Indices(indices)) => {
                    remove_indices(list, indices, path)?
                }
                (DeltaOp::Append | DeltaOp::Replace, _) => {
                    return Err(mismatch(path, op, "type id list"))
                }
                (DeltaOp::Remove, _) => return Err(mismatch(path, op, "index list")),
                _ => return Err(unsupported()),
            }
        }
        KeyPath::AutoReplant { player, tile } => {
            let slots = &mut state.players.get_mut(player).ok_or_else(missing)?.auto_replant;
            match (op, value) {
                (DeltaOp::Replace, DeltaValue::TypeId(seed)) => {
                    slots.insert(*tile, seed.clone());
                }
                (DeltaOp::Delete, _) => {
                    slots.remove(tile);
                }
                (DeltaOp::Replace, _) => return Err(mismatch(path, op, "type id")),
                _ => return Err(unsupported()),
            }
        }
        KeyPath::CloudTile { cloud } => {
            let target = state.clouds.get_mut(cloud).ok_or_else(missing)?;
            match (op, value) {
                (DeltaOp::Replace, DeltaValue::Tile(tile)) => target.tile = *tile,
                (DeltaOp::Delete, _) => target.tile = None,
                (DeltaOp::Replace, _) => return Err(mismatch(path, op, "tile")),
                _ => return Err(unsupported()),
            }
        }
        KeyPath::Augmentations { flower } => match (op, value) {
            (DeltaOp::Append, DeltaValue::Augmentations(more)) => {
                state
                    .augmentations
                    .entry(*flower)
                    .or_default()
                    .extend(more.iter().cloned());
            }
            (DeltaOp::Replace, DeltaValue::Augmentations(all)) => {
                state.augmentations.insert(*flower, all.clone());
            }
            (DeltaOp::Remove, DeltaValue::Indices(indices)) => {
                let list = state.augmentations.get_mut(flower).ok_or_else(missing)?;
                remove_indices(list, indices, path)?;
                if list.is_empty() {
                    state.augmentations.remove(flower);
                }
            }
            (DeltaOp::Delete, _) => {
                state.augmentations.remove(flower);
            }
            (DeltaOp::Append | DeltaOp::Replace, _) => {
                return Err(mismatch(path, op, "augmentation list"))
            }
            (DeltaOp::Remove, _) => return Err(mismatch(path, op, "index list")),
            _ => return Err(unsupported()),
        },
        KeyPath::AugmentationTurns { flower, index } => {
            let list = state.augmentations.get_mut(flower).ok_or_else(missing)?;
            let len = list.len();
            let augmentation = list.get_mut(*index).ok_or(DeltaError::IndexOutOfRange {
                path: path.clone(),
                index: *index,
                len,
            })?;
            apply_counter(&mut augmentation.turns_remaining, path, op, value)?;
        }
        KeyPath::NextFlowerId => {
            let amount = integer(path, op, value)?;
            let next = match op {
                DeltaOp::Add => i64::try_from(state.next_flower_id)
                    .unwrap_or(i64::MAX)
                    .saturating_add(amount),
                DeltaOp::Replace => amount,
                _ => return Err(unsupported()),
            };
            state.next_flower_id = u64::try_from(next).map_err(|_| DeltaError::CounterOutOfRange {
                path: path.clone(),
                value: next,
            })?;
        }
    }
    Ok(())
}

fn mismatch(path: &KeyPath, op: DeltaOp, expected: &'static str) -> DeltaError {
    DeltaError::ValueMismatch {
        path: path.clone(),
        op,
        expected,
    }
}

fn number(path: &KeyPath, op: DeltaOp, value: &DeltaValue) -> Result<f64, DeltaError> {
    match value {
        DeltaValue::Number(amount) => Ok(*amount),
        DeltaValue::Integer(amount) => Ok(*amount as f64),
        _ => Err(mismatch(path, op, "number")),
    }
}

fn integer(path: &KeyPath, op: DeltaOp, value: &DeltaValue) -> Result<i64, DeltaError> {
    match value {
        DeltaValue::Integer(amount) => Ok(*amount),
        _ => Err(mismatch(path, op, "integer")),
    }
}

fn apply_counter(
    slot: &mut u32,
    path: &KeyPath,
    op: DeltaOp,
    value: &DeltaValue,
) -> Result<(), DeltaError> {
    let amount = integer(path, op, value)?;
    let next = match op {
        DeltaOp::Add => i64::from(*slot).saturating_add(amount),
        DeltaOp::Replace => amount,
        _ => {
            return Err(DeltaError::UnsupportedOp {
                path: path.clone(),
                op,
            })
        }
    };
    *slot = u32::try_from(next).map_err(|_| DeltaError::CounterOutOfRange {
        path: path.clone(),
        value: next,
    })?;
    Ok(())
}

fn remove_indices<T>(list: &mut Vec<T>, indices: &[usize], path: &KeyPath) -> Result<(), DeltaError> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if let Some(&last) = sorted.last() {
        if last >= list.len() {
            return Err(DeltaError::IndexOutOfRange {
                path: path.clone(),
                index: last,
                len: list.len(),
            });
        }
    }
    for index in sorted.into_iter().rev() {
        list.remove(index);
    }
    Ok(())
}

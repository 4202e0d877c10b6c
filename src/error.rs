use std::path::PathBuf;

use thiserror::Error;

use crate::delta::{DeltaOp, KeyPath};
use crate::turn::TurnPhase;
use crate::world::{CloudId, FlowerId, FlowerTypeId, PlayerId, TileIndex};

/// Integrity failures while building or re-indexing a [`GameState`](crate::world::GameState).
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("grid is {width}x{height} but {actual} tiles were supplied")]
    TileCountMismatch {
        width: usize,
        height: usize,
        actual: usize,
    },
    #[error("{entity} at ({x}, {y}) lies outside the grid")]
    OutOfBounds {
        entity: &'static str,
        x: i64,
        y: i64,
    },
    #[error("tile {tile} holds flowers {first} and {second}")]
    DuplicateFlower {
        tile: TileIndex,
        first: FlowerId,
        second: FlowerId,
    },
    #[error("flower {flower} references unknown flower type {flower_type}")]
    UnknownFlowerType {
        flower: FlowerId,
        flower_type: FlowerTypeId,
    },
    #[error("player {player} references unknown flower {flower}")]
    UnknownFlower { player: PlayerId, flower: FlowerId },
    #[error("player {player} references unknown seed type {flower_type}")]
    UnknownSeedType {
        player: PlayerId,
        flower_type: FlowerTypeId,
    },
    #[error("player {player} references unknown cloud {cloud}")]
    UnknownCloud { player: PlayerId, cloud: CloudId },
    #[error("cloud {cloud} sits on tile {tile} which is outside the grid")]
    CloudOutOfBounds { cloud: CloudId, tile: TileIndex },
}

/// Failures applying a [`GameStateDelta`](crate::delta::GameStateDelta).
#[derive(Debug, Error, PartialEq)]
pub enum DeltaError {
    #[error("cannot {op:?} at {path}: key is absent")]
    MissingKey { path: KeyPath, op: DeltaOp },
    #[error("{op:?} at {path} expects a {expected} value")]
    ValueMismatch {
        path: KeyPath,
        op: DeltaOp,
        expected: &'static str,
    },
    #[error("{op:?} is not supported at {path}")]
    UnsupportedOp { path: KeyPath, op: DeltaOp },
    #[error("index {index} out of range at {path} (len {len})")]
    IndexOutOfRange {
        path: KeyPath,
        index: usize,
        len: usize,
    },
    #[error("{path} would become {value}, outside the counter range")]
    CounterOutOfRange { path: KeyPath, value: i64 },
    #[error("delta broke state integrity: {0}")]
    Integrity(#[from] StateError),
}

/// Failures reading or writing saved snapshots.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("save encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no save with id {0}")]
    UnknownSave(String),
}

/// Fatal failures at the turn controller boundary. A turn that hits one of these
/// is not committed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no baseline state has been loaded")]
    NoBaseline,
    #[error("illegal phase transition {from:?} -> {to:?}")]
    IllegalTransition { from: TurnPhase, to: TurnPhase },
    #[error("{awaiting} player(s) have not ended their turn")]
    AwaitingPlayers { awaiting: usize },
    #[error("calculator {name} failed: {source}")]
    Calculator {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Delta(#[from] DeltaError),
    #[error(transparent)]
    Save(#[from] SaveError),
}

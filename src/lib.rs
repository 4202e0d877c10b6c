pub mod ai;
pub mod commands;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod systems;
pub mod turn;
pub mod world;

pub use commands::{Command, CommandOutcome, Rejection};
pub use engine::{Engine, EngineBuilder, EngineEvent, EngineSettings};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{GameState, GameStateData};

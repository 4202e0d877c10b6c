mod augmentation;
pub mod evolution;
mod growth;
pub mod irrigation;
pub mod placement;
pub mod replant;
mod soil;

pub use augmentation::AugmentationSystem;
pub use growth::{survival_chance, GrowthSystem};
pub use irrigation::IrrigationSystem;
pub use placement::PlacementSystem;
pub use replant::ReplantSystem;
pub use soil::SoilSystem;

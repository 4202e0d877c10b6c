//! Gameplay constants and ambient settings loaded from scenario files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_soil_min() -> f64 {
    0.0
}

fn default_soil_max() -> f64 {
    100.0
}

fn default_water_ceiling() -> i64 {
    10
}

fn default_degradation() -> f64 {
    20.0
}

fn default_irrigation_strength() -> f64 {
    4.0
}

fn default_irrigation_water() -> i64 {
    2
}

fn default_irrigation_water_adjacent() -> i64 {
    1
}

fn default_irrigation_water_level() -> i64 {
    6
}

fn default_evaporation() -> i64 {
    1
}

fn default_seed_progress_threshold() -> u32 {
    100
}

fn default_juvenile_death_penalty() -> u32 {
    5
}

fn default_ai_evolve_threshold() -> u32 {
    20
}

fn default_stage_amounts() -> Vec<u32> {
    vec![0, 10, 20, 30, 50, 75, 100]
}

fn default_success() -> Vec<u32> {
    vec![0, 50, 0, 0, 0, 0, 0]
}

fn default_success_plus() -> Vec<u32> {
    vec![0, 0, 60, 0, 0, 0, 0]
}

fn default_success_plus2() -> Vec<u32> {
    vec![0, 0, 0, 70, 75, 0, 0]
}

fn default_success_plus3() -> Vec<u32> {
    vec![0, 0, 0, 0, 0, 80, 90]
}

fn default_choice_count() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("saves")
}

fn default_retention() -> usize {
    10
}

/// Numeric policy shared by every calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    #[serde(default = "default_soil_min")]
    pub soil_min: f64,
    #[serde(default = "default_soil_max")]
    pub soil_max: f64,
    /// Water at or above this value floods the tile.
    #[serde(default = "default_water_ceiling")]
    pub water_ceiling: i64,
    #[serde(default = "default_degradation")]
    pub degradation: f64,
    /// Nutrient gain on an irrigator's own tile; neighbours get half.
    #[serde(default = "default_irrigation_strength")]
    pub irrigation_strength: f64,
    #[serde(default = "default_irrigation_water")]
    pub irrigation_water: i64,
    #[serde(default = "default_irrigation_water_adjacent")]
    pub irrigation_water_adjacent: i64,
    /// Irrigation never lifts water above this level.
    #[serde(default = "default_irrigation_water_level")]
    pub irrigation_water_level: i64,
    #[serde(default = "default_evaporation")]
    pub evaporation: i64,
    #[serde(default = "default_seed_progress_threshold")]
    pub seed_progress_threshold: u32,
    #[serde(default = "default_juvenile_death_penalty")]
    pub juvenile_death_penalty: u32,
    /// Seeds per owned type an AI must hold before a secondary evolve attempt.
    #[serde(default = "default_ai_evolve_threshold")]
    pub ai_evolve_threshold: u32,
    #[serde(default)]
    pub evolution: EvolutionRules,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            soil_min: default_soil_min(),
            soil_max: default_soil_max(),
            water_ceiling: default_water_ceiling(),
            degradation: default_degradation(),
            irrigation_strength: default_irrigation_strength(),
            irrigation_water: default_irrigation_water(),
            irrigation_water_adjacent: default_irrigation_water_adjacent(),
            irrigation_water_level: default_irrigation_water_level(),
            evaporation: default_evaporation(),
            seed_progress_threshold: default_seed_progress_threshold(),
            juvenile_death_penalty: default_juvenile_death_penalty(),
            ai_evolve_threshold: default_ai_evolve_threshold(),
            evolution: EvolutionRules::default(),
        }
    }
}

/// Stage table and per-tier success percentages, indexed by stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionRules {
    #[serde(default = "default_stage_amounts")]
    pub stage_amounts: Vec<u32>,
    #[serde(default = "default_success")]
    pub success: Vec<u32>,
    #[serde(default = "default_success_plus")]
    pub success_plus: Vec<u32>,
    #[serde(default = "default_success_plus2")]
    pub success_plus2: Vec<u32>,
    #[serde(default = "default_success_plus3")]
    pub success_plus3: Vec<u32>,
    #[serde(default = "default_choice_count")]
    pub choice_count: usize,
}

impl Default for EvolutionRules {
    fn default() -> Self {
        Self {
            stage_amounts: default_stage_amounts(),
            success: default_success(),
            success_plus: default_success_plus(),
            success_plus2: default_success_plus2(),
            success_plus3: default_success_plus3(),
            choice_count: default_choice_count(),
        }
    }
}

impl EvolutionRules {
    pub fn max_stage(&self) -> usize {
        self.stage_amounts.len().saturating_sub(1)
    }

    pub fn amount_at(&self, stage: usize) -> u32 {
        self.stage_amounts.get(stage).copied().unwrap_or(0)
    }

    /// Highest stage whose amount fits in `available` seeds.
    pub fn highest_affordable_stage(&self, available: u32) -> usize {
        self.stage_amounts
            .iter()
            .rposition(|amount| *amount <= available)
            .unwrap_or(0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RulesError {
    #[error("soil range {min}..{max} is empty")]
    EmptySoilRange { min: f64, max: f64 },
    #[error("stage amounts must start at 0 and strictly increase")]
    StageAmounts,
    #[error("outcome table {table} has {actual} entries, expected {expected}")]
    TableLength {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("outcome percentages at stage {stage} sum to {sum}, above 100")]
    OverfullStage { stage: usize, sum: u32 },
    #[error("choice count must be at least 1")]
    NoChoices,
}

impl Rules {
    pub fn validate(&self) -> Result<(), RulesError> {
        if self.soil_min >= self.soil_max {
            return Err(RulesError::EmptySoilRange {
                min: self.soil_min,
                max: self.soil_max,
            });
        }
        let evo = &self.evolution;
        let increasing = evo.stage_amounts.windows(2).all(|pair| pair[0] < pair[1]);
        if evo.stage_amounts.first() != Some(&0) || !increasing {
            return Err(RulesError::StageAmounts);
        }
        let expected = evo.stage_amounts.len();
        let tables = [
            ("success", &evo.success),
            ("success_plus", &evo.success_plus),
            ("success_plus2", &evo.success_plus2),
            ("success_plus3", &evo.success_plus3),
        ];
        for (table, values) in tables {
            if values.len() != expected {
                return Err(RulesError::TableLength {
                    table,
                    expected,
                    actual: values.len(),
                });
            }
        }
        for stage in 0..expected {
            let sum: u32 = tables.iter().map(|(_, values)| values[stage]).sum();
            if sum > 100 {
                return Err(RulesError::OverfullStage { stage, sum });
            }
        }
        if evo.choice_count == 0 {
            return Err(RulesError::NoChoices);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    #[serde(default = "default_save_dir")]
    pub dir: PathBuf,
    /// Saves kept before the oldest is evicted.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            dir: default_save_dir(),
            retention: default_retention(),
        }
    }
}

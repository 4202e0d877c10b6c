//! Save store for committed game states.
//!
//! Each save is the flat load snapshot written as pretty JSON to
//! `<dir>/<uuid>.json`. `index.json` lists saves oldest first; once it holds
//! more than `retention` entries the oldest save is evicted.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SaveConfig;
use crate::error::SaveError;
use crate::world::{GameState, GameStateData};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEntry {
    pub id: String,
    pub turn: u64,
    pub saved_at: DateTime<Utc>,
}

pub struct SaveStore {
    dir: PathBuf,
    retention: usize,
}

impl SaveStore {
    pub fn new(dir: impl AsRef<Path>, retention: usize) -> Result<Self, SaveError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| SaveError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            retention: retention.max(1),
        })
    }

    pub fn from_config(config: &SaveConfig) -> Result<Self, SaveError> {
        Self::new(&config.dir, config.retention)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `state` and return its index entry.
    pub fn save(&self, state: &GameState) -> Result<SaveEntry, SaveError> {
        let entry = SaveEntry {
            id: Uuid::new_v4().to_string(),
            turn: state.turn(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&state.to_data())?;
        let path = self.save_path(&entry.id);
        write(&path, json)?;

        let mut index = self.list()?;
        index.push(entry.clone());
        while index.len() > self.retention {
            let evicted = index.remove(0);
            let path = self.save_path(&evicted.id);
            if path.exists() {
                fs::remove_file(&path).map_err(|source| SaveError::Io { path, source })?;
            }
            debug!(id = %evicted.id, turn = evicted.turn, "save evicted");
        }
        self.write_index(&index)?;
        info!(id = %entry.id, turn = entry.turn, "state saved");
        Ok(entry)
    }

    pub fn load(&self, id: &str) -> Result<GameStateData, SaveError> {
        if !self.list()?.iter().any(|entry| entry.id == id) {
            return Err(SaveError::UnknownSave(id.to_string()));
        }
        let path = self.save_path(id);
        let json = fs::read_to_string(&path).map_err(|source| SaveError::Io { path, source })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Most recent save, if any.
    pub fn latest(&self) -> Result<Option<SaveEntry>, SaveError> {
        Ok(self.list()?.pop())
    }

    /// Index entries, oldest first.
    pub fn list(&self) -> Result<Vec<SaveEntry>, SaveError> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path).map_err(|source| SaveError::Io { path, source })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn write_index(&self, index: &[SaveEntry]) -> Result<(), SaveError> {
        let json = serde_json::to_string_pretty(index)?;
        write(&self.dir.join(INDEX_FILE), json)
    }

    fn save_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

fn write(path: &Path, contents: String) -> Result<(), SaveError> {
    fs::write(path, contents).map_err(|source| SaveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

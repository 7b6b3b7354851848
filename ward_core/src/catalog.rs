use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use ward_runtime::ideology::is_valid_ideology;
use ward_schema::{District, DistrictId, Politician, PoliticianId};

use crate::store::{GameStore, StoreError, WriteBatch, WriteOp};

pub const BUILTIN_WORLD: &str = include_str!("data/world.json");

/// Static districts and politicians the game is played over.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldCatalog {
    pub districts: Vec<District>,
    #[serde(default)]
    pub politicians: Vec<Politician>,
}

#[derive(Debug, Error)]
pub enum WorldCatalogError {
    #[error("failed to parse world catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read world catalog from {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("district {0} is listed twice")]
    DuplicateDistrict(DistrictId),
    #[error("politician {0} is listed twice")]
    DuplicatePolitician(PoliticianId),
    #[error("politician {politician} belongs to unknown district {district}")]
    UnknownDistrict {
        politician: PoliticianId,
        district: DistrictId,
    },
    #[error("{0} has ideology outside -5..=5")]
    IdeologyOutOfRange(String),
}

impl WorldCatalog {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_WORLD).expect("builtin world catalog should be valid")
    }

    pub fn from_json_str(json: &str) -> Result<Self, WorldCatalogError> {
        let catalog: WorldCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_file(path: &Path) -> Result<Self, WorldCatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| WorldCatalogError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), WorldCatalogError> {
        let mut districts = HashSet::new();
        for district in &self.districts {
            if !districts.insert(&district.id) {
                return Err(WorldCatalogError::DuplicateDistrict(district.id.clone()));
            }
            if let Some(affinity) = district.affinity {
                if !is_valid_ideology(affinity as i32) {
                    return Err(WorldCatalogError::IdeologyOutOfRange(district.id.to_string()));
                }
            }
        }
        let mut politicians = HashSet::new();
        for politician in &self.politicians {
            if !politicians.insert(&politician.id) {
                return Err(WorldCatalogError::DuplicatePolitician(politician.id.clone()));
            }
            if !is_valid_ideology(politician.ideology as i32) {
                return Err(WorldCatalogError::IdeologyOutOfRange(politician.id.to_string()));
            }
            if let Some(home) = &politician.district {
                if !districts.contains(home) {
                    return Err(WorldCatalogError::UnknownDistrict {
                        politician: politician.id.clone(),
                        district: home.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn district(&self, id: &str) -> Option<&District> {
        self.districts.iter().find(|d| d.id.as_str() == id)
    }

    /// Writes every district and politician the store does not have yet.
    /// Returns how many records were added.
    pub fn seed(&self, store: &dyn GameStore) -> Result<usize, StoreError> {
        let mut batch = WriteBatch::new();
        for district in &self.districts {
            if store.district(&district.id)?.is_none() {
                batch.push(WriteOp::PutDistrict(district.clone()));
            }
        }
        for politician in &self.politicians {
            if store.politician(&politician.id)?.is_none() {
                batch.push(WriteOp::PutPolitician(politician.clone()));
            }
        }
        let added = batch.len();
        if added > 0 {
            store.commit(batch)?;
        }
        info!(target: "ward::catalog", added, "world.seeded");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn builtin_world_is_consistent() {
        let world = WorldCatalog::builtin();
        assert_eq!(world.districts.len(), 8);
        let vracar = world.district("vracar").expect("vracar");
        assert_eq!(vracar.affinity, Some(-5));
        assert!(world
            .politicians
            .iter()
            .any(|p| p.district.is_none()));
    }

    #[test]
    fn seeding_twice_adds_nothing_new() {
        let store = MemoryStore::new();
        let world = WorldCatalog::builtin();
        let first = world.seed(&store).expect("seed");
        assert_eq!(first, world.districts.len() + world.politicians.len());
        assert_eq!(world.seed(&store).expect("reseed"), 0);
        assert_eq!(store.districts().expect("districts").len(), 8);
    }

    #[test]
    fn politician_in_unknown_district_is_rejected() {
        let json = r#"{
            "districts": [],
            "politicians": [{
                "id": "ghost", "name": "Ghost", "role": "none",
                "ideology": 0, "district": "nowhere", "influence": 1
            }]
        }"#;
        let err = WorldCatalog::from_json_str(json).unwrap_err();
        assert!(matches!(err, WorldCatalogError::UnknownDistrict { .. }));
    }
}

//! Bird and item catalog, loaded from YAML and checked on the way in

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::{BirdId, BirdSpecies, Item, ItemId, ItemKind};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("catalog validation error: {0}")]
    Validation(String),
}

/// Birds, accessories and food known to the game. Immutable once loaded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    birds: Vec<BirdSpecies>,
    #[serde(default)]
    accessories: Vec<Item>,
    #[serde(default)]
    food: Vec<Item>,
}

impl Catalog {
    pub fn new(
        birds: Vec<BirdSpecies>,
        accessories: Vec<Item>,
        food: Vec<Item>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self {
            birds,
            accessories,
            food,
        };
        catalog.normalize();
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, CatalogError> {
        let raw: Catalog = serde_yaml::from_str(text)?;
        Self::new(raw.birds, raw.accessories, raw.food)
    }

    fn normalize(&mut self) {
        self.birds.sort_by_key(|bird| bird.id);
        self.accessories.sort_by_key(|item| item.id);
        self.food.sort_by_key(|item| item.id);
    }

    /// Rejects anything the attraction engine cannot take at face value.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut known_birds = BTreeSet::new();
        for bird in &self.birds {
            if !known_birds.insert(bird.id) {
                return Err(CatalogError::Validation(format!(
                    "bird id {} defined more than once",
                    bird.id
                )));
            }
            if bird.name.trim().is_empty() {
                return Err(CatalogError::Validation(format!(
                    "bird {} has an empty name",
                    bird.id
                )));
            }
        }

        for kind in [ItemKind::Accessory, ItemKind::Food] {
            let mut seen = BTreeSet::new();
            for item in self.items(kind) {
                if !seen.insert(item.id) {
                    return Err(CatalogError::Validation(format!(
                        "{kind} id {} defined more than once",
                        item.id
                    )));
                }
                if item.name.trim().is_empty() {
                    return Err(CatalogError::Validation(format!(
                        "{kind} {} has an empty name",
                        item.id
                    )));
                }
                for (bird, score) in item.effectiveness.iter() {
                    if !known_birds.contains(&bird) {
                        return Err(CatalogError::Validation(format!(
                            "{kind} {} rates unknown bird {bird}",
                            item.id
                        )));
                    }
                    if !score.is_finite() || score < 0.0 {
                        return Err(CatalogError::Validation(format!(
                            "{kind} {} has invalid effectiveness {score} for bird {bird}",
                            item.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn birds(&self) -> &[BirdSpecies] {
        &self.birds
    }

    pub fn bird(&self, id: BirdId) -> Option<&BirdSpecies> {
        self.birds
            .binary_search_by_key(&id, |bird| bird.id)
            .ok()
            .map(|index| &self.birds[index])
    }

    /// Birds whose region admits `location`; every bird when no location is
    /// given.
    pub fn birds_for_location(&self, location: Option<&str>) -> Vec<&BirdSpecies> {
        match location.map(str::trim).filter(|loc| !loc.is_empty()) {
            Some(location) => self
                .birds
                .iter()
                .filter(|bird| bird.visits(location))
                .collect(),
            None => self.birds.iter().collect(),
        }
    }

    pub fn items(&self, kind: ItemKind) -> &[Item] {
        match kind {
            ItemKind::Accessory => &self.accessories,
            ItemKind::Food => &self.food,
        }
    }

    pub fn item(&self, kind: ItemKind, id: ItemId) -> Option<&Item> {
        let items = self.items(kind);
        items
            .binary_search_by_key(&id, |item| item.id)
            .ok()
            .map(|index| &items[index])
    }
}

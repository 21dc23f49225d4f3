//! Shared game types: ids, birds, items, accounts and yards

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(BirdId);
id_type!(ItemId);
id_type!(UserId);
id_type!(YardId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirdSpecies {
    pub id: BirdId,
    pub name: String,
    /// Free-text region; `None` means the bird shows up everywhere.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl BirdSpecies {
    /// Region rule for yards: null region matches anything, otherwise the
    /// region must contain the location, ignoring case.
    pub fn visits(&self, location: &str) -> bool {
        match &self.region {
            None => true,
            Some(region) => region
                .to_lowercase()
                .contains(&location.trim().to_lowercase()),
        }
    }
}

/// Sparse bird → score table. Missing birds are unaffected by the item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Effectiveness(BTreeMap<BirdId, f64>);

impl Effectiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bird: BirdId, score: f64) -> Self {
        self.0.insert(bird, score);
        self
    }

    pub fn score(&self, bird: BirdId) -> Option<f64> {
        self.0.get(&bird).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BirdId, f64)> + '_ {
        self.0.iter().map(|(bird, score)| (*bird, *score))
    }
}

impl FromIterator<(BirdId, f64)> for Effectiveness {
    fn from_iter<T: IntoIterator<Item = (BirdId, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Accessory,
    Food,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Accessory => write!(f, "accessory"),
            ItemKind::Food => write!(f, "food"),
        }
    }
}

fn default_price() -> u64 {
    10
}

/// An accessory or a food. Which one is decided by the catalog table it
/// lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_price")]
    pub price: u64,
    #[serde(default)]
    pub effectiveness: Effectiveness,
}

/// Shop view of an item, without the effectiveness table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemListing {
    pub id: ItemId,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub image: Option<String>,
    pub price: u64,
}

impl From<&Item> for ItemListing {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            name: item.name.clone(),
            item_type: item.item_type.clone(),
            image: item.image.clone(),
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub pup_coins: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewYard {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, rename = "bonusPlus")]
    pub bonus_plus: Option<String>,
    #[serde(default, rename = "bonusMinus")]
    pub bonus_minus: Option<String>,
}

impl NewYard {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Yard {
    pub id: YardId,
    pub user_id: UserId,
    pub location: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub bonus_plus: Option<String>,
    pub bonus_minus: Option<String>,
    pub accessories: BTreeSet<ItemId>,
    pub food: BTreeSet<ItemId>,
    pub birds: BTreeMap<BirdId, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Number of attraction attempts so far; keys the yard's RNG stream.
    pub attempts: u64,
}

impl Yard {
    pub fn new(id: YardId, user_id: UserId, new_yard: NewYard) -> Self {
        Self {
            id,
            user_id,
            location: new_yard.location.trim().to_string(),
            name: new_yard.name,
            color: new_yard.color,
            bonus_plus: new_yard.bonus_plus,
            bonus_minus: new_yard.bonus_minus,
            accessories: BTreeSet::new(),
            food: BTreeSet::new(),
            birds: BTreeMap::new(),
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn placed(&self, kind: ItemKind) -> &BTreeSet<ItemId> {
        match kind {
            ItemKind::Accessory => &self.accessories,
            ItemKind::Food => &self.food,
        }
    }

    pub fn placed_mut(&mut self, kind: ItemKind) -> &mut BTreeSet<ItemId> {
        match kind {
            ItemKind::Accessory => &mut self.accessories,
            ItemKind::Food => &mut self.food,
        }
    }

    pub fn attracted_ids(&self) -> BTreeSet<BirdId> {
        self.birds.keys().copied().collect()
    }
}

//! In-memory game state: accounts, pup coins and yards.
//!
//! Each yard sits behind its own mutex. Attraction and purchase hold that
//! lock for the whole read-modify-write, so two requests for the same yard
//! can never attract one bird twice or place one item twice. When the
//! accounts lock is also needed it is always taken after the yard lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::attraction::{AttractionEngine, AttractionInput, AttractionOutcome};
use crate::catalog::Catalog;
use crate::model::{
    Account, BirdSpecies, Effectiveness, Item, ItemId, ItemKind, ItemListing, NewYard, UserId,
    Yard, YardId,
};
use crate::rng::RngManager;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanctuaryError {
    #[error("User not found")]
    UnknownUser(UserId),
    #[error("Username required")]
    InvalidUsername,
    #[error("Username already exists")]
    UsernameTaken(String),
    #[error("Location required")]
    LocationRequired,
    #[error("Yard already exists")]
    YardExists,
    #[error("No yard found")]
    NoYard,
    #[error("Unknown {kind} {id}")]
    UnknownItem { kind: ItemKind, id: ItemId },
    #[error("That {kind} is already in your yard")]
    AlreadyPlaced { kind: ItemKind, id: ItemId },
    #[error("Not enough Pup Coins")]
    InsufficientCoins { needed: u64, available: u64 },
    #[error("Invalid amount")]
    InvalidAmount,
}

#[derive(Debug, Clone, Copy)]
pub struct SanctuarySettings {
    pub seed: u64,
    pub starting_coins: u64,
    pub mismatch_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttractedBird {
    #[serde(flatten)]
    pub bird: BirdSpecies,
    pub attracted_at: DateTime<Utc>,
}

/// A yard with its placed items and birds resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YardView {
    pub id: YardId,
    pub user_id: UserId,
    pub location: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub bonus_plus: Option<String>,
    pub bonus_minus: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accessories: Vec<Item>,
    pub food: Vec<Item>,
    pub birds: Vec<AttractedBird>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Inventory {
    pub accessories: Vec<ItemListing>,
    pub food: Vec<ItemListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttractionEvent {
    pub user_id: UserId,
    pub yard_id: YardId,
    pub bird: BirdSpecies,
    pub attracted_at: DateTime<Utc>,
}

impl From<Option<AttractionEvent>> for AttractionOutcome {
    fn from(event: Option<AttractionEvent>) -> Self {
        Self {
            attracted: event.map(|event| event.bird),
        }
    }
}

/// Id-and-name row for the admin user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

/// The first registered account administers the others.
pub const ADMIN_USER: UserId = UserId(1);

pub const PUP_DENOMINATIONS: [u64; 4] = [50, 25, 10, 5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoinStack {
    pub value: u64,
    pub count: u64,
}

/// Greedy breakdown of a balance into pup coins, largest first. Anything
/// below the smallest coin is not shown.
pub fn denominations(amount: u64) -> Vec<CoinStack> {
    let mut remaining = amount;
    PUP_DENOMINATIONS
        .iter()
        .filter_map(|&value| {
            let count = remaining / value;
            remaining -= count * value;
            (count > 0).then_some(CoinStack { value, count })
        })
        .collect()
}

pub struct Sanctuary {
    catalog: Arc<Catalog>,
    engine: AttractionEngine,
    rng: RngManager,
    starting_coins: u64,
    accounts: Mutex<HashMap<UserId, Account>>,
    yards: RwLock<HashMap<UserId, Arc<Mutex<Yard>>>>,
    next_user: AtomicU64,
    next_yard: AtomicU64,
}

impl Sanctuary {
    pub fn new(catalog: Arc<Catalog>, settings: SanctuarySettings) -> Self {
        Self {
            catalog,
            engine: AttractionEngine::new(settings.mismatch_penalty),
            rng: RngManager::new(settings.seed),
            starting_coins: settings.starting_coins,
            accounts: Mutex::new(HashMap::new()),
            yards: RwLock::new(HashMap::new()),
            next_user: AtomicU64::new(1),
            next_yard: AtomicU64::new(1),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn register_user(&self, username: &str) -> Result<Account, SanctuaryError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SanctuaryError::InvalidUsername);
        }
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        if accounts.values().any(|account| account.username == username) {
            return Err(SanctuaryError::UsernameTaken(username.to_string()));
        }
        let account = Account {
            id: UserId(self.next_user.fetch_add(1, Ordering::SeqCst)),
            username: username.to_string(),
            pup_coins: self.starting_coins,
            created_at: Utc::now(),
        };
        accounts.insert(account.id, account.clone());
        info!(user = %account.id, username = %account.username, "registered user");
        Ok(account)
    }

    pub fn account(&self, user: UserId) -> Result<Account, SanctuaryError> {
        self.accounts
            .lock()
            .expect("accounts lock poisoned")
            .get(&user)
            .cloned()
            .ok_or(SanctuaryError::UnknownUser(user))
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        user == ADMIN_USER
    }

    /// All accounts ordered by id.
    pub fn users(&self) -> Vec<UserSummary> {
        let accounts = self.accounts.lock().expect("accounts lock poisoned");
        let mut users: Vec<UserSummary> = accounts
            .values()
            .map(|account| UserSummary {
                id: account.id,
                username: account.username.clone(),
            })
            .collect();
        users.sort_by_key(|summary| summary.id);
        users
    }

    pub fn rename_user(&self, user: UserId, username: &str) -> Result<Account, SanctuaryError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SanctuaryError::InvalidUsername);
        }
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        if accounts
            .values()
            .any(|account| account.id != user && account.username == username)
        {
            return Err(SanctuaryError::UsernameTaken(username.to_string()));
        }
        let account = accounts
            .get_mut(&user)
            .ok_or(SanctuaryError::UnknownUser(user))?;
        let previous = std::mem::replace(&mut account.username, username.to_string());
        info!(user = %user, from = %previous, to = %account.username, "renamed user");
        Ok(account.clone())
    }

    /// Removes the account together with its yard.
    pub fn delete_user(&self, user: UserId) -> Result<(), SanctuaryError> {
        let mut yards = self.yards.write().expect("yards lock poisoned");
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let account = accounts
            .remove(&user)
            .ok_or(SanctuaryError::UnknownUser(user))?;
        let had_yard = yards.remove(&user).is_some();
        info!(user = %user, username = %account.username, had_yard, "deleted user");
        Ok(())
    }

    pub fn coins(&self, user: UserId) -> Result<u64, SanctuaryError> {
        self.account(user).map(|account| account.pup_coins)
    }

    pub fn earn_coins(&self, user: UserId, amount: u64) -> Result<u64, SanctuaryError> {
        if amount < 1 {
            return Err(SanctuaryError::InvalidAmount);
        }
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let account = accounts
            .get_mut(&user)
            .ok_or(SanctuaryError::UnknownUser(user))?;
        account.pup_coins = account.pup_coins.saturating_add(amount);
        debug!(user = %user, amount, balance = account.pup_coins, "coins earned");
        Ok(account.pup_coins)
    }

    pub fn create_yard(&self, user: UserId, new_yard: NewYard) -> Result<YardView, SanctuaryError> {
        self.ensure_user(user)?;
        if new_yard.location.trim().is_empty() {
            return Err(SanctuaryError::LocationRequired);
        }
        let mut yards = self.yards.write().expect("yards lock poisoned");
        if yards.contains_key(&user) {
            return Err(SanctuaryError::YardExists);
        }
        let id = YardId(self.next_yard.fetch_add(1, Ordering::SeqCst));
        let yard = Yard::new(id, user, new_yard);
        let view = self.view(&yard);
        yards.insert(user, Arc::new(Mutex::new(yard)));
        info!(user = %user, yard = %id, location = %view.location, "yard created");
        Ok(view)
    }

    /// `Ok(None)` when the user exists but has not created a yard yet.
    pub fn yard(&self, user: UserId) -> Result<Option<YardView>, SanctuaryError> {
        self.ensure_user(user)?;
        match self.yard_handle(user) {
            Ok(handle) => {
                let yard = handle.lock().expect("yard lock poisoned");
                Ok(Some(self.view(&yard)))
            }
            Err(SanctuaryError::NoYard) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Places an item without charging for it. Returns `false` when the item
    /// was already in the yard.
    pub fn place(&self, user: UserId, kind: ItemKind, id: ItemId) -> Result<bool, SanctuaryError> {
        self.ensure_user(user)?;
        self.lookup_item(kind, id)?;
        let handle = self.yard_handle(user)?;
        let mut yard = handle.lock().expect("yard lock poisoned");
        let placed = yard.placed_mut(kind).insert(id);
        debug!(user = %user, %kind, item = %id, placed, "item placement");
        Ok(placed)
    }

    /// Buys an item at its catalog price and places it. Returns the balance
    /// left afterwards.
    pub fn purchase(
        &self,
        user: UserId,
        kind: ItemKind,
        id: ItemId,
    ) -> Result<u64, SanctuaryError> {
        self.ensure_user(user)?;
        let price = self.lookup_item(kind, id)?.price;
        let handle = self.yard_handle(user)?;
        let mut yard = handle.lock().expect("yard lock poisoned");
        if yard.placed(kind).contains(&id) {
            return Err(SanctuaryError::AlreadyPlaced { kind, id });
        }

        let remaining = {
            let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
            let account = accounts
                .get_mut(&user)
                .ok_or(SanctuaryError::UnknownUser(user))?;
            if account.pup_coins < price {
                return Err(SanctuaryError::InsufficientCoins {
                    needed: price,
                    available: account.pup_coins,
                });
            }
            account.pup_coins -= price;
            account.pup_coins
        };

        yard.placed_mut(kind).insert(id);
        info!(user = %user, %kind, item = %id, price, remaining, "purchase");
        Ok(remaining)
    }

    pub fn inventory(&self, user: UserId) -> Result<Inventory, SanctuaryError> {
        self.ensure_user(user)?;
        let handle = match self.yard_handle(user) {
            Ok(handle) => handle,
            Err(SanctuaryError::NoYard) => return Ok(Inventory::default()),
            Err(err) => return Err(err),
        };
        let yard = handle.lock().expect("yard lock poisoned");
        Ok(Inventory {
            accessories: self
                .resolve(ItemKind::Accessory, &yard.accessories)
                .into_iter()
                .map(ItemListing::from)
                .collect(),
            food: self
                .resolve(ItemKind::Food, &yard.food)
                .into_iter()
                .map(ItemListing::from)
                .collect(),
        })
    }

    /// One attraction attempt for the user's yard. Reading the yard, running
    /// the engine and recording the bird all happen under the yard lock.
    pub fn attract(&self, user: UserId) -> Result<Option<AttractionEvent>, SanctuaryError> {
        self.ensure_user(user)?;
        let handle = self.yard_handle(user)?;
        let mut yard = handle.lock().expect("yard lock poisoned");
        let attempt = yard.attempts;
        yard.attempts += 1;

        let picked = {
            let attracted = yard.attracted_ids();
            let input = AttractionInput {
                location: &yard.location,
                accessories: self.effectiveness(ItemKind::Accessory, &yard.accessories),
                food: self.effectiveness(ItemKind::Food, &yard.food),
                birds: self.catalog.birds(),
                attracted: &attracted,
            };
            let mut rng = self.rng.yard_rng(yard.id, attempt);
            self.engine.attract(&input, &mut rng).cloned()
        };

        let Some(bird) = picked else {
            debug!(user = %user, yard = %yard.id, attempt, "no bird attracted");
            return Ok(None);
        };
        let attracted_at = Utc::now();
        yard.birds.insert(bird.id, attracted_at);
        info!(user = %user, yard = %yard.id, bird = %bird.id, name = %bird.name, "bird attracted");
        Ok(Some(AttractionEvent {
            user_id: user,
            yard_id: yard.id,
            bird,
            attracted_at,
        }))
    }

    fn ensure_user(&self, user: UserId) -> Result<(), SanctuaryError> {
        let accounts = self.accounts.lock().expect("accounts lock poisoned");
        if accounts.contains_key(&user) {
            Ok(())
        } else {
            Err(SanctuaryError::UnknownUser(user))
        }
    }

    fn yard_handle(&self, user: UserId) -> Result<Arc<Mutex<Yard>>, SanctuaryError> {
        self.yards
            .read()
            .expect("yards lock poisoned")
            .get(&user)
            .cloned()
            .ok_or(SanctuaryError::NoYard)
    }

    fn lookup_item(&self, kind: ItemKind, id: ItemId) -> Result<&Item, SanctuaryError> {
        self.catalog
            .item(kind, id)
            .ok_or(SanctuaryError::UnknownItem { kind, id })
    }

    fn resolve(&self, kind: ItemKind, ids: &BTreeSet<ItemId>) -> Vec<&Item> {
        ids.iter()
            .filter_map(|id| self.catalog.item(kind, *id))
            .collect()
    }

    fn effectiveness(&self, kind: ItemKind, ids: &BTreeSet<ItemId>) -> Vec<&Effectiveness> {
        self.resolve(kind, ids)
            .into_iter()
            .map(|item| &item.effectiveness)
            .collect()
    }

    fn view(&self, yard: &Yard) -> YardView {
        YardView {
            id: yard.id,
            user_id: yard.user_id,
            location: yard.location.clone(),
            name: yard.name.clone(),
            color: yard.color.clone(),
            bonus_plus: yard.bonus_plus.clone(),
            bonus_minus: yard.bonus_minus.clone(),
            created_at: yard.created_at,
            accessories: self
                .resolve(ItemKind::Accessory, &yard.accessories)
                .into_iter()
                .cloned()
                .collect(),
            food: self
                .resolve(ItemKind::Food, &yard.food)
                .into_iter()
                .cloned()
                .collect(),
            birds: yard
                .birds
                .iter()
                .filter_map(|(id, at)| {
                    self.catalog.bird(*id).map(|bird| AttractedBird {
                        bird: bird.clone(),
                        attracted_at: *at,
                    })
                })
                .collect(),
        }
    }
}

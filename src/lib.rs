pub mod attraction;
pub mod catalog;
pub mod config;
pub mod encyclopedia;
pub mod model;
pub mod rng;
pub mod sanctuary;
pub mod web;

pub use attraction::{AttractionEngine, AttractionOutcome};
pub use catalog::Catalog;
pub use config::Config;
pub use sanctuary::{Sanctuary, SanctuaryError, SanctuarySettings};

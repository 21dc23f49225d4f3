//! Bird attraction: score every eligible bird from the yard's placed items,
//! then make one weighted random pick.

use std::collections::BTreeSet;

use rand::Rng;
use serde::Serialize;

use crate::model::{BirdId, BirdSpecies, Effectiveness};

pub const DEFAULT_MISMATCH_PENALTY: f64 = 0.7;

/// Everything the engine reads for one attempt.
pub struct AttractionInput<'a> {
    pub location: &'a str,
    pub accessories: Vec<&'a Effectiveness>,
    pub food: Vec<&'a Effectiveness>,
    pub birds: &'a [BirdSpecies],
    pub attracted: &'a BTreeSet<BirdId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub bird: &'a BirdSpecies,
    pub odds: f64,
}

/// Result of one attempt. Serializes as `{"attracted": <bird>}` or
/// `{"attracted": null}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttractionOutcome {
    pub attracted: Option<BirdSpecies>,
}

impl AttractionOutcome {
    pub fn none() -> Self {
        Self { attracted: None }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    score: f64,
    count: u32,
}

impl Tally {
    fn over(tables: &[&Effectiveness], bird: BirdId) -> Self {
        tables
            .iter()
            .filter_map(|table| table.score(bird))
            .fold(Self::default(), |acc, score| Self {
                score: acc.score + score,
                count: acc.count + 1,
            })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AttractionEngine {
    mismatch_penalty: f64,
}

impl Default for AttractionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MISMATCH_PENALTY)
    }
}

impl AttractionEngine {
    pub fn new(mismatch_penalty: f64) -> Self {
        Self { mismatch_penalty }
    }

    /// Birds that could show up, in catalog order, with their odds.
    pub fn candidates<'a>(&self, input: &AttractionInput<'a>) -> Vec<Candidate<'a>> {
        let birds: &'a [BirdSpecies] = input.birds;
        birds
            .iter()
            .filter(|bird| bird.visits(input.location))
            .filter(|bird| !input.attracted.contains(&bird.id))
            .filter_map(|bird| {
                self.odds_for(bird.id, &input.accessories, &input.food)
                    .map(|odds| Candidate { bird, odds })
            })
            .collect()
    }

    /// Average score across every placed item that mentions the bird. Only
    /// one side (accessories or food) contributing costs the mismatch
    /// penalty. `None` when no placed item mentions the bird at all.
    pub fn odds_for(
        &self,
        bird: BirdId,
        accessories: &[&Effectiveness],
        food: &[&Effectiveness],
    ) -> Option<f64> {
        let acc = Tally::over(accessories, bird);
        let fed = Tally::over(food, bird);
        let denom = acc.count + fed.count;
        if denom == 0 {
            return None;
        }
        let mut odds = (acc.score + fed.score) / f64::from(denom);
        if acc.count == 0 || fed.count == 0 {
            odds *= self.mismatch_penalty;
        }
        Some(odds)
    }

    pub fn attract<'a, R: Rng>(
        &self,
        input: &AttractionInput<'a>,
        rng: &mut R,
    ) -> Option<&'a BirdSpecies> {
        let candidates = self.candidates(input);
        let total = total_odds(&candidates);
        if !is_drawable(total) {
            tracing::debug!(
                candidates = candidates.len(),
                "no weight to draw from, nothing attracted"
            );
            return None;
        }
        let draw = rng.gen_range(0.0..total);
        let picked = select(&candidates, draw);
        tracing::debug!(
            candidates = candidates.len(),
            total_odds = total,
            draw,
            picked = ?picked.map(|bird| bird.id),
            "attraction draw"
        );
        picked
    }
}

pub fn total_odds(candidates: &[Candidate<'_>]) -> f64 {
    candidates.iter().map(|candidate| candidate.odds).sum()
}

fn is_drawable(total: f64) -> bool {
    total.is_finite() && total > 0.0
}

/// Picks the candidate whose interval `[low, low + odds)` contains `draw`,
/// walking in list order. Zero-odds candidates own an empty interval and are
/// never picked.
pub fn select<'a>(candidates: &[Candidate<'a>], draw: f64) -> Option<&'a BirdSpecies> {
    if !is_drawable(total_odds(candidates)) || draw < 0.0 {
        return None;
    }
    let mut high = 0.0;
    for candidate in candidates {
        high += candidate.odds;
        if candidate.odds > 0.0 && draw < high {
            return Some(candidate.bird);
        }
    }
    None
}

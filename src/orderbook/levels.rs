//! Price levels for one side of a book
//!
//! Uses BTreeMap so that reads come out sorted without a separate sort.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::Side;
use crate::parser::PriceLevel;

/// What an upsert did to the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Inserted,
    Updated,
    Removed,
    /// Zero quantity for a price that was not present
    Unchanged,
}

/// Price -> quantity map for one side of one instrument
///
/// A stored quantity is always positive: a zero quantity removes the level.
#[derive(Debug, Clone)]
pub struct PriceLevelSet {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl PriceLevelSet {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Insert or replace a level, or remove it when `quantity` is zero
    pub fn upsert(&mut self, price: Decimal, quantity: Decimal) -> LevelChange {
        if quantity <= Decimal::ZERO {
            return match self.levels.remove(&price) {
                Some(_) => LevelChange::Removed,
                None => LevelChange::Unchanged,
            };
        }

        match self.levels.insert(price, quantity) {
            Some(_) => LevelChange::Updated,
            None => LevelChange::Inserted,
        }
    }

    pub fn get(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    /// Best price first: highest bid, lowest ask
    fn iter_best_first(&self) -> Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> {
        match self.side {
            Side::Bid => Box::new(self.levels.iter().rev()),
            Side::Ask => Box::new(self.levels.iter()),
        }
    }

    /// Copy of every level, best price first
    pub fn snapshot(&self) -> Vec<PriceLevel> {
        self.top(self.levels.len())
    }

    /// Copy of the best `n` levels
    pub fn top(&self, n: usize) -> Vec<PriceLevel> {
        self.iter_best_first()
            .take(n)
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }

    pub fn best(&self) -> Option<PriceLevel> {
        self.iter_best_first()
            .next()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

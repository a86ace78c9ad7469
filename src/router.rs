//! Venue routing: pick the venue whose model predicts the best price
//! improvement for a prospective order.

use std::path::Path;

use crate::core::{Result, Side};
use crate::model::{ModelSet, NUM_FEATURES};

/// Order and quote attributes known at routing time.
/// The symbol is carried for reporting; the models do not use it.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
    pub limit_price: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
}

impl OrderSnapshot {
    fn features(&self) -> [f64; NUM_FEATURES] {
        let side = match Side::from_order_entry(&self.side) {
            Side::Buy => 1.0,
            Side::Sell => 0.0,
        };
        [
            side,
            self.quantity,
            self.limit_price,
            self.bid_price,
            self.ask_price,
            self.bid_size.filter(|v| v.is_finite()).unwrap_or(0.0),
            self.ask_size.filter(|v| v.is_finite()).unwrap_or(0.0),
        ]
    }
}

/// The routing decision: a venue and its predicted improvement.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueChoice {
    pub venue: String,
    pub predicted_improvement: f64,
}

/// Explicitly constructed model cache, owned by the caller and populated
/// once at startup. Loading fails with a distinguishable error when the
/// backing file is absent; there is no lazy fallback.
#[derive(Debug)]
pub struct ModelCache {
    set: ModelSet,
}

impl ModelCache {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            set: ModelSet::load(path)?,
        })
    }

    pub fn from_set(set: ModelSet) -> Self {
        Self { set }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

/// Predict the improvement under every venue's model and return the best.
/// None when the cache holds no models or no model produces a finite
/// prediction.
pub fn best_venue(cache: &ModelCache, order: &OrderSnapshot) -> Option<VenueChoice> {
    let features = order.features();
    cache
        .set
        .models
        .iter()
        .map(|(venue, model)| (venue, model.predict(&features)))
        .filter(|(_, prediction)| prediction.is_finite())
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(venue, prediction)| VenueChoice {
            venue: venue.clone(),
            predicted_improvement: prediction,
        })
}

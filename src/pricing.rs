// 💲 Price Resolver - plate ↔ price-list join
//
// A price entry is priced per set of sheets; a plate gets the per-unit price
// of the entry with exactly the same (ancho, alto). Missing matches and empty
// sets are normal data, never errors.

use crate::db::{Plate, PriceEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ============================================================================
// DIMENSION KEY
// ============================================================================

/// (width, height) compared by exact f64 equality, no tolerance.
///
/// Stored as bit patterns so it can live in a HashMap. 50 and 50.0 are the
/// same f64 and therefore the same key; 50.0 and 50.0000001 are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionKey {
    width_bits: u64,
    height_bits: u64,
}

impl DimensionKey {
    pub fn new(width: f64, height: f64) -> Self {
        DimensionKey {
            width_bits: width.to_bits(),
            height_bits: height.to_bits(),
        }
    }
}

// ============================================================================
// UNIT PRICE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPrice {
    #[serde(rename = "costo")]
    pub unit_price: f64,
    #[serde(rename = "moneda")]
    pub currency: String,
}

impl UnitPrice {
    /// set_price / sheets_per_set, or 0 when the set has no sheets
    pub fn from_entry(entry: &PriceEntry) -> Self {
        let unit_price = if entry.sheets_per_set > 0 {
            entry.set_price / entry.sheets_per_set as f64
        } else {
            0.0
        };

        UnitPrice {
            unit_price,
            currency: entry.currency.clone(),
        }
    }
}

/// A plate with its resolved price; `costo`/`moneda` are null when unmatched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedPlate {
    #[serde(flatten)]
    pub plate: Plate,
    #[serde(rename = "costo")]
    pub unit_price: Option<f64>,
    #[serde(rename = "moneda")]
    pub currency: Option<String>,
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct PriceResolver {
    prices: HashMap<DimensionKey, UnitPrice>,
}

impl PriceResolver {
    /// Build the lookup in one pass over `entries`.
    ///
    /// Entries sharing a key overwrite each other: the last one wins.
    pub fn from_entries(entries: &[PriceEntry]) -> Self {
        let mut prices = HashMap::with_capacity(entries.len());

        for entry in entries {
            let key = DimensionKey::new(entry.width, entry.height);
            if let Some(previous) = prices.insert(key, UnitPrice::from_entry(entry)) {
                warn!(
                    ancho = entry.width,
                    alto = entry.height,
                    replaced_currency = %previous.currency,
                    costo_id = entry.id,
                    "duplicate price entry for dimensions, keeping the later one"
                );
            }
        }

        PriceResolver { prices }
    }

    pub fn resolve(&self, plate: &Plate) -> Option<&UnitPrice> {
        self.prices.get(&DimensionKey::new(plate.width, plate.height))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Attach prices to plates. Every plate comes back exactly once, in order.
    pub fn price_plates(&self, plates: Vec<Plate>) -> Vec<PricedPlate> {
        plates
            .into_iter()
            .map(|plate| {
                let (unit_price, currency) = match self.resolve(&plate) {
                    Some(price) => (Some(price.unit_price), Some(price.currency.clone())),
                    None => (None, None),
                };

                PricedPlate {
                    plate,
                    unit_price,
                    currency,
                }
            })
            .collect()
    }
}

/// Convenience wrapper: build the resolver and price the plates in one call
pub fn price_plates(entries: &[PriceEntry], plates: Vec<Plate>) -> Vec<PricedPlate> {
    PriceResolver::from_entries(entries).price_plates(plates)
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prices read from one successful extraction.
///
/// Either both prices parsed or the reading as a whole is `Unparsed`; a
/// half-valid reading is never produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PriceReading {
    Valid { fuel_price: u32, co2_price: u32 },
    Unparsed { raw_fuel: String, raw_co2: String },
}

impl PriceReading {
    pub fn parse(raw_fuel: &str, raw_co2: &str) -> Self {
        match (parse_price(raw_fuel), parse_price(raw_co2)) {
            (Some(fuel_price), Some(co2_price)) => {
                tracing::debug!(fuel_price, co2_price, "parsed prices");
                PriceReading::Valid { fuel_price, co2_price }
            }
            _ => {
                tracing::warn!(raw_fuel, raw_co2, "failed to parse prices");
                PriceReading::Unparsed {
                    raw_fuel: raw_fuel.to_string(),
                    raw_co2: raw_co2.to_string(),
                }
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, PriceReading::Valid { .. })
    }

    pub fn fuel_price(&self) -> Option<u32> {
        match self {
            PriceReading::Valid { fuel_price, .. } => Some(*fuel_price),
            PriceReading::Unparsed { .. } => None,
        }
    }

    pub fn co2_price(&self) -> Option<u32> {
        match self {
            PriceReading::Valid { co2_price, .. } => Some(*co2_price),
            PriceReading::Unparsed { .. } => None,
        }
    }
}

impl fmt::Display for PriceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceReading::Valid { fuel_price, co2_price } => {
                write!(f, "fuel={} co2={}", fuel_price, co2_price)
            }
            PriceReading::Unparsed { raw_fuel, raw_co2 } => {
                write!(f, "unparsed (fuel={:?} co2={:?})", raw_fuel, raw_co2)
            }
        }
    }
}

/// Strips currency symbols, thousands separators and whitespace, then reads a
/// non-negative integer. Anything else left over makes the text invalid.
fn parse_price(raw: &str) -> Option<u32> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<u32>().ok()
}

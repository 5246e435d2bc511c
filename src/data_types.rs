/*!
 * Data type definitions for pharmacy claims analytics
 *
 * Input records (pharmacies, claims, reverts) as they arrive from the loader,
 * the enriched working view shared by the analyzers, and the three output
 * tables.
 */

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};

/// A pharmacy and the chain it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pharmacy {
    /// Pharmacy identifier; some source files omit this column
    #[serde(default)]
    pub id: String,
    /// Retail chain or pharmacy group
    pub chain: String,
    /// National Provider Identifier, the join key to claims
    pub npi: String,
}

impl Pharmacy {
    pub fn new(id: impl Into<String>, chain: impl Into<String>, npi: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chain: chain.into(),
            npi: npi.into(),
        }
    }
}

/// A single dispensing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub npi: String,
    /// National Drug Code
    pub ndc: String,
    pub price: f64,
    /// Dispensed quantity; zero or negative values occur in real feeds
    pub quantity: f64,
    pub timestamp: String,
}

impl Claim {
    pub fn new(
        id: impl Into<String>,
        npi: impl Into<String>,
        ndc: impl Into<String>,
        price: f64,
        quantity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            npi: npi.into(),
            ndc: ndc.into(),
            price,
            quantity,
            timestamp: String::new(),
        }
    }

    /// Set the event timestamp
    pub fn at(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }
}

/// A cancellation of a previously recorded claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revert {
    pub id: String,
    pub claim_id: String,
    pub timestamp: String,
}

impl Revert {
    pub fn new(id: impl Into<String>, claim_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claim_id: claim_id.into(),
            timestamp: String::new(),
        }
    }
}

/// Read-only view of a claim with its revert status and unit price
///
/// Borrowed from the loaded claims so enrichment never copies or mutates
/// the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichedClaim<'a> {
    pub claim: &'a Claim,
    pub is_reverted: bool,
    /// `price / quantity` for non-reverted claims with a positive quantity
    pub unit_price: Option<f64>,
}

impl<'a> EnrichedClaim<'a> {
    pub fn npi(&self) -> &'a str {
        &self.claim.npi
    }

    pub fn ndc(&self) -> &'a str {
        &self.claim.ndc
    }

    /// Whether this claim contributes to price aggregates
    pub fn is_priced(&self) -> bool {
        self.unit_price.is_some()
    }
}

/// Fill and price metrics for one pharmacy and drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub npi: String,
    pub ndc: String,
    /// All claims, reverted or not
    pub fills: u64,
    pub reverted: u64,
    pub avg_price: f64,
    pub total_price: f64,
}

/// A chain and its average unit price for a drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPrice {
    pub name: String,
    pub avg_price: f64,
}

/// The cheapest chains for a drug, rank 1 first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRankingEntry {
    pub ndc: String,
    pub chain: Vec<ChainPrice>,
}

/// The most prescribed quantities for a drug, most frequent first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityRankingEntry {
    pub ndc: String,
    #[serde(serialize_with = "serialize_quantities")]
    pub most_prescribed_quantity: Vec<f64>,
}

/// Largest magnitude below which every whole f64 converts exactly to i64
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Write whole quantities as integers (`30`) and the rest as decimals (`2.5`)
fn serialize_quantities<S: Serializer>(quantities: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(quantities.len()))?;
    for &quantity in quantities {
        if quantity.fract() == 0.0 && quantity.abs() <= MAX_EXACT_INTEGER {
            seq.serialize_element(&(quantity as i64))?;
        } else {
            seq.serialize_element(&quantity)?;
        }
    }
    seq.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pharmacy_csv_row_without_id() {
        let data = "chain,npi\nhealth,1234567890\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let pharmacy: Pharmacy = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(pharmacy, Pharmacy::new("", "health", "1234567890"));
    }

    #[test]
    fn test_claim_accepts_integer_quantity() {
        let json = r#"{"id":"c1","npi":"1","ndc":"d1","price":10.5,"quantity":3,"timestamp":"2024-01-01T00:00:00"}"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        assert_eq!(claim.quantity, 3.0);
        assert_eq!(claim.timestamp, "2024-01-01T00:00:00");
    }

    #[test]
    fn test_output_field_names() {
        let entry = ChainRankingEntry {
            ndc: "d1".into(),
            chain: vec![ChainPrice { name: "health".into(), avg_price: 1.5 }],
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["chain"][0]["name"], "health");

        let entry = QuantityRankingEntry { ndc: "d1".into(), most_prescribed_quantity: vec![30.0] };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["most_prescribed_quantity"][0], 30.0);
    }

    #[test]
    fn test_whole_quantities_written_as_integers() {
        let entry = QuantityRankingEntry {
            ndc: "d1".into(),
            most_prescribed_quantity: vec![30.0, 2.5, 0.0, -1.0],
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"ndc":"d1","most_prescribed_quantity":[30,2.5,0,-1]}"#);

        let parsed: QuantityRankingEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}

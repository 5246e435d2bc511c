/*!
 * Core metrics aggregation
 *
 * Groups enriched claims by pharmacy and drug and produces fill counts,
 * revert counts, average unit price and total price per group.
 */

use std::collections::HashMap;

use tracing::debug;

use crate::data_types::{EnrichedClaim, MetricRecord};
use crate::error::{Analyzer, ClaimsError};
use crate::Result;

/// Round a price to a fixed number of decimal places
///
/// Values too large to scale by `10^precision` are already coarser than the
/// requested precision and are returned unchanged.
pub fn round_price(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(i32::MAX as u32) as i32);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    let rounded = scaled.round() / factor;
    if rounded.is_finite() { rounded } else { value }
}

/// Running totals for one `(npi, ndc)` group
#[derive(Debug, Default, Clone, Copy)]
struct GroupTotals {
    fills: u64,
    reverted: u64,
    priced: u64,
    unit_price_sum: f64,
    price_sum: f64,
}

impl GroupTotals {
    fn add(&mut self, claim: &EnrichedClaim<'_>) {
        self.fills += 1;
        if claim.is_reverted {
            self.reverted += 1;
        }
        if let Some(unit_price) = claim.unit_price {
            self.priced += 1;
            self.unit_price_sum += unit_price;
            self.price_sum += claim.claim.price;
        }
    }

    /// Mean unit price and total price; both zero for a group with no priced claims
    fn prices(&self) -> (f64, f64) {
        if self.priced == 0 {
            return (0.0, 0.0);
        }
        (self.unit_price_sum / self.priced as f64, self.price_sum)
    }
}

/// Compute fill and price metrics per `(npi, ndc)`.
///
/// Returns `Ok(None)` when there are no claims to aggregate. Rows are sorted
/// by `npi`, then `ndc`.
pub fn compute_core_metrics(
    claims: &[EnrichedClaim<'_>],
    precision: u32,
) -> Result<Option<Vec<MetricRecord>>> {
    if claims.is_empty() {
        return Ok(None);
    }

    let mut groups: HashMap<(&str, &str), GroupTotals> = HashMap::new();
    for claim in claims {
        groups.entry((claim.npi(), claim.ndc()))
            .or_default()
            .add(claim);
    }

    let mut keys: Vec<_> = groups.keys().copied().collect();
    keys.sort_unstable();

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let totals = groups[&key];
        let (avg_price, total_price) = totals.prices();
        let avg_price = round_price(avg_price, precision);
        let total_price = round_price(total_price, precision);

        if !avg_price.is_finite() || !total_price.is_finite() {
            return Err(ClaimsError::Computation {
                analyzer: Analyzer::CoreMetrics,
                message: format!("non-finite price aggregate (avg {avg_price}, total {total_price})"),
                group: Some(format!("npi={} ndc={}", key.0, key.1)),
            });
        }

        records.push(MetricRecord {
            npi: key.0.to_string(),
            ndc: key.1.to_string(),
            fills: totals.fills,
            reverted: totals.reverted,
            avg_price,
            total_price,
        });
    }

    debug!(groups = records.len(), claims = claims.len(), "aggregated core metrics");
    Ok(Some(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{Claim, Revert};
    use crate::enrich::enrich_claims;
    use crate::revert::RevertIndex;

    fn run(claims: &[Claim], reverts: &[Revert]) -> Vec<MetricRecord> {
        let index = RevertIndex::from_reverts(reverts);
        let enriched = enrich_claims(claims, &index);
        compute_core_metrics(&enriched, 2).unwrap().unwrap()
    }

    fn two_claims() -> Vec<Claim> {
        vec![
            Claim::new("c1", "1", "d1", 10.0, 2.0),
            Claim::new("c2", "1", "d1", 20.0, 4.0),
        ]
    }

    #[test]
    fn test_no_reverts() {
        let metrics = run(&two_claims(), &[]);
        assert_eq!(metrics, vec![MetricRecord {
            npi: "1".into(),
            ndc: "d1".into(),
            fills: 2,
            reverted: 0,
            avg_price: 5.0,
            total_price: 30.0,
        }]);
    }

    #[test]
    fn test_reverted_claim_excluded_from_prices() {
        let metrics = run(&two_claims(), &[Revert::new("r1", "c2")]);
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!((m.fills, m.reverted), (2, 1));
        assert_eq!(m.avg_price, 5.0);
        assert_eq!(m.total_price, 10.0);
    }

    #[test]
    fn test_zero_quantity_counts_as_fill_only() {
        let claims = vec![
            Claim::new("c1", "1", "d1", 10.0, 2.0),
            Claim::new("c2", "1", "d1", 50.0, 0.0),
        ];
        let m = &run(&claims, &[])[0];
        assert_eq!(m.fills, 2);
        assert_eq!(m.reverted, 0);
        assert_eq!(m.avg_price, 5.0);
        assert_eq!(m.total_price, 10.0);
    }

    #[test]
    fn test_unpriced_group_kept_with_zero_prices() {
        let claims = vec![
            Claim::new("c1", "1", "d1", 10.0, 2.0),
            Claim::new("c2", "2", "d1", 10.0, -1.0),
            Claim::new("c3", "3", "d1", 10.0, 1.0),
        ];
        let metrics = run(&claims, &[Revert::new("r1", "c3")]);
        assert_eq!(metrics.len(), 3);
        for m in &metrics[1..] {
            assert_eq!(m.fills, 1);
            assert_eq!(m.avg_price, 0.0);
            assert_eq!(m.total_price, 0.0);
        }
        assert_eq!(metrics[2].reverted, 1);
    }

    #[test]
    fn test_rounding_and_sort_order() {
        let claims = vec![
            Claim::new("c1", "2", "d2", 10.0, 3.0),
            Claim::new("c2", "1", "d9", 1.0, 1.0),
            Claim::new("c3", "1", "d1", 1.0, 1.0),
        ];
        let metrics = run(&claims, &[]);
        let keys: Vec<_> = metrics.iter().map(|m| (m.npi.as_str(), m.ndc.as_str())).collect();
        assert_eq!(keys, vec![("1", "d1"), ("1", "d9"), ("2", "d2")]);
        assert_eq!(metrics[2].avg_price, 3.33);
    }

    #[test]
    fn test_empty_input_computes_nothing() {
        assert_eq!(compute_core_metrics(&[], 2).unwrap(), None);
    }

    #[test]
    fn test_non_finite_aggregate_fails() {
        let claims = vec![
            Claim::new("c1", "1", "d1", f64::MAX, 1.0),
            Claim::new("c2", "1", "d1", f64::MAX, 1.0),
        ];
        let index = RevertIndex::default();
        let enriched = enrich_claims(&claims, &index);
        let err = compute_core_metrics(&enriched, 2).unwrap_err();
        assert_eq!(err.analyzer(), Some(Analyzer::CoreMetrics));
    }

    #[test]
    fn test_round_price() {
        assert_eq!(round_price(2.345678, 2), 2.35);
        assert_eq!(round_price(2.5, 0), 3.0);
        assert_eq!(round_price(0.0, 2), 0.0);
    }

    #[test]
    fn test_round_price_keeps_unscalable_values() {
        assert_eq!(round_price(1e307, 2), 1e307);
        assert_eq!(round_price(10.0 / 3.0, 400), 10.0 / 3.0);
        assert_eq!(round_price(f64::MAX, u32::MAX), f64::MAX);
    }

    #[test]
    fn test_huge_price_stays_finite() {
        let claims = vec![Claim::new("c1", "1", "d1", 1e307, 1.0)];
        let m = &run(&claims, &[])[0];
        assert_eq!(m.avg_price, 1e307);
        assert_eq!(m.total_price, 1e307);

        let json = serde_json::to_string(m).unwrap();
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_oversized_precision_stays_finite() {
        let claims = vec![Claim::new("c1", "1", "d1", 10.0, 3.0)];
        let index = RevertIndex::default();
        let enriched = enrich_claims(&claims, &index);
        let metrics = compute_core_metrics(&enriched, 400).unwrap().unwrap();
        assert_eq!(metrics[0].avg_price, 10.0 / 3.0);
        assert_eq!(metrics[0].total_price, 10.0);
    }
}

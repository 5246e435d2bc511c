/*!
 * Per-drug ranking analyzers
 *
 * Two windowed rankings over the enriched claim set:
 *
 * - **Chain ranking**: the chains with the lowest average unit price for
 *   each drug. Ties on price are broken by chain name, ascending.
 * - **Quantity ranking**: the most frequently dispensed quantities for each
 *   drug. Ties on frequency are broken by quantity value, ascending.
 *
 * Both analyzers partition the claims by `ndc` and reduce each partition in
 * input order, so averages are bit-for-bit reproducible whether partitions
 * run on one thread or many. Output is sorted by `ndc`.
 */

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::data_types::*;
use crate::error::{Analyzer, ClaimsError};
use crate::Result;

/// Keep the `k` smallest items under `cmp`, sorted.
///
/// Selects before sorting so only the retained items are fully ordered.
pub fn top_k_by<T, F>(mut items: Vec<T>, k: usize, mut cmp: F) -> Vec<T>
where
    F: FnMut(&T, &T) -> Ordering,
{
    if k == 0 {
        return Vec::new();
    }
    if items.len() > k {
        items.select_nth_unstable_by(k - 1, &mut cmp);
        items.truncate(k);
    }
    items.sort_by(cmp);
    items
}

/// Group values extracted from claims by drug, keeping input order inside each group
fn partition_by_ndc<'a, T, F>(claims: &[EnrichedClaim<'a>], mut extract: F) -> Vec<(&'a str, Vec<T>)>
where
    F: FnMut(&EnrichedClaim<'a>) -> Option<T>,
{
    let mut partitions: BTreeMap<&'a str, Vec<T>> = BTreeMap::new();
    for claim in claims {
        if let Some(value) = extract(claim) {
            partitions.entry(claim.ndc()).or_default().push(value);
        }
    }
    partitions.into_iter().collect()
}

/// Reduce every partition, in parallel when enabled. Result order follows partition order.
fn reduce_partitions<'a, T, R, F>(partitions: Vec<(&'a str, Vec<T>)>, reduce: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(&'a str, Vec<T>) -> Result<R> + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        partitions.into_par_iter()
            .map(|(ndc, values)| reduce(ndc, values))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        partitions.into_iter()
            .map(|(ndc, values)| reduce(ndc, values))
            .collect()
    }
}

/// Rank chains by ascending average unit price for each drug.
///
/// Only claims with a defined unit price take part. Claims whose `npi` has
/// no pharmacy are left out of this analysis. An empty pharmacy collection
/// means the join is unavailable and is reported as an error. Averages are
/// emitted unrounded.
pub fn rank_chains(
    claims: &[EnrichedClaim<'_>],
    pharmacies: &[Pharmacy],
    limit: usize,
) -> Result<Option<Vec<ChainRankingEntry>>> {
    if claims.is_empty() {
        return Ok(None);
    }
    if pharmacies.is_empty() {
        return Err(ClaimsError::MissingReference {
            analyzer: Analyzer::ChainRanking,
            message: "no pharmacy records to resolve chains from".to_string(),
        });
    }

    let chains = chain_lookup(pharmacies);

    let mut unmatched = 0usize;
    let partitions = partition_by_ndc(claims, |claim| {
        let unit_price = claim.unit_price?;
        match chains.get(claim.npi()) {
            Some(chain) => Some((*chain, unit_price)),
            None => {
                unmatched += 1;
                None
            }
        }
    });
    if unmatched > 0 {
        debug!(unmatched, "claims without a pharmacy left out of chain ranking");
    }

    let entries = reduce_partitions(partitions, |ndc, rows| {
        let mut sums: HashMap<&str, (f64, u64)> = HashMap::new();
        for (chain, unit_price) in rows {
            let slot = sums.entry(chain).or_insert((0.0, 0));
            slot.0 += unit_price;
            slot.1 += 1;
        }

        let mut averages = Vec::with_capacity(sums.len());
        for (chain, (sum, count)) in sums {
            let avg = sum / count as f64;
            if !avg.is_finite() {
                return Err(ClaimsError::Computation {
                    analyzer: Analyzer::ChainRanking,
                    message: format!("non-finite average unit price {avg}"),
                    group: Some(format!("ndc={ndc} chain={chain}")),
                });
            }
            averages.push((chain, avg));
        }

        let ranked = top_k_by(averages, limit, |a, b| {
            a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0))
        });

        Ok(ChainRankingEntry {
            ndc: ndc.to_string(),
            chain: ranked.into_iter()
                .map(|(name, avg)| ChainPrice {
                    name: name.to_string(),
                    avg_price: avg,
                })
                .collect(),
        })
    })?;

    debug!(drugs = entries.len(), "ranked chains");
    Ok(Some(entries))
}

/// Map each npi to its chain; the first pharmacy record for an npi wins
fn chain_lookup(pharmacies: &[Pharmacy]) -> HashMap<&str, &str> {
    let mut chains: HashMap<&str, &str> = HashMap::with_capacity(pharmacies.len());
    for pharmacy in pharmacies {
        match chains.get(pharmacy.npi.as_str()) {
            Some(existing) if *existing != pharmacy.chain => {
                warn!(
                    npi = %pharmacy.npi,
                    kept = %existing,
                    ignored = %pharmacy.chain,
                    "npi listed under more than one chain"
                );
            }
            Some(_) => {}
            None => {
                chains.insert(&pharmacy.npi, &pharmacy.chain);
            }
        }
    }
    chains
}

/// Rank dispensed quantities by descending frequency for each drug.
///
/// Every non-reverted claim takes part, including those with a zero or
/// negative quantity.
pub fn rank_quantities(
    claims: &[EnrichedClaim<'_>],
    limit: usize,
) -> Result<Option<Vec<QuantityRankingEntry>>> {
    if claims.is_empty() {
        return Ok(None);
    }

    let partitions = partition_by_ndc(claims, |claim| {
        (!claim.is_reverted).then_some(claim.claim.quantity)
    });

    let entries = reduce_partitions(partitions, |ndc, quantities| {
        // keyed by bit pattern; -0.0 folds into 0.0
        let mut counts: HashMap<u64, (f64, u64)> = HashMap::new();
        for quantity in quantities {
            if !quantity.is_finite() {
                return Err(ClaimsError::Computation {
                    analyzer: Analyzer::QuantityRanking,
                    message: format!("non-finite quantity {quantity}"),
                    group: Some(format!("ndc={ndc}")),
                });
            }
            let quantity = if quantity == 0.0 { 0.0 } else { quantity };
            counts.entry(quantity.to_bits())
                .or_insert((quantity, 0))
                .1 += 1;
        }

        let ranked = top_k_by(counts.into_values().collect(), limit, |a, b| {
            b.1.cmp(&a.1).then_with(|| a.0.total_cmp(&b.0))
        });

        Ok(QuantityRankingEntry {
            ndc: ndc.to_string(),
            most_prescribed_quantity: ranked.into_iter().map(|(q, _)| q).collect(),
        })
    })?;

    debug!(drugs = entries.len(), "ranked quantities");
    Ok(Some(entries))
}

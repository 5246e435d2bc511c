/*!
 * Claim enrichment
 *
 * Tags every claim with its revert status and derives the unit price that
 * all price-based aggregates share. Runs once per batch; the analyzers only
 * ever see the resulting read-only slice.
 */

use crate::data_types::{Claim, EnrichedClaim};
use crate::revert::RevertIndex;

/// Unit price of a claim, or `None` when it must not enter price aggregates
pub fn unit_price(claim: &Claim, is_reverted: bool) -> Option<f64> {
    if is_reverted || claim.quantity <= 0.0 {
        return None;
    }
    Some(claim.price / claim.quantity)
}

/// Enrich a single claim against the revert index
pub fn enrich_claim<'a>(claim: &'a Claim, reverts: &RevertIndex) -> EnrichedClaim<'a> {
    let is_reverted = reverts.contains(&claim.id);
    EnrichedClaim {
        claim,
        is_reverted,
        unit_price: unit_price(claim, is_reverted),
    }
}

/// Enrich every claim, preserving input order
pub fn enrich_claims<'a>(claims: &'a [Claim], reverts: &RevertIndex) -> Vec<EnrichedClaim<'a>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        claims.par_iter()
            .map(|claim| enrich_claim(claim, reverts))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        claims.iter()
            .map(|claim| enrich_claim(claim, reverts))
            .collect()
    }
}

/*!
 * Metrics and ranking engine
 *
 * Builds the revert index, enriches the claims once, then runs the three
 * independent analyzers over the shared read-only enriched set:
 *
 * 1. core metrics per pharmacy and drug
 * 2. cheapest chains per drug
 * 3. most common quantities per drug
 *
 * Each analyzer reports its own outcome; a failure in one never prevents
 * the others from completing.
 */

use std::collections::HashSet;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::{
    Result, ClaimsError,
    config::AnalyticsConfig,
    constants::{DEFAULT_PRICE_PRECISION, DEFAULT_TOP_CHAINS, DEFAULT_TOP_QUANTITIES},
    data_types::*,
    enrich::enrich_claims,
    error::Analyzer,
    metrics::compute_core_metrics,
    ranking::{rank_chains, rank_quantities},
    revert::RevertIndex,
};

/// Tunables for a single engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Chains kept per drug
    pub top_chains_limit: usize,
    /// Quantities kept per drug
    pub top_quantities_limit: usize,
    /// Decimal places for emitted prices
    pub price_precision: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            top_chains_limit: DEFAULT_TOP_CHAINS,
            top_quantities_limit: DEFAULT_TOP_QUANTITIES,
            price_precision: DEFAULT_PRICE_PRECISION,
        }
    }
}

impl From<&AnalyticsConfig> for EngineOptions {
    fn from(config: &AnalyticsConfig) -> Self {
        Self {
            top_chains_limit: config.top_chains_limit,
            top_quantities_limit: config.top_quantities_limit,
            price_precision: config.price_precision,
        }
    }
}

/// Engine over one complete batch of claims
pub struct ClaimsAnalytics<'a> {
    claims: &'a [Claim],
    reverts: &'a [Revert],
    pharmacies: &'a [Pharmacy],
    options: EngineOptions,
}

impl<'a> ClaimsAnalytics<'a> {
    /// Create a new engine over a claim batch
    pub fn new(claims: &'a [Claim]) -> Self {
        Self {
            claims,
            reverts: &[],
            pharmacies: &[],
            options: EngineOptions::default(),
        }
    }

    /// Add the revert events for this batch
    pub fn with_reverts(mut self, reverts: &'a [Revert]) -> Self {
        self.reverts = reverts;
        self
    }

    /// Add pharmacy reference data for the chain ranking
    pub fn with_pharmacies(mut self, pharmacies: &'a [Pharmacy]) -> Self {
        self.pharmacies = pharmacies;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Run all three analyzers and collect their outcomes
    pub fn run(&self) -> AnalyticsReport {
        if self.claims.is_empty() {
            warn!("no valid claims found to process");
        }

        let started = Instant::now();
        let index = RevertIndex::from_reverts(self.reverts);
        let enriched = enrich_claims(self.claims, &index);
        info!(
            claims = enriched.len(),
            reverted = enriched.iter().filter(|c| c.is_reverted).count(),
            priced = enriched.iter().filter(|c| c.is_priced()).count(),
            "enriched claims"
        );

        let options = self.options;
        let core = || compute_core_metrics(&enriched, options.price_precision);
        let chains = || rank_chains(&enriched, self.pharmacies, options.top_chains_limit);
        let quantities = || rank_quantities(&enriched, options.top_quantities_limit);

        #[cfg(feature = "parallel")]
        let (metrics, (top_chains, common_quantities)) = rayon::join(core, || rayon::join(chains, quantities));

        #[cfg(not(feature = "parallel"))]
        let (metrics, top_chains, common_quantities) = (core(), chains(), quantities());

        let report = AnalyticsReport { metrics, top_chains, common_quantities };

        for err in report.failures() {
            error!(
                analyzer = %err.analyzer().map(|a| a.to_string()).unwrap_or_default(),
                error = %err,
                claims = self.claims.len(),
                pharmacies = self.pharmacies.len(),
                "analyzer failed"
            );
        }
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "analytics finished");

        report
    }

    /// Summary counts for the batch
    pub fn batch_stats(&self) -> BatchStats {
        let index = RevertIndex::from_reverts(self.reverts);

        let reverted_claims = self.claims.iter()
            .filter(|c| index.contains(&c.id))
            .count();
        let degenerate_quantities = self.claims.iter()
            .filter(|c| c.quantity <= 0.0)
            .count();
        let unique_pharmacies = self.claims.iter()
            .map(|c| c.npi.as_str())
            .collect::<HashSet<_>>()
            .len();
        let unique_drugs = self.claims.iter()
            .map(|c| c.ndc.as_str())
            .collect::<HashSet<_>>()
            .len();
        let unique_chains = self.pharmacies.iter()
            .map(|p| p.chain.as_str())
            .collect::<HashSet<_>>()
            .len();

        BatchStats {
            total_claims: self.claims.len(),
            total_reverts: self.reverts.len(),
            reverted_claims,
            degenerate_quantities,
            total_pharmacies: self.pharmacies.len(),
            unique_pharmacies,
            unique_drugs,
            unique_chains,
        }
    }
}

/// Outcome of each analyzer for one batch
///
/// `Ok(None)` means the analyzer had nothing to compute.
#[derive(Debug)]
pub struct AnalyticsReport {
    pub metrics: Result<Option<Vec<MetricRecord>>>,
    pub top_chains: Result<Option<Vec<ChainRankingEntry>>>,
    pub common_quantities: Result<Option<Vec<QuantityRankingEntry>>>,
}

impl AnalyticsReport {
    /// Errors reported by any analyzer
    pub fn failures(&self) -> Vec<&ClaimsError> {
        [
            self.metrics.as_ref().err(),
            self.top_chains.as_ref().err(),
            self.common_quantities.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// Outcome of one analyzer, as a status label
    pub fn status(&self, analyzer: Analyzer) -> AnalyzerStatus {
        fn status_of<T>(result: &Result<Option<T>>) -> AnalyzerStatus {
            match result {
                Ok(Some(_)) => AnalyzerStatus::Computed,
                Ok(None) => AnalyzerStatus::NothingToCompute,
                Err(_) => AnalyzerStatus::Failed,
            }
        }

        match analyzer {
            Analyzer::CoreMetrics => status_of(&self.metrics),
            Analyzer::ChainRanking => status_of(&self.top_chains),
            Analyzer::QuantityRanking => status_of(&self.common_quantities),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerStatus {
    Computed,
    NothingToCompute,
    Failed,
}

/// Statistics about a claims batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub total_claims: usize,
    pub total_reverts: usize,
    /// Claims with at least one revert
    pub reverted_claims: usize,
    /// Claims with a zero or negative quantity
    pub degenerate_quantities: usize,
    pub total_pharmacies: usize,
    /// Distinct npis among claims
    pub unique_pharmacies: usize,
    pub unique_drugs: usize,
    pub unique_chains: usize,
}

impl BatchStats {
    /// Print formatted statistics
    pub fn print_summary(&self) {
        println!("=== Claims Batch Statistics ===");
        println!("Total Claims: {}", self.total_claims);
        println!("  Reverted Claims: {}", self.reverted_claims);
        println!("  Zero/Negative Quantity Claims: {}", self.degenerate_quantities);
        println!("Total Reverts: {}", self.total_reverts);
        println!("Pharmacies: {} ({} with claims)", self.total_pharmacies, self.unique_pharmacies);
        println!("Unique Chains: {}", self.unique_chains);
        println!("Unique Drugs: {}", self.unique_drugs);

        if self.total_claims > 0 {
            let reverted_percent = (self.reverted_claims as f64 / self.total_claims as f64) * 100.0;
            println!("Reverted Claim Percentage: {:.1}%", reverted_percent);
        }
    }
}

/*!
 * # Pharmacy Claims Analytics Library
 *
 * Batch analytics over pharmacy prescription-fill events. A batch is made of
 * three collections: pharmacies (from a CSV file), claims and reverts (from
 * JSON files). The engine marks reverted claims, derives unit prices and
 * computes three independent output tables.
 *
 * ## Features
 *
 * - **Core Metrics**: fills, reverts, average unit price and total price per pharmacy and drug
 * - **Chain Ranking**: the cheapest chains for each drug by average unit price
 * - **Quantity Ranking**: the most commonly dispensed quantities for each drug
 * - **Isolated Failures**: each analyzer reports its own outcome
 * - **Deterministic Output**: every table is sorted by its key
 * - **Parallel Processing**: file loading and per-drug reductions run on rayon when enabled
 *
 * ## Quick Start
 *
 * ```no_run
 * use rxclaims::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let config = AnalyticsConfig::default();
 * let dataset = ClaimsDataset::load("data/pharmacies", "data/claims", "data/reverts", &config)?;
 *
 * let report = dataset.analytics(EngineOptions::from(&config)).run();
 * let summary = JsonExporter::from_config(&config).export(&report, &config)?;
 *
 * println!("Wrote {} artifacts", summary.written.len());
 * # Ok(())
 * # }
 * ```
 *
 * ## Working In Memory
 *
 * ```
 * use rxclaims::prelude::*;
 *
 * let claims = vec![
 *     Claim::new("c1", "1", "00002323401", 10.0, 2.0),
 *     Claim::new("c2", "1", "00002323401", 20.0, 4.0),
 * ];
 * let reverts = vec![Revert::new("r1", "c2")];
 * let pharmacies = vec![Pharmacy::new("p1", "health", "1")];
 *
 * let report = ClaimsAnalytics::new(&claims)
 *     .with_reverts(&reverts)
 *     .with_pharmacies(&pharmacies)
 *     .run();
 *
 * let metrics = report.metrics.unwrap().unwrap();
 * assert_eq!(metrics[0].fills, 2);
 * assert_eq!(metrics[0].reverted, 1);
 * assert_eq!(metrics[0].avg_price, 5.0);
 * ```
 *
 * ## Configuration
 *
 * Settings come from defaults, an optional TOML file and `RXCLAIMS_*`
 * environment variables, in that order of precedence.
 *
 * ```no_run
 * # use rxclaims::prelude::*;
 * # fn main() -> Result<()> {
 * let config = AnalyticsConfig::load(None)?;
 *
 * // Or build your own
 * let config = ConfigBuilder::from_config(config)
 *     .output_dir("reports")
 *     .validation_level(ValidationLevel::Strict)
 *     .progress_bar(false)
 *     .build();
 * # Ok(())
 * # }
 * ```
 */

// Re-export error types from root
pub use error::{ClaimsError, Result, ErrorContext, ExportFormat};

// Public modules
pub mod data_types;
pub mod revert;
pub mod enrich;
pub mod metrics;
pub mod ranking;
pub mod analytics;
pub mod schema;
pub mod reader;
pub mod dataset;
pub mod export;
pub mod config;
pub mod error;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```
/// use rxclaims::prelude::*;
/// ```
pub mod prelude {
    pub use crate::data_types::*;
    pub use crate::revert::RevertIndex;
    pub use crate::reader::ClaimsReader;
    pub use crate::error::{Analyzer, ClaimsError, Result};
    pub use crate::analytics::{AnalyticsReport, AnalyzerStatus, BatchStats, ClaimsAnalytics, EngineOptions};
    pub use crate::dataset::{ClaimsDataset, ClaimsDatasetBuilder};
    pub use crate::export::{ExportSummary, JsonExporter, ReportExporter};
    pub use crate::config::{AnalyticsConfig, ConfigBuilder, ValidationLevel};
    pub use crate::ExportFormat;
}

/// Claims analytics constants
pub mod constants {
    /// Chains kept per drug in the chain ranking
    pub const DEFAULT_TOP_CHAINS: usize = 2;

    /// Quantities kept per drug in the quantity ranking
    pub const DEFAULT_TOP_QUANTITIES: usize = 5;

    /// Decimal places of emitted prices
    pub const DEFAULT_PRICE_PRECISION: u32 = 2;

    /// Largest accepted price precision; f64 carries about 15 significant decimal digits
    pub const MAX_PRICE_PRECISION: u32 = 15;

    /// Output artifact locations
    pub const DEFAULT_OUTPUT_DIR: &str = "output";
    pub const METRICS_BY_DIMENSION_FILE: &str = "metrics_by_dimension.json";
    pub const TOP_CHAINS_FILE: &str = "top_2_chains_per_drug.json";
    pub const COMMON_QUANTITY_FILE: &str = "most_common_quantity_per_drug.json";
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_round_trip_through_engine() {
        let claims = vec![Claim::new("c1", "1", "d1", 9.0, 3.0)];
        let pharmacies = vec![Pharmacy::new("p1", "health", "1")];
        let report = ClaimsAnalytics::new(&claims)
            .with_pharmacies(&pharmacies)
            .run();

        assert!(report.is_success());
        let chains = report.top_chains.unwrap().unwrap();
        assert_eq!(chains[0].chain, vec![ChainPrice { name: "health".into(), avg_price: 3.0 }]);
    }

    #[test]
    fn test_default_options_match_constants() {
        let options = EngineOptions::default();
        assert_eq!(options.top_chains_limit, crate::constants::DEFAULT_TOP_CHAINS);
        assert_eq!(options.top_quantities_limit, crate::constants::DEFAULT_TOP_QUANTITIES);
    }
}

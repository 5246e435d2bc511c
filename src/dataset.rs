/*!
 * Unified dataset API for a claims batch
 *
 * Provides a builder that loads pharmacies, claims and reverts from their
 * directories and hands the complete batch to the analytics engine.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{Result, ClaimsError};
use crate::analytics::{BatchStats, ClaimsAnalytics, EngineOptions};
use crate::config::AnalyticsConfig;
use crate::data_types::*;
use crate::reader::ClaimsReader;

/// Builder for loading a complete claims batch
///
/// # Example
/// ```no_run
/// # use rxclaims::dataset::ClaimsDatasetBuilder;
/// let dataset = ClaimsDatasetBuilder::new()
///     .pharmacies("data/pharmacies")
///     .claims("data/claims")
///     .reverts("data/reverts")
///     .build()?;
/// # Ok::<(), rxclaims::ClaimsError>(())
/// ```
pub struct ClaimsDatasetBuilder {
    pharmacies_dir: Option<PathBuf>,
    claims_dir: Option<PathBuf>,
    reverts_dir: Option<PathBuf>,
    reader: ClaimsReader,
}

impl Default for ClaimsDatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimsDatasetBuilder {
    /// Create a new dataset builder
    pub fn new() -> Self {
        Self {
            pharmacies_dir: None,
            claims_dir: None,
            reverts_dir: None,
            reader: ClaimsReader::new(),
        }
    }

    /// Set the directory containing the pharmacy CSV file
    pub fn pharmacies<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.pharmacies_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the directory containing claim JSON files
    pub fn claims<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.claims_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the directory containing revert JSON files
    pub fn reverts<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.reverts_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Use a custom reader
    pub fn reader(mut self, reader: ClaimsReader) -> Self {
        self.reader = reader;
        self
    }

    /// Configure the reader from an `AnalyticsConfig`
    pub fn config(self, config: &AnalyticsConfig) -> Self {
        self.reader(ClaimsReader::from_config(config))
    }

    /// Build the dataset, loading all three collections
    ///
    /// Fails when no pharmacy records can be loaded. An empty claim
    /// collection is not an error; the engine reports nothing to compute.
    pub fn build(self) -> Result<ClaimsDataset> {
        let pharmacies_dir = required(self.pharmacies_dir, "pharmacies")?;
        let claims_dir = required(self.claims_dir, "claims")?;
        let reverts_dir = required(self.reverts_dir, "reverts")?;

        info!("loading claims batch");

        let pharmacies = self.reader.load_pharmacies(&pharmacies_dir)?;
        if pharmacies.is_empty() {
            return Err(ClaimsError::Custom {
                message: format!("no pharmacy records loaded from '{}'", pharmacies_dir.display()),
                suggestion: Some("Pharmacy data is essential; add a CSV file with 'chain' and 'npi' columns".to_string()),
            });
        }

        let valid_npis: HashSet<String> = pharmacies.iter()
            .map(|p| p.npi.clone())
            .collect();

        let claims = self.reader.load_claims(&claims_dir, Some(&valid_npis))?;
        let reverts = self.reader.load_reverts(&reverts_dir)?;

        if claims.is_empty() {
            warn!("no valid claims found to process");
        }

        Ok(ClaimsDataset { pharmacies, claims, reverts })
    }
}

fn required(dir: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    dir.ok_or_else(|| ClaimsError::Custom {
        message: format!("{} directory not specified", what),
        suggestion: Some(format!("Use .{}() to specify the {} directory", what, what)),
    })
}

/// A complete, loaded claims batch
#[derive(Debug, Clone, Default)]
pub struct ClaimsDataset {
    pub pharmacies: Vec<Pharmacy>,
    pub claims: Vec<Claim>,
    pub reverts: Vec<Revert>,
}

impl ClaimsDataset {
    /// Create a dataset from records already in memory
    pub fn new(pharmacies: Vec<Pharmacy>, claims: Vec<Claim>, reverts: Vec<Revert>) -> Self {
        Self { pharmacies, claims, reverts }
    }

    /// Load a batch from its three directories with a configured reader
    pub fn load<P: AsRef<Path>>(
        pharmacies: P,
        claims: P,
        reverts: P,
        config: &AnalyticsConfig,
    ) -> Result<Self> {
        ClaimsDatasetBuilder::new()
            .pharmacies(pharmacies)
            .claims(claims)
            .reverts(reverts)
            .config(config)
            .build()
    }

    /// Get the number of claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if the batch has no claims
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Engine over this batch
    pub fn analytics(&self, options: EngineOptions) -> ClaimsAnalytics<'_> {
        ClaimsAnalytics::new(&self.claims)
            .with_reverts(&self.reverts)
            .with_pharmacies(&self.pharmacies)
            .with_options(options)
    }

    /// Summary statistics for this batch
    pub fn statistics(&self) -> BatchStats {
        self.analytics(EngineOptions::default()).batch_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout() -> TempDir {
        let root = TempDir::new().unwrap();
        for dir in ["pharmacies", "claims", "reverts"] {
            fs::create_dir(root.path().join(dir)).unwrap();
        }
        root
    }

    #[test]
    fn test_builder_requires_directories() {
        let err = ClaimsDatasetBuilder::new().pharmacies("p").build().unwrap_err();
        assert!(err.to_string().contains("claims directory not specified"));
    }

    #[test]
    fn test_empty_pharmacies_is_fatal() {
        let root = layout();
        let err = ClaimsDataset::load(
            root.path().join("pharmacies"),
            root.path().join("claims"),
            root.path().join("reverts"),
            &AnalyticsConfig::default(),
        )
        .unwrap_err();
        assert!(err.user_message().contains("Pharmacy data is essential"));
    }

    #[test]
    fn test_empty_claims_is_not_fatal() {
        let root = layout();
        fs::write(root.path().join("pharmacies/p.csv"), "chain,npi\nhealth,1\n").unwrap();
        let dataset = ClaimsDatasetBuilder::new()
            .pharmacies(root.path().join("pharmacies"))
            .claims(root.path().join("claims"))
            .reverts(root.path().join("reverts"))
            .build()
            .unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.pharmacies.len(), 1);
        assert_eq!(dataset.statistics().total_claims, 0);
    }
}

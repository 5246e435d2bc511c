//! Set of claim identifiers that have been cancelled by at least one revert.

use std::collections::HashSet;

use crate::data_types::Revert;

/// Distinct `claim_id`s referenced by revert events
#[derive(Debug, Clone, Default)]
pub struct RevertIndex {
    claim_ids: HashSet<String>,
}

impl RevertIndex {
    /// Build the index from a revert collection. Duplicate reverts for the
    /// same claim collapse into one entry.
    pub fn from_reverts(reverts: &[Revert]) -> Self {
        let claim_ids = reverts.iter()
            .map(|r| r.claim_id.clone())
            .collect();

        Self { claim_ids }
    }

    pub fn contains(&self, claim_id: &str) -> bool {
        self.claim_ids.contains(claim_id)
    }

    /// Number of distinct reverted claim ids
    pub fn len(&self) -> usize {
        self.claim_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claim_ids.is_empty()
    }
}

impl<'a> FromIterator<&'a Revert> for RevertIndex {
    fn from_iter<I: IntoIterator<Item = &'a Revert>>(iter: I) -> Self {
        Self {
            claim_ids: iter.into_iter().map(|r| r.claim_id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reverts() {
        let index = RevertIndex::from_reverts(&[]);
        assert!(index.is_empty());
        assert!(!index.contains("c1"));
    }

    #[test]
    fn test_duplicate_reverts_collapse() {
        let reverts = vec![
            Revert::new("r1", "c1"),
            Revert::new("r2", "c1"),
            Revert::new("r3", "c2"),
        ];
        let index = RevertIndex::from_reverts(&reverts);
        assert_eq!(index.len(), 2);
        assert!(index.contains("c1"));
        assert!(index.contains("c2"));
        assert!(!index.contains("r1"));
    }

    #[test]
    fn test_collect_from_iterator() {
        let reverts = vec![Revert::new("r1", "c9")];
        let index: RevertIndex = reverts.iter().collect();
        assert!(index.contains("c9"));
    }
}

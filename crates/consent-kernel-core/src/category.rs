//! The set of category labels usable in grants.

use std::collections::BTreeSet;

use crate::error::{ConsentError, Result, Subject};
use crate::types::Category;

/// Labels seeded by [`CategoryRegistry::bootstrap`].
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "medical-history",
    "vaccinations",
    "allergies",
    "medications",
    "lab-results",
    "mental-health",
    "imaging",
    "genetics",
];

/// Valid category labels plus the one-time bootstrap flag.
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    labels: BTreeSet<Category>,
    initialized: bool,
}

impl CategoryRegistry {
    /// Create an empty, uninitialized registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted state.
    pub fn from_parts(labels: impl IntoIterator<Item = Category>, initialized: bool) -> Self {
        Self {
            labels: labels.into_iter().collect(),
            initialized,
        }
    }

    /// Seed the default labels once.
    ///
    /// Returns the labels that were added; empty when already initialized.
    pub fn bootstrap(&mut self) -> Vec<Category> {
        if self.initialized {
            return Vec::new();
        }
        self.initialized = true;

        let mut added = Vec::new();
        for label in DEFAULT_CATEGORIES {
            // Defaults are statically well-formed.
            if let Ok(category) = Category::new(label) {
                if self.labels.insert(category.clone()) {
                    added.push(category);
                }
            }
        }
        added
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `label` is currently usable in a grant.
    pub fn is_valid(&self, label: &str) -> bool {
        self.labels.iter().any(|c| c.as_str() == label)
    }

    /// Register a new label.
    pub fn add(&mut self, category: Category) -> Result<()> {
        self.bootstrap();
        if self.labels.contains(&category) {
            return Err(ConsentError::Conflict(Subject::Category(category)));
        }
        self.labels.insert(category);
        Ok(())
    }

    /// All valid labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &Category> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_idempotent() {
        let mut reg = CategoryRegistry::new();
        assert!(!reg.is_valid("allergies"));

        assert_eq!(reg.bootstrap().len(), 8);
        assert!(reg.is_valid("allergies"));
        assert!(reg.is_valid("genetics"));

        assert!(reg.bootstrap().is_empty());
        assert_eq!(reg.len(), 8);
    }

    #[test]
    fn test_add_bootstraps_first() {
        let mut reg = CategoryRegistry::new();
        reg.add(Category::new("dental").unwrap()).unwrap();
        assert!(reg.is_initialized());
        assert_eq!(reg.len(), 9);
    }

    #[test]
    fn test_add_duplicate_conflicts() {
        let mut reg = CategoryRegistry::new();
        reg.bootstrap();
        let err = reg.add(Category::new("imaging").unwrap()).unwrap_err();
        assert!(matches!(err, ConsentError::Conflict(Subject::Category(_))));
    }

    #[test]
    fn test_labels_sorted() {
        let mut reg = CategoryRegistry::new();
        reg.bootstrap();
        let labels: Vec<&str> = reg.labels().map(|c| c.as_str()).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }
}

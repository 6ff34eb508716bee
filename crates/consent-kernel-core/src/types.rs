//! Strong type definitions for the Consent Kernel.
//!
//! Identities and labels are newtypes so that a grantee can never be passed
//! where a category is expected. Length bounds are checked once, at
//! construction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConsentError, Result};

/// Logical clock value (e.g. a block height), supplied by the caller.
pub type BlockHeight = u64;

/// Maximum length of a principal identifier in bytes.
///
/// Small enough that a `delegate:<id>` tag always fits in history details.
pub const MAX_PRINCIPAL_LEN: usize = 64;

/// Maximum length of a category label in bytes.
pub const MAX_CATEGORY_LEN: usize = 32;

/// An opaque caller or subject identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Create a principal, rejecting empty or oversized identifiers.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_PRINCIPAL_LEN {
            return Err(ConsentError::InvalidInput(format!(
                "principal must be 1-{} bytes, got {}",
                MAX_PRINCIPAL_LEN,
                id.len()
            )));
        }
        Ok(Self(id))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self.0)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Principal {
    type Error = ConsentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

impl std::str::FromStr for Principal {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A category label, 1-32 bytes.
///
/// Well-formedness says nothing about validity: a label must also be in the
/// [`CategoryRegistry`](crate::CategoryRegistry) to be used in a grant.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

impl Category {
    /// Create a category label, rejecting empty or oversized labels.
    pub fn new(label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() || label.len() > MAX_CATEGORY_LEN {
            return Err(ConsentError::InvalidCategory(label));
        }
        Ok(Self(label))
    }

    /// Get the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Category({})", self.0)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Category {
    type Error = ConsentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.0
    }
}

impl std::str::FromStr for Category {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identifies one consent relationship: who granted what to whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsentKey {
    pub granter: Principal,
    pub grantee: Principal,
    pub category: Category,
}

impl ConsentKey {
    pub fn new(granter: Principal, grantee: Principal, category: Category) -> Self {
        Self {
            granter,
            grantee,
            category,
        }
    }
}

impl fmt::Display for ConsentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.granter, self.grantee, self.category)
    }
}

/// The invocation context of one operation.
///
/// `at` is the externally supplied logical time. It never advances during
/// a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub caller: Principal,
    pub at: BlockHeight,
}

impl Call {
    pub fn new(caller: Principal, at: BlockHeight) -> Self {
        Self { caller, at }
    }
}

/// Truncate `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_length_bounds() {
        assert!(Category::new("").is_err());
        assert!(Category::new("a").is_ok());
        assert!(Category::new("x".repeat(32)).is_ok());
        assert!(matches!(
            Category::new("x".repeat(33)),
            Err(ConsentError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_principal_rejects_empty() {
        assert!(matches!(
            Principal::new(""),
            Err(ConsentError::InvalidInput(_))
        ));
        assert!(Principal::new("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7").is_ok());
    }

    #[test]
    fn test_principal_length_bound() {
        assert!(Principal::new("p".repeat(MAX_PRINCIPAL_LEN)).is_ok());
        assert!(matches!(
            Principal::new("p".repeat(MAX_PRINCIPAL_LEN + 1)),
            Err(ConsentError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_principal_serde_validates() {
        let ok: Principal = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<Principal>("\"\"").is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut s = "ab\u{00e9}".to_string(); // 'é' is two bytes
        truncate_utf8(&mut s, 3);
        assert_eq!(s, "ab");
    }

    #[test]
    fn test_key_display() {
        let key = ConsentKey::new(
            Principal::new("u1").unwrap(),
            Principal::new("u2").unwrap(),
            Category::new("allergies").unwrap(),
        );
        assert_eq!(key.to_string(), "u1->u2:allergies");
    }
}

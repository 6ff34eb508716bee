//! Blake3 digests used to chain history entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separator mixed into every history digest.
pub const HISTORY_DOMAIN: &[u8] = b"consent-kernel-history-v1:";

/// A 32-byte Blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Hash `data` under the given domain separator.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The digest that precedes the first entry of every chain.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl Default for Digest {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_changes_digest() {
        let a = Digest::hash_with_domain(b"a:", b"payload");
        let b = Digest::hash_with_domain(b"b:", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn test_default_is_chain_start() {
        assert_eq!(Digest::default(), Digest::ZERO);
        assert_eq!(Digest::default().to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_slice_conversion_checks_length() {
        let d = Digest::hash_with_domain(HISTORY_DOMAIN, b"x");
        assert_eq!(Digest::try_from(&d.as_bytes()[..]).unwrap(), d);
        assert!(Digest::try_from(&d.as_bytes()[..31]).is_err());
    }
}

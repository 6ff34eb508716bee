//! Fixed-capacity ordered container.
//!
//! Every bounded collection in the kernel (delegates, history, template
//! categories, batch lists) is a `BoundedVec`. The capacity is part of the
//! type and is enforced on every insertion path, including deserialization.

use serde::{Deserialize, Serialize};

/// Returned when an insertion would exceed the capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    pub capacity: usize,
}

/// An ordered container holding at most `N` elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<T>",
    into = "Vec<T>",
    bound(serialize = "T: Clone + Serialize", deserialize = "T: Deserialize<'de>")
)]
pub struct BoundedVec<T, const N: usize> {
    items: Vec<T>,
}

impl<T, const N: usize> BoundedVec<T, N> {
    /// Maximum number of elements.
    pub const CAPACITY: usize = N;

    /// Create an empty container.
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(N),
        }
    }

    /// Number of elements currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    /// Append an element, failing when full.
    pub fn try_push(&mut self, item: T) -> Result<(), CapacityError> {
        if self.is_full() {
            return Err(CapacityError { capacity: N });
        }
        self.items.push(item);
        Ok(())
    }

    /// Append an element, evicting the oldest one first when full.
    ///
    /// Returns the evicted element, if any.
    pub fn push_evicting(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            Some(self.items.remove(0))
        } else {
            None
        };
        self.items.push(item);
        evicted
    }

    /// Remove the first element matching `pred`, preserving the order of
    /// the rest.
    pub fn remove_first(&mut self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let idx = self.items.iter().position(pred)?;
        Some(self.items.remove(idx))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Elements in insertion order, oldest first.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.clone()
    }
}

impl<T: PartialEq, const N: usize> BoundedVec<T, N> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }
}

impl<T, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> TryFrom<Vec<T>> for BoundedVec<T, N> {
    type Error = CapacityError;

    fn try_from(items: Vec<T>) -> Result<Self, Self::Error> {
        if items.len() > N {
            return Err(CapacityError { capacity: N });
        }
        Ok(Self { items })
    }
}

impl<T, const N: usize> From<BoundedVec<T, N>> for Vec<T> {
    fn from(b: BoundedVec<T, N>) -> Self {
        b.items
    }
}

impl std::fmt::Display for CapacityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "capacity of {} exceeded", self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_push_respects_capacity() {
        let mut v: BoundedVec<u8, 2> = BoundedVec::new();
        v.try_push(1).unwrap();
        v.try_push(2).unwrap();
        assert_eq!(v.try_push(3), Err(CapacityError { capacity: 2 }));
        assert_eq!(v.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_push_evicting_drops_oldest() {
        let mut v: BoundedVec<u8, 3> = BoundedVec::new();
        for i in 0..5 {
            v.push_evicting(i);
        }
        assert_eq!(v.len(), 3);
        assert_eq!(v.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut v: BoundedVec<&str, 4> = vec!["a", "b", "c", "d"].try_into().unwrap();
        assert_eq!(v.remove_first(|x| *x == "b"), Some("b"));
        assert_eq!(v.to_vec(), vec!["a", "c", "d"]);
        assert_eq!(v.remove_first(|x| *x == "z"), None);
    }

    #[test]
    fn test_deserialize_rejects_oversized() {
        let ok: BoundedVec<u8, 2> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<BoundedVec<u8, 2>>("[1,2,3]").is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_evicting_keeps_newest(items in proptest::collection::vec(0u32..1000, 0..40)) {
            let mut v: BoundedVec<u32, 8> = BoundedVec::new();
            for item in &items {
                v.push_evicting(*item);
            }
            let keep = items.len().min(8);
            proptest::prop_assert_eq!(v.to_vec(), items[items.len() - keep..].to_vec());
        }
    }
}

// Copyright (c) 2024-2025 The Meridian Foundation

//! Sparse currency -> amount maps.

use core::fmt;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::collections::BTreeMap;

use displaydoc::Display;
use serde::{Deserialize, Serialize};

use crate::{coin_string, Amount, CurrencyId};

/// Errors constructing a currency value map.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ValueMapError {
    /// currency and amount vectors have different lengths ({0} vs {1})
    LengthMismatch(usize, usize),
    /// duplicate currency id in vector form
    DuplicateCurrency,
}

/// A sparse mapping from currency id to a signed amount.
///
/// Since these maps are hashed and encoded into consensus data, the backing
/// store is a `BTreeMap`, which guarantees iteration in sorted, predictable
/// order. Insertion order never matters; two maps are equal when their
/// canonical forms (zero entries dropped) are equal entry-for-entry.
///
/// Arithmetic saturates at the `i64` range; amounts anywhere near that
/// magnitude are rejected by the conversion engine before they reach a map.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CurrencyValueMap {
    map: BTreeMap<CurrencyId, Amount>,
}

impl CurrencyValueMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel currency and amount vectors.
    pub fn from_vectors(
        currencies: &[CurrencyId],
        amounts: &[Amount],
    ) -> Result<Self, ValueMapError> {
        if currencies.len() != amounts.len() {
            return Err(ValueMapError::LengthMismatch(
                currencies.len(),
                amounts.len(),
            ));
        }
        let mut map = BTreeMap::new();
        for (id, amount) in currencies.iter().zip(amounts) {
            if map.insert(*id, *amount).is_some() {
                return Err(ValueMapError::DuplicateCurrency);
            }
        }
        Ok(Self { map })
    }

    /// Build from an iterator of (id, amount) pairs, summing duplicates.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (CurrencyId, Amount)>) -> Self {
        let mut out = Self::new();
        for (id, amount) in pairs {
            out.add_value(id, amount);
        }
        out
    }

    /// The amount recorded for `id`, zero when absent.
    pub fn value(&self, id: &CurrencyId) -> Amount {
        self.map.get(id).copied().unwrap_or(0)
    }

    /// Whether `id` has an entry (including an explicit zero).
    pub fn contains(&self, id: &CurrencyId) -> bool {
        self.map.contains_key(id)
    }

    /// Add `amount` to the entry for `id`, creating it if needed.
    pub fn add_value(&mut self, id: CurrencyId, amount: Amount) {
        let entry = self.map.entry(id).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Replace the entry for `id`.
    pub fn set_value(&mut self, id: CurrencyId, amount: Amount) {
        self.map.insert(id, amount);
    }

    /// Remove the entry for `id`, returning its amount if present.
    pub fn remove(&mut self, id: &CurrencyId) -> Option<Amount> {
        self.map.remove(id)
    }

    /// Number of entries, including explicit zeros.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate entries in canonical (ascending id) order.
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyId, &Amount)> {
        self.map.iter()
    }

    /// The unique canonical form: all zero entries dropped.
    pub fn canonical(&self) -> Self {
        Self {
            map: self
                .map
                .iter()
                .filter(|(_, amount)| **amount != 0)
                .map(|(id, amount)| (*id, *amount))
                .collect(),
        }
    }

    /// Whether any entry is negative.
    pub fn has_negative(&self) -> bool {
        self.map.values().any(|amount| *amount < 0)
    }

    /// Whether every entry of `self` is <= the matching entry of `other`,
    /// treating missing entries as zero on both sides.
    pub fn all_le(&self, other: &Self) -> bool {
        self.map
            .keys()
            .chain(other.map.keys())
            .all(|id| self.value(id) <= other.value(id))
    }

    /// Project onto an ordered currency list, yielding one amount per
    /// position (zero where the map has no entry).
    pub fn as_currency_vector(&self, currencies: &[CurrencyId]) -> Vec<Amount> {
        currencies.iter().map(|id| self.value(id)).collect()
    }
}

impl Add for CurrencyValueMap {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for CurrencyValueMap {
    fn add_assign(&mut self, rhs: Self) {
        for (id, amount) in rhs.map {
            self.add_value(id, amount);
        }
    }
}

impl Sub for CurrencyValueMap {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl SubAssign for CurrencyValueMap {
    fn sub_assign(&mut self, rhs: Self) {
        for (id, amount) in rhs.map {
            self.add_value(id, amount.saturating_neg());
        }
    }
}

impl Neg for CurrencyValueMap {
    type Output = Self;

    fn neg(mut self) -> Self {
        for amount in self.map.values_mut() {
            *amount = amount.saturating_neg();
        }
        self
    }
}

impl Mul<Amount> for CurrencyValueMap {
    type Output = Self;

    fn mul(mut self, rhs: Amount) -> Self {
        for amount in self.map.values_mut() {
            *amount = amount.saturating_mul(rhs);
        }
        self
    }
}

/// Scalar division, truncating toward zero per entry.
impl core::ops::Div<Amount> for CurrencyValueMap {
    type Output = Self;

    fn div(mut self, rhs: Amount) -> Self {
        for amount in self.map.values_mut() {
            *amount /= rhs;
        }
        self
    }
}

impl FromIterator<(CurrencyId, Amount)> for CurrencyValueMap {
    fn from_iter<T: IntoIterator<Item = (CurrencyId, Amount)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

impl fmt::Display for CurrencyValueMap {
    /// Formats as `{id: amount, ...}` with decimal amounts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (id, amount)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", id, coin_string(*amount))?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> CurrencyId {
        CurrencyId::new([byte; 20])
    }

    #[test]
    fn canonical_drops_zeros_only() {
        let map = CurrencyValueMap::from_pairs([(id(1), 5), (id(2), 0), (id(3), -7)]);
        let canonical = map.canonical();
        assert_eq!(canonical.len(), 2);
        assert_eq!(canonical.value(&id(1)), 5);
        assert_eq!(canonical.value(&id(3)), -7);
        assert!(!canonical.contains(&id(2)));
    }

    #[test]
    fn equality_requires_canonicalization() {
        let a = CurrencyValueMap::from_pairs([(id(1), 5)]);
        let b = CurrencyValueMap::from_pairs([(id(1), 5), (id(2), 0)]);
        assert_ne!(a, b);
        assert_eq!(a, b.canonical());
    }

    #[test]
    fn add_sub_are_entrywise() {
        let a = CurrencyValueMap::from_pairs([(id(1), 10), (id(2), 3)]);
        let b = CurrencyValueMap::from_pairs([(id(2), 4), (id(3), 1)]);
        let sum = a.clone() + b.clone();
        assert_eq!(sum.value(&id(1)), 10);
        assert_eq!(sum.value(&id(2)), 7);
        assert_eq!(sum.value(&id(3)), 1);

        let diff = a - b;
        assert_eq!(diff.value(&id(2)), -1);
        assert_eq!(diff.value(&id(3)), -1);
        assert!(diff.has_negative());
    }

    #[test]
    fn balanced_batch_cancels_to_zero() {
        let a = CurrencyValueMap::from_pairs([(id(1), 10), (id(2), 3)]);
        let diff = a.clone() - a;
        assert!(diff.canonical().is_empty());
        assert!(!diff.has_negative());
    }

    #[test]
    fn scalar_multiply_and_divide() {
        let map = CurrencyValueMap::from_pairs([(id(1), 6), (id(2), -4)]);
        let doubled = map.clone() * 2;
        assert_eq!(doubled.value(&id(1)), 12);
        assert_eq!(doubled.value(&id(2)), -8);
        let halved = map / 2;
        assert_eq!(halved.value(&id(1)), 3);
        assert_eq!(halved.value(&id(2)), -2);
    }

    #[test]
    fn scalar_divide_truncates_toward_zero() {
        let map = CurrencyValueMap::from_pairs([(id(1), 7), (id(2), -7)]);
        let halved = map / 2;
        assert_eq!(halved.value(&id(1)), 3);
        assert_eq!(halved.value(&id(2)), -3);
    }

    #[test]
    fn all_le_treats_missing_as_zero() {
        let a = CurrencyValueMap::from_pairs([(id(1), 3)]);
        let b = CurrencyValueMap::from_pairs([(id(1), 5), (id(2), 1)]);
        assert!(a.all_le(&b));
        assert!(!b.all_le(&a));
        // a negative entry is <= an absent one
        let c = CurrencyValueMap::from_pairs([(id(9), -1)]);
        assert!(c.all_le(&CurrencyValueMap::new()));
    }

    #[test]
    fn from_vectors_rejects_mismatch_and_duplicates() {
        assert_eq!(
            CurrencyValueMap::from_vectors(&[id(1)], &[1, 2]),
            Err(ValueMapError::LengthMismatch(1, 2))
        );
        assert_eq!(
            CurrencyValueMap::from_vectors(&[id(1), id(1)], &[1, 2]),
            Err(ValueMapError::DuplicateCurrency)
        );
        let map = CurrencyValueMap::from_vectors(&[id(2), id(1)], &[5, 9]).unwrap();
        assert_eq!(map.value(&id(1)), 9);
        assert_eq!(map.value(&id(2)), 5);
    }

    #[test]
    fn currency_vector_projection() {
        let map = CurrencyValueMap::from_pairs([(id(2), 5)]);
        assert_eq!(map.as_currency_vector(&[id(1), id(2), id(3)]), vec![0, 5, 0]);
    }
}

// Copyright (c) 2024-2025 The Meridian Foundation

//! 160-bit currency identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

/// An opaque 160-bit currency identifier.
///
/// Ids are hash-derived and totally ordered by byte value; that order is
/// the canonical iteration order for every consensus-visible map keyed by
/// currency. The all-zero id is reserved as "no currency".
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct CurrencyId([u8; 20]);

impl CurrencyId {
    /// Number of bytes in a currency id.
    pub const LEN: usize = 20;

    /// The reserved null id.
    pub const NULL: CurrencyId = CurrencyId([0u8; 20]);

    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The raw id bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the reserved null id.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl From<[u8; 20]> for CurrencyId {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for CurrencyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> CurrencyId {
        CurrencyId::new([byte; 20])
    }

    #[test]
    fn ordering_follows_byte_order() {
        assert!(id(1) < id(2));
        assert!(CurrencyId::NULL < id(1));
        let mut a = [0u8; 20];
        a[19] = 1;
        let mut b = [0u8; 20];
        b[0] = 1;
        // big-endian-style byte comparison: earlier bytes dominate
        assert!(CurrencyId::new(a) < CurrencyId::new(b));
    }

    #[test]
    fn null_detection() {
        assert!(CurrencyId::NULL.is_null());
        assert!(CurrencyId::default().is_null());
        assert!(!id(3).is_null());
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(id(0xab).to_string(), "ab".repeat(20));
    }
}

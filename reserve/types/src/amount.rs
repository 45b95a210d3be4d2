// Copyright (c) 2024-2025 The Meridian Foundation

//! Monetary amounts.
//!
//! All monetary quantities are signed 64-bit integers counted in base units
//! of 10^-8. Negative amounts appear transiently inside accounting ledgers
//! (a net outflow) and never in a persisted currency state.

use crate::constants::SATOSHIDEN;

/// A monetary amount in base units of 10^-8.
pub type Amount = i64;

/// Render an amount as a decimal string with eight fractional digits,
/// e.g. `150000000` -> `"1.50000000"`.
pub fn coin_string(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let magnitude = amount.unsigned_abs();
    format!(
        "{}{}.{:08}",
        sign,
        magnitude / SATOSHIDEN as u64,
        magnitude % SATOSHIDEN as u64
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_string_formats_whole_and_fraction() {
        assert_eq!(coin_string(0), "0.00000000");
        assert_eq!(coin_string(1), "0.00000001");
        assert_eq!(coin_string(SATOSHIDEN), "1.00000000");
        assert_eq!(coin_string(150_000_000), "1.50000000");
        assert_eq!(coin_string(-25_000), "-0.00025000");
    }
}

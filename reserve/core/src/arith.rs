// Copyright (c) 2024-2025 The Meridian Foundation

//! Wide-integer and high-precision decimal arithmetic.
//!
//! All price and supply math runs either in 256-bit unsigned integers or in
//! [`HighPrecision`], a sign-and-magnitude decimal with 60 fractional
//! digits backed by a 512-bit integer. Every operation is overflow-checked;
//! integer division and every conversion back to an amount truncate toward
//! zero, while the decimal rounds to nearest at its working scale the way
//! arbitrary-precision decimal libraries do. Nothing here touches floating
//! point, so results are bit-identical on every platform.

use primitive_types::{U256, U512};

use mrd_reserve_types::Amount;

/// Maximum iterations for any series evaluation. The exp and ln series
/// below converge in well under 100 terms at this precision; hitting the
/// cap means the argument reduction failed and the result is refused.
const MAX_SERIES_ITERATIONS: u32 = 256;

fn pow10(digits: u32) -> U512 {
    let mut out = U512::one();
    for _ in 0..digits {
        out = out * U512::from(10u64);
    }
    out
}

lazy_static::lazy_static! {
    /// 10^60, the fixed fractional scale of [`HighPrecision`].
    static ref HP_SCALE: U512 = pow10(60);
    /// 10^52, converting 10^-8 base units to the 10^-60 scale.
    static ref HP_AMOUNT_SCALE: U512 = pow10(52);
    /// ln 2 at full precision, for logarithm range reduction.
    static ref HP_LN2: HighPrecision = HighPrecision::compute_ln2();
}

/// Widen a non-negative amount into a 256-bit integer.
pub fn big(amount: Amount) -> U256 {
    debug_assert!(amount >= 0);
    U256::from(amount.max(0) as u64)
}

/// Narrow a 256-bit integer to an amount, failing on overflow.
pub fn to_amount(value: U256) -> Option<Amount> {
    if value > U256::from(i64::MAX as u64) {
        return None;
    }
    Some(value.low_u64() as Amount)
}

/// `a * b / c` over non-negative amounts in 256-bit space, truncating.
/// Fails when `c` is zero or the result exceeds the amount range.
pub fn mul_div(a: Amount, b: Amount, c: Amount) -> Option<Amount> {
    if c <= 0 {
        return None;
    }
    to_amount(big(a) * big(b) / big(c))
}

/// A high-precision decimal: sign and 512-bit magnitude at fixed scale
/// 10^-60.
///
/// The conversion formulas are the only consumers. Operations return
/// `Option` and refuse (rather than wrap or saturate) on overflow; the
/// conversion engine maps a refusal to leaving prices untouched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HighPrecision {
    negative: bool,
    magnitude: U512,
}

impl HighPrecision {
    /// Zero.
    pub fn zero() -> Self {
        Self {
            negative: false,
            magnitude: U512::zero(),
        }
    }

    /// One.
    pub fn one() -> Self {
        Self {
            negative: false,
            magnitude: *HP_SCALE,
        }
    }

    /// From a whole number.
    pub fn from_int(value: u64) -> Self {
        Self {
            negative: false,
            magnitude: U512::from(value) * *HP_SCALE,
        }
    }

    /// From an amount in 10^-8 base units, exactly.
    pub fn from_amount(value: Amount) -> Self {
        Self {
            negative: value < 0,
            magnitude: U512::from(value.unsigned_abs()) * *HP_AMOUNT_SCALE,
        }
        .normalized()
    }

    /// Truncate toward zero to an amount in 10^-8 base units. Fails when
    /// the magnitude exceeds the amount range.
    pub fn to_amount(self) -> Option<Amount> {
        let scaled = self.magnitude / *HP_AMOUNT_SCALE;
        if scaled > U512::from(i64::MAX as u64) {
            return None;
        }
        let magnitude = scaled.low_u64() as i64;
        Some(if self.negative { -magnitude } else { magnitude })
    }

    /// Whether this value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    /// Whether this value is negative (zero is never negative).
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    fn normalized(mut self) -> Self {
        if self.magnitude.is_zero() {
            self.negative = false;
        }
        self
    }

    fn with_sign(self, negative: bool) -> Self {
        Self { negative, ..self }.normalized()
    }

    /// Negation.
    pub fn neg(self) -> Self {
        self.with_sign(!self.negative)
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        if self.negative == rhs.negative {
            let magnitude = self.magnitude.checked_add(rhs.magnitude)?;
            Some(
                Self {
                    negative: self.negative,
                    magnitude,
                }
                .normalized(),
            )
        } else if self.magnitude >= rhs.magnitude {
            Some(
                Self {
                    negative: self.negative,
                    magnitude: self.magnitude - rhs.magnitude,
                }
                .normalized(),
            )
        } else {
            Some(
                Self {
                    negative: rhs.negative,
                    magnitude: rhs.magnitude - self.magnitude,
                }
                .normalized(),
            )
        }
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.checked_add(rhs.neg())
    }

    /// Checked multiplication, rounding to nearest at the working scale.
    ///
    /// Internal operations round like the reference decimal library; only
    /// the final [`Self::to_amount`] conversion truncates.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let product = self.magnitude.checked_mul(rhs.magnitude)?;
        let magnitude = product.checked_add(*HP_SCALE >> 1)? / *HP_SCALE;
        Some(
            Self {
                negative: self.negative != rhs.negative,
                magnitude,
            }
            .normalized(),
        )
    }

    /// Checked division, rounding to nearest. Fails on a zero divisor.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.magnitude.is_zero() {
            return None;
        }
        let numerator = self.magnitude.checked_mul(*HP_SCALE)?;
        let magnitude = numerator.checked_add(rhs.magnitude >> 1)? / rhs.magnitude;
        Some(
            Self {
                negative: self.negative != rhs.negative,
                magnitude,
            }
            .normalized(),
        )
    }

    fn div_int(self, rhs: u64) -> Self {
        let divisor = U512::from(rhs);
        let quotient = self.magnitude / divisor;
        let remainder = self.magnitude % divisor;
        let round_up = remainder.checked_mul(U512::from(2u64)).map_or(false, |doubled| doubled >= divisor);
        Self {
            negative: self.negative,
            magnitude: if round_up { quotient + U512::one() } else { quotient },
        }
        .normalized()
    }

    fn halve(self) -> Self {
        Self {
            negative: self.negative,
            magnitude: self.magnitude >> 1,
        }
        .normalized()
    }

    fn magnitude_lt(&self, rhs: &Self) -> bool {
        self.magnitude < rhs.magnitude
    }

    /// e^self.
    pub fn exp(self) -> Option<Self> {
        if self.is_zero() {
            return Some(Self::one());
        }
        if self.negative {
            // e^-y = 1 / e^y
            return Self::one().checked_div(self.neg().exp()?);
        }

        // reduce the argument below 1/2 by halving, then square back up
        let half = Self::one().halve();
        let mut reduced = self;
        let mut squarings = 0u32;
        while !reduced.magnitude_lt(&half) {
            reduced = reduced.halve();
            squarings += 1;
            if squarings > 512 {
                return None;
            }
        }

        // Taylor series around zero: sum x^n / n!
        let mut sum = Self::one();
        let mut term = Self::one();
        let mut n = 1u64;
        while n < u64::from(MAX_SERIES_ITERATIONS) {
            term = term.checked_mul(reduced)?.div_int(n);
            if term.is_zero() {
                break;
            }
            sum = sum.checked_add(term)?;
            n += 1;
        }

        for _ in 0..squarings {
            sum = sum.checked_mul(sum)?;
        }
        Some(sum)
    }

    /// Natural logarithm. Fails for zero or negative values.
    pub fn ln(self) -> Option<Self> {
        if self.is_zero() || self.negative {
            return None;
        }

        // reduce into [1, 2), counting binary shifts
        let one = Self::one();
        let two = Self::from_int(2);
        let mut mantissa = self;
        let mut shifts: i64 = 0;
        while !mantissa.magnitude_lt(&two) {
            mantissa = mantissa.halve();
            shifts += 1;
            if shifts > 512 {
                return None;
            }
        }
        while mantissa.magnitude_lt(&one) {
            mantissa = Self {
                negative: false,
                magnitude: mantissa.magnitude.checked_mul(U512::from(2u64))?,
            };
            shifts -= 1;
            if shifts < -512 {
                return None;
            }
        }

        // ln m = 2 atanh((m - 1) / (m + 1)) for m in [1, 2)
        let t = mantissa
            .checked_sub(one)?
            .checked_div(mantissa.checked_add(one)?)?;
        let mut series = Self::atanh_series(t)?;
        series = series.checked_add(series)?;

        let shift_part = if shifts >= 0 {
            HP_LN2.checked_mul(Self::from_int(shifts as u64))?
        } else {
            HP_LN2.checked_mul(Self::from_int((-shifts) as u64))?.neg()
        };
        series.checked_add(shift_part)
    }

    /// self^exponent for strictly positive self.
    ///
    /// Whole-number exponents use exact binary exponentiation; everything
    /// else goes through exp(exponent * ln self).
    pub fn powf(self, exponent: Self) -> Option<Self> {
        if self.is_zero() || self.negative {
            return None;
        }
        if exponent.is_zero() {
            return Some(Self::one());
        }
        if !exponent.negative && (exponent.magnitude % *HP_SCALE).is_zero() {
            let whole = exponent.magnitude / *HP_SCALE;
            if whole <= U512::from(u32::MAX) {
                return self.powi(whole.low_u64() as u32);
            }
        }
        exponent.checked_mul(self.ln()?)?.exp()
    }

    fn powi(self, mut exponent: u32) -> Option<Self> {
        let mut base = self;
        let mut result = Self::one();
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result.checked_mul(base)?;
            }
            exponent >>= 1;
            if exponent > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Some(result)
    }

    /// atanh t = t + t^3/3 + t^5/5 + ... for |t| < 1.
    fn atanh_series(t: Self) -> Option<Self> {
        let t_squared = t.checked_mul(t)?;
        let mut power = t;
        let mut sum = t;
        let mut n = 3u64;
        while n < u64::from(MAX_SERIES_ITERATIONS) * 2 {
            power = power.checked_mul(t_squared)?;
            let term = power.div_int(n);
            if term.is_zero() {
                break;
            }
            sum = sum.checked_add(term)?;
            n += 2;
        }
        Some(sum)
    }

    fn compute_ln2() -> Self {
        // ln 2 = 2 atanh(1/3); the series ratio is 1/9 per term, reaching
        // full precision in about seventy terms
        let third = Self::one().div_int(3);
        let series = Self::atanh_series(third).expect("ln2 series cannot overflow");
        series
            .checked_add(series)
            .expect("ln2 doubling cannot overflow")
    }
}

// Copyright (c) 2024-2025 The Meridian Foundation

//! Per-block currency state.
//!
//! A [`CurrencyState`] is the invariant-bearing description of a fractional
//! currency at one block boundary; [`CoinbaseCurrencyState`] extends it
//! with that block's flow vectors and prices. One import advances a
//! coinbase state by exactly one block: the prior state is reverted to its
//! pre-block form and re-applied with the new batch's flows.

use serde::{Deserialize, Serialize};

use mrd_reserve_types::constants::SATOSHIDEN;
use mrd_reserve_types::encode::{
    put_amount_vec, put_id_vec, put_u32, read_amount_vec, read_id_vec,
};
use mrd_reserve_types::{
    Amount, ConsensusDecode, ConsensusEncode, CurrencyId, CurrencyValueMap, DecodeError,
    SliceReader,
};

use crate::arith::{big, mul_div, to_amount};

/// Lifecycle and shape flags on a currency state.
pub mod flags {
    /// Backed by a weighted reserve basket.
    pub const FRACTIONAL: u32 = 0x01;
    /// Accepting pre-conversions at fixed prices; not yet launched.
    pub const PRELAUNCH: u32 = 0x02;
    /// Launch failed; all transfers are treated as refunds.
    pub const REFUNDING: u32 = 0x04;
    /// The single transition block fixing opening reserves.
    pub const LAUNCH_CLEAR: u32 = 0x08;
    /// Launch succeeded; normal trading with dynamic prices.
    pub const LAUNCH_CONFIRMED: u32 = 0x10;
    /// Full market dynamics; conversion prices float.
    pub const LAUNCH_COMPLETE: u32 = 0x20;
}

/// Deterministic minstd_rand0 linear congruential generator.
///
/// Consensus requires every node to distribute emission remainders
/// identically, so the generator is pinned here rather than taken from a
/// platform RNG. Seeds congruent to zero are replaced by one, as the
/// underlying engine requires.
#[derive(Clone, Debug)]
struct MinStdRand0 {
    state: u64,
}

impl MinStdRand0 {
    const MODULUS: u64 = 2_147_483_647;
    const MULTIPLIER: u64 = 16_807;

    fn new(seed: u64) -> Self {
        let state = seed % Self::MODULUS;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    fn next(&mut self) -> u64 {
        self.state = (self.state * Self::MULTIPLIER) % Self::MODULUS;
        self.state
    }
}

/// Fisher-Yates shuffle driven by [`MinStdRand0`].
fn deterministic_shuffle<T>(items: &mut [T], rng: &mut MinStdRand0) {
    for i in (1..items.len()).rev() {
        let j = (rng.next() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

/// The state of one currency at a block boundary.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CurrencyState {
    /// Lifecycle and shape flags, see [`flags`].
    pub flags: u32,
    /// Reserve currency ids, in definition order.
    pub currencies: Vec<CurrencyId>,
    /// One weight per reserve, each in (0, SATOSHIDEN].
    pub weights: Vec<Amount>,
    /// One reserve balance per reserve, each >= 0.
    pub reserves: Vec<Amount>,
    /// Supply at the start of the current block.
    pub initial_supply: Amount,
    /// Units emitted in the current block.
    pub emitted: Amount,
    /// Total issued fractional units.
    pub supply: Amount,
}

impl CurrencyState {
    /// Whether this currency is backed by a reserve basket.
    pub fn is_fractional(&self) -> bool {
        self.flags & flags::FRACTIONAL != 0
    }

    /// Whether the currency is still accepting pre-conversions.
    pub fn is_prelaunch(&self) -> bool {
        self.flags & flags::PRELAUNCH != 0
    }

    /// Whether the launch failed and transfers refund.
    pub fn is_refunding(&self) -> bool {
        self.flags & flags::REFUNDING != 0
    }

    /// Whether this is the launch transition block.
    pub fn is_launch_clear(&self) -> bool {
        self.flags & flags::LAUNCH_CLEAR != 0
    }

    /// Whether the launch has been confirmed.
    pub fn is_launch_confirmed(&self) -> bool {
        self.flags & flags::LAUNCH_CONFIRMED != 0
    }

    /// Whether the launch-complete marker has been observed.
    pub fn is_launch_complete_marker(&self) -> bool {
        self.flags & flags::LAUNCH_COMPLETE != 0
    }

    /// Structural validity: parallel vectors, a bounded reserve count
    /// with no duplicate ids, every weight in (0, SATOSHIDEN] with the
    /// total at most SATOSHIDEN, and non-negative reserves.
    ///
    /// Supply is deliberately unchecked; it may run negative during
    /// currency initialization.
    pub fn is_valid(&self) -> bool {
        let n = self.currencies.len();
        if self.weights.len() != n || self.reserves.len() != n {
            return false;
        }
        if n > mrd_reserve_types::constants::MAX_RESERVE_CURRENCIES {
            return false;
        }
        if self.reserve_index_map().len() != n {
            return false;
        }
        let mut total_weight: Amount = 0;
        for weight in &self.weights {
            if *weight <= 0 || *weight > SATOSHIDEN {
                return false;
            }
            total_weight += weight;
        }
        if total_weight > SATOSHIDEN {
            return false;
        }
        self.reserves.iter().all(|reserve| *reserve >= 0)
    }

    /// Map from reserve currency id to position.
    pub fn reserve_index_map(&self) -> std::collections::BTreeMap<CurrencyId, usize> {
        self.currencies
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect()
    }

    /// The reserves as a currency value map.
    pub fn reserve_value_map(&self) -> CurrencyValueMap {
        CurrencyValueMap::from_pairs(
            self.currencies
                .iter()
                .copied()
                .zip(self.reserves.iter().copied()),
        )
    }

    /// Price of one fractional unit denominated in reserve `index`,
    /// truncating toward zero.
    ///
    /// Zero supply or a zero reserve is substituted by one base unit, which
    /// only matters for pre-launch states. A zero price means the leg has
    /// no liquidity.
    pub fn price_in_reserve(&self, index: usize) -> Amount {
        if index >= self.currencies.len() {
            return 0;
        }
        let weight = *self.weights.get(index).unwrap_or(&0);
        if weight <= 0 {
            return 0;
        }
        let supply = if self.supply > 0 { self.supply } else { 1 };
        let reserve = if self.reserves[index] > 0 {
            self.reserves[index]
        } else {
            1
        };
        let numerator = big(reserve) * big(SATOSHIDEN) * big(SATOSHIDEN);
        let denominator = big(supply) * big(weight);
        to_amount(numerator / denominator).unwrap_or(Amount::MAX)
    }

    /// Prices of one fractional unit in every reserve.
    pub fn prices_in_reserve(&self) -> Vec<Amount> {
        (0..self.currencies.len())
            .map(|i| self.price_in_reserve(i))
            .collect()
    }

    /// Convert a reserve amount to fractional units at an explicit rate.
    /// A zero rate yields zero; overflow yields `None`.
    pub fn reserve_to_native_raw(reserve_amount: Amount, rate: Amount) -> Option<Amount> {
        if reserve_amount < 0 {
            return None;
        }
        if rate <= 0 {
            return Some(0);
        }
        mul_div(reserve_amount, SATOSHIDEN, rate)
    }

    /// Convert a fractional amount to reserve units at an explicit rate.
    pub fn native_to_reserve_raw(native_amount: Amount, rate: Amount) -> Option<Amount> {
        if native_amount < 0 || rate < 0 {
            return None;
        }
        mul_div(native_amount, rate, SATOSHIDEN)
    }

    /// Convert a reserve amount to fractional units at the current price of
    /// reserve `index`.
    pub fn reserve_to_native(&self, reserve_amount: Amount, index: usize) -> Option<Amount> {
        Self::reserve_to_native_raw(reserve_amount, self.price_in_reserve(index))
    }

    /// Convert a fractional amount to reserve units at the current price of
    /// reserve `index`.
    pub fn native_to_reserve(&self, native_amount: Amount, index: usize) -> Option<Amount> {
        Self::native_to_reserve_raw(native_amount, self.price_in_reserve(index))
    }

    /// Apply an emission of `to_emit` new units, preserving the total
    /// reserve ratio of a fractional currency by scaling every weight down
    /// proportionally.
    ///
    /// The new total ratio is computed in 256-bit space with banker's
    /// rounding; the per-currency decrease truncates, and the remaining
    /// satoshis of decrease are spread one per currency in an order fixed
    /// by a minstd_rand0-seeded shuffle. Reserves are untouched.
    pub fn update_with_emission(&mut self, to_emit: Amount) {
        self.initial_supply = self.supply;
        self.emitted = 0;

        // with no supply or no reserves we cannot function as a reserve
        // currency, so the emission is a plain supply change
        if !self.is_fractional()
            || self.supply <= 0
            || self.reserve_value_map().all_le(&CurrencyValueMap::new())
        {
            if self.supply < 0 {
                self.emitted = to_emit;
                self.supply = to_emit;
            } else {
                self.emitted = to_emit;
                self.supply = self.supply.saturating_add(to_emit);
            }
            return;
        }

        if to_emit == 0 {
            return;
        }

        let initial_ratio: Amount = self.weights.iter().sum();

        let big_satoshi = big(SATOSHIDEN);
        let mut scratch = (big(initial_ratio) * big(self.supply) * big_satoshi)
            / (big(self.supply) + big(to_emit));
        let mut ratio = scratch / big_satoshi;
        // cap ratio at 1
        if ratio >= big_satoshi {
            scratch = big_satoshi * big_satoshi;
            ratio = big_satoshi;
        }

        let mut new_ratio = ratio.low_u64() as Amount;
        let remainder = (scratch - ratio * big_satoshi).low_u64() as Amount;
        // banker's rounding: if odd, round up at half; if even, round down
        if remainder > (SATOSHIDEN >> 1) || (remainder == (SATOSHIDEN >> 1) && new_ratio & 1 == 1)
        {
            new_ratio += 1;
        }

        let ratio_delta = initial_ratio - new_ratio;
        let mut total_updates: Amount = 0;
        for weight in self.weights.iter_mut() {
            let weight_delta = mul_div(ratio_delta, *weight, SATOSHIDEN).unwrap_or(0);
            *weight -= weight_delta;
            total_updates += weight_delta;
        }

        let update_extra = ratio_delta - total_updates;
        if update_extra != 0 {
            let count = self.currencies.len() as Amount;
            let for_all = update_extra / count;
            let for_some = update_extra % count;

            let seed = self.supply.wrapping_add(for_all).wrapping_add(for_some);
            let mut rng = MinStdRand0::new(seed as u64);

            let mut extra_weight: Vec<Amount> = (0..count)
                .map(|i| if i < for_some { for_all + 1 } else { for_all })
                .collect();
            deterministic_shuffle(&mut extra_weight, &mut rng);
            for (weight, extra) in self.weights.iter_mut().zip(&extra_weight) {
                *weight -= extra;
            }
        }

        self.emitted = to_emit;
        self.supply = self.initial_supply.saturating_add(self.emitted);
    }
}

impl ConsensusEncode for CurrencyState {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.flags);
        put_id_vec(out, &self.currencies);
        put_amount_vec(out, &self.weights);
        put_amount_vec(out, &self.reserves);
        mrd_reserve_types::encode::put_i64(out, self.initial_supply);
        mrd_reserve_types::encode::put_i64(out, self.emitted);
        mrd_reserve_types::encode::put_i64(out, self.supply);
    }
}

impl ConsensusDecode for CurrencyState {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            flags: reader.read_u32()?,
            currencies: read_id_vec(reader)?,
            weights: read_amount_vec(reader)?,
            reserves: read_amount_vec(reader)?,
            initial_supply: reader.read_i64()?,
            emitted: reader.read_i64()?,
            supply: reader.read_i64()?,
        })
    }
}

/// A currency state plus the block-local flow vectors and prices recorded
/// in the coinbase.
///
/// All vectors are indexed by reserve position.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CoinbaseCurrencyState {
    /// The underlying currency state.
    pub state: CurrencyState,
    /// Reserve currency flowing in this block, per reserve.
    pub reserve_in: Vec<Amount>,
    /// Fractional currency converted from each reserve this block.
    pub native_in: Vec<Amount>,
    /// Reserve currency flowing out this block, per reserve.
    pub reserve_out: Vec<Amount>,
    /// Fractional price in each reserve used for this block's conversions.
    pub conversion_price: Vec<Amount>,
    /// Price used for the second hop of reserve-to-reserve routing.
    pub via_conversion_price: Vec<Amount>,
    /// Fees accrued this block, per reserve.
    pub fees: Vec<Amount>,
    /// Conversion fees accrued this block, per reserve.
    pub conversion_fees: Vec<Amount>,
    /// Fees accrued in the native currency.
    pub native_fees: Amount,
    /// Conversion fees accrued in the native currency.
    pub native_conversion_fees: Amount,
    /// Fractional currency leaving this block.
    pub native_out: Amount,
    /// Fractional currency created by pre-conversions this block.
    pub pre_converted_out: Amount,
}

impl CoinbaseCurrencyState {
    /// Wrap a currency state, zeroing every per-block vector to the
    /// reserve count.
    pub fn from_state(state: CurrencyState) -> Self {
        let n = state.currencies.len();
        Self {
            state,
            reserve_in: vec![0; n],
            native_in: vec![0; n],
            reserve_out: vec![0; n],
            conversion_price: vec![0; n],
            via_conversion_price: vec![0; n],
            fees: vec![0; n],
            conversion_fees: vec![0; n],
            native_fees: 0,
            native_conversion_fees: 0,
            native_out: 0,
            pre_converted_out: 0,
        }
    }

    /// Reset every per-block flow for the next block, leaving reserves,
    /// supply, and prices in place.
    pub fn clear_for_next_block(&mut self) {
        let n = self.state.currencies.len();
        self.reserve_in = vec![0; n];
        self.native_in = vec![0; n];
        self.reserve_out = vec![0; n];
        self.fees = vec![0; n];
        self.conversion_fees = vec![0; n];
        self.native_fees = 0;
        self.native_conversion_fees = 0;
        self.native_out = 0;
        self.pre_converted_out = 0;
        self.state.initial_supply = self.state.supply;
        self.state.emitted = 0;
    }

    /// Roll reserves and supply back to their pre-block values by undoing
    /// this block's flows, then clear the flows.
    pub fn revert_reserves_and_supply(&mut self) {
        for i in 0..self.state.currencies.len() {
            self.state.reserves[i] = self
                .state
                .reserves[i]
                .saturating_add(self.reserve_out[i])
                .saturating_sub(self.reserve_in[i]);
            self.state.supply = self.state.supply.saturating_add(self.native_in[i]);
        }
        self.state.supply = self
            .state
            .supply
            .saturating_sub(self.native_out.max(self.state.emitted) - self.pre_converted_out);
        self.clear_for_next_block();
    }
}

impl ConsensusEncode for CoinbaseCurrencyState {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        self.state.consensus_encode(out);
        put_amount_vec(out, &self.reserve_in);
        put_amount_vec(out, &self.native_in);
        put_amount_vec(out, &self.reserve_out);
        put_amount_vec(out, &self.conversion_price);
        put_amount_vec(out, &self.via_conversion_price);
        put_amount_vec(out, &self.fees);
        put_amount_vec(out, &self.conversion_fees);
        mrd_reserve_types::encode::put_i64(out, self.native_fees);
        mrd_reserve_types::encode::put_i64(out, self.native_conversion_fees);
        mrd_reserve_types::encode::put_i64(out, self.native_out);
        mrd_reserve_types::encode::put_i64(out, self.pre_converted_out);
    }
}

impl ConsensusDecode for CoinbaseCurrencyState {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            state: CurrencyState::consensus_decode(reader)?,
            reserve_in: read_amount_vec(reader)?,
            native_in: read_amount_vec(reader)?,
            reserve_out: read_amount_vec(reader)?,
            conversion_price: read_amount_vec(reader)?,
            via_conversion_price: read_amount_vec(reader)?,
            fees: read_amount_vec(reader)?,
            conversion_fees: read_amount_vec(reader)?,
            native_fees: reader.read_i64()?,
            native_conversion_fees: reader.read_i64()?,
            native_out: reader.read_i64()?,
            pre_converted_out: reader.read_i64()?,
        })
    }
}

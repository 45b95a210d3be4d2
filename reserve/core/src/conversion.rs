// Copyright (c) 2024-2025 The Meridian Foundation

//! The aggregated multi-currency conversion engine.
//!
//! One call prices an entire block's worth of buys and sells against a
//! fractional currency at once. Net flows are normalized by weight,
//! stacked into layers of equal weight-adjusted height, and each layer is
//! executed as a single aggregate purchase or sale. Buys and sells are
//! each computed against both the pre- and post-state of the other side
//! and averaged, which makes the resulting prices independent of the
//! order transfers appeared in.

use tracing::warn;

use mrd_reserve_types::constants::SATOSHIDEN;
use mrd_reserve_types::Amount;

use crate::arith::{mul_div, HighPrecision};
use crate::error::ConversionError;
use crate::state::CurrencyState;

/// Fractional units created by adding `reserve_in` of normalized reserve:
/// `supply * ((1 + reserve_in / reserve)^ratio - 1)`.
///
/// Zero supply or reserve is substituted by one base unit, which only
/// matters in pre-launch states. `None` when the result cannot fit an
/// amount.
pub fn calculate_fractional_out(
    reserve_in: Amount,
    supply: Amount,
    normalized_reserve: Amount,
    reserve_ratio: Amount,
) -> Option<Amount> {
    let one = HighPrecision::one();
    let reserve_in = HighPrecision::from_amount(reserve_in);
    let supply = HighPrecision::from_amount(if supply != 0 { supply } else { 1 });
    let reserve =
        HighPrecision::from_amount(if normalized_reserve != 0 { normalized_reserve } else { 1 });
    let ratio = HighPrecision::from_amount(reserve_ratio);

    let base = reserve_in.checked_div(reserve)?.checked_add(one)?;
    let grown = base.powf(ratio)?;
    supply
        .checked_mul(grown.checked_sub(one)?)?
        .to_amount()
        .filter(|amount| *amount >= 0)
}

/// Normalized reserve released by redeeming `fractional_in` units:
/// `reserve * (1 - (1 - fractional_in / supply)^(1 / ratio))`.
pub fn calculate_reserve_out(
    fractional_in: Amount,
    supply: Amount,
    normalized_reserve: Amount,
    reserve_ratio: Amount,
) -> Option<Amount> {
    let one = HighPrecision::one();
    let fractional_in = HighPrecision::from_amount(fractional_in);
    let supply = HighPrecision::from_amount(if supply != 0 { supply } else { 1 });
    let reserve =
        HighPrecision::from_amount(if normalized_reserve != 0 { normalized_reserve } else { 1 });
    let ratio = HighPrecision::from_amount(reserve_ratio);

    let retained = one.checked_sub(fractional_in.checked_div(supply)?)?;
    let shrunk = retained.powf(one.checked_div(ratio)?)?;
    reserve
        .checked_mul(one.checked_sub(shrunk)?)?
        .to_amount()
        .filter(|amount| *amount >= 0)
}

/// The result of a successful aggregated conversion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConversionOutcome {
    /// Per-reserve conversion price of one fractional unit. Currencies
    /// with no input retain their prior price in reserve.
    pub rates: Vec<Amount>,
    /// Prices for the second hop of reserve-to-reserve routes; empty when
    /// no cross conversions were requested.
    pub via_prices: Vec<Amount>,
    /// The currency state after applying all conversions.
    pub new_state: CurrencyState,
}

/// One aggregate layer: currencies sharing an equal weight-adjusted flow.
#[derive(Clone, Debug, Default)]
struct Layer {
    total_weight: Amount,
    total_amount: Amount,
    members: Vec<usize>,
}

/// Stack sorted net flows into layers of equal weight-adjusted height.
///
/// Entries are `(delta_ratio, remaining_amount, currency_index)` sorted
/// ascending by ratio; the lowest non-zero ratio bounds the first layer,
/// the next the second, and so on. Every currency at or above a layer's
/// bound contributes `height * weight / max_weight` of its remainder.
fn build_layers(
    entries: &mut [(Amount, Amount, usize)],
    weights: &[Amount],
    max_weight: Amount,
) -> Result<Vec<Layer>, ConversionError> {
    let mut layers = Vec::new();
    let mut layer_amount: Amount = 0;
    let mut pos = 0usize;

    while pos < entries.len() {
        while pos < entries.len() && entries[pos].0 <= layer_amount {
            pos += 1;
        }
        if pos >= entries.len() {
            break;
        }
        let layer_start = layer_amount;
        layer_amount = entries[pos].0;
        let layer_height = layer_amount - layer_start;

        let mut layer = Layer::default();
        for entry in entries[pos..].iter_mut() {
            let weight = weights[entry.2];
            let amount =
                mul_div(layer_height, weight, max_weight).ok_or(ConversionError::Overflow)?;
            entry.1 -= amount;
            if entry.1 < 0 {
                warn!("underflow distributing conversion layers");
                return Err(ConversionError::Overflow);
            }
            layer.total_weight += weight;
            layer.total_amount = layer
                .total_amount
                .checked_add(amount)
                .ok_or(ConversionError::Overflow)?;
            layer.members.push(entry.2);
        }
        layers.push(layer);
    }
    Ok(layers)
}

impl CurrencyState {
    /// Compute conversion prices and the next state for an aggregated set
    /// of flows against this fractional currency.
    ///
    /// `input_reserves[i]` is reserve currency `i` buying fractional;
    /// `input_fractional[i]` is fractional selling into reserve `i`.
    /// `cross_conversions[i][j]`, when present, routes reserve-`i`
    /// proceeds onward into reserve `j` and produces the via price vector.
    ///
    /// On any refusal the caller's state is untouched and it keeps its
    /// prior prices; a batch with no non-zero input succeeds trivially
    /// with the prior prices.
    pub fn convert_amounts(
        &self,
        input_reserves: &[Amount],
        input_fractional: &[Amount],
        cross_conversions: Option<&[Vec<Amount>]>,
    ) -> Result<ConversionOutcome, ConversionError> {
        let n = self.currencies.len();

        if input_reserves.len() != n
            || input_fractional.len() != n
            || self.weights.len() != n
            || self.reserves.len() != n
        {
            warn!("conversion input sizes do not match reserve count");
            return Err(ConversionError::InvalidParameters);
        }
        if let Some(cross) = cross_conversions {
            if cross.len() != n || cross.iter().any(|row| row.len() != n) {
                warn!("cross-conversion matrix is not square");
                return Err(ConversionError::InvalidParameters);
            }
        }

        let have_conversion = input_reserves.iter().any(|v| *v != 0)
            || input_fractional.iter().any(|v| *v != 0);
        if !have_conversion {
            // not considered an error
            return Ok(ConversionOutcome {
                rates: self.prices_in_reserve(),
                via_prices: Vec::new(),
                new_state: self.clone(),
            });
        }

        if input_reserves.iter().chain(input_fractional).any(|v| *v < 0) {
            warn!("negative input amount for conversion");
            return Err(ConversionError::NegativeInput);
        }

        let mut total_weight: Amount = 0;
        let mut max_weight: Amount = 0;
        for weight in &self.weights {
            if *weight <= 0 {
                warn!("zero weight currency for conversion");
                return Err(ConversionError::ZeroWeight);
            }
            total_weight += weight;
            max_weight = max_weight.max(*weight);
        }
        if max_weight == 0 {
            return Err(ConversionError::NotFractional);
        }
        if total_weight > SATOSHIDEN {
            warn!("total currency backing weight exceeds 100%");
            return Err(ConversionError::ExcessiveReserveRatio);
        }

        // reduce each currency to a net fractional inflow or outflow,
        // keyed by the flow scaled to the largest weight so that layer
        // heights are comparable across currencies
        let mut sells: Vec<(Amount, Amount, usize)> = Vec::new();
        let mut buys: Vec<(Amount, Amount, usize)> = Vec::new();
        for i in 0..n {
            let as_native = self
                .reserve_to_native(input_reserves[i], i)
                .ok_or(ConversionError::Overflow)?;
            let net_fractional = input_fractional[i] - as_native;
            if net_fractional == 0 {
                continue;
            }
            let magnitude = net_fractional.unsigned_abs() as Amount;
            let delta_ratio =
                mul_div(magnitude, max_weight, self.weights[i]).ok_or(ConversionError::Overflow)?;
            if net_fractional > 0 {
                sells.push((delta_ratio, magnitude, i));
            } else {
                buys.push((delta_ratio, magnitude, i));
            }
        }
        sells.sort_by_key(|entry| entry.0);
        buys.sort_by_key(|entry| entry.0);

        let layers_out = build_layers(&mut buys, &self.weights, max_weight)?;
        let layers_in = build_layers(&mut sells, &self.weights, max_weight)?;

        // per-currency (first-pass, second-pass) deltas
        let mut bought: Vec<Option<(Amount, Amount)>> = vec![None; n];
        let mut sold: Vec<Option<(Amount, Amount)>> = vec![None; n];

        // buy pass against the starting state
        let mut add_supply: Amount = 0;
        let mut add_normalized_reserves: Amount = 0;
        for layer in &layers_out {
            let total_layer_reserves =
                mul_div(self.supply, layer.total_weight, SATOSHIDEN)
                    .ok_or(ConversionError::Overflow)?
                    + add_normalized_reserves;
            add_normalized_reserves = add_normalized_reserves
                .checked_add(layer.total_amount)
                .ok_or(ConversionError::Overflow)?;
            let new_supply = calculate_fractional_out(
                layer.total_amount,
                self.supply.checked_add(add_supply).ok_or(ConversionError::Overflow)?,
                total_layer_reserves,
                layer.total_weight,
            )
            .ok_or(ConversionError::Overflow)?;
            add_supply = add_supply
                .checked_add(new_supply)
                .ok_or(ConversionError::Overflow)?;
            for idx in &layer.members {
                let share = mul_div(new_supply, self.weights[*idx], layer.total_weight)
                    .ok_or(ConversionError::Overflow)?;
                let entry = bought[*idx].get_or_insert((0, 0));
                entry.0 = entry.0.checked_add(share).ok_or(ConversionError::Overflow)?;
            }
        }
        let supply_after_buy = self
            .supply
            .checked_add(add_supply)
            .ok_or(ConversionError::Overflow)?;

        // sell pass, computed against both the pre-buy and post-buy states
        let mut add_supply_sell: Amount = 0;
        let mut add_normalized_bb: Amount = 0;
        let mut add_normalized_ab: Amount = 0;
        for layer in &layers_in {
            let total_reserves_bb = mul_div(self.supply, layer.total_weight, SATOSHIDEN)
                .ok_or(ConversionError::Overflow)?
                + add_normalized_bb;
            let total_reserves_ab = mul_div(supply_after_buy, layer.total_weight, SATOSHIDEN)
                .ok_or(ConversionError::Overflow)?
                + add_normalized_ab;

            let reserve_out_bb = calculate_reserve_out(
                layer.total_amount,
                self.supply + add_supply_sell,
                total_reserves_bb + add_normalized_bb,
                layer.total_weight,
            )
            .ok_or(ConversionError::Overflow)?;
            let reserve_out_ab = calculate_reserve_out(
                layer.total_amount,
                supply_after_buy + add_supply_sell,
                total_reserves_ab + add_normalized_ab,
                layer.total_weight,
            )
            .ok_or(ConversionError::Overflow)?;

            // input fractional burns; output reserves leave the basket
            add_supply_sell -= layer.total_amount;
            add_normalized_bb -= reserve_out_bb;
            add_normalized_ab -= reserve_out_ab;

            for idx in &layer.members {
                let share_bb = mul_div(reserve_out_bb, self.weights[*idx], layer.total_weight)
                    .ok_or(ConversionError::Overflow)?;
                let share_ab = mul_div(reserve_out_ab, self.weights[*idx], layer.total_weight)
                    .ok_or(ConversionError::Overflow)?;
                let entry = sold[*idx].get_or_insert((0, 0));
                entry.0 = entry.0.checked_add(share_bb).ok_or(ConversionError::Overflow)?;
                entry.1 = entry.1.checked_add(share_ab).ok_or(ConversionError::Overflow)?;
            }
        }
        let supply_after_sell = self.supply + add_supply_sell;

        // buy pass again, now against the post-sell state
        let mut add_supply_second: Amount = 0;
        let mut add_normalized_second: Amount = 0;
        for layer in &layers_out {
            let total_layer_reserves =
                mul_div(supply_after_sell, layer.total_weight, SATOSHIDEN)
                    .ok_or(ConversionError::Overflow)?
                    + add_normalized_second;
            add_normalized_second = add_normalized_second
                .checked_add(layer.total_amount)
                .ok_or(ConversionError::Overflow)?;
            let new_supply = calculate_fractional_out(
                layer.total_amount,
                supply_after_sell
                    .checked_add(add_supply_second)
                    .ok_or(ConversionError::Overflow)?,
                total_layer_reserves,
                layer.total_weight,
            )
            .ok_or(ConversionError::Overflow)?;
            add_supply_second = add_supply_second
                .checked_add(new_supply)
                .ok_or(ConversionError::Overflow)?;
            for idx in &layer.members {
                let share = mul_div(new_supply, self.weights[*idx], layer.total_weight)
                    .ok_or(ConversionError::Overflow)?;
                let entry = bought[*idx].as_mut().ok_or(ConversionError::Overflow)?;
                entry.1 = entry.1.checked_add(share).ok_or(ConversionError::Overflow)?;
            }
        }

        // price synthesis: attribute to each currency the mean of its two
        // computed deltas and derive its conversion price
        let mut rates = vec![0 as Amount; n];
        let mut new_state = self.clone();
        for i in 0..n {
            if let Some((before, after)) = bought[i] {
                let fraction_delta = (((before as i128) + (after as i128)) >> 1) as Amount;
                let fractional_size = input_fractional[i] + fraction_delta;
                if fractional_size <= 0 {
                    return Err(ConversionError::Overflow);
                }
                rates[i] = mul_div(input_reserves[i], SATOSHIDEN, fractional_size)
                    .ok_or(ConversionError::Overflow)?;
                new_state.supply = new_state
                    .supply
                    .checked_add(fraction_delta)
                    .ok_or(ConversionError::Overflow)?;
                // reserves were normalized 1:1 against fractional above, so
                // recover the actual reserve amount at the derived rate
                let reserve_gain = if input_fractional[i] != 0 {
                    Self::native_to_reserve_raw(fraction_delta, rates[i])
                        .ok_or(ConversionError::Overflow)?
                } else {
                    input_reserves[i]
                };
                new_state.reserves[i] = new_state.reserves[i]
                    .checked_add(reserve_gain)
                    .ok_or(ConversionError::Overflow)?;
            } else if let Some((before, after)) = sold[i] {
                let reserve_delta = (((before as i128) + (after as i128)) >> 1) as Amount;
                let adjusted_delta = self
                    .native_to_reserve(reserve_delta, i)
                    .ok_or(ConversionError::Overflow)?;
                let reserve_size = input_reserves[i] + adjusted_delta;
                if input_fractional[i] <= 0 {
                    return Err(ConversionError::Overflow);
                }
                rates[i] = mul_div(reserve_size, SATOSHIDEN, input_fractional[i])
                    .ok_or(ConversionError::Overflow)?;
                new_state.supply -= input_fractional[i];
                new_state.reserves[i] -= adjusted_delta;
            }
        }

        // route reserve-to-reserve proceeds through a second conversion
        // against the updated state to derive via prices
        let mut via_prices = Vec::new();
        if let Some(cross) = cross_conversions {
            let mut any_route = false;
            let mut fractions_to_convert = vec![0 as Amount; n];
            for i in 0..n {
                for j in 0..n {
                    if cross[i][j] != 0 {
                        any_route = true;
                        let as_fractional = Self::reserve_to_native_raw(cross[i][j], rates[i])
                            .ok_or(ConversionError::Overflow)?;
                        fractions_to_convert[j] = fractions_to_convert[j]
                            .checked_add(as_fractional)
                            .ok_or(ConversionError::Overflow)?;
                    }
                }
            }
            if any_route {
                let zeroes = vec![0 as Amount; n];
                let intermediate = new_state.clone();
                match intermediate.convert_amounts(&zeroes, &fractions_to_convert, None) {
                    Ok(second) => {
                        via_prices = second.rates;
                        new_state = second.new_state;
                    }
                    Err(err) => {
                        // the second hop refusing leaves the first hop's
                        // state standing and falls back to its prices
                        warn!("via conversion refused: {err}");
                        via_prices = intermediate.prices_in_reserve();
                    }
                }
            }
        }

        for i in 0..n {
            if rates[i] == 0 {
                rates[i] = self.price_in_reserve(i);
            }
        }

        Ok(ConversionOutcome {
            rates,
            via_prices,
            new_state,
        })
    }

    /// Single-reserve convenience wrapper around [`Self::convert_amounts`].
    pub fn convert_amounts_single(
        &self,
        input_reserve: Amount,
        input_fractional: Amount,
        reserve_index: usize,
    ) -> Result<(Amount, CurrencyState), ConversionError> {
        let n = self.currencies.len();
        if reserve_index >= n {
            return Err(ConversionError::InvalidParameters);
        }
        let mut input_reserves = vec![0; n];
        let mut input_fractionals = vec![0; n];
        input_reserves[reserve_index] = input_reserve;
        input_fractionals[reserve_index] = input_fractional;
        let outcome = self.convert_amounts(&input_reserves, &input_fractionals, None)?;
        Ok((outcome.rates[reserve_index], outcome.new_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::flags;
    use mrd_reserve_types::CurrencyId;

    fn id(byte: u8) -> CurrencyId {
        CurrencyId::new([byte; 20])
    }

    fn fractional_state(
        weights: Vec<Amount>,
        reserves: Vec<Amount>,
        supply: Amount,
    ) -> CurrencyState {
        let currencies = (0..weights.len()).map(|i| id(i as u8 + 1)).collect();
        CurrencyState {
            flags: flags::FRACTIONAL | flags::LAUNCH_CONFIRMED,
            currencies,
            weights,
            reserves,
            initial_supply: supply,
            emitted: 0,
            supply,
        }
    }

    #[test]
    fn single_reserve_purchase_at_par() {
        // supply 4, one reserve of 4 at 100% weight: buying with 1 reserve
        // unit mints exactly 1 fractional at price 1:1
        let state = fractional_state(vec![SATOSHIDEN], vec![4 * SATOSHIDEN], 4 * SATOSHIDEN);
        let outcome = state
            .convert_amounts(&[SATOSHIDEN], &[0], None)
            .unwrap();
        assert_eq!(outcome.rates, vec![SATOSHIDEN]);
        assert_eq!(outcome.new_state.supply, 5 * SATOSHIDEN);
        assert_eq!(outcome.new_state.reserves, vec![5 * SATOSHIDEN]);
    }

    #[test]
    fn balanced_basket_purchase_prices_equal() {
        let state = fractional_state(
            vec![SATOSHIDEN / 4; 4],
            vec![1_000 * SATOSHIDEN; 4],
            4_000 * SATOSHIDEN,
        );
        let inputs = [SATOSHIDEN, SATOSHIDEN, SATOSHIDEN, SATOSHIDEN];
        let outcome = state.convert_amounts(&inputs, &[0; 4], None).unwrap();

        // all four currencies form one 100% layer, so the aggregate is a
        // par purchase and all rates agree
        assert!(outcome.rates.iter().all(|rate| *rate == outcome.rates[0]));
        assert_eq!(outcome.rates[0], SATOSHIDEN);
        assert_eq!(outcome.new_state.supply, 4_004 * SATOSHIDEN);
        for reserve in &outcome.new_state.reserves {
            assert_eq!(*reserve, 1_001 * SATOSHIDEN);
        }
    }

    #[test]
    fn unbalanced_purchase_moves_the_price() {
        let state = fractional_state(
            vec![SATOSHIDEN / 4; 4],
            vec![1_000 * SATOSHIDEN; 4],
            4_000 * SATOSHIDEN,
        );
        // a large one-sided purchase of r0 pushes fractional above par in r0
        let outcome = state
            .convert_amounts(&[100 * SATOSHIDEN, 0, 0, 0], &[0; 4], None)
            .unwrap();
        assert!(outcome.rates[0] > SATOSHIDEN);
        // untouched currencies keep their prior price
        assert_eq!(outcome.rates[1], state.price_in_reserve(1));
        assert!(outcome.new_state.supply > state.supply);
    }

    #[test]
    fn order_independence_under_reversal() {
        let weights = vec![40_000_000, 30_000_000, 20_000_000, 10_000_000];
        let reserves = vec![
            1_000 * SATOSHIDEN,
            600 * SATOSHIDEN,
            500 * SATOSHIDEN,
            250 * SATOSHIDEN,
        ];
        let supply = 3_000 * SATOSHIDEN;
        let state = fractional_state(weights.clone(), reserves.clone(), supply);
        let input_reserves = [7 * SATOSHIDEN, 0, 13 * SATOSHIDEN, SATOSHIDEN];
        let input_fractional = [0, 5 * SATOSHIDEN, 0, 2 * SATOSHIDEN];

        let forward = state
            .convert_amounts(&input_reserves, &input_fractional, None)
            .unwrap();

        let reversed_state = fractional_state(
            weights.iter().rev().copied().collect(),
            reserves.iter().rev().copied().collect(),
            supply,
        );
        let reversed_reserves: Vec<Amount> = input_reserves.iter().rev().copied().collect();
        let reversed_fractional: Vec<Amount> = input_fractional.iter().rev().copied().collect();
        let backward = reversed_state
            .convert_amounts(&reversed_reserves, &reversed_fractional, None)
            .unwrap();

        let forward_rates_reversed: Vec<Amount> = forward.rates.iter().rev().copied().collect();
        assert_eq!(backward.rates, forward_rates_reversed);
        assert_eq!(backward.new_state.supply, forward.new_state.supply);
        let forward_reserves_reversed: Vec<Amount> =
            forward.new_state.reserves.iter().rev().copied().collect();
        assert_eq!(backward.new_state.reserves, forward_reserves_reversed);
    }

    #[test]
    fn determinism_across_runs() {
        let state = fractional_state(
            vec![35_000_000, 35_000_000, 30_000_000],
            vec![900 * SATOSHIDEN, 1_100 * SATOSHIDEN, 700 * SATOSHIDEN],
            5_000 * SATOSHIDEN,
        );
        let reserves_in = [3 * SATOSHIDEN, 0, 11 * SATOSHIDEN];
        let fractional_in = [0, 17 * SATOSHIDEN, 0];
        let first = state
            .convert_amounts(&reserves_in, &fractional_in, None)
            .unwrap();
        let second = state
            .convert_amounts(&reserves_in, &fractional_in, None)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn monotone_buy_output() {
        let state = fractional_state(
            vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
            vec![1_000 * SATOSHIDEN, 1_000 * SATOSHIDEN],
            2_000 * SATOSHIDEN,
        );
        let mut last_minted = 0;
        for input in [SATOSHIDEN, 2 * SATOSHIDEN, 5 * SATOSHIDEN, 50 * SATOSHIDEN] {
            let outcome = state.convert_amounts(&[input, 0], &[0, 0], None).unwrap();
            let minted = outcome.new_state.supply - state.supply;
            assert!(minted >= last_minted, "minting shrank as input grew");
            last_minted = minted;
        }
    }

    #[test]
    fn overflow_is_refused_without_state_change() {
        // an undervalued reserve makes the reserve->native widening
        // overflow the amount range
        let state = fractional_state(vec![SATOSHIDEN], vec![SATOSHIDEN], 4 * SATOSHIDEN);
        assert_eq!(state.price_in_reserve(0), SATOSHIDEN / 4);
        let snapshot = state.clone();
        let result = state.convert_amounts(&[1 << 62], &[0], None);
        assert_eq!(result, Err(ConversionError::Overflow));
        assert_eq!(state, snapshot);
    }

    #[test]
    fn size_mismatch_is_invalid() {
        let state = fractional_state(vec![SATOSHIDEN], vec![SATOSHIDEN], SATOSHIDEN);
        assert_eq!(
            state.convert_amounts(&[1, 2], &[0], None),
            Err(ConversionError::InvalidParameters)
        );
        let bad_cross = vec![vec![0; 2]; 1];
        assert_eq!(
            state.convert_amounts(&[1], &[0], Some(&bad_cross)),
            Err(ConversionError::InvalidParameters)
        );
    }

    #[test]
    fn negative_input_is_refused() {
        let state = fractional_state(vec![SATOSHIDEN], vec![SATOSHIDEN], SATOSHIDEN);
        assert_eq!(
            state.convert_amounts(&[-1], &[0], None),
            Err(ConversionError::NegativeInput)
        );
    }

    #[test]
    fn empty_input_returns_prior_prices() {
        let state = fractional_state(
            vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
            vec![500 * SATOSHIDEN, 700 * SATOSHIDEN],
            1_000 * SATOSHIDEN,
        );
        let outcome = state.convert_amounts(&[0, 0], &[0, 0], None).unwrap();
        assert_eq!(outcome.rates, state.prices_in_reserve());
        assert_eq!(outcome.new_state, state);
        assert!(outcome.via_prices.is_empty());
    }

    #[test]
    fn cross_conversion_produces_via_prices() {
        let state = fractional_state(
            vec![SATOSHIDEN / 4; 4],
            vec![1_000 * SATOSHIDEN; 4],
            4_000 * SATOSHIDEN,
        );
        let mut cross = vec![vec![0 as Amount; 4]; 4];
        cross[0][1] = SATOSHIDEN;
        let outcome = state
            .convert_amounts(&[SATOSHIDEN, 0, 0, 0], &[0; 4], Some(&cross))
            .unwrap();

        assert_eq!(outcome.via_prices.len(), 4);
        // the routed amount sells fractional into r1 on the second hop, so
        // the via price for r1 is live
        assert!(outcome.via_prices[1] > 0);
        // the first hop purchase moved r0's rate off par
        assert!(outcome.rates[0] >= SATOSHIDEN);
        // second hop drained some of r1's reserves
        assert!(outcome.new_state.reserves[1] < 1_001 * SATOSHIDEN);
    }

    #[test]
    fn round_trip_never_profits() {
        let state = fractional_state(
            vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
            vec![1_000 * SATOSHIDEN, 1_000 * SATOSHIDEN],
            2_000 * SATOSHIDEN,
        );
        for input in [SATOSHIDEN, 7 * SATOSHIDEN, 123_456_789] {
            let outcome = state.convert_amounts(&[input, 0], &[0, 0], None).unwrap();
            let rate = outcome.rates[0];
            // reserve -> fractional -> reserve at the same price
            let fractional = CurrencyState::reserve_to_native_raw(input, rate).unwrap();
            let back = CurrencyState::native_to_reserve_raw(fractional, rate).unwrap();
            assert!(back <= input, "round trip produced {back} from {input}");
        }
    }

    #[test]
    fn single_index_wrapper_matches_vector_form() {
        let state = fractional_state(
            vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
            vec![800 * SATOSHIDEN, 800 * SATOSHIDEN],
            1_600 * SATOSHIDEN,
        );
        let (rate, new_state) = state
            .convert_amounts_single(9 * SATOSHIDEN, 0, 1)
            .unwrap();
        let outcome = state
            .convert_amounts(&[0, 9 * SATOSHIDEN], &[0, 0], None)
            .unwrap();
        assert_eq!(rate, outcome.rates[1]);
        assert_eq!(new_state, outcome.new_state);
        assert!(state.convert_amounts_single(1, 0, 9).is_err());
    }
}

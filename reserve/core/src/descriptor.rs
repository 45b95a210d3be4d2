// Copyright (c) 2024-2025 The Meridian Foundation

//! Per-transaction reserve accounting.
//!
//! The descriptor is a builder: construct it empty, fold the transfers of
//! one transaction into it, then read the aggregated ledgers out. It
//! carries no chain state of its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mrd_reserve_types::{Amount, CurrencyId, CurrencyValueMap};

use crate::state::CurrencyState;

/// Per-currency counters accumulated across one transaction.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReserveInOuts {
    /// Reserve currency entering the transaction.
    pub reserve_in: Amount,
    /// Reserve currency leaving in outputs.
    pub reserve_out: Amount,
    /// The portion of `reserve_out` produced by conversion.
    pub reserve_out_converted: Amount,
    /// Fractional currency produced (or burned, negative) by conversion.
    pub native_out_converted: Amount,
    /// Conversion fees accrued in this currency.
    pub reserve_conversion_fees: Amount,
}

/// Aggregated reserve in/out ledgers for one transaction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReserveTransactionDescriptor {
    /// Per-currency counters, iterated in canonical id order.
    pub currencies: BTreeMap<CurrencyId, ReserveInOuts>,
    /// Native currency entering the transaction.
    pub native_in: Amount,
    /// Native currency leaving in outputs.
    pub native_out: Amount,
    /// Conversion fees accrued in the native currency.
    pub native_conversion_fees: Amount,
    /// Number of reserve transfers folded in so far.
    pub num_transfers: u32,
}

impl ReserveTransactionDescriptor {
    /// A fresh, empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record reserve currency entering the transaction.
    pub fn add_reserve_input(&mut self, currency: CurrencyId, value: Amount) {
        let entry = self.currencies.entry(currency).or_default();
        entry.reserve_in = entry.reserve_in.saturating_add(value);
    }

    /// Record reserve currency leaving in an output.
    pub fn add_reserve_output(&mut self, currency: CurrencyId, value: Amount) {
        let entry = self.currencies.entry(currency).or_default();
        entry.reserve_out = entry.reserve_out.saturating_add(value);
    }

    /// Record converted reserve currency leaving in an output.
    pub fn add_reserve_out_converted(&mut self, currency: CurrencyId, value: Amount) {
        let entry = self.currencies.entry(currency).or_default();
        entry.reserve_out_converted = entry.reserve_out_converted.saturating_add(value);
    }

    /// Record fractional currency produced (or burned) by conversion.
    pub fn add_native_out_converted(&mut self, currency: CurrencyId, value: Amount) {
        let entry = self.currencies.entry(currency).or_default();
        entry.native_out_converted = entry.native_out_converted.saturating_add(value);
    }

    /// Record conversion fees accrued in a reserve currency.
    pub fn add_reserve_conversion_fees(&mut self, currency: CurrencyId, value: Amount) {
        let entry = self.currencies.entry(currency).or_default();
        entry.reserve_conversion_fees = entry.reserve_conversion_fees.saturating_add(value);
    }

    /// The counters for one currency, zero when untouched.
    pub fn in_outs(&self, currency: &CurrencyId) -> ReserveInOuts {
        self.currencies.get(currency).copied().unwrap_or_default()
    }

    /// Net native fees: native in minus native out.
    pub fn native_fees(&self) -> Amount {
        self.native_in - self.native_out
    }

    /// Net reserve fees per currency, excluding the native currency:
    /// inputs minus unconverted outputs.
    pub fn reserve_fees(&self, native_id: &CurrencyId) -> CurrencyValueMap {
        let mut fees = CurrencyValueMap::new();
        for (currency, in_outs) in &self.currencies {
            if currency == native_id {
                continue;
            }
            let fee = in_outs.reserve_in - (in_outs.reserve_out - in_outs.reserve_out_converted);
            if fee != 0 {
                fees.set_value(*currency, fee);
            }
        }
        fees
    }

    /// All fees expressed in the native currency at the given exchange
    /// rates (one per reserve position of `state`).
    pub fn all_fees_as_native(
        &self,
        state: &CurrencyState,
        exchange_rates: &[Amount],
        native_id: &CurrencyId,
    ) -> Option<Amount> {
        let mut total = self.native_fees();
        let reserve_fees = self.reserve_fees(native_id);
        for (i, currency) in state.currencies.iter().enumerate() {
            let fee = reserve_fees.value(currency);
            if fee != 0 {
                total = total
                    .checked_add(CurrencyState::reserve_to_native_raw(fee, exchange_rates[i])?)?;
            }
        }
        Some(total)
    }

    /// All fees expressed in one designated reserve currency at the given
    /// exchange rates.
    pub fn all_fees_as_reserve(
        &self,
        state: &CurrencyState,
        exchange_rates: &[Amount],
        default_reserve: usize,
        native_id: &CurrencyId,
    ) -> Option<CurrencyValueMap> {
        let mut fees = self.reserve_fees(native_id);
        let reserve_id = *state.currencies.get(default_reserve)?;
        let native_as_reserve = CurrencyState::native_to_reserve_raw(
            self.native_fees(),
            *exchange_rates.get(default_reserve)?,
        )?;
        fees.add_value(reserve_id, native_as_reserve);
        Some(fees)
    }

    /// Map of reserve inputs across all currencies except the native.
    pub fn reserve_input_map(&self, native_id: &CurrencyId) -> CurrencyValueMap {
        self.project(native_id, |io| io.reserve_in)
    }

    /// Map of reserve outputs across all currencies except the native.
    pub fn reserve_output_map(&self, native_id: &CurrencyId) -> CurrencyValueMap {
        self.project(native_id, |io| io.reserve_out)
    }

    /// Map of converted reserve outputs, excluding the native currency.
    pub fn reserve_out_converted_map(&self, native_id: &CurrencyId) -> CurrencyValueMap {
        self.project(native_id, |io| io.reserve_out_converted)
    }

    /// Map of fractional currency produced by conversion, all currencies.
    pub fn native_out_converted_map(&self) -> CurrencyValueMap {
        let mut out = CurrencyValueMap::new();
        for (currency, in_outs) in &self.currencies {
            if in_outs.native_out_converted != 0 {
                out.set_value(*currency, in_outs.native_out_converted);
            }
        }
        out
    }

    /// Map of conversion fees across all currencies.
    pub fn reserve_conversion_fees_map(&self) -> CurrencyValueMap {
        let mut out = CurrencyValueMap::new();
        for (currency, in_outs) in &self.currencies {
            if in_outs.reserve_conversion_fees != 0 {
                out.set_value(*currency, in_outs.reserve_conversion_fees);
            }
        }
        out
    }

    fn project(
        &self,
        native_id: &CurrencyId,
        field: impl Fn(&ReserveInOuts) -> Amount,
    ) -> CurrencyValueMap {
        let mut out = CurrencyValueMap::new();
        for (currency, in_outs) in &self.currencies {
            if currency == native_id {
                continue;
            }
            let value = field(in_outs);
            if value != 0 {
                out.set_value(*currency, value);
            }
        }
        out
    }
}

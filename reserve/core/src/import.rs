// Copyright (c) 2024-2025 The Meridian Foundation

//! The import processor.
//!
//! Replays an ordered batch of reserve transfers against a prior
//! currency state, producing the payment outputs, the next block's state,
//! and balanced ledgers of imported, deposited, and spent currency. The
//! whole batch applies or none of it does.
//!
//! Fees are assumed to be denominated in the source system's currency or
//! the source currency of a conversion; all explicit fees on a transfer
//! are in its fee currency.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use mrd_reserve_types::constants::SATOSHIDEN;
use mrd_reserve_types::{Amount, CurrencyId, CurrencyValueMap};

use crate::currency::{CurrencyDefinition, CurrencySource};
use crate::descriptor::ReserveTransactionDescriptor;
use crate::error::{ConversionError, ImportError};
use crate::fees::{
    calculate_conversion_fee, calculate_conversion_fee_no_min, calculate_export_fee_raw,
    calculate_transfer_fee, export_reward,
};
use crate::state::{CoinbaseCurrencyState, CurrencyState};
use crate::transfer::{
    transfer_flags, ReserveTransfer, TransferDestination, TransferOutput,
};

/// Everything a processed import produces.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportOutputs {
    /// Payment outputs, in emission order.
    pub outputs: Vec<TransferOutput>,
    /// Currency created on this system by the import.
    pub imported_currency: CurrencyValueMap,
    /// Currency drawn from the source system's deposits held here.
    pub gateway_deposits_in: CurrencyValueMap,
    /// Currency leaving in outputs, per currency.
    pub spent_currency_out: CurrencyValueMap,
    /// The next block's currency state.
    pub new_state: CoinbaseCurrencyState,
    /// Reward paid to the exporter out of the batch fees.
    pub exporter_reward: Amount,
}

/// All working state for one import replay.
struct ImportProcessor<'a> {
    cache: &'a dyn CurrencySource,
    system_source: &'a CurrencyDefinition,
    import_def: &'a CurrencyDefinition,
    prior: &'a CoinbaseCurrencyState,
    desc: &'a mut ReserveTransactionDescriptor,
    exporter: Option<&'a TransferDestination>,

    index_map: BTreeMap<CurrencyId, usize>,
    system_source_id: CurrencyId,
    system_dest_id: CurrencyId,
    import_currency_id: CurrencyId,
    system_dest_idx: Option<usize>,
    is_fractional: bool,
    is_cross_system: bool,
    carve_out: Amount,

    new_state: CoinbaseCurrencyState,
    outputs: Vec<TransferOutput>,
    imported_currency: CurrencyValueMap,
    gateway_deposits_in: CurrencyValueMap,

    reserve_converted: CurrencyValueMap,
    fractional_converted: CurrencyValueMap,
    cross_conversions: Vec<Vec<Amount>>,
    pre_converted_output: CurrencyValueMap,
    pre_converted_reserves: CurrencyValueMap,
    transfer_fees: CurrencyValueMap,
    converted_fees: CurrencyValueMap,
    liquidity_fees: CurrencyValueMap,
    total_carve_outs: CurrencyValueMap,
    burned_change_price: Amount,
    total_minted: Amount,
    pre_alloc_total: Amount,
    exporter_reward: Amount,
}

impl ReserveTransactionDescriptor {
    /// Replay one export's transfer batch against `import_currency_state`
    /// and produce the resulting outputs, ledgers, and next state.
    ///
    /// `import_currency_state` must already be reverted to its pre-block
    /// form. On error nothing is applied; the descriptor's accumulated
    /// ledgers are unspecified beyond having been zeroed where documented.
    #[allow(clippy::too_many_arguments)]
    pub fn add_reserve_transfer_import_outputs(
        &mut self,
        cache: &dyn CurrencySource,
        system_source: &CurrencyDefinition,
        system_dest: &CurrencyDefinition,
        import_currency_def: &CurrencyDefinition,
        import_currency_state: &CoinbaseCurrencyState,
        export_transfers: &[ReserveTransfer],
        exporter: Option<&TransferDestination>,
    ) -> Result<ImportOutputs, ImportError> {
        let native_source_currency_id = system_source.native_source_currency_id();
        if native_source_currency_id != system_source.id {
            warn!(
                source = %system_source.id,
                "import source is not a gateway, chain, or system-level currency"
            );
            return Err(ImportError::InvalidSourceSystem);
        }

        let n = import_currency_def.currencies.len();
        if import_currency_state.state.currencies != import_currency_def.currencies
            || import_currency_state.conversion_price.len() != n
            || import_currency_state.via_conversion_price.len() != n
            || (import_currency_def.is_fractional() && !import_currency_state.state.is_valid())
            || import_currency_state.state.reserves.len() != n
            || import_currency_state.state.weights.len() != n
        {
            return Err(ImportError::Conversion(ConversionError::InvalidParameters));
        }

        let mut new_state = import_currency_state.clone();
        new_state.clear_for_next_block();

        let index_map = import_currency_def.currency_index_map();
        let system_dest_idx = index_map.get(&system_dest.id).copied();

        // prepare the descriptor for this batch
        self.native_in = 0;
        self.num_transfers = 0;
        for in_outs in self.currencies.values_mut() {
            in_outs.reserve_in = 0;
            in_outs.reserve_out = 0;
        }

        let processor = ImportProcessor {
            cache,
            system_source,
            import_def: import_currency_def,
            prior: import_currency_state,
            desc: self,
            exporter,
            index_map,
            system_source_id: system_source.id,
            system_dest_id: system_dest.id,
            import_currency_id: import_currency_def.id,
            system_dest_idx,
            is_fractional: import_currency_def.is_fractional(),
            is_cross_system: native_source_currency_id != system_dest.id,
            carve_out: import_currency_def.total_carve_out(),
            new_state,
            outputs: Vec::new(),
            imported_currency: CurrencyValueMap::new(),
            gateway_deposits_in: CurrencyValueMap::new(),
            reserve_converted: CurrencyValueMap::new(),
            fractional_converted: CurrencyValueMap::new(),
            cross_conversions: vec![vec![0; n]; n],
            pre_converted_output: CurrencyValueMap::new(),
            pre_converted_reserves: CurrencyValueMap::new(),
            transfer_fees: CurrencyValueMap::new(),
            converted_fees: CurrencyValueMap::new(),
            liquidity_fees: CurrencyValueMap::new(),
            total_carve_outs: CurrencyValueMap::new(),
            burned_change_price: 0,
            total_minted: 0,
            pre_alloc_total: 0,
            exporter_reward: 0,
        };
        processor.run(export_transfers)
    }
}

impl<'a> ImportProcessor<'a> {
    fn run(mut self, export_transfers: &[ReserveTransfer]) -> Result<ImportOutputs, ImportError> {
        for i in 0..=export_transfers.len() {
            if i == export_transfers.len() {
                match self.aggregate_fees()? {
                    Some(fee_transfer) => {
                        let dest_def = self.destination_definition(&fee_transfer)?;
                        self.dispatch(fee_transfer, &dest_def)?;
                    }
                    None => break,
                }
            } else {
                let transfer = if self.prior.state.is_refunding() {
                    export_transfers[i].refund_transfer()
                } else {
                    export_transfers[i].clone()
                };

                // importing to the source currency without the flag, or to
                // a different currency with it, is malformed
                let to_source = self.import_currency_id == transfer.first_currency();
                if to_source != transfer.is_import_to_source() {
                    warn!("transfer import-to-source flag does not match destination");
                    return Err(ImportError::InvalidTransfer(
                        "import-to-source flag does not match destination currency",
                    ));
                }

                let dest_def = self.destination_definition(&transfer)?;
                let transfer = self.account_transfer_fees(transfer, &dest_def)?;
                self.dispatch(transfer, &dest_def)?;
            }
        }

        self.emit_carve_outs();
        self.apply_burns()?;
        self.run_final_conversion()?;
        self.update_flow_vectors();
        self.refresh_launch_prices();
        self.finish_state();
        self.check_conservation()
    }

    fn destination_definition(
        &self,
        transfer: &ReserveTransfer,
    ) -> Result<CurrencyDefinition, ImportError> {
        if transfer.dest_currency_id == self.import_currency_id {
            Ok(self.import_def.clone())
        } else {
            self.cache
                .currency(&transfer.dest_currency_id)
                .ok_or(ImportError::UnknownCurrency(transfer.dest_currency_id))
        }
    }

    fn conversion_price(&self, idx: usize) -> Amount {
        self.prior.conversion_price.get(idx).copied().unwrap_or(0)
    }

    fn via_price(&self, idx: usize) -> Amount {
        self.prior
            .via_conversion_price
            .get(idx)
            .copied()
            .unwrap_or(0)
    }

    fn import_address(&self) -> Vec<u8> {
        self.import_currency_id.as_bytes().to_vec()
    }

    /// Fee accounting common to every real transfer: explicit fees, the
    /// gateway-leg pass-through conversion, fee minimum enforcement, and
    /// attribution of cross-system inputs to imports or deposits.
    fn account_transfer_fees(
        &mut self,
        mut transfer: ReserveTransfer,
        dest_def: &CurrencyDefinition,
    ) -> Result<ReserveTransfer, ImportError> {
        self.desc.num_transfers += 1;

        let mut explicit_fees = transfer.fee_amount;
        self.transfer_fees
            .add_value(transfer.fee_currency_id, explicit_fees);

        // fees reserved for routing past a gateway convert through the
        // fractional currency now and ride along in the next leg's system
        // currency
        if transfer.destination.has_gateway_leg() && transfer.destination.gateway_fees != 0 {
            explicit_fees = explicit_fees.saturating_add(transfer.destination.gateway_fees);

            let next_dest = self
                .cache
                .currency(&transfer.destination.gateway_id)
                .ok_or(ImportError::UnknownCurrency(transfer.destination.gateway_id))?;
            let next_dest_sys = next_dest.native_source_currency_id();

            if transfer.fee_currency_id != next_dest_sys {
                let fee_idx = self.index_map.get(&transfer.fee_currency_id).copied();
                let next_idx = self.index_map.get(&next_dest_sys).copied();
                let (fee_idx, next_idx) = match (self.is_fractional, fee_idx, next_idx) {
                    (true, Some(f), Some(x)) => (f, x),
                    _ => {
                        warn!("next leg fee currency unavailable for conversion");
                        return Err(ImportError::InvalidTransfer(
                            "next-leg fee currency unavailable for conversion",
                        ));
                    }
                };

                // pass-through conversions pay a doubled, unclamped fee
                let pass_through_fee =
                    calculate_conversion_fee_no_min(transfer.destination.gateway_fees) << 1;
                transfer.destination.gateway_fees -= pass_through_fee;

                self.desc
                    .add_reserve_conversion_fees(transfer.fee_currency_id, pass_through_fee);
                self.transfer_fees
                    .add_value(transfer.fee_currency_id, pass_through_fee);

                self.reserve_converted
                    .add_value(transfer.fee_currency_id, transfer.destination.gateway_fees);
                self.cross_conversions[fee_idx][next_idx] = self.cross_conversions[fee_idx][next_idx]
                    .saturating_add(transfer.destination.gateway_fees);

                let as_fractional = CurrencyState::reserve_to_native_raw(
                    transfer.destination.gateway_fees,
                    self.conversion_price(fee_idx),
                )
                .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
                let reserve_from_frac =
                    CurrencyState::native_to_reserve_raw(as_fractional, self.via_price(next_idx))
                        .ok_or(ImportError::Conversion(ConversionError::Overflow))?;

                transfer.destination.gateway_fees = reserve_from_frac;
                self.desc.add_reserve_input(next_dest_sys, reserve_from_frac);
                self.desc.add_reserve_output(next_dest_sys, reserve_from_frac);
                self.desc
                    .add_reserve_out_converted(next_dest_sys, reserve_from_frac);
            }
        }

        if transfer.fee_currency_id == self.system_dest_id {
            self.desc.native_in = self.desc.native_in.saturating_add(explicit_fees);
        } else {
            self.desc
                .add_reserve_input(transfer.fee_currency_id, explicit_fees);
        }

        if self.is_cross_system {
            self.account_cross_system_input(&transfer, explicit_fees)?;
        } else {
            self.enforce_fee_minimum(&transfer, dest_def)?;

            if transfer.first_currency() == self.system_dest_id && !transfer.is_mint() {
                self.desc.native_in = self.desc.native_in.saturating_add(transfer.first_value());
            } else if transfer.is_mint() {
                self.desc
                    .add_reserve_input(transfer.dest_currency_id, transfer.first_value());
            } else {
                self.desc
                    .add_reserve_input(transfer.first_currency(), transfer.first_value());
            }
        }

        Ok(transfer)
    }

    /// On a cross-system import, every unit of input either was minted by
    /// the source system or must already sit in gateway deposits here.
    fn account_cross_system_input(
        &mut self,
        transfer: &ReserveTransfer,
        explicit_fees: Amount,
    ) -> Result<(), ImportError> {
        let input_id = transfer.first_currency();
        let input_value = transfer.first_value();
        let mut total_currency_input = input_value;

        if transfer.fee_currency_id == self.system_source_id {
            if !self.index_map.contains_key(&self.system_source_id) {
                warn!("transfer fees invalid for receiving system");
                return Err(ImportError::InvalidTransfer(
                    "transfer fees invalid for receiving system",
                ));
            }
            self.imported_currency
                .add_value(self.system_source_id, explicit_fees);
        } else if transfer.fee_currency_id == self.system_dest_id {
            self.gateway_deposits_in
                .add_value(self.system_dest_id, explicit_fees);
        } else if transfer.fee_currency_id == input_id
            && self.is_fractional
            && self.index_map.contains_key(&transfer.fee_currency_id)
            && self.prior.state.is_launch_confirmed()
        {
            total_currency_input = total_currency_input.saturating_add(explicit_fees);
        } else {
            warn!("pass-through fees invalid");
            return Err(ImportError::InvalidTransfer("pass-through fees invalid"));
        }

        let input_def = self
            .cache
            .currency(&input_id)
            .ok_or(ImportError::UnknownCurrency(input_id))?;
        if transfer.is_mint() {
            warn!("mint operation on a cross-system import");
            return Err(ImportError::InvalidTransfer(
                "mint is not valid on a cross-system import",
            ));
        }

        if total_currency_input != 0 {
            let source_controls = input_def.system_id == self.system_source_id
                || (input_def.is_gateway() && input_def.gateway_id == self.system_source_id);
            if source_controls {
                self.imported_currency.add_value(input_id, total_currency_input);
            } else {
                self.gateway_deposits_in
                    .add_value(input_id, total_currency_input);
            }

            if input_value != 0 {
                if input_id == self.system_dest_id {
                    self.desc.native_in = self.desc.native_in.saturating_add(input_value);
                } else {
                    self.desc.add_reserve_input(input_id, input_value);
                }
            }
        }
        Ok(())
    }

    /// Same-system transfers must carry at least the required transfer
    /// fee, valued in the destination system currency.
    fn enforce_fee_minimum(
        &self,
        transfer: &ReserveTransfer,
        dest_def: &CurrencyDefinition,
    ) -> Result<(), ImportError> {
        let mut fee_equivalent = transfer.fee_amount;
        if transfer.fee_currency_id != self.system_dest_id {
            if !dest_def.is_fractional()
                || !self.index_map.contains_key(&transfer.fee_currency_id)
            {
                warn!("invalid fee currency for transfer");
                return Err(ImportError::InvalidTransfer(
                    "invalid fee currency for transfer",
                ));
            }
            let sdi = self
                .system_dest_idx
                .ok_or(ImportError::InvalidTransfer("fee currency not convertible"))?;
            fee_equivalent =
                CurrencyState::native_to_reserve_raw(transfer.fee_amount, self.via_price(sdi))
                    .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
        }

        if fee_equivalent < calculate_transfer_fee(&transfer.destination, transfer.flags) {
            warn!("incorrect fee sent with export");
            return Err(ImportError::InvalidFee);
        }
        Ok(())
    }

    /// Dispatch one transfer by kind. `dest_def` is the destination
    /// currency's definition.
    fn dispatch(
        &mut self,
        transfer: ReserveTransfer,
        dest_def: &CurrencyDefinition,
    ) -> Result<(), ImportError> {
        if transfer.is_pre_conversion() {
            self.process_pre_conversion(transfer)
        } else if transfer.is_conversion() {
            self.process_conversion(transfer, dest_def)
        } else {
            self.process_other(transfer)
        }
    }

    /// Pre-launch conversion at the fixed initial price, with the
    /// configured carve-out split.
    fn process_pre_conversion(&mut self, transfer: ReserveTransfer) -> Result<(), ImportError> {
        if self.import_def.launch_system_id != self.system_source_id {
            warn!("invalid source system for preconversion");
            return Err(ImportError::InvalidTransfer(
                "pre-conversion must come from the launch system",
            ));
        }
        if self.prior.state.is_launch_complete_marker() {
            warn!("preconversion after launch");
            return Err(ImportError::InvalidTransfer(
                "pre-conversion after launch is complete",
            ));
        }
        if !self.is_fractional && transfer.first_currency() != self.import_def.launch_system_id {
            warn!("invalid preconversion source currency");
            return Err(ImportError::InvalidTransfer(
                "pre-conversion source must be launch-system native or destination fractional",
            ));
        }
        let cur_idx = *self
            .index_map
            .get(&transfer.first_currency())
            .ok_or(ImportError::InvalidTransfer(
                "pre-conversion currency is not a reserve",
            ))?;

        let mut value_out = transfer.first_value();
        let pre_conversion_fee = calculate_conversion_fee(transfer.first_value())
            .min(transfer.first_value());
        value_out -= pre_conversion_fee;

        self.desc
            .add_reserve_conversion_fees(transfer.first_currency(), pre_conversion_fee);
        self.transfer_fees
            .add_value(transfer.first_currency(), pre_conversion_fee);

        // overflow converts nothing rather than failing the whole batch
        let new_currency_converted =
            CurrencyState::reserve_to_native_raw(value_out, self.conversion_price(cur_idx))
                .unwrap_or(0);

        if new_currency_converted != 0 {
            self.reserve_converted
                .add_value(transfer.first_currency(), value_out);
            self.pre_converted_reserves
                .add_value(transfer.first_currency(), value_out);

            if self.carve_out > 0 && self.carve_out < SATOSHIDEN {
                let to_reserves = CurrencyState::native_to_reserve_raw(
                    value_out,
                    SATOSHIDEN - self.carve_out,
                )
                .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
                self.total_carve_outs
                    .add_value(transfer.first_currency(), value_out - to_reserves);
                value_out = to_reserves;
            }

            if transfer.first_currency() != self.system_dest_id {
                // for a fractional currency the reserves stay on deposit;
                // otherwise the would-be reserves pay the currency itself
                if !self.is_fractional {
                    self.desc
                        .add_reserve_output(transfer.first_currency(), value_out);
                    self.outputs.push(TransferOutput::Token {
                        values: CurrencyValueMap::from_pairs([(
                            transfer.first_currency(),
                            value_out,
                        )]),
                        native_amount: 0,
                        to: self.import_address(),
                    });
                }
            } else if !self.is_fractional {
                self.desc.native_out = self.desc.native_out.saturating_add(value_out);
                self.outputs.push(TransferOutput::Native {
                    amount: value_out,
                    to: self.import_address(),
                });
            }

            self.pre_converted_output
                .add_value(transfer.first_currency(), new_currency_converted);
            self.desc
                .add_native_out_converted(transfer.first_currency(), new_currency_converted);
            self.desc
                .add_native_out_converted(transfer.dest_currency_id, new_currency_converted);

            let output = if transfer.dest_currency_id == self.system_dest_id {
                self.desc.native_out = self.desc.native_out.saturating_add(new_currency_converted);
                if !self.prior.state.is_launch_confirmed() {
                    self.desc.native_in = self.desc.native_in.saturating_add(new_currency_converted);
                }
                transfer.get_output(CurrencyValueMap::new(), new_currency_converted)
            } else {
                self.desc
                    .add_reserve_out_converted(transfer.dest_currency_id, new_currency_converted);
                self.desc
                    .add_reserve_output(transfer.dest_currency_id, new_currency_converted);
                if !self.prior.state.is_launch_confirmed() {
                    self.desc
                        .add_reserve_input(transfer.dest_currency_id, new_currency_converted);
                }
                transfer.get_output(
                    CurrencyValueMap::from_pairs([(
                        transfer.dest_currency_id,
                        new_currency_converted,
                    )]),
                    0,
                )
            };
            self.push_output(output, &transfer)?;
        }
        Ok(())
    }

    /// Market conversion between the import currency and one of its
    /// reserves, optionally routing onward to a second reserve.
    fn process_conversion(
        &mut self,
        transfer: ReserveTransfer,
        dest_def: &CurrencyDefinition,
    ) -> Result<(), ImportError> {
        if transfer.first_currency() == transfer.dest_currency_id {
            warn!("conversion does not specify two currencies");
            return Err(ImportError::InvalidTransfer(
                "conversion does not specify two currencies",
            ));
        }

        // converting into the fractional mints it; converting out burns it
        let to_fractional = self.import_currency_id == transfer.dest_currency_id
            && dest_def.is_fractional()
            && self.index_map.contains_key(&transfer.first_currency());

        let source_def = self
            .cache
            .currency(&transfer.first_currency())
            .ok_or(ImportError::UnknownCurrency(transfer.first_currency()))?;

        let from_fractional = self.import_currency_id == transfer.first_currency()
            && source_def.is_fractional()
            && self.index_map.contains_key(&transfer.dest_currency_id);
        if !(to_fractional || from_fractional) {
            warn!("conversion must be between a fractional currency and one of its reserves");
            return Err(ImportError::InvalidTransfer(
                "conversion must be between a fractional currency and one of its reserves",
            ));
        }

        if transfer.is_reserve_to_reserve()
            && (!to_fractional
                || transfer.second_reserve_id.is_null()
                || transfer.second_reserve_id == transfer.first_currency()
                || !self.index_map.contains_key(&transfer.second_reserve_id))
        {
            warn!("invalid reserve to reserve transfer");
            return Err(ImportError::InvalidTransfer(
                "reserve-to-reserve requires a distinct second reserve of the same currency",
            ));
        }

        let reserve_id = if to_fractional {
            transfer.first_currency()
        } else {
            transfer.dest_currency_id
        };
        let reserve_idx = self.index_map[&reserve_id];

        let mut value_out = transfer.first_value();
        if !transfer.is_fee_output() {
            let mut conversion_fee = calculate_conversion_fee(transfer.first_value());
            if transfer.is_reserve_to_reserve() {
                conversion_fee <<= 1;
            }
            conversion_fee = conversion_fee.min(transfer.first_value());
            value_out -= conversion_fee;
            self.desc
                .add_reserve_conversion_fees(transfer.first_currency(), conversion_fee);
            self.transfer_fees
                .add_value(transfer.first_currency(), conversion_fee);
        }

        let mut new_currency_converted = if to_fractional {
            self.reserve_converted
                .add_value(transfer.first_currency(), value_out);
            CurrencyState::reserve_to_native_raw(value_out, self.conversion_price(reserve_idx))
                .ok_or(ImportError::Conversion(ConversionError::Overflow))?
        } else {
            self.fractional_converted
                .add_value(transfer.dest_currency_id, value_out);
            CurrencyState::native_to_reserve_raw(value_out, self.conversion_price(reserve_idx))
                .ok_or(ImportError::Conversion(ConversionError::Overflow))?
        };

        if new_currency_converted != 0 {
            let output_currency_id = if transfer.is_reserve_to_reserve() {
                // the second hop converts the freshly minted fractional to
                // the target reserve at the via price
                let output_id = transfer.second_reserve_id;
                let output_idx = self.index_map[&output_id];
                new_currency_converted = CurrencyState::native_to_reserve_raw(
                    new_currency_converted,
                    self.via_price(output_idx),
                )
                .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
                self.cross_conversions[reserve_idx][output_idx] =
                    self.cross_conversions[reserve_idx][output_idx].saturating_add(value_out);
                output_id
            } else {
                transfer.dest_currency_id
            };

            if to_fractional && !transfer.is_reserve_to_reserve() {
                self.desc
                    .add_native_out_converted(transfer.first_currency(), new_currency_converted);
                self.desc
                    .add_native_out_converted(transfer.dest_currency_id, new_currency_converted);
                if transfer.dest_currency_id == self.system_dest_id {
                    self.desc.native_out = self.desc.native_out.saturating_add(new_currency_converted);
                    self.desc.native_in = self.desc.native_in.saturating_add(new_currency_converted);
                } else {
                    self.desc
                        .add_reserve_out_converted(transfer.dest_currency_id, new_currency_converted);
                    self.desc
                        .add_reserve_input(transfer.dest_currency_id, new_currency_converted);
                    self.desc
                        .add_reserve_output(transfer.dest_currency_id, new_currency_converted);
                }
            } else {
                self.desc
                    .add_reserve_out_converted(output_currency_id, new_currency_converted);
                if output_currency_id == self.system_dest_id {
                    self.desc.native_out = self.desc.native_out.saturating_add(new_currency_converted);
                } else {
                    self.desc
                        .add_reserve_output(output_currency_id, new_currency_converted);
                }
                // fractional input burns; a reserve-to-reserve fee value
                // was never added and stays behind in the currency
                if !transfer.is_reserve_to_reserve() {
                    self.desc
                        .add_native_out_converted(transfer.first_currency(), -value_out);
                }
            }

            let output = if output_currency_id == self.system_dest_id {
                transfer.get_output(CurrencyValueMap::new(), new_currency_converted)
            } else {
                transfer.get_output(
                    CurrencyValueMap::from_pairs([(output_currency_id, new_currency_converted)]),
                    0,
                )
            };
            self.push_output(output, &transfer)?;
        }
        Ok(())
    }

    /// Burns, mints, and plain transfers.
    fn process_other(&mut self, transfer: ReserveTransfer) -> Result<(), ImportError> {
        if transfer.is_burn() {
            if transfer.first_currency() != self.import_currency_id
                || !(self.is_fractional || self.import_def.is_token())
            {
                warn!("burn of a currency that is not the import currency");
                return Err(ImportError::InvalidTransfer(
                    "burn must name the import currency of a token or fractional",
                ));
            }
            if transfer.is_burn_change_weight() {
                warn!("burning to change weight is not supported");
                return Err(ImportError::InvalidTransfer(
                    "burning to change weight is not supported",
                ));
            }
            self.desc
                .add_native_out_converted(transfer.first_currency(), -transfer.first_value());
            self.burned_change_price = self
                .burned_change_price
                .saturating_add(transfer.first_value());
            return Ok(());
        }

        if self.system_dest_id == transfer.dest_currency_id {
            self.desc.native_out = self.desc.native_out.saturating_add(transfer.first_value());
            let output = transfer.get_output(CurrencyValueMap::new(), transfer.first_value());
            match output {
                Some(out) => self.outputs.push(out),
                None => {
                    warn!("invalid transfer destination");
                    return Err(ImportError::InvalidTransfer(
                        "native transfer destination cannot receive an output",
                    ));
                }
            }
            return Ok(());
        }

        // minting covers pre-allocations as well as centrally and
        // algorithmically controlled currencies
        if transfer.is_mint() && transfer.dest_currency_id == self.import_currency_id {
            self.total_minted = self.total_minted.saturating_add(transfer.first_value());
            self.desc
                .add_native_out_converted(transfer.dest_currency_id, transfer.first_value());
            if transfer.dest_currency_id != self.system_dest_id {
                self.desc
                    .add_reserve_out_converted(transfer.dest_currency_id, transfer.first_value());
            }
        }
        self.desc
            .add_reserve_output(transfer.dest_currency_id, transfer.first_value());
        let output = transfer.get_output(
            CurrencyValueMap::from_pairs([(transfer.dest_currency_id, transfer.first_value())]),
            0,
        );
        self.push_output(output, &transfer)
    }

    fn push_output(
        &mut self,
        output: Option<TransferOutput>,
        transfer: &ReserveTransfer,
    ) -> Result<(), ImportError> {
        match output {
            Some(out) => self.outputs.push(out),
            None => {
                // the transfer was absorbed entirely
                debug!(dest = %transfer.dest_currency_id, "skip creating output for import");
            }
        }
        Ok(())
    }

    /// The trailing synthetic fee transfer: launch-clear emissions, the
    /// fee conversion matrix, and the exporter's reward. Returns the
    /// exporter-reward transfer when one should be emitted.
    fn aggregate_fees(&mut self) -> Result<Option<ReserveTransfer>, ImportError> {
        if self.prior.state.is_launch_clear() {
            self.process_launch_clear()?;
        }

        let mut total_native_fee: Amount = 0;
        let system_reserve_nonempty = self
            .system_dest_idx
            .map(|idx| self.prior.state.reserves[idx] != 0)
            .unwrap_or(false);

        if self.prior.state.is_launch_confirmed() && self.is_fractional && system_reserve_nonempty
        {
            // half of all fees become liquidity in the currency itself
            self.liquidity_fees = self.transfer_fees.clone() / 2;
            self.transfer_fees -= self.liquidity_fees.clone();

            let sdi = self
                .system_dest_idx
                .ok_or(ImportError::Conversion(ConversionError::InvalidParameters))?;

            let mut fee_conversions: Vec<((CurrencyId, Amount), (CurrencyId, Amount))> =
                Vec::new();
            let fee_entries: Vec<(CurrencyId, Amount)> = self
                .transfer_fees
                .iter()
                .map(|(id, amount)| (*id, *amount))
                .collect();

            for (fee_currency, fee_amount) in fee_entries {
                if fee_currency != self.import_currency_id && fee_currency != self.system_dest_id
                {
                    // reserve fees route through the fractional to the
                    // system currency on the via leg
                    let cur_idx = *self.index_map.get(&fee_currency).ok_or_else(|| {
                        warn!(currency = %fee_currency, "invalid fee currency");
                        ImportError::InvalidTransfer("invalid fee currency for import")
                    })?;

                    self.reserve_converted.add_value(fee_currency, fee_amount);
                    self.cross_conversions[cur_idx][sdi] =
                        self.cross_conversions[cur_idx][sdi].saturating_add(fee_amount);

                    let conversion_price = if self.prior.state.is_launch_complete_marker() {
                        self.conversion_price(cur_idx)
                    } else {
                        self.via_price(cur_idx)
                    };
                    let mut fee_value =
                        CurrencyState::reserve_to_native_raw(fee_amount, conversion_price)
                            .ok_or(ImportError::Conversion(ConversionError::Overflow))?;

                    if self.system_dest_id == self.import_currency_id {
                        self.desc.add_native_out_converted(fee_currency, fee_value);
                        total_native_fee = total_native_fee.saturating_add(fee_value);
                    } else {
                        // the fractional is not native here, so one more
                        // conversion lands the fee in the system currency
                        fee_value =
                            CurrencyState::native_to_reserve_raw(fee_value, self.via_price(sdi))
                                .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
                        total_native_fee = total_native_fee.saturating_add(fee_value);
                        self.desc.native_in = self.desc.native_in.saturating_add(fee_value);
                        self.desc
                            .add_reserve_out_converted(self.system_dest_id, fee_value);
                    }
                    fee_conversions.push((
                        (fee_currency, fee_amount),
                        (self.system_dest_id, fee_value),
                    ));
                } else if fee_currency == self.system_dest_id {
                    total_native_fee = total_native_fee.saturating_add(fee_amount);
                } else {
                    // fees already in the fractional convert directly to
                    // the system currency in the first, non-via stage
                    self.fractional_converted
                        .add_value(self.system_dest_id, fee_amount);
                    self.desc.add_native_out_converted(fee_currency, -fee_amount);

                    let converted = CurrencyState::native_to_reserve_raw(
                        fee_amount,
                        self.conversion_price(sdi),
                    )
                    .ok_or(ImportError::Conversion(ConversionError::Overflow))?;
                    total_native_fee = total_native_fee.saturating_add(converted);
                    self.desc.native_in = self.desc.native_in.saturating_add(converted);
                    self.desc
                        .add_reserve_out_converted(self.system_dest_id, converted);
                    fee_conversions
                        .push(((fee_currency, fee_amount), (self.system_dest_id, converted)));
                }
            }

            self.converted_fees = self.transfer_fees.clone();
            if !fee_conversions.is_empty() {
                for ((from_id, from_amount), (to_id, to_amount)) in fee_conversions {
                    self.converted_fees.add_value(from_id, -from_amount);
                    self.converted_fees.add_value(to_id, to_amount);
                }
                self.converted_fees = self.converted_fees.canonical();
            }
        } else {
            // without a live conversion path, reserve fees are paid out
            // directly and only native fees reach the export pool
            let to = self
                .exporter
                .filter(|dest| dest.is_valid())
                .and_then(|dest| match &dest.target {
                    crate::transfer::DestinationTarget::Address(bytes) => Some(bytes.clone()),
                    crate::transfer::DestinationTarget::NestedTransfer(_) => None,
                })
                .unwrap_or_else(|| self.import_address());
            let fee_entries: Vec<(CurrencyId, Amount)> = self
                .transfer_fees
                .iter()
                .map(|(id, amount)| (*id, *amount))
                .collect();
            for (fee_currency, fee_amount) in fee_entries {
                if fee_currency != self.system_dest_id && fee_amount != 0 {
                    if let Some(idx) = self.index_map.get(&fee_currency) {
                        self.new_state.fees[*idx] = self.new_state.fees[*idx].saturating_add(fee_amount);
                    }
                    self.desc.add_reserve_output(fee_currency, fee_amount);
                    self.outputs.push(TransferOutput::Token {
                        values: CurrencyValueMap::from_pairs([(fee_currency, fee_amount)]),
                        native_amount: 0,
                        to: to.clone(),
                    });
                } else if fee_amount != 0 {
                    total_native_fee = total_native_fee.saturating_add(fee_amount);
                }
            }
            self.converted_fees = self.transfer_fees.clone();
        }

        // the export fee returns to the sending system's pool; the
        // exporter's share is carved out of it and pays out directly
        let export_fee = calculate_export_fee_raw(total_native_fee, self.desc.num_transfers);
        self.exporter_reward = export_reward(export_fee);
        self.new_state.native_fees = self.new_state.native_fees.saturating_add(total_native_fee);

        let exporter = match self.exporter {
            Some(dest) if dest.is_valid() && self.exporter_reward != 0 => dest.clone(),
            _ => {
                self.exporter_reward = 0;
                self.desc.native_out = self.desc.native_out.saturating_add(total_native_fee);
                return Ok(None);
            }
        };
        // the reward's own output accounts for its share below
        self.desc.native_out = self
            .desc
            .native_out
            .saturating_add(total_native_fee - self.exporter_reward);

        Ok(Some(ReserveTransfer {
            flags: transfer_flags::FEE_OUTPUT,
            reserve_values: CurrencyValueMap::from_pairs([(
                self.system_dest_id,
                self.exporter_reward,
            )]),
            fee_currency_id: self.system_dest_id,
            fee_amount: 0,
            dest_currency_id: self.system_dest_id,
            second_reserve_id: CurrencyId::NULL,
            destination: exporter,
        }))
    }

    /// Launch-clear block: pay the launch fee, emit pre-allocations, and
    /// seed a co-launched converter.
    fn process_launch_clear(&mut self) -> Result<(), ImportError> {
        // half the launch cost is paid here; the rest was paid at definition
        let registration_fee = self.system_source.currency_registration_fee;
        self.transfer_fees
            .add_value(self.import_def.launch_system_id, registration_fee);
        if self.import_def.launch_system_id != self.system_dest_id {
            self.imported_currency
                .add_value(self.import_def.launch_system_id, registration_fee);
            self.desc
                .add_reserve_input(self.import_def.launch_system_id, registration_fee);
        } else {
            self.desc.native_in = self.desc.native_in.saturating_add(registration_fee);
        }

        if !self.prior.state.is_launch_confirmed() {
            return Ok(());
        }

        let pre_allocations = self.import_def.pre_allocation.clone();
        for (recipient, amount) in pre_allocations {
            self.desc
                .add_native_out_converted(self.import_currency_id, amount);
            if self.import_currency_id != self.system_dest_id {
                self.desc
                    .add_reserve_out_converted(self.import_currency_id, amount);
            }
            self.pre_alloc_total = self.pre_alloc_total.saturating_add(amount);

            // a null recipient pays whoever mined the final export
            let to = if recipient.is_null() {
                self.exporter
                    .and_then(|dest| match &dest.target {
                        crate::transfer::DestinationTarget::Address(bytes)
                            if !bytes.is_empty() =>
                        {
                            Some(bytes.clone())
                        }
                        _ => None,
                    })
                    .unwrap_or_else(|| self.import_address())
            } else {
                recipient.as_bytes().to_vec()
            };

            if self.import_currency_id == self.system_dest_id {
                self.outputs.push(TransferOutput::Native { amount, to });
                self.desc.native_out = self.desc.native_out.saturating_add(amount);
            } else {
                self.desc.add_reserve_output(self.import_currency_id, amount);
                self.outputs.push(TransferOutput::Token {
                    values: CurrencyValueMap::from_pairs([(self.import_currency_id, amount)]),
                    native_amount: 0,
                    to,
                });
            }
        }

        if self.import_def.is_pbaas_chain() && self.import_def.gateway_converter_issuance != 0 {
            let issuance = self.import_def.gateway_converter_issuance;
            self.pre_alloc_total = self.pre_alloc_total.saturating_add(issuance);
            self.desc
                .add_native_out_converted(self.import_currency_id, issuance);
            self.desc.native_out = self.desc.native_out.saturating_add(issuance);
        } else if self.import_def.is_gateway_converter()
            && self.import_def.system_id == self.system_dest_id
        {
            if let Some(idx) = self.system_dest_idx {
                let seeded = self.prior.state.reserves[idx];
                if seeded != 0 {
                    self.reserve_converted.set_value(self.system_dest_id, seeded);
                    self.pre_converted_reserves
                        .set_value(self.system_dest_id, seeded);
                }
            }
        }
        Ok(())
    }

    fn emit_carve_outs(&mut self) {
        let carve_outs = self.total_carve_outs.canonical();
        for (currency, amount) in carve_outs.iter() {
            if *currency == self.system_dest_id {
                self.desc.native_out = self.desc.native_out.saturating_add(*amount);
                self.outputs.push(TransferOutput::Native {
                    amount: *amount,
                    to: self.import_address(),
                });
            } else {
                self.desc.add_reserve_output(*currency, *amount);
                self.outputs.push(TransferOutput::Token {
                    values: CurrencyValueMap::from_pairs([(*currency, *amount)]),
                    native_amount: 0,
                    to: self.import_address(),
                });
            }
        }
    }

    /// Remove burned currency from the supply, including any liquidity
    /// fees paid in the import currency itself.
    fn apply_burns(&mut self) -> Result<(), ImportError> {
        if let Some(liquidity_burn) = self.liquidity_fees.remove(&self.import_currency_id) {
            self.burned_change_price = self.burned_change_price.saturating_add(liquidity_burn);
        }
        if self.burned_change_price > 0 {
            if self.burned_change_price > self.new_state.state.supply {
                warn!(amount = self.burned_change_price, "invalid burn amount");
                return Err(ImportError::ExcessiveBurn);
            }
            self.new_state.state.supply -= self.burned_change_price;
        }
        Ok(())
    }

    /// The one aggregated conversion for the whole batch, pricing every
    /// queued conversion and cross-conversion at once.
    fn run_final_conversion(&mut self) -> Result<(), ImportError> {
        let adjusted_reserve_converted =
            (self.reserve_converted.clone() - self.pre_converted_reserves.clone()).canonical();

        if !(self.is_fractional
            && self.new_state.state.is_launch_confirmed()
            && (!adjusted_reserve_converted.is_empty()
                || !self.fractional_converted.canonical().is_empty()))
        {
            return Ok(());
        }

        let currencies = &self.prior.state.currencies;
        let reserves_vec = adjusted_reserve_converted.as_currency_vector(currencies);
        let fractional_vec = self.fractional_converted.as_currency_vector(currencies);

        let outcome = self
            .prior
            .state
            .convert_amounts(&reserves_vec, &fractional_vec, Some(&self.cross_conversions))
            .map_err(|err| {
                warn!("invalid currency conversions for import: {err}");
                ImportError::Conversion(err)
            })?;

        if !outcome.via_prices.is_empty() {
            self.new_state.via_conversion_price = outcome.via_prices.clone();
        }
        if !self.new_state.state.is_launch_complete_marker() {
            // dynamic prices ride on the via vector until launch completes
            // so the recorded conversion price stays at initial pricing
            for (i, rate) in outcome.rates.iter().enumerate() {
                if Some(i) != self.system_dest_idx {
                    self.new_state.via_conversion_price[i] = *rate;
                }
            }
        } else {
            self.new_state.conversion_price = outcome.rates.clone();
        }
        Ok(())
    }

    /// Fold the batch's aggregate flows into the next state's reserves,
    /// supply, and per-reserve flow vectors.
    fn update_flow_vectors(&mut self) {
        let currencies = self.new_state.state.currencies.clone();
        let liquidity_vec = self.liquidity_fees.as_currency_vector(&currencies);

        if self.new_state.state.is_launch_confirmed() {
            let adjusted =
                (self.reserve_converted.clone() - self.pre_converted_reserves.clone()).canonical();
            let res_vec = adjusted.as_currency_vector(&currencies);
            let res_out_vec = self
                .desc
                .reserve_out_converted_map(&self.import_currency_id)
                .as_currency_vector(&currencies);
            let frac_vec = self.fractional_converted.as_currency_vector(&currencies);
            let frac_out_vec = (self.desc.native_out_converted_map()
                - self.pre_converted_output.clone())
            .as_currency_vector(&currencies);

            for i in 0..currencies.len() {
                self.new_state.reserve_in[i] = res_vec[i].saturating_add(liquidity_vec[i]);
                self.new_state.reserve_out[i] = res_out_vec[i];
                if self.is_fractional {
                    self.new_state.state.reserves[i] = self.new_state.state.reserves[i]
                        .saturating_add(res_vec[i] - res_out_vec[i])
                        .saturating_add(liquidity_vec[i]);
                }
                self.new_state.native_in[i] = frac_vec[i];
                self.new_state.state.supply = self
                    .new_state
                    .state
                    .supply
                    .saturating_add(frac_out_vec[i] - frac_vec[i]);
            }
        } else {
            let res_vec = self.pre_converted_reserves.as_currency_vector(&currencies);
            let res_out_vec = self
                .desc
                .reserve_out_converted_map(&self.import_currency_id)
                .as_currency_vector(&currencies);
            let frac_vec = self.fractional_converted.as_currency_vector(&currencies);
            let frac_out_vec = self.pre_converted_output.as_currency_vector(&currencies);

            for i in 0..currencies.len() {
                self.new_state.reserve_in[i] = res_vec[i];
                if self.is_fractional {
                    self.new_state.state.reserves[i] = self.new_state.state.reserves[i]
                        .saturating_add(res_vec[i] - res_out_vec[i]);
                }
                // pre-converted output counts toward supply immediately so
                // the state carries it into the launch block
                self.new_state.state.supply = self
                    .new_state
                    .state
                    .supply
                    .saturating_add(frac_out_vec[i] - frac_vec[i]);
            }
        }
    }

    /// Until the launch-complete marker, recorded conversion prices stay
    /// pinned to launch pricing while dynamic prices live on the via leg.
    fn refresh_launch_prices(&mut self) {
        if !self.is_fractional || self.new_state.state.is_launch_complete_marker() {
            return;
        }

        if self.new_state.state.is_launch_confirmed() {
            if self.new_state.state.is_launch_clear() {
                let mut temp = self.new_state.state.clone();
                // back the fees out of reserves so launch prices reflect
                // deposits alone
                for (fee_currency, fee_amount) in self.transfer_fees.iter() {
                    if *fee_currency != self.import_def.system_id {
                        if let Some(idx) = self.index_map.get(fee_currency) {
                            temp.reserves[*idx] = temp.reserves[*idx].saturating_sub(*fee_amount);
                        }
                    }
                }
                if let Some(idx) = self.index_map.get(&self.import_def.system_id) {
                    temp.reserves[*idx] = temp.reserves[*idx].saturating_add(
                        self.new_state.native_fees
                            - self.transfer_fees.value(&self.import_def.system_id),
                    );
                }

                self.new_state.conversion_price =
                    if self.import_def.launch_system_id == self.import_def.system_id {
                        temp.prices_in_reserve()
                    } else {
                        self.launch_prices_without_system(&temp, None)
                    };
            } else {
                self.new_state.conversion_price = self.prior.conversion_price.clone();
            }
        } else if self.prior.state.is_prelaunch() && !self.prior.state.is_refunding() {
            self.new_state.via_conversion_price = self.new_state.state.prices_in_reserve();
            let temp = self.new_state.state.clone();
            self.new_state.conversion_price =
                if self.import_def.launch_system_id == self.import_def.system_id {
                    temp.prices_in_reserve()
                } else {
                    let pinned = self
                        .system_dest_idx
                        .map(|idx| self.new_state.via_conversion_price[idx]);
                    self.launch_prices_without_system(&temp, pinned)
                };
        }
    }

    /// Launch prices for a currency launched from another system: the
    /// destination system's own entry is excluded, its weight spread over
    /// the rest, and its price re-inserted afterward.
    fn launch_prices_without_system(
        &self,
        state: &CurrencyState,
        pinned_system_price: Option<Amount>,
    ) -> Vec<Amount> {
        let Some(sdi) = self.system_dest_idx else {
            return state.prices_in_reserve();
        };
        if state.currencies.len() < 2 {
            return state.prices_in_reserve();
        }

        let system_price =
            pinned_system_price.unwrap_or_else(|| state.price_in_reserve(sdi));

        let mut reduced = state.clone();
        reduced.currencies.remove(sdi);
        reduced.reserves.remove(sdi);
        let system_weight = reduced.weights.remove(sdi);

        let share = system_weight / reduced.weights.len() as Amount;
        let mut remainder = system_weight % reduced.weights.len() as Amount;
        for weight in reduced.weights.iter_mut() {
            *weight += share;
            if remainder > 0 {
                *weight += 1;
                remainder -= 1;
            }
        }

        let mut prices = reduced.prices_in_reserve();
        prices.insert(sdi, system_price);
        prices
    }

    /// Record the remaining per-block bookkeeping on the next state.
    fn finish_state(&mut self) {
        self.new_state.pre_converted_out = self
            .pre_converted_output
            .iter()
            .fold(0, |total, (_, amount)| total.saturating_add(*amount));

        if self.total_minted != 0 || self.pre_alloc_total != 0 {
            self.new_state
                .state
                .update_with_emission(self.total_minted.saturating_add(self.pre_alloc_total));
        }

        let system_in_outs = self.desc.in_outs(&self.system_dest_id);
        self.new_state.native_conversion_fees = system_in_outs.reserve_conversion_fees;
        self.new_state.conversion_fees = self
            .desc
            .reserve_conversion_fees_map()
            .as_currency_vector(&self.new_state.state.currencies);
        self.new_state.fees = self
            .converted_fees
            .as_currency_vector(&self.new_state.state.currencies);
    }

    /// The conservation check: nothing leaves the import that its inputs
    /// and deposits did not provide.
    fn check_conservation(mut self) -> Result<ImportOutputs, ImportError> {
        let mut reserve_inputs = CurrencyValueMap::new();
        let mut spent_currency_out = CurrencyValueMap::new();
        let mut system_out_converted: Amount = 0;

        for (currency, in_outs) in self.desc.currencies.iter() {
            if *currency == self.import_currency_id {
                self.new_state.native_out = in_outs.native_out_converted;
                if *currency == self.system_dest_id {
                    system_out_converted =
                        system_out_converted.saturating_add(in_outs.native_out_converted);
                }
            } else {
                reserve_inputs.add_value(self.import_currency_id, in_outs.native_out_converted);
                if *currency == self.system_dest_id {
                    system_out_converted =
                        system_out_converted.saturating_add(in_outs.reserve_out_converted);
                }
                if in_outs.reserve_in != 0 || in_outs.reserve_out_converted != 0 {
                    reserve_inputs
                        .set_value(*currency, in_outs.reserve_in + in_outs.reserve_out_converted);
                }
                if in_outs.reserve_out != 0 {
                    spent_currency_out.set_value(*currency, in_outs.reserve_out);
                }
            }
        }

        if system_out_converted != 0 {
            // stored as the system currency output that was converted
            self.desc
                .currencies
                .entry(self.import_currency_id)
                .or_default()
                .reserve_out_converted = system_out_converted;
        }
        if self.desc.native_in != 0 || system_out_converted != 0 {
            reserve_inputs.set_value(
                self.import_def.system_id,
                self.desc.native_in.max(system_out_converted),
            );
        }
        if self.desc.native_out != 0 {
            spent_currency_out.add_value(self.import_def.system_id, self.desc.native_out);
        }

        let headroom = reserve_inputs.clone() - spent_currency_out.clone();
        if headroom.has_negative() {
            warn!(
                inputs = %reserve_inputs,
                spent = %spent_currency_out,
                "import spends more than its inputs"
            );
            return Err(ImportError::ConservationFailure);
        }

        Ok(ImportOutputs {
            outputs: self.outputs,
            imported_currency: self.imported_currency.canonical(),
            gateway_deposits_in: self.gateway_deposits_in.canonical(),
            spent_currency_out: spent_currency_out.canonical(),
            new_state: self.new_state,
            exporter_reward: self.exporter_reward,
        })
    }
}

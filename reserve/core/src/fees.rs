// Copyright (c) 2024-2025 The Meridian Foundation

//! Transfer, conversion, and export fee calculation.

use mrd_reserve_types::constants::{
    DEFAULT_PER_STEP_FEE, DESTINATION_BYTE_DIVISOR, MAX_FEE_EXPORT_INPUTS, MIN_SUCCESS_FEE,
    SATOSHIDEN, SUCCESS_FEE,
};
use mrd_reserve_types::Amount;

use crate::arith::mul_div;
use crate::transfer::{transfer_flags, TransferDestination};

/// The fee owed for carrying one transfer with a destination of
/// `destination_byte_len` bytes: twice the per-step base, with another
/// full increment for every [`DESTINATION_BYTE_DIVISOR`] destination bytes.
///
/// Fee outputs and post-launch conversions pay no transfer fee.
pub fn calculate_transfer_fee(destination: &TransferDestination, flags: u32) -> Amount {
    if flags & transfer_flags::FEE_OUTPUT != 0
        || (flags & transfer_flags::PRECONVERT == 0 && flags & transfer_flags::CONVERT != 0)
    {
        return 0;
    }
    let base = DEFAULT_PER_STEP_FEE << 1;
    base + base * (destination.byte_len() / DESTINATION_BYTE_DIVISOR) as Amount
}

/// Conversion fee without the minimum clamp: `amount * SUCCESS_FEE`,
/// as a fraction of SATOSHIDEN, truncating.
pub fn calculate_conversion_fee_no_min(input_amount: Amount) -> Amount {
    mul_div(input_amount.max(0), SUCCESS_FEE, SATOSHIDEN).unwrap_or(Amount::MAX)
}

/// Conversion fee clamped up to [`MIN_SUCCESS_FEE`].
pub fn calculate_conversion_fee(input_amount: Amount) -> Amount {
    calculate_conversion_fee_no_min(input_amount).max(MIN_SUCCESS_FEE)
}

/// The fee to add on top of `input_amount` so that the combined total,
/// passed through [`calculate_conversion_fee`], yields this same fee.
///
/// The minimum clamp makes the gross-up non-linear, so the clamped
/// computation is iterated twice to absorb it.
pub fn calculate_additional_conversion_fee(input_amount: Amount) -> Amount {
    let mut new_amount =
        mul_div(input_amount, SATOSHIDEN, SATOSHIDEN - SUCCESS_FEE).unwrap_or(Amount::MAX);
    if new_amount - input_amount < MIN_SUCCESS_FEE {
        new_amount = input_amount + MIN_SUCCESS_FEE;
    }
    let mut fee = calculate_conversion_fee(new_amount);
    new_amount = input_amount + fee;
    // once more to account for the minimum fee
    fee = calculate_conversion_fee(new_amount);
    fee + (input_amount - (new_amount - fee))
}

/// The share of `fee` owed back to the export pool for a batch of
/// `num_transfers` transfers: 50% plus 0.5% per transfer beyond the first,
/// capped at [`MAX_FEE_EXPORT_INPUTS`] transfers.
pub fn calculate_export_fee_raw(fee: Amount, num_transfers: u32) -> Amount {
    let counted = num_transfers.min(MAX_FEE_EXPORT_INPUTS);
    let ratio = 50_000_000
        + (25_000_000 / MAX_FEE_EXPORT_INPUTS as Amount) * (counted.saturating_sub(1)) as Amount;
    mul_div(fee.max(0), ratio, SATOSHIDEN).unwrap_or(Amount::MAX)
}

/// The portion of an export fee paid directly to whoever produced the
/// export; the remainder accrues to the system fee pool.
pub fn export_reward(export_fee: Amount) -> Amount {
    export_fee >> 1
}

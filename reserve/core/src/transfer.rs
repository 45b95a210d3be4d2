// Copyright (c) 2024-2025 The Meridian Foundation

//! Reserve transfer records.
//!
//! A [`ReserveTransfer`] is one directive inside a cross-chain batch:
//! move, convert, mint, or burn an amount, with fees and a destination.
//! The many flag combinations collapse into a [`TransferKind`] exactly
//! once, at the boundary; all downstream dispatch matches on the kind.

use serde::{Deserialize, Serialize};

use mrd_reserve_types::encode::{put_i64, put_u32, put_var_bytes};
use mrd_reserve_types::{
    Amount, ConsensusDecode, ConsensusEncode, CurrencyId, CurrencyValueMap, DecodeError,
    SliceReader,
};

use crate::fees::calculate_conversion_fee;

/// Flag bits on a reserve transfer.
pub mod transfer_flags {
    /// Convert between the import currency and one of its reserves.
    pub const CONVERT: u32 = 0x001;
    /// Convert at fixed prices before launch.
    pub const PRECONVERT: u32 = 0x002;
    /// A fee output; carries fees, pays no transfer fee itself.
    pub const FEE_OUTPUT: u32 = 0x004;
    /// Deliverable on either of two legs, never both.
    pub const DOUBLE_SEND: u32 = 0x008;
    /// Mint destination currency on import.
    pub const MINT: u32 = 0x010;
    /// Burn source currency, raising the price of what remains.
    pub const BURN_CHANGE_PRICE: u32 = 0x020;
    /// Burn source currency, raising reserve ratios. Unsupported.
    pub const BURN_CHANGE_WEIGHT: u32 = 0x040;
    /// Destination currency equals the import currency itself.
    pub const IMPORT_TO_SOURCE: u32 = 0x080;
    /// Convert reserve to reserve through the fractional currency.
    pub const RESERVE_TO_RESERVE: u32 = 0x100;
    /// A refund produced by a failed launch.
    pub const REFUND: u32 = 0x200;
}

/// The classified kind of a transfer, computed once from its flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferKind {
    /// Carry value to a destination without conversion.
    PlainTransfer,
    /// Convert between the import currency and a reserve.
    Convert,
    /// Convert at fixed prices during prelaunch.
    PreConvert,
    /// Convert one reserve to another through the fractional currency.
    ReserveToReserve,
    /// Mint import currency.
    Mint,
    /// Burn import currency.
    Burn,
    /// The trailing fee output of a batch.
    FeeOutput,
    /// A refund of a failed launch deposit.
    Refund,
}

/// Where a transfer's produced value goes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DestinationTarget {
    /// An opaque address on the destination system.
    Address(Vec<u8>),
    /// A nested transfer to send onward as the next leg.
    NestedTransfer(Box<ReserveTransfer>),
}

impl Default for DestinationTarget {
    fn default() -> Self {
        Self::Address(Vec::new())
    }
}

/// A transfer destination: a target plus an optional gateway leg routing
/// the produced output onward into another system.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TransferDestination {
    /// The address or nested next-leg transfer.
    pub target: DestinationTarget,
    /// Next-hop system for a gateway leg; null when there is none.
    pub gateway_id: CurrencyId,
    /// Fees reserved for routing beyond the gateway.
    pub gateway_fees: Amount,
}

impl TransferDestination {
    /// A plain address destination with no gateway leg.
    pub fn address(bytes: Vec<u8>) -> Self {
        Self {
            target: DestinationTarget::Address(bytes),
            gateway_id: CurrencyId::NULL,
            gateway_fees: 0,
        }
    }

    /// Whether the destination can receive an output at all.
    pub fn is_valid(&self) -> bool {
        match &self.target {
            DestinationTarget::Address(bytes) => !bytes.is_empty(),
            DestinationTarget::NestedTransfer(_) => true,
        }
    }

    /// Whether a gateway leg routes this output onward.
    pub fn has_gateway_leg(&self) -> bool {
        !self.gateway_id.is_null()
    }

    /// Drop the gateway leg, leaving a terminal destination.
    pub fn clear_gateway_leg(&mut self) {
        self.gateway_id = CurrencyId::NULL;
        self.gateway_fees = 0;
    }

    /// Destination size in bytes, as counted by the transfer fee.
    pub fn byte_len(&self) -> usize {
        match &self.target {
            DestinationTarget::Address(bytes) => bytes.len(),
            DestinationTarget::NestedTransfer(transfer) => transfer.consensus_encoded().len(),
        }
    }
}

/// A single reserve transfer directive.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ReserveTransfer {
    /// Flag bits, see [`transfer_flags`].
    pub flags: u32,
    /// Source currency and amount; the first (lowest-id) entry is the
    /// transfer's principal value.
    pub reserve_values: CurrencyValueMap,
    /// Currency the explicit fee is paid in.
    pub fee_currency_id: CurrencyId,
    /// Explicit fee carried by this transfer.
    pub fee_amount: Amount,
    /// Currency the destination receives.
    pub dest_currency_id: CurrencyId,
    /// Final reserve of a reserve-to-reserve conversion; null otherwise.
    pub second_reserve_id: CurrencyId,
    /// Where the produced value goes.
    pub destination: TransferDestination,
}

impl ReserveTransfer {
    /// The principal currency: the lowest-id entry of `reserve_values`.
    pub fn first_currency(&self) -> CurrencyId {
        self.reserve_values
            .iter()
            .next()
            .map(|(id, _)| *id)
            .unwrap_or(CurrencyId::NULL)
    }

    /// The principal amount.
    pub fn first_value(&self) -> Amount {
        self.reserve_values
            .iter()
            .next()
            .map(|(_, amount)| *amount)
            .unwrap_or(0)
    }

    /// Whether this is any kind of conversion.
    pub fn is_conversion(&self) -> bool {
        self.flags & transfer_flags::CONVERT != 0
    }

    /// Whether this is a fixed-price pre-launch conversion.
    pub fn is_pre_conversion(&self) -> bool {
        self.flags & transfer_flags::PRECONVERT != 0
    }

    /// Whether this converts reserve to reserve through the fractional.
    pub fn is_reserve_to_reserve(&self) -> bool {
        self.flags & transfer_flags::RESERVE_TO_RESERVE != 0
    }

    /// Whether this mints destination currency.
    pub fn is_mint(&self) -> bool {
        self.flags & transfer_flags::MINT != 0
    }

    /// Whether this burns source currency.
    pub fn is_burn(&self) -> bool {
        self.flags & (transfer_flags::BURN_CHANGE_PRICE | transfer_flags::BURN_CHANGE_WEIGHT) != 0
    }

    /// Whether this burn would change reserve weights (unsupported).
    pub fn is_burn_change_weight(&self) -> bool {
        self.flags & transfer_flags::BURN_CHANGE_WEIGHT != 0
    }

    /// Whether this is a batch fee output.
    pub fn is_fee_output(&self) -> bool {
        self.flags & transfer_flags::FEE_OUTPUT != 0
    }

    /// Whether this transfer refunds a failed launch deposit.
    pub fn is_refund(&self) -> bool {
        self.flags & transfer_flags::REFUND != 0
    }

    /// Whether the destination currency is the import currency itself.
    pub fn is_import_to_source(&self) -> bool {
        self.flags & transfer_flags::IMPORT_TO_SOURCE != 0
    }

    /// Whether a gateway leg continues past this import.
    pub fn has_next_leg(&self) -> bool {
        self.destination.has_gateway_leg()
    }

    /// Classify the flag set once; all dispatch matches on the result.
    pub fn kind(&self) -> TransferKind {
        if self.is_fee_output() {
            TransferKind::FeeOutput
        } else if self.is_refund() {
            TransferKind::Refund
        } else if self.is_pre_conversion() {
            TransferKind::PreConvert
        } else if self.is_reserve_to_reserve() {
            TransferKind::ReserveToReserve
        } else if self.is_conversion() {
            TransferKind::Convert
        } else if self.is_burn() {
            TransferKind::Burn
        } else if self.is_mint() {
            TransferKind::Mint
        } else {
            TransferKind::PlainTransfer
        }
    }

    /// All explicit fees carried by this transfer, including any reserved
    /// gateway-leg fees, keyed by fee currency.
    pub fn total_transfer_fee(&self) -> CurrencyValueMap {
        let mut fee = self.fee_amount;
        if self.destination.has_gateway_leg() && self.destination.gateway_fees != 0 {
            fee = fee.saturating_add(self.destination.gateway_fees);
        }
        CurrencyValueMap::from_pairs([(self.fee_currency_id, fee)])
    }

    /// Conversion fees owed in the source currency, doubled for
    /// reserve-to-reserve conversions.
    pub fn conversion_fee(&self) -> CurrencyValueMap {
        let mut out = CurrencyValueMap::new();
        if self.is_conversion() || self.is_pre_conversion() {
            for (id, amount) in self.reserve_values.iter() {
                out.add_value(*id, calculate_conversion_fee(*amount));
            }
            if self.is_reserve_to_reserve() {
                out = out * 2;
            }
        }
        out
    }

    /// Rewrite this transfer as the refund produced by a failed launch:
    /// the principal goes back to its source currency and destination as a
    /// plain transfer, and minted amounts vanish.
    pub fn refund_transfer(&self) -> Self {
        let mut refund = self.clone();

        refund.flags &= !(transfer_flags::DOUBLE_SEND
            | transfer_flags::PRECONVERT
            | transfer_flags::CONVERT);

        if refund.is_mint() {
            refund.flags &= !transfer_flags::MINT;
            let first = refund.first_currency();
            refund.reserve_values.set_value(first, 0);
        }

        refund.flags |= transfer_flags::REFUND;
        refund.dest_currency_id = refund.first_currency();
        refund
    }
}

impl ConsensusEncode for TransferDestination {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        match &self.target {
            DestinationTarget::Address(bytes) => {
                out.push(1);
                put_var_bytes(out, bytes);
            }
            DestinationTarget::NestedTransfer(transfer) => {
                out.push(2);
                transfer.consensus_encode(out);
            }
        }
        self.gateway_id.consensus_encode(out);
        put_i64(out, self.gateway_fees);
    }
}

impl ConsensusDecode for TransferDestination {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let target = match reader.read_u8()? {
            1 => DestinationTarget::Address(reader.read_var_bytes()?),
            2 => DestinationTarget::NestedTransfer(Box::new(ReserveTransfer::consensus_decode(
                reader,
            )?)),
            tag => return Err(DecodeError::UnknownTag(tag)),
        };
        Ok(Self {
            target,
            gateway_id: CurrencyId::consensus_decode(reader)?,
            gateway_fees: reader.read_i64()?,
        })
    }
}

impl ConsensusEncode for ReserveTransfer {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.flags);
        self.reserve_values.consensus_encode(out);
        self.fee_currency_id.consensus_encode(out);
        put_i64(out, self.fee_amount);
        self.dest_currency_id.consensus_encode(out);
        self.second_reserve_id.consensus_encode(out);
        self.destination.consensus_encode(out);
    }
}

impl ConsensusDecode for ReserveTransfer {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            flags: reader.read_u32()?,
            reserve_values: CurrencyValueMap::consensus_decode(reader)?,
            fee_currency_id: CurrencyId::consensus_decode(reader)?,
            fee_amount: reader.read_i64()?,
            dest_currency_id: CurrencyId::consensus_decode(reader)?,
            second_reserve_id: CurrencyId::consensus_decode(reader)?,
            destination: TransferDestination::consensus_decode(reader)?,
        })
    }
}

/// One payment output produced by processing a transfer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TransferOutput {
    /// A native amount paid to an address.
    Native {
        /// Amount of the destination system's native currency.
        amount: Amount,
        /// Opaque destination address bytes.
        to: Vec<u8>,
    },
    /// A token output paying a currency-value map to an address, with an
    /// optional native amount alongside.
    Token {
        /// The currencies paid.
        values: CurrencyValueMap,
        /// Native amount attached to the same output.
        native_amount: Amount,
        /// Opaque destination address bytes.
        to: Vec<u8>,
    },
    /// A next-leg reserve transfer continuing into another system.
    NextLeg {
        /// Native amount attached to the leg.
        native_amount: Amount,
        /// The onward transfer.
        transfer: ReserveTransfer,
    },
}

impl ReserveTransfer {
    /// Realize this transfer's produced value as a payment output.
    ///
    /// With a gateway leg present, the value wraps into the next leg's
    /// reserve transfer: a nested transfer supplies the instructions, or a
    /// fresh transfer to the gateway system is synthesized. Without one,
    /// the value pays the decoded address directly. Returns `None` when
    /// the destination cannot receive an output.
    pub fn get_output(
        &self,
        reserves: CurrencyValueMap,
        native_amount: Amount,
    ) -> Option<TransferOutput> {
        if self.has_next_leg() {
            let next = match &self.destination.target {
                DestinationTarget::NestedTransfer(nested) => {
                    // input currency, not fees, comes from this leg's
                    // output; fees convert and travel independently
                    let mut next = (**nested).clone();
                    next.reserve_values = reserves;
                    next.fee_currency_id = self.destination.gateway_id;
                    next.destination.gateway_fees = self.destination.gateway_fees;
                    next
                }
                DestinationTarget::Address(_) => {
                    let mut last_leg = self.destination.clone();
                    last_leg.clear_gateway_leg();
                    ReserveTransfer {
                        flags: 0,
                        reserve_values: reserves,
                        fee_currency_id: self.fee_currency_id,
                        fee_amount: self.destination.gateway_fees,
                        dest_currency_id: self.destination.gateway_id,
                        second_reserve_id: CurrencyId::NULL,
                        destination: last_leg,
                    }
                }
            };
            return Some(TransferOutput::NextLeg {
                native_amount,
                transfer: next,
            });
        }

        let to = match &self.destination.target {
            DestinationTarget::Address(bytes) if !bytes.is_empty() => bytes.clone(),
            _ => return None,
        };
        if reserves.canonical().is_empty() && native_amount != 0 {
            Some(TransferOutput::Native {
                amount: native_amount,
                to,
            })
        } else {
            Some(TransferOutput::Token {
                values: reserves,
                native_amount,
                to,
            })
        }
    }
}

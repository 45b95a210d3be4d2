// Copyright (c) 2024-2025 The Meridian Foundation

//! The Meridian reserve engine.
//!
//! Deterministic conversion and import processing for fractional-reserve
//! currencies: the aggregated conversion algorithm over an n-currency
//! basket, the fee calculator, and the import state machine that replays
//! cross-chain transfer batches into outputs, ledgers, and the next
//! block's currency state.
//!
//! Everything here is purely functional at the call boundary: immutable
//! inputs in, new values out, no globals, no I/O. Two nodes replaying the
//! same batch against the same state produce bit-identical results; that
//! is a consensus requirement, not an optimization.

#![deny(missing_docs)]

pub mod arith;
pub mod conversion;
pub mod currency;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod fees;
pub mod import;
pub mod state;
pub mod transfer;

pub use conversion::{calculate_fractional_out, calculate_reserve_out, ConversionOutcome};
pub use currency::{CurrencyDefinition, CurrencySource};
pub use descriptor::{ReserveInOuts, ReserveTransactionDescriptor};
pub use error::{ConversionError, ImportError};
pub use export::{CrossChainExport, CrossChainImport, NotaryEvidence};
pub use import::ImportOutputs;
pub use state::{CoinbaseCurrencyState, CurrencyState};
pub use transfer::{
    ReserveTransfer, TransferDestination, TransferKind, TransferOutput,
};

// Re-export the value types alongside the engine.
pub use mrd_reserve_types::{
    constants, Amount, ConsensusDecode, ConsensusEncode, CurrencyId, CurrencyValueMap,
    DecodeError, Hash256,
};

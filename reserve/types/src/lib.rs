// Copyright (c) 2024-2025 The Meridian Foundation

//! Meridian reserve-engine value types.
//!
//! This crate holds the leaf types shared by the reserve engine and its
//! collaborators: fixed-point amounts, 160-bit currency ids, the sparse
//! currency-value map, protocol constants, and the canonical consensus
//! encoding. It contains no conversion or import logic.

#![deny(missing_docs)]

pub mod constants;
pub mod encode;

mod amount;
mod currency_id;
mod value_map;

pub use amount::{coin_string, Amount};
pub use currency_id::CurrencyId;
pub use encode::{
    hash_transfer_batch, ConsensusDecode, ConsensusEncode, DecodeError, SliceReader,
    TransferBatchHasher,
};
pub use value_map::{CurrencyValueMap, ValueMapError};

/// A 256-bit hash, as produced over canonical transfer-batch encodings.
pub type Hash256 = [u8; 32];

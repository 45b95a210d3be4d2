// Copyright (c) 2024-2025 The Meridian Foundation

//! Cross-chain export and import records.
//!
//! An export on one system delimits an ordered batch of reserve transfers;
//! the matching import on the destination system consumes the batch. Both
//! records carry a hash over the canonical transfer encodings so either
//! side can verify the batch it was handed is the batch that was sealed.

use serde::{Deserialize, Serialize};

use mrd_reserve_types::encode::put_u32;
use mrd_reserve_types::{
    hash_transfer_batch, Amount, ConsensusDecode, ConsensusEncode, CurrencyId, CurrencyValueMap,
    DecodeError, Hash256, SliceReader,
};

use crate::error::ImportError;
use crate::transfer::ReserveTransfer;

/// Flag bits on a cross-chain export.
pub mod export_flags {
    /// Transfers exported before the currency launched.
    pub const PRELAUNCH: u32 = 0x01;
    /// The export that clears the launch and fixes opening reserves.
    pub const CLEAR_LAUNCH: u32 = 0x02;
    /// A continuation record carrying more transfers of the same batch.
    pub const SUPPLEMENTAL: u32 = 0x04;
    /// The export accompanying a currency definition.
    pub const CHAIN_DEFINITION: u32 = 0x08;
    /// The export thread of the system currency itself.
    pub const SYSTEM_THREAD: u32 = 0x10;
}

/// Flag bits on a cross-chain import.
pub mod import_flags {
    /// The matching export lives on this same system.
    pub const SAME_CHAIN: u32 = 0x01;
    /// An import created by a currency definition; carries no transfers.
    pub const DEFINITION_IMPORT: u32 = 0x02;
    /// The first import of a newly launched chain.
    pub const INITIAL_LAUNCH_IMPORT: u32 = 0x04;
}

/// A sealed, ordered batch of reserve transfers leaving a system.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CrossChainExport {
    /// Flag bits, see [`export_flags`].
    pub flags: u32,
    /// System the batch leaves.
    pub source_system_id: CurrencyId,
    /// System the batch enters.
    pub dest_system_id: CurrencyId,
    /// Currency the batch imports into.
    pub dest_currency_id: CurrencyId,
    /// Height range on the source system covered by this export.
    pub source_height_start: u32,
    /// End of the covered height range.
    pub source_height_end: u32,
    /// Number of transfers sealed into the batch.
    pub num_inputs: u32,
    /// Total value carried, per currency.
    pub total_amounts: CurrencyValueMap,
    /// Total fees carried, per currency.
    pub total_fees: CurrencyValueMap,
    /// Running hash over the canonical transfer encodings in batch order.
    pub hash_reserve_transfers: Hash256,
}

impl CrossChainExport {
    /// Whether this export left before the currency launched.
    pub fn is_prelaunch(&self) -> bool {
        self.flags & export_flags::PRELAUNCH != 0
    }

    /// Whether this is the launch-clearing export.
    pub fn is_clear_launch(&self) -> bool {
        self.flags & export_flags::CLEAR_LAUNCH != 0
    }

    /// Whether this record only continues another export's batch.
    pub fn is_supplemental(&self) -> bool {
        self.flags & export_flags::SUPPLEMENTAL != 0
    }

    /// Whether this export accompanies a currency definition.
    pub fn is_chain_definition(&self) -> bool {
        self.flags & export_flags::CHAIN_DEFINITION != 0
    }

    /// Whether this is the system currency's own export thread.
    pub fn is_system_thread_export(&self) -> bool {
        self.flags & export_flags::SYSTEM_THREAD != 0
    }

    /// Whether the export stays on its own system.
    pub fn is_same_chain(&self) -> bool {
        self.source_system_id == self.dest_system_id
    }

    /// Seal a batch: record its count and running hash.
    pub fn seal_transfers(&mut self, transfers: &[ReserveTransfer]) {
        self.num_inputs = transfers.len() as u32;
        self.hash_reserve_transfers = hash_transfer_batch(transfers);
    }

    /// Verify that `transfers` is exactly the sealed batch.
    pub fn verify_transfer_hash(&self, transfers: &[ReserveTransfer]) -> bool {
        hash_transfer_batch(transfers) == self.hash_reserve_transfers
    }
}

impl ConsensusEncode for CrossChainExport {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.flags);
        self.source_system_id.consensus_encode(out);
        self.dest_system_id.consensus_encode(out);
        self.dest_currency_id.consensus_encode(out);
        put_u32(out, self.source_height_start);
        put_u32(out, self.source_height_end);
        put_u32(out, self.num_inputs);
        self.total_amounts.consensus_encode(out);
        self.total_fees.consensus_encode(out);
        out.extend_from_slice(&self.hash_reserve_transfers);
    }
}

impl ConsensusDecode for CrossChainExport {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let flags = reader.read_u32()?;
        let source_system_id = CurrencyId::consensus_decode(reader)?;
        let dest_system_id = CurrencyId::consensus_decode(reader)?;
        let dest_currency_id = CurrencyId::consensus_decode(reader)?;
        let source_height_start = reader.read_u32()?;
        let source_height_end = reader.read_u32()?;
        let num_inputs = reader.read_u32()?;
        let total_amounts = CurrencyValueMap::consensus_decode(reader)?;
        let total_fees = CurrencyValueMap::consensus_decode(reader)?;
        let mut hash_reserve_transfers = [0u8; 32];
        hash_reserve_transfers.copy_from_slice(reader.read_bytes(32)?);
        Ok(Self {
            flags,
            source_system_id,
            dest_system_id,
            dest_currency_id,
            source_height_start,
            source_height_end,
            num_inputs,
            total_amounts,
            total_fees,
            hash_reserve_transfers,
        })
    }
}

/// Evidence that a cross-system export was notarized on its home system.
///
/// Producing and checking the proof itself is the notarization layer's
/// job; the import processor only requires that evidence accompany any
/// import whose export it cannot read locally.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NotaryEvidence {
    /// Transaction id of the proven export.
    pub export_txid: Hash256,
    /// Opaque proof bytes, validated upstream.
    pub proof: Vec<u8>,
}

/// The record consuming one export's batch on the destination system.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CrossChainImport {
    /// Flag bits, see [`import_flags`].
    pub flags: u32,
    /// The system the consumed export came from.
    pub source_system_id: CurrencyId,
    /// The currency being imported into.
    pub import_currency_id: CurrencyId,
    /// Value brought in by the batch, per currency.
    pub import_value: CurrencyValueMap,
    /// Running hash over the batch, mirroring the export's.
    pub hash_reserve_transfers: Hash256,
}

impl CrossChainImport {
    /// Whether the matching export lives on this system.
    pub fn is_same_chain(&self) -> bool {
        self.flags & import_flags::SAME_CHAIN != 0
    }

    /// Whether this import accompanies a currency definition.
    pub fn is_definition_import(&self) -> bool {
        self.flags & import_flags::DEFINITION_IMPORT != 0
    }

    /// Whether this is a launched chain's first import.
    pub fn is_initial_launch_import(&self) -> bool {
        self.flags & import_flags::INITIAL_LAUNCH_IMPORT != 0
    }

    /// Whether this import must come with export transfers at all. A
    /// definition import carries none; everything else must supply its
    /// export's batch.
    pub fn expects_export_transfers(&self) -> bool {
        !self.is_definition_import()
    }

    /// Validate a delivered bundle against this import: transfer hashes
    /// must match on both records, definition imports must be empty, and
    /// a cross-system batch must carry notarization evidence.
    pub fn validate_bundle(
        &self,
        export: &CrossChainExport,
        transfers: &[ReserveTransfer],
        evidence: Option<&NotaryEvidence>,
    ) -> Result<(), ImportError> {
        if !self.expects_export_transfers() {
            if transfers.is_empty() {
                return Ok(());
            }
            return Err(ImportError::InvalidTransfer(
                "definition import carries reserve transfers",
            ));
        }

        if export.source_system_id != self.source_system_id {
            return Err(ImportError::InvalidSourceSystem);
        }
        if !export.verify_transfer_hash(transfers)
            || export.hash_reserve_transfers != self.hash_reserve_transfers
        {
            return Err(ImportError::TransferHashMismatch);
        }
        if !self.is_same_chain() && evidence.map_or(true, |e| e.proof.is_empty()) {
            return Err(ImportError::MissingEvidence);
        }
        Ok(())
    }
}

impl ConsensusEncode for CrossChainImport {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.flags);
        self.source_system_id.consensus_encode(out);
        self.import_currency_id.consensus_encode(out);
        self.import_value.consensus_encode(out);
        out.extend_from_slice(&self.hash_reserve_transfers);
    }
}

impl ConsensusDecode for CrossChainImport {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let flags = reader.read_u32()?;
        let source_system_id = CurrencyId::consensus_decode(reader)?;
        let import_currency_id = CurrencyId::consensus_decode(reader)?;
        let import_value = CurrencyValueMap::consensus_decode(reader)?;
        let mut hash_reserve_transfers = [0u8; 32];
        hash_reserve_transfers.copy_from_slice(reader.read_bytes(32)?);
        Ok(Self {
            flags,
            source_system_id,
            import_currency_id,
            import_value,
            hash_reserve_transfers,
        })
    }
}

/// Collect a primary export's batch together with its supplemental
/// continuations, verifying continuity flags.
pub fn collect_batch(
    primary: &CrossChainExport,
    supplements: &[(CrossChainExport, Vec<ReserveTransfer>)],
    primary_transfers: &[ReserveTransfer],
) -> Result<Vec<ReserveTransfer>, ImportError> {
    if primary.is_supplemental() {
        return Err(ImportError::InvalidTransfer(
            "batch cannot start with a supplemental export",
        ));
    }
    let mut batch = primary_transfers.to_vec();
    for (continuation, transfers) in supplements {
        if !continuation.is_supplemental() {
            return Err(ImportError::InvalidTransfer(
                "continuation record is not supplemental",
            ));
        }
        batch.extend(transfers.iter().cloned());
    }
    Ok(batch)
}

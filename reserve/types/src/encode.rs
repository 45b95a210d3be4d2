// Copyright (c) 2024-2025 The Meridian Foundation

//! Canonical consensus encoding.
//!
//! Every persisted record has exactly one byte representation: integers are
//! little-endian and fixed width, variable-length vectors carry a
//! compact-size prefix, and currency-value maps encode as (id, amount)
//! pairs with ids ascending by byte order. The transfer-batch hash fields
//! on export records are a running SHA-256 over these encodings in batch
//! order. Decoding rejects non-minimal compact sizes so that
//! `encode(decode(x)) == x` holds for every accepted input.

use displaydoc::Display;
use sha2::{Digest, Sha256};

use crate::{Amount, CurrencyId, CurrencyValueMap, Hash256};

/// Errors decoding canonical bytes.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum DecodeError {
    /// input ended before the record was complete
    UnexpectedEnd,
    /// compact size was not minimally encoded
    NonMinimalCompactSize,
    /// compact size {0} exceeds the decodable range
    OversizedCompactSize(u64),
    /// unknown tag byte {0}
    UnknownTag(u8),
    /// currency map keys out of order or duplicated
    UnsortedMapKeys,
    /// trailing bytes after a complete record
    TrailingBytes,
}

/// Types with a canonical byte encoding.
pub trait ConsensusEncode {
    /// Append the canonical encoding of `self` to `out`.
    fn consensus_encode(&self, out: &mut Vec<u8>);

    /// The canonical encoding as a fresh vector.
    fn consensus_encoded(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.consensus_encode(&mut out);
        out
    }
}

/// Types decodable from their canonical byte encoding.
pub trait ConsensusDecode: Sized {
    /// Decode one value, advancing the reader past it.
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError>;

    /// Decode a value that must consume the entire slice.
    fn consensus_decode_all(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = SliceReader::new(bytes);
        let value = Self::consensus_decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes);
        }
        Ok(value)
    }
}

/// A cursor over a byte slice for canonical decoding.
#[derive(Debug)]
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Wrap a slice for reading from its start.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).ok_or(DecodeError::UnexpectedEnd)?;
        if end > self.bytes.len() {
            return Err(DecodeError::UnexpectedEnd);
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a little-endian i64 (two's complement).
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a minimally-encoded compact size.
    pub fn read_compact_size(&mut self) -> Result<u64, DecodeError> {
        let tag = self.read_u8()?;
        let value = match tag {
            0..=252 => u64::from(tag),
            253 => {
                let v = u64::from(self.read_u16()?);
                if v < 253 {
                    return Err(DecodeError::NonMinimalCompactSize);
                }
                v
            }
            254 => {
                let v = u64::from(self.read_u32()?);
                if v <= u64::from(u16::MAX) {
                    return Err(DecodeError::NonMinimalCompactSize);
                }
                v
            }
            255 => {
                let v = self.read_u64()?;
                if v <= u64::from(u32::MAX) {
                    return Err(DecodeError::NonMinimalCompactSize);
                }
                v
            }
        };
        Ok(value)
    }

    /// Read a compact size that must fit a vector length.
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let value = self.read_compact_size()?;
        usize::try_from(value).map_err(|_| DecodeError::OversizedCompactSize(value))
    }

    /// Read a compact-size-prefixed byte vector.
    pub fn read_var_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_length()?;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

/// Append a little-endian u16.
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian u32.
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian u64.
pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian i64 (two's complement).
pub fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a minimally-encoded compact size.
pub fn put_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=252 => out.push(value as u8),
        253..=0xFFFF => {
            out.push(253);
            put_u16(out, value as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(254);
            put_u32(out, value as u32);
        }
        _ => {
            out.push(255);
            put_u64(out, value);
        }
    }
}

/// Append a compact-size-prefixed byte vector.
pub fn put_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Append a compact-size-prefixed vector of amounts.
pub fn put_amount_vec(out: &mut Vec<u8>, amounts: &[Amount]) {
    put_compact_size(out, amounts.len() as u64);
    for amount in amounts {
        put_i64(out, *amount);
    }
}

/// Read a compact-size-prefixed vector of amounts.
pub fn read_amount_vec(reader: &mut SliceReader<'_>) -> Result<Vec<Amount>, DecodeError> {
    let len = reader.read_length()?;
    let mut out = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        out.push(reader.read_i64()?);
    }
    Ok(out)
}

/// Append a compact-size-prefixed vector of currency ids.
pub fn put_id_vec(out: &mut Vec<u8>, ids: &[CurrencyId]) {
    put_compact_size(out, ids.len() as u64);
    for id in ids {
        id.consensus_encode(out);
    }
}

/// Read a compact-size-prefixed vector of currency ids.
pub fn read_id_vec(reader: &mut SliceReader<'_>) -> Result<Vec<CurrencyId>, DecodeError> {
    let len = reader.read_length()?;
    let mut out = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        out.push(CurrencyId::consensus_decode(reader)?);
    }
    Ok(out)
}

impl ConsensusEncode for CurrencyId {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.as_bytes());
    }
}

impl ConsensusDecode for CurrencyId {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let bytes = reader.read_bytes(CurrencyId::LEN)?;
        let mut arr = [0u8; CurrencyId::LEN];
        arr.copy_from_slice(bytes);
        Ok(CurrencyId::new(arr))
    }
}

impl ConsensusEncode for CurrencyValueMap {
    fn consensus_encode(&self, out: &mut Vec<u8>) {
        put_compact_size(out, self.len() as u64);
        // BTreeMap iteration is already ascending by id byte order
        for (id, amount) in self.iter() {
            id.consensus_encode(out);
            put_i64(out, *amount);
        }
    }
}

impl ConsensusDecode for CurrencyValueMap {
    fn consensus_decode(reader: &mut SliceReader<'_>) -> Result<Self, DecodeError> {
        let len = reader.read_length()?;
        let mut out = CurrencyValueMap::new();
        let mut last: Option<CurrencyId> = None;
        for _ in 0..len {
            let id = CurrencyId::consensus_decode(reader)?;
            let amount: Amount = reader.read_i64()?;
            if let Some(prev) = last {
                if id <= prev {
                    return Err(DecodeError::UnsortedMapKeys);
                }
            }
            last = Some(id);
            out.set_value(id, amount);
        }
        Ok(out)
    }
}

/// Running hash over a transfer batch.
///
/// Importers recompute this over the canonical encodings of the received
/// records, in batch order, and compare against the hash carried by the
/// export. An empty batch hashes to all zeroes.
#[derive(Clone, Debug, Default)]
pub struct TransferBatchHasher {
    hasher: Sha256,
    count: usize,
}

impl TransferBatchHasher {
    /// Start a new batch hash.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb the next record in batch order.
    pub fn push(&mut self, record: &impl ConsensusEncode) {
        self.hasher.update(record.consensus_encoded());
        self.count += 1;
    }

    /// Finish the batch. Zero when no records were pushed.
    pub fn finalize(self) -> Hash256 {
        if self.count == 0 {
            return [0u8; 32];
        }
        self.hasher.finalize().into()
    }
}

/// Hash a whole batch in one call.
pub fn hash_transfer_batch<T: ConsensusEncode>(batch: &[T]) -> Hash256 {
    let mut hasher = TransferBatchHasher::new();
    for record in batch {
        hasher.push(record);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> CurrencyId {
        CurrencyId::new([byte; 20])
    }

    #[test]
    fn compact_size_round_trip_at_boundaries() {
        for value in [0u64, 1, 252, 253, 0xFFFF, 0x1_0000, 0xFFFF_FFFF, 0x1_0000_0000] {
            let mut out = Vec::new();
            put_compact_size(&mut out, value);
            let mut reader = SliceReader::new(&out);
            assert_eq!(reader.read_compact_size().unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn compact_size_rejects_non_minimal() {
        // 252 encoded with the 253 tag
        let bytes = [253u8, 252, 0];
        let mut reader = SliceReader::new(&bytes);
        assert_eq!(
            reader.read_compact_size(),
            Err(DecodeError::NonMinimalCompactSize)
        );
    }

    #[test]
    fn value_map_round_trip_is_sorted() {
        let map = CurrencyValueMap::from_pairs([(id(9), -3), (id(1), 44), (id(4), 7)]);
        let bytes = map.consensus_encoded();
        let decoded = CurrencyValueMap::consensus_decode_all(&bytes).unwrap();
        assert_eq!(decoded, map);
        assert_eq!(decoded.consensus_encoded(), bytes);
        // first entry after the count must be the lowest id
        assert_eq!(&bytes[1..21], id(1).as_bytes());
    }

    #[test]
    fn value_map_decode_rejects_unsorted() {
        let mut bytes = Vec::new();
        put_compact_size(&mut bytes, 2);
        id(5).consensus_encode(&mut bytes);
        put_i64(&mut bytes, 1);
        id(2).consensus_encode(&mut bytes);
        put_i64(&mut bytes, 2);
        assert_eq!(
            CurrencyValueMap::consensus_decode_all(&bytes),
            Err(DecodeError::UnsortedMapKeys)
        );
    }

    #[test]
    fn truncated_input_is_an_error() {
        let map = CurrencyValueMap::from_pairs([(id(1), 44)]);
        let bytes = map.consensus_encoded();
        assert_eq!(
            CurrencyValueMap::consensus_decode_all(&bytes[..bytes.len() - 1]),
            Err(DecodeError::UnexpectedEnd)
        );
    }

    #[test]
    fn empty_batch_hashes_to_zero() {
        let batch: Vec<CurrencyValueMap> = Vec::new();
        assert_eq!(hash_transfer_batch(&batch), [0u8; 32]);
    }

    #[test]
    fn batch_hash_depends_on_order() {
        let a = CurrencyValueMap::from_pairs([(id(1), 1)]);
        let b = CurrencyValueMap::from_pairs([(id(2), 2)]);
        let forward = hash_transfer_batch(&[a.clone(), b.clone()]);
        let reverse = hash_transfer_batch(&[b, a]);
        assert_ne!(forward, reverse);
        assert_ne!(forward, [0u8; 32]);
    }
}

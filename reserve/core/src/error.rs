// Copyright (c) 2024-2025 The Meridian Foundation

//! Reserve-engine error types.

use displaydoc::Display;
use serde::{Deserialize, Serialize};

use mrd_reserve_types::CurrencyId;

/// Type alias for conversion results.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Reasons a conversion is refused.
///
/// A refused conversion never mutates state: the caller keeps its prior
/// currency state and prior price vector.
#[derive(Clone, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ConversionError {
    /// Input vector sizes do not match the reserve count, or the
    /// cross-conversion matrix is not square.
    InvalidParameters,

    /// A negative input amount was supplied.
    NegativeInput,

    /// A reserve currency has zero weight.
    ZeroWeight,

    /// The state is not a fractional currency.
    NotFractional,

    /// Total reserve weight exceeds 100%.
    ExcessiveReserveRatio,

    /// A wide-integer or decimal result cannot fit a 64-bit amount.
    Overflow,
}

/// Type alias for import-processing results.
pub type ImportResult<T> = Result<T, ImportError>;

/// Reasons an import batch is rejected.
///
/// No partial application: when any transfer in a batch fails, the whole
/// import fails and every output parameter is left as it was zero-initialized.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum ImportError {
    /// Conversion failed: {0}
    Conversion(ConversionError),

    /// Transfer violates source/destination/flag constraints: {0}
    InvalidTransfer(&'static str),

    /// Transfer fee below the required minimum.
    InvalidFee,

    /// No cached definition for currency `{0}`
    UnknownCurrency(CurrencyId),

    /// Import would spend more output than its inputs provide.
    ConservationFailure,

    /// Cross-system import lacks export evidence.
    MissingEvidence,

    /// Reserve transfers do not match the export's transfer hash.
    TransferHashMismatch,

    /// Burn amount exceeds the currency supply.
    ExcessiveBurn,

    /// Import source system does not control the export.
    InvalidSourceSystem,
}

impl From<ConversionError> for ImportError {
    fn from(src: ConversionError) -> Self {
        Self::Conversion(src)
    }
}

// Copyright (c) 2024-2025 The Meridian Foundation

//! Currency definitions and the definition cache interface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use mrd_reserve_types::{Amount, CurrencyId};

/// Option bits on a currency definition.
pub mod options {
    /// Units are redeemable against a weighted reserve basket.
    pub const FRACTIONAL: u32 = 0x01;
    /// A simple token with externally controlled supply.
    pub const TOKEN: u32 = 0x02;
    /// A gateway to an external system; currency under gateway control is
    /// minted on import.
    pub const GATEWAY: u32 = 0x04;
    /// An independent chain with its own native currency.
    pub const PBAAS_CHAIN: u32 = 0x08;
    /// The designated converter currency co-launched with a chain.
    pub const GATEWAY_CONVERTER: u32 = 0x10;
}

/// The immutable definition of a currency.
///
/// Definitions reference each other (fractional <-> reserves) by id only
/// and are resolved through a [`CurrencySource`]; one definition is never
/// embedded inside another.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct CurrencyDefinition {
    /// This currency's id.
    pub id: CurrencyId,
    /// Human-readable name, informational only.
    pub name: String,
    /// The system (chain) this currency lives on.
    pub system_id: CurrencyId,
    /// The system the currency was launched from.
    pub launch_system_id: CurrencyId,
    /// For gateways, the external system id; null otherwise.
    pub gateway_id: CurrencyId,
    /// Option bits, see [`options`].
    pub options: u32,
    /// Reserve currency ids, in definition order.
    pub currencies: Vec<CurrencyId>,
    /// Reserve weights, one per currency, each a fraction of SATOSHIDEN.
    pub weights: Vec<Amount>,
    /// Fixed pre-launch allocations: (recipient id, amount). A null
    /// recipient pays whoever finalizes the launch export.
    pub pre_allocation: Vec<(CurrencyId, Amount)>,
    /// Fraction of SATOSHIDEN diverted from pre-conversion reserves to
    /// carve-out recipients.
    pub pre_launch_carve_out: Amount,
    /// Converter currency issued to a co-launched gateway converter.
    pub gateway_converter_issuance: Amount,
    /// Launch fee owed to the launch system, half paid on launch clear.
    pub currency_registration_fee: Amount,
}

impl CurrencyDefinition {
    /// Whether this is a fractional-reserve currency.
    pub fn is_fractional(&self) -> bool {
        self.options & options::FRACTIONAL != 0
    }

    /// Whether this is a simple token.
    pub fn is_token(&self) -> bool {
        self.options & options::TOKEN != 0
    }

    /// Whether this is a gateway to an external system.
    pub fn is_gateway(&self) -> bool {
        self.options & options::GATEWAY != 0
    }

    /// Whether this is an independent chain.
    pub fn is_pbaas_chain(&self) -> bool {
        self.options & options::PBAAS_CHAIN != 0
    }

    /// Whether this is a chain's co-launched converter currency.
    pub fn is_gateway_converter(&self) -> bool {
        self.options & options::GATEWAY_CONVERTER != 0
    }

    /// The id whose native currency backs transfers from this system: the
    /// external system for a gateway, otherwise the home system.
    pub fn native_source_currency_id(&self) -> CurrencyId {
        if self.is_gateway() {
            self.gateway_id
        } else {
            self.system_id
        }
    }

    /// Map from reserve currency id to its position in `currencies`.
    pub fn currency_index_map(&self) -> BTreeMap<CurrencyId, usize> {
        self.currencies
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect()
    }

    /// Total pre-launch carve-out as a fraction of SATOSHIDEN.
    pub fn total_carve_out(&self) -> Amount {
        self.pre_launch_carve_out
    }

    /// Sum of all fixed pre-launch allocations.
    pub fn pre_allocation_total(&self) -> Amount {
        self.pre_allocation
            .iter()
            .fold(0, |total, (_, amount)| total.saturating_add(*amount))
    }
}

/// Read access to the currency-definition cache.
///
/// Implementations must be safe for concurrent reads; writers synchronize
/// externally. The engine only ever reads through this interface.
pub trait CurrencySource {
    /// The cached definition for `id`, if any.
    fn currency(&self, id: &CurrencyId) -> Option<CurrencyDefinition>;
}

impl CurrencySource for BTreeMap<CurrencyId, CurrencyDefinition> {
    fn currency(&self, id: &CurrencyId) -> Option<CurrencyDefinition> {
        self.get(id).cloned()
    }
}

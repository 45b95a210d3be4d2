// Copyright (c) 2024-2025 The Meridian Foundation

//! End-to-end import replay scenarios: pre-launch batches with
//! pre-conversions and burns, launch-confirmed conversion batches with fee
//! aggregation, reserve-to-reserve routing, refunds, token mint/burn, and
//! cross-system attribution.

use std::collections::BTreeMap;

use mrd_reserve_core::constants::{SATOSHIDEN, SUCCESS_FEE};
use mrd_reserve_core::currency::options;
use mrd_reserve_core::state::flags;
use mrd_reserve_core::transfer::{transfer_flags, DestinationTarget};
use mrd_reserve_core::{
    Amount, CoinbaseCurrencyState, CurrencyDefinition, CurrencyId, CurrencyState,
    CurrencyValueMap, ImportError, ReserveTransactionDescriptor, ReserveTransfer,
    TransferDestination, TransferOutput,
};

fn id(byte: u8) -> CurrencyId {
    CurrencyId::new([byte; 20])
}

fn native_id() -> CurrencyId {
    id(10)
}

fn fractional_id() -> CurrencyId {
    id(40)
}

fn chain_definition() -> CurrencyDefinition {
    CurrencyDefinition {
        id: native_id(),
        name: "meridian".into(),
        system_id: native_id(),
        launch_system_id: native_id(),
        options: options::PBAAS_CHAIN,
        ..Default::default()
    }
}

fn token_definition(token: CurrencyId, system: CurrencyId) -> CurrencyDefinition {
    CurrencyDefinition {
        id: token,
        name: format!("token-{}", token.as_bytes()[0]),
        system_id: system,
        launch_system_id: system,
        options: options::TOKEN,
        ..Default::default()
    }
}

fn fractional_definition(
    currencies: Vec<CurrencyId>,
    weights: Vec<Amount>,
    carve_out: Amount,
) -> CurrencyDefinition {
    CurrencyDefinition {
        id: fractional_id(),
        name: "basket".into(),
        system_id: native_id(),
        launch_system_id: native_id(),
        options: options::FRACTIONAL,
        currencies,
        weights,
        pre_launch_carve_out: carve_out,
        ..Default::default()
    }
}

fn coinbase_state(
    state_flags: u32,
    currencies: &[CurrencyId],
    reserves: Vec<Amount>,
    weights: Vec<Amount>,
    supply: Amount,
) -> CoinbaseCurrencyState {
    let state = CurrencyState {
        flags: state_flags,
        currencies: currencies.to_vec(),
        weights,
        reserves,
        initial_supply: supply,
        emitted: 0,
        supply,
    };
    let n = state.currencies.len();
    let mut cb = CoinbaseCurrencyState::from_state(state);
    cb.conversion_price = vec![SATOSHIDEN; n];
    cb.via_conversion_price = vec![SATOSHIDEN; n];
    cb
}

fn cache_of(defs: &[&CurrencyDefinition]) -> BTreeMap<CurrencyId, CurrencyDefinition> {
    defs.iter().map(|def| (def.id, (*def).clone())).collect()
}

fn transfer(
    xfer_flags: u32,
    source: CurrencyId,
    amount: Amount,
    dest_currency: CurrencyId,
    fee_currency: CurrencyId,
    fee: Amount,
) -> ReserveTransfer {
    ReserveTransfer {
        flags: xfer_flags,
        reserve_values: CurrencyValueMap::from_pairs([(source, amount)]),
        fee_currency_id: fee_currency,
        fee_amount: fee,
        dest_currency_id: dest_currency,
        second_reserve_id: CurrencyId::NULL,
        destination: TransferDestination::address(vec![7u8; 20]),
    }
}

/// Pre-launch import: a plain native transfer, a pre-conversion with a
/// 25% carve-out, and a burn. Checks the conservation ledger and the
/// supply arithmetic end to end.
#[test]
fn prelaunch_preconversion_and_burn_conserve_value() {
    let chain = chain_definition();
    let basket = fractional_definition(vec![native_id()], vec![SATOSHIDEN], SATOSHIDEN / 4);
    let cache = cache_of(&[&chain, &basket]);

    let prior = coinbase_state(
        flags::FRACTIONAL | flags::PRELAUNCH,
        &[native_id()],
        vec![4 * SATOSHIDEN],
        vec![SATOSHIDEN],
        4 * SATOSHIDEN,
    );

    let transfers = vec![
        transfer(0, native_id(), SATOSHIDEN, native_id(), native_id(), 20_000),
        transfer(
            transfer_flags::PRECONVERT,
            native_id(),
            SATOSHIDEN,
            fractional_id(),
            native_id(),
            20_000,
        ),
        transfer(
            transfer_flags::BURN_CHANGE_PRICE | transfer_flags::IMPORT_TO_SOURCE,
            fractional_id(),
            50_000_000,
            fractional_id(),
            native_id(),
            20_000,
        ),
    ];

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &basket, &prior, &transfers, None,
        )
        .unwrap();

    // pre-conversion: 10^8 minus the 50_000 minimum fee converts at par
    let pre_converted = SATOSHIDEN - 50_000;
    assert_eq!(result.new_state.pre_converted_out, pre_converted);

    // supply: old - burn + preconvert output
    assert_eq!(
        result.new_state.state.supply,
        4 * SATOSHIDEN - 50_000_000 + pre_converted
    );
    // reserves grow by the full pre-carve-out deposit
    assert_eq!(result.new_state.state.reserves, vec![4 * SATOSHIDEN + pre_converted]);

    // outputs: the plain native payment, the pre-converted fractional,
    // and the 25% carve-out
    let carved = pre_converted - (pre_converted / 4 * 3);
    assert_eq!(result.outputs.len(), 3);
    assert_eq!(
        result.outputs[0],
        TransferOutput::Native {
            amount: SATOSHIDEN,
            to: vec![7u8; 20],
        }
    );
    match &result.outputs[1] {
        TransferOutput::Token { values, .. } => {
            assert_eq!(values.value(&fractional_id()), pre_converted);
        }
        other => panic!("expected token output, got {other:?}"),
    }
    match &result.outputs[2] {
        TransferOutput::Native { amount, .. } => assert_eq!(*amount, carved),
        other => panic!("expected carve-out output, got {other:?}"),
    }

    // fees: three 20_000 transfer fees plus the 50_000 conversion fee
    assert_eq!(result.new_state.native_fees, 110_000);

    // everything spent is covered: native payment + fees + carve-out
    assert_eq!(
        result.spent_currency_out.value(&native_id()),
        SATOSHIDEN + 110_000 + carved
    );
    assert!(result.imported_currency.is_empty());
    assert!(result.gateway_deposits_in.is_empty());

    // pre-launch prices refresh from the updated state
    assert!(result.new_state.conversion_price[0] > 0);
}

fn launch_confirmed_fixture() -> (
    CurrencyDefinition,
    CurrencyDefinition,
    CurrencyDefinition,
    BTreeMap<CurrencyId, CurrencyDefinition>,
    CoinbaseCurrencyState,
) {
    let chain = chain_definition();
    let reserve_token = token_definition(id(20), native_id());
    let basket = fractional_definition(
        vec![native_id(), id(20)],
        vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
        0,
    );
    let cache = cache_of(&[&chain, &reserve_token, &basket]);
    let prior = coinbase_state(
        flags::FRACTIONAL | flags::LAUNCH_CONFIRMED | flags::LAUNCH_COMPLETE,
        &[native_id(), id(20)],
        vec![1_000 * SATOSHIDEN, 1_000 * SATOSHIDEN],
        vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
        2_000 * SATOSHIDEN,
    );
    (chain, reserve_token, basket, cache, prior)
}

/// Launch-confirmed conversion: reserve buys fractional, fees split into
/// liquidity and converted fees, and the exporter collects the reward.
#[test]
fn confirmed_conversion_pays_liquidity_and_exporter() {
    let (chain, reserve_token, basket, cache, prior) = launch_confirmed_fixture();

    let transfers = vec![transfer(
        transfer_flags::CONVERT,
        reserve_token.id,
        10 * SATOSHIDEN,
        fractional_id(),
        reserve_token.id,
        20_000,
    )];
    let exporter = TransferDestination::address(vec![9u8; 20]);

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &chain,
            &chain,
            &basket,
            &prior,
            &transfers,
            Some(&exporter),
        )
        .unwrap();

    // 0.025% of 10 units, above the floor
    let conversion_fee = 250_000;
    let converted = 10 * SATOSHIDEN - conversion_fee;
    assert_eq!(result.new_state.state.supply, 2_000 * SATOSHIDEN + converted);

    // half of all fees (transfer + conversion, both in the reserve token)
    // became liquidity; the other half converted to native
    let native_fee = (20_000 + conversion_fee) / 2;
    assert_eq!(result.new_state.native_fees, native_fee);
    assert_eq!(
        result.new_state.fees,
        vec![native_fee, 0],
        "converted fees should all land on the native position"
    );
    assert_eq!(result.new_state.conversion_fees, vec![0, conversion_fee]);

    // reserve flows: all token input (value + both fee halves) arrived
    assert_eq!(result.new_state.reserve_in, vec![0, 10 * SATOSHIDEN + 20_000]);
    assert_eq!(
        result.new_state.state.reserves[1],
        1_000 * SATOSHIDEN + 10 * SATOSHIDEN + 20_000
    );
    // the native side paid the fee disposition out of reserves
    assert_eq!(
        result.new_state.state.reserves[0],
        1_000 * SATOSHIDEN - native_fee
    );

    // exporter reward is half the export fee (half of the native fee for
    // a single transfer), paid as the last output
    let reward = native_fee / 2 / 2;
    assert_eq!(result.exporter_reward, reward);
    assert_eq!(
        result.outputs.last().unwrap(),
        &TransferOutput::Native {
            amount: reward,
            to: vec![9u8; 20],
        }
    );
    match &result.outputs[0] {
        TransferOutput::Token { values, .. } => {
            assert_eq!(values.value(&fractional_id()), converted);
        }
        other => panic!("expected fractional token output, got {other:?}"),
    }

    // total native disposition equals total native fees
    assert_eq!(result.spent_currency_out.value(&native_id()), native_fee);

    // past launch complete, conversion prices are the dynamic ones
    assert!(result.new_state.conversion_price[1] > SATOSHIDEN);
    assert_eq!(result.new_state.conversion_price[0], SATOSHIDEN);
}

/// The same batch replayed twice is bit-identical.
#[test]
fn import_replay_is_deterministic() {
    let (chain, reserve_token, basket, cache, prior) = launch_confirmed_fixture();
    let transfers = vec![transfer(
        transfer_flags::CONVERT,
        reserve_token.id,
        10 * SATOSHIDEN,
        fractional_id(),
        reserve_token.id,
        20_000,
    )];
    let exporter = TransferDestination::address(vec![9u8; 20]);

    let run = || {
        let mut desc = ReserveTransactionDescriptor::new();
        desc.add_reserve_transfer_import_outputs(
            &cache,
            &chain,
            &chain,
            &basket,
            &prior,
            &transfers,
            Some(&exporter),
        )
        .unwrap()
    };
    assert_eq!(run(), run());
}

/// Reserve-to-reserve conversion: doubled fee, routed output in the
/// second reserve, via prices recorded.
#[test]
fn reserve_to_reserve_routes_through_the_fractional() {
    let chain = chain_definition();
    let token_a = token_definition(id(21), native_id());
    let token_b = token_definition(id(22), native_id());
    let token_c = token_definition(id(23), native_id());
    let currencies = vec![native_id(), token_a.id, token_b.id, token_c.id];
    let basket = fractional_definition(currencies.clone(), vec![SATOSHIDEN / 4; 4], 0);
    let cache = cache_of(&[&chain, &token_a, &token_b, &token_c, &basket]);
    let prior = coinbase_state(
        flags::FRACTIONAL | flags::LAUNCH_CONFIRMED | flags::LAUNCH_COMPLETE,
        &currencies,
        vec![1_000 * SATOSHIDEN; 4],
        vec![SATOSHIDEN / 4; 4],
        4_000 * SATOSHIDEN,
    );

    let mut via_transfer = transfer(
        transfer_flags::CONVERT | transfer_flags::RESERVE_TO_RESERVE,
        token_a.id,
        10 * SATOSHIDEN,
        fractional_id(),
        native_id(),
        20_000,
    );
    via_transfer.second_reserve_id = token_b.id;
    let exporter = TransferDestination::address(vec![9u8; 20]);

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &chain,
            &chain,
            &basket,
            &prior,
            &[via_transfer],
            Some(&exporter),
        )
        .unwrap();

    // a reserve-to-reserve conversion pays exactly twice the conversion
    // fee rate in the source reserve
    let single_fee = 10 * SATOSHIDEN / SATOSHIDEN * SUCCESS_FEE;
    let doubled_fee = 2 * single_fee;
    assert_eq!(result.new_state.conversion_fees, vec![0, doubled_fee, 0, 0]);

    // the routed output lands in the second reserve at par prices
    let routed = 10 * SATOSHIDEN - doubled_fee;
    match &result.outputs[0] {
        TransferOutput::Token { values, .. } => {
            assert_eq!(values.value(&token_b.id), routed);
        }
        other => panic!("expected routed token output, got {other:?}"),
    }

    // supply is unchanged: the minted fractional was burned on the second
    // hop
    assert_eq!(result.new_state.state.supply, 4_000 * SATOSHIDEN);

    // via prices cover every reserve and are live where routing happened
    assert_eq!(result.new_state.via_conversion_price.len(), 4);
    assert!(result.new_state.via_conversion_price[2] > 0);
    assert!(result.exporter_reward > 0);
}

/// A refunding state rewrites every transfer into a plain send back home.
#[test]
fn refunding_state_returns_deposits() {
    let chain = chain_definition();
    let reserve_token = token_definition(id(20), native_id());
    let basket = fractional_definition(
        vec![native_id(), reserve_token.id],
        vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
        0,
    );
    let cache = cache_of(&[&chain, &reserve_token, &basket]);
    let prior = coinbase_state(
        flags::FRACTIONAL | flags::PRELAUNCH | flags::REFUNDING,
        &[native_id(), reserve_token.id],
        vec![0, 0],
        vec![SATOSHIDEN / 2, SATOSHIDEN / 2],
        0,
    );

    let preconvert = transfer(
        transfer_flags::PRECONVERT,
        reserve_token.id,
        10 * SATOSHIDEN,
        fractional_id(),
        native_id(),
        20_000,
    );

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &basket, &prior, &[preconvert], None,
        )
        .unwrap();

    // the deposit comes straight back as a token output to the sender
    assert_eq!(result.outputs.len(), 1);
    match &result.outputs[0] {
        TransferOutput::Token { values, to, .. } => {
            assert_eq!(values.value(&reserve_token.id), 10 * SATOSHIDEN);
            assert_eq!(to, &vec![7u8; 20]);
        }
        other => panic!("expected refund token output, got {other:?}"),
    }
    assert_eq!(result.new_state.state.supply, 0);
    assert_eq!(result.spent_currency_out.value(&reserve_token.id), 10 * SATOSHIDEN);
}

/// Token mint and burn: supply moves by the net and the emission is
/// recorded.
#[test]
fn token_mint_and_burn_update_supply() {
    let chain = chain_definition();
    let token = token_definition(id(30), native_id());
    let cache = cache_of(&[&chain, &token]);
    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 100 * SATOSHIDEN);

    let transfers = vec![
        transfer(
            transfer_flags::MINT | transfer_flags::IMPORT_TO_SOURCE,
            token.id,
            10 * SATOSHIDEN,
            token.id,
            native_id(),
            20_000,
        ),
        transfer(
            transfer_flags::BURN_CHANGE_PRICE | transfer_flags::IMPORT_TO_SOURCE,
            token.id,
            4 * SATOSHIDEN,
            token.id,
            native_id(),
            20_000,
        ),
    ];

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &token, &prior, &transfers, None,
        )
        .unwrap();

    assert_eq!(result.new_state.state.supply, 106 * SATOSHIDEN);
    assert_eq!(result.new_state.state.emitted, 10 * SATOSHIDEN);

    // only the mint produces an output
    assert_eq!(result.outputs.len(), 1);
    match &result.outputs[0] {
        TransferOutput::Token { values, .. } => {
            assert_eq!(values.value(&token.id), 10 * SATOSHIDEN);
        }
        other => panic!("expected minted token output, got {other:?}"),
    }
}

/// Burning to change weights is rejected.
#[test]
fn burn_change_weight_is_rejected() {
    let chain = chain_definition();
    let token = token_definition(id(30), native_id());
    let cache = cache_of(&[&chain, &token]);
    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 100 * SATOSHIDEN);

    let burn = transfer(
        transfer_flags::BURN_CHANGE_WEIGHT | transfer_flags::IMPORT_TO_SOURCE,
        token.id,
        SATOSHIDEN,
        token.id,
        native_id(),
        20_000,
    );

    let mut desc = ReserveTransactionDescriptor::new();
    let err = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &token, &prior, &[burn], None,
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidTransfer(_)));
}

/// Cross-system imports attribute inputs to minted imports or existing
/// gateway deposits, and refuse mints outright.
#[test]
fn cross_system_import_attributes_currency() {
    let remote_chain = CurrencyDefinition {
        id: id(50),
        name: "remote".into(),
        system_id: id(50),
        launch_system_id: id(50),
        options: options::PBAAS_CHAIN,
        ..Default::default()
    };
    let chain = chain_definition();
    // a token controlled by the remote system: minted on the way in
    let remote_token = token_definition(id(60), id(50));
    // a token of this system coming back: drawn from gateway deposits
    let local_token = token_definition(id(61), native_id());
    let cache = cache_of(&[&remote_chain, &chain, &remote_token, &local_token]);

    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 0);

    let transfers = vec![
        transfer(
            transfer_flags::IMPORT_TO_SOURCE,
            remote_token.id,
            5 * SATOSHIDEN,
            remote_token.id,
            native_id(),
            20_000,
        ),
        transfer(
            transfer_flags::IMPORT_TO_SOURCE,
            local_token.id,
            3 * SATOSHIDEN,
            local_token.id,
            native_id(),
            20_000,
        ),
    ];

    // importing into the remote token's own thread
    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &remote_chain,
            &chain,
            &remote_token,
            &prior,
            &transfers[..1],
            None,
        )
        .unwrap();
    assert_eq!(result.imported_currency.value(&remote_token.id), 5 * SATOSHIDEN);
    assert_eq!(result.gateway_deposits_in.value(&native_id()), 20_000);

    // the local token instead draws on deposits held for the gateway
    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &remote_chain,
            &chain,
            &local_token,
            &prior,
            &transfers[1..],
            None,
        )
        .unwrap();
    assert_eq!(result.gateway_deposits_in.value(&local_token.id), 3 * SATOSHIDEN);
    assert!(!result.imported_currency.contains(&local_token.id));

    // mint never crosses systems
    let mut mint = transfers[0].clone();
    mint.flags |= transfer_flags::MINT;
    let mut desc = ReserveTransactionDescriptor::new();
    let err = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &remote_chain,
            &chain,
            &remote_token,
            &prior,
            &[mint],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidTransfer(_)));
}

/// Transfers below the required fee fail the import.
#[test]
fn underpaid_transfer_fee_is_rejected() {
    let chain = chain_definition();
    let token = token_definition(id(30), native_id());
    let cache = cache_of(&[&chain, &token]);
    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 0);

    let cheap = transfer(0, native_id(), SATOSHIDEN, native_id(), native_id(), 10);
    let mut desc = ReserveTransactionDescriptor::new();
    let err = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &token, &prior, &[cheap], None,
        )
        .unwrap_err();
    assert_eq!(err, ImportError::InvalidFee);
}

/// The import-to-source flag must match the destination exactly.
#[test]
fn mismatched_import_to_source_flag_is_rejected() {
    let chain = chain_definition();
    let token = token_definition(id(30), native_id());
    let cache = cache_of(&[&chain, &token]);
    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 0);

    // claims import-to-source but the import currency differs
    let mislabeled = transfer(
        transfer_flags::IMPORT_TO_SOURCE,
        native_id(),
        SATOSHIDEN,
        native_id(),
        native_id(),
        20_000,
    );
    let mut desc = ReserveTransactionDescriptor::new();
    let err = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &token, &prior, &[mislabeled], None,
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidTransfer(_)));
}

/// Unknown destination currencies fail with the currency id.
#[test]
fn unknown_destination_currency_is_reported() {
    let chain = chain_definition();
    let token = token_definition(id(30), native_id());
    let cache = cache_of(&[&chain, &token]);
    let prior = coinbase_state(flags::LAUNCH_CONFIRMED, &[], vec![], vec![], 0);

    let stranger = transfer(0, native_id(), SATOSHIDEN, id(99), native_id(), 20_000);
    let mut desc = ReserveTransactionDescriptor::new();
    let err = desc
        .add_reserve_transfer_import_outputs(
            &cache, &chain, &chain, &token, &prior, &[stranger], None,
        )
        .unwrap_err();
    assert_eq!(err, ImportError::UnknownCurrency(id(99)));
}

/// A transfer with a gateway leg produces a next-leg reserve transfer
/// carrying the value onward.
#[test]
fn gateway_leg_produces_next_leg_output() {
    let (chain, reserve_token, basket, mut cache, prior) = launch_confirmed_fixture();
    let remote = CurrencyDefinition {
        id: id(50),
        name: "remote".into(),
        system_id: id(50),
        launch_system_id: id(50),
        options: options::PBAAS_CHAIN,
        ..Default::default()
    };
    cache.insert(remote.id, remote.clone());

    let mut hop = transfer(
        0,
        reserve_token.id,
        2 * SATOSHIDEN,
        reserve_token.id,
        native_id(),
        20_000,
    );
    hop.destination = TransferDestination {
        target: DestinationTarget::Address(vec![7u8; 20]),
        gateway_id: remote.id,
        gateway_fees: 0,
    };

    let mut desc = ReserveTransactionDescriptor::new();
    let result = desc
        .add_reserve_transfer_import_outputs(
            &cache,
            &chain,
            &chain,
            &basket,
            &prior,
            &[hop],
            None,
        )
        .unwrap();

    match &result.outputs[0] {
        TransferOutput::NextLeg { transfer, .. } => {
            assert_eq!(transfer.dest_currency_id, remote.id);
            assert_eq!(transfer.reserve_values.value(&reserve_token.id), 2 * SATOSHIDEN);
            assert!(!transfer.destination.has_gateway_leg());
        }
        other => panic!("expected next-leg output, got {other:?}"),
    }
}

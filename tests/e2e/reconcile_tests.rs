//! Property tests for the reconciler.
//!
//! Whatever the declarations and discoveries look like:
//! - every declaration is either resolved or missing, never both
//! - no discovered device is bound twice
//! - resolved + unclaimed accounts for the whole pool

use modem_testbench::device::{
    DeclaredDevice, DiscoveredDevice, IdentityKey, InterfaceKind, MatchKey,
};
use modem_testbench::probe::DiscoveryPool;
use modem_testbench::reconcile::reconcile;
use proptest::prelude::*;
use std::collections::HashSet;

const MODELS: &[&str] = &["EC25@Quectel", "BG96@Quectel", "SIM7600G@SIMCOM", "ME909s@Huawei"];
const READERS: &[&str] = &["Reader 00", "Reader 01"];

fn kind_strategy() -> impl Strategy<Value = InterfaceKind> {
    prop_oneof![Just(InterfaceKind::At), Just(InterfaceKind::Pcsc)]
}

fn declaration_strategy() -> impl Strategy<Value = (InterfaceKind, Option<usize>)> {
    (
        kind_strategy(),
        prop::option::of(0..MODELS.len() + READERS.len()),
    )
}

fn key_for(index: usize) -> &'static str {
    if index < MODELS.len() {
        MODELS[index]
    } else {
        READERS[index - MODELS.len()]
    }
}

fn build_declarations(specs: &[(InterfaceKind, Option<usize>)]) -> Vec<DeclaredDevice> {
    specs
        .iter()
        .enumerate()
        .map(|(i, (kind, key))| {
            let key = match key {
                Some(index) => MatchKey::Exact(IdentityKey::new(key_for(*index))),
                None => MatchKey::Wildcard,
            };
            DeclaredDevice::new(format!("dut{i}"), *kind, key)
        })
        .collect()
}

fn build_pool(modems: &[bool], readers: &[bool]) -> DiscoveryPool {
    let mut pool = DiscoveryPool::new();
    for (i, present) in modems.iter().enumerate() {
        if *present {
            pool.insert(DiscoveredDevice::at_modem(
                IdentityKey::new(MODELS[i]),
                format!("/dev/ttyUSB{i}"),
                115200,
            ));
        }
    }
    let mut index = 0;
    for (i, present) in readers.iter().enumerate() {
        if *present {
            pool.insert(DiscoveredDevice::pcsc_card(IdentityKey::new(READERS[i]), index));
            index += 1;
        }
    }
    pool
}

proptest! {
    #[test]
    fn prop_declarations_are_partitioned(
        specs in prop::collection::vec(declaration_strategy(), 0..8),
        modems in prop::collection::vec(any::<bool>(), MODELS.len()),
        readers in prop::collection::vec(any::<bool>(), READERS.len()),
    ) {
        let declared = build_declarations(&specs);
        let pool = build_pool(&modems, &readers);
        let pool_size = pool.len();

        let outcome = reconcile(&declared, pool);

        prop_assert_eq!(outcome.resolved.len() + outcome.missing.len(), declared.len());

        let resolved: HashSet<_> = outcome.resolved.iter().map(|r| r.name.clone()).collect();
        let missing: HashSet<_> = outcome.missing.iter().map(|m| m.name.clone()).collect();
        prop_assert!(resolved.is_disjoint(&missing));

        let connections: HashSet<_> =
            outcome.resolved.iter().map(|r| r.connection.clone()).collect();
        prop_assert_eq!(connections.len(), outcome.resolved.len());

        prop_assert_eq!(outcome.resolved.len() + outcome.unclaimed.len(), pool_size);
    }

    #[test]
    fn prop_outputs_follow_declaration_order(
        specs in prop::collection::vec(declaration_strategy(), 0..8),
        modems in prop::collection::vec(any::<bool>(), MODELS.len()),
        readers in prop::collection::vec(any::<bool>(), READERS.len()),
    ) {
        let declared = build_declarations(&specs);
        let outcome = reconcile(&declared, build_pool(&modems, &readers));

        let position = |name: &str| declared.iter().position(|d| d.name == name);
        let resolved: Vec<_> = outcome.resolved.iter().map(|r| position(&r.name)).collect();
        let missing: Vec<_> = outcome.missing.iter().map(|m| position(&m.name)).collect();

        prop_assert!(resolved.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(missing.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_reconcile_is_deterministic(
        specs in prop::collection::vec(declaration_strategy(), 0..8),
        modems in prop::collection::vec(any::<bool>(), MODELS.len()),
        readers in prop::collection::vec(any::<bool>(), READERS.len()),
    ) {
        let declared = build_declarations(&specs);
        let pool = build_pool(&modems, &readers);

        let first = reconcile(&declared, pool.clone());
        let second = reconcile(&declared, pool);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_wildcards_only_take_their_kind(
        kinds in prop::collection::vec(kind_strategy(), 0..6),
        modems in prop::collection::vec(any::<bool>(), MODELS.len()),
        readers in prop::collection::vec(any::<bool>(), READERS.len()),
    ) {
        let specs: Vec<_> = kinds.iter().map(|kind| (*kind, None)).collect();
        let declared = build_declarations(&specs);
        let outcome = reconcile(&declared, build_pool(&modems, &readers));

        for resolved in &outcome.resolved {
            let declaration = declared.iter().find(|d| d.name == resolved.name).unwrap();
            let is_card = resolved.connection.starts_with("pcsc:");
            prop_assert_eq!(is_card, declaration.kind == InterfaceKind::Pcsc);
        }
    }
}

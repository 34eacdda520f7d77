//! Property tests for reconciliation and output assembly.
//!
//! Uses proptest to verify:
//! 1. Every requested symbol lands in exactly one of snapshot / bad log
//! 2. A fetched symbol always wins; carried bars are the prior bar verbatim
//! 3. Assembly is deterministic for a given state

use barfeed_core::calendar::Target;
use barfeed_core::domain::{Bar, FetchOutcome, Symbol};
use barfeed_runner::{assemble, reconcile, Manifest, Snapshot, SnapshotEntry};
use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::BTreeMap;

// ── Strategies (proptest) ────────────────────────────────────────────

const UNIVERSE: &[&str] = &["AAPL", "MSFT", "BRK-B", "SPY", "XOM", "KO", "T", "ZZZZ"];

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 4, n).unwrap()
}

fn arb_bar() -> impl Strategy<Value = Bar> {
    (1..29u32, 1.0..1_000.0_f64).prop_map(|(d, close)| Bar::close_only(day(d), close))
}

fn arb_outcome() -> impl Strategy<Value = FetchOutcome> {
    prop_oneof![
        arb_bar().prop_map(FetchOutcome::Fetched),
        Just(FetchOutcome::NotFound),
        "[a-z ]{1,12}".prop_map(FetchOutcome::Malformed),
        "[a-z ]{1,12}".prop_map(FetchOutcome::TransientError),
    ]
}

fn arb_prior() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(prop::sample::select(UNIVERSE), arb_bar(), 0..UNIVERSE.len())
        .prop_map(|m| {
            m.into_iter()
                .map(|(s, bar)| (Symbol::normalize(s), SnapshotEntry { bar, fresh: true }))
                .collect()
        })
}

fn arb_run() -> impl Strategy<Value = (Vec<Symbol>, BTreeMap<Symbol, FetchOutcome>)> {
    prop::collection::btree_map(prop::sample::select(UNIVERSE), arb_outcome(), 1..UNIVERSE.len())
        .prop_map(|m| {
            let outcomes: BTreeMap<Symbol, FetchOutcome> = m
                .into_iter()
                .map(|(s, o)| (Symbol::normalize(s), o))
                .collect();
            let requested = outcomes.keys().cloned().collect();
            (requested, outcomes)
        })
}

// ── 1. Completeness ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn every_symbol_resolved_or_logged_exactly_once(
        prior in arb_prior(),
        (requested, outcomes) in arb_run(),
    ) {
        let r = reconcile(&prior, &requested, &outcomes);
        for symbol in &requested {
            let in_snapshot = r.snapshot.contains(symbol);
            let in_bad = r.bad.contains(symbol);
            prop_assert!(in_snapshot != in_bad, "{} in snapshot={} bad={}", symbol, in_snapshot, in_bad);
        }
        prop_assert_eq!(r.snapshot.len() + r.bad.len(), requested.len());
        prop_assert_eq!(r.resolved(), r.snapshot.len());
    }
}

// ── 2. Freshness and carry-forward ───────────────────────────────────

proptest! {
    #[test]
    fn fetched_wins_and_carried_is_verbatim(
        prior in arb_prior(),
        (requested, outcomes) in arb_run(),
    ) {
        let r = reconcile(&prior, &requested, &outcomes);
        for symbol in &requested {
            match (&outcomes[symbol], prior.get(symbol)) {
                (FetchOutcome::Fetched(bar), _) => {
                    let entry = r.snapshot.get(symbol).unwrap();
                    prop_assert!(entry.fresh);
                    prop_assert_eq!(&entry.bar, bar);
                }
                (_, Some(previous)) => {
                    let entry = r.snapshot.get(symbol).unwrap();
                    prop_assert!(!entry.fresh);
                    prop_assert_eq!(&entry.bar, &previous.bar);
                }
                (_, None) => prop_assert!(r.bad.contains(symbol)),
            }
        }
        prop_assert_eq!(r.snapshot.iter().filter(|(_, e)| e.fresh).count(), r.fresh);
    }
}

// ── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn assembly_is_deterministic(
        prior in arb_prior(),
        (requested, outcomes) in arb_run(),
    ) {
        let r = reconcile(&prior, &requested, &outcomes);
        let target = Target::Date(day(15));
        let a = assemble(&r.snapshot, &r.bad, target, Manifest::default()).unwrap();
        let b = assemble(&r.snapshot, &r.bad, target, Manifest::default()).unwrap();
        prop_assert_eq!(a, b);
    }
}

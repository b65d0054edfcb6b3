//! Property-style tests for the store and the debate controller.
//!
//! Each test sweeps a fixed grid of inputs and checks an invariant that
//! must hold for every point, rather than a single hand-picked case.

use stage_engine::debate::shared_decider;
use stage_engine::state::{FieldUpdate, StoreError};
use stage_engine::{
    keys, trading_schema, DebateController, DebateSpec, FnUnit, Message, RoundLimitDecider,
    RunScope, StageInput, StageOutput, StageRegistry, StageSpec, StateDelta, StateStore,
};

fn store() -> StateStore {
    StateStore::new(trading_schema())
}

fn messages(n: usize) -> Vec<Message> {
    (0..n).map(|i| Message::responder(format!("m{}", i))).collect()
}

// ── Store invariants ───────────────────────────────────────────────

/// Versions rise by exactly one per accepted delta.
#[test]
fn prop_version_increments_once_per_delta() {
    for count in 0..20u64 {
        let store = store();
        for i in 0..count {
            let v = store
                .apply(StateDelta::new().set(keys::MARKET_REPORT, format!("r{}", i)))
                .unwrap();
            assert_eq!(v, i + 1);
        }
        assert_eq!(store.version(), count);
        assert_eq!(store.history().len() as u64, count);
    }
}

/// A delta with any invalid entry leaves state and version untouched,
/// even when its other entries are valid.
#[test]
fn prop_rejected_delta_is_all_or_nothing() {
    fn unknown_key(e: &StoreError) -> bool {
        matches!(e, StoreError::UnknownKey(_))
    }
    fn policy_mismatch(e: &StoreError) -> bool {
        matches!(e, StoreError::PolicyMismatch { .. })
    }

    let bad_entries: [(StateDelta, fn(&StoreError) -> bool); 3] = [
        (StateDelta::new().set("not_a_key", "x"), unknown_key),
        (StateDelta::new().set(keys::MESSAGES, "x"), policy_mismatch),
        (
            StateDelta::new().append(keys::NEWS_REPORT, messages(1)),
            policy_mismatch,
        ),
    ];

    for (bad, is_expected) in bad_entries {
        for prefix in 0..4usize {
            let store = store();
            store
                .apply(StateDelta::new().set(keys::MARKET_REPORT, "before"))
                .unwrap();
            let before = store.snapshot();

            let delta = StateDelta::new()
                .set(keys::MARKET_REPORT, "after")
                .append(keys::MESSAGES, messages(prefix))
                .merge(bad.clone());
            let err = store.apply(delta).unwrap_err();

            assert!(is_expected(&err), "unexpected error {:?}", err);
            assert_eq!(store.snapshot(), before);
            assert_eq!(store.version(), 1);
        }
    }
}

/// Appending n records then removing any subset leaves exactly the
/// complement, in original order.
#[test]
fn prop_remove_leaves_complement_in_order() {
    for n in 1..8usize {
        for mask in 0..(1u32 << n) {
            let store = store();
            let records = messages(n);
            store
                .apply(StateDelta::new().append(keys::MESSAGES, records.clone()))
                .unwrap();

            let removed: Vec<_> = records
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, m)| m.id.clone())
                .collect();
            store
                .apply(StateDelta::new().remove(keys::MESSAGES, removed))
                .unwrap();

            let expected: Vec<_> = records
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) == 0)
                .map(|(_, m)| m.content.clone())
                .collect();
            let visible: Vec<_> = store
                .snapshot()
                .messages(keys::MESSAGES)
                .iter()
                .map(|m| m.content.clone())
                .collect();
            assert_eq!(visible, expected, "n={} mask={:b}", n, mask);
        }
    }
}

/// A removed id can never be appended again.
#[test]
fn prop_removed_ids_stay_retired() {
    for n in 1..6usize {
        let store = store();
        let records = messages(n);
        store
            .apply(StateDelta::new().append(keys::MESSAGES, records.clone()))
            .unwrap();
        let ids: Vec<_> = records.iter().map(|m| m.id.clone()).collect();
        store
            .apply(StateDelta::new().remove(keys::MESSAGES, ids))
            .unwrap();

        for record in &records {
            let err = store
                .apply(StateDelta::new().append(keys::MESSAGES, vec![record.clone()]))
                .unwrap_err();
            assert!(matches!(err, StoreError::DuplicateRecord { .. }));
        }
        assert!(store.snapshot().messages(keys::MESSAGES).is_empty());
    }
}

/// The delta log replays to the same visible state.
#[test]
fn prop_history_replays_to_snapshot() {
    for steps in 1..10usize {
        let store = store();
        let mut live = Vec::new();
        for i in 0..steps {
            let record = Message::responder(format!("step {}", i));
            let mut delta = StateDelta::new()
                .set(keys::TRADE_DATE, format!("2024-01-{:02}", i + 1))
                .append(keys::MESSAGES, vec![record.clone()]);
            if i % 3 == 2 {
                let dropped: Vec<Message> = live.drain(..1).collect();
                delta = delta.remove(keys::MESSAGES, vec![dropped[0].id.clone()]);
            }
            live.push(record);
            store.apply(delta).unwrap();
        }

        let replay = StateStore::new(trading_schema());
        for record in store.history() {
            let removes = record
                .delta
                .updates()
                .iter()
                .any(|u| matches!(u.update, FieldUpdate::Remove(_)));
            assert_eq!(removes, record.version % 3 == 0);
            replay.apply_from(&record.origin, record.delta).unwrap();
        }
        assert_eq!(replay.snapshot(), store.snapshot());
        assert_eq!(store.snapshot().messages(keys::MESSAGES).len(), live.len());
    }
}

// ── Debate invariants ──────────────────────────────────────────────

const ROLES: [&str; 4] = ["p0", "p1", "p2", "p3"];

fn panel(size: usize) -> stage_engine::SharedStageRegistry {
    let mut builder = StageRegistry::builder();
    for role in &ROLES[..size] {
        builder = builder.stage(
            StageSpec::new(*role).reads(&[keys::RISK_DEBATE_STATE]),
            FnUnit::shared(|input: &StageInput| {
                Ok(StageOutput::reply(format!("{} speaks", input.stage)))
            }),
        );
    }
    builder.build(&trading_schema()).unwrap().shared()
}

/// Turns never exceed the cap, and the rotation never skips a seat.
#[tokio::test]
async fn prop_debate_turns_bounded_and_rotating() {
    for size in 1..=ROLES.len() {
        for cap in 0..=8u32 {
            for rounds in 0..=3u32 {
                let spec = DebateSpec::new("panel", keys::RISK_DEBATE_STATE)
                    .participants(&ROLES[..size])
                    .max_turns(cap);
                let controller = DebateController::new(
                    spec,
                    panel(size),
                    shared_decider(RoundLimitDecider::new(rounds)),
                )
                .unwrap();
                let scope = RunScope::new("prop", StateStore::new(trading_schema()).shared());

                let outcome = controller.run(&scope).await.unwrap();

                let expected = if cap == 0 {
                    0
                } else {
                    cap.min((rounds * size as u32).max(1))
                };
                assert_eq!(
                    outcome.turns, expected,
                    "size={} cap={} rounds={}",
                    size, cap, rounds
                );
                assert_eq!(outcome.state.total_contributions(), expected as usize);
                assert_eq!(scope.store.version(), u64::from(expected));
                for (i, speaker) in outcome.speakers.iter().enumerate() {
                    assert_eq!(speaker, ROLES[i % size]);
                }
            }
        }
    }
}

use crate::ledger::domain::{
    Cell, CellInput, CellOutput, Direction, OutPoint, Script, Transaction, TransactionView,
    MIN_CELL_CAPACITY,
};
use crate::ledger::engine::lifecycle::*;
use crate::ledger::engine::reconcile::*;
use crate::ledger::index::types::{IoType, TxStatusKind, TxWithCell};

// =========================================================================
// Helpers
// =========================================================================

const CKB: u64 = 100_000_000;

fn ours() -> Script {
    Script::secp256k1_blake160("0x0fae74b7377476606e196ec17498d315ec12abf9")
}

fn theirs() -> Script {
    Script::secp256k1_blake160("0xc8328aabcd9b9e8e64fbc566c4385c3bdeb219d7")
}

fn hash(n: u8) -> String {
    format!("0x{}", format!("{:02x}", n).repeat(32))
}

fn view(n: u8, inputs: &[(u8, u32)], outputs: &[(u64, Script)]) -> TransactionView {
    TransactionView {
        hash: hash(n),
        inner: Transaction {
            version: 0,
            cell_deps: vec![],
            header_deps: vec![],
            inputs: inputs
                .iter()
                .map(|&(h, i)| CellInput {
                    since: 0,
                    previous_output: OutPoint::new(hash(h), i),
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|(c, lock)| CellOutput {
                    capacity: *c,
                    lock: lock.clone(),
                    type_script: None,
                })
                .collect(),
            outputs_data: outputs.iter().map(|_| "0x".to_string()).collect(),
            witnesses: vec![],
        },
    }
}

fn row(view: &TransactionView, block: u64, io_type: IoType, io_index: u32) -> TxWithCell {
    TxWithCell {
        transaction: view.clone(),
        block_number: block,
        tx_index: 1,
        io_index,
        io_type,
        io_capacity: None,
    }
}

fn cell(n: u8, index: u32, capacity: u64) -> Cell {
    Cell {
        out_point: OutPoint::new(hash(n), index),
        capacity,
        lock: ours(),
        type_script: None,
        data: "0x".to_string(),
        block_number: 10,
    }
}

fn committed(confirmations: u64) -> LifecycleEvent {
    LifecycleEvent::StatusObserved(StatusObservation {
        status: TxStatusKind::Committed,
        confirmations: Some(confirmations),
        reason: None,
    })
}

fn observed(status: TxStatusKind) -> LifecycleEvent {
    LifecycleEvent::StatusObserved(StatusObservation {
        status,
        confirmations: None,
        reason: None,
    })
}

fn last_published(cmds: &[LifecycleCommand]) -> Option<&LifecycleSnapshot> {
    cmds.iter().rev().find_map(|c| match c {
        LifecycleCommand::Publish(s) => Some(s),
        _ => None,
    })
}

// =========================================================================
// Reconciliation
// =========================================================================

#[test]
fn spent_cell_is_excluded_from_balance() {
    // tx 1 funds us with two cells, tx 2 spends the first one.
    let funding = view(1, &[(9, 0)], &[(100 * CKB, ours()), (200 * CKB, ours())]);
    let spend = view(2, &[(1, 0)], &[(99 * CKB, theirs())]);
    let rows = vec![
        row(&funding, 10, IoType::Output, 0),
        row(&funding, 10, IoType::Output, 1),
        row(&spend, 20, IoType::Input, 0),
    ];
    // The index has not caught up and still reports both cells.
    let cells = vec![cell(1, 0, 100 * CKB), cell(1, 1, 200 * CKB)];

    let r = reconcile(&rows, cells, 25);
    assert_eq!(r.balance, 200 * CKB);
    assert_eq!(r.live_cells.len(), 1);
    assert_eq!(r.live_cells[0].out_point, OutPoint::new(hash(1), 1));
    assert_eq!(r.excluded, 1);
    assert!(r.desync.is_none());
    for c in &r.live_cells {
        assert!(!r.spent.contains(&c.out_point));
    }
}

#[test]
fn out_point_match_ignores_case() {
    let spend = view(2, &[(0xab, 0)], &[(99 * CKB, theirs())]);
    let rows = vec![row(&spend, 20, IoType::Input, 0)];
    let mut c = cell(0xab, 0, 100 * CKB);
    c.out_point.tx_hash = c.out_point.tx_hash.to_uppercase().replace("0X", "0x");

    let r = reconcile(&rows, vec![c, cell(3, 0, 70 * CKB)], 30);
    assert_eq!(r.balance, 70 * CKB);
}

#[test]
fn duplicate_cells_count_once() {
    let r = reconcile(&[], vec![cell(1, 0, 80 * CKB), cell(1, 0, 80 * CKB)], 5);
    assert_eq!(r.balance, 80 * CKB);
    assert_eq!(r.live_cells.len(), 1);
}

#[test]
fn empty_live_set_with_history_is_desync() {
    let funding = view(1, &[(9, 0)], &[(100 * CKB, ours())]);
    let later = view(2, &[(8, 0)], &[(100 * CKB, ours())]);
    let rows = vec![
        row(&later, 5_000, IoType::Output, 0),
        row(&funding, 1_050, IoType::Output, 0),
    ];

    let r = reconcile(&rows, vec![], 6_000);
    assert_eq!(r.balance, 0);
    assert_eq!(
        r.desync,
        Some(DesyncRepair {
            earliest_block: 1_050,
            rescan_from: 950,
        })
    );
}

#[test]
fn desync_rescan_never_negative() {
    let funding = view(1, &[(9, 0)], &[(100 * CKB, ours())]);
    let rows = vec![row(&funding, 40, IoType::Output, 0)];
    let repair = detect_desync(&[], &rows, DESYNC_MARGIN).unwrap();
    assert_eq!(repair.rescan_from, 0);
}

#[test]
fn no_history_no_desync() {
    let r = reconcile(&[], vec![], 100);
    assert!(r.desync.is_none());
    assert_eq!(r.balance, 0);
}

// =========================================================================
// History
// =========================================================================

#[test]
fn incoming_transfer() {
    let tx = view(1, &[(9, 0)], &[(500 * CKB, ours()), (20 * CKB, theirs())]);
    let records = summarize_history(&[row(&tx, 100, IoType::Output, 0)], &ours(), 102);

    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.direction, Direction::In);
    assert_eq!(r.amount, 500 * CKB);
    assert_eq!(r.balance_change, i128::from(500 * CKB));
    assert_eq!(r.fee, 0);
    assert_eq!(r.confirmations, 3);
}

#[test]
fn outgoing_transfer_with_resolved_fee() {
    let funding = view(1, &[(9, 0)], &[(1_000 * CKB, ours())]);
    let fee = 100_000;
    let spend = view(
        2,
        &[(1, 0)],
        &[(300 * CKB, theirs()), (700 * CKB - fee, ours())],
    );
    let rows = vec![
        row(&spend, 200, IoType::Input, 0),
        row(&spend, 200, IoType::Output, 1),
        row(&funding, 100, IoType::Output, 0),
    ];

    let records = summarize_history(&rows, &ours(), 250);
    assert_eq!(records[0].tx_hash, hash(2));
    assert_eq!(records[1].tx_hash, hash(1));

    let out = &records[0];
    assert_eq!(out.direction, Direction::Out);
    assert_eq!(out.amount, 300 * CKB);
    assert_eq!(out.fee, fee);
    assert_eq!(out.balance_change, -i128::from(300 * CKB + fee));
}

#[test]
fn self_transfer() {
    let funding = view(1, &[(9, 0)], &[(1_000 * CKB, ours())]);
    let consolidate = view(2, &[(1, 0)], &[(1_000 * CKB - 2_000, ours())]);
    let rows = vec![
        row(&consolidate, 200, IoType::Input, 0),
        row(&consolidate, 200, IoType::Output, 0),
        row(&funding, 100, IoType::Output, 0),
    ];

    let records = summarize_history(&rows, &ours(), 200);
    let r = &records[0];
    assert_eq!(r.direction, Direction::SelfTransfer);
    assert_eq!(r.amount, 1_000 * CKB - 2_000);
    assert_eq!(r.fee, 2_000);
    assert_eq!(r.confirmations, 1);
}

#[test]
fn fee_unknown_when_inputs_are_shared() {
    // Two inputs, only one of them ours.
    let tx = view(2, &[(1, 0), (7, 3)], &[(150 * CKB, theirs())]);
    let mut input = row(&tx, 200, IoType::Input, 0);
    input.io_capacity = Some(100 * CKB);

    let records = summarize_history(&[input], &ours(), 300);
    assert_eq!(records[0].direction, Direction::Out);
    assert_eq!(records[0].fee, 0);
}

#[test]
fn confirmations_zero_for_future_block() {
    let tx = view(1, &[(9, 0)], &[(MIN_CELL_CAPACITY, ours())]);
    let records = summarize_history(&[row(&tx, 500, IoType::Output, 0)], &ours(), 400);
    assert_eq!(records[0].confirmations, 0);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[test]
fn broadcast_schedules_rescan_and_poll() {
    let mut m = LifecycleMachine::default();
    let cmds = m.handle_event(LifecycleEvent::SendStarted);
    assert_eq!(last_published(&cmds).unwrap().state, SendState::Sending);

    let cmds = m.handle_event(LifecycleEvent::Broadcasted { tx_hash: hash(5) });
    assert_eq!(last_published(&cmds).unwrap().state, SendState::Pending);
    assert!(cmds.contains(&LifecycleCommand::ScheduleChangeRescan { tx_hash: hash(5) }));
    assert_eq!(cmds.last(), Some(&LifecycleCommand::PollAgain));
}

#[test]
fn unknown_status_stays_pending() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });

    let cmds = m.handle_event(observed(TxStatusKind::Unknown));
    assert_eq!(m.snapshot().state, SendState::Pending);
    assert_eq!(cmds, vec![LifecycleCommand::PollAgain]);
}

#[test]
fn partial_confirmation_keeps_polling() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });
    m.handle_event(observed(TxStatusKind::Proposed));
    assert_eq!(m.snapshot().state, SendState::Proposed);

    let cmds = m.handle_event(committed(1));
    let snap = last_published(&cmds).unwrap();
    assert_eq!(snap.state, SendState::Confirming { confirmations: 1 });
    assert_eq!(snap.message, "1/3 confirmations");
    assert_eq!(cmds.last(), Some(&LifecycleCommand::PollAgain));
    assert!(!cmds.contains(&LifecycleCommand::RefreshBalance));
}

#[test]
fn three_confirmations_is_terminal() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });
    m.handle_event(committed(1));

    let cmds = m.handle_event(committed(3));
    assert_eq!(
        last_published(&cmds).unwrap().state,
        SendState::Confirmed { confirmations: 3 }
    );
    assert!(cmds.contains(&LifecycleCommand::RefreshBalance));
    assert_eq!(cmds.last(), Some(&LifecycleCommand::StopPolling));
    assert!(m.is_stopped());

    // Nothing happens after a terminal state.
    assert!(m.handle_event(committed(4)).is_empty());
}

#[test]
fn rejected_status_fails() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });
    let cmds = m.handle_event(LifecycleEvent::StatusObserved(StatusObservation {
        status: TxStatusKind::Rejected,
        confirmations: None,
        reason: Some("double spend".to_string()),
    }));
    assert_eq!(
        last_published(&cmds).unwrap().state,
        SendState::Failed { reason: "double spend".to_string() }
    );
    assert_eq!(cmds.last(), Some(&LifecycleCommand::StopPolling));
}

#[test]
fn broadcast_rejection_fails_without_polling() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::SendStarted);
    let cmds = m.handle_event(LifecycleEvent::BroadcastRejected {
        reason: "verification failed".to_string(),
    });
    assert!(matches!(m.snapshot().state, SendState::Failed { .. }));
    assert!(!cmds.contains(&LifecycleCommand::PollAgain));
}

#[test]
fn query_failures_count_toward_budget_and_time_out() {
    let mut m = LifecycleMachine::new(REQUIRED_CONFIRMATIONS, 3);
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });
    m.handle_event(committed(1));

    let cmds = m.handle_event(LifecycleEvent::QueryFailed { error: "timeout".into() });
    assert_eq!(cmds, vec![LifecycleCommand::PollAgain]);

    let cmds = m.handle_event(observed(TxStatusKind::Unknown));
    let snap = last_published(&cmds).unwrap();
    assert!(snap.timed_out);
    assert_eq!(snap.attempts, 3);
    assert_eq!(snap.message, TIMED_OUT_MESSAGE);
    // Last known state survives the timeout.
    assert_eq!(snap.state, SendState::Pending);
    assert_eq!(cmds.last(), Some(&LifecycleCommand::StopPolling));
}

#[test]
fn cancel_preserves_state() {
    let mut m = LifecycleMachine::default();
    m.handle_event(LifecycleEvent::TrackingStarted { tx_hash: hash(5) });
    m.handle_event(committed(2));

    let cmds = m.handle_event(LifecycleEvent::Cancelled);
    assert_eq!(m.snapshot().state, SendState::Confirming { confirmations: 2 });
    assert_eq!(cmds.last(), Some(&LifecycleCommand::StopPolling));
    assert!(m.handle_event(committed(3)).is_empty());
}

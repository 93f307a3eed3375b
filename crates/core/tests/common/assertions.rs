//! Custom assertion helpers for integration tests.

use pc_protocol::ipc::Event;
use pc_protocol::workflow_models::{AttemptOutcome, StepName, WorkflowExecution};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Drain every event currently buffered in the receiver.
#[allow(dead_code)]
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Events belonging to one execution, in publication order.
#[allow(dead_code)]
pub fn events_for(events: &[Event], execution_id: Uuid) -> Vec<Event> {
    events
        .iter()
        .filter(|e| e.execution_id() == execution_id)
        .cloned()
        .collect()
}

/// Position of the first event matching `predicate`.
#[allow(dead_code)]
pub fn position_of(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events
        .iter()
        .position(predicate)
        .unwrap_or_else(|| panic!("No matching event in {events:#?}"))
}

/// Outcomes of the attempts of `step`, in attempt order.
#[allow(dead_code)]
pub fn outcomes(execution: &WorkflowExecution, step: StepName) -> Vec<AttemptOutcome> {
    execution.attempts_for(step).map(|a| a.outcome).collect()
}

/// Check the record-level invariants every execution must satisfy.
///
/// 1. Terminal status iff `ended_at` is set
/// 2. Attempt numbers per step are 1, 2, 3, ...
/// 3. At most one attempt is pending, and none once terminal
/// 4. History is ordered by start time
#[allow(dead_code)]
pub fn assert_execution_invariants(execution: &WorkflowExecution) {
    assert_eq!(
        execution.status.is_terminal(),
        execution.ended_at.is_some(),
        "status {} disagrees with ended_at {:?}",
        execution.status,
        execution.ended_at
    );

    for step in StepName::ALL {
        let numbers: Vec<u32> = execution.attempts_for(step).map(|a| a.attempt_number).collect();
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        assert_eq!(numbers, expected, "attempt numbers of {step}");
    }

    let pending = execution
        .history
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Pending)
        .count();
    assert!(pending <= 1, "{pending} attempts pending at once");
    if execution.status.is_terminal() {
        assert_eq!(pending, 0, "terminal execution has a pending attempt");
    }

    assert!(
        execution
            .history
            .windows(2)
            .all(|w| w[0].started_at <= w[1].started_at),
        "history is not ordered by start time"
    );
}

/// Assert the execution published exactly one terminal event and that
/// only discarded late results follow it.
#[allow(dead_code)]
pub fn assert_terminal_event_is_last(events: &[Event]) {
    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "expected exactly one terminal event: {events:#?}");

    let index = position_of(events, Event::is_terminal);
    let after = &events[index + 1..];
    assert!(
        after
            .iter()
            .all(|e| matches!(e, Event::LateResultDiscarded { .. })),
        "events after the terminal event: {after:#?}"
    );
}

//! Call lifecycle state table
//!
//! A whitelist: any `(phase, event)` pair that is not inserted here is
//! rejected. `ProviderReset` is the only wildcard and forces `Ended` from
//! every phase, `Idle` and `Ended` included.
//!
//! | From                | Event                 | To                  |
//! |---------------------|-----------------------|---------------------|
//! | Idle                | IncomingCall          | Ringing(incoming)   |
//! | Idle                | StartOutgoingCall     | Ringing(outgoing)   |
//! | Ringing(incoming)   | AcceptTapped          | Connecting          |
//! | Ringing(*)          | DeclineTapped         | Ended               |
//! | Ringing(outgoing)   | ConnectionEstablished | Connected           |
//! | Ringing(*)          | ConnectionFailed      | Ended               |
//! | Connecting          | ConnectionEstablished | Connected           |
//! | Connecting          | ConnectionFailed      | Ended               |
//! | Connected           | EndTapped             | Ended               |
//! | Connected           | ConnectionFailed      | Ended               |
//! | Ended               | Reset                 | Idle                |
//! | *                   | ProviderReset         | Ended               |

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::{CallDirection, CallEvent, CallPhase, EventKind};

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct StateKey {
    pub phase: CallPhase,
    pub event: EventKind,
}

/// Whitelisted transitions, plus wildcards that apply from any phase
#[derive(Debug, Default)]
pub struct StateTable {
    transitions: HashMap<StateKey, CallPhase>,
    wildcard_transitions: HashMap<EventKind, CallPhase>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, phase: CallPhase, event: EventKind, next: CallPhase) {
        self.transitions.insert(StateKey { phase, event }, next);
    }

    /// Insert a transition that applies to any phase
    pub fn insert_wildcard(&mut self, event: EventKind, next: CallPhase) {
        self.wildcard_transitions.insert(event, next);
    }

    /// Wildcards take precedence so they can never be shadowed
    pub fn get(&self, phase: CallPhase, event: EventKind) -> Option<CallPhase> {
        if let Some(next) = self.wildcard_transitions.get(&event) {
            return Some(*next);
        }
        self.transitions.get(&StateKey { phase, event }).copied()
    }

    /// Number of explicit (non-wildcard) entries
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.wildcard_transitions.is_empty()
    }
}

/// The call table, built once
pub static CALL_TABLE: Lazy<StateTable> = Lazy::new(build_call_table);

fn build_call_table() -> StateTable {
    use CallDirection::{Incoming, Outgoing};
    use CallPhase::*;

    let mut table = StateTable::new();

    table.insert(Idle, EventKind::IncomingCall, Ringing(Incoming));
    table.insert(Idle, EventKind::StartOutgoingCall, Ringing(Outgoing));

    // Only the callee can accept
    table.insert(Ringing(Incoming), EventKind::AcceptTapped, Connecting);

    for direction in [Incoming, Outgoing] {
        table.insert(Ringing(direction), EventKind::DeclineTapped, Ended);
        table.insert(Ringing(direction), EventKind::ConnectionFailed, Ended);
    }

    // Host-confirmed outgoing call skips Connecting
    table.insert(Ringing(Outgoing), EventKind::ConnectionEstablished, Connected);

    table.insert(Connecting, EventKind::ConnectionEstablished, Connected);
    table.insert(Connecting, EventKind::ConnectionFailed, Ended);

    table.insert(Connected, EventKind::EndTapped, Ended);
    table.insert(Connected, EventKind::ConnectionFailed, Ended);

    table.insert(Ended, EventKind::Reset, Idle);

    table.insert_wildcard(EventKind::ProviderReset, Ended);

    tracing::debug!("Built call state table with {} transitions", table.len());
    table
}

/// Pure transition function: `None` means the event is not permitted
pub fn next_phase(current: CallPhase, event: &CallEvent) -> Option<CallPhase> {
    CALL_TABLE.get(current, event.kind())
}

/// Every phase value, for exhaustive checks
pub const ALL_PHASES: [CallPhase; 6] = [
    CallPhase::Idle,
    CallPhase::Ringing(CallDirection::Incoming),
    CallPhase::Ringing(CallDirection::Outgoing),
    CallPhase::Connecting,
    CallPhase::Connected,
    CallPhase::Ended,
];

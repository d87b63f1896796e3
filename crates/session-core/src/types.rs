//! Core types for session-core
//!
//! The single canonical call lifecycle (`CallPhase`), the producer-agnostic
//! `CallEvent`, the envelope metadata that travels with every event, and the
//! published `CallSession` snapshot. Every layer (UI, provider, effects)
//! consumes these same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of the call relative to this device
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Incoming => write!(f, "incoming"),
            CallDirection::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Call lifecycle phase
///
/// `Idle -> Ringing -> Connecting -> Connected -> Ended -> Idle`.
/// `Ringing` carries the call direction because the transition guards
/// depend on it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallPhase {
    /// No active call; initial and terminal
    Idle,
    /// Call offered, not yet accepted or declined
    Ringing(CallDirection),
    /// Accepted locally, waiting for the host to confirm media
    Connecting,
    /// Media path established
    Connected,
    /// Terminal for this call; collapses back to `Idle`
    Ended,
}

impl CallPhase {
    /// Phases during which a provider call token must be held
    pub fn holds_call(&self) -> bool {
        matches!(
            self,
            CallPhase::Ringing(_) | CallPhase::Connecting | CallPhase::Connected
        )
    }

    /// Short name, direction-agnostic
    pub fn name(&self) -> &'static str {
        match self {
            CallPhase::Idle => "Idle",
            CallPhase::Ringing(_) => "Ringing",
            CallPhase::Connecting => "Connecting",
            CallPhase::Connected => "Connected",
            CallPhase::Ended => "Ended",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Ringing(direction) => write!(f, "Ringing({})", direction),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Opaque token correlating the session with the provider's call handle
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProviderCallId(pub Uuid);

impl ProviderCallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProviderCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events that drive the call lifecycle, regardless of who produced them
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    IncomingCall { peer_name: String },
    StartOutgoingCall { peer_name: String },
    AcceptTapped,
    DeclineTapped,
    ConnectionEstablished,
    ConnectionFailed,
    EndTapped,
    /// Host subsystem tore the call down; accepted from any phase
    ProviderReset,
    /// Return from `Ended` to `Idle`
    Reset,
}

/// Parameter-free discriminant of a `CallEvent`, used as a table key
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    IncomingCall,
    StartOutgoingCall,
    AcceptTapped,
    DeclineTapped,
    ConnectionEstablished,
    ConnectionFailed,
    EndTapped,
    ProviderReset,
    Reset,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::IncomingCall,
        EventKind::StartOutgoingCall,
        EventKind::AcceptTapped,
        EventKind::DeclineTapped,
        EventKind::ConnectionEstablished,
        EventKind::ConnectionFailed,
        EventKind::EndTapped,
        EventKind::ProviderReset,
        EventKind::Reset,
    ];
}

impl CallEvent {
    /// Strip parameters for table lookup
    pub fn kind(&self) -> EventKind {
        match self {
            CallEvent::IncomingCall { .. } => EventKind::IncomingCall,
            CallEvent::StartOutgoingCall { .. } => EventKind::StartOutgoingCall,
            CallEvent::AcceptTapped => EventKind::AcceptTapped,
            CallEvent::DeclineTapped => EventKind::DeclineTapped,
            CallEvent::ConnectionEstablished => EventKind::ConnectionEstablished,
            CallEvent::ConnectionFailed => EventKind::ConnectionFailed,
            CallEvent::EndTapped => EventKind::EndTapped,
            CallEvent::ProviderReset => EventKind::ProviderReset,
            CallEvent::Reset => EventKind::Reset,
        }
    }

    /// Get the type name of this event (without parameter values)
    pub fn type_name(&self) -> &'static str {
        match self {
            CallEvent::IncomingCall { .. } => "IncomingCall",
            CallEvent::StartOutgoingCall { .. } => "StartOutgoingCall",
            CallEvent::AcceptTapped => "AcceptTapped",
            CallEvent::DeclineTapped => "DeclineTapped",
            CallEvent::ConnectionEstablished => "ConnectionEstablished",
            CallEvent::ConnectionFailed => "ConnectionFailed",
            CallEvent::EndTapped => "EndTapped",
            CallEvent::ProviderReset => "ProviderReset",
            CallEvent::Reset => "Reset",
        }
    }

    /// Peer name carried by call-offer events
    pub fn peer_name(&self) -> Option<&str> {
        match self {
            CallEvent::IncomingCall { peer_name } | CallEvent::StartOutgoingCall { peer_name } => {
                Some(peer_name.as_str())
            }
            _ => None,
        }
    }
}

/// Who produced an event
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventSource {
    /// User interface taps
    Ui,
    /// Host telephony provider callbacks or transaction results
    Provider,
    /// Coordinator-scheduled events (auto reset, timeouts)
    Internal,
}

/// An event plus where it came from and which call it refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: CallEvent,
    pub source: EventSource,
    /// When set, the event is rejected unless it matches the held call
    pub call_id: Option<ProviderCallId>,
}

impl EventEnvelope {
    pub fn ui(event: CallEvent) -> Self {
        Self { event, source: EventSource::Ui, call_id: None }
    }

    pub fn provider(event: CallEvent, call_id: Option<ProviderCallId>) -> Self {
        Self { event, source: EventSource::Provider, call_id }
    }

    pub fn internal(event: CallEvent, call_id: Option<ProviderCallId>) -> Self {
        Self { event, source: EventSource::Internal, call_id }
    }
}

/// Why an event was not applied
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The state table has no entry for (phase, event)
    NotPermitted,
    /// The event carries a provider token for a different call
    StaleCallId,
    /// A timeout armed for an earlier transition fired late
    StaleTimer,
    /// The coordinator has shut down
    CoordinatorStopped,
}

/// Outcome of `CallSessionCoordinator::handle`
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransitionResult {
    Applied {
        previous: CallPhase,
        applied: CallPhase,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_applied()
    }

    /// The new phase, if the transition was applied
    pub fn applied_phase(&self) -> Option<CallPhase> {
        match self {
            TransitionResult::Applied { applied, .. } => Some(*applied),
            TransitionResult::Rejected { .. } => None,
        }
    }
}

/// The single, process-wide call record as published to observers
///
/// `elapsed_seconds` is only meaningful while `phase == Connected`; it is
/// zero otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    pub phase: CallPhase,
    pub peer_name: Option<String>,
    pub direction: Option<CallDirection>,
    pub provider_call_id: Option<ProviderCallId>,
    /// Wall-clock time the call entered `Connected`
    pub connected_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    /// Last audio activation state reported by the provider
    pub provider_audio_active: bool,
    /// Number of transitions applied since the coordinator started
    pub sequence: u64,
}

impl CallSession {
    /// The session as it exists at process start
    pub fn idle() -> Self {
        Self {
            phase: CallPhase::Idle,
            peer_name: None,
            direction: None,
            provider_call_id: None,
            connected_at: None,
            elapsed_seconds: 0,
            provider_audio_active: false,
            sequence: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == CallPhase::Idle
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(CallPhase::Ringing(CallDirection::Outgoing).to_string(), "Ringing(outgoing)");
        assert_eq!(CallPhase::Connected.to_string(), "Connected");
    }

    #[test]
    fn test_holds_call() {
        assert!(!CallPhase::Idle.holds_call());
        assert!(CallPhase::Ringing(CallDirection::Incoming).holds_call());
        assert!(CallPhase::Connecting.holds_call());
        assert!(CallPhase::Connected.holds_call());
        assert!(!CallPhase::Ended.holds_call());
    }

    #[test]
    fn test_event_kind_covers_every_event() {
        let events = [
            CallEvent::IncomingCall { peer_name: "Family".into() },
            CallEvent::StartOutgoingCall { peer_name: "Bob".into() },
            CallEvent::AcceptTapped,
            CallEvent::DeclineTapped,
            CallEvent::ConnectionEstablished,
            CallEvent::ConnectionFailed,
            CallEvent::EndTapped,
            CallEvent::ProviderReset,
            CallEvent::Reset,
        ];
        let kinds: Vec<EventKind> = events.iter().map(CallEvent::kind).collect();
        assert_eq!(kinds, EventKind::ALL.to_vec());
        assert_eq!(events[1].peer_name(), Some("Bob"));
        assert_eq!(events[2].peer_name(), None);
    }
}

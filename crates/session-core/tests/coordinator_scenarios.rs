//! End-to-end call flows through the coordinator

mod common;

use std::time::Duration;

use callvita_session_core::prelude::*;
use callvita_session_core::state_table::{next_phase, ALL_PHASES};
use common::Harness;
use pretty_assertions::assert_eq;

use CallDirection::{Incoming, Outgoing};

#[tokio::test(start_paused = true)]
async fn test_outgoing_call_confirmed_talked_and_ended() {
    let mut h = Harness::auto();

    let result = h
        .coordinator
        .handle(CallEvent::StartOutgoingCall { peer_name: "Bob".into() })
        .await;
    assert_eq!(
        result,
        TransitionResult::Applied {
            previous: CallPhase::Idle,
            applied: CallPhase::Ringing(Outgoing),
        }
    );

    let ringing = h.next_notice().await;
    assert_eq!(ringing.applied, CallPhase::Ringing(Outgoing));
    assert_eq!(ringing.session.peer_name.as_deref(), Some("Bob"));
    let call_id = ringing.session.provider_call_id.expect("token allocated on ringing");

    // The simulated provider confirms the start on its own
    let connected = h.next_notice().await;
    assert_eq!(connected.applied, CallPhase::Connected);
    assert_eq!(connected.source, EventSource::Provider);
    assert!(connected.session.connected_at.is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.coordinator.current_state().elapsed_seconds, 10);

    let result = h.coordinator.handle(CallEvent::EndTapped).await;
    assert_eq!(result.applied_phase(), Some(CallPhase::Ended));
    h.expect_phases(&[CallPhase::Ended, CallPhase::Idle]).await;

    h.settle().await;
    assert_eq!(
        h.provider.requests(),
        vec![
            ProviderRequest::Start { call_id, peer_name: "Bob".into() },
            ProviderRequest::End { call_id },
        ]
    );

    let state = h.coordinator.current_state();
    assert!(state.is_idle());
    assert_eq!(state.elapsed_seconds, 0);
    assert_eq!(state.provider_call_id, None);
    assert!(h.notices.try_recv().is_none());
}

#[tokio::test]
async fn test_incoming_call_declined() {
    let mut h = Harness::auto();

    let call_id = h.ring_incoming("Family").await;
    let state = h.coordinator.current_state();
    assert_eq!(state.peer_name.as_deref(), Some("Family"));
    assert_eq!(state.direction, Some(Incoming));
    assert_eq!(state.provider_call_id, Some(call_id));
    assert!(h.devices.is_ring_alert_active());

    let result = h.coordinator.handle(CallEvent::DeclineTapped).await;
    assert!(result.is_applied());
    h.expect_phases(&[CallPhase::Ended, CallPhase::Idle]).await;

    // Ring alert stops before any of the ended effects
    let stop = h.position(DeviceCall::StopRinging);
    assert!(stop < h.position(DeviceCall::Route(AudioRoute::Released)));
    assert!(stop < h.position(DeviceCall::Pulse(HapticPulse::Ended)));
    assert!(!h.devices.is_ring_alert_active());

    h.settle().await;
    assert_eq!(h.provider.requests(), vec![ProviderRequest::End { call_id }]);
}

#[tokio::test]
async fn test_stale_callback_while_connected_is_rejected() {
    let mut h = Harness::manual();
    let call_id = h.connect_outgoing("Bob").await;

    let stranger = ProviderCallId::new();
    assert_ne!(stranger, call_id);

    let result = h
        .coordinator
        .handle_envelope(EventEnvelope::provider(CallEvent::ConnectionFailed, Some(stranger)))
        .await;
    assert_eq!(
        result,
        TransitionResult::Rejected { reason: RejectReason::StaleCallId }
    );

    h.deliver(ProviderCallback::EndPerformed { call_id: stranger }).await;
    let state = h.coordinator.current_state();
    assert_eq!(state.phase, CallPhase::Connected);
    assert_eq!(state.provider_call_id, Some(call_id));
    assert!(h.notices.try_recv().is_none());
}

#[tokio::test]
async fn test_end_tapped_twice_applies_once() {
    let mut h = Harness::manual();
    h.connect_outgoing("Bob").await;

    let first = h.coordinator.handle(CallEvent::EndTapped).await;
    let second = h.coordinator.handle(CallEvent::EndTapped).await;

    assert_eq!(first.applied_phase(), Some(CallPhase::Ended));
    assert_eq!(second, TransitionResult::Rejected { reason: RejectReason::NotPermitted });
    h.expect_phases(&[CallPhase::Ended]).await;
    assert!(h.notices.try_recv().is_none());

    assert_eq!(h.devices.times(DeviceCall::Pulse(HapticPulse::Ended)), 1);
    assert_eq!(h.devices.times(DeviceCall::Route(AudioRoute::Released)), 1);

    h.settle().await;
    let ends = h
        .provider
        .requests()
        .into_iter()
        .filter(|r| matches!(r, ProviderRequest::End { .. }))
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn test_ui_accept_acknowledges_after_voice_route() {
    let mut h = Harness::auto();
    let call_id = h.ring_incoming("Family").await;

    let result = h.coordinator.handle(CallEvent::AcceptTapped).await;
    assert_eq!(result.applied_phase(), Some(CallPhase::Connecting));
    // Effects are done by the time handle returns
    assert_eq!(h.devices.current_route(), Some(AudioRoute::VoiceCall));
    assert!(!h.devices.is_ring_alert_active());
    assert!(
        h.position(DeviceCall::StopRinging) < h.position(DeviceCall::Route(AudioRoute::VoiceCall))
    );

    h.expect_phases(&[CallPhase::Connecting, CallPhase::Connected]).await;
    assert_eq!(h.provider.requests(), vec![ProviderRequest::AnswerAck { call_id }]);
    assert_eq!(h.devices.times(DeviceCall::Pulse(HapticPulse::Answered)), 1);
}

#[tokio::test]
async fn test_answered_from_system_ui() {
    let mut h = Harness::manual();
    let call_id = h.ring_incoming("Family").await;

    h.provider.answer(call_id);
    let connecting = h.next_notice().await;
    assert_eq!(connecting.applied, CallPhase::Connecting);
    assert_eq!(connecting.source, EventSource::Provider);
    h.expect_phases(&[CallPhase::Connected]).await;

    h.settle().await;
    assert!(h.provider.requests().is_empty());
}

#[tokio::test]
async fn test_remote_hangup_ends_without_echo() {
    let mut h = Harness::manual();
    let call_id = h.connect_outgoing("Bob").await;

    h.deliver(ProviderCallback::EndPerformed { call_id }).await;
    let ended = h.next_notice().await;
    assert_eq!(ended.applied, CallPhase::Ended);
    assert_eq!(ended.event, CallEvent::EndTapped);

    h.settle().await;
    assert!(!h
        .provider
        .requests()
        .iter()
        .any(|r| matches!(r, ProviderRequest::End { .. })));
}

#[tokio::test]
async fn test_end_performed_while_connecting_fails_call() {
    let mut h = Harness::manual();
    let call_id = h.ring_incoming("Family").await;
    h.coordinator.handle(CallEvent::AcceptTapped).await;
    h.expect_phases(&[CallPhase::Connecting]).await;

    h.deliver(ProviderCallback::EndPerformed { call_id }).await;
    let ended = h.next_notice().await;
    assert_eq!(ended.event, CallEvent::ConnectionFailed);
    assert_eq!(ended.applied, CallPhase::Ended);
}

#[tokio::test]
async fn test_duplicate_confirmations_are_harmless() {
    let mut h = Harness::start(
        CoordinatorConfig::default(),
        SimulatedBehavior {
            duplicate_callbacks: true,
            ..SimulatedBehavior::default()
        },
    );

    h.coordinator
        .handle(CallEvent::StartOutgoingCall { peer_name: "Bob".into() })
        .await;
    h.expect_phases(&[CallPhase::Ringing(Outgoing), CallPhase::Connected]).await;
    h.settle().await;

    assert_eq!(h.phase(), CallPhase::Connected);
    assert!(h.notices.try_recv().is_none());
    assert_eq!(h.devices.times(DeviceCall::Pulse(HapticPulse::Answered)), 1);
}

#[tokio::test]
async fn test_events_not_in_table_are_rejected() {
    let h = Harness::manual();

    for event in [
        CallEvent::AcceptTapped,
        CallEvent::DeclineTapped,
        CallEvent::EndTapped,
        CallEvent::ConnectionEstablished,
        CallEvent::ConnectionFailed,
        CallEvent::Reset,
    ] {
        let result = h.coordinator.handle(event.clone()).await;
        assert_eq!(
            result,
            TransitionResult::Rejected { reason: RejectReason::NotPermitted },
            "{:?} from Idle",
            event
        );
    }
    assert!(h.coordinator.current_state().is_idle());
    assert!(h.devices.calls().is_empty());
}

#[tokio::test]
async fn test_second_offer_while_ringing_is_rejected() {
    let mut h = Harness::manual();
    let first = h.ring_incoming("Family").await;

    let result = h
        .coordinator
        .handle_envelope(EventEnvelope::provider(
            CallEvent::IncomingCall { peer_name: "Spam".into() },
            Some(ProviderCallId::new()),
        ))
        .await;
    assert!(result.is_rejected());

    let state = h.coordinator.current_state();
    assert_eq!(state.provider_call_id, Some(first));
    assert_eq!(state.peer_name.as_deref(), Some("Family"));
}

#[tokio::test]
async fn test_provider_audio_activation_is_tracked() {
    let h = Harness::manual();

    assert!(h.provider.activate_audio());
    h.coordinator.flush().await;
    assert!(h.coordinator.current_state().provider_audio_active);

    assert!(h.provider.deactivate_audio());
    h.coordinator.flush().await;
    assert!(!h.coordinator.current_state().provider_audio_active);
}

#[tokio::test]
async fn test_outgoing_call_connects_only_on_provider_confirmation() {
    let mut h = Harness::in_phase(CallPhase::Ringing(Outgoing)).await;
    let call_id = h
        .coordinator
        .current_state()
        .provider_call_id
        .expect("ringing call holds a token");

    let result = h.coordinator.handle(CallEvent::ConnectionEstablished).await;
    assert_eq!(result, TransitionResult::Rejected { reason: RejectReason::NotPermitted });

    for token in [None, Some(ProviderCallId::new())] {
        let result = h
            .coordinator
            .handle_envelope(EventEnvelope::provider(CallEvent::ConnectionEstablished, token))
            .await;
        assert_eq!(
            result,
            TransitionResult::Rejected { reason: RejectReason::StaleCallId },
            "token {:?}",
            token
        );
    }

    h.settle().await;
    assert_eq!(h.phase(), CallPhase::Ringing(Outgoing));
    assert!(h.notices.try_recv().is_none());
    assert_eq!(
        h.provider.requests(),
        vec![ProviderRequest::Start { call_id, peer_name: "Bob".into() }]
    );

    h.deliver(ProviderCallback::StartPerformed { call_id }).await;
    h.expect_phases(&[CallPhase::Connected]).await;
}

#[tokio::test]
async fn test_accepted_call_connects_only_on_provider_confirmation() {
    let mut h = Harness::in_phase(CallPhase::Connecting).await;
    let call_id = h
        .coordinator
        .current_state()
        .provider_call_id
        .expect("accepted call holds a token");

    let result = h.coordinator.handle(CallEvent::ConnectionEstablished).await;
    assert_eq!(result, TransitionResult::Rejected { reason: RejectReason::NotPermitted });

    let result = h
        .coordinator
        .handle_envelope(EventEnvelope::provider(CallEvent::ConnectionEstablished, None))
        .await;
    assert_eq!(result, TransitionResult::Rejected { reason: RejectReason::StaleCallId });
    assert_eq!(h.phase(), CallPhase::Connecting);

    h.deliver(ProviderCallback::AnswerPerformed { call_id }).await;
    h.expect_phases(&[CallPhase::Connected]).await;
}

#[tokio::test]
async fn test_events_outside_the_table_change_nothing_in_any_phase() {
    for phase in ALL_PHASES {
        let mut h = Harness::in_phase(phase).await;
        h.settle().await;
        let before = h.coordinator.current_state();

        for kind in EventKind::ALL {
            let event = Harness::sample_event(kind);
            if next_phase(phase, &event).is_some() {
                continue;
            }

            let from_ui = h.coordinator.handle(event.clone()).await;
            let from_provider = h
                .coordinator
                .handle_envelope(EventEnvelope::provider(event, before.provider_call_id))
                .await;
            for result in [from_ui, from_provider] {
                assert_eq!(
                    result,
                    TransitionResult::Rejected { reason: RejectReason::NotPermitted },
                    "{:?} in {}",
                    kind,
                    phase
                );
            }
        }

        h.settle().await;
        let after = h.coordinator.current_state();
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.sequence, before.sequence, "sequence moved in {}", phase);
        assert_eq!(after.provider_call_id, before.provider_call_id);
        assert_eq!(after.peer_name, before.peer_name);
        assert_eq!(after.direction, before.direction);
        assert_eq!(after.connected_at, before.connected_at);
        assert!(h.notices.try_recv().is_none(), "notice published in {}", phase);
    }
}

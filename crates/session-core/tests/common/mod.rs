//! Shared harness for coordinator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use callvita_session_core::prelude::*;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("callvita_session_core=debug")
        .with_test_writer()
        .try_init();
}

/// A coordinator wired to a simulated provider and recording devices
pub struct Harness {
    pub coordinator: CallSessionCoordinator,
    pub provider: Arc<SimulatedProvider>,
    pub devices: RecordingDevices,
    pub notices: Subscription,
}

impl Harness {
    pub fn start(config: CoordinatorConfig, behavior: SimulatedBehavior) -> Self {
        init_tracing();
        let provider = Arc::new(SimulatedProvider::with_behavior(
            config.provider.clone(),
            behavior,
        ));
        let (effect_devices, devices) = EffectDevices::recording();
        let coordinator = CallSessionCoordinator::start(config, provider.clone(), effect_devices)
            .expect("coordinator should start");
        let notices = coordinator.subscribe();
        Self {
            coordinator,
            provider,
            devices,
            notices,
        }
    }

    /// Default config with an auto-confirming provider
    pub fn auto() -> Self {
        Self::start(CoordinatorConfig::default(), SimulatedBehavior::default())
    }

    /// Provider never confirms; `Ended` lingers for a minute
    pub fn manual() -> Self {
        Self::start(
            CoordinatorConfig::default().with_auto_reset_delay(Duration::from_secs(60)),
            SimulatedBehavior::silent(),
        )
    }

    /// A manual harness driven into `phase`
    pub async fn in_phase(phase: CallPhase) -> Self {
        let mut h = Self::manual();
        match phase {
            CallPhase::Idle => {}
            CallPhase::Ringing(CallDirection::Incoming) => {
                h.ring_incoming("Family").await;
            }
            CallPhase::Ringing(CallDirection::Outgoing) => {
                h.coordinator
                    .handle(CallEvent::StartOutgoingCall { peer_name: "Bob".into() })
                    .await;
                h.expect_phases(&[phase]).await;
            }
            CallPhase::Connecting => {
                h.ring_incoming("Family").await;
                h.coordinator.handle(CallEvent::AcceptTapped).await;
                h.expect_phases(&[phase]).await;
            }
            CallPhase::Connected => {
                h.connect_outgoing("Bob").await;
            }
            CallPhase::Ended => {
                h.connect_outgoing("Bob").await;
                h.coordinator.handle(CallEvent::EndTapped).await;
                h.expect_phases(&[phase]).await;
            }
        }
        assert_eq!(h.phase(), phase);
        h
    }

    pub async fn next_notice(&mut self) -> TransitionNotice {
        tokio::time::timeout(Duration::from_secs(10), self.notices.recv())
            .await
            .expect("timed out waiting for a transition")
            .expect("notice stream closed")
    }

    pub async fn expect_phases(&mut self, expected: &[CallPhase]) {
        for phase in expected {
            let notice = self.next_notice().await;
            assert_eq!(notice.applied, *phase, "unexpected transition {:?}", notice);
        }
    }

    /// Let spawned provider tasks run and drain the mailbox
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
            self.coordinator.flush().await;
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.coordinator.current_state().phase
    }

    pub async fn deliver(&self, callback: ProviderCallback) {
        assert!(self.provider.deliver(callback));
        self.coordinator.flush().await;
    }

    /// Incoming call offered by the provider, now ringing
    pub async fn ring_incoming(&mut self, peer: &str) -> ProviderCallId {
        let call_id = self.provider.offer_incoming(peer);
        self.expect_phases(&[CallPhase::Ringing(CallDirection::Incoming)]).await;
        call_id
    }

    /// Outgoing call placed and confirmed, now connected
    pub async fn connect_outgoing(&mut self, peer: &str) -> ProviderCallId {
        let result = self
            .coordinator
            .handle(CallEvent::StartOutgoingCall {
                peer_name: peer.to_string(),
            })
            .await;
        assert!(result.is_applied());
        self.expect_phases(&[CallPhase::Ringing(CallDirection::Outgoing)]).await;
        let call_id = self
            .coordinator
            .current_state()
            .provider_call_id
            .expect("ringing call holds a token");

        self.deliver(ProviderCallback::StartPerformed { call_id }).await;
        self.expect_phases(&[CallPhase::Connected]).await;
        call_id
    }

    /// Any event of the given kind
    pub fn sample_event(kind: EventKind) -> CallEvent {
        match kind {
            EventKind::IncomingCall => CallEvent::IncomingCall { peer_name: "Spam".into() },
            EventKind::StartOutgoingCall => {
                CallEvent::StartOutgoingCall { peer_name: "Bob".into() }
            }
            EventKind::AcceptTapped => CallEvent::AcceptTapped,
            EventKind::DeclineTapped => CallEvent::DeclineTapped,
            EventKind::ConnectionEstablished => CallEvent::ConnectionEstablished,
            EventKind::ConnectionFailed => CallEvent::ConnectionFailed,
            EventKind::EndTapped => CallEvent::EndTapped,
            EventKind::ProviderReset => CallEvent::ProviderReset,
            EventKind::Reset => CallEvent::Reset,
        }
    }

    pub fn position(&self, call: DeviceCall) -> usize {
        self.devices
            .calls()
            .iter()
            .position(|c| *c == call)
            .unwrap_or_else(|| panic!("{:?} was never made", call))
    }
}

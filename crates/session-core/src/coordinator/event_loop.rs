//! The coordinator task
//!
//! Owns the session, the effect orchestrator and the timers. Commands are
//! taken from the mailbox one at a time and each is handled to completion,
//! effects included, before the next is looked at. Nothing else mutates
//! the session.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::subscribers::{SubscriberRegistry, TransitionNotice};
use crate::adapters::{ProviderAdapter, ProviderCallback};
use crate::config::CoordinatorConfig;
use crate::effects::{EffectOrchestrator, EffectReport};
use crate::state_table::next_phase;
use crate::types::{
    CallDirection, CallEvent, CallPhase, CallSession, EventEnvelope, EventSource, ProviderCallId,
    RejectReason, TransitionResult,
};

/// Timers that feed back into the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Fail a call that never got established
    Establish,
    /// Collapse `Ended` to `Idle`
    AutoReset,
}

/// Everything the coordinator task can be asked to do
#[derive(Debug)]
pub(crate) enum Command {
    Event {
        envelope: EventEnvelope,
        reply: Option<oneshot::Sender<TransitionResult>>,
    },
    Callback(ProviderCallback),
    /// `armed_at` is the session sequence when the timer was armed
    Timer { kind: TimerKind, armed_at: u64 },
    /// Answered once every earlier command has been handled
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Provider transactions, sent in the order the transitions were applied
#[derive(Debug)]
enum Outbound {
    Start { call_id: ProviderCallId, peer_name: String },
    AnswerAck { call_id: ProviderCallId },
    End { call_id: ProviderCallId },
}

pub(crate) struct CoordinatorCore {
    session: CallSession,
    config: CoordinatorConfig,
    outbound: mpsc::UnboundedSender<Outbound>,
    effects: EffectOrchestrator,
    subscribers: Arc<SubscriberRegistry>,
    snapshot: Arc<RwLock<CallSession>>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
    establish_timer: Option<JoinHandle<()>>,
}

impl CoordinatorCore {
    pub(crate) fn new(
        config: CoordinatorConfig,
        provider: Arc<dyn ProviderAdapter>,
        effects: EffectOrchestrator,
        subscribers: Arc<SubscriberRegistry>,
        snapshot: Arc<RwLock<CallSession>>,
        mailbox: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let (outbound, requests) = mpsc::unbounded_channel();
        tokio::spawn(run_outbound(provider, requests, mailbox.clone()));

        Self {
            session: CallSession::idle(),
            config,
            outbound,
            effects,
            subscribers,
            snapshot,
            mailbox,
            establish_timer: None,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Call session coordinator started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Event { envelope, reply } => {
                    let result = self.process(envelope);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Callback(callback) => self.on_callback(callback),
                Command::Timer { kind, armed_at } => {
                    self.on_timer(kind, armed_at);
                }
                Command::Flush(reply) => {
                    let _ = reply.send(());
                }
                Command::Shutdown(reply) => {
                    self.shutdown();
                    let _ = reply.send(());
                    break;
                }
            }
        }

        self.effects.quiesce();
        self.subscribers.close();
        info!("Call session coordinator stopped");
    }

    /// Validate and apply one event
    fn process(&mut self, envelope: EventEnvelope) -> TransitionResult {
        let previous = self.session.phase;

        if let Some(reason) = self.check_token(&envelope) {
            return TransitionResult::Rejected { reason };
        }

        let Some(next) = next_phase(previous, &envelope.event) else {
            debug!(
                "{} not permitted in {} (from {:?})",
                envelope.event.type_name(),
                previous,
                envelope.source
            );
            return TransitionResult::Rejected {
                reason: RejectReason::NotPermitted,
            };
        };

        let released_call = self.session.provider_call_id;
        self.cancel_establish_timer();
        self.update_session(previous, next, &envelope);
        info!(
            "📞 {} -> {} on {} ({:?})",
            previous,
            next,
            envelope.event.type_name(),
            envelope.source
        );

        let report = self.effects.apply(previous, next);
        self.publish(previous, &envelope);
        self.after_transition(previous, next, &envelope, released_call, &report);

        TransitionResult::Applied {
            previous,
            applied: next,
        }
    }

    /// Reject events that belong to another call
    ///
    /// `ConnectionEstablished` is never taken from the UI and must name the
    /// held call exactly; a missing token counts as a mismatch. Any other
    /// event is only checked when it carries a token.
    fn check_token(&self, envelope: &EventEnvelope) -> Option<RejectReason> {
        let held = self.session.provider_call_id;

        if envelope.event == CallEvent::ConnectionEstablished {
            if envelope.source == EventSource::Ui {
                debug!("ConnectionEstablished from the UI is never accepted");
                return Some(RejectReason::NotPermitted);
            }
            if held.is_some() && envelope.call_id != held {
                warn!(
                    "Ignoring ConnectionEstablished from {:?} with token {:?}, holding {:?}",
                    envelope.source,
                    envelope.call_id,
                    held
                );
                return Some(RejectReason::StaleCallId);
            }
            return None;
        }

        match (envelope.call_id, held) {
            (Some(got), Some(held)) if got != held => {
                warn!(
                    "Ignoring {} from {:?} for call {}, holding {}",
                    envelope.event.type_name(),
                    envelope.source,
                    got,
                    held
                );
                Some(RejectReason::StaleCallId)
            }
            _ => None,
        }
    }

    fn update_session(&mut self, previous: CallPhase, next: CallPhase, envelope: &EventEnvelope) {
        let session = &mut self.session;
        session.sequence += 1;
        session.phase = next;

        match next {
            CallPhase::Ringing(direction) => {
                session.peer_name = envelope.event.peer_name().map(str::to_string);
                session.direction = Some(direction);
                let call_id = envelope.call_id.unwrap_or_else(ProviderCallId::new);
                session.provider_call_id = Some(call_id);
                session.connected_at = None;
            }
            CallPhase::Connecting => {}
            CallPhase::Connected => {
                if previous != CallPhase::Connected {
                    session.connected_at = Some(Utc::now());
                }
            }
            CallPhase::Ended => {
                session.provider_call_id = None;
                session.connected_at = None;
            }
            CallPhase::Idle => {
                *session = CallSession {
                    sequence: session.sequence,
                    provider_audio_active: session.provider_audio_active,
                    ..CallSession::idle()
                };
            }
        }

        *self.snapshot.write() = self.session.clone();
    }

    fn publish(&self, previous: CallPhase, envelope: &EventEnvelope) {
        let notice = TransitionNotice {
            sequence: self.session.sequence,
            previous,
            applied: self.session.phase,
            event: envelope.event.clone(),
            source: envelope.source,
            session: self.session.clone(),
        };
        self.subscribers.publish(&notice);
    }

    /// Provider requests and timers implied by a transition
    fn after_transition(
        &mut self,
        previous: CallPhase,
        next: CallPhase,
        envelope: &EventEnvelope,
        released_call: Option<ProviderCallId>,
        report: &EffectReport,
    ) {
        let call_id = self.session.provider_call_id;
        let from_provider = envelope.source == EventSource::Provider;

        match next {
            CallPhase::Ringing(CallDirection::Outgoing) => {
                if let (Some(call_id), Some(peer), false) =
                    (call_id, self.session.peer_name.clone(), from_provider)
                {
                    self.request_start(call_id, peer);
                }
                self.arm_establish_timer();
            }
            CallPhase::Ringing(CallDirection::Incoming) => {}
            CallPhase::Connecting => {
                if report.voice_route_failed {
                    self.fail_call(call_id);
                } else if let (Some(call_id), false) = (call_id, from_provider) {
                    // Voice route is active, now the provider may be told
                    self.request_answer_ack(call_id);
                }
                self.arm_establish_timer();
            }
            CallPhase::Connected => {
                if report.voice_route_failed {
                    self.fail_call(call_id);
                }
            }
            CallPhase::Ended => {
                if previous.holds_call() && !from_provider {
                    if let Some(call_id) = released_call {
                        self.request_end(call_id);
                    }
                }
                self.schedule_timer(TimerKind::AutoReset, self.config.auto_reset_delay());
            }
            CallPhase::Idle => {}
        }
    }

    fn on_callback(&mut self, callback: ProviderCallback) {
        let phase = self.session.phase;
        let call_id = callback.call_id();

        let event = match &callback {
            ProviderCallback::AudioActivated | ProviderCallback::AudioDeactivated => {
                let active = callback == ProviderCallback::AudioActivated;
                debug!("Provider audio session active: {}", active);
                self.session.provider_audio_active = active;
                self.snapshot.write().provider_audio_active = active;
                return;
            }
            ProviderCallback::IncomingOffered { peer_name, .. } => CallEvent::IncomingCall {
                peer_name: peer_name.clone(),
            },
            ProviderCallback::AnswerPerformed { .. }
                if phase == CallPhase::Ringing(CallDirection::Incoming) =>
            {
                CallEvent::AcceptTapped
            }
            ProviderCallback::AnswerPerformed { .. } | ProviderCallback::StartPerformed { .. } => {
                CallEvent::ConnectionEstablished
            }
            ProviderCallback::EndPerformed { .. } => match phase {
                CallPhase::Ringing(_) => CallEvent::DeclineTapped,
                CallPhase::Connecting => CallEvent::ConnectionFailed,
                _ => CallEvent::EndTapped,
            },
            ProviderCallback::ProviderReset => CallEvent::ProviderReset,
        };

        let answered_elsewhere = event == CallEvent::AcceptTapped;
        let result = self.process(EventEnvelope::provider(event, call_id));

        // The host answered and confirmed media in one step
        if answered_elsewhere && result.is_applied() {
            self.enqueue(Command::Event {
                envelope: EventEnvelope::provider(CallEvent::ConnectionEstablished, call_id),
                reply: None,
            });
        }
    }

    fn on_timer(&mut self, kind: TimerKind, armed_at: u64) -> TransitionResult {
        if armed_at != self.session.sequence {
            debug!(
                "Discarding {:?} timer armed at #{}, now at #{}",
                kind, armed_at, self.session.sequence
            );
            return TransitionResult::Rejected {
                reason: RejectReason::StaleTimer,
            };
        }

        let event = match kind {
            TimerKind::Establish => {
                warn!("Call not established in time, failing it");
                CallEvent::ConnectionFailed
            }
            TimerKind::AutoReset => CallEvent::Reset,
        };
        self.process(EventEnvelope::internal(event, None))
    }

    fn shutdown(&mut self) {
        info!("Shutting down call session coordinator in {}", self.session.phase);
        if self.session.phase.holds_call() {
            self.process(EventEnvelope::internal(CallEvent::ProviderReset, None));
        }
        self.cancel_establish_timer();
    }

    fn arm_establish_timer(&mut self) {
        if let Some(timeout) = self.config.establish_timeout() {
            self.establish_timer = self.schedule_timer(TimerKind::Establish, timeout);
        }
    }

    fn cancel_establish_timer(&mut self) {
        if let Some(timer) = self.establish_timer.take() {
            timer.abort();
        }
    }

    /// Post a timer command after `delay`, or right away if zero
    fn schedule_timer(&self, kind: TimerKind, delay: Duration) -> Option<JoinHandle<()>> {
        let command = Command::Timer {
            kind,
            armed_at: self.session.sequence,
        };
        if delay.is_zero() {
            self.enqueue(command);
            return None;
        }

        let mailbox = self.mailbox.clone();
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(command);
            }
        }))
    }

    fn enqueue(&self, command: Command) {
        match self.mailbox.upgrade() {
            Some(mailbox) => {
                if mailbox.send(command).is_err() {
                    debug!("Mailbox closed, dropping follow-up command");
                }
            }
            None => debug!("No coordinator handles left, dropping follow-up command"),
        }
    }

    fn fail_call(&self, call_id: Option<ProviderCallId>) {
        self.enqueue(Command::Event {
            envelope: EventEnvelope::internal(CallEvent::ConnectionFailed, call_id),
            reply: None,
        });
    }

    fn request_start(&self, call_id: ProviderCallId, peer_name: String) {
        self.send_outbound(Outbound::Start { call_id, peer_name });
    }

    fn request_answer_ack(&self, call_id: ProviderCallId) {
        self.send_outbound(Outbound::AnswerAck { call_id });
    }

    fn request_end(&self, call_id: ProviderCallId) {
        self.send_outbound(Outbound::End { call_id });
    }

    fn send_outbound(&self, request: Outbound) {
        if let Err(e) = self.outbound.send(request) {
            error!("Provider request worker is gone, dropping {:?}", e.0);
        }
    }
}

/// Hands requests to the provider one at a time, in transition order
///
/// Ends once the coordinator core is dropped and the queue is drained, so
/// requests made while shutting down still go out.
async fn run_outbound(
    provider: Arc<dyn ProviderAdapter>,
    mut requests: mpsc::UnboundedReceiver<Outbound>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
) {
    while let Some(request) = requests.recv().await {
        let (call_id, result) = match request {
            Outbound::Start { call_id, peer_name } => {
                (call_id, provider.request_start(call_id, &peer_name).await)
            }
            Outbound::AnswerAck { call_id } => {
                (call_id, provider.request_answer_ack(call_id).await)
            }
            Outbound::End { call_id } => (call_id, provider.request_end(call_id).await),
        };
        if let Err(e) = result {
            error!("Provider failed a request for call {}: {}", call_id, e);
            report_failure(&mailbox, call_id);
        }
    }
    debug!("Provider request worker stopped");
}

fn report_failure(mailbox: &mpsc::WeakUnboundedSender<Command>, call_id: ProviderCallId) {
    if let Some(mailbox) = mailbox.upgrade() {
        let _ = mailbox.send(Command::Event {
            envelope: EventEnvelope::provider(CallEvent::ConnectionFailed, Some(call_id)),
            reply: None,
        });
    }
}

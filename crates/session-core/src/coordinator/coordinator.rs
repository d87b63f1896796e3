//! Public handle to the call session coordinator

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::event_loop::{Command, CoordinatorCore};
use super::subscribers::{
    spawn_observer, CallObserver, SubscriberRegistry, Subscription, SubscriptionHandle,
};
use crate::adapters::{ProviderAdapter, ProviderCallbackSink};
use crate::config::CoordinatorConfig;
use crate::effects::{EffectDevices, EffectOrchestrator, ElapsedProbe};
use crate::errors::Result;
use crate::types::{CallEvent, CallSession, EventEnvelope, RejectReason, TransitionResult};

/// The single authority over call state
///
/// Cloning gives another handle to the same coordinator. The coordinator
/// task stops on [`shutdown`](Self::shutdown), or once every handle is
/// dropped.
#[derive(Clone)]
pub struct CallSessionCoordinator {
    mailbox: mpsc::UnboundedSender<Command>,
    snapshot: Arc<RwLock<CallSession>>,
    subscribers: Arc<SubscriberRegistry>,
    elapsed: ElapsedProbe,
    elapsed_rx: watch::Receiver<u64>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CallSessionCoordinator {
    /// Validate `config`, bind the provider and spawn the coordinator task
    pub fn start(
        config: CoordinatorConfig,
        provider: Arc<dyn ProviderAdapter>,
        devices: EffectDevices,
    ) -> Result<Self> {
        config.validate()?;

        let (mailbox, commands) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(CallSession::idle()));
        let subscribers = Arc::new(SubscriberRegistry::default());

        let effects = EffectOrchestrator::new(
            devices,
            config.timer_tick(),
            config.ring_pulse_interval(),
        );
        let elapsed = effects.timer().probe();
        let elapsed_rx = effects.timer().subscribe();

        provider.bind(ProviderCallbackSink::new(mailbox.downgrade()));

        let core = CoordinatorCore::new(
            config,
            provider,
            effects,
            subscribers.clone(),
            snapshot.clone(),
            mailbox.downgrade(),
        );
        let task = tokio::spawn(core.run(commands));

        Ok(Self {
            mailbox,
            snapshot,
            subscribers,
            elapsed,
            elapsed_rx,
            task: Arc::new(Mutex::new(Some(task))),
        })
    }

    /// Submit a UI event and wait for the outcome
    pub async fn handle(&self, event: CallEvent) -> TransitionResult {
        self.handle_envelope(EventEnvelope::ui(event)).await
    }

    /// Submit an event with explicit source and call token
    pub async fn handle_envelope(&self, envelope: EventEnvelope) -> TransitionResult {
        let (reply, result) = oneshot::channel();
        let command = Command::Event {
            envelope,
            reply: Some(reply),
        };
        if self.mailbox.send(command).is_err() {
            return TransitionResult::Rejected {
                reason: RejectReason::CoordinatorStopped,
            };
        }
        result.await.unwrap_or(TransitionResult::Rejected {
            reason: RejectReason::CoordinatorStopped,
        })
    }

    /// Enqueue a UI event without waiting. Returns `false` if stopped.
    pub fn post(&self, event: CallEvent) -> bool {
        self.mailbox
            .send(Command::Event {
                envelope: EventEnvelope::ui(event),
                reply: None,
            })
            .is_ok()
    }

    /// Snapshot of the session as of the last applied transition
    pub fn current_state(&self) -> CallSession {
        let mut session = self.snapshot.read().clone();
        session.elapsed_seconds = self.elapsed.elapsed_seconds();
        session
    }

    /// Elapsed seconds of the connected call, one update per tick
    pub fn elapsed_watch(&self) -> watch::Receiver<u64> {
        self.elapsed_rx.clone()
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribers.subscribe()
    }

    /// Register an observer callback; notices are delivered in order
    pub fn subscribe_observer(&self, observer: Arc<dyn CallObserver>) -> SubscriptionHandle {
        let subscription = self.subscribers.subscribe();
        let handle = subscription.handle();
        spawn_observer(subscription, observer);
        handle
    }

    /// Returns `false` if the handle was not subscribed
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.subscribers.unsubscribe(handle);
        debug!("Unsubscribed {}: {}", handle.id(), removed);
        removed
    }

    /// Wait until every command enqueued before this call has been handled
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.mailbox.send(Command::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }

    /// End any call in progress, stop all effects and the task. Idempotent.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.mailbox.send(Command::Shutdown(reply)).is_ok() {
            let _ = done.await;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            info!("Call session coordinator shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.mailbox.is_closed()
    }
}

impl std::fmt::Debug for CallSessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSessionCoordinator")
            .field("session", &*self.snapshot.read())
            .field("running", &self.is_running())
            .finish()
    }
}

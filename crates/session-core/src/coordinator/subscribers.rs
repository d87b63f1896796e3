//! Transition notifications
//!
//! Every subscriber gets its own unbounded channel. Notices are pushed from
//! the coordinator task only, so each subscriber sees applied transitions
//! in application order with no gaps.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{CallEvent, CallPhase, CallSession, EventSource};

/// Published once per applied transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub sequence: u64,
    pub previous: CallPhase,
    pub applied: CallPhase,
    pub event: CallEvent,
    pub source: EventSource,
    /// Session as of this transition
    pub session: CallSession,
}

/// Identifies a subscription for `unsubscribe`
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    rx: mpsc::UnboundedReceiver<TransitionNotice>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Next notice; `None` once unsubscribed or the coordinator stopped
    pub async fn recv(&mut self) -> Option<TransitionNotice> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransitionNotice> {
        self.rx.try_recv().ok()
    }
}

/// Callback-style observer
///
/// Called from a forwarding task, never from the coordinator task, so a
/// slow observer cannot stall transitions.
#[async_trait]
pub trait CallObserver: Send + Sync {
    async fn on_transition(&self, notice: TransitionNotice);
}

#[derive(Debug, Default)]
pub(crate) struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionHandle, mpsc::UnboundedSender<TransitionNotice>)>>,
}

impl SubscriberRegistry {
    pub(crate) fn subscribe(&self) -> Subscription {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push((handle, tx));
        debug!("Added subscriber {}", handle.id());
        Subscription { handle, rx }
    }

    pub(crate) fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(h, _)| *h != handle);
        subscribers.len() != before
    }

    /// Deliver to every live subscriber, dropping closed ones
    pub(crate) fn publish(&self, notice: &TransitionNotice) {
        self.subscribers
            .write()
            .retain(|(_, tx)| tx.send(notice.clone()).is_ok());
    }

    /// Drop every sender so receivers see the end of the stream
    pub(crate) fn close(&self) {
        self.subscribers.write().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Drive an observer from a subscription until it ends
pub(crate) fn spawn_observer(mut subscription: Subscription, observer: Arc<dyn CallObserver>) {
    tokio::spawn(async move {
        while let Some(notice) = subscription.recv().await {
            observer.on_transition(notice).await;
        }
    });
}

//! Call session coordinator
//!
//! A single task owns the call session. UI taps, provider callbacks and
//! timer firings all become commands on one mailbox and are applied one
//! at a time against the state table, with effects completing before the
//! next command is read.

mod coordinator;
mod event_loop;
mod subscribers;

pub use coordinator::CallSessionCoordinator;
pub use subscribers::{CallObserver, Subscription, SubscriptionHandle, TransitionNotice};

pub(crate) use event_loop::Command;

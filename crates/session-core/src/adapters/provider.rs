//! Host telephony provider seam
//!
//! The provider is the operating system's call subsystem. Outbound, the
//! coordinator asks it to start, answer or end a call. Inbound, the
//! provider reports what actually happened through a
//! [`ProviderCallbackSink`], which only enqueues onto the coordinator's
//! mailbox and never mutates session state directly.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use callvita_session_core::adapters::{ProviderAdapter, ProviderCallbackSink};
//! use callvita_session_core::types::ProviderCallId;
//! use callvita_session_core::errors::Result;
//!
//! struct LoggingProvider;
//!
//! #[async_trait]
//! impl ProviderAdapter for LoggingProvider {
//!     fn bind(&self, _sink: ProviderCallbackSink) {}
//!
//!     async fn request_start(&self, call_id: ProviderCallId, peer_name: &str) -> Result<()> {
//!         println!("start {} to {}", call_id, peer_name);
//!         Ok(())
//!     }
//!
//!     async fn request_answer_ack(&self, call_id: ProviderCallId) -> Result<()> {
//!         println!("answer {}", call_id);
//!         Ok(())
//!     }
//!
//!     async fn request_end(&self, call_id: ProviderCallId) -> Result<()> {
//!         println!("end {}", call_id);
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::coordinator::Command;
use crate::errors::Result;
use crate::types::ProviderCallId;

/// Callbacks from the host provider
///
/// Delivery is at-least-once and may race with UI events; the coordinator
/// rejects duplicates and callbacks for calls it no longer holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderCallback {
    /// The system is presenting a new incoming call
    IncomingOffered {
        call_id: ProviderCallId,
        peer_name: String,
    },
    /// The call was answered, from our UI or the system's
    AnswerPerformed { call_id: ProviderCallId },
    /// The outgoing call was placed and confirmed
    StartPerformed { call_id: ProviderCallId },
    /// The call was ended, from our UI, the system's or the remote side
    EndPerformed { call_id: ProviderCallId },
    /// The provider dropped every call
    ProviderReset,
    /// The system activated the audio session for the call
    AudioActivated,
    AudioDeactivated,
}

impl ProviderCallback {
    pub fn call_id(&self) -> Option<ProviderCallId> {
        match self {
            ProviderCallback::IncomingOffered { call_id, .. }
            | ProviderCallback::AnswerPerformed { call_id }
            | ProviderCallback::StartPerformed { call_id }
            | ProviderCallback::EndPerformed { call_id } => Some(*call_id),
            ProviderCallback::ProviderReset
            | ProviderCallback::AudioActivated
            | ProviderCallback::AudioDeactivated => None,
        }
    }
}

/// Handle through which a provider reports callbacks
///
/// Holds only a weak reference to the coordinator mailbox, so a provider
/// that keeps its sink does not keep a stopped coordinator alive.
#[derive(Debug, Clone)]
pub struct ProviderCallbackSink {
    mailbox: mpsc::WeakUnboundedSender<Command>,
}

impl ProviderCallbackSink {
    pub(crate) fn new(mailbox: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self { mailbox }
    }

    /// Enqueue a callback. Returns `false` if the coordinator has stopped.
    pub fn deliver(&self, callback: ProviderCallback) -> bool {
        match self.mailbox.upgrade() {
            Some(mailbox) => mailbox.send(Command::Callback(callback)).is_ok(),
            None => false,
        }
    }
}

/// Outbound requests to the host provider
///
/// The coordinator never awaits these on its serialized path: each request
/// runs on its own task and a failure is fed back as `ConnectionFailed`
/// for the same call.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Receive the callback sink. Called once when the coordinator starts.
    fn bind(&self, sink: ProviderCallbackSink);

    /// Ask the provider to place an outgoing call
    ///
    /// # Arguments
    ///
    /// * `call_id` - Token the coordinator allocated for this call
    /// * `peer_name` - Display name of the callee
    async fn request_start(&self, call_id: ProviderCallId, peer_name: &str) -> Result<()>;

    /// Tell the provider the user answered in our UI
    async fn request_answer_ack(&self, call_id: ProviderCallId) -> Result<()>;

    /// Ask the provider to end a call that our side ended
    async fn request_end(&self, call_id: ProviderCallId) -> Result<()>;
}

//! In-process provider for tests and the CLI
//!
//! Records every request, can confirm them automatically after a delay,
//! and exposes the inbound callbacks so a test can play the part of the
//! host system: offering calls, answering from the lock screen, or
//! resetting mid-call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::provider::{ProviderAdapter, ProviderCallback, ProviderCallbackSink};
use crate::config::ProviderConfig;
use crate::errors::{Result, SessionError};
use crate::types::ProviderCallId;

/// A request received by the simulated provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRequest {
    Start { call_id: ProviderCallId, peer_name: String },
    AnswerAck { call_id: ProviderCallId },
    End { call_id: ProviderCallId },
}

/// How the simulated provider responds to requests
#[derive(Debug, Clone)]
pub struct SimulatedBehavior {
    /// Report `StartPerformed` after a successful start
    pub confirm_start: bool,
    /// Report `AnswerPerformed` after a successful answer ack
    pub confirm_answer: bool,
    /// Report `EndPerformed` after a successful end
    pub confirm_end: bool,
    pub confirm_delay: Duration,
    pub fail_start: bool,
    pub fail_answer: bool,
    pub fail_end: bool,
    /// Deliver every confirmation twice
    pub duplicate_callbacks: bool,
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self {
            confirm_start: true,
            confirm_answer: true,
            confirm_end: true,
            confirm_delay: Duration::ZERO,
            fail_start: false,
            fail_answer: false,
            fail_end: false,
            duplicate_callbacks: false,
        }
    }
}

impl SimulatedBehavior {
    /// Record requests, never confirm them
    pub fn silent() -> Self {
        Self {
            confirm_start: false,
            confirm_answer: false,
            confirm_end: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    sink: Option<ProviderCallbackSink>,
    requests: Vec<ProviderRequest>,
}

/// Provider adapter backed by memory
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    config: ProviderConfig,
    behavior: Arc<Mutex<SimulatedBehavior>>,
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_behavior(config, SimulatedBehavior::default())
    }

    pub fn with_behavior(config: ProviderConfig, behavior: SimulatedBehavior) -> Self {
        info!(
            "Simulated provider '{}' (video: {}, max calls: {})",
            config.localized_name, config.supports_video, config.max_calls_per_group
        );
        Self {
            config,
            behavior: Arc::new(Mutex::new(behavior)),
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Change behavior for subsequent requests
    pub fn update_behavior(&self, update: impl FnOnce(&mut SimulatedBehavior)) {
        update(&mut *self.behavior.lock());
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.state.lock().requests.clone()
    }

    /// Deliver a callback as the host would. Returns `false` if unbound or
    /// the coordinator has stopped.
    pub fn deliver(&self, callback: ProviderCallback) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                debug!("Simulated provider delivering {:?}", callback);
                sink.deliver(callback)
            }
            None => {
                warn!("Simulated provider is not bound, dropping {:?}", callback);
                false
            }
        }
    }

    /// Present a new incoming call and return its token
    pub fn offer_incoming(&self, peer_name: impl Into<String>) -> ProviderCallId {
        let call_id = ProviderCallId::new();
        self.deliver(ProviderCallback::IncomingOffered {
            call_id,
            peer_name: peer_name.into(),
        });
        call_id
    }

    /// Answer from the system UI
    pub fn answer(&self, call_id: ProviderCallId) -> bool {
        self.deliver(ProviderCallback::AnswerPerformed { call_id })
    }

    /// End from the system UI or the remote side
    pub fn end(&self, call_id: ProviderCallId) -> bool {
        self.deliver(ProviderCallback::EndPerformed { call_id })
    }

    pub fn reset(&self) -> bool {
        self.deliver(ProviderCallback::ProviderReset)
    }

    pub fn activate_audio(&self) -> bool {
        self.deliver(ProviderCallback::AudioActivated)
    }

    pub fn deactivate_audio(&self) -> bool {
        self.deliver(ProviderCallback::AudioDeactivated)
    }

    fn record(&self, request: ProviderRequest) {
        self.state.lock().requests.push(request);
    }

    async fn confirm(&self, callback: ProviderCallback) {
        let (delay, duplicate) = {
            let behavior = self.behavior.lock();
            (behavior.confirm_delay, behavior.duplicate_callbacks)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.deliver(callback.clone());
        if duplicate {
            self.deliver(callback);
        }
    }
}

#[async_trait]
impl ProviderAdapter for SimulatedProvider {
    fn bind(&self, sink: ProviderCallbackSink) {
        self.state.lock().sink = Some(sink);
    }

    async fn request_start(&self, call_id: ProviderCallId, peer_name: &str) -> Result<()> {
        self.record(ProviderRequest::Start {
            call_id,
            peer_name: peer_name.to_string(),
        });
        let (fail, confirm) = {
            let behavior = self.behavior.lock();
            (behavior.fail_start, behavior.confirm_start)
        };
        if fail {
            return Err(SessionError::provider_rejected("start", "simulated failure"));
        }
        if confirm {
            self.confirm(ProviderCallback::StartPerformed { call_id }).await;
        }
        Ok(())
    }

    async fn request_answer_ack(&self, call_id: ProviderCallId) -> Result<()> {
        self.record(ProviderRequest::AnswerAck { call_id });
        let (fail, confirm) = {
            let behavior = self.behavior.lock();
            (behavior.fail_answer, behavior.confirm_answer)
        };
        if fail {
            return Err(SessionError::provider_rejected("answer", "simulated failure"));
        }
        if confirm {
            self.confirm(ProviderCallback::AnswerPerformed { call_id }).await;
        }
        Ok(())
    }

    async fn request_end(&self, call_id: ProviderCallId) -> Result<()> {
        self.record(ProviderRequest::End { call_id });
        let (fail, confirm) = {
            let behavior = self.behavior.lock();
            (behavior.fail_end, behavior.confirm_end)
        };
        if fail {
            return Err(SessionError::provider_rejected("end", "simulated failure"));
        }
        if confirm {
            self.confirm(ProviderCallback::EndPerformed { call_id }).await;
        }
        Ok(())
    }
}

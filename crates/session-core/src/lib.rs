//! # CallVita Session Core
//!
//! Call session coordination for a single-call voice app: one
//! authoritative call phase, driven by UI taps, host telephony provider
//! callbacks and local timers, with the ring alert, haptics, audio routing
//! and duration timer kept in step with it.
//!
//! ## Architecture
//!
//! ```text
//! UI taps ──────┐
//! Provider ─────┼──> mailbox ──> CallSessionCoordinator task
//! Timers ───────┘                  │  state table (whitelist)
//!                                  │  EffectOrchestrator (devices, timer)
//!                                  │  ProviderAdapter requests (spawned)
//!                                  └─> TransitionNotice to subscribers
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use callvita_session_core::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let config = CoordinatorConfig::default();
//! let provider = Arc::new(SimulatedProvider::new(config.provider.clone()));
//! let (devices, _recorder) = EffectDevices::recording();
//!
//! let coordinator = CallSessionCoordinator::start(config, provider, devices)?;
//! let result = coordinator
//!     .handle(CallEvent::StartOutgoingCall { peer_name: "Bob".into() })
//!     .await;
//! assert!(result.is_applied());
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod effects;
pub mod errors;
pub mod state_table;
pub mod types;

pub use adapters::{ProviderAdapter, ProviderCallback, ProviderCallbackSink, SimulatedProvider};
pub use config::{CoordinatorConfig, ProviderConfig};
pub use coordinator::{
    CallObserver, CallSessionCoordinator, Subscription, SubscriptionHandle, TransitionNotice,
};
pub use effects::{format_elapsed, AudioRoute, EffectDevices, HapticPulse, RecordingDevices};
pub use errors::{Result, SessionError};
pub use types::{
    CallDirection, CallEvent, CallPhase, CallSession, EventEnvelope, EventSource, ProviderCallId,
    RejectReason, TransitionResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::adapters::{
        ProviderAdapter, ProviderCallback, ProviderCallbackSink, ProviderRequest,
        SimulatedBehavior, SimulatedProvider,
    };
    pub use crate::config::{CoordinatorConfig, ProviderConfig};
    pub use crate::coordinator::{
        CallObserver, CallSessionCoordinator, Subscription, SubscriptionHandle, TransitionNotice,
    };
    pub use crate::effects::{
        format_elapsed, AudioRoute, AudioRouter, DeviceCall, EffectDevices, HapticPulse, Haptics,
        RecordingDevices, RingAlert,
    };
    pub use crate::errors::{Result, SessionError};
    pub use crate::types::*;
}

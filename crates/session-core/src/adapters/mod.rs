//! Adapters between the coordinator and the host telephony provider

pub mod provider;
pub mod simulated;

pub use provider::{ProviderAdapter, ProviderCallback, ProviderCallbackSink};
pub use simulated::{ProviderRequest, SimulatedBehavior, SimulatedProvider};

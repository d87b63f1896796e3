//! Device seams driven by the effect orchestrator
//!
//! Audio routing, the ring alert (tone) and haptics are exclusive,
//! single-owner resources. Only the orchestrator, running on the
//! coordinator's serialized path, calls into them. Implementations must
//! treat redundant calls (stopping something already stopped, selecting
//! the current route) as no-ops.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{Result, SessionError};

/// Audio session profile requested from the host
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum AudioRoute {
    /// Playback only, mixes with other audio; used while ringing
    RingerPlayback,
    /// Play-and-record in voice-chat mode, speaker and Bluetooth allowed
    VoiceCall,
    /// Session deactivated, other audio clients notified
    Released,
}

/// One-shot haptic feedback
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum HapticPulse {
    /// Medium impact when the call connects
    Answered,
    /// Soft impact when the call ends
    Ended,
}

/// Host audio session routing
pub trait AudioRouter: Send + Sync {
    fn apply_route(&self, route: AudioRoute) -> Result<()>;
}

/// Looping ringtone
pub trait RingAlert: Send + Sync {
    fn start_ringing(&self) -> Result<()>;
    fn stop_ringing(&self);
}

/// Haptic engine
pub trait Haptics: Send + Sync {
    /// Repeat a light pulse every `interval` until stopped
    fn start_ring_pattern(&self, interval: Duration);
    fn stop_ring_pattern(&self);
    fn pulse(&self, pulse: HapticPulse);
}

/// The device set handed to the orchestrator
#[derive(Clone)]
pub struct EffectDevices {
    pub audio: Arc<dyn AudioRouter>,
    pub ringer: Arc<dyn RingAlert>,
    pub haptics: Arc<dyn Haptics>,
}

impl EffectDevices {
    pub fn new(
        audio: Arc<dyn AudioRouter>,
        ringer: Arc<dyn RingAlert>,
        haptics: Arc<dyn Haptics>,
    ) -> Self {
        Self { audio, ringer, haptics }
    }

    /// Back every seam with one shared recorder
    pub fn recording() -> (Self, RecordingDevices) {
        let recorder = RecordingDevices::new();
        let shared = Arc::new(recorder.clone());
        (Self::new(shared.clone(), shared.clone(), shared), recorder)
    }
}

impl std::fmt::Debug for EffectDevices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectDevices").finish_non_exhaustive()
    }
}

/// A device call as observed by `RecordingDevices`
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum DeviceCall {
    Route(AudioRoute),
    StartRinging,
    StopRinging,
    StartRingPattern,
    StopRingPattern,
    Pulse(HapticPulse),
}

#[derive(Debug, Default)]
struct RecorderState {
    calls: Vec<DeviceCall>,
    route: Option<AudioRoute>,
    ringing: bool,
    ring_pattern: bool,
    failing_routes: Vec<AudioRoute>,
    ringtone_missing: bool,
}

/// In-memory device set that logs and records every call in order.
///
/// Used by tests to assert effect ordering, and by the CLI as a console
/// stand-in for real hardware.
#[derive(Debug, Clone, Default)]
pub struct RecordingDevices {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call so far, in invocation order
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    pub fn current_route(&self) -> Option<AudioRoute> {
        self.state.lock().route
    }

    /// True while the ringtone or the ring haptic pattern is running
    pub fn is_ring_alert_active(&self) -> bool {
        let state = self.state.lock();
        state.ringing || state.ring_pattern
    }

    /// Make `apply_route(route)` fail from now on
    pub fn fail_route(&self, route: AudioRoute) {
        self.state.lock().failing_routes.push(route);
    }

    /// Make `start_ringing` fail as if the ringtone asset were missing
    pub fn set_ringtone_missing(&self, missing: bool) {
        self.state.lock().ringtone_missing = missing;
    }

    /// How many times `call` was made
    pub fn times(&self, call: DeviceCall) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == call).count()
    }
}

impl AudioRouter for RecordingDevices {
    fn apply_route(&self, route: AudioRoute) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(DeviceCall::Route(route));
        if state.failing_routes.contains(&route) {
            return Err(SessionError::device("audio", format!("cannot activate {:?}", route)));
        }
        if state.route != Some(route) {
            info!("🎧 Audio route -> {:?}", route);
            state.route = Some(route);
        }
        Ok(())
    }
}

impl RingAlert for RecordingDevices {
    fn start_ringing(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(DeviceCall::StartRinging);
        if state.ringtone_missing {
            return Err(SessionError::device("ringer", "ringtone asset not found"));
        }
        if !state.ringing {
            info!("🔔 Ringtone started");
            state.ringing = true;
        }
        Ok(())
    }

    fn stop_ringing(&self) {
        let mut state = self.state.lock();
        state.calls.push(DeviceCall::StopRinging);
        if state.ringing {
            info!("🔕 Ringtone stopped");
            state.ringing = false;
        }
    }
}

impl Haptics for RecordingDevices {
    fn start_ring_pattern(&self, interval: Duration) {
        let mut state = self.state.lock();
        state.calls.push(DeviceCall::StartRingPattern);
        if !state.ring_pattern {
            debug!("Ring haptic pattern every {:?}", interval);
            state.ring_pattern = true;
        }
    }

    fn stop_ring_pattern(&self) {
        let mut state = self.state.lock();
        state.calls.push(DeviceCall::StopRingPattern);
        state.ring_pattern = false;
    }

    fn pulse(&self, pulse: HapticPulse) {
        self.state.lock().calls.push(DeviceCall::Pulse(pulse));
        debug!("Haptic pulse {:?}", pulse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundant_stop_is_noop() {
        let devices = RecordingDevices::new();
        devices.stop_ringing();
        devices.stop_ring_pattern();
        assert!(!devices.is_ring_alert_active());

        devices.start_ringing().unwrap();
        devices.start_ring_pattern(Duration::from_millis(1600));
        assert!(devices.is_ring_alert_active());

        devices.stop_ringing();
        devices.stop_ring_pattern();
        devices.stop_ringing();
        assert!(!devices.is_ring_alert_active());
        assert_eq!(devices.times(DeviceCall::StopRinging), 3);
    }

    #[test]
    fn test_failing_route_keeps_previous() {
        let devices = RecordingDevices::new();
        devices.apply_route(AudioRoute::RingerPlayback).unwrap();
        devices.fail_route(AudioRoute::VoiceCall);

        assert!(devices.apply_route(AudioRoute::VoiceCall).is_err());
        assert_eq!(devices.current_route(), Some(AudioRoute::RingerPlayback));
    }
}

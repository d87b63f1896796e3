//! Side effects of phase transitions
//!
//! Effects are planned as a pure function of `(previous, next)` and then
//! executed against the device seams in three steps:
//!
//! 1. stop the effects owned by the phase being left
//! 2. start the effects owned by the phase being entered
//! 3. start or stop the duration timer
//!
//! So the ring alert is always stopped before the voice route is selected,
//! and before the timer starts.

pub mod devices;
pub mod timer;

use std::time::Duration;
use tracing::{debug, warn};

use crate::types::CallPhase;

pub use devices::{
    AudioRoute, AudioRouter, DeviceCall, EffectDevices, HapticPulse, Haptics, RecordingDevices,
    RingAlert,
};
pub use timer::{format_elapsed, DurationTimer, ElapsedProbe};

/// A single unit of work against a device
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Effect {
    /// Ringtone plus the repeating ring haptic
    StartRingAlert,
    StopRingAlert,
    RouteAudio(AudioRoute),
    Pulse(HapticPulse),
    StartDurationTimer,
    StopDurationTimer,
}

/// Effects for one transition, in execution order
pub fn plan_effects(previous: CallPhase, next: CallPhase) -> Vec<Effect> {
    let mut plan = Vec::new();

    // A forced end with no call in progress has nothing to tear down
    if next == CallPhase::Ended && matches!(previous, CallPhase::Idle | CallPhase::Ended) {
        return plan;
    }

    let was_ringing = matches!(previous, CallPhase::Ringing(_));
    let is_ringing = matches!(next, CallPhase::Ringing(_));

    // Step 1: exit
    if was_ringing && !is_ringing {
        plan.push(Effect::StopRingAlert);
    }

    // Step 2: entry
    match next {
        CallPhase::Idle => {}
        CallPhase::Ringing(_) => {
            plan.push(Effect::RouteAudio(AudioRoute::RingerPlayback));
            plan.push(Effect::StartRingAlert);
        }
        CallPhase::Connecting => {
            plan.push(Effect::RouteAudio(AudioRoute::VoiceCall));
        }
        CallPhase::Connected => {
            plan.push(Effect::RouteAudio(AudioRoute::VoiceCall));
            plan.push(Effect::Pulse(HapticPulse::Answered));
        }
        CallPhase::Ended => {
            if !plan.contains(&Effect::StopRingAlert) {
                plan.push(Effect::StopRingAlert);
            }
            plan.push(Effect::RouteAudio(AudioRoute::Released));
            plan.push(Effect::Pulse(HapticPulse::Ended));
        }
    }

    // Step 3: timer
    if next == CallPhase::Connected && previous != CallPhase::Connected {
        plan.push(Effect::StartDurationTimer);
    }
    if previous == CallPhase::Connected && next != CallPhase::Connected {
        plan.push(Effect::StopDurationTimer);
    }

    plan
}

/// What happened when a plan was executed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectReport {
    pub executed: Vec<Effect>,
    /// The voice route could not be selected; the call cannot proceed
    pub voice_route_failed: bool,
}

/// Executes effect plans against the devices. Owned by the coordinator
/// task, so every call here is serialized.
#[derive(Debug)]
pub struct EffectOrchestrator {
    devices: EffectDevices,
    timer: DurationTimer,
    ring_pulse_interval: Duration,
}

impl EffectOrchestrator {
    pub fn new(
        devices: EffectDevices,
        timer_tick: Duration,
        ring_pulse_interval: Duration,
    ) -> Self {
        Self {
            devices,
            timer: DurationTimer::new(timer_tick),
            ring_pulse_interval,
        }
    }

    /// Plan and execute the effects for `previous -> next`
    pub fn apply(&mut self, previous: CallPhase, next: CallPhase) -> EffectReport {
        let plan = plan_effects(previous, next);
        debug!("Effects for {} -> {}: {:?}", previous, next, plan);

        let mut report = EffectReport::default();
        for effect in plan {
            self.execute(effect, &mut report);
            report.executed.push(effect);
        }
        report
    }

    fn execute(&mut self, effect: Effect, report: &mut EffectReport) {
        match effect {
            Effect::StartRingAlert => {
                if let Err(e) = self.devices.ringer.start_ringing() {
                    warn!("Ring alert unavailable, continuing with haptics only: {}", e);
                }
                self.devices.haptics.start_ring_pattern(self.ring_pulse_interval);
            }
            Effect::StopRingAlert => {
                self.devices.ringer.stop_ringing();
                self.devices.haptics.stop_ring_pattern();
            }
            Effect::RouteAudio(route) => {
                if let Err(e) = self.devices.audio.apply_route(route) {
                    if route == AudioRoute::VoiceCall {
                        warn!("Failed to select voice route: {}", e);
                        report.voice_route_failed = true;
                    } else {
                        warn!("Failed to apply audio route {:?}: {}", route, e);
                    }
                }
            }
            Effect::Pulse(pulse) => self.devices.haptics.pulse(pulse),
            Effect::StartDurationTimer => self.timer.start(),
            Effect::StopDurationTimer => self.timer.stop(),
        }
    }

    /// Stop everything, regardless of phase
    pub fn quiesce(&mut self) {
        self.timer.stop();
        self.devices.ringer.stop_ringing();
        self.devices.haptics.stop_ring_pattern();
    }

    pub fn timer(&self) -> &DurationTimer {
        &self.timer
    }
}

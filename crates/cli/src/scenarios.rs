//! Scripted call flows

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use callvita_session_core::prelude::*;

/// Logs every transition as it is published
pub struct ConsoleObserver;

#[async_trait]
impl CallObserver for ConsoleObserver {
    async fn on_transition(&self, notice: TransitionNotice) {
        let peer = notice.session.peer_name.as_deref().unwrap_or("-");
        info!(
            "🔄 #{} {} → {} via {} ({:?}) peer: {}",
            notice.sequence,
            notice.previous,
            notice.applied,
            notice.event.type_name(),
            notice.source,
            peer
        );
    }
}

/// How an incoming call gets answered
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    InApp,
    FromSystem,
    Decline,
}

/// Wait until `target` is applied, failing if the call ends first
async fn wait_for(
    subscription: &mut Subscription,
    target: CallPhase,
    limit: Duration,
) -> Result<CallSession> {
    let wait = async {
        while let Some(notice) = subscription.recv().await {
            if notice.applied == target {
                return Ok(notice.session);
            }
            if notice.applied == CallPhase::Ended && target.holds_call() {
                bail!("call ended while waiting for {}", target);
            }
        }
        bail!("coordinator stopped while waiting for {}", target)
    };
    match tokio::time::timeout(limit, wait).await {
        Ok(result) => result,
        Err(_) => bail!("timed out after {:?} waiting for {}", limit, target),
    }
}

/// Stay connected for `talk`, logging the call timer
async fn talk(coordinator: &CallSessionCoordinator, talk: Duration) {
    let mut elapsed = coordinator.elapsed_watch();
    let deadline = tokio::time::sleep(talk);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = elapsed.changed() => {
                if changed.is_err() {
                    break;
                }
                let seconds = *elapsed.borrow_and_update();
                if seconds > 0 {
                    info!("⏱️  {}", format_elapsed(seconds));
                }
            }
        }
    }
}

async fn hang_up(
    coordinator: &CallSessionCoordinator,
    subscription: &mut Subscription,
) -> Result<()> {
    let result = coordinator.handle(CallEvent::EndTapped).await;
    if result.is_rejected() {
        bail!("hang up rejected: {:?}", result);
    }
    wait_for(subscription, CallPhase::Idle, Duration::from_secs(5)).await?;
    Ok(())
}

pub async fn outgoing(
    coordinator: &CallSessionCoordinator,
    peer: &str,
    talk_for: Duration,
) -> Result<()> {
    let mut subscription = coordinator.subscribe();

    let result = coordinator
        .handle(CallEvent::StartOutgoingCall {
            peer_name: peer.to_string(),
        })
        .await;
    if result.is_rejected() {
        bail!("could not start call: {:?}", result);
    }

    let session = wait_for(&mut subscription, CallPhase::Connected, Duration::from_secs(60)).await?;
    info!("✅ Connected to {}", session.peer_name.as_deref().unwrap_or(peer));

    talk(coordinator, talk_for).await;
    hang_up(coordinator, &mut subscription).await
}

pub async fn incoming(
    coordinator: &CallSessionCoordinator,
    provider: &SimulatedProvider,
    peer: &str,
    ring: Duration,
    talk_for: Duration,
    answer: Answer,
) -> Result<()> {
    let mut subscription = coordinator.subscribe();

    let call_id = provider.offer_incoming(peer);
    wait_for(
        &mut subscription,
        CallPhase::Ringing(CallDirection::Incoming),
        Duration::from_secs(5),
    )
    .await?;
    info!("🔔 {} is calling", peer);
    tokio::time::sleep(ring).await;

    match answer {
        Answer::Decline => {
            coordinator.handle(CallEvent::DeclineTapped).await;
            wait_for(&mut subscription, CallPhase::Idle, Duration::from_secs(5)).await?;
            info!("📴 Declined call from {}", peer);
            return Ok(());
        }
        Answer::FromSystem => {
            provider.answer(call_id);
        }
        Answer::InApp => {
            coordinator.handle(CallEvent::AcceptTapped).await;
        }
    }

    wait_for(&mut subscription, CallPhase::Connected, Duration::from_secs(60)).await?;
    info!("✅ Talking to {}", peer);
    talk(coordinator, talk_for).await;
    hang_up(coordinator, &mut subscription).await
}

pub async fn reset_storm(
    coordinator: &CallSessionCoordinator,
    provider: &SimulatedProvider,
    peer: &str,
    count: usize,
    settle_limit: Duration,
) -> Result<()> {
    let mut subscription = coordinator.subscribe();

    coordinator
        .handle(CallEvent::StartOutgoingCall {
            peer_name: peer.to_string(),
        })
        .await;
    wait_for(&mut subscription, CallPhase::Connected, Duration::from_secs(60)).await?;

    warn!("💥 Firing {} provider resets", count);
    for _ in 0..count {
        provider.reset();
    }
    // A late confirmation for the dropped call must not revive it
    if let Some(call_id) = coordinator.current_state().provider_call_id {
        provider.deliver(ProviderCallback::StartPerformed { call_id });
    }

    // Every reset re-arms the collapse to Idle, so poll until it sticks
    let settle = async {
        loop {
            coordinator.flush().await;
            if coordinator.current_state().is_idle() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    if tokio::time::timeout(settle_limit, settle).await.is_err() {
        bail!("call did not return to Idle within {:?}", settle_limit);
    }

    let state = coordinator.current_state();
    info!("Final phase {} after {} transitions", state.phase, state.sequence);
    Ok(())
}

pub fn print_summary(devices: &RecordingDevices, provider: &SimulatedProvider) {
    info!("📊 Device calls:");
    for call in devices.calls() {
        info!("  {:?}", call);
    }
    info!("📊 Provider requests:");
    for request in provider.requests() {
        info!("  {:?}", request);
    }
}

//! Queued storage-mode events are applied one at a time, in arrival order,
//! and the relay bank ends up where the last event put it.

mod common;

use chrono::Utc;

use thermal_dispatch::controller::{BufferOnlyState, ControlEvent, ModeState};
use thermal_dispatch::domain::{
    ActuatorAction, ActuatorTarget, RelayChange, RelayName, SeasonalStorageMode, SensorBatch, SensorReading,
};

fn hp_relay_changes(applied: &[thermal_dispatch::dispatch::ActuatorCommand]) -> Vec<RelayChange> {
    applied
        .iter()
        .filter_map(|command| match command.action {
            ActuatorAction::ChangeRelayState {
                relay: RelayName::HpScadaOps,
                change,
            } => Some(change),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_queued_events_apply_in_fifo_order() {
    let stack = common::spawn_stack(common::config(), SeasonalStorageMode::BufferOnly);
    let hierarchy = &stack.actors.hierarchy;

    hierarchy.control(ControlEvent::NoMoreElec).await.unwrap();
    hierarchy.control(ControlEvent::ChargeBuffer).await.unwrap();
    hierarchy.control(ControlEvent::BufferFull).await.unwrap();

    let view = hierarchy.view().await.unwrap();
    assert_eq!(view.sub, ModeState::BufferOnly(BufferOnlyState::HpOff));
    assert_eq!(view.pending, 0);

    let snapshot = stack.relays.snapshot().await.unwrap();
    assert_eq!(
        hp_relay_changes(&snapshot.applied),
        vec![RelayChange::OpenRelay, RelayChange::CloseRelay, RelayChange::OpenRelay]
    );
    assert_eq!(
        snapshot.action_for(ActuatorTarget::Relay(RelayName::HpScadaOps)),
        Some(&ActuatorAction::open(RelayName::HpScadaOps))
    );
    let triggers: Vec<u64> = snapshot.applied.iter().map(|c| c.trigger_id).collect();
    assert!(triggers.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(snapshot.duplicates, 0);

    stack.actors.shutdown().await;
}

#[tokio::test]
async fn test_unrecognized_event_changes_nothing() {
    let stack = common::spawn_stack(common::config(), SeasonalStorageMode::BufferOnly);
    let hierarchy = &stack.actors.hierarchy;

    hierarchy.control(ControlEvent::ChargeBuffer).await.unwrap();
    let before = stack.relays.snapshot().await.unwrap().applied.len();
    // Storage events mean nothing without storage tanks
    hierarchy.control(ControlEvent::ChargeStorage).await.unwrap();
    hierarchy.control(ControlEvent::StopHackOil).await.unwrap();

    let view = hierarchy.view().await.unwrap();
    assert_eq!(view.sub, ModeState::BufferOnly(BufferOnlyState::HpOn));
    assert_eq!(stack.relays.snapshot().await.unwrap().applied.len(), before);

    stack.actors.shutdown().await;
}

#[tokio::test]
async fn test_relay_bank_outage_forces_failsafe() {
    let stack = common::spawn_stack(common::config(), SeasonalStorageMode::BufferOnly);
    let hierarchy = &stack.actors.hierarchy;

    hierarchy.control(ControlEvent::ChargeBuffer).await.unwrap();
    hierarchy.view().await.unwrap();
    stack.relays.set_rejecting(true).await.unwrap();

    // Escalates once the dispatcher's retries run out
    hierarchy.control(ControlEvent::BufferFull).await.unwrap();
    let view = hierarchy.view().await.unwrap();
    assert_eq!(view.sub, ModeState::safe_default(SeasonalStorageMode::BufferOnly));
    assert!(view.pending > 0);

    stack.relays.set_rejecting(false).await.unwrap();
    hierarchy.tick().await.unwrap();
    let view = hierarchy.view().await.unwrap();
    assert_eq!(view.pending, 0);
    let snapshot = stack.relays.snapshot().await.unwrap();
    assert_eq!(
        snapshot.action_for(ActuatorTarget::Relay(RelayName::HpScadaOps)),
        Some(&ActuatorAction::open(RelayName::HpScadaOps))
    );

    stack.actors.shutdown().await;
}

#[tokio::test]
async fn test_low_buffer_reading_starts_heat_pump() {
    let config = common::config();
    let channel = config.sensors.buffer_energy_channel.clone();
    let low = config.controller.buffer_low_kwh - 0.5;
    let stack = common::spawn_stack(config, SeasonalStorageMode::BufferOnly);

    stack
        .actors
        .hierarchy
        .sensors(SensorBatch {
            readings: vec![SensorReading {
                channel,
                value: low,
                timestamp: Utc::now(),
            }],
        })
        .await
        .unwrap();

    let view = stack.actors.hierarchy.view().await.unwrap();
    assert_eq!(view.sub, ModeState::BufferOnly(BufferOnlyState::HpOn));
    let snapshot = stack.relays.snapshot().await.unwrap();
    assert_eq!(
        snapshot.action_for(ActuatorTarget::Relay(RelayName::HpScadaOps)),
        Some(&ActuatorAction::close(RelayName::HpScadaOps))
    );

    stack.actors.shutdown().await;
}

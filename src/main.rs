use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use thermal_dispatch::config::Config;
use thermal_dispatch::contract::{ContractHandle, ContractMessage};
use thermal_dispatch::controller::{spawn_actors, Collaborators};
use thermal_dispatch::dispatch::{Actuator, LogReportSink, SimulatedRelayBank};
use thermal_dispatch::domain::{ActorClass, Envelope};
use thermal_dispatch::forecast::provider_from_config;
use thermal_dispatch::market::LogBidSink;
use thermal_dispatch::telemetry::{init_tracing, shutdown_signal};

/// Outbound aggregator messages go to the log until a real link exists
async fn log_atn_outbound(mut rx: mpsc::Receiver<Envelope<ContractMessage>>) {
    while let Some(envelope) = rx.recv().await {
        match envelope.to_json() {
            Ok(json) => info!(message = %json, "to atn"),
            Err(e) => warn!(error = %e, "outbound atn message not encodable"),
        }
    }
}

/// One contract envelope per line on stdin stands in for the aggregator
async fn read_atn_inbound(contracts: ContractHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match Envelope::<ContractMessage>::from_json(&line) {
                Ok(message) => {
                    if contracts.deliver(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "inbound atn line rejected"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let layout = Arc::new(cfg.layout()?);

    let (bank, relays) = SimulatedRelayBank::new(64);
    let bank_task = tokio::spawn(bank.run());
    let actuator: Arc<dyn Actuator> = Arc::new(relays.clone());

    let (atn_outbound, atn_rx) = mpsc::channel(32);
    tokio::spawn(log_atn_outbound(atn_rx));

    let collaborators = Collaborators {
        forecasts: provider_from_config(&cfg.planner),
        bids: Arc::new(LogBidSink),
        reports: Arc::new(LogReportSink),
        actuators: HashMap::from([(ActorClass::HpBoss, actuator.clone()), (ActorClass::Relay, actuator)]),
        atn_outbound,
    };

    info!(node = %cfg.node.alias, mode = %cfg.node.storage_mode, "starting thermal dispatch");
    let actors = spawn_actors(&cfg, layout.clone(), collaborators)?;
    tokio::spawn(read_atn_inbound(actors.contracts.clone()));

    #[cfg(feature = "sim")]
    {
        use thermal_dispatch::simulation::PlantSimulator;
        let plant = PlantSimulator::new(cfg.simulation.clone(), &layout, relays.clone(), actors.hierarchy.clone())?;
        tokio::spawn(plant.run());
    }

    shutdown_signal().await;

    actors.shutdown().await;
    relays.shutdown().await;
    if let Err(e) = bank_task.await {
        warn!(error = %e, "relay bank ended abnormally");
    }
    warn!("shutdown complete");
    Ok(())
}

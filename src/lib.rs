//! Thermal dispatch core for a residential heat pump with thermal storage.
//!
//! The planner turns price and load forecasts into an hourly dispatch plan
//! and a market bid. The contract manager arbitrates dispatch authority with
//! the aggregator. The control hierarchy runs the authority and storage-mode
//! machines and hands their actuator commands to the dispatcher.

pub mod config;
pub mod contract;
pub mod controller;
pub mod dispatch;
pub mod domain;
pub mod forecast;
pub mod mailbox;
pub mod market;
pub mod optimizer;
#[cfg(feature = "sim")]
pub mod simulation;
pub mod telemetry;

//! # Plant Simulation Module
//!
//! Closes the loop for development runs without hardware: the simulated
//! relay bank records what the hierarchy switched, and the tank plant turns
//! those relay positions into buffer and store energy readings.
//!
//! ## Components
//!
//! - **TankPlant**: two-tank energy balance with a noisy house load
//! - **PlantSimulator**: task that steps the plant on a fixed interval and
//!   feeds the readings back to the control hierarchy

pub mod plant;

pub use plant::{PlantInputs, PlantSimulator, PlantState, TankPlant};

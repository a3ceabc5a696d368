//! Closed enumerations shared across the dispatch core.
//!
//! Every enum carries its schema name, version and default value as static
//! metadata through [`EnumMeta`]; nothing is looked up at runtime.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Static schema metadata for a closed enumeration
pub trait EnumMeta: Sized + Copy + Default + 'static {
    const ENUM_NAME: &'static str;
    const VERSION: &'static str;

    fn default_value() -> Self {
        Self::default()
    }
}

/// Whether the system treats all thermal tanks or only the buffer tank as
/// active storage
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum SeasonalStorageMode {
    #[default]
    AllTanks,
    BufferOnly,
}

impl EnumMeta for SeasonalStorageMode {
    const ENUM_NAME: &'static str = "seasonal.storage.mode";
    const VERSION: &'static str = "000";
}

/// Kind of actor owning a piece of the system
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ActorClass {
    #[default]
    NoActor,
    Scada,
    Atn,
    Relay,
    HpBoss,
    Reporter,
}

impl EnumMeta for ActorClass {
    const ENUM_NAME: &'static str = "actor.class";
    const VERSION: &'static str = "001";
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum RelayChange {
    #[default]
    OpenRelay,
    CloseRelay,
}

impl EnumMeta for RelayChange {
    const ENUM_NAME: &'static str = "change.relay.state";
    const VERSION: &'static str = "000";
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum AquastatControl {
    #[default]
    SwitchToBoiler,
    SwitchToScada,
}

impl EnumMeta for AquastatControl {
    const ENUM_NAME: &'static str = "change.aquastat.control";
    const VERSION: &'static str = "000";
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum HeatPumpControl {
    #[default]
    SwitchToTankAquastat,
    SwitchToScada,
}

impl EnumMeta for HeatPumpControl {
    const ENUM_NAME: &'static str = "change.heat.pump.control";
    const VERSION: &'static str = "000";
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum PrimaryPumpControl {
    #[default]
    SwitchToHeatPump,
    SwitchToScada,
}

impl EnumMeta for PrimaryPumpControl {
    const ENUM_NAME: &'static str = "change.primary.pump.control";
    const VERSION: &'static str = "000";
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum HeatcallSource {
    #[default]
    SwitchToWallThermostat,
    SwitchToScada,
}

impl EnumMeta for HeatcallSource {
    const ENUM_NAME: &'static str = "change.heatcall.source";
    const VERSION: &'static str = "000";
}

/// Market a bid is submitted to. Price bounds are in $/MWh.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum MarketType {
    /// Day-ahead, hourly slots
    Da60,
    /// Real-time, hourly slots, 5 minute gate closure
    #[default]
    Rt60Gate5,
    /// Real-time, 15 minute slots, 5 minute gate closure
    Rt15Gate5,
}

impl MarketType {
    pub fn slot_duration_minutes(&self) -> u32 {
        match self {
            Self::Da60 | Self::Rt60Gate5 => 60,
            Self::Rt15Gate5 => 15,
        }
    }

    pub fn price_floor_usd_per_mwh(&self) -> f64 {
        match self {
            Self::Da60 => -500.0,
            Self::Rt60Gate5 | Self::Rt15Gate5 => -1_000.0,
        }
    }

    pub fn price_cap_usd_per_mwh(&self) -> f64 {
        match self {
            Self::Da60 => 2_000.0,
            Self::Rt60Gate5 | Self::Rt15Gate5 => 10_000.0,
        }
    }
}

impl EnumMeta for MarketType {
    const ENUM_NAME: &'static str = "market.type.name";
    const VERSION: &'static str = "000";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_defaults_are_failsafe_legs() {
        assert_eq!(RelayChange::default_value(), RelayChange::OpenRelay);
        assert_eq!(HeatPumpControl::default_value(), HeatPumpControl::SwitchToTankAquastat);
        assert_eq!(HeatcallSource::default_value(), HeatcallSource::SwitchToWallThermostat);
        assert_eq!(AquastatControl::default_value(), AquastatControl::SwitchToBoiler);
    }

    #[test]
    fn test_names_roundtrip_through_strum() {
        for mode in SeasonalStorageMode::iter() {
            let parsed = SeasonalStorageMode::from_str(mode.as_ref()).unwrap();
            assert_eq!(parsed, mode);
        }
        assert!(SeasonalStorageMode::from_str("SomeTanks").is_err());
    }

    #[test]
    fn test_market_bounds_are_ordered() {
        for market in MarketType::iter() {
            assert!(market.price_floor_usd_per_mwh() < market.price_cap_usd_per_mwh());
        }
    }
}

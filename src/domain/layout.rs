//! Start-up registry of sensor channels and actuator owners.
//!
//! Built once from configuration and shared read-only (`Arc<Layout>`) with
//! the actors that need lookups.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::actuator::ActuatorTarget;
use super::enums::{ActorClass, SeasonalStorageMode};

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("Duplicate sensor channel: {0}")]
    DuplicateChannel(String),
    #[error("No owner registered for actuator {0}")]
    MissingOwner(ActuatorTarget),
    #[error("Actuator {0} cannot be owned by {1}")]
    InvalidOwner(ActuatorTarget, ActorClass),
    #[error("Required channel missing: {0}")]
    MissingChannel(String),
}

/// Role a sensor channel plays for the control hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    /// Usable energy in the buffer tank (kWh)
    BufferEnergy,
    /// Usable energy in the storage tanks (kWh)
    StoreEnergy,
    /// Anything else, recorded but not interpreted
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub role: ChannelRole,
    pub unit: String,
}

#[derive(Debug, Clone)]
pub struct Layout {
    node_alias: String,
    storage_mode: SeasonalStorageMode,
    channels: HashMap<String, ChannelSpec>,
    owners: HashMap<ActuatorTarget, ActorClass>,
}

impl Layout {
    pub fn new(
        node_alias: impl Into<String>,
        storage_mode: SeasonalStorageMode,
        channels: Vec<ChannelSpec>,
        owners: Vec<(ActuatorTarget, ActorClass)>,
    ) -> Result<Self, LayoutError> {
        let mut by_name = HashMap::with_capacity(channels.len());
        for spec in channels {
            if by_name.contains_key(&spec.name) {
                return Err(LayoutError::DuplicateChannel(spec.name));
            }
            by_name.insert(spec.name.clone(), spec);
        }

        let roles: HashSet<ChannelRole> = by_name.values().map(|c| c.role).collect();
        if !roles.contains(&ChannelRole::BufferEnergy) {
            return Err(LayoutError::MissingChannel("buffer energy".to_string()));
        }
        if storage_mode == SeasonalStorageMode::AllTanks && !roles.contains(&ChannelRole::StoreEnergy) {
            return Err(LayoutError::MissingChannel("store energy".to_string()));
        }

        let owners: HashMap<_, _> = owners.into_iter().collect();
        for target in ActuatorTarget::all() {
            match owners.get(&target) {
                None => return Err(LayoutError::MissingOwner(target)),
                Some(class @ (ActorClass::NoActor | ActorClass::Atn | ActorClass::Reporter)) => {
                    return Err(LayoutError::InvalidOwner(target, *class));
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            node_alias: node_alias.into(),
            storage_mode,
            channels: by_name,
            owners,
        })
    }

    /// Default owners: the heat pump relay belongs to the heat pump boss,
    /// everything else to the relay driver
    pub fn default_owners() -> Vec<(ActuatorTarget, ActorClass)> {
        ActuatorTarget::all()
            .into_iter()
            .map(|target| match target {
                ActuatorTarget::Relay(super::actuator::RelayName::HpScadaOps) => (target, ActorClass::HpBoss),
                _ => (target, ActorClass::Relay),
            })
            .collect()
    }

    pub fn node_alias(&self) -> &str {
        &self.node_alias
    }

    pub fn storage_mode(&self) -> SeasonalStorageMode {
        self.storage_mode
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.get(name)
    }

    pub fn channel_for_role(&self, role: ChannelRole) -> Option<&ChannelSpec> {
        self.channels.values().find(|c| c.role == role)
    }

    pub fn owner_of(&self, target: ActuatorTarget) -> Option<ActorClass> {
        self.owners.get(&target).copied()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actuator::RelayName;

    fn buffer_channel() -> ChannelSpec {
        ChannelSpec {
            name: "buffer-energy".to_string(),
            role: ChannelRole::BufferEnergy,
            unit: "kWh".to_string(),
        }
    }

    #[test]
    fn test_default_owners_cover_every_target() {
        let layout = Layout::new(
            "a.scada",
            SeasonalStorageMode::BufferOnly,
            vec![buffer_channel()],
            Layout::default_owners(),
        )
        .unwrap();
        assert_eq!(
            layout.owner_of(ActuatorTarget::Relay(RelayName::HpScadaOps)),
            Some(ActorClass::HpBoss)
        );
        assert_eq!(layout.owner_of(ActuatorTarget::AquastatControl), Some(ActorClass::Relay));
    }

    #[test]
    fn test_missing_owner_rejected() {
        let mut owners = Layout::default_owners();
        owners.retain(|(t, _)| *t != ActuatorTarget::HeatcallSource);
        let err = Layout::new("a.scada", SeasonalStorageMode::BufferOnly, vec![buffer_channel()], owners).unwrap_err();
        assert_eq!(err, LayoutError::MissingOwner(ActuatorTarget::HeatcallSource));
    }

    #[test]
    fn test_all_tanks_requires_store_channel() {
        let err = Layout::new(
            "a.scada",
            SeasonalStorageMode::AllTanks,
            vec![buffer_channel()],
            Layout::default_owners(),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::MissingChannel(_)));
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let err = Layout::new(
            "a.scada",
            SeasonalStorageMode::BufferOnly,
            vec![buffer_channel(), buffer_channel()],
            Layout::default_owners(),
        )
        .unwrap_err();
        assert_eq!(err, LayoutError::DuplicateChannel("buffer-energy".to_string()));
    }
}

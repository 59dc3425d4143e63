//! Constraint evaluation.
//!
//! `Constraints` is what a task requires; `Environment` is the current
//! snapshot of the device. [`is_satisfied`] is pure: no clock, no I/O.

use serde::{Deserialize, Serialize};

/// Required network condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRequirement {
    #[default]
    NotRequired,
    Connected,
    Unmetered,
}

/// Observed network condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Disconnected,
    Metered,
    #[default]
    Unmetered,
}

/// Set of required conditions. Absence of a condition means no requirement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub network: NetworkRequirement,
    pub requires_charging: bool,
    pub requires_battery_not_low: bool,
    pub requires_storage_not_low: bool,
    pub requires_device_idle: bool,
}

impl Constraints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: NetworkRequirement) -> Self {
        self.network = network;
        self
    }

    pub fn with_charging(mut self) -> Self {
        self.requires_charging = true;
        self
    }

    pub fn with_battery_not_low(mut self) -> Self {
        self.requires_battery_not_low = true;
        self
    }

    pub fn with_storage_not_low(mut self) -> Self {
        self.requires_storage_not_low = true;
        self
    }

    pub fn with_device_idle(mut self) -> Self {
        self.requires_device_idle = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Only network and storage requirements may gate expedited work.
    pub(crate) fn allowed_for_expedited(&self) -> bool {
        !self.requires_charging && !self.requires_battery_not_low && !self.requires_device_idle
    }
}

/// Snapshot of the environment the scheduler evaluates constraints against.
///
/// The default is an unmetered, non-charging, non-idle device with neither
/// battery nor storage low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub network: NetworkState,
    pub charging: bool,
    pub battery_low: bool,
    pub storage_low: bool,
    pub device_idle: bool,
}

/// All specified conditions must hold simultaneously.
pub fn is_satisfied(constraints: &Constraints, env: &Environment) -> bool {
    let network_ok = match constraints.network {
        NetworkRequirement::NotRequired => true,
        NetworkRequirement::Connected => env.network != NetworkState::Disconnected,
        NetworkRequirement::Unmetered => env.network == NetworkState::Unmetered,
    };

    network_ok
        && (!constraints.requires_charging || env.charging)
        && (!constraints.requires_battery_not_low || !env.battery_low)
        && (!constraints.requires_storage_not_low || !env.storage_low)
        && (!constraints.requires_device_idle || env.device_idle)
}

//! Device model: the closed power-capability enum and the device table.
//!
//! The device table stands in for the host game's object model. It registers
//! device types (with display labels) and holds live devices in a slotmap so
//! handles stay stable and cheap to use as map keys. Capabilities are a
//! closed enum resolved when the device is spawned, never re-probed per call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::fixed::Fixed64;
use crate::id::{DeviceId, DeviceTypeId};

// ---------------------------------------------------------------------------
// Power capability
// ---------------------------------------------------------------------------

/// The power capability a device exposes. At most one per device; storage
/// takes precedence over trading when classifying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PowerCapability {
    /// A producer or consumer on the grid.
    Trader {
        /// Instantaneous power this tick. Negative means consuming.
        signed_output: Fixed64,
        /// Declared nameplate draw. Positive for consumers; negative for
        /// producers (so `-rated_consumption` is the signed declared rating).
        /// Variable-output generators may declare a placeholder here.
        rated_consumption: Fixed64,
        /// Off devices draw nothing regardless of `signed_output`.
        switched_on: bool,
    },
    /// A battery.
    Storage {
        /// Energy currently stored. Non-negative.
        stored: Fixed64,
        /// Maximum storable energy. Exact and known, never estimated.
        capacity: Fixed64,
    },
}

impl PowerCapability {
    /// The signed declared rating for traders (`-rated_consumption`), or the
    /// storage capacity for batteries.
    pub fn declared_rating(&self) -> Fixed64 {
        match *self {
            PowerCapability::Trader {
                rated_consumption, ..
            } => -rated_consumption,
            PowerCapability::Storage { capacity, .. } => capacity,
        }
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One live device: its registered type plus its capability, if any.
///
/// A device with no capability (e.g. a bare conduit) is on the table but
/// unclassifiable; trackers must skip it rather than fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub type_id: DeviceTypeId,
    pub capability: Option<PowerCapability>,
}

/// A registered device type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeDef {
    pub name: String,
}

// ---------------------------------------------------------------------------
// DeviceTable
// ---------------------------------------------------------------------------

/// Registered device types plus all live devices.
///
/// The table owns the devices; trackers hold `DeviceId`s and read capability
/// state through the table on demand, so samples are never stale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceTable {
    devices: SlotMap<DeviceId, Device>,
    types: Vec<DeviceTypeDef>,
    type_name_to_id: HashMap<String, DeviceTypeId>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device type. Returns its ID.
    pub fn register_type(&mut self, name: &str) -> DeviceTypeId {
        let id = DeviceTypeId(self.types.len() as u32);
        self.types.push(DeviceTypeDef {
            name: name.to_string(),
        });
        self.type_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Lookup a device type ID by name.
    pub fn type_id(&self, name: &str) -> Option<DeviceTypeId> {
        self.type_name_to_id.get(name).copied()
    }

    /// Display label for a device type.
    pub fn type_label(&self, id: DeviceTypeId) -> Option<&str> {
        self.types.get(id.0 as usize).map(|t| t.name.as_str())
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Spawn a device of a registered type. Returns its handle.
    pub fn spawn(
        &mut self,
        type_id: DeviceTypeId,
        capability: Option<PowerCapability>,
    ) -> DeviceId {
        self.devices.insert(Device {
            type_id,
            capability,
        })
    }

    /// Remove a device. Returns false if it was already gone.
    pub fn despawn(&mut self, id: DeviceId) -> bool {
        self.devices.remove(id).is_some()
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    /// The capability of a device, if it is present and exposes one.
    pub fn capability(&self, id: DeviceId) -> Option<&PowerCapability> {
        self.devices.get(id).and_then(|d| d.capability.as_ref())
    }

    /// The registered type of a device, if it is present.
    pub fn device_type(&self, id: DeviceId) -> Option<DeviceTypeId> {
        self.devices.get(id).map(|d| d.type_id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &Device)> {
        self.devices.iter()
    }

    // -- live-state mutation (driven by the host simulation) --

    /// Flick a trader on or off. Returns false for non-traders and missing
    /// devices.
    pub fn set_switched_on(&mut self, id: DeviceId, on: bool) -> bool {
        match self.devices.get_mut(id).and_then(|d| d.capability.as_mut()) {
            Some(PowerCapability::Trader { switched_on, .. }) => {
                *switched_on = on;
                true
            }
            _ => false,
        }
    }

    /// Update a trader's instantaneous output. Returns false for non-traders
    /// and missing devices.
    pub fn set_signed_output(&mut self, id: DeviceId, output: Fixed64) -> bool {
        match self.devices.get_mut(id).and_then(|d| d.capability.as_mut()) {
            Some(PowerCapability::Trader { signed_output, .. }) => {
                *signed_output = output;
                true
            }
            _ => false,
        }
    }

    /// Update a battery's stored energy. Returns false for non-storage and
    /// missing devices.
    pub fn set_stored(&mut self, id: DeviceId, energy: Fixed64) -> bool {
        match self.devices.get_mut(id).and_then(|d| d.capability.as_mut()) {
            Some(PowerCapability::Storage { stored, .. }) => {
                *stored = energy;
                true
            }
            _ => false,
        }
    }
}

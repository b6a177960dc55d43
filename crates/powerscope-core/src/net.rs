//! Network membership: which devices share a grid with a selection.
//!
//! The host game owns network topology; this crate only defines the shape of
//! a membership answer ([`NetworkMembers`]) and the seam the panel asks it
//! through ([`NetworkProvider`]). Membership keeps the host's split between
//! batteries and traders, since that is how power grids enumerate their
//! members.

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;

/// The members of one power network: storage devices plus producer/consumer
/// traders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMembers {
    storage: Vec<DeviceId>,
    traders: Vec<DeviceId>,
}

impl NetworkMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a battery. No-op if already present.
    pub fn add_storage(&mut self, device: DeviceId) {
        if !self.storage.contains(&device) {
            self.storage.push(device);
        }
    }

    /// Add a producer or consumer. No-op if already present.
    pub fn add_trader(&mut self, device: DeviceId) {
        if !self.traders.contains(&device) {
            self.traders.push(device);
        }
    }

    pub fn storage(&self) -> &[DeviceId] {
        &self.storage
    }

    pub fn traders(&self) -> &[DeviceId] {
        &self.traders
    }

    /// All members, batteries first.
    pub fn iter(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.storage.iter().chain(self.traders.iter()).copied()
    }

    pub fn contains(&self, device: DeviceId) -> bool {
        self.storage.contains(&device) || self.traders.contains(&device)
    }

    pub fn len(&self) -> usize {
        self.storage.len() + self.traders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty() && self.traders.is_empty()
    }
}

/// Resolves the network a selected device belongs to.
///
/// Returns `None` when the selection is not connected to a multi-member
/// network (e.g. a lone workbench); the panel shows nothing in that case
/// rather than treating it as an error.
pub trait NetworkProvider {
    fn members_for(&self, selection: DeviceId) -> Option<NetworkMembers>;
}

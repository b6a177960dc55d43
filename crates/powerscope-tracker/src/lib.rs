//! Power aggregation/tracking engine for the powerscope inspection panel.
//!
//! Maintains a three-level aggregation tree over the devices of one power
//! network: category (Producer/Consumer/Storage) -> type group (e.g. "all
//! solar panels") -> individual item. Power sums at every level are exact;
//! rated output for producers ratchets upward from observed samples to
//! compensate for devices that declare a placeholder rating.
//!
//! # Design
//!
//! - Devices are owned by the [`DeviceTable`]; the registry holds
//!   [`DeviceId`]s and samples live state on demand, never caching it.
//! - Classification is resolved once at tracker construction from the
//!   device's capability. An unclassifiable device fails construction and is
//!   skipped by reconciliation, never a fatal error.
//! - All registry mutations are idempotent, so the reconciliation protocol
//!   is safe to run redundantly every frame; a ticks-based throttle bounds
//!   the cost anyway.
//! - Emptied groups are not pruned in-session: they keep their expand state
//!   across membership churn and cost nothing but a map entry.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use powerscope_core::classify::{Classification, ClassifyError, classify};
use powerscope_core::device::{DeviceTable, PowerCapability};
use powerscope_core::fixed::{Fixed64, Ticks, checked_div_64};
use powerscope_core::id::{DeviceId, DeviceTypeId};
use powerscope_core::net::NetworkMembers;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the tracker registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Minimum ticks between reconciliation passes (~1 s at 60 ticks/s).
    /// A pass is forced regardless whenever the registry is empty.
    pub refresh_interval: Ticks,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// PowerItem
// ---------------------------------------------------------------------------

/// Tracks power data for one device.
///
/// Classification and device type are fixed at construction; current output
/// is read through the device table on every query so it is never stale. If
/// the device has vanished from the table, samples degrade to zero until
/// reconciliation drops the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerItem {
    device: DeviceId,
    type_id: DeviceTypeId,
    classification: Classification,
    /// Running maximum of observed output magnitude. Seeded from
    /// `Fixed64::MIN`, not zero: consumers' true ratings are negative and
    /// must not be clamped upward by a zero floor.
    max_observed_output: Fixed64,
}

impl PowerItem {
    /// Construct a tracker for `device`. Fails if the device is missing from
    /// the table or exposes no power capability.
    pub fn new(device: DeviceId, devices: &DeviceTable) -> Result<Self, ClassifyError> {
        let record = devices.get(device).ok_or(ClassifyError::UnknownDevice)?;
        let classification = classify(record.capability.as_ref())?;
        Ok(Self {
            device,
            type_id: record.type_id,
            classification,
            max_observed_output: Fixed64::MIN,
        })
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn type_id(&self) -> DeviceTypeId {
        self.type_id
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn max_observed_output(&self) -> Fixed64 {
        self.max_observed_output
    }

    /// Instantaneous power this tick. Negative means consuming. Traders that
    /// are switched off sample 0 regardless of their underlying draw. For
    /// storage this is the stored energy, reinterpreted as "output" so all
    /// three classifications display uniformly.
    pub fn current_output(&self, devices: &DeviceTable) -> Fixed64 {
        match devices.capability(self.device) {
            Some(PowerCapability::Trader {
                signed_output,
                switched_on,
                ..
            }) => {
                if *switched_on {
                    *signed_output
                } else {
                    Fixed64::ZERO
                }
            }
            Some(PowerCapability::Storage { stored, .. }) => *stored,
            None => Fixed64::ZERO,
        }
    }

    /// Rated power. For traders this is the signed declared rating, raised
    /// to the maximum output ever observed (variable-output generators
    /// declare placeholders like 1 W). Storage capacity is exact and never
    /// ratcheted.
    pub fn rated_output(&self, devices: &DeviceTable) -> Fixed64 {
        match devices.capability(self.device) {
            Some(trader @ PowerCapability::Trader { .. }) => {
                trader.declared_rating().max(self.max_observed_output)
            }
            Some(PowerCapability::Storage { capacity, .. }) => *capacity,
            None => Fixed64::ZERO,
        }
    }

    /// Sample the current output magnitude into the ratchet. Only producers
    /// ratchet: consumers' declared draw is authoritative and storage
    /// capacity is exact.
    pub fn tick(&mut self, devices: &DeviceTable) {
        if self.classification != Classification::Producer {
            return;
        }
        let sample = self.current_output(devices).abs();
        if sample > self.max_observed_output {
            self.max_observed_output = sample;
        }
    }
}

// ---------------------------------------------------------------------------
// PowerGroup
// ---------------------------------------------------------------------------

/// All tracked items of one device type (e.g. every solar panel on the net).
///
/// The group holds member ids, not items; the registry owns the items. The
/// classification is seeded from the first tracked member, and all members
/// of a type share it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerGroup {
    type_id: DeviceTypeId,
    label: String,
    classification: Classification,
    members: Vec<DeviceId>,
    /// UI expand/collapse state. Survives membership churn; has no effect on
    /// aggregation math.
    expanded: bool,
}

impl PowerGroup {
    pub fn new(type_id: DeviceTypeId, label: String, classification: Classification) -> Self {
        Self {
            type_id,
            label,
            classification,
            members: Vec::new(),
            expanded: false,
        }
    }

    pub fn type_id(&self) -> DeviceTypeId {
        self.type_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn members(&self) -> &[DeviceId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, device: DeviceId) -> bool {
        self.members.contains(&device)
    }

    /// Add a member. No-op if already present.
    pub fn add_member(&mut self, device: DeviceId) {
        if !self.members.contains(&device) {
            self.members.push(device);
        }
    }

    /// Remove a member. No-op if absent.
    pub fn remove_member(&mut self, device: DeviceId) {
        self.members.retain(|d| *d != device);
    }

    pub fn expanded(&self) -> bool {
        self.expanded
    }

    /// Flip the expand/collapse display state. Returns the new state.
    pub fn toggle_expanded(&mut self) -> bool {
        self.expanded = !self.expanded;
        self.expanded
    }
}

// ---------------------------------------------------------------------------
// PowerCategory
// ---------------------------------------------------------------------------

/// All groups sharing one classification. Exactly one category exists per
/// classification; it persists for the registry's lifetime once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerCategory {
    classification: Classification,
    groups: Vec<DeviceTypeId>,
}

impl PowerCategory {
    pub fn new(classification: Classification) -> Self {
        Self {
            classification,
            groups: Vec::new(),
        }
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn label(&self) -> &'static str {
        self.classification.label()
    }

    pub fn groups(&self) -> &[DeviceTypeId] {
        &self.groups
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Add a group. No-op if already present.
    pub fn add_group(&mut self, type_id: DeviceTypeId) {
        if !self.groups.contains(&type_id) {
            self.groups.push(type_id);
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation outcome
// ---------------------------------------------------------------------------

/// What a reconciliation pass did. Skipped devices are the unclassifiable
/// ones; they are reported here instead of aborting the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// False when the throttle suppressed the pass entirely.
    pub refreshed: bool,
    /// Devices newly tracked this pass.
    pub added: usize,
    /// Stale trackers dropped this pass.
    pub removed: usize,
    /// Members left untracked: unclassifiable, or conflicting with their
    /// type's tracked classification.
    pub skipped: Vec<DeviceId>,
}

// ---------------------------------------------------------------------------
// PowerRegistry
// ---------------------------------------------------------------------------

/// Owns every tracked item and the group/category indexes over them.
///
/// Invariant: each tracked item is reachable through exactly one group,
/// which is reachable through exactly one category. `remove_tracker` cascades
/// through the group before dropping the item, so no index ever references a
/// dead item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerRegistry {
    items: HashMap<DeviceId, PowerItem>,
    groups: HashMap<DeviceTypeId, PowerGroup>,
    categories: HashMap<Classification, PowerCategory>,
    config: TrackerConfig,
    last_refresh: Option<Ticks>,
}

impl Default for PowerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerRegistry {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            items: HashMap::new(),
            groups: HashMap::new(),
            categories: HashMap::new(),
            config,
            last_refresh: None,
        }
    }

    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Start tracking a device. No-op returning `Ok(false)` if it is already
    /// tracked; `Ok(true)` when a tracker was created. An unclassifiable
    /// device, or one whose classification conflicts with its type's
    /// existing group, fails without touching registry state.
    pub fn add_tracker(
        &mut self,
        device: DeviceId,
        devices: &DeviceTable,
    ) -> Result<bool, ClassifyError> {
        if self.items.contains_key(&device) {
            return Ok(false);
        }

        let item = PowerItem::new(device, devices)?;
        let type_id = item.type_id();
        let classification = item.classification();

        // A type's classification is fixed when its group is first created;
        // a member whose capability disagrees is rejected like an
        // unclassifiable device, so no group ever spans two categories.
        if let Some(group) = self.groups.get(&type_id) {
            if group.classification() != classification {
                return Err(ClassifyError::ConflictingClassification);
            }
        }

        let group = self.groups.entry(type_id).or_insert_with(|| {
            let label = devices
                .type_label(type_id)
                .unwrap_or("unknown device")
                .to_string();
            PowerGroup::new(type_id, label, classification)
        });
        group.add_member(device);

        self.categories
            .entry(classification)
            .or_insert_with(|| PowerCategory::new(classification))
            .add_group(type_id);

        self.items.insert(device, item);
        Ok(true)
    }

    /// Stop tracking a device. No-op returning false if it is not tracked.
    /// The item leaves its group before the identity map, so no index keeps
    /// a reference to it. The (possibly emptied) group stays registered.
    pub fn remove_tracker(&mut self, device: DeviceId) -> bool {
        let Some(item) = self.items.remove(&device) else {
            return false;
        };
        if let Some(group) = self.groups.get_mut(&item.type_id()) {
            group.remove_member(device);
        }
        true
    }

    /// Drop every tracker whose device is not in `keep`. Returns how many
    /// were removed.
    pub fn remove_all_except(&mut self, keep: &[DeviceId]) -> usize {
        let keep: HashSet<DeviceId> = keep.iter().copied().collect();
        let stale: Vec<DeviceId> = self
            .items
            .keys()
            .copied()
            .filter(|d| !keep.contains(d))
            .collect();
        for device in &stale {
            self.remove_tracker(*device);
        }
        stale.len()
    }

    /// Pure lookup; never mutates.
    pub fn get_tracker(&self, device: DeviceId) -> Option<&PowerItem> {
        self.items.get(&device)
    }

    pub fn tracker_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tracked_devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.items.keys().copied()
    }

    pub fn group(&self, type_id: DeviceTypeId) -> Option<&PowerGroup> {
        self.groups.get(&type_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &PowerGroup> {
        self.groups.values()
    }

    pub fn category(&self, classification: Classification) -> Option<&PowerCategory> {
        self.categories.get(&classification)
    }

    pub fn categories(&self) -> impl Iterator<Item = &PowerCategory> {
        self.categories.values()
    }

    /// Flip a group's expand state. Returns the new state, or `None` if no
    /// such group exists.
    pub fn toggle_expanded(&mut self, type_id: DeviceTypeId) -> Option<bool> {
        self.groups.get_mut(&type_id).map(PowerGroup::toggle_expanded)
    }

    /// Advance every tracker's ratchet by one sample.
    pub fn tick(&mut self, devices: &DeviceTable) {
        for item in self.items.values_mut() {
            item.tick(devices);
        }
    }

    // -- aggregation --

    /// Sum of member current outputs for one group. Ids without a live item
    /// contribute nothing.
    pub fn group_current_power(&self, type_id: DeviceTypeId, devices: &DeviceTable) -> Fixed64 {
        self.sum_group(type_id, |item| item.current_output(devices))
    }

    /// Sum of member rated outputs for one group.
    pub fn group_rated_power(&self, type_id: DeviceTypeId, devices: &DeviceTable) -> Fixed64 {
        self.sum_group(type_id, |item| item.rated_output(devices))
    }

    /// Sum of group current power across one category. By associativity this
    /// equals the flat sum over every contained item.
    pub fn category_current_power(
        &self,
        classification: Classification,
        devices: &DeviceTable,
    ) -> Fixed64 {
        self.sum_category(classification, |type_id| {
            self.group_current_power(type_id, devices)
        })
    }

    /// Sum of group rated power across one category.
    pub fn category_rated_power(
        &self,
        classification: Classification,
        devices: &DeviceTable,
    ) -> Fixed64 {
        self.sum_category(classification, |type_id| {
            self.group_rated_power(type_id, devices)
        })
    }

    fn sum_group<F>(&self, type_id: DeviceTypeId, f: F) -> Fixed64
    where
        F: Fn(&PowerItem) -> Fixed64,
    {
        let Some(group) = self.groups.get(&type_id) else {
            return Fixed64::ZERO;
        };
        group
            .members()
            .iter()
            .filter_map(|device| self.items.get(device))
            .map(f)
            .fold(Fixed64::ZERO, |acc, val| acc + val)
    }

    fn sum_category<F>(&self, classification: Classification, f: F) -> Fixed64
    where
        F: Fn(DeviceTypeId) -> Fixed64,
    {
        let Some(category) = self.categories.get(&classification) else {
            return Fixed64::ZERO;
        };
        category
            .groups()
            .iter()
            .map(|type_id| f(*type_id))
            .fold(Fixed64::ZERO, |acc, val| acc + val)
    }

    // -- reconciliation --

    /// Reconcile the tracked set against a network membership snapshot:
    /// track every member (skipping unclassifiable ones), then drop trackers
    /// for devices no longer on the network.
    ///
    /// Throttled: the pass is suppressed until `refresh_interval` ticks have
    /// elapsed since the last one, unless the registry is empty. Because the
    /// underlying operations are idempotent, calling this every frame is
    /// safe either way.
    pub fn reconcile(
        &mut self,
        members: &NetworkMembers,
        devices: &DeviceTable,
        now: Ticks,
    ) -> ReconcileOutcome {
        let due = match self.last_refresh {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.refresh_interval,
        };
        if !due && !self.items.is_empty() {
            return ReconcileOutcome::default();
        }
        self.last_refresh = Some(now);

        let mut outcome = ReconcileOutcome {
            refreshed: true,
            ..ReconcileOutcome::default()
        };
        for device in members.iter() {
            match self.add_tracker(device, devices) {
                Ok(true) => outcome.added += 1,
                Ok(false) => {}
                Err(_) => outcome.skipped.push(device),
            }
        }
        let keep: Vec<DeviceId> = members.iter().collect();
        outcome.removed = self.remove_all_except(&keep);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Ratio helper
// ---------------------------------------------------------------------------

/// Fill ratio `current / rated`, clamped to `[0, 1]` for display. A zero
/// rated power clamps to 0 instead of propagating a division failure; a
/// ratio with mismatched signs clamps to 0.
pub fn fill_ratio(current: Fixed64, rated: Fixed64) -> Fixed64 {
    match checked_div_64(current, rated) {
        None => Fixed64::ZERO,
        Some(ratio) => ratio.clamp(Fixed64::ZERO, Fixed64::ONE),
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Panel controller and row builder for the powerscope inspection panel.
//!
//! Converts the tracker registry's Category -> Group -> Item tree into a
//! flat list of drawable rows, and owns the panel lifecycle: the current
//! selection, the throttled refresh through a [`NetworkProvider`], and
//! per-tick sampling. Rendering itself lives with the host UI; rows carry
//! everything a renderer needs (labels, sums, clamped fill ratios, expand
//! and storage flags) and nothing it doesn't.
//!
//! # Row order
//!
//! Categories sort by label (`Batteries`, `Consumers`, `Producers`); groups
//! sort within their category by descending power magnitude, as do items
//! within an expanded group. Collapsed groups contribute no item rows;
//! groups emptied by membership churn are elided entirely, as are categories
//! left without a single live group.

use serde::{Deserialize, Serialize};

use powerscope_core::classify::Classification;
use powerscope_core::device::DeviceTable;
use powerscope_core::fixed::{Fixed64, Ticks};
use powerscope_core::id::{DeviceId, DeviceTypeId};
use powerscope_core::net::NetworkProvider;
use powerscope_tracker::{
    PowerRegistry, ReconcileOutcome, TrackerConfig, fill_ratio,
};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One drawable row of the panel. Power values are signed (negative means
/// consuming); ratios are pre-clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelRow {
    /// A classification header with its grid-wide sums.
    Category {
        classification: Classification,
        label: &'static str,
        current: Fixed64,
        rated: Fixed64,
        ratio: Fixed64,
    },
    /// One device type's aggregate line.
    Group {
        type_id: DeviceTypeId,
        label: String,
        count: usize,
        current: Fixed64,
        rated: Fixed64,
        ratio: Fixed64,
        expanded: bool,
        /// Storage rows display stored/capacity instead of a power draw bar.
        storage: bool,
    },
    /// One device's line, present only under an expanded group.
    Item {
        device: DeviceId,
        current: Fixed64,
        rated: Fixed64,
        ratio: Fixed64,
        storage: bool,
    },
}

// ---------------------------------------------------------------------------
// PowerPanel
// ---------------------------------------------------------------------------

/// The inspection panel controller.
///
/// Explicitly constructed and owned by whoever hosts the panel; holds its
/// own registry rather than a process-wide one. Drives the cycle
/// select -> refresh -> tick -> rows.
#[derive(Debug, Clone, Default)]
pub struct PowerPanel {
    registry: PowerRegistry,
    selection: Option<DeviceId>,
}

impl PowerPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            registry: PowerRegistry::with_config(config),
            selection: None,
        }
    }

    /// Change the inspected device. `None` deselects; the next refresh then
    /// empties the panel.
    pub fn select(&mut self, device: Option<DeviceId>) {
        self.selection = device;
    }

    pub fn selection(&self) -> Option<DeviceId> {
        self.selection
    }

    pub fn registry(&self) -> &PowerRegistry {
        &self.registry
    }

    /// Flip a group's expand state. Returns the new state, or `None` if the
    /// group is unknown.
    pub fn toggle_group(&mut self, type_id: DeviceTypeId) -> Option<bool> {
        self.registry.toggle_expanded(type_id)
    }

    /// Sample every tracker's ratchet. Call once per simulation tick.
    pub fn tick(&mut self, devices: &DeviceTable) {
        self.registry.tick(devices);
    }

    /// Reconcile the tracked set against the selection's network. A
    /// selection with no multi-member network (or no selection at all)
    /// reconciles against an empty membership, emptying the panel.
    pub fn refresh<P: NetworkProvider>(
        &mut self,
        provider: &P,
        devices: &DeviceTable,
        now: Ticks,
    ) -> ReconcileOutcome {
        let members = self
            .selection
            .and_then(|selection| provider.members_for(selection))
            .unwrap_or_default();
        self.registry.reconcile(&members, devices, now)
    }

    /// Build the drawable rows for the current aggregation tree.
    pub fn rows(&self, devices: &DeviceTable) -> Vec<PanelRow> {
        let mut rows = Vec::new();

        let mut categories: Vec<_> = self.registry.categories().collect();
        categories.sort_by_key(|c| c.label());

        for category in categories {
            let classification = category.classification();
            let storage = classification == Classification::Storage;

            // Sort groups by descending power magnitude; elide emptied ones.
            let mut groups: Vec<(Fixed64, &powerscope_tracker::PowerGroup)> = category
                .groups()
                .iter()
                .filter_map(|type_id| self.registry.group(*type_id))
                .filter(|group| !group.is_empty())
                .map(|group| {
                    (
                        self.registry.group_current_power(group.type_id(), devices),
                        group,
                    )
                })
                .collect();
            // A category whose groups all emptied out has nothing to show.
            if groups.is_empty() {
                continue;
            }
            groups.sort_by(|(a, _), (b, _)| b.abs().cmp(&a.abs()));

            let current = self.registry.category_current_power(classification, devices);
            let rated = self.registry.category_rated_power(classification, devices);
            rows.push(PanelRow::Category {
                classification,
                label: category.label(),
                current,
                rated,
                ratio: fill_ratio(current, rated),
            });

            for (current, group) in groups {
                let rated = self.registry.group_rated_power(group.type_id(), devices);
                rows.push(PanelRow::Group {
                    type_id: group.type_id(),
                    label: group.label().to_string(),
                    count: group.member_count(),
                    current,
                    rated,
                    ratio: fill_ratio(current, rated),
                    expanded: group.expanded(),
                    storage,
                });

                if !group.expanded() {
                    continue;
                }
                let mut items: Vec<(Fixed64, Fixed64, DeviceId)> = group
                    .members()
                    .iter()
                    .filter_map(|device| self.registry.get_tracker(*device))
                    .map(|item| {
                        (
                            item.current_output(devices),
                            item.rated_output(devices),
                            item.device(),
                        )
                    })
                    .collect();
                items.sort_by(|(a, _, _), (b, _, _)| b.abs().cmp(&a.abs()));

                for (current, rated, device) in items {
                    rows.push(PanelRow::Item {
                        device,
                        current,
                        rated,
                        ratio: fill_ratio(current, rated),
                        storage,
                    });
                }
            }
        }

        rows
    }
}

// ===========================================================================
// Tests
// ===========================================================================

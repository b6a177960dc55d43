//! End-to-end colony grid scenario.
//!
//! Builds a small colony's electrical layout -- a solar bank, a chemfuel
//! generator, lamps, coolers, batteries, and a bare conduit -- split across
//! two independent networks, then drives the whole stack through
//! [`PowerPanel`]: selection, provider lookup, throttled reconciliation,
//! per-tick ratchet sampling, and row building.

use std::collections::HashMap;

use powerscope_core::classify::Classification;
use powerscope_core::device::{DeviceTable, PowerCapability};
use powerscope_core::fixed::{Fixed64, f64_to_fixed64};
use powerscope_core::id::DeviceId;
use powerscope_core::net::{NetworkMembers, NetworkProvider};
use powerscope_panel::{PanelRow, PowerPanel};

// ===========================================================================
// Fixture
// ===========================================================================

fn fixed(v: f64) -> Fixed64 {
    f64_to_fixed64(v)
}

fn producer(output: f64, rated: f64) -> Option<PowerCapability> {
    Some(PowerCapability::Trader {
        signed_output: fixed(output),
        rated_consumption: fixed(-rated),
        switched_on: true,
    })
}

fn consumer(draw: f64, rated: f64) -> Option<PowerCapability> {
    Some(PowerCapability::Trader {
        signed_output: fixed(-draw),
        rated_consumption: fixed(rated),
        switched_on: true,
    })
}

fn battery(stored: f64, capacity: f64) -> Option<PowerCapability> {
    Some(PowerCapability::Storage {
        stored: fixed(stored),
        capacity: fixed(capacity),
    })
}

/// Network topology for the colony: each device belongs to at most one net.
/// A selection on a net with fewer than two members resolves to nothing,
/// the way a lone unconnected workbench has no grid to inspect.
struct ColonyNets {
    assignment: HashMap<DeviceId, usize>,
    members: Vec<NetworkMembers>,
}

impl ColonyNets {
    fn new(net_count: usize) -> Self {
        Self {
            assignment: HashMap::new(),
            members: vec![NetworkMembers::new(); net_count],
        }
    }

    fn connect_storage(&mut self, net: usize, device: DeviceId) {
        self.assignment.insert(device, net);
        self.members[net].add_storage(device);
    }

    fn connect_trader(&mut self, net: usize, device: DeviceId) {
        self.assignment.insert(device, net);
        self.members[net].add_trader(device);
    }

    fn disconnect(&mut self, device: DeviceId) {
        if let Some(net) = self.assignment.remove(&device) {
            let mut rebuilt = NetworkMembers::new();
            for id in self.members[net].storage() {
                if *id != device {
                    rebuilt.add_storage(*id);
                }
            }
            for id in self.members[net].traders() {
                if *id != device {
                    rebuilt.add_trader(*id);
                }
            }
            self.members[net] = rebuilt;
        }
    }
}

impl NetworkProvider for ColonyNets {
    fn members_for(&self, selection: DeviceId) -> Option<NetworkMembers> {
        let net = *self.assignment.get(&selection)?;
        let members = &self.members[net];
        if members.len() < 2 {
            return None;
        }
        Some(members.clone())
    }
}

/// All named devices in the colony for targeted assertions.
struct ColonyDevices {
    solar_a: DeviceId,
    solar_b: DeviceId,
    generator: DeviceId,
    lamp: DeviceId,
    cooler: DeviceId,
    battery_main: DeviceId,
    conduit: DeviceId,
    // The second network: an outpost with its own turbine and heater.
    outpost_turbine: DeviceId,
    outpost_heater: DeviceId,
}

struct Colony {
    devices: DeviceTable,
    nets: ColonyNets,
    named: ColonyDevices,
}

fn build_colony() -> Colony {
    let mut devices = DeviceTable::new();
    let solar = devices.register_type("solar panel");
    let generator = devices.register_type("chemfuel generator");
    let lamp = devices.register_type("standing lamp");
    let cooler = devices.register_type("cooler");
    let bat = devices.register_type("battery");
    let conduit = devices.register_type("power conduit");
    let turbine = devices.register_type("wind turbine");
    let heater = devices.register_type("heater");

    let named = ColonyDevices {
        // Solar panels under-declare with the classic 1 W placeholder.
        solar_a: devices.spawn(solar, producer(1700.0, 1.0)),
        solar_b: devices.spawn(solar, producer(1650.0, 1.0)),
        generator: devices.spawn(generator, producer(1000.0, 1000.0)),
        lamp: devices.spawn(lamp, consumer(30.0, 30.0)),
        cooler: devices.spawn(cooler, consumer(200.0, 200.0)),
        battery_main: devices.spawn(bat, battery(150.0, 600.0)),
        conduit: devices.spawn(conduit, None),
        outpost_turbine: devices.spawn(turbine, producer(900.0, 2.0)),
        outpost_heater: devices.spawn(heater, consumer(175.0, 175.0)),
    };

    let mut nets = ColonyNets::new(2);
    nets.connect_trader(0, named.solar_a);
    nets.connect_trader(0, named.solar_b);
    nets.connect_trader(0, named.generator);
    nets.connect_trader(0, named.lamp);
    nets.connect_trader(0, named.cooler);
    nets.connect_storage(0, named.battery_main);
    nets.connect_trader(0, named.conduit);
    nets.connect_trader(1, named.outpost_turbine);
    nets.connect_trader(1, named.outpost_heater);

    Colony {
        devices,
        nets,
        named,
    }
}

fn category_row(rows: &[PanelRow], classification: Classification) -> (Fixed64, Fixed64, Fixed64) {
    rows.iter()
        .find_map(|row| match row {
            PanelRow::Category {
                classification: c,
                current,
                rated,
                ratio,
                ..
            } if *c == classification => Some((*current, *rated, *ratio)),
            _ => None,
        })
        .expect("category row present")
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn selecting_a_lamp_shows_its_whole_network() {
    let colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.lamp));

    let outcome = panel.refresh(&colony.nets, &colony.devices, 0);
    assert!(outcome.refreshed);
    // Everything classifiable on net 0; the bare conduit is skipped.
    assert_eq!(outcome.added, 6);
    assert_eq!(outcome.skipped, vec![colony.named.conduit]);

    panel.tick(&colony.devices);
    let rows = panel.rows(&colony.devices);

    let (current, rated, _) = category_row(&rows, Classification::Producer);
    assert_eq!(current, fixed(4350.0));
    assert_eq!(rated, fixed(4350.0));

    let (current, rated, ratio) = category_row(&rows, Classification::Consumer);
    assert_eq!(current, fixed(-230.0));
    assert_eq!(rated, fixed(-230.0));
    assert_eq!(ratio, fixed(1.0));

    let (current, rated, ratio) = category_row(&rows, Classification::Storage);
    assert_eq!(current, fixed(150.0));
    assert_eq!(rated, fixed(600.0));
    assert_eq!(ratio, fixed(0.25));

    // Nothing from the outpost leaked in.
    assert!(panel.registry().get_tracker(colony.named.outpost_turbine).is_none());
    assert!(panel.registry().get_tracker(colony.named.outpost_heater).is_none());
}

#[test]
fn selecting_the_outpost_shows_only_the_outpost() {
    let colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.outpost_heater));

    let outcome = panel.refresh(&colony.nets, &colony.devices, 0);
    assert_eq!(outcome.added, 2);
    assert!(panel.registry().get_tracker(colony.named.solar_a).is_none());

    panel.tick(&colony.devices);
    let rows = panel.rows(&colony.devices);
    let (current, rated, _) = category_row(&rows, Classification::Producer);
    assert_eq!(current, fixed(900.0));
    // The turbine's 2 W placeholder was ratcheted to the observed 900.
    assert_eq!(rated, fixed(900.0));
}

#[test]
fn solar_ratchet_feeds_the_displayed_ratio() {
    let mut colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.solar_a));
    panel.refresh(&colony.nets, &colony.devices, 0);

    // Night: panels idle. Declared placeholder ratings dominate.
    colony.devices.set_signed_output(colony.named.solar_a, fixed(0.0));
    colony.devices.set_signed_output(colony.named.solar_b, fixed(0.0));
    panel.tick(&colony.devices);

    let solar_type = colony.devices.type_id("solar panel").unwrap();
    assert_eq!(
        panel.registry().group_rated_power(solar_type, &colony.devices),
        fixed(2.0)
    );

    // Midday: both panels peak; the ratchet locks the observed maxima in.
    colony.devices.set_signed_output(colony.named.solar_a, fixed(1700.0));
    colony.devices.set_signed_output(colony.named.solar_b, fixed(1650.0));
    panel.tick(&colony.devices);

    // Evening: output halves, but rated keeps the midday peak, so the
    // group's fill ratio reflects real headroom instead of placeholder 1 W.
    colony.devices.set_signed_output(colony.named.solar_a, fixed(850.0));
    colony.devices.set_signed_output(colony.named.solar_b, fixed(825.0));
    panel.tick(&colony.devices);

    assert_eq!(
        panel.registry().group_rated_power(solar_type, &colony.devices),
        fixed(3350.0)
    );
    assert_eq!(
        panel.registry().group_current_power(solar_type, &colony.devices),
        fixed(1675.0)
    );

    let rows = panel.rows(&colony.devices);
    let solar_ratio = rows
        .iter()
        .find_map(|row| match row {
            PanelRow::Group { label, ratio, .. } if label == "solar panel" => Some(*ratio),
            _ => None,
        })
        .unwrap();
    assert_eq!(solar_ratio, fixed(0.5));
}

#[test]
fn flicking_a_cooler_off_zeroes_its_draw() {
    let mut colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.cooler));
    panel.refresh(&colony.nets, &colony.devices, 0);
    panel.tick(&colony.devices);

    let consumers_before =
        panel
            .registry()
            .category_current_power(Classification::Consumer, &colony.devices);
    assert_eq!(consumers_before, fixed(-230.0));

    colony.devices.set_switched_on(colony.named.cooler, false);
    // No refresh needed: output is sampled live.
    let consumers_after =
        panel
            .registry()
            .category_current_power(Classification::Consumer, &colony.devices);
    assert_eq!(consumers_after, fixed(-30.0));

    // The cooler is still tracked and still rated at its declared draw.
    let cooler_item = panel.registry().get_tracker(colony.named.cooler).unwrap();
    assert_eq!(cooler_item.current_output(&colony.devices), fixed(0.0));
    assert_eq!(cooler_item.rated_output(&colony.devices), fixed(-200.0));
}

#[test]
fn destroyed_device_degrades_then_disappears() {
    let mut colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.lamp));
    panel.refresh(&colony.nets, &colony.devices, 0);
    panel.tick(&colony.devices);

    // The generator explodes mid-interval: the table loses it before the
    // next reconciliation pass can.
    colony.devices.despawn(colony.named.generator);
    colony.nets.disconnect(colony.named.generator);

    // Sums degrade to zero for the dead device instead of failing.
    assert_eq!(
        panel
            .registry()
            .category_current_power(Classification::Producer, &colony.devices),
        fixed(3350.0)
    );

    // The next due pass drops the tracker entirely.
    let outcome = panel.refresh(&colony.nets, &colony.devices, 60);
    assert!(outcome.refreshed);
    assert_eq!(outcome.removed, 1);
    assert!(panel.registry().get_tracker(colony.named.generator).is_none());

    let gen_type = colony.devices.type_id("chemfuel generator").unwrap();
    let rows = panel.rows(&colony.devices);
    assert!(rows.iter().all(|row| {
        !matches!(row, PanelRow::Group { type_id, .. } if *type_id == gen_type)
    }));
}

#[test]
fn switching_selection_switches_networks() {
    let colony = build_colony();
    let mut panel = PowerPanel::new();

    panel.select(Some(colony.named.lamp));
    panel.refresh(&colony.nets, &colony.devices, 0);
    assert_eq!(panel.registry().tracker_count(), 6);

    // Jump to the outpost. The next due pass swaps the tracked set.
    panel.select(Some(colony.named.outpost_turbine));
    let outcome = panel.refresh(&colony.nets, &colony.devices, 60);
    assert_eq!(outcome.added, 2);
    assert_eq!(outcome.removed, 6);
    assert_eq!(panel.registry().tracker_count(), 2);
    assert!(panel.registry().get_tracker(colony.named.outpost_turbine).is_some());
}

#[test]
fn lone_device_has_no_panel() {
    let mut colony = build_colony();
    // Strand the heater alone on its net.
    colony.nets.disconnect(colony.named.outpost_turbine);

    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.outpost_heater));
    let outcome = panel.refresh(&colony.nets, &colony.devices, 0);
    assert!(outcome.refreshed);
    assert_eq!(outcome.added, 0);
    assert!(panel.rows(&colony.devices).is_empty());
}

#[test]
fn expanded_solar_group_lists_panels_by_output() {
    let colony = build_colony();
    let mut panel = PowerPanel::new();
    panel.select(Some(colony.named.solar_a));
    panel.refresh(&colony.nets, &colony.devices, 0);
    panel.tick(&colony.devices);

    let solar_type = colony.devices.type_id("solar panel").unwrap();
    panel.toggle_group(solar_type);

    let rows = panel.rows(&colony.devices);
    let items: Vec<DeviceId> = rows
        .iter()
        .filter_map(|row| match row {
            PanelRow::Item { device, .. } => Some(*device),
            _ => None,
        })
        .collect();
    assert_eq!(items, vec![colony.named.solar_a, colony.named.solar_b]);
}

//! Probe channel conversion and compensation gating.

mod common;

use tempmgr_core::mocks::MemStore;
use tempmgr_core::types::channel;
use tempmgr_core::{CoreConfig, MachineConfig};

fn probe_cfg() -> CoreConfig {
    CoreConfig {
        machine: MachineConfig {
            has_probe: true,
            ..MachineConfig::default()
        },
        ..CoreConfig::default()
    }
}

/// The probe converts through the bed table, without the bed offset curve.
#[test]
fn probe_reads_through_the_bed_table() {
    let mut rig = common::scripted_rig(probe_cfg());
    rig.adc.set_celsius(channel::PROBE, &rig.bed_table, 35.0);
    rig.adc.set_channel(channel::AUX_VOLTAGE, 512);
    rig.harness.pump();

    let temps = rig.harness.core().temps();
    assert!((temps.probe - 35.0).abs() < 2.0, "probe {}", temps.probe);
    assert_eq!(rig.harness.core().aux_voltage_raw(), 512 * 16);
    assert!(!rig.harness.core().is_any_hotend_on());
}

/// Compensation: an explicit stored override wins; otherwise the probe must
/// read at least the minimum temperature.
#[test]
fn compensation_gates_on_override_then_temperature() {
    let mut rig = common::scripted_rig(probe_cfg());
    let mut store = MemStore::default();

    // cold probe, no override: compensation unavailable
    rig.adc.set_celsius(channel::PROBE, &rig.bed_table, 10.0);
    rig.harness.pump();
    assert!(!rig
        .harness
        .core_mut()
        .probe_compensation_enabled(&mut store, 30.0)
        .unwrap());

    // warm probe: available
    rig.adc.set_celsius(channel::PROBE, &rig.bed_table, 45.0);
    rig.harness.pump();
    assert!(rig
        .harness
        .core_mut()
        .probe_compensation_enabled(&mut store, 30.0)
        .unwrap());

    // stored override disables it regardless of the reading
    tempmgr_core::store::store_probe_override(&mut store, 1).unwrap();
    assert!(!rig
        .harness
        .core_mut()
        .probe_compensation_enabled(&mut store, 30.0)
        .unwrap());
}

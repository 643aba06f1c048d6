//! Relay PID autotune against the simulated plant.

mod common;

use tempmgr_core::{CoreConfig, HeaterId};
use tempmgr_hardware::sim::PlantConfig;

/// The tuner must stream at least one bias/d line per measured cycle and
/// finish with gains obeying the classic Ziegler–Nichols identities.
#[test]
fn relay_tune_produces_classic_gains() {
    let cfg = CoreConfig::default();
    let mut rig = common::plant_rig(cfg, PlantConfig::default());

    let mut lines: Vec<String> = Vec::new();
    let result = rig
        .harness
        .run_pid_autotune(HeaterId::Hotend(0), 210.0, 3, &mut |l| {
            lines.push(l.to_string())
        })
        .expect("autotune finishes");

    assert!(lines.iter().any(|l| l == "PID Autotune start"));
    assert!(
        lines.iter().filter(|l| l.starts_with(" bias:")).count() >= 3,
        "bias/d/min/max lines per cycle: {lines:?}"
    );
    assert!(lines.iter().any(|l| l.contains(" Ku:") && l.contains(" Tu:")));
    assert!(lines.iter().any(|l| l.starts_with(" Kp:")));
    assert!(lines.iter().any(|l| l.contains("finished")));

    assert!((result.kp - 0.6 * result.ku).abs() < 1e-3);
    assert!((result.ki - 2.0 * result.kp / result.tu).abs() < 1e-3);
    assert!((result.kd - result.kp * result.tu / 8.0).abs() < 1e-3);
    assert!(result.cycles >= 3);

    // the machine is left cold and quiet
    assert_eq!(rig.harness.core().duty(HeaterId::Hotend(0)), 0);
    assert!(!rig.harness.core().is_tuning());
    assert!(rig.harness.core().fault().is_none());
}

/// A heater index the machine does not have is rejected up front.
#[test]
fn bad_heater_is_rejected() {
    let cfg = CoreConfig::default(); // one hotend
    let mut rig = common::plant_rig(cfg, PlantConfig::default());

    let mut lines: Vec<String> = Vec::new();
    let err = rig
        .harness
        .run_pid_autotune(HeaterId::Hotend(2), 210.0, 3, &mut |l| {
            lines.push(l.to_string())
        })
        .expect_err("index out of range");
    assert!(err.to_string().contains("heater"));
    assert!(lines.iter().any(|l| l.contains("Bad heater number")));
}

/// A plant that cannot heat (broken cartridge) fails the ambient-rise
/// check and latches a runaway-class fault.
#[test]
fn dead_heater_fails_and_latches() {
    let cfg = CoreConfig::default();
    let plant_cfg = PlantConfig {
        hotend: tempmgr_hardware::sim::ElementCfg {
            p_w: 0.0, // cartridge open-circuit
            c_j_per_k: 12.0,
            r_still: 20.0,
            r_full_fan: 7.0,
        },
        ..PlantConfig::default()
    };
    let mut rig = common::plant_rig(cfg, plant_cfg);

    let err = rig
        .harness
        .run_pid_autotune(HeaterId::Hotend(0), 210.0, 3, &mut |_| {})
        .expect_err("tune fails");
    assert!(err.to_string().contains("autotune") || err.to_string().contains("fault"));
    assert!(rig.harness.core().fault_present(), "fault latched");
}

//! Model observer fault behavior at machine level.

mod common;

use tempmgr_core::types::MODEL_R_SIZE;
use tempmgr_core::{CoreConfig, FaultKind, HeaterId};

fn calibrate(rig: &mut common::ScriptedRig) {
    let core = rig.harness.core_mut();
    core.model_set_params(12.0, 40.0, -7.0, 1.2, 1.74);
    for i in 0..MODEL_R_SIZE {
        core.model_set_resistance(i, 20.0);
    }
    assert!(core.model_set_enabled(true), "calibration accepted");
}

/// Full drive with a temperature that refuses to move (clogged heatbreak /
/// detached sensor) must trip the Model fault once the filtered residual
/// crosses the error rate, with the beeper giving warning feedback first.
#[test]
fn stalled_heat_with_full_drive_trips_model_fault() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);
    calibrate(&mut rig);

    // drive the heater directly, temperature pinned at ambient
    rig.harness.core_mut().begin_tuning();
    rig.harness
        .core_mut()
        .force_duty(HeaterId::Hotend(0), 127);

    let mut tripped_after = None;
    for tick in 0..400 {
        rig.harness.pump();
        if let Some(f) = rig.harness.core().fault() {
            assert_eq!(f.kind, FaultKind::Model);
            tripped_after = Some(tick);
            break;
        }
        rig.harness
            .core_mut()
            .force_duty(HeaterId::Hotend(0), 127);
    }
    assert!(tripped_after.is_some(), "model fault latched");
    // the residual filter needs a few dozen ticks, not hundreds
    assert!(tripped_after.unwrap() < 150, "tripped at {tripped_after:?}");

    assert!(rig.beeper.level(), "beeper latched on with the error");
    assert!(
        rig.beeper.toggles() >= 1,
        "warning feedback preceded the error"
    );
    assert_eq!(rig.harness.core().duty(HeaterId::Hotend(0)), 0);
}

/// The Model fault uniquely de-asserts and clears once the residual
/// subsides; every other fault stays latched forever.
#[test]
fn model_fault_clears_when_residual_subsides() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);
    calibrate(&mut rig);

    rig.harness.core_mut().begin_tuning();
    rig.harness
        .core_mut()
        .force_duty(HeaterId::Hotend(0), 127);
    for _ in 0..400 {
        rig.harness.pump();
        if rig.harness.core().fault_present() {
            break;
        }
        rig.harness
            .core_mut()
            .force_duty(HeaterId::Hotend(0), 127);
    }
    assert!(rig.harness.core().fault_present());

    // drive removed (the fault forced duty to zero already); the residual
    // decays and the fault must clear on its own
    let mut cleared = false;
    for _ in 0..600 {
        rig.harness.pump();
        if rig.harness.core().fault().is_none() {
            cleared = true;
            break;
        }
    }
    assert!(cleared, "model fault cleared after de-assertion");
    assert!(!rig.beeper.level(), "beeper released");
}

/// An uncalibrated model refuses to enable and never checks.
#[test]
fn uncalibrated_model_stays_dormant() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);
    assert!(!rig.harness.core_mut().model_set_enabled(true));

    rig.harness.core_mut().begin_tuning();
    rig.harness
        .core_mut()
        .force_duty(HeaterId::Hotend(0), 127);
    for _ in 0..200 {
        rig.harness.pump();
        rig.harness
            .core_mut()
            .force_duty(HeaterId::Hotend(0), 127);
    }
    assert!(rig.harness.core().fault().is_none());
}

//! Full observer self-calibration against the simulated plant.

mod common;

use tempmgr_core::types::MODEL_R_SIZE;
use tempmgr_core::CoreConfig;
use tempmgr_hardware::sim::PlantConfig;

/// The calibration sequence must converge to a usable parameter set whose
/// capacity is close to the plant's, with fan resistances below the
/// still-air one.
#[test]
fn calibration_recovers_plant_parameters() {
    let cfg = CoreConfig::default();
    let plant_cfg = PlantConfig::default(); // C = 12 J/K, R_still = 20 K/W
    let mut rig = common::plant_rig(cfg, plant_cfg);

    let mut lines: Vec<String> = Vec::new();
    rig.harness
        .run_model_autotune(Some(230.0), &mut |l| lines.push(l.to_string()))
        .expect("calibration succeeds");

    assert!(lines.iter().any(|l| l.contains("autotune start")));
    assert!(
        lines.iter().any(|l| l.starts_with("TM iter:")),
        "per-iteration lines streamed"
    );

    let params = rig.harness.core().model().params.clone();
    assert!(params.calibrated(), "parameter set is valid: {params:?}");
    assert!(
        (params.c - 12.0).abs() < 4.0,
        "capacity {} close to the plant's 12 J/K",
        params.c
    );
    assert!(
        (params.r[0] - 20.0).abs() < 5.0,
        "still-air resistance {} close to the plant's 20 K/W",
        params.r[0]
    );
    // the fan sheds heat: every measured/interpolated entry below full fan
    // resistance sits below still air
    assert!(params.r[MODEL_R_SIZE - 1] < params.r[0]);
    for r in &params.r {
        assert!(r.is_finite() && *r > 0.0);
    }

    // a calibrated set can now be enabled
    assert!(rig.harness.core_mut().model_set_enabled(true));
    assert!(rig.harness.core().fault().is_none());
}

/// Calibration refuses to start while the machine reports activity.
#[test]
fn calibration_refuses_when_busy() {
    let cfg = CoreConfig::default();
    let mut rig = common::plant_rig(cfg, PlantConfig::default());
    rig.harness.core_mut().on_busy_check(|| true);

    let mut lines: Vec<String> = Vec::new();
    let err = rig
        .harness
        .run_model_autotune(None, &mut |l| lines.push(l.to_string()))
        .expect_err("must refuse");
    assert!(err.to_string().contains("busy"));
    assert!(lines.iter().any(|l| l.contains("needs to be idle")));
}

//! Latched fault behavior at machine level.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempmgr_core::types::channel;
use tempmgr_core::{CoreConfig, FaultKind, FaultSource, HeaterId};

/// A thermistor pulled to its max-raw threshold (disconnect/short towards
/// the hot end of the scale) must latch a Max fault within one manager
/// tick: heaters off, fans full, recovery snapshot taken.
#[test]
fn max_raw_trips_within_one_tick() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);

    let stopped = Arc::new(AtomicBool::new(false));
    {
        let stopped = stopped.clone();
        rig.harness
            .core_mut()
            .on_stop(move || stopped.store(true, Ordering::Relaxed));
    }

    rig.harness
        .core_mut()
        .set_target_hotend(0, 210)
        .expect("hotend 0 exists");
    rig.harness.core_mut().set_fan_speed(80);
    rig.harness.pump(); // targets propagate, heating starts
    assert!(rig.harness.core().fault().is_none());

    // hotend 0 raw forced beyond the max threshold (NTC: towards zero)
    rig.adc.set_channel(channel::HOTEND0, 2);
    rig.harness.pump();

    let fault = rig.harness.core().fault().expect("fault latched");
    assert_eq!(fault.kind, FaultKind::Max);
    assert_eq!(fault.source, FaultSource::Hotend);
    assert!(fault.asserted);

    // invariant: any latched error forces zero duty everywhere
    assert_eq!(rig.harness.core().duty(HeaterId::Hotend(0)), 0);
    assert_eq!(rig.harness.core().duty(HeaterId::Bed), 0);
    assert_eq!(rig.harness.core().fan_speed(), 255, "cooling forced on");

    // recovery snapshot preserves what the user had asked for
    let rec = rig.harness.core().recovery().expect("snapshot");
    assert_eq!(rec.targets.hotend[0], 210);
    assert_eq!(rec.fan_speed, 80);

    assert!(rig.alerts.contains("Err: MAXTEMP"));
    assert!(stopped.load(Ordering::Relaxed), "halt hook invoked");
    assert!(rig.harness.core().is_stopped());
}

/// Target changes are refused downstream while a fault is present: the
/// ISR-visible mirror must stay zeroed no matter what the foreground asks.
#[test]
fn targets_do_not_propagate_while_latched() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);

    rig.adc.set_channel(channel::HOTEND0, 2);
    rig.harness.pump();
    assert!(rig.harness.core().fault_present());

    rig.harness
        .core_mut()
        .set_target_hotend(0, 250)
        .expect("hotend 0 exists");
    for _ in 0..5 {
        rig.harness.pump();
    }
    // heater must stay off: the foreground mirror may hold the wish, the
    // regulation path never sees it
    assert_eq!(rig.harness.core().duty(HeaterId::Hotend(0)), 0);
}

/// A later, lower-priority hit never downgrades the recorded fault; a
/// higher-priority one upgrades it.
#[test]
fn priority_upgrades_only() {
    let cfg = CoreConfig::default();
    let mut rig = common::scripted_rig(cfg);

    // min first (lower priority than max): cool the sensor to the min
    // threshold while commanding heat in a warm room
    rig.harness
        .core_mut()
        .set_target_hotend(0, 210)
        .expect("hotend 0 exists");
    rig.harness.pump();
    rig.set_hotend_c(-25.0);
    rig.harness.pump();
    let first = rig.harness.core().fault().expect("min latched");
    assert_eq!(first.kind, FaultKind::Min);

    // now a max condition on the same sensor: strictly higher priority
    rig.adc.set_channel(channel::HOTEND0, 2);
    rig.harness.pump();
    let upgraded = rig.harness.core().fault().expect("still latched");
    assert_eq!(upgraded.kind, FaultKind::Max);
}

#![allow(dead_code)]
//! Shared rigs for the scenario tests: a scripted-ADC machine for fault
//! injection and a closed-loop machine over the simulated plant.

use std::sync::Arc;

use tempmgr_core::mocks::{RecordingPwm, ScriptedAdc, SharedBeeper, SharedPin, VecAlerts};
use tempmgr_core::table::{default_ambient_table, default_bed_table, default_hotend_table, TempTable};
use tempmgr_core::types::{channel, OVERSAMPLES};
use tempmgr_core::{CoreConfig, FanDrive, Harness, Outputs, TempCore};
use tempmgr_hardware::sim::{Plant, PlantAdc, PlantChannel, PlantConfig, SimBeeper};
use tempmgr_traits::clock::test_clock::TestClock;
use tempmgr_traits::{Clock, HeaterPin};

pub struct ScriptedRig {
    pub harness: Harness,
    pub adc: ScriptedAdc,
    pub alerts: VecAlerts,
    pub beeper: SharedBeeper,
    pub bed_pwm: RecordingPwm,
    pub clock: TestClock,
    pub hotend_table: TempTable,
    pub bed_table: TempTable,
    pub ambient_table: TempTable,
}

impl ScriptedRig {
    pub fn set_hotend_c(&self, celsius: f32) {
        self.adc
            .set_celsius(channel::HOTEND0, &self.hotend_table, celsius);
    }

    pub fn set_bed_c(&self, celsius: f32) {
        self.adc.set_celsius(channel::BED, &self.bed_table, celsius);
    }

    pub fn set_ambient_c(&self, celsius: f32) {
        self.adc
            .set_celsius(channel::AMBIENT, &self.ambient_table, celsius);
    }
}

/// Machine fed by a scripted ADC; every sensor starts at 25 °C.
pub fn scripted_rig(cfg: CoreConfig) -> ScriptedRig {
    let clock = TestClock::new();
    let adc = ScriptedAdc::default();
    let alerts = VecAlerts::default();
    let beeper = SharedBeeper::default();
    let bed_pwm = RecordingPwm::default();

    let hotend_table = default_hotend_table();
    let bed_table = default_bed_table();
    let ambient_table = default_ambient_table();
    adc.set_celsius(channel::HOTEND0, &hotend_table, 25.0);
    adc.set_celsius(channel::HOTEND1, &hotend_table, 25.0);
    adc.set_celsius(channel::HOTEND2, &hotend_table, 25.0);
    adc.set_celsius(channel::BED, &bed_table, 25.0);
    adc.set_celsius(channel::AMBIENT, &ambient_table, 25.0);

    let hotend_pins: Vec<Box<dyn HeaterPin>> = (0..cfg.machine.hotend_count)
        .map(|_| Box::new(SharedPin::default()) as Box<dyn HeaterPin>)
        .collect();
    let outputs = Outputs {
        hotend_pins,
        bed_pwm: Box::new(bed_pwm.clone()),
        fan: FanDrive::SoftPwm(Box::new(SharedPin::default())),
        beeper: Box::new(beeper.clone()),
    };

    let core = TempCore::builder()
        .with_config(cfg)
        .with_adc(adc.clone())
        .with_outputs(outputs)
        .with_alerts(alerts.clone())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("core builds");

    ScriptedRig {
        harness: Harness::new(core),
        adc,
        alerts,
        beeper,
        bed_pwm,
        clock,
        hotend_table,
        bed_table,
        ambient_table,
    }
}

pub struct PlantRig {
    pub harness: Harness,
    pub plant: Plant,
    pub alerts: VecAlerts,
    pub clock: TestClock,
}

/// Closed-loop machine: PID → soft PWM → plant pins → plant ODE → ADC.
pub fn plant_rig(cfg: CoreConfig, plant_cfg: PlantConfig) -> PlantRig {
    let clock = TestClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let plant = Plant::new(plant_cfg, shared);
    let alerts = VecAlerts::default();

    let hotend_table = default_hotend_table();
    let bed_table = default_bed_table();
    let ambient_table = default_ambient_table();

    let curve = |t: TempTable| -> tempmgr_hardware::sim::Curve {
        Box::new(move |c: f32| t.raw_for(c) / OVERSAMPLES)
    };

    let mut adc = PlantAdc::new(&plant)
        .wire(channel::BED, PlantChannel::Bed, curve(bed_table.clone()))
        .wire_fixed(channel::AUX_VOLTAGE, 512);
    for e in 0..cfg.machine.hotend_count {
        adc = adc.wire(
            channel::HOTEND0 + e,
            PlantChannel::Hotend,
            curve(hotend_table.clone()),
        );
    }
    if cfg.machine.has_ambient {
        adc = adc.wire(
            channel::AMBIENT,
            PlantChannel::Ambient,
            curve(ambient_table.clone()),
        );
    }

    let hotend_pins: Vec<Box<dyn HeaterPin>> = (0..cfg.machine.hotend_count)
        .map(|_| Box::new(plant.heater_pin()) as Box<dyn HeaterPin>)
        .collect();
    let outputs = Outputs {
        hotend_pins,
        bed_pwm: Box::new(plant.bed_pwm()),
        fan: FanDrive::SoftPwm(Box::new(plant.fan_pin())),
        beeper: Box::new(SimBeeper::default()),
    };

    let core = TempCore::builder()
        .with_config(cfg)
        .with_adc(adc)
        .with_outputs(outputs)
        .with_alerts(alerts.clone())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("core builds");

    PlantRig {
        harness: Harness::new(core),
        plant,
        alerts,
        clock,
    }
}

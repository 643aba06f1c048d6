//! Machine assembly and command execution against the simulated plant.

use std::sync::Arc;

use tempmgr_core::error::Result;
use tempmgr_core::table::{default_ambient_table, default_bed_table, default_hotend_table, TempTable};
use tempmgr_core::types::{channel, OVERSAMPLES};
use tempmgr_core::{Conversion, CoreConfig, FanDrive, Harness, HeaterId, Outputs, TempCore};
use tempmgr_hardware::sim::{Plant, PlantAdc, PlantChannel, PlantConfig, SimBeeper};
use tempmgr_hardware::store::FileStore;
use tempmgr_traits::clock::test_clock::TestClock;
use tempmgr_traits::{AlertSeverity, AlertSink, Clock, HeaterPin, MonotonicClock};

use crate::cli::HeaterArg;

/// Alerts go straight to stderr, the way a status line would reach the LCD.
struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn post(&mut self, message: &str, severity: AlertSeverity) {
        match severity {
            AlertSeverity::Critical => eprintln!("!! {message}"),
            AlertSeverity::Info => eprintln!(".. {message}"),
        }
    }
}

fn curve_for(table: &TempTable) -> tempmgr_hardware::sim::Curve {
    let table = table.clone();
    Box::new(move |celsius: f32| table.raw_for(celsius) / OVERSAMPLES)
}

/// Build the simulated machine: plant, pins, ADC wiring and the core.
pub fn build_machine(
    core_cfg: CoreConfig,
    hotend_table: TempTable,
    accel: bool,
) -> Result<(Harness, Plant)> {
    let clock: Arc<dyn Clock + Send + Sync> = if accel {
        Arc::new(TestClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    };

    let plant = Plant::new(PlantConfig::default(), clock.clone());
    let bed_table = default_bed_table();
    let ambient_table = default_ambient_table();

    let mut adc = PlantAdc::new(&plant)
        .wire(channel::BED, PlantChannel::Bed, curve_for(&bed_table))
        .wire_fixed(channel::AUX_VOLTAGE, 512);
    for e in 0..core_cfg.machine.hotend_count {
        adc = adc.wire(
            channel::HOTEND0 + e,
            PlantChannel::Hotend,
            curve_for(&hotend_table),
        );
    }
    if core_cfg.machine.has_ambient {
        adc = adc.wire(
            channel::AMBIENT,
            PlantChannel::Ambient,
            curve_for(&ambient_table),
        );
    }
    if core_cfg.machine.has_probe {
        adc = adc.wire(channel::PROBE, PlantChannel::Probe, curve_for(&bed_table));
    }

    let hotend_pins: Vec<Box<dyn HeaterPin>> = (0..core_cfg.machine.hotend_count)
        .map(|_| Box::new(plant.heater_pin()) as Box<dyn HeaterPin>)
        .collect();
    let outputs = Outputs {
        hotend_pins,
        bed_pwm: Box::new(plant.bed_pwm()),
        fan: FanDrive::SoftPwm(Box::new(plant.fan_pin())),
        beeper: Box::new(SimBeeper::default()),
    };

    let hotend_tables = (0..core_cfg.machine.hotend_count)
        .map(|_| Conversion::Table(hotend_table.clone()))
        .collect();

    let core = TempCore::builder()
        .with_config(core_cfg)
        .with_adc(adc)
        .with_outputs(outputs)
        .with_alerts(ConsoleAlerts)
        .with_clock(Box::new(ClockHandle(clock)))
        .with_hotend_tables(hotend_tables)
        .with_bed_table(Conversion::Table(bed_table))
        .with_ambient_table(Conversion::Table(ambient_table))
        .build()?;

    Ok((Harness::new(core), plant))
}

/// Adapter so an `Arc<dyn Clock>` can be handed to the builder.
struct ClockHandle(Arc<dyn Clock + Send + Sync>);

impl Clock for ClockHandle {
    fn now(&self) -> std::time::Instant {
        self.0.now()
    }

    fn sleep(&self, d: std::time::Duration) {
        self.0.sleep(d);
    }
}

pub fn load_hotend_table(path: Option<&std::path::Path>) -> Result<TempTable> {
    match path {
        Some(p) => {
            let entries = tempmgr_config::load_table_csv(p)
                .map_err(|e| eyre::eyre!("reading table {}: {e}", p.display()))?;
            TempTable::new(entries).map_err(eyre::Report::new)
        }
        None => Ok(default_hotend_table()),
    }
}

pub fn heater_id(arg: HeaterArg) -> HeaterId {
    match arg {
        HeaterArg::Hotend0 => HeaterId::Hotend(0),
        HeaterArg::Hotend1 => HeaterId::Hotend(1),
        HeaterArg::Hotend2 => HeaterId::Hotend(2),
        HeaterArg::Bed => HeaterId::Bed,
    }
}

/// Heat to the requested set points, printing a report line roughly every
/// two seconds of machine time.
pub fn run_heat(
    harness: &mut Harness,
    hotend: Option<i16>,
    bed: Option<i16>,
    fan: u8,
    seconds: u64,
) -> Result<()> {
    if let Some(c) = hotend {
        harness.core_mut().set_target_hotend(0, c)?;
    }
    if let Some(c) = bed {
        harness.core_mut().set_target_bed(c);
    }
    harness.core_mut().set_fan_speed(fan);

    let deadline = harness.core().now_ms() + seconds * 1000;
    let mut next_report = 0u64;
    while harness.core().now_ms() < deadline {
        harness.pump();
        let now = harness.core().now_ms();
        if now >= next_report {
            println!("{}", harness.core().status_line());
            next_report = now + 2000;
        }
        if harness.core().fault_present() {
            let fault = harness.core().fault();
            return Err(eyre::Report::new(tempmgr_core::TempMgrError::FaultLatched(
                format!("{fault:?}"),
            )));
        }
    }
    harness.core_mut().disable_all_heaters();
    Ok(())
}

pub fn run_pid_autotune(
    harness: &mut Harness,
    heater: HeaterId,
    target: f32,
    cycles: i32,
) -> Result<()> {
    let result = harness.run_pid_autotune(heater, target, cycles, &mut |line| {
        println!("{line}");
    })?;
    tracing::info!(
        kp = result.kp,
        ki = result.ki,
        kd = result.kd,
        cycles = result.cycles,
        "autotune complete"
    );
    Ok(())
}

pub fn open_store(path: &std::path::Path) -> Result<FileStore> {
    FileStore::open(path).map_err(|e| eyre::eyre!("opening store {}: {e}", path.display()))
}

/// Parse a repeated `INDEX=VALUE` resistance argument.
pub fn parse_r_arg(s: &str) -> Result<(usize, f32)> {
    let (idx, val) = s
        .split_once('=')
        .ok_or_else(|| eyre::eyre!("expected INDEX=VALUE, got {s:?}"))?;
    Ok((idx.trim().parse()?, val.trim().parse()?))
}

//! The process-wide thermal core and its execution contexts.
//!
//! `TempCore` owns every piece of ISR-visible state. Three entry points map
//! the firmware's execution contexts onto host methods:
//!
//! - [`TempCore::soft_pwm_tick`], the high-rate PWM generator,
//! - [`TempCore::manager_tick`], the ~3.7 Hz regulation tick and sole writer
//!   of duty registers and model state,
//! - [`TempCore::manage_heater`], the cooperative foreground pass.
//!
//! Foreground mutation of ISR-visible data happens inside a scoped
//! [`MgrGuard`], which suspends the manager tick on entry and restores it on
//! every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use tempmgr_traits::{
    AdcBank, AlertSeverity, AlertSink, Clock, MonotonicClock, ParamStore, Watchdog,
};
use tracing::{error, info, warn};

use crate::config::{CoreConfig, PidGains};
use crate::error::{BuildError, Result, TempMgrError};
use crate::fault::{alert_token, Fault, FaultKind, FaultSource, FaultWord};
use crate::limits::{LimitGuard, LimitHit, MintempAlertAutomaton, RawLimits};
use crate::model::ModelObserver;
use crate::pid::{integral_max, BedBangBang, PidState};
use crate::pwm::{Outputs, SoftPwm};
use crate::runaway::{RunawayRecord, RunawaySettings};
use crate::sampler::Sampler;
use crate::table::{apply_bed_offset, default_ambient_table, default_bed_table,
    default_hotend_table, Conversion};
use crate::types::{
    DutyRegs, HeaterId, RawSnapshot, RecoverySnapshot, Targets, Temps, MAX_HOTENDS, PID_MAX,
};

/// Per-role conversion set, fixed at construction.
pub struct Tables {
    pub hotend: Vec<Conversion>,
    pub bed: Conversion,
    pub ambient: Conversion,
}

pub struct TempCore {
    cfg: CoreConfig,
    tables: Tables,

    // sampling / ISR-side state
    sampler: Sampler,
    raw: RawSnapshot,
    temps_isr: Temps,
    targets_isr: Targets,
    duties: DutyRegs,
    pid: [PidState; MAX_HOTENDS],
    bed_pid: PidState,
    bed_bang: BedBangBang,
    i_max_hotend: f32,
    i_max_bed: f32,
    runaway: [RunawayRecord; MAX_HOTENDS],
    runaway_bed: RunawayRecord,
    limit_guard: LimitGuard,
    model: ModelObserver,
    fault: FaultWord,

    // foreground mirrors and switches
    temps: Temps,
    targets: Targets,
    fan_speed: u8,
    snapshot_ready: bool,
    mgr_suspend: u32,
    tuning_active: bool,
    recovery: Option<RecoverySnapshot>,
    stopped: bool,

    // user-facing state
    automaton_hotend: MintempAlertAutomaton,
    automaton_bed: MintempAlertAutomaton,
    warn_first: bool,
    last_alert: Option<String>,

    // collaborators
    pwm: SoftPwm,
    outputs: Outputs,
    alerts: Box<dyn AlertSink>,
    watchdog: Option<Box<dyn Watchdog>>,
    stop_hook: Option<Box<dyn FnMut()>>,
    fan_service: Option<Box<dyn FnMut()>>,
    busy_check: Option<Box<dyn Fn() -> bool>>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

/// Scoped suspension of the manager tick. While any guard is alive,
/// `manager_tick` is a no-op, so foreground mutation of ISR-visible state
/// cannot interleave with regulation.
pub struct MgrGuard<'a> {
    core: &'a mut TempCore,
}

impl Deref for MgrGuard<'_> {
    type Target = TempCore;
    fn deref(&self) -> &TempCore {
        self.core
    }
}

impl DerefMut for MgrGuard<'_> {
    fn deref_mut(&mut self) -> &mut TempCore {
        self.core
    }
}

impl Drop for MgrGuard<'_> {
    fn drop(&mut self) {
        self.core.mgr_suspend -= 1;
    }
}

#[derive(Default)]
pub struct TempCoreBuilder {
    cfg: Option<CoreConfig>,
    adc: Option<Box<dyn AdcBank>>,
    outputs: Option<Outputs>,
    alerts: Option<Box<dyn AlertSink>>,
    watchdog: Option<Box<dyn Watchdog>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    hotend_tables: Option<Vec<Conversion>>,
    bed_table: Option<Conversion>,
    ambient_table: Option<Conversion>,
}

impl TempCoreBuilder {
    pub fn with_config(mut self, cfg: CoreConfig) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_adc(mut self, adc: impl AdcBank + 'static) -> Self {
        self.adc = Some(Box::new(adc));
        self
    }

    pub fn with_outputs(mut self, outputs: Outputs) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_alerts(mut self, alerts: impl AlertSink + 'static) -> Self {
        self.alerts = Some(Box::new(alerts));
        self
    }

    pub fn with_watchdog(mut self, wd: impl Watchdog + 'static) -> Self {
        self.watchdog = Some(Box::new(wd));
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_hotend_tables(mut self, tables: Vec<Conversion>) -> Self {
        self.hotend_tables = Some(tables);
        self
    }

    pub fn with_bed_table(mut self, table: Conversion) -> Self {
        self.bed_table = Some(table);
        self
    }

    pub fn with_ambient_table(mut self, table: Conversion) -> Self {
        self.ambient_table = Some(table);
        self
    }

    pub fn build(self) -> Result<TempCore> {
        let cfg = self.cfg.unwrap_or_default();
        cfg.validate().map_err(eyre::Report::new)?;

        let adc = self
            .adc
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAdc))?;
        let outputs = self
            .outputs
            .ok_or_else(|| eyre::Report::new(BuildError::MissingOutputs))?;
        let alerts = self
            .alerts
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAlerts))?;
        if outputs.hotend_pins.len() != cfg.machine.hotend_count {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "one heater pin per hotend required",
            )));
        }

        let hotend_tables = self.hotend_tables.unwrap_or_else(|| {
            (0..cfg.machine.hotend_count)
                .map(|_| Conversion::Table(default_hotend_table()))
                .collect()
        });
        if hotend_tables.len() != cfg.machine.hotend_count {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "one conversion table per hotend required",
            )));
        }
        let bed_table = self
            .bed_table
            .unwrap_or_else(|| Conversion::Table(default_bed_table()));
        let ambient_table = self
            .ambient_table
            .unwrap_or_else(|| Conversion::Table(default_ambient_table()));

        let raw_limits = RawLimits::compute(&cfg.limits, &hotend_tables, &bed_table, &ambient_table);
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        let sampler = Sampler::new(adc, &cfg.machine);
        let i_max_hotend = integral_max(cfg.pid.hotend.ki, cfg.pid.integral_drive_max);
        let i_max_bed = integral_max(cfg.pid.bed.ki, cfg.pid.integral_drive_max);
        let pwm = SoftPwm::new(cfg.machine.slow_pwm_heaters, cfg.machine.fan_soft_pwm_bits);
        let model = ModelObserver::new(&cfg.model);

        Ok(TempCore {
            tables: Tables {
                hotend: hotend_tables,
                bed: bed_table,
                ambient: ambient_table,
            },
            sampler,
            raw: RawSnapshot::default(),
            temps_isr: Temps::default(),
            targets_isr: Targets::default(),
            duties: DutyRegs::default(),
            pid: [PidState::new(), PidState::new(), PidState::new()],
            bed_pid: PidState::new(),
            bed_bang: BedBangBang::default(),
            i_max_hotend,
            i_max_bed,
            runaway: Default::default(),
            runaway_bed: RunawayRecord::default(),
            limit_guard: LimitGuard::new(raw_limits),
            model,
            fault: FaultWord::new(),
            temps: Temps::default(),
            targets: Targets::default(),
            fan_speed: 0,
            snapshot_ready: false,
            mgr_suspend: 0,
            tuning_active: false,
            recovery: None,
            stopped: false,
            automaton_hotend: MintempAlertAutomaton::new("MINTEMP HOTEND fixed"),
            automaton_bed: MintempAlertAutomaton::new("MINTEMP BED fixed"),
            warn_first: true,
            last_alert: None,
            pwm,
            outputs,
            alerts,
            watchdog: self.watchdog,
            stop_hook: None,
            fan_service: None,
            busy_check: None,
            clock,
            epoch,
            cfg,
        })
    }
}

impl TempCore {
    pub fn builder() -> TempCoreBuilder {
        TempCoreBuilder::default()
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        self.clock.clone()
    }

    /// Machine-wide halt hook, invoked when a latching fault fires.
    pub fn on_stop(&mut self, hook: impl FnMut() + 'static) {
        self.stop_hook = Some(Box::new(hook));
    }

    /// Foreground fan maintenance hook, polled once per manage pass.
    pub fn on_fan_service(&mut self, hook: impl FnMut() + 'static) {
        self.fan_service = Some(Box::new(hook));
    }

    /// Motion/printing probe; calibration refuses to start while it reports
    /// busy.
    pub fn on_busy_check(&mut self, hook: impl Fn() -> bool + 'static) {
        self.busy_check = Some(Box::new(hook));
    }

    pub fn is_busy(&self) -> bool {
        self.busy_check.as_ref().map(|f| f()).unwrap_or(false)
    }

    // ── execution contexts ─────────────────────────────────────────────

    /// High-rate soft-PWM tick; reads duty registers, writes heater pins.
    pub fn soft_pwm_tick(&mut self) {
        let fan = self.fan_speed;
        self.pwm.tick(&self.duties, fan, &mut self.outputs);
    }

    /// Temperature-manager tick. Acquires a coherent ADC snapshot, converts
    /// it, runs the detectors and the regulation and flags the foreground.
    /// Returns true when a tick actually ran.
    pub fn manager_tick(&mut self) -> bool {
        if self.mgr_suspend > 0 {
            return false;
        }
        if !self.sampler.acquire() {
            return false;
        }
        let Some(snap) = self.sampler.take() else {
            return false;
        };
        self.raw = snap;
        self.convert_isr_temps();

        // deassert first; detectors re-assert if their condition still holds
        self.fault.clear_assertion();
        self.check_temp_raw();
        self.check_runaway();
        if self.cfg.machine.has_model {
            self.model_check();
        }
        if !self.tuning_active {
            self.regulate();
        }
        self.snapshot_ready = true;
        true
    }

    /// Foreground pass; runs at most one unit of work per manager tick.
    pub fn manage_heater(&mut self) {
        if let Some(wd) = self.watchdog.as_mut() {
            wd.feed();
        }
        if !self.snapshot_ready {
            return;
        }
        self.update_temperatures();

        // warnings first, so they cannot mask the error handler below
        if self.model.warning_state.active {
            self.handle_model_warning();
        }
        if self.fault.any() {
            self.handle_fault();
        }
        if let Some(f) = self.fan_service.as_mut() {
            f();
        }
    }

    /// Scoped manager suspension for foreground critical sections.
    pub fn guard(&mut self) -> MgrGuard<'_> {
        self.mgr_suspend += 1;
        MgrGuard { core: self }
    }

    /// Drain the ISR snapshot into the foreground mirrors and propagate
    /// pending targets, but only while no error is present.
    fn update_temperatures(&mut self) {
        let mut g = self.guard();
        g.temps = g.temps_isr;
        if !g.fault.any() {
            g.targets_isr = g.targets;
        }
        g.snapshot_ready = false;
    }

    // ── conversion and detectors (manager context) ─────────────────────

    fn convert_isr_temps(&mut self) {
        for e in 0..self.cfg.machine.hotend_count {
            self.temps_isr.hotend[e] = self.tables.hotend[e].to_celsius(self.raw.hotend[e]);
        }
        let mut bed = self.tables.bed.to_celsius(self.raw.bed);
        if let Some(curve) = &self.cfg.machine.bed_offset {
            bed = apply_bed_offset(bed, curve);
        }
        self.temps_isr.bed = bed;
        if self.cfg.machine.has_ambient {
            self.temps_isr.ambient = self.tables.ambient.to_celsius(self.raw.ambient);
        }
        if self.cfg.machine.has_probe {
            // the probe shares the bed table, without the offset curve
            self.temps_isr.probe = self.tables.bed.to_celsius(self.raw.probe);
        }
    }

    fn check_temp_raw(&mut self) {
        let mut hits: Vec<LimitHit> = Vec::new();
        // order matters: the ambient value gating the min logic is only
        // trustworthy once max has been checked
        self.limit_guard.check_max(
            &self.cfg.machine,
            &self.raw,
            &self.tables.hotend,
            &self.tables.bed,
            &self.tables.ambient,
            |h| hits.push(h),
        );
        let now = self.now_ms();
        self.limit_guard.check_min(
            &self.cfg.machine,
            &self.cfg.limits,
            now,
            &self.raw,
            &self.temps_isr,
            &self.targets_isr.hotend,
            self.targets_isr.bed,
            &self.tables.hotend,
            &self.tables.bed,
            &self.tables.ambient,
            |h| hits.push(h),
        );
        for h in hits {
            self.raise_fault(h.source, h.index, h.kind);
        }
    }

    fn check_runaway(&mut self) {
        let now = self.now_ms();
        let mut raised: Vec<(FaultSource, u8, FaultKind)> = Vec::new();
        for e in 0..self.cfg.machine.hotend_count {
            let settings = RunawaySettings::hotend(
                self.cfg.runaway.hotend_hysteresis_c,
                self.cfg.runaway.hotend_timeout_s,
            );
            if let Some(kind) = self.runaway[e].check(
                &settings,
                now,
                f32::from(self.targets_isr.hotend[e]),
                self.temps_isr.hotend[e],
                self.duties.hotend[e],
            ) {
                raised.push((FaultSource::Hotend, e as u8, kind));
            }
        }
        let settings = RunawaySettings::bed(
            self.cfg.runaway.bed_hysteresis_c,
            self.cfg.runaway.bed_timeout_s,
        );
        if let Some(kind) = self.runaway_bed.check(
            &settings,
            now,
            f32::from(self.targets_isr.bed),
            self.temps_isr.bed,
            self.duties.bed,
        ) {
            raised.push((FaultSource::Bed, 0, kind));
        }
        for (source, index, kind) in raised {
            self.raise_fault(source, index, kind);
        }
    }

    fn model_check(&mut self) {
        if !self.model.enabled {
            return;
        }
        let heater_duty = self.duties.hotend[0];
        let fan_idx = self.fan_soft_index();
        let heater_temp = self.temps_isr.hotend[0];
        let ambient = self.temps_isr.ambient;
        let interval = self.cfg.timing.mgr_interval_s();

        // the first valid snapshot seeds the model
        if self.model.rt.uninitialized {
            self.model.rt.reset(
                &self.model.params,
                &self.cfg.model,
                interval,
                heater_duty,
                fan_idx,
                heater_temp,
                ambient,
            );
        }
        self.model.rt.step(
            &self.model.params,
            &self.cfg.model,
            heater_duty,
            fan_idx,
            heater_temp,
            ambient,
        );

        if self.model.rt.error {
            self.raise_fault(FaultSource::Hotend, 0, FaultKind::Model);
        }
        self.model.warning_state.asserted = self.model.rt.warning;
        if self.model.rt.warning {
            self.model.warning_state.active = true;
            self.model.warning_state.dt_err = self.model.rt.residual();
        }
    }

    /// Fan soft-PWM index used to pick the model's R entry.
    pub fn fan_soft_index(&self) -> usize {
        let bits = self.cfg.machine.fan_soft_pwm_bits;
        if bits > 0 {
            usize::from(self.fan_speed >> (8 - bits))
        } else {
            usize::from(self.fan_speed >> 4)
        }
    }

    fn regulate(&mut self) {
        for e in 0..self.cfg.machine.hotend_count {
            self.duties.hotend[e] = self.pid[e].update(
                &self.cfg.pid.hotend,
                self.cfg.pid.d_filter,
                self.i_max_hotend,
                PID_MAX,
                self.temps_isr.hotend[e],
                self.targets_isr.hotend[e],
                self.cfg.limits.hotend_max_c[e],
            );
        }
        let bed_duty = if self.cfg.machine.has_bed_pid {
            self.bed_pid.update(
                &self.cfg.pid.bed,
                self.cfg.pid.d_filter,
                self.i_max_bed,
                self.cfg.pid.max_bed_power,
                self.temps_isr.bed,
                self.targets_isr.bed,
                self.cfg.limits.bed_max_c,
            )
        } else {
            let now = self.now_ms();
            self.bed_bang.update(
                &self.cfg.pid,
                now,
                self.temps_isr.bed,
                self.targets_isr.bed,
                self.cfg.limits.bed_max_c,
            )
        };
        self.set_bed_duty(bed_duty);
    }

    fn set_bed_duty(&mut self, duty: u8) {
        self.duties.bed = duty;
        // the bed rides a slow hardware carrier instead of the soft-PWM pin
        self.outputs.bed_pwm.set_duty(duty << 1);
    }

    // ── fault machinery ────────────────────────────────────────────────

    /// Record a detector hit: snapshot recovery state on the first raise,
    /// force heaters off and fans on while asserted, latch with the
    /// priority rule.
    pub(crate) fn raise_fault(&mut self, source: FaultSource, index: u8, kind: FaultKind) {
        if !self.fault.present() {
            self.recovery = Some(RecoverySnapshot {
                targets: self.targets,
                fan_speed: self.fan_speed,
            });
        }
        self.disable_all_heaters();
        self.fan_speed = 255;
        if self.fault.raise(source, index, kind) {
            warn!(?source, index, ?kind, "thermal fault latched");
        }
    }

    /// Zero every target and duty and force all heater outputs inactive.
    pub fn disable_all_heaters(&mut self) {
        self.targets = Targets::default();
        self.targets_isr = Targets::default();
        self.duties = DutyRegs::default();
        self.outputs.all_heaters_off();
    }

    fn post_alert(&mut self, message: &str) {
        if self.last_alert.as_deref() == Some(message) {
            return;
        }
        self.alerts.post(message, AlertSeverity::Critical);
        self.last_alert = Some(message.to_string());
    }

    fn post_error_alert(&mut self, token: &'static str, index: Option<u8>) {
        self.post_alert(&format!("Err: {token}"));
        match index {
            Some(e) => error!(heater = e, "Heaters switched off. {token} triggered!"),
            None => error!("Heaters switched off. {token} triggered!"),
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            if let Some(hook) = self.stop_hook.as_mut() {
                hook();
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Foreground fault dispatch, one user-visible action per (kind, source).
    fn handle_fault(&mut self) {
        let Some(f) = self.fault.get() else {
            return;
        };
        match f.kind {
            FaultKind::Min => match f.source {
                FaultSource::Hotend => {
                    if f.asserted {
                        self.post_error_alert("MINTEMP", Some(f.index));
                        self.stop();
                    } else {
                        // no recovery: the automaton only tells the user the
                        // sensor reads sane again and a restart is required
                        let min = f32::from(self.cfg.limits.hotend_min_c[usize::from(f.index)])
                            + self.cfg.limits.hysteresis_c;
                        let cur = self.temps.hotend[usize::from(f.index)];
                        self.automaton_hotend.step(cur, min, self.alerts.as_mut());
                    }
                }
                FaultSource::Bed => {
                    if f.asserted {
                        self.post_error_alert("MINTEMP BED", None);
                        self.stop();
                    } else {
                        let min = f32::from(self.cfg.limits.bed_min_c) + self.cfg.limits.hysteresis_c;
                        let cur = self.temps.bed;
                        self.automaton_bed.step(cur, min, self.alerts.as_mut());
                    }
                }
                FaultSource::Ambient => {
                    self.post_error_alert("MINTEMP AMB", None);
                    self.stop();
                }
            },
            FaultKind::Max => {
                let token = alert_token(FaultKind::Max, f.source);
                let index = (f.source == FaultSource::Hotend).then_some(f.index);
                self.post_error_alert(token, index);
                self.stop();
            }
            FaultKind::Preheat | FaultKind::Runaway => {
                let token = alert_token(f.kind, f.source);
                self.post_alert(token);
                error!(source = ?f.source, index = f.index, "{token}");
                self.stop();
            }
            FaultKind::Model => {
                if f.asserted {
                    if !self.stopped {
                        self.post_alert("PAUSED THERMAL ERROR");
                        error!("TM: error triggered!");
                    }
                    self.stop();
                    self.outputs.beeper.set(true);
                } else {
                    // the model fault uniquely deasserts and clears, so a
                    // calibration drift does not force a restart
                    self.fault.clear();
                    self.outputs.beeper.set(false);
                    info!("TM: error cleared");
                }
            }
        }
    }

    fn handle_model_warning(&mut self) {
        let interval = self.cfg.timing.mgr_interval_s();
        let (asserted, dt_err) = {
            let g = self.guard();
            (g.model.warning_state.asserted, g.model.warning_state.dt_err)
        };
        let rate = dt_err / interval;
        warn!(
            residual_k_per_s = rate,
            warn = self.model.params.warn,
            "TM: anomaly |{:.3}|>{:.3}",
            rate,
            self.model.params.warn
        );
        if asserted {
            if self.warn_first {
                if self.model.warn_beep {
                    self.alerts.post("THERMAL ANOMALY", AlertSeverity::Info);
                    self.outputs.beeper.set(true);
                }
                self.warn_first = false;
            } else if self.model.warn_beep {
                self.outputs.beeper.toggle();
            }
        } else {
            self.model.warning_state.active = false;
            if self.model.warn_beep {
                self.outputs.beeper.set(false);
            }
            self.warn_first = true;
        }
    }

    // ── foreground API ─────────────────────────────────────────────────

    pub fn set_target_hotend(&mut self, e: usize, celsius: i16) -> Result<()> {
        if e >= self.cfg.machine.hotend_count {
            return Err(eyre::Report::new(TempMgrError::BadHeater(e as u8)));
        }
        let max = self.cfg.limits.hotend_max_c[e] - 15;
        let c = celsius.clamp(0, max);
        let mut g = self.guard();
        g.targets.hotend[e] = c;
        Ok(())
    }

    pub fn set_target_bed(&mut self, celsius: i16) {
        let max = self.cfg.limits.bed_max_c - 5;
        let c = celsius.clamp(0, max);
        let mut g = self.guard();
        g.targets.bed = c;
    }

    pub fn set_fan_speed(&mut self, speed: u8) {
        let mut g = self.guard();
        g.fan_speed = speed;
    }

    pub fn fan_speed(&self) -> u8 {
        self.fan_speed
    }

    pub fn temps(&self) -> Temps {
        self.temps
    }

    /// ISR-side temperatures of the current tick (used by the harness and
    /// the calibration recorder).
    pub fn temps_isr(&self) -> Temps {
        self.temps_isr
    }

    pub fn targets(&self) -> Targets {
        self.targets
    }

    pub fn raw(&self) -> RawSnapshot {
        self.raw
    }

    pub fn aux_voltage_raw(&self) -> u16 {
        self.raw.aux_voltage
    }

    /// Current duty register of a heater (`getHeaterPower`).
    pub fn duty(&self, heater: HeaterId) -> u8 {
        match heater {
            HeaterId::Hotend(e) => self.duties.hotend[usize::from(e)],
            HeaterId::Bed => self.duties.bed,
        }
    }

    pub fn is_any_hotend_on(&self) -> bool {
        (0..self.cfg.machine.hotend_count).any(|e| self.targets.hotend[e] != 0)
    }

    pub fn fault(&self) -> Option<Fault> {
        self.fault.get()
    }

    pub fn fault_present(&self) -> bool {
        self.fault.present()
    }

    pub fn recovery(&self) -> Option<RecoverySnapshot> {
        self.recovery
    }

    /// Operator-facing PID gain update (`M301` analogue); rescales the
    /// integral clamp.
    pub fn set_hotend_gains_user(&mut self, kp: f32, ki: f32, kd: f32) {
        let dt = self.cfg.timing.mgr_interval_s();
        let mut g = self.guard();
        g.cfg.pid.hotend = PidGains::from_user(kp, ki, kd, dt);
        g.i_max_hotend = integral_max(g.cfg.pid.hotend.ki, g.cfg.pid.integral_drive_max);
    }

    pub fn set_bed_gains_user(&mut self, kp: f32, ki: f32, kd: f32) {
        let dt = self.cfg.timing.mgr_interval_s();
        let mut g = self.guard();
        g.cfg.pid.bed = PidGains::from_user(kp, ki, kd, dt);
        g.i_max_bed = integral_max(g.cfg.pid.bed.ki, g.cfg.pid.integral_drive_max);
    }

    // ── tuning hooks ───────────────────────────────────────────────────

    /// Disable regulation so a tuner can drive duties directly. Heaters are
    /// switched off first.
    pub fn begin_tuning(&mut self) {
        self.disable_all_heaters();
        self.tuning_active = true;
    }

    pub fn end_tuning(&mut self) {
        self.tuning_active = false;
    }

    pub fn is_tuning(&self) -> bool {
        self.tuning_active
    }

    /// Write a duty register directly; only meaningful while tuning.
    pub fn force_duty(&mut self, heater: HeaterId, duty: u8) {
        match heater {
            HeaterId::Hotend(e) => {
                self.duties.hotend[usize::from(e)] = duty.min(crate::types::SOFT_PWM_MAX)
            }
            HeaterId::Bed => self.set_bed_duty(duty.min(crate::types::SOFT_PWM_MAX)),
        }
    }

    /// Show a requested tuning target on the operator surface without
    /// engaging regulation.
    pub fn display_target(&mut self, heater: HeaterId, celsius: i16) {
        match heater {
            HeaterId::Hotend(e) => self.targets.hotend[usize::from(e)] = celsius,
            HeaterId::Bed => self.targets.bed = celsius,
        }
    }

    // ── model parameter surface ────────────────────────────────────────

    pub fn model(&self) -> &ModelObserver {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut ModelObserver {
        &mut self.model
    }

    /// Enable or disable the observer; enabling fails (and reports) when
    /// the stored calibration is invalid.
    pub fn model_set_enabled(&mut self, enabled: bool) -> bool {
        {
            let mut g = self.guard();
            g.model.enabled = enabled;
            g.model.setup();
        }
        if enabled && !self.model.enabled {
            warn!("TM: invalid parameters, cannot enable");
        }
        self.model.enabled
    }

    pub fn model_set_warn_beep(&mut self, enabled: bool) {
        self.model.warn_beep = enabled;
    }

    /// Set scalar model parameters; NaN leaves a value untouched, negative
    /// values are rejected field-wise, and warn is capped at err.
    pub fn model_set_params(&mut self, c: f32, p: f32, ta_corr: f32, warn: f32, err: f32) {
        let mut g = self.guard();
        if c.is_finite() && c > 0.0 {
            g.model.params.c = c;
        }
        if p.is_finite() && p > 0.0 {
            g.model.params.p = p;
        }
        if ta_corr.is_finite() {
            g.model.params.ta_corr = ta_corr;
        }
        if err.is_finite() && err > 0.0 {
            g.model.params.err = err;
        }
        if warn.is_finite() && warn > 0.0 {
            g.model.params.warn = warn;
        }
        if g.model.params.warn > g.model.params.err {
            g.model.params.warn = g.model.params.err;
        }
        g.model.setup();
    }

    pub fn model_set_resistance(&mut self, index: usize, r: f32) {
        if index >= crate::types::MODEL_R_SIZE || !(r > 0.0) {
            return;
        }
        let mut g = self.guard();
        g.model.params.r[index] = r;
        g.model.setup();
    }

    pub fn model_reset(&mut self) {
        let mut g = self.guard();
        let cfg = g.cfg.model.clone();
        g.model.params = crate::model::ModelParams::defaults(&cfg);
        g.model.warn_beep = true;
        g.model.enabled = false;
        g.model.setup();
    }

    /// Multi-line settings report for the serial surface.
    pub fn model_report(&self) -> String {
        let mut out = String::from("TM: settings:\n");
        for (i, r) in self.model.params.r.iter().enumerate() {
            out.push_str(&format!("TM: R[{i}]:{r:.2}\n"));
        }
        out.push_str(&format!(
            "TM: P:{:.2} C:{:.2} Ta:{:.2} W:{:.3} E:{:.3} enabled:{} beep:{}\n",
            self.model.params.p,
            self.model.params.c,
            self.model.params.ta_corr,
            self.model.params.warn,
            self.model.params.err,
            u8::from(self.model.enabled),
            u8::from(self.model.warn_beep),
        ));
        out
    }

    pub fn model_save(&mut self, store: &mut dyn ParamStore) -> Result<()> {
        crate::store::save_model(&self.model, store)
    }

    pub fn model_load(&mut self, store: &mut dyn ParamStore) -> Result<()> {
        let cfg = self.cfg.model.clone();
        let mut g = self.guard();
        crate::store::load_model(g.model_mut(), &cfg, store)
    }

    /// Whether probe temperature compensation should be applied: an
    /// explicit stored override wins, otherwise the probe must read at
    /// least the given minimum.
    pub fn probe_compensation_enabled(
        &mut self,
        store: &mut dyn ParamStore,
        probe_min_c: f32,
    ) -> Result<bool> {
        match crate::store::load_probe_override(store)? {
            Some(0) => Ok(true),
            Some(_) => Ok(false),
            None => Ok(self.temps.probe >= probe_min_c),
        }
    }

    /// One-line temperature report for the serial surface.
    pub fn status_line(&self) -> String {
        crate::report::status_line(
            &self.temps,
            &self.targets,
            &self.duties,
            self.cfg.machine.hotend_count,
        )
    }

    /// Observable beeper level, for tests and the CLI surface.
    pub fn beeper_on(&self) -> bool {
        self.outputs.beeper.is_on()
    }
}

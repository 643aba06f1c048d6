//! `From` implementations bridging `tempmgr_config` types to core types.
//!
//! Operator-facing PID gains are rescaled into per-tick units here, so the
//! CLI never touches the internal representation.

use crate::config::{
    BedOffsetCurve, CoreConfig, LimitsCfg, MachineConfig, ModelCfg, PidCfg, PidGains, RunawayCfg,
    TimingCfg,
};
use crate::types::MAX_HOTENDS;

impl From<&tempmgr_config::BedOffset> for BedOffsetCurve {
    fn from(b: &tempmgr_config::BedOffset) -> Self {
        Self {
            offset: b.offset,
            centre: b.centre,
            start: b.start,
        }
    }
}

impl From<&tempmgr_config::Machine> for MachineConfig {
    fn from(m: &tempmgr_config::Machine) -> Self {
        Self {
            hotend_count: m.hotend_count,
            has_bed_pid: m.has_bed_pid,
            has_ambient: m.has_ambient,
            has_probe: m.has_probe,
            bed_offset: m.bed_offset.as_ref().map(BedOffsetCurve::from),
            slow_pwm_heaters: m.slow_pwm_heaters,
            fan_soft_pwm_bits: m.fan_soft_pwm_bits,
            has_watchdog: m.has_watchdog,
            has_model: m.has_model,
        }
    }
}

impl From<&tempmgr_config::Limits> for LimitsCfg {
    fn from(l: &tempmgr_config::Limits) -> Self {
        Self {
            hotend_min_c: [l.hotend_min_c; MAX_HOTENDS],
            hotend_max_c: [l.hotend_max_c; MAX_HOTENDS],
            bed_min_c: l.bed_min_c,
            bed_max_c: l.bed_max_c,
            ambient_min_c: l.ambient_min_c,
            ambient_max_c: l.ambient_max_c,
            hysteresis_c: l.hysteresis_c,
            heater_min_delay_ms: l.heater_min_delay_ms,
            bed_min_delay_ms: l.bed_min_delay_ms,
            min_ambient_c: l.min_ambient_c,
        }
    }
}

impl From<&tempmgr_config::Runaway> for RunawayCfg {
    fn from(r: &tempmgr_config::Runaway) -> Self {
        Self {
            hotend_hysteresis_c: r.hotend_hysteresis_c,
            hotend_timeout_s: r.hotend_timeout_s,
            bed_hysteresis_c: r.bed_hysteresis_c,
            bed_timeout_s: r.bed_timeout_s,
        }
    }
}

impl From<&tempmgr_config::Model> for ModelCfg {
    fn from(m: &tempmgr_config::Model) -> Self {
        Self {
            p: m.p,
            ta_corr: m.ta_corr,
            warn: m.warn,
            err: m.err,
            filter_s: m.filter_s,
            filter_e: m.filter_e,
        }
    }
}

impl From<&tempmgr_config::Sampling> for TimingCfg {
    fn from(s: &tempmgr_config::Sampling) -> Self {
        Self {
            mgr_interval_ms: s.mgr_interval_ms,
            pwm_hz: s.pwm_hz,
        }
    }
}

fn pid_cfg(p: &tempmgr_config::Pid, mgr_interval_s: f32) -> PidCfg {
    PidCfg {
        hotend: PidGains::from_user(p.kp, p.ki, p.kd, mgr_interval_s),
        bed: PidGains::from_user(p.bed_kp, p.bed_ki, p.bed_kd, mgr_interval_s),
        max_bed_power: p.max_bed_power,
        bed_bang_hysteresis: p.bed_hysteresis_c,
        bed_check_interval_ms: p.bed_check_interval_ms,
        ..PidCfg::default()
    }
}

impl From<&tempmgr_config::Config> for CoreConfig {
    fn from(c: &tempmgr_config::Config) -> Self {
        let timing = TimingCfg::from(&c.sampling);
        let pid = pid_cfg(&c.pid, timing.mgr_interval_s());
        Self {
            machine: MachineConfig::from(&c.machine),
            limits: LimitsCfg::from(&c.limits),
            pid,
            runaway: RunawayCfg::from(&c.runaway),
            model: ModelCfg::from(&c.model),
            timing,
            ..CoreConfig::default()
        }
    }
}

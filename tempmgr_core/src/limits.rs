//! Raw-domain temperature limits.
//!
//! Min/max checks run on raw counts, not converted temperatures, so a
//! corrupt or mis-assigned table cannot hide a disconnected or shorted
//! sensor. Max is checked before min each tick: the ambient reading used to
//! gate the min logic is only trustworthy once max has had its say.

use tempmgr_traits::{AlertSeverity, AlertSink};

use crate::config::{LimitsCfg, MachineConfig};
use crate::fault::{FaultKind, FaultSource};
use crate::table::Conversion;
use crate::types::{RawSnapshot, Temps, MAX_HOTENDS};

/// Raw thresholds precomputed from the user °C limits by inverting the
/// tables at startup.
#[derive(Debug, Clone)]
pub struct RawLimits {
    pub hotend_min: [u16; MAX_HOTENDS],
    pub hotend_max: [u16; MAX_HOTENDS],
    pub bed_min: u16,
    pub bed_max: u16,
    pub ambient_min: u16,
    pub ambient_max: u16,
    /// Raw value of `min_ambient_c`; rooms at or below it take the delayed
    /// min path.
    pub ambient_gate: u16,
}

impl RawLimits {
    pub fn compute(
        cfg: &LimitsCfg,
        hotend_tables: &[Conversion],
        bed_table: &Conversion,
        ambient_table: &Conversion,
    ) -> Self {
        let mut hotend_min = [0u16; MAX_HOTENDS];
        let mut hotend_max = [0u16; MAX_HOTENDS];
        for (e, t) in hotend_tables.iter().enumerate() {
            hotend_min[e] = t.min_raw_threshold(f32::from(cfg.hotend_min_c[e]));
            hotend_max[e] = t.max_raw_threshold(f32::from(cfg.hotend_max_c[e]));
        }
        Self {
            hotend_min,
            hotend_max,
            bed_min: bed_table.min_raw_threshold(f32::from(cfg.bed_min_c)),
            bed_max: bed_table.max_raw_threshold(f32::from(cfg.bed_max_c)),
            ambient_min: ambient_table.min_raw_threshold(f32::from(cfg.ambient_min_c)),
            ambient_max: ambient_table.max_raw_threshold(f32::from(cfg.ambient_max_c)),
            ambient_gate: ambient_table.raw_for(f32::from(cfg.min_ambient_c)),
        }
    }
}

/// Simple start/expire timer over the manager's millisecond clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayTimer {
    started_ms: Option<u64>,
}

impl DelayTimer {
    pub fn start(&mut self, now_ms: u64) {
        self.started_ms = Some(now_ms);
    }

    pub fn running(&self) -> bool {
        self.started_ms.is_some()
    }

    pub fn expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        match self.started_ms {
            Some(t0) => now_ms.saturating_sub(t0) >= timeout_ms,
            None => false,
        }
    }
}

/// Session state of the delayed min logic.
#[derive(Debug, Clone, Default)]
pub struct MinGuardState {
    checking_hotend: [bool; MAX_HOTENDS],
    checking_bed: bool,
    hotend_delay: [DelayTimer; MAX_HOTENDS],
    bed_delay: DelayTimer,
}

/// A limit violation found in the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitHit {
    pub source: FaultSource,
    pub index: u8,
    pub kind: FaultKind,
}

pub struct LimitGuard {
    pub raw: RawLimits,
    pub state: MinGuardState,
}

impl LimitGuard {
    pub fn new(raw: RawLimits) -> Self {
        Self {
            raw,
            state: MinGuardState::default(),
        }
    }

    /// Max checks, every sensor, unconditionally.
    #[allow(clippy::too_many_arguments)]
    pub fn check_max(
        &self,
        machine: &MachineConfig,
        snap: &RawSnapshot,
        hotend_tables: &[Conversion],
        bed_table: &Conversion,
        ambient_table: &Conversion,
        mut hit: impl FnMut(LimitHit),
    ) {
        for e in 0..machine.hotend_count {
            if hotend_tables[e].at_or_hotter(snap.hotend[e], self.raw.hotend_max[e]) {
                hit(LimitHit {
                    source: FaultSource::Hotend,
                    index: e as u8,
                    kind: FaultKind::Max,
                });
            }
        }
        if bed_table.at_or_hotter(snap.bed, self.raw.bed_max) {
            hit(LimitHit {
                source: FaultSource::Bed,
                index: 0,
                kind: FaultKind::Max,
            });
        }
        if machine.has_ambient && ambient_table.at_or_hotter(snap.ambient, self.raw.ambient_max) {
            hit(LimitHit {
                source: FaultSource::Ambient,
                index: 0,
                kind: FaultKind::Max,
            });
        }
    }

    /// Min checks with the ambient-aware gating.
    ///
    /// A cold room tolerates a cold start: while the room is at or below the
    /// ambient gate, a freshly switched-on heater gets a grace delay before
    /// its min check engages, cut short once the sensor has been seen above
    /// min + hysteresis this heating session. In a warm room the check is
    /// immediate.
    #[allow(clippy::too_many_arguments)]
    pub fn check_min(
        &mut self,
        machine: &MachineConfig,
        cfg: &LimitsCfg,
        now_ms: u64,
        snap: &RawSnapshot,
        temps: &Temps,
        targets_hotend: &[i16; MAX_HOTENDS],
        target_bed: i16,
        hotend_tables: &[Conversion],
        bed_table: &Conversion,
        ambient_table: &Conversion,
        mut hit: impl FnMut(LimitHit),
    ) {
        if machine.has_ambient
            && ambient_table.at_or_colder(snap.ambient, self.raw.ambient_min)
        {
            hit(LimitHit {
                source: FaultSource::Ambient,
                index: 0,
                kind: FaultKind::Min,
            });
        }

        let room_is_cold = !machine.has_ambient
            || ambient_table.at_or_colder(snap.ambient, self.raw.ambient_gate);

        if room_is_cold {
            for e in 0..machine.hotend_count {
                if targets_hotend[e] > cfg.hotend_min_c[e] {
                    self.state.checking_hotend[e] = self.state.checking_hotend[e]
                        || temps.hotend[e]
                            > f32::from(cfg.hotend_min_c[e]) + cfg.hysteresis_c;
                    if self.state.hotend_delay[e].expired(now_ms, cfg.heater_min_delay_ms)
                        || !self.state.hotend_delay[e].running()
                        || self.state.checking_hotend[e]
                    {
                        self.state.checking_hotend[e] = true;
                        if hotend_tables[e].at_or_colder(snap.hotend[e], self.raw.hotend_min[e]) {
                            hit(LimitHit {
                                source: FaultSource::Hotend,
                                index: e as u8,
                                kind: FaultKind::Min,
                            });
                        }
                    }
                } else {
                    self.state.hotend_delay[e].start(now_ms);
                    self.state.checking_hotend[e] = false;
                }
            }
            if target_bed > cfg.bed_min_c {
                self.state.checking_bed = self.state.checking_bed
                    || temps.bed > f32::from(cfg.bed_min_c) + cfg.hysteresis_c;
                if self.state.bed_delay.expired(now_ms, cfg.bed_min_delay_ms)
                    || !self.state.bed_delay.running()
                    || self.state.checking_bed
                {
                    self.state.checking_bed = true;
                    if bed_table.at_or_colder(snap.bed, self.raw.bed_min) {
                        hit(LimitHit {
                            source: FaultSource::Bed,
                            index: 0,
                            kind: FaultKind::Min,
                        });
                    }
                }
            } else {
                self.state.bed_delay.start(now_ms);
                self.state.checking_bed = false;
            }
        } else {
            for e in 0..machine.hotend_count {
                if hotend_tables[e].at_or_colder(snap.hotend[e], self.raw.hotend_min[e]) {
                    hit(LimitHit {
                        source: FaultSource::Hotend,
                        index: e as u8,
                        kind: FaultKind::Min,
                    });
                }
            }
            if bed_table.at_or_colder(snap.bed, self.raw.bed_min) {
                hit(LimitHit {
                    source: FaultSource::Bed,
                    index: 0,
                    kind: FaultKind::Min,
                });
            }
        }
    }
}

/// Display automaton shown once a latched MINTEMP sensor has risen back
/// above min + hysteresis: alternates the "fixed" message with a restart
/// request at a fifth of the foreground tick rate.
#[derive(Debug)]
pub struct MintempAlertAutomaton {
    fixed_message: &'static str,
    state: AutomatonState,
    repeat: u8,
}

const SPEED_DIV: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutomatonState {
    Init,
    TempAboveMintemp,
    ShowPleaseRestart,
    ShowMintemp,
}

impl MintempAlertAutomaton {
    pub fn new(fixed_message: &'static str) -> Self {
        Self {
            fixed_message,
            state: AutomatonState::Init,
            repeat: SPEED_DIV,
        }
    }

    fn substep(&mut self, next: AutomatonState) {
        if self.repeat == 0 {
            self.state = next;
            self.repeat = SPEED_DIV;
        } else {
            self.repeat -= 1;
        }
    }

    /// One foreground step while the (de-asserted) min fault is displayed.
    pub fn step(&mut self, current_temp: f32, mintemp: f32, alerts: &mut dyn AlertSink) {
        match self.state {
            AutomatonState::Init => {
                if current_temp > mintemp {
                    self.state = AutomatonState::TempAboveMintemp;
                }
                // below the hysteresis point the MINTEMP alert stays up
            }
            AutomatonState::TempAboveMintemp => {
                alerts.post(self.fixed_message, AlertSeverity::Critical);
                self.substep(AutomatonState::ShowMintemp);
            }
            AutomatonState::ShowPleaseRestart => {
                alerts.post("Please restart", AlertSeverity::Critical);
                self.substep(AutomatonState::ShowMintemp);
            }
            AutomatonState::ShowMintemp => {
                alerts.post(self.fixed_message, AlertSeverity::Critical);
                self.substep(AutomatonState::ShowPleaseRestart);
            }
        }
    }
}

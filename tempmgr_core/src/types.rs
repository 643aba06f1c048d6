//! Shared value types and fixed sizes of the thermal core.

/// Hard cap on hotend count; the ADC channel map and all per-heater arrays
/// are sized for this.
pub const MAX_HOTENDS: usize = 3;

/// ADC conversions accumulated per channel before a raw value is published.
/// Raw values are sums of this many 10-bit conversions, not averages.
pub const OVERSAMPLES: u16 = 16;

/// Largest possible oversampled raw count (10-bit ADC, 16 samples).
pub const RAW_MAX: u16 = 1023 * OVERSAMPLES;

/// Upper bound of the PID output range; duty registers hold half of it.
pub const PID_MAX: u8 = 255;

/// Upper bound of a soft-PWM duty register.
pub const SOFT_PWM_MAX: u8 = 127;

/// Number of fan-indexed thermal resistance entries in the model.
pub const MODEL_R_SIZE: usize = 16;

/// Length of the model's prediction lag ring buffer.
pub const MODEL_LAG_LEN: usize = 8;

/// Canonical ADC channel indices handed to `AdcBank::sample`.
pub mod channel {
    pub const HOTEND0: usize = 0;
    pub const HOTEND1: usize = 1;
    pub const HOTEND2: usize = 2;
    pub const BED: usize = 3;
    pub const AMBIENT: usize = 4;
    pub const PROBE: usize = 5;
    pub const AUX_VOLTAGE: usize = 6;
}

/// Identifies a heater output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaterId {
    Hotend(u8),
    Bed,
}

impl core::fmt::Display for HeaterId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HeaterId::Hotend(e) => write!(f, "hotend{e}"),
            HeaterId::Bed => write!(f, "bed"),
        }
    }
}

/// One coherent cycle of oversampled raw counts. All fields belong to the
/// same ADC cycle; partial updates are never published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSnapshot {
    pub hotend: [u16; MAX_HOTENDS],
    pub bed: u16,
    pub ambient: u16,
    pub probe: u16,
    pub aux_voltage: u16,
}

/// Calibrated temperatures in °C derived from one raw snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Temps {
    pub hotend: [f32; MAX_HOTENDS],
    pub bed: f32,
    pub ambient: f32,
    pub probe: f32,
}

/// Integer target temperatures, set from the foreground only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Targets {
    pub hotend: [i16; MAX_HOTENDS],
    pub bed: i16,
}

/// Soft-PWM duty registers, written only by the manager tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct DutyRegs {
    /// Hotend duties in [0, SOFT_PWM_MAX].
    pub hotend: [u8; MAX_HOTENDS],
    /// Bed duty in [0, SOFT_PWM_MAX]; mirrored (doubled) to the hardware
    /// carrier comparator.
    pub bed: u8,
}

/// Targets and fan speed captured when the first error latches, so the
/// front-end can offer resuming after an explicit clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySnapshot {
    pub targets: Targets,
    pub fan_speed: u8,
}

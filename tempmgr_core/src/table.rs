//! Raw-count to temperature conversion (and back, for raw-domain limits).
//!
//! Tables map oversampled ADC sums to °C with linear interpolation between
//! entries. NTC-style tables fall in temperature as raw rises; thermocouple
//! and PTC front-ends rise. Both directions are supported; within one table
//! the mapping is strictly monotonic.

use crate::config::BedOffsetCurve;
use crate::error::BuildError;
use crate::types::OVERSAMPLES;

/// An ordered sequence of `(raw, °C)` calibration points, sorted ascending
/// by raw.
#[derive(Debug, Clone)]
pub struct TempTable {
    entries: Vec<(u16, i16)>,
}

impl TempTable {
    pub fn new(entries: Vec<(u16, i16)>) -> Result<Self, BuildError> {
        if entries.len() < 2 {
            return Err(BuildError::InvalidTable("table needs at least 2 entries"));
        }
        let falling = entries[0].1 > entries[1].1;
        for w in entries.windows(2) {
            if w[1].0 <= w[0].0 {
                return Err(BuildError::InvalidTable("raw keys must strictly increase"));
            }
            let ok = if falling {
                w[1].1 < w[0].1
            } else {
                w[1].1 > w[0].1
            };
            if !ok {
                return Err(BuildError::InvalidTable(
                    "temperatures must be strictly monotonic",
                ));
            }
        }
        Ok(Self { entries })
    }

    /// True for NTC-style tables where temperature falls as raw rises.
    #[inline]
    pub fn falls_with_raw(&self) -> bool {
        self.entries[0].1 > self.entries[self.entries.len() - 1].1
    }

    pub fn entries(&self) -> &[(u16, i16)] {
        &self.entries
    }

    /// Convert an oversampled raw count to °C.
    ///
    /// Walks for the first entry whose raw key exceeds the input and
    /// interpolates over the straddling segment. Inputs beyond the last key
    /// saturate to the last entry; inputs below the first key extrapolate
    /// along the first segment.
    pub fn lookup(&self, raw: u16) -> f32 {
        for i in 1..self.entries.len() {
            let (r1, c1) = self.entries[i];
            if r1 > raw {
                let (r0, c0) = self.entries[i - 1];
                return f32::from(c0)
                    + (f32::from(raw) - f32::from(r0)) * f32::from(c1 - c0)
                        / (f32::from(r1) - f32::from(r0));
            }
        }
        f32::from(self.entries[self.entries.len() - 1].1)
    }

    /// Inverse of `lookup`, clamped to the table's raw span. Used by the
    /// simulated plant and by round-trip tests.
    pub fn raw_for(&self, celsius: f32) -> u16 {
        let first = self.entries[0];
        let last = self.entries[self.entries.len() - 1];
        let falling = self.falls_with_raw();
        let below_span = if falling {
            celsius >= f32::from(first.1)
        } else {
            celsius <= f32::from(first.1)
        };
        if below_span {
            return first.0;
        }
        for i in 1..self.entries.len() {
            let (r1, c1) = self.entries[i];
            let (r0, c0) = self.entries[i - 1];
            let inside = if falling {
                celsius >= f32::from(c1)
            } else {
                celsius <= f32::from(c1)
            };
            if inside {
                let f = (celsius - f32::from(c0)) / f32::from(c1 - c0);
                return (f32::from(r0) + f * (f32::from(r1) - f32::from(r0))).round() as u16;
            }
        }
        last.0
    }

    /// Precompute the raw threshold for a minimum temperature limit by
    /// stepping from the cold end of the scale in oversample-sized strides
    /// until the converted value reaches the limit.
    pub fn min_raw_threshold(&self, min_c: f32) -> u16 {
        let mut raw = self.cold_end_raw();
        while self.lookup(raw) < min_c {
            if raw == self.hot_end_raw() || raw == 0 {
                break;
            }
            raw = self.step_towards_hot(raw);
        }
        raw
    }

    /// Precompute the raw threshold for a maximum temperature limit by
    /// stepping from the hot end down until the converted value drops to it.
    pub fn max_raw_threshold(&self, max_c: f32) -> u16 {
        let mut raw = self.hot_end_raw();
        while self.lookup(raw) > max_c {
            if raw == self.cold_end_raw() {
                break;
            }
            raw = self.step_towards_cold(raw);
        }
        raw
    }

    /// Does `raw` indicate a temperature at or below the one `threshold`
    /// encodes? Direction-aware.
    #[inline]
    pub fn at_or_colder(&self, raw: u16, threshold: u16) -> bool {
        if self.falls_with_raw() {
            raw >= threshold
        } else {
            raw <= threshold
        }
    }

    /// Does `raw` indicate a temperature at or above the one `threshold`
    /// encodes? Direction-aware.
    #[inline]
    pub fn at_or_hotter(&self, raw: u16, threshold: u16) -> bool {
        if self.falls_with_raw() {
            raw <= threshold
        } else {
            raw >= threshold
        }
    }

    fn cold_end_raw(&self) -> u16 {
        if self.falls_with_raw() {
            self.entries[self.entries.len() - 1].0
        } else {
            self.entries[0].0
        }
    }

    fn hot_end_raw(&self) -> u16 {
        if self.falls_with_raw() {
            self.entries[0].0
        } else {
            self.entries[self.entries.len() - 1].0
        }
    }

    fn step_towards_hot(&self, raw: u16) -> u16 {
        if self.falls_with_raw() {
            raw.saturating_sub(OVERSAMPLES)
        } else {
            raw.saturating_add(OVERSAMPLES).min(self.entries[self.entries.len() - 1].0)
        }
    }

    fn step_towards_cold(&self, raw: u16) -> u16 {
        if self.falls_with_raw() {
            raw.saturating_add(OVERSAMPLES).min(self.entries[self.entries.len() - 1].0)
        } else {
            raw.saturating_sub(OVERSAMPLES).max(self.entries[0].0)
        }
    }
}

/// Conversion strategy of one sensor channel.
#[derive(Debug, Clone)]
pub enum Conversion {
    Table(TempTable),
    /// Analog amplifier front-end: °C = raw · k + offset.
    Amplifier { k: f32, offset: f32 },
}

impl Conversion {
    pub fn to_celsius(&self, raw: u16) -> f32 {
        match self {
            Conversion::Table(t) => t.lookup(raw),
            Conversion::Amplifier { k, offset } => f32::from(raw) * k + offset,
        }
    }

    pub fn table(&self) -> Option<&TempTable> {
        match self {
            Conversion::Table(t) => Some(t),
            Conversion::Amplifier { .. } => None,
        }
    }

    /// Temperature falls as raw rises (NTC); amplifier direction follows the
    /// sign of its gain.
    pub fn falls_with_raw(&self) -> bool {
        match self {
            Conversion::Table(t) => t.falls_with_raw(),
            Conversion::Amplifier { k, .. } => *k < 0.0,
        }
    }

    pub fn raw_for(&self, celsius: f32) -> u16 {
        match self {
            Conversion::Table(t) => t.raw_for(celsius),
            Conversion::Amplifier { k, offset } => {
                ((celsius - offset) / k).round().clamp(0.0, f32::from(u16::MAX)) as u16
            }
        }
    }

    pub fn min_raw_threshold(&self, min_c: f32) -> u16 {
        match self {
            Conversion::Table(t) => t.min_raw_threshold(min_c),
            Conversion::Amplifier { .. } => self.raw_for(min_c),
        }
    }

    pub fn max_raw_threshold(&self, max_c: f32) -> u16 {
        match self {
            Conversion::Table(t) => t.max_raw_threshold(max_c),
            Conversion::Amplifier { .. } => self.raw_for(max_c),
        }
    }

    #[inline]
    pub fn at_or_colder(&self, raw: u16, threshold: u16) -> bool {
        if self.falls_with_raw() {
            raw >= threshold
        } else {
            raw <= threshold
        }
    }

    #[inline]
    pub fn at_or_hotter(&self, raw: u16, threshold: u16) -> bool {
        if self.falls_with_raw() {
            raw <= threshold
        } else {
            raw >= threshold
        }
    }
}

/// Apply the bed's piecewise correction curve on top of a converted value.
pub fn apply_bed_offset(celsius: f32, curve: &BedOffsetCurve) -> f32 {
    let first_koef = (curve.offset / 2.0) / (curve.centre - curve.start);
    let second_koef = (curve.offset / 2.0) / (100.0 - curve.centre);
    if celsius >= curve.start && celsius <= curve.centre {
        celsius + first_koef * (celsius - curve.start)
    } else if celsius > curve.centre && celsius <= 100.0 {
        celsius
            + first_koef * (curve.centre - curve.start)
            + second_koef * (celsius - (100.0 - curve.centre))
    } else if celsius > 100.0 {
        celsius + curve.offset
    } else {
        celsius
    }
}

/// Built-in hotend thermistor table (100k NTC behind a 4.7k pull-up,
/// oversampled sums).
fn builtin(entries: Vec<(u16, i16)>) -> TempTable {
    TempTable { entries }
}

pub fn default_hotend_table() -> TempTable {
    builtin(vec![
        (16, 310),
        (64, 290),
        (128, 270),
        (240, 250),
        (400, 230),
        (640, 210),
        (960, 190),
        (1360, 170),
        (1920, 150),
        (2624, 130),
        (3488, 110),
        (4512, 95),
        (5696, 80),
        (7040, 65),
        (8448, 55),
        (9920, 45),
        (11392, 35),
        (12736, 25),
        (13888, 15),
        (14848, 5),
        (15616, -5),
        (16160, -15),
        (16368, -30),
    ])
}

/// Built-in bed thermistor table.
pub fn default_bed_table() -> TempTable {
    builtin(vec![
        (128, 150),
        (640, 120),
        (1600, 100),
        (3200, 80),
        (5440, 60),
        (8320, 45),
        (10880, 30),
        (12416, 25),
        (13120, 20),
        (14656, 10),
        (15616, 0),
        (16256, -10),
        (16368, -20),
    ])
}

/// Built-in ambient thermistor table.
pub fn default_ambient_table() -> TempTable {
    builtin(vec![
        (256, 100),
        (1024, 80),
        (2560, 60),
        (4864, 45),
        (7680, 30),
        (9984, 20),
        (11776, 10),
        (13312, 0),
        (14592, -10),
        (15552, -20),
        (16160, -30),
        (16368, -40),
    ])
}

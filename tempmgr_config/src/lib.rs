use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BedOffset {
    pub offset: f32,
    pub centre: f32,
    pub start: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Machine {
    pub hotend_count: usize,
    pub has_bed_pid: bool,
    pub has_ambient: bool,
    pub has_probe: bool,
    pub bed_offset: Option<BedOffset>,
    pub slow_pwm_heaters: bool,
    pub fan_soft_pwm_bits: u8,
    pub has_watchdog: bool,
    pub has_model: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            hotend_count: 1,
            has_bed_pid: true,
            has_ambient: true,
            has_probe: false,
            bed_offset: None,
            slow_pwm_heaters: false,
            fan_soft_pwm_bits: 4,
            has_watchdog: false,
            has_model: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub hotend_min_c: i16,
    pub hotend_max_c: i16,
    pub bed_min_c: i16,
    pub bed_max_c: i16,
    pub ambient_min_c: i16,
    pub ambient_max_c: i16,
    pub hysteresis_c: f32,
    pub heater_min_delay_ms: u64,
    pub bed_min_delay_ms: u64,
    pub min_ambient_c: i16,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            hotend_min_c: 10,
            hotend_max_c: 305,
            bed_min_c: 10,
            bed_max_c: 150,
            ambient_min_c: -30,
            ambient_max_c: 100,
            hysteresis_c: 3.0,
            heater_min_delay_ms: 15_000,
            bed_min_delay_ms: 50_000,
            min_ambient_c: 10,
        }
    }
}

/// PID gains in operator-facing units (Ki per second, Kd seconds).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pid {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub bed_kp: f32,
    pub bed_ki: f32,
    pub bed_kd: f32,
    pub max_bed_power: u8,
    pub bed_hysteresis_c: Option<f32>,
    pub bed_check_interval_ms: u64,
}

impl Default for Pid {
    fn default() -> Self {
        Self {
            kp: 16.13,
            ki: 1.16,
            kd: 56.23,
            bed_kp: 126.13,
            bed_ki: 4.30,
            bed_kd: 249.7,
            max_bed_power: 255,
            bed_hysteresis_c: Some(2.0),
            bed_check_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Runaway {
    pub hotend_hysteresis_c: f32,
    pub hotend_timeout_s: u16,
    pub bed_hysteresis_c: f32,
    pub bed_timeout_s: u16,
}

impl Default for Runaway {
    fn default() -> Self {
        Self {
            hotend_hysteresis_c: 15.0,
            hotend_timeout_s: 45,
            bed_hysteresis_c: 2.0,
            bed_timeout_s: 360,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Model {
    pub p: f32,
    pub ta_corr: f32,
    pub warn: f32,
    pub err: f32,
    pub filter_s: f32,
    pub filter_e: f32,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            p: 40.0,
            ta_corr: -7.0,
            warn: 1.2,
            err: 1.74,
            filter_s: 0.065,
            filter_e: 0.05,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub mgr_interval_ms: u64,
    pub pwm_hz: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            mgr_interval_ms: 270,
            pwm_hz: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    /// Path to a .log file (JSON lines); console-only when unset.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub machine: Machine,
    pub limits: Limits,
    pub pid: Pid,
    pub runaway: Runaway,
    pub model: Model,
    pub sampling: Sampling,
    pub logging: Logging,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine.hotend_count == 0 || self.machine.hotend_count > 3 {
            return Err(ConfigError::Invalid("hotend_count must be 1..=3"));
        }
        if self.machine.fan_soft_pwm_bits > 8 {
            return Err(ConfigError::Invalid("fan_soft_pwm_bits must be 0..=8"));
        }
        if self.limits.hotend_min_c >= self.limits.hotend_max_c {
            return Err(ConfigError::Invalid("hotend min must be below max"));
        }
        if self.limits.bed_min_c >= self.limits.bed_max_c {
            return Err(ConfigError::Invalid("bed min must be below max"));
        }
        if !(self.limits.hysteresis_c >= 0.0) {
            return Err(ConfigError::Invalid("hysteresis_c must be >= 0"));
        }
        if self.sampling.mgr_interval_ms == 0 {
            return Err(ConfigError::Invalid("mgr_interval_ms must be > 0"));
        }
        if self.sampling.pwm_hz == 0 {
            return Err(ConfigError::Invalid("pwm_hz must be > 0"));
        }
        if let Some(h) = self.pid.bed_hysteresis_c {
            if !(h >= 0.0) {
                return Err(ConfigError::Invalid("bed_hysteresis_c must be >= 0"));
            }
        }
        if !(self.model.warn > 0.0) || !(self.model.err > 0.0) {
            return Err(ConfigError::Invalid("model thresholds must be > 0"));
        }
        if let Some(b) = self.machine.bed_offset {
            if b.centre <= b.start {
                return Err(ConfigError::Invalid("bed_offset centre must exceed start"));
            }
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Load a temperature lookup table from CSV with the strict header
/// `raw,celsius`; rows are oversampled raw sums and integer °C.
pub fn load_table_csv(path: &std::path::Path) -> std::io::Result<Vec<(u16, i16)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    {
        let headers = rdr.headers()?;
        if headers.len() != 2 || &headers[0] != "raw" || &headers[1] != "celsius" {
            return Err(std::io::ErrorKind::InvalidData.into());
        }
    }
    let mut out = Vec::new();
    for rec in rdr.deserialize::<(String, String)>() {
        let (raw, celsius) = rec?;
        let raw = raw
            .trim()
            .parse::<u16>()
            .map_err(|_| std::io::ErrorKind::InvalidData)?;
        let celsius = celsius
            .trim()
            .parse::<i16>()
            .map_err(|_| std::io::ErrorKind::InvalidData)?;
        out.push((raw, celsius));
    }
    if out.len() < 2 {
        return Err(std::io::ErrorKind::InvalidData.into());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = load_toml("").expect("parses");
        assert_eq!(cfg.machine.hotend_count, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cfg = load_toml("[machine]\nhotend_count = 5\n").expect("parses");
        assert!(cfg.validate().is_err());

        let cfg = load_toml("[limits]\nhotend_min_c = 400\n").expect("parses");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_a_full_section_set() {
        let cfg = load_toml(
            r#"
[machine]
hotend_count = 2
has_bed_pid = false
fan_soft_pwm_bits = 4
bed_offset = { offset = 10.0, centre = 40.0, start = 10.0 }

[pid]
kp = 20.0
ki = 1.5
kd = 60.0

[runaway]
hotend_timeout_s = 45

[logging]
level = "debug"
"#,
        )
        .expect("parses");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.machine.hotend_count, 2);
        assert!(!cfg.machine.has_bed_pid);
        assert_eq!(cfg.pid.kp, 20.0);
        assert_eq!(cfg.logging.level.as_deref(), Some("debug"));
    }
}

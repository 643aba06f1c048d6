//! First-order thermal plant simulation.
//!
//! Each heated element follows `C·dT/dt = P·u − (T − Ta)/R`, integrated
//! exactly (exponential segments) between output edges against the shared
//! clock. The hotend's resistance switches with the fan line, the bed rides
//! its hardware PWM duty, and the ADC maps element temperatures back to
//! per-conversion counts through caller-supplied curves, so the control
//! loop is closed the same way it is on a printer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tempmgr_traits::{AdcBank, Beeper, Clock, HeaterPin, HwResult, PwmChannel};

/// One heated element of the plant.
#[derive(Debug, Clone, Copy)]
pub struct ElementCfg {
    /// Heater power at full drive (W).
    pub p_w: f32,
    /// Heat capacity (J/K).
    pub c_j_per_k: f32,
    /// Thermal resistance to ambient, fan off (K/W).
    pub r_still: f32,
    /// Thermal resistance with the fan at full speed (K/W).
    pub r_full_fan: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct PlantConfig {
    pub ambient_c: f32,
    pub hotend: ElementCfg,
    pub bed: ElementCfg,
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            ambient_c: 25.0,
            hotend: ElementCfg {
                p_w: 40.0,
                c_j_per_k: 12.0,
                r_still: 20.0,
                r_full_fan: 7.0,
            },
            bed: ElementCfg {
                p_w: 220.0,
                c_j_per_k: 900.0,
                r_still: 1.4,
                r_full_fan: 1.4,
            },
        }
    }
}

struct PlantState {
    cfg: PlantConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    last_s: f64,
    hotend_t: f32,
    bed_t: f32,
    hotend_on: bool,
    bed_duty: u8,
    fan_on: bool,
}

impl PlantState {
    fn now_s(&self) -> f64 {
        self.clock
            .now()
            .saturating_duration_since(self.epoch)
            .as_secs_f64()
    }

    fn integrate_to_now(&mut self) {
        let now = self.now_s();
        let dt = (now - self.last_s) as f32;
        if dt <= 0.0 {
            return;
        }
        self.last_s = now;

        let ambient = self.cfg.ambient_c;

        let e = self.cfg.hotend;
        let r = if self.fan_on { e.r_full_fan } else { e.r_still };
        let u = if self.hotend_on { 1.0 } else { 0.0 };
        self.hotend_t = settle(self.hotend_t, ambient + e.p_w * u * r, r * e.c_j_per_k, dt);

        let e = self.cfg.bed;
        let u = f32::from(self.bed_duty) / 255.0;
        self.bed_t = settle(self.bed_t, ambient + e.p_w * u * e.r_still, e.r_still * e.c_j_per_k, dt);
    }
}

/// Exact step of the linear element towards its equilibrium.
fn settle(t: f32, t_eq: f32, tau_s: f32, dt_s: f32) -> f32 {
    t_eq + (t - t_eq) * (-dt_s / tau_s).exp()
}

/// Shared plant handle; clones observe and drive the same state.
#[derive(Clone)]
pub struct Plant {
    inner: Arc<Mutex<PlantState>>,
}

impl Plant {
    pub fn new(cfg: PlantConfig, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        let ambient = cfg.ambient_c;
        Self {
            inner: Arc::new(Mutex::new(PlantState {
                cfg,
                clock,
                epoch,
                last_s: 0.0,
                hotend_t: ambient,
                bed_t: ambient,
                hotend_on: false,
                bed_duty: 0,
                fan_on: false,
            })),
        }
    }

    pub fn hotend_temp(&self) -> f32 {
        let mut g = self.lock();
        g.integrate_to_now();
        g.hotend_t
    }

    pub fn bed_temp(&self) -> f32 {
        let mut g = self.lock();
        g.integrate_to_now();
        g.bed_t
    }

    pub fn ambient_temp(&self) -> f32 {
        self.lock().cfg.ambient_c
    }

    pub fn heater_pin(&self) -> PlantHeaterPin {
        PlantHeaterPin {
            plant: self.clone(),
        }
    }

    pub fn bed_pwm(&self) -> PlantBedPwm {
        PlantBedPwm {
            plant: self.clone(),
        }
    }

    pub fn fan_pin(&self) -> PlantFanPin {
        PlantFanPin {
            plant: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlantState> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Hotend heater output; edges integrate the plant first so duty fractions
/// are honored exactly.
pub struct PlantHeaterPin {
    plant: Plant,
}

impl HeaterPin for PlantHeaterPin {
    fn set_high(&mut self) {
        let mut g = self.plant.lock();
        g.integrate_to_now();
        g.hotend_on = true;
    }

    fn set_low(&mut self) {
        let mut g = self.plant.lock();
        g.integrate_to_now();
        g.hotend_on = false;
    }

    fn is_high(&self) -> bool {
        self.plant.lock().hotend_on
    }
}

/// Bed carrier; the comparator duty is treated as a continuous power
/// fraction, like the slow hardware PWM it stands for.
pub struct PlantBedPwm {
    plant: Plant,
}

impl PwmChannel for PlantBedPwm {
    fn set_duty(&mut self, duty: u8) {
        let mut g = self.plant.lock();
        g.integrate_to_now();
        g.bed_duty = duty;
    }

    fn duty(&self) -> u8 {
        self.plant.lock().bed_duty
    }
}

/// Fan line; switches the hotend's thermal resistance.
pub struct PlantFanPin {
    plant: Plant,
}

impl HeaterPin for PlantFanPin {
    fn set_high(&mut self) {
        let mut g = self.plant.lock();
        g.integrate_to_now();
        g.fan_on = true;
    }

    fn set_low(&mut self) {
        let mut g = self.plant.lock();
        g.integrate_to_now();
        g.fan_on = false;
    }

    fn is_high(&self) -> bool {
        self.plant.lock().fan_on
    }
}

/// Which plant quantity an ADC channel reads.
pub enum PlantChannel {
    Hotend,
    Bed,
    /// Room temperature (constant).
    Ambient,
    /// Probe sensor, thermally tied to ambient here.
    Probe,
    /// Fixed raw count, e.g. a voltage rail divider.
    FixedRaw(u16),
}

/// °C to a single 10-bit conversion count (not the oversampled sum).
pub type Curve = Box<dyn Fn(f32) -> u16 + Send>;

/// ADC front-end over the plant.
pub struct PlantAdc {
    plant: Plant,
    channels: HashMap<usize, (PlantChannel, Option<Curve>)>,
}

impl PlantAdc {
    pub fn new(plant: &Plant) -> Self {
        Self {
            plant: plant.clone(),
            channels: HashMap::new(),
        }
    }

    /// Wire an ADC channel index to a plant quantity through a conversion
    /// curve.
    pub fn wire(mut self, channel: usize, source: PlantChannel, curve: Curve) -> Self {
        self.channels.insert(channel, (source, Some(curve)));
        self
    }

    pub fn wire_fixed(mut self, channel: usize, raw: u16) -> Self {
        self.channels.insert(channel, (PlantChannel::FixedRaw(raw), None));
        self
    }
}

impl AdcBank for PlantAdc {
    fn sample(&mut self, channel: usize) -> HwResult<u16> {
        let Some((source, curve)) = self.channels.get(&channel) else {
            return Err(format!("adc channel {channel} not wired").into());
        };
        let celsius = match source {
            PlantChannel::Hotend => self.plant.hotend_temp(),
            PlantChannel::Bed => self.plant.bed_temp(),
            PlantChannel::Ambient | PlantChannel::Probe => self.plant.ambient_temp(),
            PlantChannel::FixedRaw(raw) => return Ok(*raw),
        };
        match curve {
            Some(c) => Ok(c(celsius).min(1023)),
            None => Err(format!("adc channel {channel} has no curve").into()),
        }
    }
}

/// Beeper that just records its level.
#[derive(Debug, Default)]
pub struct SimBeeper {
    on: bool,
}

impl Beeper for SimBeeper {
    fn set(&mut self, on: bool) {
        self.on = on;
    }

    fn toggle(&mut self) {
        self.on = !self.on;
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

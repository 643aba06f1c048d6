#![allow(clippy::unwrap_used)]
//! Scripted and recording test doubles for the hardware seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tempmgr_traits::{AdcBank, AlertSeverity, AlertSink, Beeper, HeaterPin, ParamStore, PwmChannel};

use crate::table::TempTable;
use crate::types::OVERSAMPLES;

/// ADC whose per-channel conversions are set by the test. Clones share
/// state, so a handle kept by the test can steer a bank owned by the core.
#[derive(Clone, Default)]
pub struct ScriptedAdc {
    inner: Arc<Mutex<ScriptInner>>,
}

#[derive(Default)]
struct ScriptInner {
    values: HashMap<usize, u16>,
    default: u16,
    failures: HashMap<usize, u32>,
}

impl ScriptedAdc {
    /// Every channel reads `v` per conversion until overridden.
    pub fn constant(v: u16) -> Self {
        let adc = Self::default();
        adc.inner.lock().unwrap().default = v;
        adc
    }

    /// Set one channel's per-conversion count.
    pub fn set_channel(&self, channel: usize, v: u16) {
        self.inner.lock().unwrap().values.insert(channel, v.min(1023));
    }

    /// Set one channel so the oversampled sum converts to roughly `celsius`
    /// through `table`.
    pub fn set_celsius(&self, channel: usize, table: &TempTable, celsius: f32) {
        let per_sample = table.raw_for(celsius) / OVERSAMPLES;
        self.set_channel(channel, per_sample);
    }

    /// Make the next `times` conversions on `channel` fail.
    pub fn fail_channel(&self, channel: usize, times: u32) {
        self.inner.lock().unwrap().failures.insert(channel, times);
    }
}

impl AdcBank for ScriptedAdc {
    fn sample(&mut self, channel: usize) -> tempmgr_traits::HwResult<u16> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(n) = inner.failures.get_mut(&channel) {
            if *n > 0 {
                *n -= 1;
                return Err(format!("adc channel {channel} conversion failed").into());
            }
        }
        Ok(*inner.values.get(&channel).unwrap_or(&inner.default))
    }
}

/// Pin that tracks its level and the number of transitions.
#[derive(Debug, Default)]
pub struct CountingPin {
    high: bool,
    pub transitions: u32,
}

impl HeaterPin for CountingPin {
    fn set_high(&mut self) {
        if !self.high {
            self.transitions += 1;
        }
        self.high = true;
    }

    fn set_low(&mut self) {
        if self.high {
            self.transitions += 1;
        }
        self.high = false;
    }

    fn is_high(&self) -> bool {
        self.high
    }
}

/// Pin whose level is visible through cloned probes.
#[derive(Debug, Clone, Default)]
pub struct SharedPin {
    state: Arc<AtomicBool>,
}

impl SharedPin {
    pub fn probe(&self) -> SharedPin {
        self.clone()
    }

    pub fn level(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }
}

impl HeaterPin for SharedPin {
    fn set_high(&mut self) {
        self.state.store(true, Ordering::Relaxed);
    }

    fn set_low(&mut self) {
        self.state.store(false, Ordering::Relaxed);
    }

    fn is_high(&self) -> bool {
        self.level()
    }
}

/// PWM channel recording every write; clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingPwm {
    inner: Arc<Mutex<(u8, Vec<u8>)>>,
}

impl RecordingPwm {
    pub fn current(&self) -> u8 {
        self.inner.lock().unwrap().0
    }

    pub fn writes(&self) -> Vec<u8> {
        self.inner.lock().unwrap().1.clone()
    }
}

impl PwmChannel for RecordingPwm {
    fn set_duty(&mut self, duty: u8) {
        let mut g = self.inner.lock().unwrap();
        g.0 = duty;
        g.1.push(duty);
    }

    fn duty(&self) -> u8 {
        self.current()
    }
}

/// Beeper with observable level and toggle count.
#[derive(Debug, Clone, Default)]
pub struct SharedBeeper {
    inner: Arc<Mutex<(bool, u32)>>,
}

impl SharedBeeper {
    pub fn level(&self) -> bool {
        self.inner.lock().unwrap().0
    }

    pub fn toggles(&self) -> u32 {
        self.inner.lock().unwrap().1
    }
}

impl Beeper for SharedBeeper {
    fn set(&mut self, on: bool) {
        self.inner.lock().unwrap().0 = on;
    }

    fn toggle(&mut self) {
        let mut g = self.inner.lock().unwrap();
        g.0 = !g.0;
        g.1 += 1;
    }

    fn is_on(&self) -> bool {
        self.level()
    }
}

/// Beeper that swallows everything.
#[derive(Debug, Default)]
pub struct NullBeeper;

impl Beeper for NullBeeper {
    fn set(&mut self, _on: bool) {}
    fn toggle(&mut self) {}
    fn is_on(&self) -> bool {
        false
    }
}

/// Alert sink collecting messages; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct VecAlerts {
    inner: Arc<Mutex<Vec<(String, AlertSeverity)>>>,
}

impl VecAlerts {
    pub fn messages(&self) -> Vec<(String, AlertSeverity)> {
        self.inner.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .any(|(m, _)| m.contains(needle))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl AlertSink for VecAlerts {
    fn post(&mut self, message: &str, severity: AlertSeverity) {
        self.inner
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}

/// In-memory parameter store.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ParamStore for MemStore {
    fn load_f32(&mut self, key: &str) -> tempmgr_traits::HwResult<Option<f32>> {
        Ok(self.inner.lock().unwrap().get(key).and_then(|b| {
            let arr: [u8; 4] = b.as_slice().try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        }))
    }

    fn store_f32(&mut self, key: &str, value: f32) -> tempmgr_traits::HwResult<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_le_bytes().to_vec());
        Ok(())
    }

    fn load_u8(&mut self, key: &str) -> tempmgr_traits::HwResult<Option<u8>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .get(key)
            .and_then(|b| b.first().copied()))
    }

    fn store_u8(&mut self, key: &str, value: u8) -> tempmgr_traits::HwResult<()> {
        self.inner.lock().unwrap().insert(key.to_string(), vec![value]);
        Ok(())
    }
}

//! Oversampling ADC pipeline.
//!
//! Drives a round-robin over the machine's channel list, accumulating exactly
//! `OVERSAMPLES` conversions per channel into a 16-bit sum. A cycle is
//! published as one coherent snapshot; a cycle with any failed conversion is
//! discarded so readers never observe partial updates.

use tempmgr_traits::AdcBank;
use tracing::warn;

use crate::config::MachineConfig;
use crate::error::map_hw_error;
use crate::types::{channel, RawSnapshot, OVERSAMPLES};

/// Role of one entry in the round-robin channel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Hotend(usize),
    Bed,
    Ambient,
    Probe,
    AuxVoltage,
}

pub struct Sampler {
    adc: Box<dyn AdcBank>,
    slots: Vec<(Slot, usize)>,
    ready: Option<RawSnapshot>,
    /// Consecutive failed cycles, for diagnostics.
    failed_cycles: u32,
}

impl Sampler {
    pub fn new(adc: Box<dyn AdcBank>, machine: &MachineConfig) -> Self {
        let mut slots = Vec::new();
        for e in 0..machine.hotend_count {
            slots.push((Slot::Hotend(e), channel::HOTEND0 + e));
        }
        slots.push((Slot::Bed, channel::BED));
        if machine.has_ambient {
            slots.push((Slot::Ambient, channel::AMBIENT));
        }
        if machine.has_probe {
            slots.push((Slot::Probe, channel::PROBE));
        }
        slots.push((Slot::AuxVoltage, channel::AUX_VOLTAGE));
        Self {
            adc,
            slots,
            ready: None,
            failed_cycles: 0,
        }
    }

    /// Run one full oversampling cycle and publish it. Returns true when a
    /// fresh snapshot is available for `take`.
    pub fn acquire(&mut self) -> bool {
        let mut snap = RawSnapshot::default();
        for i in 0..self.slots.len() {
            let (slot, ch) = self.slots[i];
            let mut sum: u16 = 0;
            for _ in 0..OVERSAMPLES {
                match self.adc.sample(ch) {
                    Ok(v) => sum = sum.saturating_add(v.min(1023)),
                    Err(e) => {
                        self.failed_cycles = self.failed_cycles.saturating_add(1);
                        let typed = map_hw_error(e.as_ref());
                        warn!(channel = ch, error = %typed, "conversion failed, discarding cycle");
                        return self.ready.is_some();
                    }
                }
            }
            match slot {
                Slot::Hotend(e) => snap.hotend[e] = sum,
                Slot::Bed => snap.bed = sum,
                Slot::Ambient => snap.ambient = sum,
                Slot::Probe => snap.probe = sum,
                Slot::AuxVoltage => snap.aux_voltage = sum,
            }
        }
        self.failed_cycles = 0;
        self.ready = Some(snap);
        true
    }

    /// Consume the pending snapshot, clearing the ready flag.
    pub fn take(&mut self) -> Option<RawSnapshot> {
        self.ready.take()
    }

    pub fn failed_cycles(&self) -> u32 {
        self.failed_cycles
    }
}

#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Thermal control core (hardware-agnostic).
//!
//! The hard-realtime heart of a fused-filament printer: ADC oversampling,
//! raw→°C conversion, soft-PWM heater drive, PID regulation, and a stack of
//! prioritized safety detectors that latch a machine-wide fault whenever the
//! physical system stops behaving. All hardware access goes through the
//! seams in `tempmgr_traits`.
//!
//! ## Architecture
//!
//! - **Sampling**: oversampled, coherent raw snapshots (`sampler`)
//! - **Conversion**: per-role lookup tables with raw-domain limits (`table`)
//! - **Actuation**: 7-bit soft PWM over heater pins (`pwm`)
//! - **Regulation**: PID with conditional anti-windup (`pid`)
//! - **Safety**: raw limits, runaway detection, model observer
//!   (`limits`, `runaway`, `model`) feeding a latched fault word (`fault`)
//! - **Glue**: `TempCore` + `Harness` stand in for the firmware's interrupt
//!   contexts (`manager`, `harness`)
//! - **Tuning**: relay PID tune and golden-section observer calibration
//!   (`tuner`, `calibrate`)

pub mod calibrate;
pub mod config;
pub mod conversions;
pub mod error;
pub mod fault;
pub mod harness;
pub mod limits;
pub mod manager;
pub mod mocks;
pub mod model;
pub mod pid;
pub mod pwm;
pub mod report;
pub mod runaway;
pub mod sampler;
pub mod store;
pub mod table;
pub mod tuner;
pub mod types;
pub mod util;

pub use config::{CoreConfig, MachineConfig, TuningRule};
pub use error::{BuildError, Result, TempMgrError};
pub use fault::{Fault, FaultKind, FaultSource};
pub use harness::Harness;
pub use manager::{MgrGuard, TempCore, TempCoreBuilder};
pub use pwm::{FanDrive, Outputs};
pub use table::{Conversion, TempTable};
pub use tuner::PidTuneResult;
pub use types::{HeaterId, RawSnapshot, RecoverySnapshot, Targets, Temps};

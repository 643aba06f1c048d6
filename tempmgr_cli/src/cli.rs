//! CLI argument definitions.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "tempmgr", version, about = "Thermal controller CLI (simulated plant)")]
pub struct Cli {
    /// Path to config TOML; defaults apply when the file is absent
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Parameter store file (thermal model calibration)
    #[arg(long, value_name = "FILE", default_value = "tempmgr.store")]
    pub store: PathBuf,

    /// Optional temperature table CSV (strict `raw,celsius` header) for
    /// the hotends
    #[arg(long, value_name = "FILE")]
    pub table: Option<PathBuf>,

    /// Run against an accelerated clock instead of wall time
    #[arg(long, action = ArgAction::SetTrue)]
    pub accel: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum HeaterArg {
    Hotend0,
    Hotend1,
    Hotend2,
    Bed,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Heat to a set point and stream periodic temperature reports
    Heat {
        /// Hotend target (°C)
        #[arg(long, value_name = "C")]
        hotend: Option<i16>,
        /// Bed target (°C)
        #[arg(long, value_name = "C")]
        bed: Option<i16>,
        /// Fan speed 0..255
        #[arg(long, default_value_t = 0)]
        fan: u8,
        /// How long to run
        #[arg(long, default_value_t = 120)]
        seconds: u64,
        /// Lock memory and request SCHED_FIFO for the control loop (Linux)
        #[arg(long, action = ArgAction::SetTrue)]
        rt: bool,
    },

    /// Relay-method PID autotune
    PidAutotune {
        #[arg(long, value_enum, default_value_t = HeaterArg::Hotend0)]
        heater: HeaterArg,
        #[arg(long, value_name = "C")]
        target: f32,
        #[arg(long, default_value_t = 5)]
        cycles: i32,
    },

    /// Thermal model parameter management and calibration
    #[command(subcommand)]
    Model(ModelCmd),
}

#[derive(Subcommand, Debug)]
pub enum ModelCmd {
    /// Set scalar parameters; omitted values stay untouched
    Set {
        #[arg(long)]
        p: Option<f32>,
        #[arg(long)]
        c: Option<f32>,
        #[arg(long = "ta-corr")]
        ta_corr: Option<f32>,
        #[arg(long)]
        warn: Option<f32>,
        #[arg(long)]
        err: Option<f32>,
        /// Resistance entries as INDEX=VALUE, repeatable
        #[arg(long = "r", value_name = "IDX=VAL")]
        r: Vec<String>,
    },
    /// Print the current parameter set
    Report,
    /// Reset parameters to factory defaults (model disabled)
    Reset,
    /// Persist parameters to the store file
    Save,
    /// Load parameters from the store file
    Load,
    /// Enable the observer (requires a valid calibration)
    Enable,
    /// Disable the observer
    Disable,
    /// Toggle the anomaly beeper
    WarnBeep {
        #[arg(value_parser = clap::builder::BoolishValueParser::new())]
        on: bool,
    },
    /// Self-calibrate P/C/R against the plant
    Autotune {
        #[arg(long, value_name = "C")]
        target: Option<f32>,
    },
}

use thiserror::Error;

/// Typed runtime errors surfaced at the core's public boundary.
#[derive(Debug, Error, Clone)]
pub enum TempMgrError {
    #[error("adc error: {0}")]
    Adc(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid heater index {0}")]
    BadHeater(u8),
    #[error("thermal fault latched: {0}")]
    FaultLatched(String),
    #[error("autotune failed: {0}")]
    Tune(String),
    #[error("calibration failed: {0}")]
    Calibration(String),
    #[error("machine busy: {0}")]
    Busy(&'static str),
}

/// Errors detected while assembling a `TempCore`.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing adc bank")]
    MissingAdc,
    #[error("missing heater outputs")]
    MissingOutputs,
    #[error("missing alert sink")]
    MissingAlerts,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid temperature table: {0}")]
    InvalidTable(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map a trait-boundary error to a typed `TempMgrError`.
///
/// The seams in `tempmgr_traits` use `Box<dyn Error + Send + Sync>` for
/// flexibility; this converts those into the typed enum for callers that
/// want to match on failure class.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> TempMgrError {
    let s = e.to_string();
    if s.to_lowercase().contains("adc") {
        TempMgrError::Adc(s)
    } else {
        TempMgrError::Hardware(s)
    }
}

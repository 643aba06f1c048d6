//! Human-readable error descriptions for the console.

use tempmgr_core::{BuildError, TempMgrError};

/// Map an eyre::Report to an explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAdc => {
                "What happened: No ADC bank was provided to the thermal core.\nLikely causes: The simulated plant failed to assemble.\nHow to fix: This is an internal wiring bug; rerun with --log-level=debug and report it.".to_string()
            }
            BuildError::MissingOutputs | BuildError::MissingAlerts => {
                "What happened: The thermal core was built without its outputs.\nLikely causes: Internal wiring bug in machine assembly.\nHow to fix: Rerun with --log-level=debug and report it.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            BuildError::InvalidTable(msg) => format!(
                "What happened: Temperature table rejected ({msg}).\nLikely causes: A CSV row out of order or non-monotonic temperatures.\nHow to fix: Check the table file against the `raw,celsius` format."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<TempMgrError>() {
        return match te {
            TempMgrError::FaultLatched(detail) => format!(
                "What happened: A thermal fault latched ({detail}).\nLikely causes: Runaway, sensor limit or model anomaly during the run.\nHow to fix: Inspect the alert output above; the machine requires a restart to clear latched faults."
            ),
            TempMgrError::BadHeater(e) => format!(
                "What happened: Heater index {e} does not exist on this machine.\nLikely causes: --heater beyond the configured hotend_count.\nHow to fix: Pick a heater the config declares."
            ),
            TempMgrError::Tune(msg) => format!(
                "What happened: PID autotune failed ({msg}).\nLikely causes: Target too high, heater too weak, or oscillation never settled.\nHow to fix: Retune with a lower target or more cycles."
            ),
            TempMgrError::Calibration(msg) => format!(
                "What happened: Model calibration failed ({msg}).\nLikely causes: The estimate ran into a search boundary or a thermal fault.\nHow to fix: Check fan and heater behavior, then rerun `model autotune`."
            ),
            TempMgrError::Busy(msg) => format!(
                "What happened: Calibration refused to start ({msg}).\nHow to fix: Wait for the machine to go idle, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    format!("{err:#}")
}

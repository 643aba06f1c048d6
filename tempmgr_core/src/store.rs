//! Model parameter persistence.
//!
//! Parameters live in a key/value store behind the `ParamStore` seam. A
//! stored calibration that fails validation is discarded: the parameters
//! reset to factory defaults and the model stays disabled, but the machine
//! keeps running.

use tempmgr_traits::ParamStore;
use tracing::warn;

use crate::config::ModelCfg;
use crate::error::{Result, TempMgrError};
use crate::model::{ModelObserver, ModelParams};

pub const KEY_ENABLE: &str = "TM_ENABLE";
pub const KEY_P: &str = "TM_P";
pub const KEY_C: &str = "TM_C";
pub const KEY_TA_CORR: &str = "TM_TA_CORR";
pub const KEY_WARN: &str = "TM_W";
pub const KEY_ERR: &str = "TM_E";
pub const KEY_PROBE_COMP: &str = "PROBE_COMP";

pub fn key_r(index: usize) -> String {
    format!("TM_R{index}")
}

fn storage_err(e: impl std::fmt::Display) -> eyre::Report {
    eyre::Report::new(TempMgrError::Storage(e.to_string()))
}

/// Persist the observer's parameters and enable flag.
pub fn save_model(model: &ModelObserver, store: &mut dyn ParamStore) -> Result<()> {
    store
        .store_u8(KEY_ENABLE, u8::from(model.enabled))
        .map_err(storage_err)?;
    store.store_f32(KEY_P, model.params.p).map_err(storage_err)?;
    store.store_f32(KEY_C, model.params.c).map_err(storage_err)?;
    for (i, r) in model.params.r.iter().enumerate() {
        store.store_f32(&key_r(i), *r).map_err(storage_err)?;
    }
    store
        .store_f32(KEY_TA_CORR, model.params.ta_corr)
        .map_err(storage_err)?;
    store
        .store_f32(KEY_WARN, model.params.warn)
        .map_err(storage_err)?;
    store
        .store_f32(KEY_ERR, model.params.err)
        .map_err(storage_err)?;
    Ok(())
}

/// Load parameters from the store. Missing keys keep their defaults; an
/// invalid resulting set resets to defaults with the model disabled.
pub fn load_model(
    model: &mut ModelObserver,
    defaults: &ModelCfg,
    store: &mut dyn ParamStore,
) -> Result<()> {
    let mut params = ModelParams::defaults(defaults);
    let enabled = store.load_u8(KEY_ENABLE).map_err(storage_err)?.unwrap_or(0) != 0;
    if let Some(v) = store.load_f32(KEY_P).map_err(storage_err)? {
        params.p = v;
    }
    if let Some(v) = store.load_f32(KEY_C).map_err(storage_err)? {
        params.c = v;
    }
    for (i, r) in params.r.iter_mut().enumerate() {
        if let Some(v) = store.load_f32(&key_r(i)).map_err(storage_err)? {
            *r = v;
        }
    }
    if let Some(v) = store.load_f32(KEY_TA_CORR).map_err(storage_err)? {
        params.ta_corr = v;
    }
    if let Some(v) = store.load_f32(KEY_WARN).map_err(storage_err)? {
        params.warn = v;
    }
    if let Some(v) = store.load_f32(KEY_ERR).map_err(storage_err)? {
        params.err = v;
    }

    model.params = params;
    model.enabled = enabled;
    if !model.params.calibrated() {
        warn!("TM: stored calibration invalid, resetting");
        model.params = ModelParams::defaults(defaults);
        model.enabled = false;
    }
    model.setup();
    Ok(())
}

/// Stored probe compensation override byte, if any.
pub fn load_probe_override(store: &mut dyn ParamStore) -> Result<Option<u8>> {
    store.load_u8(KEY_PROBE_COMP).map_err(storage_err)
}

pub fn store_probe_override(store: &mut dyn ParamStore, value: u8) -> Result<()> {
    store.store_u8(KEY_PROBE_COMP, value).map_err(storage_err)
}

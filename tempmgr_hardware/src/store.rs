//! File-backed parameter store.
//!
//! A flat `key=value` text file; floats are stored as their bit pattern in
//! hex so round-trips are exact. Writes go through an atomic replace
//! (`.new` + fsync + rename) so a power cut cannot truncate the store.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempmgr_traits::{HwResult, ParamStore};

use crate::error::HwError;

pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    F32(f32),
    U8(u8),
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    map: BTreeMap<String, Value>,
}

impl FileStore {
    /// Open (or create) a store file. Unparseable lines fail the open
    /// instead of being dropped silently.
    pub fn open(path: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let path = path.into();
        let mut map = BTreeMap::new();
        if path.exists() {
            let text = fs::read_to_string(&path)?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let (key, val) = line
                    .split_once('=')
                    .ok_or_else(|| HwError::StoreCorrupt(format!("no '=' in {line:?}")))?;
                let value = match val.split_once(':') {
                    Some(("f", hex)) => {
                        let bits = u32::from_str_radix(hex, 16)
                            .map_err(|_| HwError::StoreCorrupt(format!("bad float {val:?}")))?;
                        Value::F32(f32::from_bits(bits))
                    }
                    Some(("b", hex)) => {
                        let byte = u8::from_str_radix(hex, 16)
                            .map_err(|_| HwError::StoreCorrupt(format!("bad byte {val:?}")))?;
                        Value::U8(byte)
                    }
                    _ => return Err(HwError::StoreCorrupt(format!("bad value {val:?}"))),
                };
                map.insert(key.to_string(), value);
            }
        }
        Ok(Self { path, map })
    }

    fn flush(&self) -> std::io::Result<()> {
        let mut out = String::new();
        for (key, value) in &self.map {
            match value {
                Value::F32(v) => out.push_str(&format!("{key}=f:{:08x}\n", v.to_bits())),
                Value::U8(v) => out.push_str(&format!("{key}=b:{v:02x}\n")),
            }
        }
        write_atomic(&self.path, out.as_bytes())
    }
}

impl ParamStore for FileStore {
    fn load_f32(&mut self, key: &str) -> HwResult<Option<f32>> {
        Ok(match self.map.get(key) {
            Some(Value::F32(v)) => Some(*v),
            _ => None,
        })
    }

    fn store_f32(&mut self, key: &str, value: f32) -> HwResult<()> {
        self.map.insert(key.to_string(), Value::F32(value));
        self.flush().map_err(|e| Box::new(HwError::Io(e)) as _)
    }

    fn load_u8(&mut self, key: &str) -> HwResult<Option<u8>> {
        Ok(match self.map.get(key) {
            Some(Value::U8(v)) => Some(*v),
            _ => None,
        })
    }

    fn store_u8(&mut self, key: &str, value: u8) -> HwResult<()> {
        self.map.insert(key.to_string(), Value::U8(value));
        self.flush().map_err(|e| Box::new(HwError::Io(e)) as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.store");
        {
            let mut s = FileStore::open(&path).unwrap();
            s.store_f32("TM_C", 11.5).unwrap();
            s.store_u8("TM_ENABLE", 1).unwrap();
            // NaN round-trips bit-exactly too
            s.store_f32("TM_R0", f32::NAN).unwrap();
        }
        let mut s = FileStore::open(&path).unwrap();
        assert_eq!(s.load_f32("TM_C").unwrap(), Some(11.5));
        assert_eq!(s.load_u8("TM_ENABLE").unwrap(), Some(1));
        assert!(s.load_f32("TM_R0").unwrap().unwrap().is_nan());
        assert_eq!(s.load_f32("MISSING").unwrap(), None);
    }

    #[test]
    fn corrupt_lines_fail_the_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.store");
        std::fs::write(&path, "TM_C=zz:nonsense\n").unwrap();
        assert!(FileStore::open(&path).is_err());
    }
}

//! Remembered planning decisions.
//!
//! Wisdom is exchanged through primitive character streams so that foreign
//! callers can supply their own byte sinks and sources:
//!
//! ```text
//! (fft_engine-wisdom v1 crc32=1a2b3c4d)
//! [{"problem":{...},"kernel":"avx"}, ...]
//! ```
use super::Problem;
use crate::simd::KernelPath;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

const HEADER_PREFIX: &str = "(fft_engine-wisdom v1 crc32=";

#[derive(Error, Debug)]
pub enum WisdomError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing or malformed wisdom header")]
    Header,
    #[error("Checksum mismatch: header says {expected:08x}, body is {found:08x}")]
    ChecksumMismatch { expected: u32, found: u32 },
    #[error("Wisdom is not valid UTF-8")]
    Encoding,
    #[error("Malformed wisdom body: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WisdomRecord {
    pub problem: Problem,
    pub kernel: KernelPath,
}

#[derive(Default)]
pub struct WisdomStore {
    records: Mutex<Vec<WisdomRecord>>,
}

static GLOBAL: WisdomStore = WisdomStore::new();

pub fn global() -> &'static WisdomStore {
    &GLOBAL
}

pub fn export_wisdom(sink: &mut dyn FnMut(u8)) {
    GLOBAL.export(sink)
}

pub fn import_wisdom(source: &mut dyn FnMut() -> Option<u8>) -> Result<usize, WisdomError> {
    GLOBAL.import(source)
}

pub fn forget_wisdom() {
    GLOBAL.forget()
}

impl WisdomStore {
    pub const fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<WisdomRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, problem: &Problem) -> Option<KernelPath> {
        self.records()
            .iter()
            .find(|r| &r.problem == problem)
            .map(|r| r.kernel)
    }

    /// Later decisions for the same problem replace earlier ones.
    pub fn record(&self, problem: Problem, kernel: KernelPath) {
        let mut records = self.records();
        match records.iter_mut().find(|r| r.problem == problem) {
            Some(existing) => existing.kernel = kernel,
            None => records.push(WisdomRecord { problem, kernel }),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn forget(&self) {
        self.records().clear();
    }

    pub fn export(&self, sink: &mut dyn FnMut(u8)) {
        let body = {
            let records = self.records();
            // Records hold only plain data; serialization cannot fail.
            serde_json::to_string(&*records).unwrap_or_else(|_| "[]".to_string())
        };
        let header = format!("{HEADER_PREFIX}{:08x})\n", crc32fast::hash(body.as_bytes()));
        header.bytes().chain(body.bytes()).for_each(|b| sink(b));
        tracing::debug!(bytes = header.len() + body.len(), "Exported wisdom");
    }

    /// Reads until the source is exhausted. Nothing is recorded unless the
    /// whole stream parses and its checksum matches; records whose kernel is
    /// not usable on this host are skipped. Returns the number recorded.
    pub fn import(&self, source: &mut dyn FnMut() -> Option<u8>) -> Result<usize, WisdomError> {
        let bytes: Vec<u8> = std::iter::from_fn(source).collect();
        let text = String::from_utf8(bytes).map_err(|_| WisdomError::Encoding)?;

        let (header, body) = text.split_once('\n').ok_or(WisdomError::Header)?;
        let expected = header
            .trim_end()
            .strip_prefix(HEADER_PREFIX)
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or(WisdomError::Header)?;

        let body = body.trim_end();
        let found = crc32fast::hash(body.as_bytes());
        if found != expected {
            return Err(WisdomError::ChecksumMismatch { expected, found });
        }

        let incoming: Vec<WisdomRecord> = serde_json::from_str(body)?;
        let total = incoming.len();
        let mut imported = 0;
        for record in incoming {
            if record.kernel.usable() {
                self.record(record.problem, record.kernel);
                imported += 1;
            }
        }
        tracing::debug!(imported, skipped = total - imported, "Imported wisdom");
        Ok(imported)
    }

    pub fn export_to_string(&self) -> String {
        let mut bytes = Vec::new();
        self.export(&mut |b| bytes.push(b));
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn import_from_str(&self, text: &str) -> Result<usize, WisdomError> {
        let mut bytes = text.bytes();
        self.import(&mut || bytes.next())
    }

    pub fn export_to_file(&self, path: &Path) -> Result<(), WisdomError> {
        fs::write(path, self.export_to_string())?;
        Ok(())
    }

    pub fn import_from_file(&self, path: &Path) -> Result<usize, WisdomError> {
        let text = fs::read_to_string(path)?;
        self.import_from_str(&text)
    }
}

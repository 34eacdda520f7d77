//! Bulk-archive adapter: one zip download per run, lookups served from memory.
//!
//! Entries are indexed by lowercased file stem (`aapl.us.txt` -> `aapl.us`),
//! so the provider's directory sharding does not matter. A symbol with no
//! entry is `NotFound`; the orchestrator moves it to the next source.

use super::circuit_breaker::{BreakerConfig, CircuitBreaker};
use super::normalize::RawPayload;
use super::provider::{AdapterError, Lookup, Lookups, SourceAdapter};
use super::source::{FetchRequest, Source};
use super::transport::{check_response, Checked, Transport};
use crate::domain::Symbol;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use zip::ZipArchive;

/// Unpacked directory of one downloaded archive.
pub struct ArchiveIndex {
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
    by_stem: HashMap<String, usize>,
}

fn entry_stem(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next()?;
    let stem = match file.rfind('.') {
        Some(i) if i > 0 => &file[..i],
        _ => file,
    };
    (!stem.is_empty()).then(|| stem.to_lowercase())
}

impl ArchiveIndex {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AdapterError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| AdapterError::Archive(e.to_string()))?;

        let mut by_stem = HashMap::new();
        for i in 0..archive.len() {
            let file = archive
                .by_index(i)
                .map_err(|e| AdapterError::Archive(e.to_string()))?;
            if file.is_dir() {
                continue;
            }
            if let Some(stem) = entry_stem(file.name()) {
                by_stem.entry(stem).or_insert(i);
            }
        }

        Ok(Self {
            archive: Mutex::new(archive),
            by_stem,
        })
    }

    pub fn len(&self) -> usize {
        self.by_stem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stem.is_empty()
    }

    /// Entry for `key` (case-insensitive stem), or `NotFound`.
    pub fn lookup(&self, key: &str) -> Lookup {
        let Some(&index) = self.by_stem.get(&key.to_lowercase()) else {
            return Lookup::NotFound;
        };
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = match archive.by_index(index) {
            Ok(f) => f,
            Err(e) => return Lookup::Malformed(format!("unreadable archive entry: {e}")),
        };
        let name = file.name().to_string();
        let mut bytes = Vec::new();
        if let Err(e) = file.read_to_end(&mut bytes) {
            return Lookup::Malformed(format!("unreadable archive entry: {e}"));
        }
        Lookup::Payload(RawPayload::ArchiveEntry {
            name,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

pub struct BulkArchiveAdapter {
    source: Source,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
    index: Mutex<Option<Arc<ArchiveIndex>>>,
}

impl BulkArchiveAdapter {
    pub fn new(source: Source, transport: Arc<dyn Transport>, breaker: &BreakerConfig) -> Self {
        Self {
            source,
            transport,
            breaker: CircuitBreaker::from_config(breaker),
            index: Mutex::new(None),
        }
    }

    /// Download and index the archive on first use. A failed download is
    /// not cached, so a retry downloads again.
    fn index(&self, request: &FetchRequest) -> Result<Arc<ArchiveIndex>, AdapterError> {
        let mut slot = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }
        if !self.breaker.is_allowed() {
            return Err(AdapterError::CircuitOpen);
        }

        let url = self.source.render_endpoint(&[], &request.window);
        debug!(source = %self.source.name, %url, "downloading archive");
        let resp = self.transport.get(&url)?;
        let bytes = match check_response(resp, &self.breaker, false)? {
            Checked::Body(bytes) => bytes,
            Checked::Missing => return Err(AdapterError::HttpStatus { status: 404 }),
        };
        let size = bytes.len();
        let index = Arc::new(ArchiveIndex::from_bytes(bytes)?);
        info!(
            source = %self.source.name,
            bytes = size,
            entries = index.len(),
            "archive indexed"
        );
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }
}

impl SourceAdapter for BulkArchiveAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    fn fetch(&self, symbols: &[Symbol], request: &FetchRequest) -> Result<Lookups, AdapterError> {
        let index = self.index(request)?;
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), index.lookup(&self.source.symbols.render(s))))
            .collect())
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

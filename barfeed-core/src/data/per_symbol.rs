//! Per-symbol adapter: one call per symbol, with the source's circuit breaker
//! checked before every request.

use super::chart::{decode_chart, ChartDecode};
use super::circuit_breaker::{BreakerConfig, CircuitBreaker};
use super::normalize::RawPayload;
use super::provider::{AdapterError, Lookup, Lookups, SourceAdapter};
use super::source::{FetchRequest, PayloadFormat, Source};
use super::transport::{body_text, check_response, Checked, Transport};
use crate::domain::Symbol;
use std::sync::Arc;
use tracing::trace;

/// Bodies some CSV endpoints send instead of a 404.
const NO_DATA_BODIES: &[&str] = &["no data", "n/d"];

pub struct PerSymbolAdapter {
    source: Source,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
}

impl PerSymbolAdapter {
    pub fn new(source: Source, transport: Arc<dyn Transport>, breaker: &BreakerConfig) -> Self {
        Self {
            source,
            transport,
            breaker: CircuitBreaker::from_config(breaker),
        }
    }

    fn fetch_one(&self, symbol: &Symbol, request: &FetchRequest) -> Result<Lookup, AdapterError> {
        if !self.breaker.is_allowed() {
            return Err(AdapterError::CircuitOpen);
        }
        let url = self
            .source
            .render_endpoint(std::slice::from_ref(symbol), &request.window);
        trace!(source = %self.source.name, %symbol, %url, "request");

        let resp = self.transport.get(&url)?;
        let text = match check_response(resp, &self.breaker, true)? {
            Checked::Body(bytes) => body_text(bytes),
            Checked::Missing => return Ok(Lookup::NotFound),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() || NO_DATA_BODIES.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
            return Ok(Lookup::NotFound);
        }

        Ok(match self.source.format {
            PayloadFormat::Csv => Lookup::Payload(RawPayload::Csv(text)),
            PayloadFormat::JsonRows => Lookup::Payload(RawPayload::Json(text)),
            PayloadFormat::Chart => match decode_chart(&text) {
                ChartDecode::Table(table) => Lookup::Payload(RawPayload::Table(table)),
                ChartDecode::NotFound => Lookup::NotFound,
                ChartDecode::Malformed(reason) => Lookup::Malformed(reason),
            },
        })
    }
}

impl SourceAdapter for PerSymbolAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    fn fetch(&self, symbols: &[Symbol], request: &FetchRequest) -> Result<Lookups, AdapterError> {
        let mut out = Lookups::new();
        for symbol in symbols {
            out.insert(symbol.clone(), self.fetch_one(symbol, request)?);
        }
        Ok(out)
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

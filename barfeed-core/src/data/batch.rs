//! Bulk-batch adapter: one call per batch, response split back per symbol.
//!
//! Row-shaped bodies (CSV, JSON array, columnar JSON) are partitioned on the
//! source's symbol column. A JSON object keyed by ticker is split by key.
//! A requested symbol that does not appear in the response is `NotFound`;
//! a body that cannot be split at all is `Malformed` for every symbol.

use super::circuit_breaker::{BreakerConfig, CircuitBreaker};
use super::normalize::{RawPayload, Table, UNPARSEABLE};
use super::provider::{AdapterError, Lookup, Lookups, SourceAdapter};
use super::source::{FetchRequest, PayloadFormat, Source};
use super::transport::{body_text, check_response, Checked, Transport};
use crate::domain::Symbol;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const NO_SYMBOL_COLUMN: &str = "no symbol column";
pub const UNSUPPORTED_FORMAT: &str = "format not supported for batch access";

pub struct BulkBatchAdapter {
    source: Source,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
}

impl BulkBatchAdapter {
    pub fn new(source: Source, transport: Arc<dyn Transport>, breaker: &BreakerConfig) -> Self {
        Self {
            source,
            transport,
            breaker: CircuitBreaker::from_config(breaker),
        }
    }

    fn all(symbols: &[Symbol], lookup: Lookup) -> Lookups {
        symbols.iter().map(|s| (s.clone(), lookup.clone())).collect()
    }

    fn split_table(&self, symbols: &[Symbol], table: &Table) -> Lookups {
        if table.is_empty() {
            return Self::all(symbols, Lookup::NotFound);
        }
        let Some(column) = self.source.schema.symbol_column(&table.headers) else {
            return Self::all(symbols, Lookup::Malformed(NO_SYMBOL_COLUMN.into()));
        };
        let mut parts = table.partition_by(column);
        symbols
            .iter()
            .map(|s| {
                let lookup = match parts.remove(&self.source.symbols.match_key(s)) {
                    Some(part) => Lookup::Payload(RawPayload::Table(part)),
                    None => Lookup::NotFound,
                };
                (s.clone(), lookup)
            })
            .collect()
    }

    fn split_keyed(&self, symbols: &[Symbol], object: serde_json::Map<String, Value>) -> Lookups {
        let by_key: HashMap<String, Value> = object
            .into_iter()
            .map(|(k, v)| (k.trim().to_uppercase(), v))
            .collect();
        symbols
            .iter()
            .map(|s| {
                let lookup = match by_key.get(&self.source.symbols.match_key(s)) {
                    Some(Value::Null) | None => Lookup::NotFound,
                    Some(v) => Lookup::Payload(RawPayload::Json(v.to_string())),
                };
                (s.clone(), lookup)
            })
            .collect()
    }

    fn split(&self, symbols: &[Symbol], text: &str) -> Lookups {
        match self.source.format {
            PayloadFormat::Csv => match Table::from_csv(text) {
                Ok(table) => self.split_table(symbols, &table),
                Err(_) => Self::all(symbols, Lookup::Malformed(UNPARSEABLE.into())),
            },
            PayloadFormat::JsonRows => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(object)) if !self.is_columnar(&object) => {
                    self.split_keyed(symbols, object)
                }
                Ok(value) => match Table::from_json(&value) {
                    Ok(table) => self.split_table(symbols, &table),
                    Err(_) => Self::all(symbols, Lookup::Malformed(UNPARSEABLE.into())),
                },
                Err(_) => Self::all(symbols, Lookup::Malformed(UNPARSEABLE.into())),
            },
            PayloadFormat::Chart => Self::all(symbols, Lookup::Malformed(UNSUPPORTED_FORMAT.into())),
        }
    }

    /// Column arrays with a symbol column, as opposed to an object keyed by
    /// ticker.
    fn is_columnar(&self, object: &serde_json::Map<String, Value>) -> bool {
        let keys: Vec<String> = object.keys().cloned().collect();
        object.values().all(Value::is_array) && self.source.schema.symbol_column(&keys).is_some()
    }
}

impl SourceAdapter for BulkBatchAdapter {
    fn source(&self) -> &Source {
        &self.source
    }

    fn fetch(&self, symbols: &[Symbol], request: &FetchRequest) -> Result<Lookups, AdapterError> {
        if !self.breaker.is_allowed() {
            return Err(AdapterError::CircuitOpen);
        }
        let url = self.source.render_endpoint(symbols, &request.window);
        debug!(source = %self.source.name, batch = symbols.len(), "batch request");

        let resp = self.transport.get(&url)?;
        let text = match check_response(resp, &self.breaker, true)? {
            Checked::Body(bytes) => body_text(bytes),
            Checked::Missing => return Ok(Self::all(symbols, Lookup::NotFound)),
        };
        Ok(self.split(symbols, &text))
    }

    fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Target;
    use crate::data::normalize::normalize;
    use crate::data::source::{AccessMode, SymbolCase, SymbolStyle};
    use crate::data::transport::HttpResponse;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct Recording {
        body: String,
        urls: Mutex<Vec<String>>,
    }

    impl Transport for Recording {
        fn get(&self, url: &str) -> Result<HttpResponse, AdapterError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(HttpResponse::ok(self.body.clone()))
        }
    }

    fn adapter(format: PayloadFormat, body: &str) -> (BulkBatchAdapter, Arc<Recording>) {
        let transport = Arc::new(Recording {
            body: body.into(),
            urls: Mutex::new(Vec::new()),
        });
        let source = Source::new("batch", AccessMode::BulkBatch, "http://q/?s={symbols}")
            .with_format(format)
            .with_symbols(SymbolStyle {
                case: SymbolCase::Lower,
                separator: "-".into(),
                suffix: ".us".into(),
            });
        let a = BulkBatchAdapter::new(source, transport.clone(), &BreakerConfig::default());
        (a, transport)
    }

    fn request() -> FetchRequest {
        FetchRequest::new(Target::Latest, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
    }

    fn syms(raw: &[&str]) -> Vec<Symbol> {
        raw.iter().map(|s| Symbol::normalize(s)).collect()
    }

    #[test]
    fn csv_batch_is_split_by_symbol() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
            AAPL.US,2024-05-01,22:00:06,169.58,172.71,169.11,169.3,50383147\n\
            BRK-B.US,2024-05-01,22:00:06,400,405,399,401.5,3000000\n";
        let (a, transport) = adapter(PayloadFormat::Csv, body);
        let s = syms(&["AAPL", "BRK.B", "NOPE"]);
        let out = a.fetch(&s, &request()).unwrap();

        assert_eq!(
            transport.urls.lock().unwrap().as_slice(),
            ["http://q/?s=aapl.us,brk-b.us,nope.us"]
        );
        let Lookup::Payload(payload) = &out[&s[1]] else {
            panic!("expected payload");
        };
        let bar = normalize(payload, a.source(), &request()).unwrap();
        assert_eq!(bar.close, 401.5);
        assert!(matches!(out[&s[0]], Lookup::Payload(_)));
        assert_eq!(out[&s[2]], Lookup::NotFound);
    }

    #[test]
    fn csv_without_symbol_column_is_malformed_for_all() {
        let (a, _) = adapter(PayloadFormat::Csv, "Date,Close\n2024-05-01,1\n");
        let s = syms(&["AAPL", "MSFT"]);
        let out = a.fetch(&s, &request()).unwrap();
        assert!(out
            .values()
            .all(|l| *l == Lookup::Malformed(NO_SYMBOL_COLUMN.into())));
    }

    #[test]
    fn json_keyed_by_ticker() {
        let body = r#"{"AAPL.US": [{"date": "2024-05-01", "close": 169.3}], "MSFT.US": null}"#;
        let (a, _) = adapter(PayloadFormat::JsonRows, body);
        let s = syms(&["AAPL", "MSFT"]);
        let out = a.fetch(&s, &request()).unwrap();
        let Lookup::Payload(payload) = &out[&s[0]] else {
            panic!("expected payload");
        };
        assert_eq!(normalize(payload, a.source(), &request()).unwrap().close, 169.3);
        assert_eq!(out[&s[1]], Lookup::NotFound);
    }

    #[test]
    fn json_rows_with_symbol_field() {
        let body = r#"[{"ticker":"aapl.us","date":"2024-05-01","close":1.5},
                       {"ticker":"msft.us","date":"2024-05-01","close":2.5}]"#;
        let (a, _) = adapter(PayloadFormat::JsonRows, body);
        let s = syms(&["MSFT"]);
        let out = a.fetch(&s, &request()).unwrap();
        let Lookup::Payload(payload) = &out[&s[0]] else {
            panic!("expected payload");
        };
        assert_eq!(normalize(payload, a.source(), &request()).unwrap().close, 2.5);
    }

    #[test]
    fn columnar_json_with_symbol_column() {
        let body = r#"{"symbol":["AAPL.US","MSFT.US"],"date":["2024-05-01","2024-05-01"],"close":[1,2]}"#;
        let (a, _) = adapter(PayloadFormat::JsonRows, body);
        let s = syms(&["AAPL"]);
        let out = a.fetch(&s, &request()).unwrap();
        assert!(matches!(out[&s[0]], Lookup::Payload(RawPayload::Table(_))));
    }

    #[test]
    fn empty_json_array_is_not_found_for_all() {
        let (a, _) = adapter(PayloadFormat::JsonRows, "[]");
        let s = syms(&["AAPL", "MSFT"]);
        let out = a.fetch(&s, &request()).unwrap();
        assert!(out.values().all(|l| *l == Lookup::NotFound));
    }

    #[test]
    fn garbage_body_is_malformed_for_all() {
        let (a, _) = adapter(PayloadFormat::JsonRows, "{oops");
        let s = syms(&["AAPL"]);
        let out = a.fetch(&s, &request()).unwrap();
        assert_eq!(out[&s[0]], Lookup::Malformed(UNPARSEABLE.into()));
    }

    #[test]
    fn missing_endpoint_is_not_found_for_all() {
        struct Gone;
        impl Transport for Gone {
            fn get(&self, _url: &str) -> Result<HttpResponse, AdapterError> {
                Ok(HttpResponse::status(404))
            }
        }
        let source = Source::new("batch", AccessMode::BulkBatch, "http://q/?s={symbols}");
        let a = BulkBatchAdapter::new(source, Arc::new(Gone), &BreakerConfig::default());
        let s = syms(&["AAPL", "MSFT"]);
        let out = a.fetch(&s, &request()).unwrap();
        assert!(out.values().all(|l| *l == Lookup::NotFound));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn html_body_fails_the_call() {
        let (a, _) = adapter(PayloadFormat::Csv, "<!DOCTYPE html><p>blocked</p>");
        assert_eq!(
            a.fetch(&syms(&["AAPL"]), &request()).unwrap_err(),
            AdapterError::ErrorPage
        );
    }
}

//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use opentelemetry::trace::SpanContext;
use svc_commons::observability::tracer::{Span, SpanHandle, SpanOptions, Tracer};

/// What a recording tracer saw for one span.
#[derive(Debug, Default)]
pub struct SpanRecord {
    pub options: Option<SpanOptions>,
    pub tags: Vec<(&'static str, String)>,
    pub starts: usize,
    pub finishes: usize,
}

impl SpanRecord {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Tracer that records every span it starts.
#[derive(Default)]
pub struct RecordingTracer {
    spans: Mutex<Vec<Arc<Mutex<SpanRecord>>>>,
    pub extracted: AtomicUsize,
}

impl RecordingTracer {
    pub fn spans_started(&self) -> usize {
        self.spans.lock().unwrap().len()
    }

    /// Run `f` against the `index`-th recorded span.
    pub fn with_span<R>(&self, index: usize, f: impl FnOnce(&SpanRecord) -> R) -> R {
        let record = self.spans.lock().unwrap()[index].clone();
        let record = record.lock().unwrap();
        f(&record)
    }

    pub fn total_finishes(&self) -> usize {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.lock().unwrap().finishes)
            .sum()
    }
}

struct RecordingSpan(Arc<Mutex<SpanRecord>>);

impl Span for RecordingSpan {
    fn set_tag(&self, key: &'static str, value: String) {
        self.0.lock().unwrap().tags.push((key, value));
    }

    fn start(&self) {
        self.0.lock().unwrap().starts += 1;
    }

    fn finish(&self) {
        self.0.lock().unwrap().finishes += 1;
    }
}

impl Tracer for RecordingTracer {
    fn extract(&self, _headers: &HeaderMap) -> Option<SpanContext> {
        self.extracted.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn start_span(&self, options: SpanOptions) -> SpanHandle {
        let record = Arc::new(Mutex::new(SpanRecord {
            options: Some(options),
            ..Default::default()
        }));
        self.spans.lock().unwrap().push(record.clone());
        SpanHandle::new(RecordingSpan(record))
    }
}

//! Span capture layer for checking tracing instrumentation in tests.
//!
//! Records span creation into a thread-safe `SpanStore` so tests can assert on
//! span names, levels and fields without a real subscriber backend.
//!
//! # Usage
//!
//! ```ignore
//! let (store, _guard) = init_test_tracing();
//! // ... drive the membership service ...
//! assert!(store.has_span("membership_resource_created"));
//! ```
//!
//! Uses `tracing::subscriber::set_default()` so each test gets its own
//! subscriber on the current thread for as long as the guard lives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// A captured span: name, level and recorded fields.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub level: tracing::Level,
    pub fields: HashMap<String, String>,
}

/// Thread-safe store of captured spans.
#[derive(Debug, Clone, Default)]
pub struct SpanStore(Arc<Mutex<Vec<CapturedSpan>>>);

impl SpanStore {
    fn push(&self, span: CapturedSpan) {
        self.0.lock().unwrap().push(span);
    }

    pub fn has_span(&self, name: &str) -> bool {
        self.0.lock().unwrap().iter().any(|s| s.name == name)
    }

    pub fn find_span(&self, name: &str) -> Option<CapturedSpan> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn find_spans(&self, name: &str) -> Vec<CapturedSpan> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Captured span names in creation order.
    pub fn span_names(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|s| s.name).collect()
    }
}

/// Layer that pushes every new span into a `SpanStore`.
struct SpanCaptureLayer(SpanStore);

impl<S: Subscriber> Layer<S> for SpanCaptureLayer {
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: Context<'_, S>,
    ) {
        let mut fields = FieldVisitor(HashMap::new());
        attrs.record(&mut fields);

        let meta = attrs.metadata();
        self.0.push(CapturedSpan {
            name: meta.name(),
            level: *meta.level(),
            fields: fields.0,
        });
    }
}

struct FieldVisitor(HashMap<String, String>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

/// Capture every span created on this thread until the guard drops.
pub fn init_test_tracing() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    let store = SpanStore::default();
    let subscriber = tracing_subscriber::Registry::default().with(SpanCaptureLayer(store.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (store, guard)
}

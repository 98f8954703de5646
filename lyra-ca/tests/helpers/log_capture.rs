//! Log Capture Utilities for Testing
//!
//! Records tracing events (message plus structured fields) so tests can
//! assert on what was logged and at which level.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Captured log record
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Log capture layer for testing
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records at `level` whose message contains `pattern`
    pub fn matching(&self, level: Level, pattern: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.message.contains(pattern))
            .collect()
    }

    /// Records carrying `field = value`
    pub fn with_field(&self, field: &str, value: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.fields.get(field).map(String::as_str) == Some(value))
            .collect()
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut BTreeMap<String, String>,
}

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            *self.message = rendered;
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut message = String::new();
        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        });

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

/// Capture logs on the current thread until the guard drops
///
/// Pair with a current-thread runtime (`#[tokio::test]`) so spawned tasks log
/// into the same subscriber.
pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

use std::fmt::Write as _;
use std::sync::Arc;

use logcast_core::{EventBus, LogEvent};
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// tracing Layer that republishes events on the log bus.
///
/// Events raised on a thread that is already inside a bus publish are
/// skipped, so diagnostics from the streaming path never feed back into it.
pub struct BusLayer {
    bus: Arc<EventBus>,
    min_level: Level,
}

impl BusLayer {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            min_level: Level::INFO,
        }
    }

    /// Forward only events at `level` or more severe.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

/// Collects the `message` field and renders the rest as `key=value`.
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, serde_json::Value)>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: Vec::new(),
        }
    }

    fn render(self) -> String {
        let mut out = self.message.unwrap_or_default();
        for (name, value) in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            match value {
                serde_json::Value::String(s) => {
                    let _ = write!(out, "{name}={s}");
                }
                other => {
                    let _ = write!(out, "{name}={other}");
                }
            }
        }
        out
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields
                .push((field.name().to_string(), serde_json::Value::String(rendered)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .push((field.name().to_string(), serde_json::Value::String(value.to_string())));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .push((field.name().to_string(), serde_json::Value::Number(value.into())));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .push((field.name().to_string(), serde_json::Value::Number(value.into())));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields
                .push((field.name().to_string(), serde_json::Value::Number(n)));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .push((field.name().to_string(), serde_json::Value::Bool(value)));
    }
}

impl<S> Layer<S> for BusLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > self.min_level || EventBus::is_delivering() {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let kind = level.to_string().to_uppercase();
        self.bus.publish(LogEvent::new(kind, visitor.render()));
    }
}

//! Diagnostics sink for raw wire traffic.
//!
//! The sink is injected per session rather than installed process-wide, so
//! parallel sessions (and tests) never see each other's traffic.

/// Receives one human-readable line per event (sent body, received body).
pub trait Diagnostics: Send {
    fn log(&self, message: &str);
}

impl<F> Diagnostics for F
where
    F: Fn(&str) + Send,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Line emitted through a sink as soon as it is installed.
pub const STARTUP_LINE: &str = "Logging on";

/// Forwards sink lines to `tracing` at debug level under the `bosh::wire`
/// target, so wire dumps can be enabled separately from the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn log(&self, message: &str) {
        tracing::debug!(target: "bosh::wire", "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_is_a_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let sink = move |m: &str| captured.lock().unwrap().push(m.to_string());
        sink.log("hello");
        Diagnostics::log(&sink, "world");
        assert_eq!(*lines.lock().unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn test_tracing_sink_without_subscriber_is_silent() {
        TracingDiagnostics.log("nobody listening");
    }
}

//! Injected collaborators: supervisor readiness and the local console echo
//! sink. Both are fire-and-forget from the core's perspective.

/// Readiness notification toward a process supervisor.
///
/// Invoked exactly once, after all readiness sources are registered and
/// before the relay loop dispatches its first event.
pub trait ReadinessNotifier: Send {
    fn notify_ready(&mut self);
}

/// Receives every chunk of console output for local echo or logging. Has no
/// effect on control flow; delivery to attach clients does not depend on it.
pub trait ConsoleSink: Send {
    fn echo(&self, chunk: &[u8]);
}

/// Notifier that signals nobody.
pub struct NullNotifier;

impl ReadinessNotifier for NullNotifier {
    fn notify_ready(&mut self) {}
}

/// Sink that discards console output.
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn echo(&self, _chunk: &[u8]) {}
}

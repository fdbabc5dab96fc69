//! Notification sink - fire-and-forget user-facing messages.
//!
//! Presentation (toasts, banners) lives in the host. The core only decides
//! what to say and at which level.

/// Outbound user notifications. No return value is consumed by the core.
pub trait NotificationSink: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);
}

/// Default sink: routes notifications to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn success(&self, message: &str) {
        tracing::info!(target: "walletguard::notify", kind = "success", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "walletguard::notify", kind = "error", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "walletguard::notify", kind = "warning", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "walletguard::notify", kind = "info", "{message}");
    }
}

//! Notification sink interface.
//!
//! Every user-visible outcome (login result, cart changes, sync failures)
//! is pushed through a [`Notifier`]. Rendering is the embedding shell's
//! problem; this module only defines the payload shape and two stock sinks.
//!
//! Undoable actions cross the boundary as tagged [`UndoAction`] descriptors,
//! never as closures. The consumer resolves a descriptor against the cart's
//! public API (see `CartCache::apply_undo`).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use clementine_core::ProductId;

use crate::catalog::ProductSnapshot;

/// How prominently a notification should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
    Warning,
}

/// A reversible action offered alongside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UndoAction {
    /// Undo a cart addition by removing the product again.
    #[serde(rename_all = "camelCase")]
    CartAdd { product_id: ProductId },
}

/// A single user-facing notification.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Human-readable message.
    pub message: String,
    /// Display severity.
    pub severity: Severity,
    /// Product the notification is about, for rich rendering.
    pub product: Option<ProductSnapshot>,
    /// Action the user may take to reverse what just happened.
    pub undo: Option<UndoAction>,
}

impl Notification {
    fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            product: None,
            undo: None,
        }
    }

    /// Build a success notification.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Success)
    }

    /// Build an error notification.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Error)
    }

    /// Build an info notification.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Info)
    }

    /// Build a warning notification.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, Severity::Warning)
    }

    /// Attach a product snapshot for rich rendering.
    #[must_use]
    pub fn with_product(mut self, product: ProductSnapshot) -> Self {
        self.product = Some(product);
        self
    }

    /// Attach an undo descriptor.
    #[must_use]
    pub fn with_undo(mut self, undo: UndoAction) -> Self {
        self.undo = Some(undo);
        self
    }
}

/// Sink for user-facing notifications.
///
/// Implementations must not block; they are called from async contexts.
pub trait Notifier: Send + Sync {
    /// Deliver a notification to the user.
    fn notify(&self, notification: Notification);
}

/// Sink that emits notifications as tracing events.
///
/// Used by the CLI; severity maps onto tracing levels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let product = notification
            .product
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        match notification.severity {
            Severity::Success | Severity::Info => {
                tracing::info!(%product, "{}", notification.message);
            }
            Severity::Warning => tracing::warn!(%product, "{}", notification.message),
            Severity::Error => tracing::error!(%product, "{}", notification.message),
        }
    }
}

/// Sink that records every notification for later inspection.
///
/// Intended for tests.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recording sink behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All notifications received so far, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }

    /// Drain and return all recorded notifications.
    #[must_use]
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut self.events.lock())
    }

    /// Messages of all notifications with the given severity.
    #[must_use]
    pub fn messages_with(&self, severity: Severity) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|n| n.severity == severity)
            .map(|n| n.message.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.events.lock().push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_preserves_order() {
        let sink = RecordingNotifier::default();
        sink.notify(Notification::success("one"));
        sink.notify(Notification::error("two"));

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert_eq!(events.first().map(|n| n.message.as_str()), Some("one"));
        assert_eq!(events.last().map(|n| n.severity), Some(Severity::Error));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn test_messages_with_filters_by_severity() {
        let sink = RecordingNotifier::default();
        sink.notify(Notification::success("added"));
        sink.notify(Notification::warning("stale"));
        sink.notify(Notification::success("removed"));

        assert_eq!(sink.messages_with(Severity::Success), vec!["added", "removed"]);
        assert_eq!(sink.messages_with(Severity::Error), Vec::<String>::new());
    }

    #[test]
    fn test_undo_action_serializes_tagged() {
        let undo = UndoAction::CartAdd {
            product_id: ProductId::new("p-42"),
        };
        let json = serde_json::to_value(&undo).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"kind": "cartAdd", "productId": "p-42"})
        );
    }
}

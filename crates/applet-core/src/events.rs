//! Registry change notifications.
//!
//! Each subscriber owns an unbounded channel. Events are published while the
//! registry's state lock is held, so every subscriber observes changes in the
//! order they were applied. Nothing is batched or dropped; a subscriber whose
//! receiver has been dropped is pruned on the next publish.

use applet_schema::{AppletManifest, PackageId, ScopeId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// What happened to a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A manifest was added where none existed.
    Added,
    /// An existing manifest was replaced by a newer one.
    Replaced,
    /// A manifest was removed.
    Removed,
}

/// One applied change to a scope.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Scope the change applies to.
    pub scope: ScopeId,
    /// The package that changed.
    pub package_id: PackageId,
    /// Kind of change.
    pub kind: ChangeKind,
    /// The new manifest, or `None` on removal.
    pub manifest: Option<Arc<AppletManifest>>,
}

/// Receiving end of a subscription.
pub type ChangeReceiver = mpsc::UnboundedReceiver<ChangeEvent>;

#[derive(Debug)]
struct Subscriber {
    scope: Option<ScopeId>,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Debug, Default)]
pub(crate) struct ChangeNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeNotifier {
    /// Subscribe to one scope, or to every scope when `scope` is `None`.
    pub(crate) fn subscribe(&self, scope: Option<ScopeId>) -> ChangeReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { scope, tx });
        rx
    }

    pub(crate) fn publish(&self, event: &ChangeEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| {
            if sub.scope.as_ref().is_some_and(|s| s != &event.scope) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }
}

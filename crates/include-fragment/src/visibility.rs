//! Visibility gate for lazily loaded elements.
//!
//! A gate watches one node and fires its callback the first time the node
//! is rendered (connected, with no `hidden` ancestor). It re-checks after
//! every document mutation via the host's layout generation. A gate fires
//! at most once; disarming or dropping it tears the watcher down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::dom::{HostDocument, NodeId};

/// A one-shot visibility watcher.
pub struct VisibilityGate {
    armed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl VisibilityGate {
    /// Start watching `node`. Must be called inside a Tokio runtime.
    pub fn observe<F>(document: HostDocument, node: NodeId, on_visible: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let armed = Arc::new(AtomicBool::new(true));
        let flag = armed.clone();
        let mut layout = document.layout_changes();

        let task = tokio::spawn(async move {
            loop {
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                if document.is_rendered(node) {
                    if flag.swap(false, Ordering::SeqCst) {
                        tracing::debug!("{node:?} became visible");
                        on_visible();
                    }
                    return;
                }
                if layout.changed().await.is_err() {
                    return;
                }
            }
        });

        Self {
            armed,
            task: Some(task),
        }
    }

    /// Whether the gate has neither fired nor been disarmed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Tear the watcher down without firing.
    pub fn disarm(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for VisibilityGate {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl std::fmt::Debug for VisibilityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityGate")
            .field("armed", &self.is_armed())
            .finish()
    }
}

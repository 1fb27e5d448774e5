//! Request hooks around every outgoing storefront request.
//!
//! Hooks observe traffic without owning it: `before_send` sees the request,
//! `after_response` sees the buffered response, and the original caller still
//! receives the full response. Any number of hooks can be registered; they
//! run in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{BufferedResponse, OutgoingRequest};

/// Observer invoked around every request sent through the storefront client.
pub trait RequestHook: Send + Sync {
    /// Called before the request is sent.
    fn before_send(&self, _request: &OutgoingRequest) {}

    /// Called after the response body has been read.
    fn after_response(&self, _request: &OutgoingRequest, _response: &BufferedResponse) {}
}

/// Handle returned by [`HookChain::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Ordered set of registered hooks.
#[derive(Default)]
pub struct HookChain {
    next_id: AtomicU64,
    hooks: RwLock<Vec<(HookId, Arc<dyn RequestHook>)>>,
}

impl HookChain {
    /// Register a hook; it runs after all previously registered hooks.
    pub fn register(&self, hook: Arc<dyn RequestHook>) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, hook));
        id
    }

    /// Remove a hook. Returns `false` if it was not registered.
    pub fn unregister(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(super) fn before_send(&self, request: &OutgoingRequest) {
        for hook in self.snapshot() {
            hook.before_send(request);
        }
    }

    pub(super) fn after_response(&self, request: &OutgoingRequest, response: &BufferedResponse) {
        for hook in self.snapshot() {
            hook.after_response(request, response);
        }
    }

    // Hooks run outside the lock so they may register or unregister hooks.
    fn snapshot(&self) -> Vec<Arc<dyn RequestHook>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, hook)| Arc::clone(hook))
            .collect()
    }
}

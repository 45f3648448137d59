//! Loop-thread capability.

use std::cell::RefCell;
use std::rc::Rc;

use crate::net::{ListenerId, LocalAddr};
use crate::runtime::registry::ListenerRegistry;

/// Proof of executing on the event-loop thread.
///
/// The loop lends a token to every job it runs and to every accept task it
/// spawns. A token cannot be built outside this crate and cannot leave the
/// loop thread (it is neither `Send` nor `Sync`), so any function taking
/// `&LoopToken` is confined to the loop thread at compile time.
#[derive(Clone)]
pub struct LoopToken {
    registry: Rc<RefCell<ListenerRegistry>>,
}

impl LoopToken {
    pub(crate) fn new(registry: Rc<RefCell<ListenerRegistry>>) -> Self {
        Self { registry }
    }

    pub(crate) fn registry(&self) -> &RefCell<ListenerRegistry> {
        &self.registry
    }

    /// Number of live listeners on this loop.
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Identifiers of all live listeners, in creation order.
    pub fn listener_ids(&self) -> Vec<ListenerId> {
        self.registry.borrow().ids()
    }

    /// Address a live listener is bound to.
    pub fn local_addr(&self, listener: ListenerId) -> Option<LocalAddr> {
        self.registry
            .borrow()
            .get(listener)
            .map(|handle| handle.local_addr())
    }

    /// Run `f` against the application owned by `listener`.
    ///
    /// Returns `None` if the listener has been retired or owns an
    /// application of another type. The registry stays borrowed while `f`
    /// runs, so `f` must not create or free listeners.
    pub fn with_application<A, R>(&self, listener: ListenerId, f: impl FnOnce(&A) -> R) -> Option<R>
    where
        A: 'static,
    {
        let registry = self.registry.borrow();
        let application = registry.get(listener)?.application::<A>()?;
        Some(f(application))
    }
}

impl std::fmt::Debug for LoopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopToken")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

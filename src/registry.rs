use crate::event::ID;
use crate::split::WsSender;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Explicit bookkeeping of live connections. Each connection actor reports
/// its lifecycle here: registered when attached, removed once its Closed
/// event is out. Clone freely; all clones share the same map, but the map
/// itself is a value the caller owns, not process-wide state.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<ID, WsSender>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: ID, sender: WsSender) {
        self.lock().insert(id, sender);
    }

    pub(crate) fn deregister(&self, id: &ID) {
        self.lock().remove(id);
    }

    /// The sending handle of one live connection.
    pub fn sender(&self, id: &ID) -> Option<WsSender> {
        self.lock().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<ID> {
        self.lock().keys().copied().collect()
    }

    /// Snapshot of every live connection, e.g. to fan a message out.
    pub fn senders(&self) -> Vec<(ID, WsSender)> {
        self.lock()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ID, WsSender>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Registry of live worker processes, keyed by trace id.
//!
//! The supervisor registers a [`CancellationToken`] for each process it
//! spawns and kills the child when the token fires. Cancellation and
//! shutdown reach running workers through here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a process. The entry is removed when the returned guard is
    /// dropped.
    pub fn register(&self, trace_id: &str) -> Registration {
        let token = CancellationToken::new();
        self.lock().insert(trace_id.to_string(), token.clone());
        Registration {
            registry: self.clone(),
            trace_id: trace_id.to_string(),
            token,
        }
    }

    /// Signal the process registered under `trace_id`. Returns `false` if
    /// no such process is running.
    pub fn cancel(&self, trace_id: &str) -> bool {
        match self.lock().get(trace_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every registered process. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let map = self.lock();
        for token in map.values() {
            token.cancel();
        }
        map.len()
    }

    pub fn is_running(&self, trace_id: &str) -> bool {
        self.lock().contains_key(trace_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle held by the supervisor for the lifetime of one process.
pub struct Registration {
    registry: ProcessRegistry,
    trace_id: String,
    token: CancellationToken,
}

impl Registration {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.trace_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signals_registered_token() {
        let registry = ProcessRegistry::new();
        let registration = registry.register("trc_1");
        assert!(registry.is_running("trc_1"));

        assert!(registry.cancel("trc_1"));
        assert!(registration.token().is_cancelled());
    }

    #[test]
    fn cancel_unknown_trace_id_is_false() {
        assert!(!ProcessRegistry::new().cancel("trc_missing"));
    }

    #[test]
    fn dropping_registration_removes_entry() {
        let registry = ProcessRegistry::new();
        {
            let _registration = registry.register("trc_2");
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        assert!(!registry.cancel("trc_2"));
    }

    #[test]
    fn cancel_all_reaches_every_process() {
        let registry = ProcessRegistry::new();
        let a = registry.register("trc_a");
        let b = registry.register("trc_b");
        assert_eq!(registry.cancel_all(), 2);
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
    }
}

//! Local bookkeeping of named sessions.
//!
//! Session state itself lives in the backend and outlives this process. The
//! registry only remembers which incarnation of a name this process has
//! attached to, so a handle can tell when its session was destroyed (and
//! possibly recreated under the same name) behind its back.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::backend::SessionKind;
use crate::error::{DrmaaError, DrmaaResult};

#[derive(Default)]
pub(crate) struct SessionRegistry {
    live: Mutex<FxHashMap<String, u64>>,
    next_incarnation: AtomicU64,
}

impl SessionRegistry {
    pub(crate) fn generate_name(prefix: &str, kind: SessionKind) -> String {
        format!("{prefix}-{kind}-{}", Uuid::new_v4())
    }

    /// Attach a handle to `name`, reusing the current incarnation if this
    /// process already knows it.
    pub(crate) fn attach(&self, name: &str) -> SessionHandle {
        let incarnation = *self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| self.next_incarnation.fetch_add(1, Ordering::Relaxed));
        SessionHandle {
            name: name.to_string(),
            incarnation,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn forget(&self, name: &str) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn is_live(&self, name: &str, incarnation: u64) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|current| *current == incarnation)
    }
}

/// The part of a session object that decides whether it is still usable.
#[derive(Debug)]
pub(crate) struct SessionHandle {
    name: String,
    incarnation: u64,
    closed: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn check(&self, registry: &SessionRegistry) -> DrmaaResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DrmaaError::InvalidSession(format!(
                "session {} is closed",
                self.name
            )));
        }
        if !registry.is_live(&self.name, self.incarnation) {
            return Err(DrmaaError::InvalidSession(format!(
                "session {} was destroyed",
                self.name
            )));
        }
        Ok(())
    }

    /// Mark the handle closed. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names_are_unique() {
        let a = SessionRegistry::generate_name("drmaa2", SessionKind::Job);
        let b = SessionRegistry::generate_name("drmaa2", SessionKind::Job);
        assert!(a.starts_with("drmaa2-job-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_close_is_idempotent() {
        let registry = SessionRegistry::default();
        let handle = registry.attach("s");
        assert!(handle.check(&registry).is_ok());
        assert!(handle.close());
        assert!(!handle.close());
        assert!(matches!(
            handle.check(&registry),
            Err(DrmaaError::InvalidSession(_))
        ));
        // Closing one handle leaves the name attached for others.
        assert!(registry.attach("s").check(&registry).is_ok());
    }

    #[test]
    fn test_recreated_name_invalidates_old_handles() {
        let registry = SessionRegistry::default();
        let old = registry.attach("s");
        let sibling = registry.attach("s");
        assert!(sibling.check(&registry).is_ok());

        registry.forget("s");
        assert!(old.check(&registry).is_err());

        let fresh = registry.attach("s");
        assert!(fresh.check(&registry).is_ok());
        assert!(old.check(&registry).is_err());
    }
}

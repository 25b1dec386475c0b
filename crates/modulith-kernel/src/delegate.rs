//! Generic multicast delegate list.
//!
//! [`DelegateList`] is an ordered, deduplicated callback list used for the
//! module-listener notification path.  Subscribers are identified by an
//! equality-comparable key -- the owning module plus a caller-chosen listener
//! id -- so adding the same key twice is refused and removal matches the
//! first structural equal.
//!
//! Dispatch takes a locked snapshot, releases the lock, then invokes every
//! delegate in registration order.  A delegate is free to re-enter the list
//! (add or remove subscribers) from inside its own notification, and a
//! panicking delegate is caught and logged without disturbing delivery to
//! the rest.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use crate::ModuleId;
use crate::lock;

/// An ordered, deduplicated, thread-safe multicast callback list.
pub struct DelegateList<E> {
    inner: Mutex<Vec<Delegate<E>>>,
}

struct Delegate<E> {
    module_id: ModuleId,
    id: String,
    callback: Arc<dyn Fn(&E) + Send + Sync>,
}

impl<E> Clone for Delegate<E> {
    fn clone(&self) -> Self {
        Self {
            module_id: self.module_id,
            id: self.id.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<E> DelegateList<E> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe a delegate under `(module_id, id)`.
    ///
    /// Idempotent: if the key is already subscribed the call is refused and
    /// `false` is returned; the existing delegate stays in place.
    pub fn add(
        &self,
        module_id: ModuleId,
        id: impl Into<String>,
        callback: Arc<dyn Fn(&E) + Send + Sync>,
    ) -> bool {
        let id = id.into();
        let mut delegates = lock(&self.inner);
        if delegates
            .iter()
            .any(|d| d.module_id == module_id && d.id == id)
        {
            return false;
        }
        delegates.push(Delegate {
            module_id,
            id,
            callback,
        });
        true
    }

    /// Remove the first delegate matching `(module_id, id)`.
    pub fn remove(&self, module_id: ModuleId, id: &str) -> bool {
        let mut delegates = lock(&self.inner);
        if let Some(pos) = delegates
            .iter()
            .position(|d| d.module_id == module_id && d.id == id)
        {
            delegates.remove(pos);
            true
        } else {
            false
        }
    }

    /// Remove every delegate owned by `module_id`.  Returns how many were
    /// removed.
    pub fn remove_all(&self, module_id: ModuleId) -> usize {
        let mut delegates = lock(&self.inner);
        let before = delegates.len();
        delegates.retain(|d| d.module_id != module_id);
        before - delegates.len()
    }

    /// Dispatch an event to every subscriber, in registration order.
    ///
    /// The subscriber list is snapshotted and the lock released before any
    /// delegate runs.  Panics escaping a delegate are caught and logged.
    pub fn send(&self, event: &E) {
        let snapshot: Vec<Delegate<E>> = lock(&self.inner).clone();
        for delegate in snapshot {
            let callback = Arc::clone(&delegate.callback);
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    module_id = delegate.module_id,
                    listener_id = %delegate.id,
                    "delegate panicked during dispatch"
                );
            }
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    /// Whether the list has no subscribers.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl<E> Default for DelegateList<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(counter: &Arc<AtomicU32>) -> Arc<dyn Fn(&u32) + Send + Sync> {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn add_is_idempotent_per_key() {
        let list: DelegateList<u32> = DelegateList::new();
        let counter = Arc::new(AtomicU32::new(0));

        assert!(list.add(1, "a", counting(&counter)));
        assert!(!list.add(1, "a", counting(&counter)));
        assert!(list.add(1, "b", counting(&counter)));
        assert!(list.add(2, "a", counting(&counter)));
        assert_eq!(list.len(), 3);

        list.send(&0);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remove_deletes_first_match_only() {
        let list: DelegateList<u32> = DelegateList::new();
        let counter = Arc::new(AtomicU32::new(0));

        list.add(1, "a", counting(&counter));
        assert!(list.remove(1, "a"));
        assert!(!list.remove(1, "a"));
        assert!(list.is_empty());
    }

    #[test]
    fn remove_all_drops_only_that_module() {
        let list: DelegateList<u32> = DelegateList::new();
        let counter = Arc::new(AtomicU32::new(0));

        list.add(1, "a", counting(&counter));
        list.add(1, "b", counting(&counter));
        list.add(2, "a", counting(&counter));

        assert_eq!(list.remove_all(1), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn dispatch_preserves_registration_order() {
        let list: DelegateList<u32> = DelegateList::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            list.add(
                1,
                name,
                Arc::new(move |_: &u32| {
                    order.lock().unwrap().push(name);
                }),
            );
        }

        list.send(&0);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn panicking_delegate_does_not_block_later_ones() {
        let list: DelegateList<u32> = DelegateList::new();
        let counter = Arc::new(AtomicU32::new(0));

        list.add(1, "boom", Arc::new(|_: &u32| panic!("listener failure")));
        list.add(1, "after", counting(&counter));

        list.send(&0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delegate_may_reenter_the_list() {
        let list: Arc<DelegateList<u32>> = Arc::new(DelegateList::new());
        let reentrant = Arc::clone(&list);
        list.add(
            1,
            "self-removing",
            Arc::new(move |_: &u32| {
                reentrant.remove(1, "self-removing");
            }),
        );

        list.send(&0);
        assert!(list.is_empty());
    }
}

//! # Subscription Module
//!
//! Registry of callbacks interested in new readings.
//!
//! The list is copy-on-write: registering or removing a callback swaps in a
//! new `Arc<Vec<_>>`, while a notification iterates over the snapshot it
//! took when it started. Callbacks run with no lock held, so a callback may
//! itself subscribe or unsubscribe. A callback registered while a
//! notification is in flight may or may not see that reading, and sees every
//! later one. A panicking callback is logged and skipped; the remaining
//! callbacks still run.

use log::{error, trace};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Boxed subscriber callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

/// Callback registry shared between a publisher and its subscription handles.
pub struct Subscribers<T> {
    entries: RwLock<Arc<Vec<Entry<T>>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Subscribers<T> {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        })
    }

    /// Registers `callback`; it stays registered until the handle is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> SubscriptionHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            callback: Arc::new(callback),
        };
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let mut next: Vec<Entry<T>> = entries.iter().cloned().collect();
            next.push(entry);
            *entries = Arc::new(next);
        }
        trace!("subscriber {id} registered");

        let registry: Arc<dyn Unsubscribe> = Arc::clone(self) as Arc<dyn Unsubscribe>;
        SubscriptionHandle {
            inner: vec![(Arc::downgrade(&registry), id)],
        }
    }

    /// Calls every currently registered callback with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&entries)
        };
        for entry in snapshot.iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (entry.callback)(value))) {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!("subscriber {} panicked: {message}", entry.id);
            }
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True when nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: u64);
}

impl<T: 'static> Unsubscribe for Subscribers<T> {
    fn unsubscribe(&self, id: u64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|entry| entry.id == id) {
            let next: Vec<Entry<T>> = entries.iter().filter(|e| e.id != id).cloned().collect();
            *entries = Arc::new(next);
            trace!("subscriber {id} removed");
        }
    }
}

/// Keeps one or more callbacks registered. Dropping it unsubscribes them.
///
/// The handle only holds weak references to the registries, so it never
/// keeps an acquisition loop alive.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct SubscriptionHandle {
    inner: Vec<(Weak<dyn Unsubscribe>, u64)>,
}

impl SubscriptionHandle {
    /// Merges several handles into one that releases all of them together.
    pub fn combine(handles: impl IntoIterator<Item = SubscriptionHandle>) -> Self {
        let mut inner = Vec::new();
        for mut handle in handles {
            inner.append(&mut handle.inner);
        }
        Self { inner }
    }

    /// Unsubscribes now. Same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        for (registry, id) in self.inner.drain(..) {
            if let Some(registry) = registry.upgrade() {
                registry.unsubscribe(id);
            }
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("ids", &self.inner.iter().map(|(_, id)| *id).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_notify_reaches_every_subscriber() {
        let subs = Subscribers::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = {
            let seen = Arc::clone(&seen);
            subs.subscribe(move |v| seen.lock().unwrap().push(("a", *v)))
        };
        let b = {
            let seen = Arc::clone(&seen);
            subs.subscribe(move |v| seen.lock().unwrap().push(("b", *v)))
        };
        subs.notify(&1);
        subs.notify(&2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.iter().filter(|(s, _)| *s == "a").count(), 2);
        assert_eq!(seen.iter().filter(|(s, _)| *s == "b").count(), 2);
        drop((a, b));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subs = Subscribers::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));
        let handle = {
            let count = Arc::clone(&count);
            subs.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        subs.notify(&1);
        assert_eq!(subs.len(), 1);
        handle.unsubscribe();
        subs.notify(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(subs.is_empty());
    }

    #[test]
    fn test_subscribe_from_inside_callback() {
        let subs = Subscribers::<u32>::new();
        let late = Arc::new(Mutex::new(Vec::new()));
        let late_handles = Arc::new(Mutex::new(Vec::new()));
        let _first = {
            let subs_inner = Arc::clone(&subs);
            let late = Arc::clone(&late);
            let late_handles = Arc::clone(&late_handles);
            subs.subscribe(move |v| {
                if *v == 1 {
                    let late = Arc::clone(&late);
                    let handle = subs_inner.subscribe(move |v| late.lock().unwrap().push(*v));
                    late_handles.lock().unwrap().push(handle);
                }
            })
        };
        subs.notify(&1);
        subs.notify(&2);
        subs.notify(&3);
        // The late subscriber missed the in-flight value and saw every later one.
        assert_eq!(*late.lock().unwrap(), vec![2, 3]);
        late_handles.lock().unwrap().clear();
    }

    #[test]
    fn test_unsubscribe_from_inside_callback() {
        let subs = Subscribers::<u32>::new();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(AtomicU64::new(0));
        let handle = {
            let slot = Arc::clone(&slot);
            let count = Arc::clone(&count);
            subs.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                let taken = slot.lock().unwrap().take();
                drop(taken);
            })
        };
        *slot.lock().unwrap() = Some(handle);
        subs.notify(&1);
        subs.notify(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_combined_handle_releases_all() {
        let first = Subscribers::<u32>::new();
        let second = Subscribers::<u32>::new();
        let handle = SubscriptionHandle::combine([
            first.subscribe(|_| {}),
            second.subscribe(|_| {}),
        ]);
        assert_eq!(first.len() + second.len(), 2);
        drop(handle);
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let subs = Subscribers::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _bad = subs.subscribe(|v| {
            if *v == 1 {
                panic!("callback failed on {v}");
            }
        });
        let _good = {
            let seen = Arc::clone(&seen);
            subs.subscribe(move |v| seen.lock().unwrap().push(*v))
        };
        subs.notify(&1);
        subs.notify(&2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn test_handle_outlives_registry() {
        let subs = Subscribers::<u32>::new();
        let handle = subs.subscribe(|_| {});
        drop(subs);
        drop(handle);
    }
}

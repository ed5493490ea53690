// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Lazily resolved, death-invalidated service handle.

use std::sync::Arc;
use std::sync::Weak;

use base::error;
use base::info;
use sync::Mutex;

use crate::DeathRecipient;
use crate::ServiceManager;
use crate::SpBinder;

/// Turns a raw binder into the typed interface handed out by the cache.
pub type InterfaceCast<T> = fn(SpBinder) -> Arc<T>;

struct Cached<T: ?Sized> {
    interface: Arc<T>,
    // Keeps the transport (and with it the death link) alive while the handle is cached.
    _binder: SpBinder,
    generation: u64,
}

struct State<T: ?Sized> {
    cached: Option<Cached<T>>,
    generation: u64,
}

struct Inner<T: ?Sized> {
    service_manager: Arc<dyn ServiceManager>,
    name: String,
    as_interface: InterfaceCast<T>,
    state: Mutex<State<T>>,
}

impl<T: ?Sized> Inner<T> {
    fn binder_died(&self, generation: u64) {
        let stale = {
            let mut state = self.state.lock();
            match &state.cached {
                Some(cached) if cached.generation == generation => state.cached.take(),
                _ => None,
            }
        };
        if stale.is_some() {
            info!("{} died, dropping cached handle", self.name);
        }
    }
}

/// Memoizes the handle to one named service.
///
/// The first [`get`](Self::get) looks the service up and links a death recipient to it; later
/// calls return the same handle until the service dies, after which the next call looks it up
/// again. A failed lookup or death link is not remembered. Errors on calls made through the
/// handle do not affect the cache.
pub struct LazyServiceCache<T: ?Sized + Send + Sync + 'static> {
    inner: Arc<Inner<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyServiceCache<T> {
    pub fn new(
        service_manager: Arc<dyn ServiceManager>,
        name: impl Into<String>,
        as_interface: InterfaceCast<T>,
    ) -> Self {
        LazyServiceCache {
            inner: Arc::new(Inner {
                service_manager,
                name: name.into(),
                as_interface,
                state: Mutex::new(State {
                    cached: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Returns the cached handle, resolving it first if needed.
    ///
    /// Lookup and death registration happen under the cache lock, so concurrent first callers
    /// share a single lookup. The lock is not held by the caller once the handle is returned.
    pub fn get(&self) -> Option<Arc<T>> {
        let mut state = self.inner.state.lock();
        if let Some(cached) = &state.cached {
            return Some(Arc::clone(&cached.interface));
        }

        let name = &self.inner.name;
        let binder = match self.inner.service_manager.wait_for_declared_service(name) {
            Some(binder) => binder,
            None => {
                error!("Unable to find {}", name);
                return None;
            }
        };
        info!("Resolved {}", name);

        state.generation += 1;
        let generation = state.generation;
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        let recipient = DeathRecipient::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.binder_died(generation);
            }
        });
        if let Err(e) = binder.link_to_death(&recipient) {
            // Without a death link the handle could never be evicted.
            error!("Unable to register DeathRecipient for {}: {}", name, e);
            return None;
        }

        let interface = (self.inner.as_interface)(Arc::clone(&binder));
        state.cached = Some(Cached {
            interface: Arc::clone(&interface),
            _binder: binder,
            generation,
        });
        Some(interface)
    }

    /// Whether a handle is currently cached.
    pub fn is_resolved(&self) -> bool {
        self.inner.state.lock().cached.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use serde_json::json;
    use serde_json::Value;

    use super::*;
    use crate::fake::FakeServiceManager;
    use crate::IBinder;
    use crate::Result;
    use crate::Service;

    const NAME: &str = "test.IEcho/default";

    struct Echo;

    impl Service for Echo {
        fn on_transact(&self, _code: u32, data: Value) -> Result<Value> {
            Ok(data)
        }
    }

    fn raw_binder(binder: SpBinder) -> Arc<dyn IBinder> {
        binder
    }

    fn new_cache(sm: &Arc<FakeServiceManager>) -> LazyServiceCache<dyn IBinder> {
        LazyServiceCache::new(sm.clone(), NAME, raw_binder)
    }

    #[test]
    fn memoizes_handle() {
        let sm = Arc::new(FakeServiceManager::new());
        let binder = sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(sm.lookup_count(), 1);
        assert_eq!(binder.link_count(), 1);
    }

    #[test]
    fn missing_service_is_not_cached() {
        let sm = Arc::new(FakeServiceManager::new());
        let cache = new_cache(&sm);

        assert!(cache.get().is_none());
        assert!(!cache.is_resolved());
        assert!(cache.get().is_none());
        assert_eq!(sm.lookup_count(), 2);

        sm.add_service(NAME, Arc::new(Echo));
        assert!(cache.get().is_some());
        assert_eq!(sm.lookup_count(), 3);
    }

    #[test]
    fn death_forces_fresh_lookup() {
        let sm = Arc::new(FakeServiceManager::new());
        let old = sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);

        let first = cache.get().unwrap();
        old.kill();
        assert!(!cache.is_resolved());

        let new = sm.add_service(NAME, Arc::new(Echo));
        let second = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(sm.lookup_count(), 2);
        assert_eq!(new.link_count(), 1);
        assert_eq!(second.transact(1, json!("hi")).unwrap(), json!("hi"));
    }

    #[test]
    fn death_with_no_replacement_yields_none() {
        let sm = Arc::new(FakeServiceManager::new());
        let binder = sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);

        assert!(cache.get().is_some());
        binder.kill();
        assert!(cache.get().is_none());
    }

    #[test]
    fn failed_transaction_keeps_handle() {
        let sm = Arc::new(FakeServiceManager::new());
        let binder = sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);

        binder.set_fail_transactions(true);
        assert!(cache.get().unwrap().transact(1, json!(1)).is_err());
        binder.set_fail_transactions(false);
        assert_eq!(
            cache.get().unwrap().transact(1, json!(2)).unwrap(),
            json!(2)
        );
        assert_eq!(sm.lookup_count(), 1);
    }

    #[test]
    fn link_failure_leaves_cache_unresolved() {
        let sm = Arc::new(FakeServiceManager::new());
        let old = sm.add_service(NAME, Arc::new(Echo));
        old.set_fail_links(true);
        let cache = new_cache(&sm);

        assert!(cache.get().is_none());
        assert!(!cache.is_resolved());
        assert_eq!(old.link_count(), 0);

        // The service dies before it could be linked; a replacement must still be found.
        old.kill();
        let new = sm.add_service(NAME, Arc::new(Echo));
        let handle = cache.get().unwrap();
        assert_eq!(sm.lookup_count(), 2);
        assert_eq!(new.link_count(), 1);
        assert_eq!(handle.transact(1, json!("up")).unwrap(), json!("up"));
    }

    #[test]
    fn stale_notification_is_ignored() {
        let sm = Arc::new(FakeServiceManager::new());
        sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);
        cache.get().unwrap();

        // A notification carrying an older generation must not evict the current handle.
        cache.inner.binder_died(0);
        assert!(cache.is_resolved());
    }

    #[test]
    fn cache_drop_detaches_recipient() {
        let sm = Arc::new(FakeServiceManager::new());
        let binder = sm.add_service(NAME, Arc::new(Echo));
        let cache = new_cache(&sm);
        cache.get().unwrap();
        drop(cache);

        // The recipient only holds a weak reference; firing it after the cache is gone is a no-op.
        binder.kill();
    }

    #[test]
    fn concurrent_first_get_registers_once() {
        const THREADS: usize = 8;

        let sm = Arc::new(FakeServiceManager::new());
        let binder = sm.add_service(NAME, Arc::new(Echo));
        sm.set_lookup_delay(Duration::from_millis(50));
        let cache = Arc::new(new_cache(&sm));
        let barrier = Arc::new(Barrier::new(THREADS));

        let threads: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get().unwrap()
                })
            })
            .collect();
        let handles: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(sm.lookup_count(), 1);
        assert_eq!(binder.link_count(), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}

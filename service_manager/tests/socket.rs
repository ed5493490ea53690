// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde_json::json;
use serde_json::Value;
use service_manager::DeathRecipient;
use service_manager::Error;
use service_manager::IBinder;
use service_manager::LazyServiceCache;
use service_manager::Result;
use service_manager::Service;
use service_manager::ServiceHost;
use service_manager::ServiceManager;
use service_manager::SocketServiceManager;
use service_manager::SpBinder;

const NAME: &str = "test.ICounter/default";
const WAIT: Duration = Duration::from_secs(5);

struct Counter(AtomicUsize);

impl Service for Counter {
    fn on_transact(&self, code: u32, data: Value) -> Result<Value> {
        match code {
            1 => {
                let by = data.as_u64().unwrap_or(1) as usize;
                Ok(json!(self.0.fetch_add(by, Ordering::SeqCst) + by))
            }
            2 => Err(Error::FailedTransaction(String::from("counter is read only"))),
            code => Err(Error::UnknownTransaction(code)),
        }
    }
}

fn publish(dir: &std::path::Path) -> ServiceHost {
    ServiceHost::publish(dir, NAME, Arc::new(Counter(AtomicUsize::new(0)))).unwrap()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn transact_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let _host = publish(dir.path());
    let sm = SocketServiceManager::new(dir.path(), WAIT);

    let binder = sm.wait_for_declared_service(NAME).unwrap();
    assert_eq!(binder.descriptor(), NAME);
    assert_eq!(binder.transact(1, json!(2)).unwrap(), json!(2));
    assert_eq!(binder.transact(1, json!(3)).unwrap(), json!(5));
    assert!(matches!(
        binder.transact(2, Value::Null),
        Err(Error::FailedTransaction(_))
    ));
    assert!(matches!(
        binder.transact(99, Value::Null),
        Err(Error::UnknownTransaction(99))
    ));
}

#[test]
fn concurrent_transactions_share_one_connection() {
    let dir = tempfile::tempdir().unwrap();
    let _host = publish(dir.path());
    let sm = SocketServiceManager::new(dir.path(), WAIT);
    let binder = sm.wait_for_declared_service(NAME).unwrap();

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let binder = Arc::clone(&binder);
            thread::spawn(move || {
                for _ in 0..50 {
                    // Every reply is a running total, never another caller's error or echo.
                    assert!(binder.transact(1, json!(1)).unwrap().as_u64().is_some());
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }
    assert_eq!(binder.transact(1, json!(0)).unwrap(), json!(200));
}

#[test]
fn lookup_waits_for_late_publish() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_owned();
    let publisher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        publish(&path)
    });

    let sm = SocketServiceManager::new(dir.path(), WAIT);
    let binder = sm.wait_for_declared_service(NAME).unwrap();
    assert_eq!(binder.transact(1, json!(1)).unwrap(), json!(1));
    drop(publisher.join().unwrap());
}

#[test]
fn host_shutdown_fires_death_once() {
    let dir = tempfile::tempdir().unwrap();
    let host = publish(dir.path());
    let sm = SocketServiceManager::new(dir.path(), WAIT);
    let binder = sm.wait_for_declared_service(NAME).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    binder
        .link_to_death(&DeathRecipient::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    host.shutdown();
    assert!(wait_until(|| fired.load(Ordering::SeqCst) == 1));
    assert!(!binder.is_binder_alive());
    assert!(matches!(
        binder.transact(1, json!(1)),
        Err(Error::DeadObject)
    ));
    assert!(!service_manager::socket_path(dir.path(), NAME).exists());

    thread::sleep(Duration::from_millis(50));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn dropped_binder_does_not_fire() {
    let dir = tempfile::tempdir().unwrap();
    let host = publish(dir.path());
    let sm = SocketServiceManager::new(dir.path(), WAIT);
    let binder = sm.wait_for_declared_service(NAME).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    binder
        .link_to_death(&DeathRecipient::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    drop(binder);
    host.shutdown();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn binder_dropped_by_own_recipient() {
    let dir = tempfile::tempdir().unwrap();
    let host = publish(dir.path());
    let sm = SocketServiceManager::new(dir.path(), WAIT);
    let slot: Arc<sync::Mutex<Option<SpBinder>>> = Arc::new(sync::Mutex::new(None));

    let binder = sm.wait_for_declared_service(NAME).unwrap();
    let recipient_slot = Arc::clone(&slot);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    binder
        .link_to_death(&DeathRecipient::new(move || {
            // Releases the last reference, so the binder is dropped on its own watcher thread.
            let last = recipient_slot.lock().take();
            drop(last);
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    *slot.lock() = Some(binder);

    host.shutdown();
    assert!(wait_until(|| fired.load(Ordering::SeqCst) == 1));
    assert!(slot.lock().is_none());
}

fn raw_binder(binder: SpBinder) -> Arc<dyn IBinder> {
    binder
}

#[test]
fn cache_follows_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let host = publish(dir.path());
    let sm: Arc<dyn ServiceManager> = Arc::new(SocketServiceManager::new(dir.path(), WAIT));
    let cache = LazyServiceCache::new(sm, NAME, raw_binder);

    let first = cache.get().unwrap();
    assert_eq!(first.transact(1, json!(4)).unwrap(), json!(4));

    host.shutdown();
    assert!(wait_until(|| !cache.is_resolved()));

    let _host = publish(dir.path());
    let second = cache.get().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    // A fresh service instance starts counting from zero.
    assert_eq!(second.transact(1, json!(1)).unwrap(), json!(1));
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-process registry and binder for tests.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;
use sync::Mutex;

use crate::DeathRecipient;
use crate::Error;
use crate::IBinder;
use crate::Result;
use crate::Service;
use crate::ServiceManager;
use crate::SpBinder;

/// A registry of in-process services.
///
/// Lookups of a name that is missing, or whose binder was killed, return `None` immediately.
#[derive(Default)]
pub struct FakeServiceManager {
    services: Mutex<HashMap<String, Arc<FakeBinder>>>,
    lookups: AtomicUsize,
    lookup_delay: Mutex<Duration>,
}

impl FakeServiceManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `service` as `name`, replacing any previous registration.
    pub fn add_service(&self, name: &str, service: Arc<dyn Service>) -> Arc<FakeBinder> {
        let binder = Arc::new(FakeBinder::new(name, service));
        self.services
            .lock()
            .insert(name.to_owned(), Arc::clone(&binder));
        binder
    }

    pub fn remove_service(&self, name: &str) -> Option<Arc<FakeBinder>> {
        self.services.lock().remove(name)
    }

    /// Makes every lookup sleep for `delay` before answering.
    pub fn set_lookup_delay(&self, delay: Duration) {
        *self.lookup_delay.lock() = delay;
    }

    /// Number of `wait_for_declared_service` calls so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ServiceManager for FakeServiceManager {
    fn wait_for_declared_service(&self, name: &str) -> Option<SpBinder> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let binder = self.services.lock().get(name).cloned()?;
        if binder.is_binder_alive() {
            Some(binder as SpBinder)
        } else {
            None
        }
    }
}

/// A binder that dispatches straight into a local `Service`.
pub struct FakeBinder {
    name: String,
    service: Arc<dyn Service>,
    alive: AtomicBool,
    recipients: Mutex<Vec<DeathRecipient>>,
    links: AtomicUsize,
    transactions: AtomicUsize,
    fail_transactions: AtomicBool,
    fail_links: AtomicBool,
}

impl FakeBinder {
    pub fn new(name: &str, service: Arc<dyn Service>) -> Self {
        FakeBinder {
            name: name.to_owned(),
            service,
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
            links: AtomicUsize::new(0),
            transactions: AtomicUsize::new(0),
            fail_transactions: AtomicBool::new(false),
            fail_links: AtomicBool::new(false),
        }
    }

    /// Marks the object dead and fires every linked recipient once, on the calling thread.
    pub fn kill(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let recipients = mem::take(&mut *self.recipients.lock());
        for recipient in recipients {
            recipient.binder_died();
        }
    }

    /// While set, every transaction fails as if the transport broke.
    pub fn set_fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    /// While set, `link_to_death` is refused.
    pub fn set_fail_links(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::SeqCst);
    }

    pub fn link_count(&self) -> usize {
        self.links.load(Ordering::SeqCst)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }
}

impl IBinder for FakeBinder {
    fn descriptor(&self) -> &str {
        &self.name
    }

    fn transact(&self, code: u32, data: Value) -> Result<Value> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        if !self.is_binder_alive() {
            return Err(Error::DeadObject);
        }
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(Error::FailedTransaction(String::from(
                "injected transport failure",
            )));
        }
        self.service.on_transact(code, data)
    }

    fn link_to_death(&self, recipient: &DeathRecipient) -> Result<()> {
        if !self.is_binder_alive() || self.fail_links.load(Ordering::SeqCst) {
            return Err(Error::DeadObject);
        }
        self.links.fetch_add(1, Ordering::SeqCst);
        self.recipients.lock().push(recipient.clone());
        Ok(())
    }

    fn is_binder_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

// Copyright 2018 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sync primitives that panic on poison rather than returning an error.
//!
//! `Mutex` and `Condvar` mirror their `std::sync` counterparts. `Promise` and `Waitable` form a
//! one-shot completion signal: a callback running on some other thread signals the `Promise`,
//! and the thread that issued the request blocks on the `Waitable` with a deadline.

mod condvar;
mod mutex;

use std::sync::Arc;
use std::time::Duration;

pub use crate::condvar::Condvar;
pub use crate::mutex::Mutex;

type Signal = Arc<(Condvar, Mutex<bool>)>;

/// The waiting half of a one-shot completion signal.
pub struct Waitable(Signal);

impl Waitable {
    /// Blocks until the paired `Promise` is signaled or `timeout` elapses.
    ///
    /// Returns true if the signal arrived. A `None` timeout waits forever.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let (ref condvar, ref signaled) = *self.0;
        match timeout {
            Some(timeout) => {
                let (guard, _) =
                    condvar.wait_timeout_while(signaled.lock(), timeout, |signaled| !*signaled);
                *guard
            }
            None => *condvar.wait_while(signaled.lock(), |signaled| !*signaled),
        }
    }
}

/// The signaling half of a one-shot completion signal. Cloneable so it can be moved into a
/// callback while the issuer keeps a copy.
#[derive(Clone)]
pub struct Promise(Signal);

impl Promise {
    /// Signals the paired `Waitable`. Signaling more than once has no further effect.
    pub fn signal(&self) {
        let (ref condvar, ref signaled) = *self.0;
        *signaled.lock() = true;
        condvar.notify_all();
    }
}

/// Creates a connected `Promise`/`Waitable` pair.
pub fn create_promise_and_waitable() -> (Promise, Waitable) {
    let inner = Arc::new((Condvar::new(), Mutex::new(false)));
    (Promise(Arc::clone(&inner)), Waitable(inner))
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn signal_from_other_thread() {
        let (promise, waitable) = create_promise_and_waitable();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.signal();
        });
        assert!(waitable.wait(Some(Duration::from_secs(5))));
        worker.join().unwrap();
    }

    #[test]
    fn wait_times_out_without_signal() {
        let (_promise, waitable) = create_promise_and_waitable();
        let start = Instant::now();
        assert!(!waitable.wait(Some(Duration::from_millis(50))));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn signal_before_wait() {
        let (promise, waitable) = create_promise_and_waitable();
        promise.clone().signal();
        promise.signal();
        assert!(waitable.wait(None));
        assert!(waitable.wait(Some(Duration::ZERO)));
    }
}

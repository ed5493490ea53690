// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Worker thread abstraction

use std::io;
use std::panic;
use std::thread;
use std::thread::JoinHandle;

type StopFn = Box<dyn Fn() + Send>;

/// A named thread that is stopped and joined when the `WorkerThread` is stopped or dropped.
///
/// Stopping runs the `stop` action given to [`start`](Self::start), which must make the thread
/// function return (for example by shutting down the connection it is blocked on). The action
/// may run more than once.
pub struct WorkerThread<T: Send + 'static> {
    worker: Option<(StopFn, JoinHandle<T>)>,
}

impl<T: Send + 'static> WorkerThread<T> {
    /// Starts a worker thread named `thread_name` running `thread_func`.
    pub fn start<F, S>(thread_name: impl Into<String>, thread_func: F, stop: S) -> io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
        S: Fn() + Send + 'static,
    {
        let thread_handle = thread::Builder::new()
            .name(thread_name.into())
            .spawn(thread_func)?;

        Ok(WorkerThread {
            worker: Some((Box::new(stop), thread_handle)),
        })
    }

    /// Stops the worker thread.
    ///
    /// Returns the value returned by the thread function, or `None` when called from the worker
    /// itself, in which case the thread is told to stop but cannot be joined.
    pub fn stop(mut self) -> Option<T> {
        self.stop_internal()
    }

    /// Runs the stop action without waiting for the thread. Calling `stop` or dropping the
    /// `WorkerThread` runs it again and joins the thread.
    pub fn signal(&self) {
        if let Some((stop, _)) = &self.worker {
            stop();
        }
    }

    /// Whether the thread function has returned.
    pub fn is_finished(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(true, |(_, thread_handle)| thread_handle.is_finished())
    }

    // `stop_internal` accepts a reference so it can be called from `drop`.
    fn stop_internal(&mut self) -> Option<T> {
        let (stop, thread_handle) = self.worker.take()?;
        stop();
        if thread_handle.thread().id() == thread::current().id() {
            return None;
        }
        match thread_handle.join() {
            Ok(v) => Some(v),
            Err(e) => panic::resume_unwind(e),
        }
    }
}

impl<T: Send + 'static> Drop for WorkerThread<T> {
    /// Stops the thread if the `WorkerThread` is dropped without calling [`stop()`](Self::stop).
    fn drop(&mut self) {
        let _ = self.stop_internal();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::Tube;

    #[test]
    fn stop_unblocks_and_joins() {
        let (tube, _peer) = Tube::pair().unwrap();
        let watch = tube.try_clone().unwrap();
        let worker = WorkerThread::start(
            "test_worker",
            move || watch.recv::<u32>().is_err(),
            move || {
                let _ = tube.shutdown();
            },
        )
        .unwrap();

        assert!(!worker.is_finished());
        assert_eq!(worker.stop(), Some(true));
    }

    #[test]
    fn drop_joins() {
        let done = Arc::new(AtomicBool::new(false));
        let thread_done = Arc::clone(&done);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let worker = WorkerThread::start(
            "test_worker",
            move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
                thread::sleep(Duration::from_millis(20));
                thread_done.store(true, Ordering::SeqCst);
            },
            move || stop.store(true, Ordering::SeqCst),
        )
        .unwrap();

        drop(worker);
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn signal_does_not_join() {
        let (tube, _peer) = Tube::pair().unwrap();
        let watch = tube.try_clone().unwrap();
        let worker = WorkerThread::start(
            "test_worker",
            move || {
                let _ = watch.recv::<u32>();
            },
            move || {
                let _ = tube.shutdown();
            },
        )
        .unwrap();

        worker.signal();
        worker.signal();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !worker.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(worker.is_finished());
        assert_eq!(worker.stop(), Some(()));
    }

    #[test]
    fn stop_from_worker_does_not_join_itself() {
        let slot: Arc<std::sync::Mutex<Option<WorkerThread<()>>>> = Default::default();
        let thread_slot = Arc::clone(&slot);
        let (go_tx, go_rx) = channel::<()>();
        let (done_tx, done_rx) = channel();
        let worker = WorkerThread::start(
            "test_worker",
            move || {
                go_rx.recv().unwrap();
                let me = thread_slot.lock().unwrap().take().unwrap();
                done_tx.send(me.stop().is_none()).unwrap();
            },
            || {},
        )
        .unwrap();
        *slot.lock().unwrap() = Some(worker);
        go_tx.send(()).unwrap();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}

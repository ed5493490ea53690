// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Service registry backed by Unix sockets in a well-known directory.
//!
//! Each published service listens on `<dir>/<name>` (with `/` in the name replaced by `@`).
//! A client keeps one connection for transactions and opens one extra connection per death
//! link; the host never writes to a link connection after acknowledging it, so the only thing
//! a watcher can observe is the connection closing.

use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use base::info;
use base::warn;
use base::Tube;
use base::TubeError;
use base::WorkerThread;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sync::Mutex;

use crate::DeathRecipient;
use crate::Error;
use crate::IBinder;
use crate::Result;
use crate::ServiceManager;
use crate::SpBinder;

pub const DEFAULT_SERVICE_DIR: &str = "/dev/socket/sysshim";

// How often a pending lookup retries the socket.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum HostRequest {
    Transact { code: u32, data: Value },
    LinkToDeath,
}

#[derive(Serialize, Deserialize, Debug)]
pub(crate) enum HostReply {
    Reply(Value),
    Failed(String),
    UnknownTransaction(u32),
    Linked,
}

/// Returns the socket a service called `name` is published at inside `dir`.
pub fn socket_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(name.replace('/', "@"))
}

fn transport_error(e: TubeError) -> Error {
    match e {
        TubeError::Disconnected => Error::DeadObject,
        e => Error::Transport(e),
    }
}

/// Resolves services published by a [`ServiceHost`](crate::ServiceHost) under one directory.
pub struct SocketServiceManager {
    dir: PathBuf,
    wait_timeout: Duration,
}

impl SocketServiceManager {
    /// `wait_timeout` bounds how long a lookup waits for a service to come up.
    pub fn new(dir: impl Into<PathBuf>, wait_timeout: Duration) -> Self {
        SocketServiceManager {
            dir: dir.into(),
            wait_timeout,
        }
    }
}

impl ServiceManager for SocketServiceManager {
    fn wait_for_declared_service(&self, name: &str) -> Option<SpBinder> {
        let path = socket_path(&self.dir, name);
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match Tube::connect(&path) {
                Ok(tube) => return Some(Arc::new(SocketBinder::new(name, path, tube))),
                Err(e) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("service {} not available: {}", name, e);
                        return None;
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
            }
        }
    }
}

/// Connection to one published service.
///
/// Transactions are serialized on a single connection: the connection stays locked for the
/// whole request/reply round trip, so a slow call blocks other callers of the same binder.
///
/// Each death link is watched by its own worker thread. Dropping the binder unlinks its death
/// recipients without firing them and joins their watchers.
pub struct SocketBinder {
    name: String,
    path: PathBuf,
    tube: Mutex<Tube>,
    alive: Arc<AtomicBool>,
    links: Mutex<Vec<WorkerThread<()>>>,
}

impl SocketBinder {
    fn new(name: &str, path: PathBuf, tube: Tube) -> SocketBinder {
        SocketBinder {
            name: name.to_owned(),
            path,
            tube: Mutex::new(tube),
            alive: Arc::new(AtomicBool::new(true)),
            links: Mutex::new(Vec::new()),
        }
    }
}

impl IBinder for SocketBinder {
    fn descriptor(&self) -> &str {
        &self.name
    }

    fn transact(&self, code: u32, data: Value) -> Result<Value> {
        if !self.is_binder_alive() {
            return Err(Error::DeadObject);
        }

        let reply = {
            let tube = self.tube.lock();
            tube.send(&HostRequest::Transact { code, data })
                .map_err(transport_error)?;
            tube.recv::<HostReply>().map_err(transport_error)?
        };

        match reply {
            HostReply::Reply(value) => Ok(value),
            HostReply::Failed(msg) => Err(Error::FailedTransaction(msg)),
            HostReply::UnknownTransaction(code) => Err(Error::UnknownTransaction(code)),
            HostReply::Linked => Err(Error::FailedTransaction(String::from(
                "unexpected link acknowledgement",
            ))),
        }
    }

    fn link_to_death(&self, recipient: &DeathRecipient) -> Result<()> {
        if !self.is_binder_alive() {
            return Err(Error::DeadObject);
        }

        let tube = Tube::connect(&self.path).map_err(|_| Error::DeadObject)?;
        tube.send(&HostRequest::LinkToDeath)
            .map_err(transport_error)?;
        match tube.recv::<HostReply>().map_err(transport_error)? {
            HostReply::Linked => {}
            other => {
                return Err(Error::FailedTransaction(format!(
                    "unexpected reply to link request: {:?}",
                    other
                )))
            }
        }

        let watch = tube.try_clone().map_err(Error::Transport)?;
        let unlinked = Arc::new(AtomicBool::new(false));
        let thread_unlinked = Arc::clone(&unlinked);
        let alive = Arc::clone(&self.alive);
        let recipient = recipient.clone();
        let name = self.name.clone();
        let watcher = WorkerThread::start(
            "death_watch",
            move || {
                // The host sends nothing after the acknowledgement; any result means the
                // connection is gone.
                let _ = watch.recv::<HostReply>();
                if thread_unlinked.load(Ordering::SeqCst) {
                    return;
                }
                alive.store(false, Ordering::SeqCst);
                info!("{} died", name);
                recipient.binder_died();
            },
            move || {
                unlinked.store(true, Ordering::SeqCst);
                let _ = tube.shutdown();
            },
        )
        .map_err(|e| Error::SpawnThread("death_watch", e))?;

        self.links.lock().push(watcher);
        Ok(())
    }

    fn is_binder_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_escapes_slashes() {
        assert_eq!(
            socket_path(
                Path::new("/dev/socket/sysshim"),
                "android.hardware.power.stats.IPowerStats/default"
            ),
            PathBuf::from("/dev/socket/sysshim/android.hardware.power.stats.IPowerStats@default")
        );
    }

    #[test]
    fn lookup_gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let sm = SocketServiceManager::new(dir.path(), Duration::from_millis(120));
        let start = Instant::now();
        assert!(sm.wait_for_declared_service("missing").is_none());
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}

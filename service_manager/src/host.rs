// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Publishes a [`Service`] on a Unix socket for [`SocketServiceManager`] clients.
//!
//! [`SocketServiceManager`]: crate::SocketServiceManager

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixListener;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use base::debug;
use base::error;
use base::info;
use base::warn;
use base::Tube;
use base::TubeError;
use base::WorkerThread;
use sync::Mutex;

use crate::socket::socket_path;
use crate::socket::HostReply;
use crate::socket::HostRequest;
use crate::Error;
use crate::Result;
use crate::Service;

struct HostState {
    name: String,
    service: Arc<dyn Service>,
    stopping: AtomicBool,
    connections: Mutex<Vec<WorkerThread<()>>>,
}

/// A published service. Shutting the host down (or dropping it) closes every client
/// connection, which clients observe as the death of the service.
pub struct ServiceHost {
    path: PathBuf,
    state: Arc<HostState>,
    accept_thread: Option<WorkerThread<()>>,
}

impl ServiceHost {
    /// Publishes `service` as `name` inside `dir`, creating the directory if needed. A stale
    /// socket left at the same path is replaced.
    pub fn publish(dir: &Path, name: &str, service: Arc<dyn Service>) -> Result<ServiceHost> {
        let path = socket_path(dir, name);
        let publish_err = |e| Error::Publish(path.display().to_string(), e);

        fs::create_dir_all(dir).map_err(publish_err)?;
        match fs::remove_file(&path) {
            Ok(()) => warn!("replacing stale socket {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(publish_err(e)),
        }
        let listener = UnixListener::bind(&path).map_err(publish_err)?;

        let state = Arc::new(HostState {
            name: name.to_owned(),
            service,
            stopping: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
        });
        let thread_state = Arc::clone(&state);
        let stop_state = Arc::clone(&state);
        let wake_path = path.clone();
        let accept_thread = WorkerThread::start(
            "service_accept",
            move || accept_loop(listener, thread_state),
            move || {
                stop_state.stopping.store(true, Ordering::SeqCst);
                // Wake the accept loop so it notices `stopping`.
                let _ = UnixStream::connect(&wake_path);
            },
        )
        .map_err(|e| Error::SpawnThread("service_accept", e))?;

        info!("published {} at {}", name, path.display());
        Ok(ServiceHost {
            path,
            state,
            accept_thread: Some(accept_thread),
        })
    }

    /// Stops accepting connections and closes the existing ones.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let accept_thread = match self.accept_thread.take() {
            Some(t) => t,
            None => return,
        };

        accept_thread.stop();

        // Close every connection before joining any handler.
        let connections: Vec<WorkerThread<()>> = self.state.connections.lock().drain(..).collect();
        for conn in &connections {
            conn.signal();
        }
        drop(connections);

        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove {}: {}", self.path.display(), e);
        }
        info!("{} shut down", self.state.name);
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: UnixListener, state: Arc<HostState>) {
    for stream in listener.incoming() {
        if state.stopping.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                error!("{}: failed to accept connection: {}", state.name, e);
                continue;
            }
        };
        let tube = Tube::new(stream);
        let handler_tube = match tube.try_clone() {
            Ok(t) => t,
            Err(e) => {
                error!("{}: failed to clone connection: {}", state.name, e);
                continue;
            }
        };
        let service = Arc::clone(&state.service);
        let handler = match WorkerThread::start(
            "service_conn",
            move || serve_connection(handler_tube, service),
            move || {
                let _ = tube.shutdown();
            },
        ) {
            Ok(h) => h,
            Err(e) => {
                error!("{}: failed to spawn connection handler: {}", state.name, e);
                continue;
            }
        };

        let mut connections = state.connections.lock();
        connections.retain(|c| !c.is_finished());
        connections.push(handler);
    }
}

fn serve_connection(tube: Tube, service: Arc<dyn Service>) {
    loop {
        let request = match tube.recv::<HostRequest>() {
            Ok(r) => r,
            Err(TubeError::Disconnected) => break,
            Err(e) => {
                warn!("dropping connection: {}", e);
                break;
            }
        };
        let reply = match request {
            HostRequest::Transact { code, data } => match service.on_transact(code, data) {
                Ok(value) => HostReply::Reply(value),
                Err(Error::UnknownTransaction(code)) => HostReply::UnknownTransaction(code),
                Err(e) => HostReply::Failed(e.to_string()),
            },
            HostRequest::LinkToDeath => {
                debug!("death link registered");
                HostReply::Linked
            }
        };
        if let Err(e) = tube.send(&reply) {
            debug!("failed to send reply: {}", e);
            break;
        }
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Binder-style service lookup, remote calls and death notification.
//!
//! A [`ServiceManager`] resolves a well-known service name to an [`IBinder`] handle. Calls on
//! the handle are numbered transactions carrying serde_json values; typed interfaces are built
//! on top as proxies (client side) and stubs (server side, implementing [`Service`]).
//! [`LazyServiceCache`] memoizes a resolved handle until the remote end dies.
//!
//! Two registries are provided: [`SocketServiceManager`], which reaches services published by a
//! [`ServiceHost`] over Unix sockets, and [`fake::FakeServiceManager`] for tests.

mod cache;
pub mod fake;
mod host;
mod socket;

use std::io;
use std::sync::Arc;

use base::TubeError;
use remain::sorted;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use crate::cache::InterfaceCast;
pub use crate::cache::LazyServiceCache;
pub use crate::host::ServiceHost;
pub use crate::socket::socket_path;
pub use crate::socket::SocketBinder;
pub use crate::socket::SocketServiceManager;
pub use crate::socket::DEFAULT_SERVICE_DIR;

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to decode transaction payload: {0}")]
    BadParcel(serde_json::Error),
    #[error("remote object is dead")]
    DeadObject,
    #[error("transaction failed: {0}")]
    FailedTransaction(String),
    #[error("failed to publish service at {0}: {1}")]
    Publish(String, io::Error),
    #[error("failed to spawn {0} thread: {1}")]
    SpawnThread(&'static str, io::Error),
    #[error("transport error: {0}")]
    Transport(TubeError),
    #[error("unknown transaction code {0}")]
    UnknownTransaction(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A strong reference to a remote object.
pub type SpBinder = Arc<dyn IBinder>;

/// Client side handle to a remote object.
pub trait IBinder: Send + Sync {
    /// The name the object was resolved under.
    fn descriptor(&self) -> &str;

    /// Performs one request/response exchange with the remote object.
    fn transact(&self, code: u32, data: Value) -> Result<Value>;

    /// Arranges for `recipient` to be called once when the remote object goes away.
    ///
    /// Fails with `Error::DeadObject` if the object is already gone.
    fn link_to_death(&self, recipient: &DeathRecipient) -> Result<()>;

    fn is_binder_alive(&self) -> bool;
}

/// A directory of named services.
pub trait ServiceManager: Send + Sync {
    /// Blocks until the named service is available or the registry gives up, returning `None`
    /// in the latter case.
    fn wait_for_declared_service(&self, name: &str) -> Option<SpBinder>;
}

/// Server side of a remote object.
pub trait Service: Send + Sync {
    /// Handles one transaction. Returning `Error::UnknownTransaction` tells the caller the code
    /// is not part of this interface; any other error is reported as a failed transaction.
    fn on_transact(&self, code: u32, data: Value) -> Result<Value>;
}

/// Callback fired when a linked remote object dies. Carries no payload.
#[derive(Clone)]
pub struct DeathRecipient {
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl DeathRecipient {
    pub fn new<F>(callback: F) -> DeathRecipient
    where
        F: Fn() + Send + Sync + 'static,
    {
        DeathRecipient {
            callback: Arc::new(callback),
        }
    }

    /// Invoked by the transport when the linked object dies.
    pub fn binder_died(&self) {
        (self.callback)()
    }
}

/// Sends `request` as transaction `code` and decodes the reply.
pub fn transact_typed<Req, Resp>(binder: &dyn IBinder, code: u32, request: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let data = serde_json::to_value(request).map_err(Error::BadParcel)?;
    let reply = binder.transact(code, data)?;
    serde_json::from_value(reply).map_err(Error::BadParcel)
}

/// Decodes the payload of an incoming transaction.
pub fn read_parcel<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(Error::BadParcel)
}

/// Encodes the reply to an incoming transaction.
pub fn write_parcel<T: Serialize>(reply: &T) -> Result<Value> {
    serde_json::to_value(reply).map_err(Error::BadParcel)
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Shell front end for the intelligence (content capture session) service.
//!
//! [`ShellCommand`] parses `list`/`destroy`/`get`/`set` commands and forwards them to an
//! [`IntelligenceService`], which may be local ([`LocalIntelligenceService`]) or remote
//! ([`IntelligenceServiceProxy`]).

pub mod local;
mod proxy;
mod shell;

use std::io;
use std::num::ParseIntError;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub use crate::local::LocalIntelligenceService;
pub use crate::proxy::IntelligenceServiceProxy;
pub use crate::proxy::IntelligenceServiceStub;
pub use crate::proxy::TransactionCode;
pub use crate::shell::ShellCommand;
pub use crate::shell::SESSION_COMMAND_TIMEOUT;

/// Name the service is registered under.
pub const SERVICE_NAME: &str = "intelligence";

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bad user number: {0}")]
    BadUserNumber(String, #[source] ParseIntError),
    #[error("failed to write output: {0}")]
    Io(io::Error),
    #[error("Argument expected after \"{0}\"")]
    MissingArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A user id, or one of the pseudo users `ALL` and `CURRENT`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i32);

impl UserId {
    pub const ALL: UserId = UserId(-1);
    pub const CURRENT: UserId = UserId(-2);

    /// Parses a `--user` argument: a decimal id, `all`, or `current`/`cur`.
    pub fn parse_user_arg(arg: &str) -> Result<UserId> {
        match arg {
            "all" => Ok(UserId::ALL),
            "current" | "cur" => Ok(UserId::CURRENT),
            arg => arg
                .parse()
                .map(UserId)
                .map_err(|e| Error::BadUserNumber(arg.to_owned(), e)),
        }
    }
}

/// Payload delivered with a session command's completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    /// Session ids, for `list_sessions`.
    pub sessions: Option<Vec<String>>,
}

/// One-shot completion callback for an asynchronous session command.
pub struct ResultReceiver {
    callback: Box<dyn FnOnce(i32, ResultData) + Send>,
}

impl ResultReceiver {
    pub fn new<F>(callback: F) -> ResultReceiver
    where
        F: FnOnce(i32, ResultData) + Send + 'static,
    {
        ResultReceiver {
            callback: Box::new(callback),
        }
    }

    pub fn send(self, result_code: i32, result_data: ResultData) {
        (self.callback)(result_code, result_data)
    }
}

/// The session manager the shell talks to.
///
/// Session commands complete asynchronously through the given receiver, possibly on another
/// thread, and possibly never.
pub trait IntelligenceService: Send + Sync {
    fn list_sessions(&self, user_id: UserId, receiver: ResultReceiver);
    fn destroy_sessions(&self, user_id: UserId, receiver: ResultReceiver);
    /// Whether binding to services provided by instant apps is allowed.
    fn get_allow_instant_service(&self) -> bool;
    fn set_allow_instant_service(&self, allowed: bool);
}

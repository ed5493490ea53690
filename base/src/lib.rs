// Copyright 2020 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process plumbing shared by the sysshim crates: log setup, the `Tube` message channel and
//! stoppable worker threads.

pub mod syslog;
mod tube;
mod worker_thread;

pub use log::debug;
pub use log::error;
pub use log::info;
pub use log::warn;
pub use tube::Error as TubeError;
pub use tube::Tube;
pub use worker_thread::WorkerThread;

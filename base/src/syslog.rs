// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process-wide logging setup.
//!
//! Code logs through the `log` macros re-exported from this crate (`base::error!` and friends).
//! Nothing is emitted until [`init`] or [`init_with`] installs the backend, which writes one line
//! per record to stderr (or to a caller supplied pipe).
//!
//! # Examples
//!
//! ```
//! use base::syslog;
//! use base::warn;
//!
//! if let Err(e) = syslog::init() {
//!     println!("failed to initialize logging: {}", e);
//!     return;
//! }
//! warn!("this is your {} warning", "final");
//! ```

use std::env;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::fmt;
use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;

use log::LevelFilter;
use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

/// The severity of a log message, using syslog's numbering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::Priority::*;

        let string = match self {
            Emergency => "EMERGENCY",
            Alert => "ALERT",
            Critical => "CRITICAL",
            Error => "ERROR",
            Warning => "WARNING",
            Notice => "NOTICE",
            Info => "INFO",
            Debug => "DEBUG",
        };

        write!(f, "{}", string)
    }
}

impl From<log::Level> for Priority {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Priority::Error,
            log::Level::Warn => Priority::Warning,
            log::Level::Info => Priority::Info,
            log::Level::Debug | log::Level::Trace => Priority::Debug,
        }
    }
}

impl TryFrom<&str> for Priority {
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, <Self as TryFrom<&str>>::Error> {
        match value {
            "0" | "EMERGENCY" => Ok(Priority::Emergency),
            "1" | "ALERT" => Ok(Priority::Alert),
            "2" | "CRITICAL" => Ok(Priority::Critical),
            "3" | "ERROR" => Ok(Priority::Error),
            "4" | "WARNING" => Ok(Priority::Warning),
            "5" | "NOTICE" => Ok(Priority::Notice),
            "6" | "INFO" => Ok(Priority::Info),
            "7" | "DEBUG" => Ok(Priority::Debug),
            _ => Err("Priority can only be parsed from 0-7 and given variant names"),
        }
    }
}

/// Which records make it to the log.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityFilter {
    Silent,
    Priority(Priority),
    ShowAll,
}

impl From<Priority> for PriorityFilter {
    fn from(pri: Priority) -> Self {
        PriorityFilter::Priority(pri)
    }
}

impl TryFrom<&str> for PriorityFilter {
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_uppercase().as_str() {
            "S" | "SILENT" => Ok(PriorityFilter::Silent),
            "*" => Ok(PriorityFilter::ShowAll),
            value => match Priority::try_from(value) {
                Ok(pri) => Ok(PriorityFilter::Priority(pri)),
                Err(_) => Err("PriorityFilter can only be parsed from valid Priority \
                               value, S, *, or SILENT"),
            },
        }
    }
}

impl From<PriorityFilter> for LevelFilter {
    fn from(filter: PriorityFilter) -> Self {
        match filter {
            PriorityFilter::Silent => LevelFilter::Off,
            PriorityFilter::ShowAll => LevelFilter::Trace,
            PriorityFilter::Priority(pri) => match pri {
                Priority::Emergency | Priority::Alert | Priority::Critical | Priority::Error => {
                    LevelFilter::Error
                }
                Priority::Warning => LevelFilter::Warn,
                Priority::Notice | Priority::Info => LevelFilter::Info,
                Priority::Debug => LevelFilter::Debug,
            },
        }
    }
}

/// Errors returned by `syslog::init()`.
#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    /// Another logger was installed first.
    #[error("a logger is already installed: {0}")]
    AlreadyInitialized(log::SetLoggerError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How the log backend is set up.
pub struct LogConfig {
    /// Records below this level are dropped.
    pub filter: PriorityFilter,
    /// Name printed in every line. Defaults to the file name of `argv[0]`.
    pub proc_name: String,
    /// Destination for formatted records. `None` means stderr.
    pub pipe: Option<Box<dyn Write + Send>>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: PriorityFilter::Priority(Priority::Info),
            proc_name: get_proc_name().unwrap_or_else(|| String::from("sysshim")),
            pipe: None,
        }
    }
}

fn get_proc_name() -> Option<String> {
    env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|s| s.file_name().map(OsStr::to_os_string))
        .map(OsString::into_string)
        .and_then(std::result::Result::ok)
}

/// Installs the log backend with the default configuration.
pub fn init() -> Result<()> {
    init_with(LogConfig::default())
}

/// Installs the log backend described by `cfg`.
///
/// Only the first successful call in a process has an effect; later calls return
/// `Error::AlreadyInitialized`.
pub fn init_with(cfg: LogConfig) -> Result<()> {
    let LogConfig {
        filter,
        proc_name,
        pipe,
    } = cfg;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter.into());
    builder.target(match pipe {
        Some(pipe) => env_logger::Target::Pipe(pipe),
        None => env_logger::Target::Stderr,
    });
    builder.format(move |buf, record| {
        let pri: Priority = record.level().into();
        write!(
            buf,
            "[{} {:<7} {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            pri,
            proc_name,
        )?;
        if let Some(path) = record.file() {
            write!(buf, ": {}", path)?;
            if let Some(line) = record.line() {
                write!(buf, ":{}", line)?;
            }
        }
        writeln!(buf, "] {}", record.args())
    });
    builder.try_init().map_err(Error::AlreadyInitialized)
}

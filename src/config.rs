// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use base::syslog::PriorityFilter;
use serde::Deserialize;
use serde::Serialize;
use service_manager::DEFAULT_SERVICE_DIR;

use crate::cmdline::Command;

/// Settings shared by every subcommand.
///
/// Values come from the built-in defaults, then the `--cfg` file, then command line flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub service_dir: PathBuf,
    pub service_wait_timeout_ms: u64,
    pub log_level: String,
    pub session_command_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_dir: PathBuf::from(DEFAULT_SERVICE_DIR),
            service_wait_timeout_ms: 5000,
            log_level: "info".to_owned(),
            session_command_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config> {
        let file = File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn load(cmd: &Command) -> Result<Config> {
        let mut cfg = match &cmd.cfg {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &cmd.service_dir {
            cfg.service_dir = dir.clone();
        }
        if let Some(ms) = cmd.service_wait_timeout_ms {
            cfg.service_wait_timeout_ms = ms;
        }
        if let Some(level) = &cmd.log_level {
            cfg.log_level = level.clone();
        }
        if let Some(ms) = cmd.session_command_timeout_ms {
            cfg.session_command_timeout_ms = ms;
        }
        Ok(cfg)
    }

    pub fn log_filter(&self) -> Result<PriorityFilter> {
        PriorityFilter::try_from(self.log_level.as_str())
            .map_err(|e| anyhow!("invalid log level {:?}: {}", self.log_level, e))
    }

    pub fn service_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.service_wait_timeout_ms)
    }

    pub fn session_command_timeout(&self) -> Duration {
        Duration::from_millis(self.session_command_timeout_ms)
    }
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;
use std::str::FromStr;

use argh::FromArgs;

#[derive(FromArgs)]
/// Command line tools and development hosts for system service shims.
pub struct Command {
    #[argh(option, arg_name = "PATH")]
    /// JSON file with default values for the options below
    pub cfg: Option<PathBuf>,

    #[argh(option, arg_name = "DIR")]
    /// directory holding the service sockets
    pub service_dir: Option<PathBuf>,

    #[argh(option, arg_name = "MS")]
    /// how long to wait for a service to appear
    pub service_wait_timeout_ms: Option<u64>,

    #[argh(option, arg_name = "LEVEL")]
    /// log level: a priority name or number, S to silence or * for everything
    pub log_level: Option<String>,

    #[argh(option, arg_name = "MS")]
    /// how long session commands wait for the service to answer
    pub session_command_timeout_ms: Option<u64>,

    #[argh(subcommand)]
    pub command: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum Subcommand {
    Intelligence(IntelligenceCommand),
    PowerStats(PowerStatsCommand),
    Serve(ServeCommand),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerStatsQuery {
    Entities,
    Residency,
    Consumers,
    Consumed,
    Meters,
    Readings,
}

impl FromStr for PowerStatsQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entities" => Ok(PowerStatsQuery::Entities),
            "residency" => Ok(PowerStatsQuery::Residency),
            "consumers" => Ok(PowerStatsQuery::Consumers),
            "consumed" => Ok(PowerStatsQuery::Consumed),
            "meters" => Ok(PowerStatsQuery::Meters),
            "readings" => Ok(PowerStatsQuery::Readings),
            _ => Err(format!(
                "unknown query {:?}, expected one of entities, residency, consumers, consumed, \
                 meters, readings",
                s
            )),
        }
    }
}

#[derive(FromArgs)]
#[argh(subcommand, name = "powerstats")]
/// Query the power stats HAL and print the result as JSON
pub struct PowerStatsCommand {
    #[argh(positional, arg_name = "QUERY")]
    /// entities, residency, consumers, consumed, meters or readings
    pub query: PowerStatsQuery,

    #[argh(positional, arg_name = "ID")]
    /// ids to restrict residency, consumed and readings to; none means all
    pub ids: Vec<i32>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "intelligence")]
/// Run an intelligence service shell command (try `help`)
pub struct IntelligenceCommand {
    #[argh(positional, greedy)]
    /// shell command and its arguments
    pub args: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// Host in-memory power stats and intelligence services until stdin is closed
pub struct ServeCommand {
    #[argh(option, arg_name = "USER:ID")]
    /// add a pending session, may be repeated
    pub session: Vec<String>,
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Runs system service shims from the command line.

mod cmdline;
mod config;

use std::io;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use base::info;
use base::syslog;
use base::syslog::LogConfig;
use intelligence::IntelligenceServiceProxy;
use intelligence::IntelligenceServiceStub;
use intelligence::LocalIntelligenceService;
use intelligence::ShellCommand;
use intelligence::UserId;
use power_stats::fake::FakePowerStats;
use power_stats::PowerStatsHalWrapper;
use power_stats::PowerStatsHalWrapperImpl;
use power_stats::PowerStatsStub;
use serde::Serialize;
use service_manager::ServiceHost;
use service_manager::ServiceManager;
use service_manager::SocketServiceManager;

use crate::cmdline::Command;
use crate::cmdline::IntelligenceCommand;
use crate::cmdline::PowerStatsCommand;
use crate::cmdline::PowerStatsQuery;
use crate::cmdline::ServeCommand;
use crate::cmdline::Subcommand;
use crate::config::Config;

fn socket_service_manager(cfg: &Config) -> SocketServiceManager {
    SocketServiceManager::new(&cfg.service_dir, cfg.service_wait_timeout())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to format result")?;
    println!("{}", json);
    Ok(())
}

fn run_power_stats(cfg: &Config, cmd: PowerStatsCommand) -> Result<()> {
    let wrapper = PowerStatsHalWrapperImpl::new(Arc::new(socket_service_manager(cfg)));
    if !wrapper.initialize() {
        bail!(
            "{} is not available in {}",
            power_stats::SERVICE_NAME,
            cfg.service_dir.display()
        );
    }
    let ids = &cmd.ids;
    match cmd.query {
        PowerStatsQuery::Entities => print_json(&wrapper.get_power_entity_info()),
        PowerStatsQuery::Residency => print_json(&wrapper.get_state_residency(ids)),
        PowerStatsQuery::Consumers => print_json(&wrapper.get_energy_consumer_info()),
        PowerStatsQuery::Consumed => print_json(&wrapper.get_energy_consumed(ids)),
        PowerStatsQuery::Meters => print_json(&wrapper.get_energy_meter_info()),
        PowerStatsQuery::Readings => print_json(&wrapper.read_energy_meters(ids)),
    }
}

fn run_intelligence(cfg: &Config, cmd: IntelligenceCommand) -> Result<i32> {
    let binder = socket_service_manager(cfg)
        .wait_for_declared_service(intelligence::SERVICE_NAME)
        .with_context(|| {
            format!(
                "{} service is not available in {}",
                intelligence::SERVICE_NAME,
                cfg.service_dir.display()
            )
        })?;
    let proxy = IntelligenceServiceProxy::new(binder);
    let shell = ShellCommand::new(&proxy).with_timeout(cfg.session_command_timeout());
    Ok(shell.exec(
        cmd.args.as_slice(),
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    ))
}

fn parse_session(arg: &str) -> Result<(UserId, &str)> {
    let (user, id) = arg
        .split_once(':')
        .with_context(|| format!("session {:?} is not USER:ID", arg))?;
    let user = UserId::parse_user_arg(user).with_context(|| format!("session {:?}", arg))?;
    Ok((user, id))
}

fn run_serve(cfg: &Config, cmd: ServeCommand) -> Result<()> {
    let sessions = LocalIntelligenceService::default();
    for arg in &cmd.session {
        let (user, id) = parse_session(arg)?;
        sessions.add_session(user, id);
    }

    let power_host = ServiceHost::publish(
        &cfg.service_dir,
        power_stats::SERVICE_NAME,
        Arc::new(PowerStatsStub::new(FakePowerStats::sample())),
    )
    .context("failed to publish power stats")?;
    let intelligence_host = ServiceHost::publish(
        &cfg.service_dir,
        intelligence::SERVICE_NAME,
        Arc::new(IntelligenceServiceStub::new(sessions)),
    )
    .context("failed to publish intelligence")?;
    info!("serving in {}", cfg.service_dir.display());

    io::copy(&mut io::stdin().lock(), &mut io::sink()).context("failed to read stdin")?;

    info!("stdin closed, shutting down");
    power_host.shutdown();
    intelligence_host.shutdown();
    Ok(())
}

fn sysshim_main() -> Result<i32> {
    let cmd: Command = argh::from_env();
    let cfg = Config::load(&cmd)?;

    if let Err(e) = syslog::init_with(LogConfig {
        filter: cfg.log_filter()?,
        ..Default::default()
    }) {
        bail!("failed to initialize syslog: {}", e);
    }

    match cmd.command {
        Subcommand::Intelligence(c) => run_intelligence(&cfg, c),
        Subcommand::PowerStats(c) => run_power_stats(&cfg, c).map(|()| 0),
        Subcommand::Serve(c) => run_serve(&cfg, c).map(|()| 0),
    }
}

fn main() {
    let code = match sysshim_main() {
        Ok(code) => code,
        Err(e) => {
            // Printed directly since the logger may not be installed yet.
            eprintln!("sysshim: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use sync::create_promise_and_waitable;
use sync::Mutex;
use sync::Waitable;

use crate::Error;
use crate::IntelligenceService;
use crate::ResultReceiver;
use crate::Result;
use crate::UserId;

/// How long `list sessions` and `destroy sessions` wait for the service to answer.
pub const SESSION_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const HELP: &str = "\
Intelligence Service (intelligence) commands:
  help
    Prints this help text.

  get bind-instant-service-allowed
    Gets whether binding to services provided by instant apps is allowed

  set bind-instant-service-allowed [true | false]
    Sets whether binding to services provided by instant apps is allowed

  list sessions [--user USER_ID]
    Lists all pending sessions.

  destroy sessions [--user USER_ID]
    Destroys all pending sessions.

";

/// Cursor over the command line.
struct Args<'a, S> {
    args: &'a [S],
    pos: usize,
}

impl<'a, S: AsRef<str>> Args<'a, S> {
    fn next_arg(&mut self) -> Option<&'a str> {
        let arg = self.args.get(self.pos)?;
        self.pos += 1;
        Some(arg.as_ref())
    }

    fn next_arg_required(&mut self) -> Result<&'a str> {
        match self.next_arg() {
            Some(arg) => Ok(arg),
            None => {
                let last = self
                    .pos
                    .checked_sub(1)
                    .and_then(|i| self.args.get(i))
                    .map(|s| s.as_ref())
                    .unwrap_or_default();
                Err(Error::MissingArgument(last.to_owned()))
            }
        }
    }
}

/// Text command interface to an [`IntelligenceService`].
///
/// Every command writes its output to `out`, argument errors go to `err`, and the return value
/// is the process exit code (0 on success, -1 otherwise).
pub struct ShellCommand<'a> {
    service: &'a dyn IntelligenceService,
    timeout: Duration,
}

impl<'a> ShellCommand<'a> {
    pub fn new(service: &'a dyn IntelligenceService) -> Self {
        ShellCommand {
            service,
            timeout: SESSION_COMMAND_TIMEOUT,
        }
    }

    /// Overrides how long session commands wait for their result.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn exec<S: AsRef<str>>(&self, args: &[S], out: &mut dyn Write, err: &mut dyn Write) -> i32 {
        let mut args = Args { args, pos: 0 };
        let cmd = args.next_arg();
        match self.on_command(cmd, &mut args, out) {
            Ok(code) => code,
            Err(Error::Io(e)) => {
                base::error!("intelligence shell: {}", e);
                -1
            }
            Err(e) => {
                // Best effort; there is nowhere else to report it.
                let _ = writeln!(err, "Error: {}", e);
                -1
            }
        }
    }

    fn on_command<S: AsRef<str>>(
        &self,
        cmd: Option<&str>,
        args: &mut Args<S>,
        out: &mut dyn Write,
    ) -> Result<i32> {
        match cmd {
            Some("list") => self.request_list(args, out),
            Some("destroy") => self.request_destroy(args, out),
            Some("get") => self.request_get(args, out),
            Some("set") => self.request_set(args, out),
            cmd => handle_default_commands(cmd, out),
        }
    }

    fn request_list<S: AsRef<str>>(&self, args: &mut Args<S>, out: &mut dyn Write) -> Result<i32> {
        if !next_arg_is_sessions(args, out)? {
            return Ok(-1);
        }
        let user_id = user_id_or_all(args)?;
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let (promise, waitable) = create_promise_and_waitable();
        let collected = Arc::clone(&sessions);
        self.service.list_sessions(
            user_id,
            ResultReceiver::new(move |_code, data| {
                collected
                    .lock()
                    .extend(data.sessions.into_iter().flatten());
                promise.signal();
            }),
        );
        if !self.wait(&waitable, out)? {
            return Ok(-1);
        }
        for session in sessions.lock().iter() {
            write_line(out, session)?;
        }
        Ok(0)
    }

    fn request_destroy<S: AsRef<str>>(
        &self,
        args: &mut Args<S>,
        out: &mut dyn Write,
    ) -> Result<i32> {
        if !next_arg_is_sessions(args, out)? {
            return Ok(-1);
        }
        let user_id = user_id_or_all(args)?;
        let (promise, waitable) = create_promise_and_waitable();
        self.service.destroy_sessions(
            user_id,
            ResultReceiver::new(move |_code, _data| promise.signal()),
        );
        if !self.wait(&waitable, out)? {
            return Ok(-1);
        }
        Ok(0)
    }

    fn request_get<S: AsRef<str>>(&self, args: &mut Args<S>, out: &mut dyn Write) -> Result<i32> {
        let what = args.next_arg_required()?;
        match what {
            "bind-instant-service-allowed" => {
                let allowed = self.service.get_allow_instant_service();
                write_line(out, &allowed.to_string())?;
                Ok(0)
            }
            what => {
                write_line(out, &format!("Invalid set: {}", what))?;
                Ok(-1)
            }
        }
    }

    fn request_set<S: AsRef<str>>(&self, args: &mut Args<S>, out: &mut dyn Write) -> Result<i32> {
        let what = args.next_arg_required()?;
        match what {
            "bind-instant-service-allowed" => {
                let mode = args.next_arg_required()?;
                match mode.to_lowercase().as_str() {
                    "true" => self.service.set_allow_instant_service(true),
                    "false" => self.service.set_allow_instant_service(false),
                    _ => {
                        write_line(out, &format!("Invalid mode: {}", mode))?;
                        return Ok(-1);
                    }
                }
                Ok(0)
            }
            what => {
                write_line(out, &format!("Invalid set: {}", what))?;
                Ok(-1)
            }
        }
    }

    /// Waits for a session command to complete, reporting a timeout on `out`.
    fn wait(&self, waitable: &Waitable, out: &mut dyn Write) -> Result<bool> {
        if waitable.wait(Some(self.timeout)) {
            return Ok(true);
        }
        write_line(out, &format!("Timed out after {}", describe(self.timeout)))?;
        Ok(false)
    }
}

fn handle_default_commands(cmd: Option<&str>, out: &mut dyn Write) -> Result<i32> {
    match cmd {
        None | Some("help") | Some("-h") => out.write_all(HELP.as_bytes()).map_err(Error::Io)?,
        Some(cmd) => write_line(out, &format!("Unknown command: {}", cmd))?,
    }
    Ok(-1)
}

fn next_arg_is_sessions<S: AsRef<str>>(args: &mut Args<S>, out: &mut dyn Write) -> Result<bool> {
    if args.next_arg_required()? != "sessions" {
        write_line(out, "Error: invalid list type")?;
        return Ok(false);
    }
    Ok(true)
}

fn user_id_or_all<S: AsRef<str>>(args: &mut Args<S>) -> Result<UserId> {
    match args.next_arg() {
        Some("--user") => UserId::parse_user_arg(args.next_arg_required()?),
        _ => Ok(UserId::ALL),
    }
}

fn write_line(out: &mut dyn Write, line: &str) -> Result<()> {
    writeln!(out, "{}", line).map_err(Error::Io)
}

fn describe(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{} seconds", timeout.as_secs())
    } else {
        format!("{} ms", timeout.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&'static str]) -> Vec<&'static str> {
        v.to_vec()
    }

    #[test]
    fn next_arg_required_names_previous() {
        let v = args(&["set", "bind-instant-service-allowed"]);
        let mut a = Args { args: &v, pos: 0 };
        a.next_arg();
        a.next_arg();
        let err = a.next_arg_required().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument expected after \"bind-instant-service-allowed\""
        );
    }

    #[test]
    fn user_defaults_to_all() {
        let v = args(&[]);
        assert_eq!(user_id_or_all(&mut Args { args: &v, pos: 0 }).unwrap(), UserId::ALL);
        let v = args(&["--user", "10"]);
        assert_eq!(user_id_or_all(&mut Args { args: &v, pos: 0 }).unwrap(), UserId(10));
        let v = args(&["--user", "current"]);
        assert_eq!(
            user_id_or_all(&mut Args { args: &v, pos: 0 }).unwrap(),
            UserId::CURRENT
        );
    }

    #[test]
    fn timeout_description() {
        assert_eq!(describe(Duration::from_secs(5)), "5 seconds");
        assert_eq!(describe(Duration::from_millis(250)), "250 ms");
    }
}

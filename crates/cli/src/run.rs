#![forbid(unsafe_code)]

//! The subcommands, producing the text to print.

use crate::cli::CheckArgs;
use config::Config;
use fdscan::{Descriptor, FdTable, Leaks, Owner, Session, dump, snapshot_for_handle_in};
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a leak check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    /// Failure message listing the leaked descriptors.
    Leaked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No command to launch")]
    NoCommand,

    #[error("Failed to launch {program:?}: {source}")]
    Launch {
        program: OsString,
        source: std::io::Error,
    },

    #[error(transparent)]
    Scan(#[from] fdscan::Error),
}

/// Descriptions of all open descriptors of `pid`, or of this process.
pub fn list(config: &Config, pid: Option<i32>) -> Result<String, Error> {
    let fds = scan(&table(&config.scan.procfs, pid), pid)?;
    debug!(count = fds.len(), ?pid, "listing descriptors");
    Ok(dump(&fds, 0))
}

/// Compares two snapshots of a running process or a launched command.
/// Arguments override the configured delays.
pub fn check(config: &Config, args: &CheckArgs) -> Result<Verdict, Error> {
    let after = args.after.unwrap_or(config.scan.after);
    match args.pid {
        Some(pid) => {
            let table = table(&config.scan.procfs, Some(pid));
            let baseline = scan(&table, Some(pid))?;
            sleep(after);
            let current = scan(&table, Some(pid))?;
            compare(config, &baseline, &current)
        }
        None => {
            let settle = args.settle.unwrap_or(config.scan.settle);
            check_command(config, &args.command, settle, after)
        }
    }
}

fn check_command(
    config: &Config,
    command: &[OsString],
    settle: Duration,
    after: Duration,
) -> Result<Verdict, Error> {
    let (program, args) = command.split_first().ok_or(Error::NoCommand)?;
    let mut command = Command::new(program);
    command.args(args).stdin(Stdio::null());
    let mut session = Session::start(command).map_err(|source| Error::Launch {
        program: program.clone(),
        source,
    })?;

    let verdict = watch(config, &session, settle, after);
    if let Err(err) = session.kill().and_then(|()| session.wait()) {
        warn!(%err, "Failed to reap launched command");
    }
    verdict
}

fn watch(
    config: &Config,
    session: &Session,
    settle: Duration,
    after: Duration,
) -> Result<Verdict, Error> {
    let procfs = config.scan.procfs.as_path();
    sleep(settle);
    let baseline = snapshot_for_handle_in(procfs, Some(session))?;
    sleep(after);
    let current = snapshot_for_handle_in(procfs, Some(session))?;
    compare(config, &baseline, &current)
}

fn compare(
    config: &Config,
    baseline: &[Descriptor],
    current: &[Descriptor],
) -> Result<Verdict, Error> {
    let mut leaks = Leaks::new(baseline).ignoring_all(config.ignore.exclusions());
    if leaks.check(current)? {
        Ok(Verdict::Leaked(leaks.failure_message()))
    } else {
        info!(baseline = baseline.len(), current = current.len(), "no leaked descriptors");
        Ok(Verdict::Clean)
    }
}

/// Scans `table`, telling a process that has gone away apart from other
/// failures.
fn scan(table: &FdTable, pid: Option<i32>) -> Result<Vec<Descriptor>, Error> {
    let fds = table.descriptors().map_err(|err| match (err, pid) {
        (err @ fdscan::Error::OpenDir { .. }, Some(pid)) if err.is_not_found() => {
            fdscan::Error::ProcessEnded(pid)
        }
        (err, _) => err,
    })?;
    Ok(fds)
}

fn table(procfs: &Path, pid: Option<i32>) -> FdTable {
    FdTable::with_root(procfs, pid.map_or(Owner::Myself, Owner::from_pid))
}

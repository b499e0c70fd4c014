#![forbid(unsafe_code)]

use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::table::{FdTable, Owner, PROCFS};
use procfs::ProcError;
use procfs::process::Process;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use tracing::debug;

/// A process somebody else launched and whose descriptors we look at.
pub trait ProcessHandle {
    /// Program the process was started from, if it was started at all.
    fn command(&self) -> Option<&OsStr>;

    fn pid(&self) -> Option<u32>;
}

/// A child process launched for inspection.
#[derive(Debug)]
pub struct Session {
    program: OsString,
    child: Child,
}

impl Session {
    pub fn start(mut command: Command) -> io::Result<Self> {
        let program = command.get_program().to_owned();
        let child = command.spawn()?;
        debug!(?program, pid = child.id(), "Started session");
        Ok(Self { program, child })
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    pub fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

impl ProcessHandle for Session {
    fn command(&self) -> Option<&OsStr> {
        Some(&self.program)
    }

    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }
}

/// Snapshot of the descriptors of the process behind `handle`.
///
/// Tells apart handles that never referred to a process from processes that
/// have ended in the meantime, including zombies not yet reaped.
pub fn snapshot_for_handle<H>(handle: Option<&H>) -> Result<Vec<Descriptor>, Error>
where
    H: ProcessHandle + ?Sized,
{
    snapshot_for_handle_in(Path::new(PROCFS), handle)
}

/// Like [`snapshot_for_handle`], with procfs mounted at `procfs`.
pub fn snapshot_for_handle_in<H>(
    procfs: &Path,
    handle: Option<&H>,
) -> Result<Vec<Descriptor>, Error>
where
    H: ProcessHandle + ?Sized,
{
    let handle = handle.ok_or(Error::InvalidHandle)?;
    if handle.command().is_none() {
        return Err(Error::InvalidHandle);
    }
    let pid = handle
        .pid()
        .and_then(|pid| i32::try_from(pid).ok())
        .filter(|pid| *pid > 0)
        .ok_or(Error::NoProcess)?;

    match Process::new_with_root(procfs.join(pid.to_string())).and_then(|p| p.stat()) {
        Ok(stat) if matches!(stat.state, 'Z' | 'X') => return Err(Error::ProcessEnded(pid)),
        Ok(_) => {}
        Err(ProcError::NotFound(_)) => return Err(Error::ProcessEnded(pid)),
        Err(err) => return Err(err.into()),
    }

    FdTable::with_root(procfs, Owner::from_pid(pid))
        .descriptors()
        .map_err(|err| match err {
            Error::OpenDir { .. } if err.is_not_found() => Error::ProcessEnded(pid),
            err => err,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Handle {
        command: Option<OsString>,
        pid: Option<u32>,
    }

    impl ProcessHandle for Handle {
        fn command(&self) -> Option<&OsStr> {
            self.command.as_deref()
        }

        fn pid(&self) -> Option<u32> {
            self.pid
        }
    }

    fn handle(command: Option<&str>, pid: Option<u32>) -> Handle {
        Handle {
            command: command.map(OsString::from),
            pid,
        }
    }

    #[test]
    fn rejects_invalid_handles() {
        assert!(matches!(
            snapshot_for_handle::<Handle>(None),
            Err(Error::InvalidHandle)
        ));
        assert!(matches!(
            snapshot_for_handle(Some(&handle(None, Some(1)))),
            Err(Error::InvalidHandle)
        ));
    }

    #[test]
    fn rejects_handles_without_process() {
        for pid in [None, Some(0), Some(u32::MAX)] {
            assert!(matches!(
                snapshot_for_handle(Some(&handle(Some("true"), pid))),
                Err(Error::NoProcess)
            ));
        }
    }

    #[test]
    fn vanished_process_has_ended() {
        let pid = 2_000_000_000;
        assert!(matches!(
            snapshot_for_handle(Some(&handle(Some("true"), Some(pid)))),
            Err(Error::ProcessEnded(p)) if p == 2_000_000_000
        ));
    }

    #[test]
    fn own_process_through_handle() {
        let me = handle(Some("myself"), Some(std::process::id()));
        let fds = snapshot_for_handle(Some(&me)).unwrap();
        assert!(!fds.is_empty());
    }
}

#![deny(unsafe_code)]
//! Snapshots of the open file descriptors of a process, read from procfs,
//! and leak detection between two such snapshots.

pub mod descriptor;
pub mod error;
pub mod flags;
pub mod leak;
pub mod session;
pub mod sockaddr;
pub mod socket;
mod sys;
pub mod table;

pub use descriptor::{Common, Descriptor, Kind};
pub use error::{Error, ExclusionError};
pub use flags::Flags;
pub use leak::{AnonInodeTypes, Exclusion, FdNumbers, IgnoringDescriptors, Leaks, PathPrefixes, dump};
pub use session::{ProcessHandle, Session, snapshot_for_handle, snapshot_for_handle_in};
pub use sockaddr::{SocketAddress, format_address};
pub use socket::{SocketDetails, SocketOption, SocketProbe, SystemProbe};
pub use table::{FdTable, Owner};

use std::os::fd::RawFd;
use tracing::debug;

/// Open descriptors of the calling process, or none at all if procfs can't
/// be read.
pub fn snapshot() -> Vec<Descriptor> {
    try_snapshot().unwrap_or_else(|err| {
        debug!(%err, "Failed to scan own descriptors");
        Vec::new()
    })
}

/// Open descriptors of the calling process.
pub fn try_snapshot() -> Result<Vec<Descriptor>, Error> {
    FdTable::myself().descriptors()
}

/// Open descriptors of process `pid`. Reading another user's process
/// requires the same privileges as ptrace.
pub fn snapshot_for_process(pid: i32) -> Result<Vec<Descriptor>, Error> {
    FdTable::process(pid).descriptors()
}

/// Our own open descriptor `fd`.
pub fn descriptor(fd: RawFd) -> Result<Descriptor, Error> {
    FdTable::myself().descriptor(fd)
}

pub fn descriptor_for_process(fd: RawFd, pid: i32) -> Result<Descriptor, Error> {
    FdTable::process(pid).descriptor(fd)
}

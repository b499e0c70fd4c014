#![forbid(unsafe_code)]

use crate::socket::SocketOption;
use nix::errno::Errno;
use std::num::ParseIntError;
use std::os::fd::RawFd;
use std::path::PathBuf;

/// Error returned by a user-supplied exclusion when it cannot decide.
pub type ExclusionError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid file descriptor number: {0}")]
    InvalidFd(RawFd),

    #[error("Failed to read link of fd {fd}: {source}")]
    ReadLink {
        fd: RawFd,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed inode number in link {link:?} of fd {fd}: {source}")]
    MalformedInode {
        fd: RawFd,
        link: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Failed to open fdinfo of fd {fd}: {source}")]
    FdInfoOpen {
        fd: RawFd,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read fdinfo of fd {fd}: {source}")]
    FdInfoRead {
        fd: RawFd,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {field} in fdinfo of fd {fd}: {source}")]
    FdInfoSyntax {
        fd: RawFd,
        field: &'static str,
        #[source]
        source: ParseIntError,
    },

    #[error("fdinfo of fd {fd}: {field} outside range: {value}")]
    FdInfoRange {
        fd: RawFd,
        field: &'static str,
        value: String,
    },

    #[error("Incomplete fdinfo data for fd {0}")]
    IncompleteFdInfo(RawFd),

    #[error("Failed to query {option} of socket fd {fd}: {source}")]
    SocketOption {
        fd: RawFd,
        option: SocketOption,
        #[source]
        source: Errno,
    },

    #[error("Failed to duplicate own fd {fd}: {source}")]
    DupFd {
        fd: RawFd,
        #[source]
        source: Errno,
    },

    #[error("Failed to duplicate fd {fd} of process {pid}: {source}")]
    ForeignFd {
        pid: i32,
        fd: RawFd,
        #[source]
        source: Errno,
    },

    #[error("Failed to open fd directory {path:?}: {source}")]
    OpenDir {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("Failed to read fd directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("Invalid process handle or handle without command")]
    InvalidHandle,

    #[error("Process handle without a valid process")]
    NoProcess,

    #[error("Process {0} has already ended")]
    ProcessEnded(i32),

    #[error("Failed to read procfs info: {0}")]
    Procfs(#[from] procfs::ProcError),

    #[error("{matcher} expects a sequence of file descriptors, got {got}")]
    NotDescriptors {
        matcher: &'static str,
        got: &'static str,
    },

    #[error("Exclusion failed: {0}")]
    Exclusion(#[source] ExclusionError),
}

impl Error {
    /// Whether the failure means that the inspected object does not exist
    /// (anymore), as opposed to being inaccessible or malformed.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ReadLink { source, .. }
            | Error::FdInfoOpen { source, .. }
            | Error::FdInfoRead { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Error::OpenDir { source, .. } | Error::ReadDir { source, .. } => {
                *source == Errno::ENOENT
            }
            Error::DupFd { source, .. } => *source == Errno::EBADF,
            Error::ForeignFd { source, .. } => matches!(source, Errno::EBADF | Errno::ESRCH),
            Error::ProcessEnded(_) => true,
            Error::Procfs(procfs::ProcError::NotFound(_)) => true,
            _ => false,
        }
    }
}

#![forbid(unsafe_code)]

use crate::descriptor::{Common, Descriptor, Kind};
use crate::error::Error;
use crate::socket::{SocketDetails, SocketProbe, SystemProbe};
use crate::sys;
use nix::dir::Dir;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Default procfs mount point.
pub const PROCFS: &str = "/proc";

const ANON_INODE_PREFIX: &str = "anon_inode:";

/// Whose descriptor table an [`FdTable`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The calling process, via `<procfs>/self`.
    Myself,
    Process(i32),
}

impl Owner {
    /// Our own pid is [`Owner::Myself`], whose fd directory lists itself.
    pub fn from_pid(pid: i32) -> Self {
        if u32::try_from(pid).is_ok_and(|pid| pid == std::process::id()) {
            Owner::Myself
        } else {
            Owner::Process(pid)
        }
    }

    fn dir_name(self) -> String {
        match self {
            Owner::Myself => "self".to_owned(),
            Owner::Process(pid) => pid.to_string(),
        }
    }
}

/// The descriptor table of one process, as presented by procfs.
#[derive(Debug, Clone)]
pub struct FdTable<P = SystemProbe> {
    root: PathBuf,
    owner: Owner,
    probe: P,
}

impl FdTable<SystemProbe> {
    pub fn myself() -> Self {
        Self::with_root(PROCFS, Owner::Myself)
    }

    pub fn process(pid: i32) -> Self {
        Self::with_root(PROCFS, Owner::from_pid(pid))
    }

    /// Uses a procfs mounted at `root`, or any directory tree mimicking one.
    pub fn with_root(root: impl Into<PathBuf>, owner: Owner) -> Self {
        Self {
            root: root.into(),
            owner,
            probe: SystemProbe,
        }
    }
}

impl<P: SocketProbe> FdTable<P> {
    /// Replaces the source of socket parameters.
    pub fn with_probe<Q: SocketProbe>(self, probe: Q) -> FdTable<Q> {
        FdTable {
            root: self.root,
            owner: self.owner,
            probe,
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<procfs>/<self|pid>/fd`
    pub fn fd_dir(&self) -> PathBuf {
        self.root.join(self.owner.dir_name()).join("fd")
    }

    fn fdinfo(&self, fd: RawFd) -> PathBuf {
        self.root
            .join(self.owner.dir_name())
            .join("fdinfo")
            .join(fd.to_string())
    }

    /// Describes the open descriptor `fd`.
    pub fn descriptor(&self, fd: RawFd) -> Result<Descriptor, Error> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }
        let link = std::fs::read_link(self.fd_dir().join(fd.to_string()))
            .map_err(|source| Error::ReadLink { fd, source })?;
        self.classify(fd, &link)
    }

    /// Builds the descriptor for `fd` whose fd link points to `link`.
    ///
    /// Links are either `anon_inode:<type>` (with or without brackets),
    /// `<type>:[<inode>]` for pipes and sockets, or a plain path. Types other
    /// than pipes and sockets, such as `net:[...]`, are taken as paths.
    pub fn classify(&self, fd: RawFd, link: &Path) -> Result<Descriptor, Error> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }
        let Some(text) = link.to_str() else {
            return self.path(fd, link);
        };

        if let Some(file_type) = text.strip_prefix(ANON_INODE_PREFIX) {
            let common = Common::load(fd, &self.fdinfo(fd))?;
            let file_type = file_type.trim_matches(|c| c == '[' || c == ']');
            return Ok(Descriptor::new(
                common,
                Kind::AnonInode {
                    file_type: file_type.to_owned(),
                },
            ));
        }

        if let Some((kind, inode)) = text.split_once(":[") {
            let inode = inode.strip_suffix(']').unwrap_or(inode);
            match kind {
                "pipe" => {
                    let ino = parse_inode(fd, text, inode)?;
                    let common = Common::load(fd, &self.fdinfo(fd))?;
                    return Ok(Descriptor::new(common, Kind::Pipe { ino }));
                }
                "socket" => {
                    let ino = parse_inode(fd, text, inode)?;
                    return self.socket(fd, ino);
                }
                _ => {}
            }
        }

        self.path(fd, link)
    }

    fn path(&self, fd: RawFd, link: &Path) -> Result<Descriptor, Error> {
        let common = Common::load(fd, &self.fdinfo(fd))?;
        Ok(Descriptor::new(common, Kind::Path(link.to_owned())))
    }

    fn socket(&self, fd: RawFd, ino: u64) -> Result<Descriptor, Error> {
        let common = Common::load(fd, &self.fdinfo(fd))?;
        let usable = self.usable_fd(fd)?;
        let details = SocketDetails::query(&self.probe, fd, usable.as_fd(), ino)?;
        Ok(Descriptor::new(common, Kind::Socket(Box::new(details))))
    }

    /// A descriptor in our own table referring to the same open file as
    /// `fd`, closed again on drop.
    fn usable_fd(&self, fd: RawFd) -> Result<OwnedFd, Error> {
        match self.owner {
            Owner::Myself => sys::pidfd_open_self()
                .and_then(|pidfd| sys::pidfd_getfd(pidfd.as_fd(), fd))
                .map_err(|source| Error::DupFd { fd, source }),
            Owner::Process(pid) => {
                let foreign = |source| Error::ForeignFd { pid, fd, source };
                let pidfd = sys::pidfd_open(pid).map_err(foreign)?;
                sys::pidfd_getfd(pidfd.as_fd(), fd).map_err(foreign)
            }
        }
    }

    /// Describes all open descriptors in the order procfs lists them.
    ///
    /// Descriptors that vanish or can't be described while scanning are
    /// skipped. When scanning ourselves, the descriptor used for reading the
    /// fd directory isn't included.
    pub fn descriptors(&self) -> Result<Vec<Descriptor>, Error> {
        let numbers = self.numbers()?;
        let mut descriptors = Vec::with_capacity(numbers.len());
        for fd in numbers {
            match self.descriptor(fd) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => trace!(fd, %err, "Skipping descriptor"),
            }
        }
        debug!(
            owner = ?self.owner,
            count = descriptors.len(),
            "Scanned descriptor table"
        );
        Ok(descriptors)
    }

    /// Lists the fd directory up front, so that descriptors opened while
    /// describing entries never show up.
    fn numbers(&self) -> Result<Vec<RawFd>, Error> {
        let path = self.fd_dir();
        let mut dir = Dir::open(
            path.as_path(),
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|source| Error::OpenDir {
            path: path.clone(),
            source,
        })?;
        let own = match self.owner {
            Owner::Myself => Some(dir.as_raw_fd()),
            Owner::Process(_) => None,
        };

        let mut numbers = Vec::new();
        for entry in dir.iter() {
            let entry = entry.map_err(|source| Error::ReadDir {
                path: path.clone(),
                source,
            })?;
            let Some(fd) = entry
                .file_name()
                .to_str()
                .ok()
                .and_then(|name| name.parse::<RawFd>().ok())
            else {
                continue;
            };
            if fd >= 0 && Some(fd) != own {
                numbers.push(fd);
            }
        }
        Ok(numbers)
    }
}

fn parse_inode(fd: RawFd, link: &str, digits: &str) -> Result<u64, Error> {
    digits.parse().map_err(|source| Error::MalformedInode {
        fd,
        link: link.to_owned(),
        source,
    })
}

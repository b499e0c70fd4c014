#![forbid(unsafe_code)]

use crate::error::Error;
use crate::flags::Flags;
use crate::socket::SocketDetails;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

/// Width of one indentation level in descriptions.
pub const INDENT: &str = "    ";

pub fn indentation(level: usize) -> String {
    INDENT.repeat(level)
}

/// Attributes every descriptor has, parsed from `/proc/<pid>/fdinfo/<fd>`.
///
/// Equality ignores the flags: they may change between two snapshots without
/// the descriptor being a different one.
#[derive(Debug, Clone, Copy)]
pub struct Common {
    number: RawFd,
    flags: Flags,
    mount_id: i32,
}

impl PartialEq for Common {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.mount_id == other.mount_id
    }
}

impl Eq for Common {}

impl Common {
    pub fn new(number: RawFd, flags: Flags, mount_id: i32) -> Self {
        Self {
            number,
            flags,
            mount_id,
        }
    }

    pub(crate) fn load(number: RawFd, fdinfo: &Path) -> Result<Self, Error> {
        let file = File::open(fdinfo).map_err(|source| Error::FdInfoOpen { fd: number, source })?;
        Self::from_reader(number, BufReader::new(file))
    }

    /// Parses the `flags:` and `mnt_id:` fields of an fdinfo record.
    ///
    /// Some descriptor types append lots of type-specific lines, so reading
    /// stops at `mnt_id:`, which follows `flags:`.
    pub fn from_reader<R: BufRead>(number: RawFd, reader: R) -> Result<Self, Error> {
        let mut flags = Flags::default();
        for line in reader.lines() {
            let line = line.map_err(|source| Error::FdInfoRead { fd: number, source })?;
            if let Some(value) = field(&line, "flags:") {
                let bits = u64::from_str_radix(value, 8).map_err(|source| Error::FdInfoSyntax {
                    fd: number,
                    field: "flags",
                    source,
                })?;
                let bits = libc::c_int::try_from(bits).map_err(|_| Error::FdInfoRange {
                    fd: number,
                    field: "flags",
                    value: value.to_owned(),
                })?;
                flags = Flags::from_bits(bits);
            } else if let Some(value) = field(&line, "mnt_id:") {
                let mount_id = value.parse::<i64>().map_err(|source| Error::FdInfoSyntax {
                    fd: number,
                    field: "mnt_id",
                    source,
                })?;
                let mount_id = i32::try_from(mount_id)
                    .ok()
                    .filter(|id| *id >= 0)
                    .ok_or_else(|| Error::FdInfoRange {
                        fd: number,
                        field: "mnt_id",
                        value: value.to_owned(),
                    })?;
                return Ok(Self::new(number, flags, mount_id));
            }
        }
        Err(Error::IncompleteFdInfo(number))
    }

    pub fn number(&self) -> RawFd {
        self.number
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn mount_id(&self) -> i32 {
        self.mount_id
    }

    /// `fd <n>, flags 0x<hex> (<names>)`, indented by `level`.
    pub fn description(&self, level: usize) -> String {
        let names = self.flags.to_string();
        let names = if names.is_empty() {
            names
        } else {
            format!(" ({names})")
        };
        format!(
            "{}fd {}, flags 0x{:x}{}",
            indentation(level),
            self.number,
            self.flags,
            names
        )
    }
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)
        .map(|value| value.trim_matches(|c| c == '\t' || c == ' '))
}

/// What a descriptor refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// A file system path, which may or may not still exist.
    Path(PathBuf),
    /// Either end of a pipe; both ends share the inode.
    Pipe { ino: u64 },
    Socket(Box<SocketDetails>),
    /// Kernel object without a file system path, such as an eventfd.
    AnonInode { file_type: String },
}

/// An open file descriptor as found in a snapshot.
///
/// Two descriptors are equal when they have the same number and mount ID and
/// refer to the same thing; flags don't count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    common: Common,
    kind: Kind,
}

impl Descriptor {
    pub fn new(common: Common, kind: Kind) -> Self {
        Self { common, kind }
    }

    pub fn number(&self) -> RawFd {
        self.common.number
    }

    pub fn flags(&self) -> Flags {
        self.common.flags
    }

    pub fn mount_id(&self) -> i32 {
        self.common.mount_id
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.kind {
            Kind::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn pipe_inode(&self) -> Option<u64> {
        match self.kind {
            Kind::Pipe { ino } => Some(ino),
            _ => None,
        }
    }

    pub fn socket(&self) -> Option<&SocketDetails> {
        match &self.kind {
            Kind::Socket(details) => Some(details),
            _ => None,
        }
    }

    pub fn anon_inode_type(&self) -> Option<&str> {
        match &self.kind {
            Kind::AnonInode { file_type } => Some(file_type),
            _ => None,
        }
    }

    /// Multi-line description; the first line is indented by `level`, the
    /// type-specific details one level deeper.
    pub fn description(&self, level: usize) -> String {
        let details = match &self.kind {
            Kind::Path(path) => vec![format!("path: {path:?}")],
            Kind::Pipe { ino } => vec![format!("pipe inode number: {ino}")],
            Kind::Socket(details) => details.lines(),
            Kind::AnonInode { file_type } => {
                vec![format!("anonymous inode file type: {file_type:?}")]
            }
        };
        let indent = indentation(level + 1);
        let mut description = self.common.description(level);
        for line in details {
            description.push('\n');
            description.push_str(&indent);
            description.push_str(&line);
        }
        description
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description(0))
    }
}

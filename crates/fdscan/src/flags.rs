#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::fmt;

/// Access mode and file status flags of an open file description, as used by
/// open(2) and reported by the `flags:` field of `/proc/<pid>/fdinfo/<fd>`.
///
/// Mostly a bit set, except for the two-bit access mode field and the Linux
/// oddballs `O_TMPFILE` (includes `O_DIRECTORY`) and `O_SYNC` (includes
/// `O_DSYNC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(libc::c_int);

/// Single-bit flags. `O_NDELAY` is `O_NONBLOCK`, `O_FSYNC` and `O_RSYNC` are
/// `O_SYNC`.
const FLAG_NAMES: &[(libc::c_int, &str)] = &[
    (libc::O_APPEND, "O_APPEND"),
    (libc::O_ASYNC, "O_ASYNC"),
    (libc::O_CLOEXEC, "O_CLOEXEC"),
    (libc::O_CREAT, "O_CREAT"),
    (libc::O_DIRECT, "O_DIRECT"),
    (libc::O_EXCL, "O_EXCL"),
    (libc::O_NOATIME, "O_NOATIME"),
    (libc::O_NOCTTY, "O_NOCTTY"),
    (libc::O_NOFOLLOW, "O_NOFOLLOW"),
    (libc::O_NONBLOCK, "O_NONBLOCK"),
    (libc::O_PATH, "O_PATH"),
    (libc::O_TRUNC, "O_TRUNC"),
];

impl Flags {
    pub const fn from_bits(bits: libc::c_int) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> libc::c_int {
        self.0
    }

    /// Symbolic names of the set flags, access mode first. Unknown bits are
    /// ignored.
    pub fn names(self) -> Vec<Cow<'static, str>> {
        let bits = self.0;
        let mut names = Vec::with_capacity(4);

        names.push(match bits & libc::O_ACCMODE {
            libc::O_RDONLY => Cow::Borrowed("O_RDONLY"),
            libc::O_WRONLY => Cow::Borrowed("O_WRONLY"),
            libc::O_RDWR => Cow::Borrowed("O_RDWR"),
            mode => Cow::Owned(format!("access mode {mode}")),
        });

        names.extend(
            FLAG_NAMES
                .iter()
                .filter(|(flag, _)| bits & flag == *flag)
                .map(|(_, name)| Cow::Borrowed(*name)),
        );

        match bits & libc::O_TMPFILE {
            libc::O_DIRECTORY => names.push(Cow::Borrowed("O_DIRECTORY")),
            libc::O_TMPFILE => names.push(Cow::Borrowed("O_TMPFILE")),
            _ => {}
        }

        match bits & libc::O_SYNC {
            libc::O_DSYNC => names.push(Cow::Borrowed("O_DSYNC")),
            libc::O_SYNC => names.push(Cow::Borrowed("O_SYNC")),
            _ => {}
        }

        names
    }
}

impl From<libc::c_int> for Flags {
    fn from(bits: libc::c_int) -> Self {
        Self(bits)
    }
}

impl fmt::LowerHex for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Comma-separated names without spaces, e.g. `O_RDONLY,O_CLOEXEC`.
impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

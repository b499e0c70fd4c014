//! The few system calls needed beyond procfs: integer socket options, raw
//! socket names, and the pidfd pair used to borrow a descriptor of any
//! process, ourselves included.

use crate::socket::SocketOption;
use nix::errno::Errno;
use rustix::net::sockopt;
use rustix::process::{Pid, PidfdFlags, PidfdGetfdFlags};
use std::mem::size_of;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};

const SOCKADDR_STORAGE_LEN: usize = size_of::<libc::sockaddr_storage>();

fn errno(err: rustix::io::Errno) -> Errno {
    Errno::from_raw(err.raw_os_error())
}

pub(crate) fn socket_option(fd: BorrowedFd<'_>, option: SocketOption) -> Result<i32, Errno> {
    match option {
        SocketOption::Domain => sockopt::socket_domain(fd)
            .map(|domain| i32::from(domain.as_raw()))
            .map_err(errno),
        SocketOption::Type => sockopt::socket_type(fd)
            .map_err(errno)
            .and_then(|ty| i32::try_from(ty.as_raw()).map_err(|_| Errno::ERANGE)),
        SocketOption::Protocol => sockopt::socket_protocol(fd)
            .map_err(errno)
            .and_then(|protocol| {
                protocol.map_or(Ok(0), |protocol| {
                    i32::try_from(protocol.as_raw().get()).map_err(|_| Errno::ERANGE)
                })
            }),
        SocketOption::AcceptConn => sockopt::socket_acceptconn(fd)
            .map(i32::from)
            .map_err(errno),
    }
}

pub(crate) fn getsockname(fd: BorrowedFd<'_>) -> Result<Vec<u8>, Errno> {
    socket_name(fd, libc::getsockname)
}

pub(crate) fn getpeername(fd: BorrowedFd<'_>) -> Result<Vec<u8>, Errno> {
    socket_name(fd, libc::getpeername)
}

type NameFn =
    unsafe extern "C" fn(libc::c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int;

/// Returns the first `addrlen` bytes of the socket name, truncated to the
/// size of `sockaddr_storage`. The address decoder needs the raw bytes of
/// every family, including those no wrapper types (vsock, XDP, packet).
#[allow(unsafe_code)]
fn socket_name(fd: BorrowedFd<'_>, name: NameFn) -> Result<Vec<u8>, Errno> {
    let mut storage = [0u8; SOCKADDR_STORAGE_LEN];
    let mut len = SOCKADDR_STORAGE_LEN as libc::socklen_t;
    // SAFETY: the buffer is as large as len says, and the kernel never
    // writes more than len bytes.
    let res = unsafe { name(fd.as_raw_fd(), storage.as_mut_ptr().cast(), &mut len) };
    Errno::result(res)?;
    let len = (len as usize).min(SOCKADDR_STORAGE_LEN);
    Ok(storage[..len].to_vec())
}

/// Opens a pidfd referring to `pid`. Pids that can't exist fail with
/// `ESRCH`.
pub(crate) fn pidfd_open(pid: i32) -> Result<OwnedFd, Errno> {
    let pid = Pid::from_raw(pid).ok_or(Errno::ESRCH)?;
    rustix::process::pidfd_open(pid, PidfdFlags::empty()).map_err(errno)
}

/// Opens a pidfd referring to the calling process.
pub(crate) fn pidfd_open_self() -> Result<OwnedFd, Errno> {
    rustix::process::pidfd_open(rustix::process::getpid(), PidfdFlags::empty()).map_err(errno)
}

/// Duplicates descriptor `target` of the process behind `pidfd` into our own
/// descriptor table. Requires ptrace access to the process, which we always
/// have to ourselves. A number that isn't open fails with `EBADF`.
pub(crate) fn pidfd_getfd(pidfd: BorrowedFd<'_>, target: RawFd) -> Result<OwnedFd, Errno> {
    rustix::process::pidfd_getfd(pidfd, target, PidfdGetfdFlags::empty()).map_err(errno)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn socket_options_of_a_stream_pair() {
        let (sock, _other) = UnixStream::pair().unwrap();
        let fd = sock.as_fd();
        assert_eq!(socket_option(fd, SocketOption::Domain), Ok(libc::AF_UNIX));
        assert_eq!(socket_option(fd, SocketOption::Type), Ok(libc::SOCK_STREAM));
        assert_eq!(socket_option(fd, SocketOption::Protocol), Ok(0));
        assert_eq!(socket_option(fd, SocketOption::AcceptConn), Ok(0));
    }

    #[test]
    fn listening_tcp_socket_options() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = listener.as_fd();
        assert_eq!(socket_option(fd, SocketOption::Domain), Ok(libc::AF_INET));
        assert_eq!(socket_option(fd, SocketOption::Protocol), Ok(libc::IPPROTO_TCP));
        assert_eq!(socket_option(fd, SocketOption::AcceptConn), Ok(1));
    }

    #[test]
    fn unnamed_socket_name_is_family_only() {
        let (sock, _other) = UnixStream::pair().unwrap();
        let name = getsockname(sock.as_fd()).unwrap();
        assert_eq!(name.len(), size_of::<libc::sa_family_t>());
    }

    #[test]
    fn not_a_socket() {
        let file = tempfile::tempfile().unwrap();
        assert_eq!(
            socket_option(file.as_fd(), SocketOption::Type),
            Err(Errno::ENOTSOCK)
        );
        assert_eq!(getpeername(file.as_fd()), Err(Errno::ENOTSOCK));
    }

    #[test]
    fn duplicates_own_descriptor() {
        let file = tempfile::tempfile().unwrap();
        let pidfd = pidfd_open_self().unwrap();
        let dup = pidfd_getfd(pidfd.as_fd(), file.as_raw_fd()).unwrap();
        assert_ne!(dup.as_raw_fd(), file.as_raw_fd());
        assert_eq!(pidfd_getfd(pidfd.as_fd(), -1).unwrap_err(), Errno::EBADF);
    }

    #[test]
    fn impossible_pids_have_no_pidfd() {
        assert_eq!(pidfd_open(0).unwrap_err(), Errno::ESRCH);
        assert_eq!(pidfd_open(-5).unwrap_err(), Errno::ESRCH);
    }
}

#![forbid(unsafe_code)]

#[cfg(target_os = "linux")]
mod linux {
    use fdscan::{Error, FdTable, SocketAddress, SocketOption, SocketProbe, SystemProbe};
    use nix::errno::Errno;
    use std::net::TcpListener;
    use std::os::fd::{AsRawFd, BorrowedFd};
    use std::os::unix::net::{UnixListener, UnixStream};
    use tempfile::tempdir;

    /// Pretends sockets don't know their protocol.
    struct ForgetfulProbe;

    impl SocketProbe for ForgetfulProbe {
        fn int_option(&self, fd: BorrowedFd<'_>, option: SocketOption) -> Result<i32, Errno> {
            match option {
                SocketOption::Protocol => Err(Errno::ENOPROTOOPT),
                option => SystemProbe.int_option(fd, option),
            }
        }

        fn local_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
            SystemProbe.local_address(fd)
        }

        fn peer_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
            SystemProbe.peer_address(fd)
        }
    }

    #[test]
    fn open_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let fd = fdscan::descriptor(file.as_file().as_raw_fd()).unwrap();
        assert_eq!(fd.path(), Some(file.path().canonicalize().unwrap().as_path()));
        assert!(fd.flags().names().iter().any(|name| name == "O_RDWR"));
        assert!(fd.to_string().contains("path: "));
    }

    #[test]
    fn pipe_ends_share_inode() {
        let (read, write) = nix::unistd::pipe().unwrap();
        let read = fdscan::descriptor(read.as_raw_fd()).unwrap();
        let write = fdscan::descriptor(write.as_raw_fd()).unwrap();
        assert!(read.pipe_inode().is_some());
        assert_eq!(read.pipe_inode(), write.pipe_inode());
        assert_ne!(read, write);
    }

    #[test]
    fn listening_tcp_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let fd = fdscan::descriptor(listener.as_raw_fd()).unwrap();
        let socket = fd.socket().expect("socket descriptor");
        assert!(socket.listening);
        assert_eq!(socket.peer, None);

        let description = fd.to_string();
        assert!(
            description.contains("listening socket(AF_INET, SOCK_STREAM, IPPROTO_TCP), ino "),
            "{description}"
        );
        assert!(description.contains(&format!("local \"127.0.0.1:{port}\"")));
        assert!(!description.contains("peer"));
    }

    #[test]
    fn connected_unix_sockets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sock");
        let listener = UnixListener::bind(&path).unwrap();
        let client = UnixStream::connect(&path).unwrap();
        let (server, _) = listener.accept().unwrap();

        let client = fdscan::descriptor(client.as_raw_fd()).unwrap();
        let server = fdscan::descriptor(server.as_raw_fd()).unwrap();
        let name = SocketAddress::Unix(path.to_string_lossy().into_owned());
        assert_eq!(client.socket().unwrap().peer.as_ref(), Some(&name));
        assert_eq!(server.socket().unwrap().local.as_ref(), Some(&name));
        assert_ne!(client.socket().unwrap().ino, server.socket().unwrap().ino);
    }

    #[test]
    fn socket_queries_through_probe() {
        let (sock, _other) = UnixStream::pair().unwrap();
        let table = FdTable::myself().with_probe(ForgetfulProbe);
        let err = table.descriptor(sock.as_raw_fd()).unwrap_err();
        assert!(matches!(
            err,
            Error::SocketOption {
                option: SocketOption::Protocol,
                source: Errno::ENOPROTOOPT,
                ..
            }
        ));
    }

    #[test]
    fn unconnected_peer_is_absent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        struct NoPeer;
        impl SocketProbe for NoPeer {
            fn int_option(&self, fd: BorrowedFd<'_>, option: SocketOption) -> Result<i32, Errno> {
                SystemProbe.int_option(fd, option)
            }
            fn local_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
                SystemProbe.local_address(fd)
            }
            fn peer_address(&self, _fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
                Err(Errno::ENOTCONN)
            }
        }
        let fd = FdTable::myself()
            .with_probe(NoPeer)
            .descriptor(listener.as_raw_fd())
            .unwrap();
        assert_eq!(fd.socket().unwrap().peer, None);
        assert!(fd.socket().unwrap().local.is_some());
    }

    #[test]
    fn closed_descriptor_is_not_found() {
        let file = tempfile::tempfile().unwrap();
        let number = file.as_raw_fd();
        drop(file);
        // Another test may have reused the number in the meantime.
        if let Err(err) = fdscan::descriptor(number) {
            assert!(err.is_not_found(), "{err:?}");
        }
    }
}

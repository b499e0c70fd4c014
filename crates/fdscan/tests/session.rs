#![forbid(unsafe_code)]

#[cfg(target_os = "linux")]
mod linux {
    use fdscan::{Error, Leaks, Session, snapshot_for_handle};
    use std::io::{self, BufRead, BufReader, Write};
    use std::path::Path;
    use std::process::{ChildStdin, ChildStdout, Command, Stdio};
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    /// A shell that opens and closes fd 7 on every line read from stdin,
    /// announcing each step on stdout.
    struct Leaky {
        session: Session,
        stdin: ChildStdin,
        stdout: BufReader<ChildStdout>,
    }

    impl Leaky {
        fn start(file: &Path) -> io::Result<Self> {
            let script = r#"echo READY; read x; exec 7<"$1"; echo LEAKED; read x; exec 7<&-; echo PLUMBED; read x"#;
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(script)
                .arg("leaky")
                .arg(file)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null());
            let mut session = Session::start(command)?;
            let stdin = session.child_mut().stdin.take().ok_or(io::ErrorKind::BrokenPipe)?;
            let stdout = session.child_mut().stdout.take().ok_or(io::ErrorKind::BrokenPipe)?;
            let mut leaky = Self {
                session,
                stdin,
                stdout: BufReader::new(stdout),
            };
            leaky.expect("READY")?;
            Ok(leaky)
        }

        fn step(&mut self, announcement: &str) -> io::Result<()> {
            self.stdin.write_all(b"\n")?;
            self.stdin.flush()?;
            self.expect(announcement)
        }

        fn expect(&mut self, announcement: &str) -> io::Result<()> {
            let mut line = String::new();
            self.stdout.read_line(&mut line)?;
            assert_eq!(line.trim_end(), announcement);
            Ok(())
        }
    }

    fn sleeper() -> Session {
        let mut command = Command::new("sleep");
        command
            .arg("60")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Session::start(command).unwrap()
    }

    #[test]
    fn detects_leak_in_session() -> io::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let path = file.path().canonicalize()?;
        let mut leaky = Leaky::start(&path)?;

        let baseline = snapshot_for_handle(Some(&leaky.session)).unwrap();
        assert!(baseline.iter().all(|fd| fd.number() != 7));
        let mut leaks = Leaks::new(&baseline);

        leaky.step("LEAKED")?;
        let current = snapshot_for_handle(Some(&leaky.session)).unwrap();
        assert!(leaks.check(&current).unwrap());
        assert_eq!(leaks.leaked().len(), 1);
        assert_eq!(leaks.leaked()[0].number(), 7);
        assert_eq!(leaks.leaked()[0].path(), Some(path.as_path()));
        assert!(leaks.failure_message().contains(&format!("{path:?}")));

        let pid = i32::try_from(leaky.session.child_mut().id()).unwrap();
        let single = fdscan::descriptor_for_process(7, pid).unwrap();
        assert_eq!(single, leaks.leaked()[0]);

        leaky.step("PLUMBED")?;
        let current = snapshot_for_handle(Some(&leaky.session)).unwrap();
        assert!(!leaks.check(&current).unwrap(), "{}", leaks.failure_message());

        leaky.session.kill()?;
        leaky.session.wait()?;
        Ok(())
    }

    #[test]
    fn sees_standard_descriptors_of_session() {
        let mut session = sleeper();
        let fds = snapshot_for_handle(Some(&session)).unwrap();
        for number in 0..=2 {
            let fd = fds.iter().find(|fd| fd.number() == number).unwrap();
            assert_eq!(fd.path(), Some(Path::new("/dev/null")));
        }
        session.kill().unwrap();
        session.wait().unwrap();
    }

    #[test]
    fn reaped_session_has_ended() {
        let mut session = sleeper();
        session.kill().unwrap();
        session.wait().unwrap();
        assert!(matches!(
            snapshot_for_handle(Some(&session)),
            Err(Error::ProcessEnded(_))
        ));
    }

    #[test]
    fn killed_session_has_ended_before_reaping() {
        let mut session = sleeper();
        session.kill().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match snapshot_for_handle(Some(&session)) {
                Err(Error::ProcessEnded(_)) => break,
                result => {
                    assert!(Instant::now() < deadline, "still running: {result:?}");
                    sleep(Duration::from_millis(20));
                }
            }
        }
        session.wait().unwrap();
    }
}

#![forbid(unsafe_code)]

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// fdscan: find the file descriptors a process leaks
///
/// fdscan reads the descriptor table of a process from procfs, describes
/// every open descriptor and reports those opened between two snapshots.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/fdscan/config.toml` and `/etc/fdscan/config.d/*.toml`, where
    /// the latter being a glob pattern. If they don't exist, the default
    /// configuration is used. Variables named `FDSCAN_<SECTION>__<KEY>`
    /// override either.
    #[arg(short, long, global = true, value_parser = validate_file)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Describe every open descriptor of a process.
    List {
        /// Process to look at, this process if omitted.
        #[arg(short, long)]
        pid: Option<i32>,
    },

    /// Report descriptors opened between two snapshots of a process.
    ///
    /// Exits with status 1 if any descriptor leaked.
    Check(CheckArgs),
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Running process to watch.
    #[arg(short, long, conflicts_with = "command", required_unless_present = "command")]
    pub pid: Option<i32>,

    /// Milliseconds a launched command may settle before the baseline.
    #[arg(long, value_parser = parse_millis)]
    pub settle: Option<Duration>,

    /// Milliseconds between the two snapshots.
    #[arg(long, value_parser = parse_millis)]
    pub after: Option<Duration>,

    /// Command to launch and watch.
    #[arg(last = true)]
    pub command: Vec<OsString>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn parse_millis(millis: &str) -> Result<Duration, String> {
    millis
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| format!("`{millis}` is not a number of milliseconds"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn millis_candidates() -> impl Strategy<Value = String> {
        prop_oneof![
            2 => any::<u64>().prop_map(|i| format!("{}", i)),
            1 => (-1000..0).prop_map(|i| format!("{}", i)),
            1 => ".*",
        ]
    }

    proptest! {
        #[test]
        fn test_parse_millis(millis in millis_candidates()) {
            match parse_millis(&millis) {
                Ok(duration) => prop_assert_eq!(Ok(duration.as_millis()), millis.parse::<u128>()),
                Err(err) => prop_assert_eq!(
                    err,
                    format!("`{}` is not a number of milliseconds", millis)
                ),
            }
        }
    }

    #[test]
    fn check_takes_trailing_command() {
        let cli =
            Cli::try_parse_from(["fdscan", "check", "--after", "20", "--", "sh", "-c", "true"])
                .unwrap();
        let Command::Check(args) = cli.command else {
            panic!("not a check: {cli:?}");
        };
        assert_eq!(args.pid, None);
        assert_eq!(args.after, Some(Duration::from_millis(20)));
        assert_eq!(args.settle, None);
        assert_eq!(args.command, ["sh", "-c", "true"]);
    }

    #[test]
    fn check_needs_exactly_one_target() {
        assert!(Cli::try_parse_from(["fdscan", "check"]).is_err());
        assert!(Cli::try_parse_from(["fdscan", "check", "--pid", "1", "--", "true"]).is_err());
        assert!(Cli::try_parse_from(["fdscan", "check", "--pid", "1"]).is_ok());
    }

    #[test]
    fn list_defaults_to_own_process() {
        let cli = Cli::try_parse_from(["fdscan", "list"]).unwrap();
        assert!(matches!(cli.command, Command::List { pid: None }));
    }

    #[test]
    fn missing_config_file_is_rejected() {
        let args = ["fdscan", "--config", "/nonexistent/fdscan.toml", "list"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}

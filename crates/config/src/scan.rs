#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::path::PathBuf;
use std::time::Duration;

/// How and when descriptor tables are read.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scan {
    /// Mount point of procfs.
    pub procfs: PathBuf,

    /// Time a launched command is given to start up before the baseline
    /// snapshot is taken, in milliseconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle: Duration,

    /// Time between the baseline and the second snapshot, in milliseconds.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub after: Duration,
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            procfs: PathBuf::from("/proc"),
            settle: Duration::from_millis(500),
            after: Duration::from_secs(1),
        }
    }
}

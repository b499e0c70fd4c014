#![forbid(unsafe_code)]

use fdscan::{AnonInodeTypes, Exclusion, FdNumbers, PathPrefixes};
use serde::{Deserialize, Serialize};
use std::os::fd::RawFd;

/// Descriptors that are never reported as leaked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ignore {
    /// Path prefixes of ignored files.
    ///
    /// A prefix starting with `!` reports matching paths even when a shorter
    /// prefix would ignore them. The longest matching prefix wins; paths no
    /// prefix matches are reported.
    pub paths: Vec<String>,

    /// Types of anonymous inodes, such as `[eventpoll]`. Brackets are
    /// optional.
    pub anon_inodes: Vec<String>,

    /// Descriptor numbers.
    pub fds: Vec<RawFd>,
}

impl Ignore {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.anon_inodes.is_empty() && self.fds.is_empty()
    }

    /// Exclusions for [`fdscan::Leaks::ignoring_all`], one per non-empty
    /// list.
    pub fn exclusions(&self) -> Vec<Box<dyn Exclusion>> {
        let mut exclusions: Vec<Box<dyn Exclusion>> = Vec::new();
        if !self.paths.is_empty() {
            exclusions.push(Box::new(PathPrefixes::new(self.paths.iter().cloned())));
        }
        if !self.anon_inodes.is_empty() {
            exclusions.push(Box::new(AnonInodeTypes::new(&self.anon_inodes)));
        }
        if !self.fds.is_empty() {
            exclusions.push(Box::new(FdNumbers::new(self.fds.iter().copied())));
        }
        exclusions
    }
}

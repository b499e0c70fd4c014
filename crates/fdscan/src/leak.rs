#![forbid(unsafe_code)]

use crate::descriptor::Descriptor;
use crate::error::{Error, ExclusionError};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::{Any, type_name};
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use tracing::trace;

const MATCHER: &str = "Leaks";

/// Decides whether a descriptor not found in the baseline is expected anyway.
pub trait Exclusion {
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError>;
}

impl<F> Exclusion for F
where
    F: Fn(&Descriptor) -> Result<bool, ExclusionError>,
{
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError> {
        self(descriptor)
    }
}

/// Descriptors of a snapshot, indexed by number.
#[derive(Debug, Clone, Default)]
pub struct IgnoringDescriptors {
    by_number: FxHashMap<RawFd, Descriptor>,
}

impl IgnoringDescriptors {
    pub fn new(descriptors: &[Descriptor]) -> Self {
        Self {
            by_number: descriptors
                .iter()
                .map(|fd| (fd.number(), fd.clone()))
                .collect(),
        }
    }

    pub fn contains(&self, descriptor: &Descriptor) -> bool {
        self.by_number
            .get(&descriptor.number())
            .is_some_and(|known| known == descriptor)
    }
}

impl Exclusion for IgnoringDescriptors {
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError> {
        Ok(self.contains(descriptor))
    }
}

/// Excludes path descriptors by path prefix. A prefix starting with `!`
/// keeps matching paths instead; the longest matching prefix decides, the
/// first one listed among equally long ones. Empty prefixes are ignored.
#[derive(Debug, Clone, Default)]
pub struct PathPrefixes {
    /// Prefix and whether it excludes.
    rules: Vec<(String, bool)>,
}

impl PathPrefixes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules = prefixes
            .into_iter()
            .map(|prefix| {
                let prefix: String = prefix.into();
                match prefix.strip_prefix('!') {
                    Some(kept) => (kept.to_owned(), false),
                    None => (prefix, true),
                }
            })
            .filter(|(prefix, _)| !prefix.is_empty())
            .collect();
        Self { rules }
    }

    pub fn matches(&self, path: &[u8]) -> bool {
        self.rules
            .iter()
            .rev()
            .filter(|(prefix, _)| path.starts_with(prefix.as_bytes()))
            .max_by_key(|(prefix, _)| prefix.len())
            .is_some_and(|(_, exclude)| *exclude)
    }
}

impl Exclusion for PathPrefixes {
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError> {
        Ok(descriptor
            .path()
            .is_some_and(|path| self.matches(path.as_os_str().as_bytes())))
    }
}

/// Excludes anonymous inodes by file type, such as `eventpoll`.
#[derive(Debug, Clone, Default)]
pub struct AnonInodeTypes {
    types: FxHashSet<String>,
}

impl AnonInodeTypes {
    /// Types may be given with or without the enclosing brackets.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            types: types
                .into_iter()
                .map(|t| t.as_ref().trim_matches(|c| c == '[' || c == ']').to_owned())
                .collect(),
        }
    }
}

impl Exclusion for AnonInodeTypes {
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError> {
        Ok(descriptor
            .anon_inode_type()
            .is_some_and(|file_type| self.types.contains(file_type)))
    }
}

/// Excludes descriptors by number, whatever they refer to.
#[derive(Debug, Clone, Default)]
pub struct FdNumbers {
    numbers: FxHashSet<RawFd>,
}

impl FdNumbers {
    pub fn new(numbers: impl IntoIterator<Item = RawFd>) -> Self {
        Self {
            numbers: numbers.into_iter().collect(),
        }
    }
}

impl Exclusion for FdNumbers {
    fn excludes(&self, descriptor: &Descriptor) -> Result<bool, ExclusionError> {
        Ok(self.numbers.contains(&descriptor.number()))
    }
}

/// Finds descriptors in a snapshot that neither are in the baseline nor are
/// excluded otherwise.
///
/// ```no_run
/// let baseline = fdscan::snapshot();
/// // ...code under test...
/// let mut leaks = fdscan::Leaks::new(&baseline);
/// if leaks.check(&fdscan::snapshot())? {
///     eprintln!("{}", leaks.failure_message());
/// }
/// # Ok::<(), fdscan::Error>(())
/// ```
pub struct Leaks<'a> {
    baseline: IgnoringDescriptors,
    exclusions: Vec<Box<dyn Exclusion + 'a>>,
    leaked: Vec<Descriptor>,
}

impl<'a> Leaks<'a> {
    pub fn new(baseline: &[Descriptor]) -> Self {
        Self {
            baseline: IgnoringDescriptors::new(baseline),
            exclusions: Vec::new(),
            leaked: Vec::new(),
        }
    }

    /// Adds an exclusion, consulted after the baseline and the exclusions
    /// added before.
    pub fn ignoring(mut self, exclusion: impl Exclusion + 'a) -> Self {
        self.exclusions.push(Box::new(exclusion));
        self
    }

    pub fn ignoring_all(mut self, exclusions: impl IntoIterator<Item = Box<dyn Exclusion + 'a>>) -> Self {
        self.exclusions.extend(exclusions);
        self
    }

    /// Returns whether `current` contains leaked descriptors, which are
    /// then available from [`Leaks::leaked`].
    pub fn check(&mut self, current: &[Descriptor]) -> Result<bool, Error> {
        self.leaked.clear();
        'next: for descriptor in current {
            if self.baseline.contains(descriptor) {
                continue;
            }
            for exclusion in &self.exclusions {
                if exclusion.excludes(descriptor).map_err(Error::Exclusion)? {
                    trace!(fd = descriptor.number(), "Excluded descriptor");
                    continue 'next;
                }
            }
            self.leaked.push(descriptor.clone());
        }
        Ok(!self.leaked.is_empty())
    }

    /// Like [`Leaks::check`], for values only known to be `Any`. Accepts
    /// `Vec<Descriptor>`, `Box<[Descriptor]>` and `Some(Vec<Descriptor>)`.
    pub fn check_value<T: Any>(&mut self, actual: &T) -> Result<bool, Error> {
        let actual: &dyn Any = actual;
        let current: &[Descriptor] = if let Some(vec) = actual.downcast_ref::<Vec<Descriptor>>() {
            vec
        } else if let Some(boxed) = actual.downcast_ref::<Box<[Descriptor]>>() {
            boxed
        } else if let Some(Some(vec)) = actual.downcast_ref::<Option<Vec<Descriptor>>>() {
            vec
        } else {
            return Err(Error::NotDescriptors {
                matcher: MATCHER,
                got: type_name::<T>(),
            });
        };
        self.check(current)
    }

    /// Leaked descriptors found by the last check, in snapshot order.
    pub fn leaked(&self) -> &[Descriptor] {
        &self.leaked
    }

    pub fn failure_message(&self) -> String {
        format!(
            "Expected to leak {} file descriptors:\n{}",
            self.leaked.len(),
            dump(&self.leaked, 1)
        )
    }

    pub fn negated_failure_message(&self) -> String {
        format!(
            "Expected not to leak {} file descriptors:\n{}",
            self.leaked.len(),
            dump(&self.leaked, 1)
        )
    }
}

/// Descriptions of `descriptors` ordered by number, one after another.
pub fn dump(descriptors: &[Descriptor], level: usize) -> String {
    let mut sorted = descriptors.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|fd| fd.number());
    sorted
        .into_iter()
        .map(|fd| fd.description(level))
        .collect::<Vec<_>>()
        .join("\n")
}

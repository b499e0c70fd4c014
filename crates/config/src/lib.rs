#![forbid(unsafe_code)]
//! Configuration of the `fdscan` command: which descriptors to ignore and how
//! to time the snapshots.

mod error;
mod ignore;
mod scan;

pub use error::Error;
pub use ignore::Ignore;
pub use scan::Scan;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::trace;

/// Prefix of environment variables overriding configuration keys. Nested
/// keys are separated by `__`, as in `FDSCAN_SCAN__SETTLE=250`.
pub const ENV_PREFIX: &str = "FDSCAN_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: Scan,
    pub ignore: Ignore,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with
    /// defaults, environment variables override the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let doc: toml_edit::DocumentMut = text.parse()?;
        Self::layered(&doc)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let toml = toml_edit::ser::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from multiple TOML files. Later files override
    /// earlier ones, missing files are skipped.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                trace!(?path, "skipping missing config file");
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            merge_document(&mut merged, doc);
        }
        Self::layered(&merged)
    }

    fn layered(doc: &toml_edit::DocumentMut) -> Result<Self, Error> {
        let config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(&doc.to_string()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }
}

fn merge_document(target: &mut toml_edit::DocumentMut, source: toml_edit::DocumentMut) {
    for (key, item) in source.iter() {
        merge_item(
            target.entry(key).or_insert(toml_edit::Item::None),
            item.clone(),
        );
    }
}

fn merge_item(target: &mut toml_edit::Item, source: toml_edit::Item) {
    use toml_edit::Item;
    match (target, source) {
        (Item::Table(target_table), Item::Table(source_table)) => {
            for (key, item) in source_table.iter() {
                merge_item(target_table.entry(key).or_insert(Item::None), item.clone());
            }
        }
        (target_item, source_item) => {
            *target_item = source_item;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::time::Duration;

    // Every test runs inside a jail, which serializes access to the
    // environment.

    #[test]
    fn roundtrip() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("config.toml");
            let config = Config {
                scan: Scan {
                    procfs: PathBuf::from("/somewhere/proc"),
                    settle: Duration::from_millis(20),
                    after: Duration::from_millis(30),
                },
                ignore: Ignore {
                    paths: vec!["/dev/".into(), "!/dev/shm/".into()],
                    anon_inodes: vec!["[eventfd]".into()],
                    fds: vec![0, 1, 2],
                },
            };
            config.save(&path).unwrap();
            assert_eq!(Config::load(&path).unwrap(), config);
            Ok(())
        });
    }

    #[test]
    fn missing_fields_are_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[ignore]\nfds = [3]\n")?;
            let config = Config::load(jail.directory().join("config.toml")).unwrap();
            assert_eq!(config.scan, Scan::default());
            assert_eq!(config.ignore.fds, vec![3]);
            assert!(config.ignore.paths.is_empty());
            Ok(())
        });
    }

    #[test]
    fn load_multiple_merges() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "a.toml",
                "[scan]\nsettle = 60\nafter = 70\n[ignore]\npaths = [\"/a\"]\n",
            )?;
            jail.create_file("b.toml", "[scan]\nafter = 80\n[ignore]\npaths = [\"/b\"]\n")?;
            let dir = jail.directory();

            let config = Config::load_multiple([
                dir.join("a.toml"),
                dir.join("missing.toml"),
                dir.join("b.toml"),
            ])
            .unwrap();
            assert_eq!(config.scan.settle, Duration::from_millis(60));
            assert_eq!(config.scan.after, Duration::from_millis(80));
            assert_eq!(config.scan.procfs, PathBuf::from("/proc"));
            assert_eq!(config.ignore.paths, vec!["/b".to_owned()]);
            Ok(())
        });
    }

    #[test]
    fn no_files_means_defaults() {
        Jail::expect_with(|_| {
            let config = Config::load_multiple(Vec::<PathBuf>::new()).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_files() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[scan]\nsettle = 60\n")?;
            jail.set_env("FDSCAN_SCAN__SETTLE", 5);
            jail.set_env("FDSCAN_IGNORE__FDS", "[4, 5]");
            let config = Config::load(jail.directory().join("config.toml")).unwrap();
            assert_eq!(config.scan.settle, Duration::from_millis(5));
            assert_eq!(config.ignore.fds, vec![4, 5]);
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[scan\n")?;
            let err = Config::load(jail.directory().join("config.toml")).unwrap_err();
            assert!(matches!(err, Error::ParseTOML(_)), "{err}");
            Ok(())
        });
    }
}

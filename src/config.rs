//! Configuration of module lookup.
use std::{
    env,
    path::{Path, PathBuf},
};

use crate::module::ModuleName;

/// Sets a configuration field from an `AEON_` environment variable, if the
/// variable is set and its value is valid.
macro_rules! set_from_env {
    ($config:expr, $field:ident, $key:expr, $value_type:ty) => {{
        if let Ok(raw_value) = env::var(concat!("AEON_", $key)) {
            if let Ok(value) = raw_value.parse::<$value_type>() {
                $config.$field = value;
            }
        };
    }};
}

pub const DEFAULT_SOURCE_EXTENSION: &str = "aeon";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The directories to search for modules, in order.
    pub directories: Vec<PathBuf>,
    /// The extension of source files, without the leading dot.
    pub source_extension: String,
}

impl Config {
    pub fn new() -> Config {
        Config {
            directories: Vec::new(),
            source_extension: String::from(DEFAULT_SOURCE_EXTENSION),
        }
    }

    /// Builds a configuration from the defaults and the environment.
    ///
    /// `AEON_DIRECTORIES` is a list of paths separated like `PATH` is.
    pub fn from_env() -> Config {
        let mut config = Config::new();
        config.populate_from_env();
        config
    }

    pub fn populate_from_env(&mut self) {
        set_from_env!(self, source_extension, "SOURCE_EXTENSION", String);

        if let Some(paths) = env::var_os("AEON_DIRECTORIES") {
            self.directories.extend(env::split_paths(&paths));
        }
    }

    pub fn add_directory(&mut self, path: impl Into<PathBuf>) {
        self.directories.push(path.into());
    }

    /// Returns the source file of a module, found in the first directory that
    /// contains it.
    pub fn resolve(&self, name: &ModuleName) -> Option<PathBuf> {
        let relative = name.source_path(&self.source_extension);
        let found = self
            .directories
            .iter()
            .map(|directory| directory.join(&relative))
            .find(|path| path.is_file());
        log::trace!("resolved {name} to {found:?}");
        found
    }

    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.directories.iter().map(PathBuf::as_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn resolve_uses_the_first_directory_containing_the_module() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("a/b")).unwrap();
        fs::write(second.path().join("a/b/c.aeon"), "").unwrap();
        fs::create_dir_all(first.path().join("a")).unwrap();
        fs::write(first.path().join("a/b.aeon"), "").unwrap();

        let mut config = Config::new();
        config.add_directory(first.path());
        config.add_directory(second.path());

        assert_eq!(
            config.resolve(&ModuleName::parse("a::b::c")),
            Some(second.path().join("a/b/c.aeon"))
        );
        assert_eq!(
            config.resolve(&ModuleName::parse("a::b")),
            Some(first.path().join("a/b.aeon"))
        );
        assert_eq!(config.resolve(&ModuleName::parse("a::d")), None);
    }

    #[test]
    fn source_extension_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.src"), "").unwrap();

        let mut config = Config::new();
        config.add_directory(dir.path());
        assert_eq!(config.resolve(&ModuleName::parse("main")), None);

        config.source_extension = String::from("src");
        assert_eq!(
            config.resolve(&ModuleName::parse("main")),
            Some(dir.path().join("main.src"))
        );
    }
}

use crate::error::Error;
use std::io;

/// Layered key/value configuration, backed by a TOML document
///
/// Values are loaded from a file, then possibly overridden from the command line.
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl Config {
    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k.as_ref())?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k.as_ref())?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type boolean by path
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        self.lookup(k.as_ref())?.as_bool()
    }

    /// Set a top-level entry, replacing any existing value
    pub fn set<T: AsRef<str>, V: Into<toml::Value>>(&mut self, k: T, v: V) {
        if let toml::Value::Table(ref mut t) = self.value {
            t.insert(k.as_ref().to_owned(), v.into());
        }
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table = toml::from_str::<toml::Table>(&s).map_err(|e| Error::Config(e.to_string()))?;
        if let toml::Value::Table(ref mut current) = self.value {
            for (k, v) in table {
                current.insert(k, v);
            }
        }
        Ok(())
    }

    fn lookup(&self, path: &str) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in path.split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }
}

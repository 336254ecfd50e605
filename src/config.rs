//! Bootstrap configuration for the embedded interpreter.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

/// Extra `sys.path` entries, `PATH`-style separated.
pub const PATH_VAR: &str = "PYBRIDGE_PATH";
/// Set (to anything) to keep libpython's symbols local.
pub const LOCAL_SYMBOLS_VAR: &str = "PYBRIDGE_LOCAL_SYMBOLS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prepended to `sys.path`, first entry first.
    pub sys_path: Vec<PathBuf>,
    /// Re-open libpython with `RTLD_GLOBAL` (Linux only) so native extension
    /// modules can resolve interpreter symbols.
    pub promote_libpython: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sys_path: vec![PathBuf::from(".")],
            promote_libpython: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os(PATH_VAR), env::var_os(LOCAL_SYMBOLS_VAR))
    }

    fn from_vars(path: Option<OsString>, local_symbols: Option<OsString>) -> Self {
        let mut config = Config::default();
        if let Some(path) = path {
            let extra: Vec<PathBuf> = env::split_paths(&path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            config.sys_path.splice(0..0, extra);
        }
        if local_symbols.is_some() {
            config.promote_libpython = false;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let config = Config::from_vars(None, None);
        assert_eq!(config, Config::default());
        assert_eq!(config.sys_path, vec![PathBuf::from(".")]);
        assert!(config.promote_libpython);
    }

    #[test]
    fn path_entries_come_first() {
        let joined = env::join_paths(["/opt/models", "/srv/lib"]).unwrap();
        let config = Config::from_vars(Some(joined), Some(OsString::from("1")));
        assert_eq!(
            config.sys_path,
            vec![
                PathBuf::from("/opt/models"),
                PathBuf::from("/srv/lib"),
                PathBuf::from(".")
            ]
        );
        assert!(!config.promote_libpython);
    }

    #[test]
    fn empty_path_entries_are_skipped() {
        let config = Config::from_vars(Some(OsString::new()), None);
        assert_eq!(config.sys_path, vec![PathBuf::from(".")]);
    }
}

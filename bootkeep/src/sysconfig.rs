// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Prefix-scoped single-value configuration fragments
//!
//! Loader knobs live as one-line text files under `etc/kernel`. The writer
//! always terminates the value with a newline; the reader tolerates a
//! missing one. A value of "unset" is the file's absence.

use std::{fs, io::ErrorKind, path::PathBuf};

use crate::{Error, KERNEL_CONF_DIR};

/// The closed set of recognised configuration fragments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysconfigFile {
    /// Loader menu timeout in seconds
    Timeout,
    /// Loader console mode, see `loader.conf(5)`
    ConsoleMode,
}

impl SysconfigFile {
    fn as_str(self) -> &'static str {
        match self {
            SysconfigFile::Timeout => "timeout",
            SysconfigFile::ConsoleMode => "console_mode",
        }
    }
}

/// Per-prefix configuration owned by the manager
#[derive(Debug)]
pub struct SysConfig {
    /// Root of all operations; validated to be an existing directory
    pub prefix: PathBuf,

    /// Block probe result for the rootfs, when probing succeeded
    pub root_device: Option<blockdev::BlockDevice>,
}

impl SysConfig {
    pub(crate) fn new(prefix: impl Into<PathBuf>) -> Result<Self, Error> {
        let prefix = prefix.into();
        if !prefix.is_dir() {
            return Err(Error::NotADirectory { path: prefix });
        }
        Ok(Self {
            prefix,
            root_device: None,
        })
    }

    fn fragment_path(&self, file: SysconfigFile) -> PathBuf {
        self.prefix.join(KERNEL_CONF_DIR).join(file.as_str())
    }

    /// Write a fragment, or remove it when `contents` is `None`
    pub fn write(&self, file: SysconfigFile, contents: Option<&str>) -> Result<(), Error> {
        let dir = self.prefix.join(KERNEL_CONF_DIR);
        if let Err(source) = fs::create_dir_all(&dir) {
            log::error!("failed to create {}: {source}", dir.display());
            return Err(Error::Path { path: dir, source });
        }

        let path = self.fragment_path(file);
        let Some(contents) = contents else {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => {
                    log::error!("unable to remove {}: {source}", path.display());
                    Err(Error::Path { path, source })
                }
            };
        };

        fs::write(&path, format!("{contents}\n")).map_err(|source| {
            log::error!("unable to write {}: {source}", path.display());
            Error::Path { path, source }
        })
    }

    /// First line of a fragment, newline stripped; `None` when absent
    pub fn read(&self, file: SysconfigFile) -> Result<Option<String>, Error> {
        let path = self.fragment_path(file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                log::error!("unable to read {}: {source}", path.display());
                return Err(Error::Path { path, source });
            }
        };

        match text.lines().next() {
            Some(line) => Ok(Some(line.to_owned())),
            None => {
                log::error!("failed to parse {}, using defaults", path.display());
                Ok(None)
            }
        }
    }

    /// Configured loader timeout. Absent, unparseable and non-positive
    /// stored values all read back as "no timeout configured".
    pub fn timeout(&self) -> Result<Option<u32>, Error> {
        let Some(value) = self.read(SysconfigFile::Timeout)? else {
            return Ok(None);
        };
        match value.parse::<u32>() {
            Ok(timeout) if timeout > 0 => Ok(Some(timeout)),
            _ => {
                log::error!("invalid loader timeout {value:?}, defaulting to no timeout");
                Ok(None)
            }
        }
    }

    /// Set the loader timeout; zero removes the fragment
    pub fn set_timeout(&self, timeout: u32) -> Result<(), Error> {
        if timeout == 0 {
            self.write(SysconfigFile::Timeout, None)
        } else {
            self.write(SysconfigFile::Timeout, Some(&timeout.to_string()))
        }
    }

    pub fn console_mode(&self) -> Result<Option<String>, Error> {
        self.read(SysconfigFile::ConsoleMode)
    }

    /// Set the loader console mode; `None` removes the fragment
    pub fn set_console_mode(&self, mode: Option<&str>) -> Result<(), Error> {
        self.write(SysconfigFile::ConsoleMode, mode)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{SysConfig, SysconfigFile};
    use crate::KERNEL_CONF_DIR;

    fn fixture() -> (TempDir, SysConfig) {
        let root = TempDir::new().unwrap();
        let sysconfig = SysConfig::new(root.path()).unwrap();
        (root, sysconfig)
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(SysConfig::new("/ro347u59jaowlq-definitely-not-here").is_err());
    }

    #[test]
    fn absent_fragment_reads_as_none() {
        let (_root, sysconfig) = fixture();
        assert_eq!(sysconfig.read(SysconfigFile::Timeout).unwrap(), None);
    }

    #[test]
    fn reader_tolerates_missing_newline() {
        let (root, sysconfig) = fixture();
        let dir = root.path().join(KERNEL_CONF_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("timeout"), "5").unwrap();
        assert_eq!(sysconfig.timeout().unwrap(), Some(5));
    }

    #[test]
    fn empty_fragment_reads_as_none() {
        let (root, sysconfig) = fixture();
        let dir = root.path().join(KERNEL_CONF_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("timeout"), "").unwrap();
        assert_eq!(sysconfig.timeout().unwrap(), None);
    }

    #[test]
    fn writer_appends_newline() {
        let (root, sysconfig) = fixture();
        sysconfig.set_timeout(7).unwrap();
        let stored = fs::read_to_string(root.path().join(KERNEL_CONF_DIR).join("timeout")).unwrap();
        assert_eq!(stored, "7\n");
    }

    #[test]
    fn non_numeric_timeout_reads_as_none() {
        let (root, sysconfig) = fixture();
        let dir = root.path().join(KERNEL_CONF_DIR);
        fs::create_dir_all(&dir).unwrap();
        for bad in ["garbage", "-3", "0"] {
            fs::write(dir.join("timeout"), format!("{bad}\n")).unwrap();
            assert_eq!(sysconfig.timeout().unwrap(), None, "{bad:?} should be unset");
        }
    }

    #[test]
    fn removing_an_absent_fragment_succeeds() {
        let (_root, sysconfig) = fixture();
        sysconfig.set_console_mode(None).unwrap();
        sysconfig.set_console_mode(None).unwrap();
        assert_eq!(sysconfig.console_mode().unwrap(), None);
    }
}

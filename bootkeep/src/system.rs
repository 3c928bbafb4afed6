// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! System capability: firmware facts, EFI variables, filesystem types
//!
//! Everything the manager needs to know about the machine it runs on sits
//! behind the [`System`] trait so tests can pin the answers.

use std::{
    env, fmt, fs, io,
    path::{Path, PathBuf},
};

use uuid::Uuid;

/// Disables EFI variable writes when set to `yes`
pub const BOOTVAR_TEST_MODE_ENV: &str = "BOOTKEEP_BOOTVAR_TEST_MODE";

/// Overrides boot partition filesystem detection
pub const TEST_FSTYPE_ENV: &str = "BOOTKEEP_TEST_FSTYPE";

/// systemd boot loader interface vendor GUID
pub const LOADER_VENDOR_GUID: &str = "4a67b082-0a4c-41cf-b6c7-440b29bb8c4f";

/// Firmware class the machine booted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firmware {
    Uefi,

    /// Legacy BIOS. Tread carefully
    Legacy,
}

/// Narrow system interface consumed by the manager
pub trait System: fmt::Debug {
    fn sysfs_path(&self) -> &Path;
    fn devfs_path(&self) -> &Path;
    fn firmware_class(&self) -> Firmware;

    /// Read an EFI variable by name, any vendor GUID
    fn efi_variable(&self, name: &str) -> Option<String>;

    /// Write an EFI variable; a no-op under [`BOOTVAR_TEST_MODE_ENV`]
    fn set_efi_variable(&self, name: &str, value: &str) -> io::Result<()>;

    /// Filesystem type at `path`, overridable via [`TEST_FSTYPE_ENV`]
    fn boot_fstype(&self, path: &Path) -> Option<String>;

    fn sync_filesystem(&self, path: &Path) -> io::Result<()>;
}

/// ESP partition UUID advertised by a BLS capable loader
pub fn loader_device_part_uuid(system: &dyn System) -> Option<Uuid> {
    let value = system.efi_variable("LoaderDevicePartUUID")?;
    Uuid::parse_str(value.trim()).ok()
}

/// Host implementation over real sysfs/devfs
#[derive(Debug)]
pub struct HostSystem {
    sysfs: PathBuf,
    devfs: PathBuf,
}

impl Default for HostSystem {
    fn default() -> Self {
        Self {
            sysfs: "/sys".into(),
            devfs: "/dev".into(),
        }
    }
}

impl HostSystem {
    pub fn new(sysfs: impl Into<PathBuf>, devfs: impl Into<PathBuf>) -> Self {
        Self {
            sysfs: sysfs.into(),
            devfs: devfs.into(),
        }
    }

    fn efivars(&self) -> PathBuf {
        self.sysfs.join("firmware").join("efi").join("efivars")
    }

    /// Locate `<name>-<guid>` under efivars
    fn variable_path(&self, name: &str) -> Option<PathBuf> {
        let wanted = format!("{name}-");
        let entries = fs::read_dir(self.efivars()).ok()?;
        entries
            .flatten()
            .find(|entry| entry.file_name().to_string_lossy().starts_with(&wanted))
            .map(|entry| entry.path())
    }
}

impl System for HostSystem {
    fn sysfs_path(&self) -> &Path {
        &self.sysfs
    }

    fn devfs_path(&self) -> &Path {
        &self.devfs
    }

    fn firmware_class(&self) -> Firmware {
        if self.sysfs.join("firmware").join("efi").exists() {
            Firmware::Uefi
        } else {
            Firmware::Legacy
        }
    }

    fn efi_variable(&self, name: &str) -> Option<String> {
        let path = self.variable_path(name)?;
        let bytes = fs::read(&path).ok()?;
        Some(decode_variable(&bytes))
    }

    fn set_efi_variable(&self, name: &str, value: &str) -> io::Result<()> {
        if env::var(BOOTVAR_TEST_MODE_ENV).is_ok_and(|v| v == "yes") {
            log::debug!("EFI variable writes disabled, skipping {name}");
            return Ok(());
        }
        let path = self
            .variable_path(name)
            .unwrap_or_else(|| self.efivars().join(format!("{name}-{LOADER_VENDOR_GUID}")));
        fs::write(path, value)
    }

    fn boot_fstype(&self, path: &Path) -> Option<String> {
        if let Ok(fstype) = env::var(TEST_FSTYPE_ENV) {
            return Some(fstype);
        }
        let st = nix::sys::statfs::statfs(path).ok()?;
        let fstype = st.filesystem_type();
        if fstype == nix::sys::statfs::MSDOS_SUPER_MAGIC {
            Some("vfat".to_owned())
        } else if fstype == nix::sys::statfs::EXT4_SUPER_MAGIC {
            Some("ext4".to_owned())
        } else {
            None
        }
    }

    fn sync_filesystem(&self, path: &Path) -> io::Result<()> {
        let fd = fs::File::open(path)?;
        nix::unistd::syncfs(fd).map_err(io::Error::from)
    }
}

/// efivarfs payloads are UCS-2 strings behind a 4-byte attribute header;
/// test fixtures are plain text. Tell them apart and decode.
fn decode_variable(bytes: &[u8]) -> String {
    let decoded = if bytes.len() > 4 && bytes.len() % 2 == 0 && bytes.get(5) == Some(&0) {
        let units: Vec<u16> = bytes[4..]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    decoded
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_owned()
}

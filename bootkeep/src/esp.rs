// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Boot partition layout inspection
//!
//! Computes the file set a kernel is expected to occupy on the boot
//! partition and classifies how much of it is actually there. Upper layers
//! drive install/uninstall from the classification.

use std::path::PathBuf;

use crate::{file_utils::PathExt, kernel::Kernel, manager::Manager, system::Firmware, Error};

/// Naming scheme for kernel payloads on the boot partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EspNaming {
    /// `kernel-<ns>.<type>.<version>-<release>` below the loader destination
    #[default]
    Namespaced,

    /// Flat historical layout at the boot root
    PreNamespace,
}

/// Expected on-disk locations for one kernel
#[derive(Debug)]
pub struct ExpectedFiles {
    pub loader_entry: PathBuf,
    pub kernel_blob: PathBuf,

    /// Unset on legacy firmware, which boots without an on-ESP initrd
    pub initrd: Option<PathBuf>,
}

impl ExpectedFiles {
    pub fn paths(&self) -> Vec<&PathBuf> {
        let mut paths = vec![&self.loader_entry, &self.kernel_blob];
        if let Some(initrd) = self.initrd.as_ref() {
            paths.push(initrd);
        }
        paths
    }
}

/// Installation state of a kernel on the boot partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Installed,
    Uninstalled,

    /// Anything in between; callers treat this as corruption
    Partial { present: usize, expected: usize },
}

/// Computes and checks the expected boot partition file set for kernels
#[derive(Debug)]
pub struct Inspector<'a> {
    manager: &'a Manager,
    naming: EspNaming,
}

impl<'a> Inspector<'a> {
    pub fn new(manager: &'a Manager) -> Self {
        Self {
            manager,
            naming: EspNaming::default(),
        }
    }

    /// With the given payload naming scheme
    pub fn with_naming(self, naming: EspNaming) -> Self {
        Self { naming, ..self }
    }

    pub fn expected_files(&self, kernel: &Kernel) -> Result<ExpectedFiles, Error> {
        let boot = self.manager.boot_dir()?;
        let vendor = self.manager.vendor_prefix().ok_or(Error::NoPrefix)?;
        let namespace = self.manager.namespace().ok_or(Error::NoPrefix)?;
        let meta = &kernel.meta;

        let loader_entry = boot
            .join_insensitive("loader")
            .join_insensitive("entries")
            .join(format!(
                "{vendor}-{}-{}-{}.conf",
                meta.ktype, meta.version, meta.release
            ));

        let payload = format!("{namespace}.{}.{}-{}", meta.ktype, meta.version, meta.release);
        let (kernel_blob, initrd) = match self.naming {
            EspNaming::Namespaced => {
                let mut dest = boot;
                for part in self.manager.kernel_destination()?.split('/') {
                    dest = dest.join_insensitive(part);
                }
                (
                    dest.join(format!("kernel-{payload}")),
                    dest.join(format!("initrd-{payload}")),
                )
            }
            EspNaming::PreNamespace => (boot.join(&payload), boot.join(format!("initrd-{payload}"))),
        };

        let initrd = matches!(self.manager.firmware(), Firmware::Uefi).then_some(initrd);

        Ok(ExpectedFiles {
            loader_entry,
            kernel_blob,
            initrd,
        })
    }

    /// Count the expected files present and classify
    pub fn install_state(&self, kernel: &Kernel) -> Result<InstallState, Error> {
        let files = self.expected_files(kernel)?;
        let paths = files.paths();
        let expected = paths.len();
        let present = paths.iter().filter(|path| path.exists()).count();

        Ok(match present {
            0 => InstallState::Uninstalled,
            present if present == expected => InstallState::Installed,
            present => InstallState::Partial { present, expected },
        })
    }
}

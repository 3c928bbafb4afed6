// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! systemd-boot descriptor

use super::Bootloader;
use crate::manager::Manager;

/// BLS style loader on the EFI System Partition
#[derive(Debug, Default)]
pub struct SystemdBoot;

impl Bootloader for SystemdBoot {
    fn name(&self) -> &'static str {
        "systemd-boot"
    }

    fn kernel_destination(&self, manager: &Manager) -> Option<String> {
        Some(format!("efi/{}", manager.namespace()?))
    }
}

// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! extlinux descriptor for legacy firmware

use super::Bootloader;
use crate::manager::Manager;

/// Legacy loader; kernels stay wherever the manager's fallback puts them
#[derive(Debug, Default)]
pub struct Extlinux;

impl Bootloader for Extlinux {
    fn name(&self) -> &'static str {
        "extlinux"
    }

    fn kernel_destination(&self, _manager: &Manager) -> Option<String> {
        None
    }
}

// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Boot management core
//!
//! Reconciles the kernels installed on a root filesystem with the boot
//! entries on the EFI System Partition (or legacy boot directory), and keeps
//! the loader configuration fragments in step.

use std::path::PathBuf;

use snafu::Snafu;

pub mod bootloader;
pub mod esp;
pub mod file_utils;
mod kernel;
pub use kernel::{default_for_type, discover_kernels, map_kernels, Kernel, KernelSource, SystemKernel};
mod manager;
pub use manager::{BlockProbe, HostProbe, Manager};
pub mod os_release;
mod sysconfig;
pub use sysconfig::{SysConfig, SysconfigFile};
pub mod system;

/// Re-export the block probing APIs
pub use blockdev;

/// Kernel sources below the prefix
pub const KERNEL_DIR: &str = "usr/lib/kernel";

/// Module trees below the prefix
pub const MODULES_DIR: &str = "usr/lib/modules";

/// Freestanding initrd fragments
pub const INITRD_DIR: &str = "usr/lib/initrd.d";

/// Single-value loader configuration fragments
pub const KERNEL_CONF_DIR: &str = "etc/kernel";

/// System configuration, home of os-release
pub const SYSCONF_DIR: &str = "etc";

/// Boot partition mountpoint below the prefix
pub const BOOT_DIR: &str = "boot";

/// Boot-success markers
pub const BOOTED_DIR: &str = "var/lib/kernel";

/// Core error type for bootkeep
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid kernel identifier: {input}"))]
    InvalidKernelId { input: String },

    #[snafu(display("no prefix bound to this manager"))]
    NoPrefix,

    #[snafu(display("no running kernel recorded"))]
    NoSystemKernel,

    #[snafu(display("not a directory: {}", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display("missing os-release under {}", prefix.display()))]
    MissingOsRelease { prefix: PathBuf },

    #[snafu(display("{}: {source}", path.display()))]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(context(false), display("generic i/o error: {source}"))]
    Io { source: std::io::Error },
}

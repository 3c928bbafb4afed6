// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Block device probing for boot management
//!
//! Answers one question: which block device backs a mounted root tree, and
//! which identifiers (filesystem UUID, GPT partition GUID, LUKS container
//! UUID) can a boot entry reference it by.

use std::path::PathBuf;

use snafu::Snafu;

pub mod mounts;
mod probe;
pub use probe::Probe;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("vfs root {} is unusable for probing: {source}", path.display()))]
    VfsRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("mount table {} is unreadable: {source}", path.display()))]
    MountTable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot stat rootfs candidate {}: {source}", path.display()))]
    Stat { path: PathBuf, source: nix::Error },

    #[snafu(display("cannot resolve {} to a device node: {source}", path.display()))]
    ResolveDevice {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{} is not backed by a mounted block device", path.display()))]
    NotMounted { path: PathBuf },
}

/// Identity of the block device backing a filesystem
#[derive(Debug, Clone, Default)]
pub struct BlockDevice {
    /// Resolved device node in `/dev`
    pub path: PathBuf,

    /// Filesystem UUID from the superblock
    pub uuid: Option<String>,

    /// GPT partition GUID, when the device is a GPT partition
    pub part_uuid: Option<String>,

    /// UUID of the LUKS container this filesystem lives inside
    pub luks_uuid: Option<String>,
}

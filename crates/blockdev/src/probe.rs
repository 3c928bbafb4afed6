// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Rootfs device identification
//!
//! The probe resolves a mountpoint to its device node, then gathers the
//! identifiers boot entries are written against. Identifier collection is
//! deliberately soft: a device that cannot be scanned contributes nothing
//! rather than failing the probe.

use std::path::{Path, PathBuf};

use fs_err as fs;
use nix::sys::stat;
use snafu::ResultExt as _;
use superblock::Superblock;

use crate::{
    mounts::Table, BlockDevice, Error, MountTableSnafu, ResolveDeviceSnafu, StatSnafu, VfsRootSnafu,
};

/// Probes block devices through the vfs trees
#[derive(Debug)]
pub struct Probe {
    sysfs: PathBuf,
    devfs: PathBuf,
    mounts: Table,
}

impl Probe {
    /// Probe through the standard `/sys`, `/dev` and `/proc`
    pub fn host() -> Result<Self, Error> {
        Self::new("/sys", "/dev", "/proc")
    }

    /// Probe through relocated vfs roots. The mount table is snapshotted
    /// here; a probe does not observe later mount changes.
    pub fn new(
        sysfs: impl Into<PathBuf>,
        devfs: impl Into<PathBuf>,
        procfs: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let sysfs = sysfs.into();
        let devfs = devfs.into();

        let mounts_path = procfs.into().join("self").join("mounts");
        let mounts = Table::new_from_path(&mounts_path).context(MountTableSnafu {
            path: &mounts_path,
        })?;

        Ok(Self {
            sysfs: fs::canonicalize(&sysfs).context(VfsRootSnafu { path: &sysfs })?,
            devfs: fs::canonicalize(&devfs).context(VfsRootSnafu { path: &devfs })?,
            mounts,
        })
    }

    /// Full identity of the device backing `mountpoint`
    pub fn rootfs_device(&self, mountpoint: impl AsRef<Path>) -> Result<BlockDevice, Error> {
        let node = self.resolve_mountpoint(mountpoint.as_ref())?;
        log::debug!("rootfs device node: {}", node.display());

        let uuid = self.read_superblock(&node).and_then(|sb| sb.uuid().ok());
        let part_uuid = self.partition_guid(&node);

        // Any LUKS superblock in the backing stack supplies the crypto UUID
        let luks_uuid = self
            .backing_stack(&node)
            .iter()
            .filter_map(|backing| self.read_superblock(backing))
            .find(|sb| sb.kind().to_string().eq_ignore_ascii_case("luks2"))
            .and_then(|sb| sb.uuid().ok());

        Ok(BlockDevice {
            path: node,
            uuid,
            part_uuid,
            luks_uuid,
        })
    }

    /// Map a mountpoint to its device node. An exact mount table row wins,
    /// since it names the device as it was mounted; for anything else (a
    /// subdirectory of a mount, typically an image prefix) the device
    /// number from stat is chased through `<devfs>/block`.
    fn resolve_mountpoint(&self, mountpoint: &Path) -> Result<PathBuf, Error> {
        let mountpoint = fs::canonicalize(mountpoint).context(ResolveDeviceSnafu {
            path: mountpoint,
        })?;

        if let Some(row) = self
            .mounts
            .iter()
            .find(|m| Path::new(m.decoded_mountpoint().as_ref()) == mountpoint)
        {
            // Pseudo-filesystems name non-path devices here; those fall
            // through to the devno chase
            if let Ok(node) = fs::canonicalize(row.device) {
                return Ok(node);
            }
        }

        let st = stat::lstat(&mountpoint).context(StatSnafu { path: &mountpoint })?;
        let devno_link = self.devfs.join("block").join(format!(
            "{}:{}",
            stat::major(st.st_dev),
            stat::minor(st.st_dev)
        ));
        fs::canonicalize(&devno_link).map_err(|_| Error::NotMounted { path: mountpoint })
    }

    /// Canonical sysfs directory describing a device node,
    /// e.g. `<sysfs>/class/block/nvme0n1p3`
    fn sysfs_block_entry(&self, node: &Path) -> Option<PathBuf> {
        let name = node.file_name()?;
        fs::canonicalize(self.sysfs.join("class").join("block").join(name)).ok()
    }

    /// GPT partition GUID for a node, when sysfs knows its partition index
    /// and the parent disk carries a GPT
    fn partition_guid(&self, node: &Path) -> Option<String> {
        let entry = self.sysfs_block_entry(node)?;
        let index = fs::read_to_string(entry.join("partition"))
            .ok()?
            .trim()
            .parse::<u32>()
            .ok()?;

        // The canonical sysfs entry nests a partition below its disk
        let disk_name = entry.parent()?.file_name()?;
        if disk_name == "block" {
            return None;
        }
        let disk = fs::canonicalize(self.devfs.join(disk_name)).ok()?;

        let table = gpt::GptConfig::new()
            .writable(false)
            .open_from_device(Box::new(std::fs::File::open(disk).ok()?))
            .ok()?;
        let guid = table.partitions().get(&index)?.part_guid;
        Some(guid.hyphenated().to_string())
    }

    /// Device nodes stacked beneath `node` (dm-crypt, lvm, md and friends),
    /// nearest layer first. The node itself is not included.
    fn backing_stack(&self, node: &Path) -> Vec<PathBuf> {
        let mut stack = vec![];
        let mut pending = vec![node.to_path_buf()];
        while let Some(current) = pending.pop() {
            let Some(entry) = self.sysfs_block_entry(&current) else {
                continue;
            };
            let Ok(slaves) = fs::read_dir(entry.join("slaves")) else {
                continue;
            };
            for slave in slaves.flatten() {
                let backing = self.devfs.join(slave.file_name());
                pending.push(backing.clone());
                stack.push(backing);
            }
        }
        stack
    }

    /// Superblock scan; unscannable devices simply contribute no identifiers
    fn read_superblock(&self, node: &Path) -> Option<Superblock> {
        let mut file = fs::File::open(node).ok()?;
        match Superblock::from_reader(&mut file) {
            Ok(sb) => {
                log::trace!("{}: {} superblock", node.display(), sb.kind());
                Some(sb)
            }
            Err(error) => {
                log::trace!("{}: no readable superblock: {error}", node.display());
                None
            }
        }
    }
}

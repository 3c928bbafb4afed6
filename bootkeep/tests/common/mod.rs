// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Playground tree fabrication for integration tests
//!
//! Builds a throwaway root filesystem with a seeded kernel set and hands
//! back a manager bound to it, with system facts and block probing pinned.

#![allow(dead_code)]

use std::{
    fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use bootkeep::{
    blockdev,
    system::{Firmware, System},
    BlockProbe, Manager,
};
use tempfile::TempDir;

pub const NAMESPACE: &str = "com.testdistro";

/// Kernel seeded into the playground
#[derive(Debug, Clone, Copy)]
pub struct PlaygroundKernel {
    pub version: &'static str,
    pub ktype: &'static str,
    pub release: u64,
    pub default_for_type: bool,
}

/// Playground initialisation
#[derive(Debug, Clone, Copy)]
pub struct PlaygroundConfig {
    pub uts_name: Option<&'static str>,
    pub kernels: &'static [PlaygroundKernel],
    pub uefi: bool,
    pub disable_modules: bool,
}

pub const CORE_KERNELS: &[PlaygroundKernel] = &[
    PlaygroundKernel {
        version: "4.2.1",
        ktype: "kvm",
        release: 121,
        default_for_type: false,
    },
    PlaygroundKernel {
        version: "4.2.3",
        ktype: "kvm",
        release: 124,
        default_for_type: true,
    },
    PlaygroundKernel {
        version: "4.2.1",
        ktype: "native",
        release: 137,
        default_for_type: false,
    },
    PlaygroundKernel {
        version: "4.2.3",
        ktype: "native",
        release: 138,
        default_for_type: true,
    },
];

pub const CORE_CONFIG: PlaygroundConfig = PlaygroundConfig {
    uts_name: Some("4.2.1-121.kvm"),
    kernels: CORE_KERNELS,
    uefi: true,
    disable_modules: false,
};

pub const CORE_CONFIG_NO_MODULES: PlaygroundConfig = PlaygroundConfig {
    uts_name: Some("4.2.1-121.kvm"),
    kernels: CORE_KERNELS,
    uefi: true,
    disable_modules: true,
};

/// System capability with pinned answers
#[derive(Debug)]
pub struct TestSystem {
    pub sysfs: PathBuf,
    pub devfs: PathBuf,
    pub firmware: Firmware,
}

impl System for TestSystem {
    fn sysfs_path(&self) -> &Path {
        &self.sysfs
    }

    fn devfs_path(&self) -> &Path {
        &self.devfs
    }

    fn firmware_class(&self) -> Firmware {
        self.firmware
    }

    fn efi_variable(&self, _name: &str) -> Option<String> {
        Some("E90F44B5-BB8A-41AF-B680-B0BF5B0F2A65".to_owned())
    }

    fn set_efi_variable(&self, _name: &str, _value: &str) -> io::Result<()> {
        Ok(())
    }

    fn boot_fstype(&self, _path: &Path) -> Option<String> {
        Some("vfat".to_owned())
    }

    fn sync_filesystem(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Probe that reports a fixed faux root device
#[derive(Debug)]
pub struct TestProbe;

impl BlockProbe for TestProbe {
    fn probe_rootfs(&self, _path: &Path) -> Result<blockdev::BlockDevice, blockdev::Error> {
        Ok(blockdev::BlockDevice {
            path: "/dev/leRootDevice".into(),
            uuid: Some("Test-UUID".to_owned()),
            part_uuid: Some("Test-PartUUID".to_owned()),
            luks_uuid: None,
        })
    }
}

pub struct Playground {
    pub root: TempDir,
    pub manager: Manager,
}

impl Playground {
    pub fn prefix(&self) -> &Path {
        self.root.path()
    }

    pub fn kernel_conf_dir(&self) -> PathBuf {
        self.prefix().join("etc/kernel")
    }

    pub fn kernel_dir(&self) -> PathBuf {
        self.prefix().join("usr/lib/kernel")
    }

    pub fn boot_dir(&self) -> PathBuf {
        self.prefix().join("boot")
    }
}

pub fn blob_name(kernel: &PlaygroundKernel) -> String {
    format!(
        "{NAMESPACE}.{}.{}-{}",
        kernel.ktype, kernel.version, kernel.release
    )
}

/// Seed a kernel payload set into the tree, as a distro update would
pub fn push_kernel(root: &Path, config: &PlaygroundConfig, kernel: &PlaygroundKernel) {
    let kernel_dir = root.join("usr/lib/kernel");
    fs::create_dir_all(&kernel_dir).unwrap();

    fs::write(kernel_dir.join(blob_name(kernel)), kernel.version).unwrap();
    fs::write(
        kernel_dir.join(format!("initrd-{}", blob_name(kernel))),
        kernel.version,
    )
    .unwrap();
    fs::write(
        kernel_dir.join(format!(
            "cmdline-{}-{}.{}",
            kernel.version, kernel.release, kernel.ktype
        )),
        "console=ttyS0 quiet\n",
    )
    .unwrap();
    fs::write(
        kernel_dir.join(format!(
            "config-{}-{}.{}",
            kernel.version, kernel.release, kernel.ktype
        )),
        kernel.version,
    )
    .unwrap();

    if !config.disable_modules {
        let module_dir = root
            .join("usr/lib/modules")
            .join(format!("{}-{}", kernel.version, kernel.release));
        for sub in ["kernel", "drivers", "fs"] {
            fs::create_dir_all(module_dir.join(sub)).unwrap();
        }
        fs::write(module_dir.join("kernel/dummy.ko"), kernel.version).unwrap();
    }
}

/// Point `default-<type>` at the given kernel, replacing any previous link
pub fn set_kernel_default(root: &Path, kernel: &PlaygroundKernel) {
    let link = root
        .join("usr/lib/kernel")
        .join(format!("default-{}", kernel.ktype));
    let _ = fs::remove_file(&link);
    symlink(blob_name(kernel), &link).unwrap();
}

/// Fabricate a root tree and a manager bound to it
pub fn prepare_playground(config: &PlaygroundConfig) -> Playground {
    let root = TempDir::new().unwrap();
    let prefix = root.path();

    fs::create_dir_all(prefix.join("etc")).unwrap();
    fs::write(
        prefix.join("etc/os-release"),
        "NAME=\"Test Linux\"\nID=testlinux\nPRETTY_NAME=\"bootkeep testing\"\n",
    )
    .unwrap();
    fs::create_dir_all(prefix.join("etc/kernel")).unwrap();
    fs::create_dir_all(prefix.join("var/lib/kernel")).unwrap();
    fs::create_dir_all(prefix.join("usr/lib/kernel")).unwrap();
    fs::create_dir_all(prefix.join("usr/lib/initrd.d")).unwrap();
    fs::create_dir_all(prefix.join("boot")).unwrap();

    for kernel in config.kernels {
        push_kernel(prefix, config, kernel);
        if kernel.default_for_type {
            set_kernel_default(prefix, kernel);
        }
    }

    let firmware = if config.uefi {
        Firmware::Uefi
    } else {
        Firmware::Legacy
    };

    let mut manager = Manager::new();
    manager.set_system(Box::new(TestSystem {
        sysfs: prefix.join("sys"),
        devfs: prefix.join("dev"),
        firmware,
    }));
    manager.set_block_probe(Box::new(TestProbe));
    manager.set_namespace(NAMESPACE);
    manager.set_sync_filesystems(false);
    manager.set_image_mode(false);
    manager.set_prefix(prefix).expect("playground prefix must bind");
    manager.set_boot_dir(prefix.join("boot"));

    if let Some(uts_name) = config.uts_name {
        manager.set_uname(uts_name).expect("playground uname must parse");
    }

    Playground { root, manager }
}

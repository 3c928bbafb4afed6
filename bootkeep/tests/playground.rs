// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Kernel discovery and configuration scenarios over a fabricated root

mod common;

use std::fs;

use common::{
    prepare_playground, Playground, PlaygroundConfig, PlaygroundKernel, CORE_CONFIG,
    CORE_CONFIG_NO_MODULES, CORE_KERNELS,
};

#[test]
fn lists_kernels_with_modules() {
    let playground = prepare_playground(&CORE_CONFIG);
    let mut kernels = playground.manager.kernels().unwrap();
    assert_eq!(kernels.len(), 4);

    kernels.sort_by_key(|kernel| kernel.meta.release);
    let releases: Vec<u64> = kernels.iter().map(|kernel| kernel.meta.release).collect();
    assert_eq!(releases, [121, 124, 137, 138]);

    kernels.sort_by_key(|kernel| std::cmp::Reverse(kernel.meta.release));
    let releases: Vec<u64> = kernels.iter().map(|kernel| kernel.meta.release).collect();
    assert_eq!(releases, [138, 137, 124, 121]);

    for kernel in &kernels {
        assert!(
            kernel.source.module_dir.is_some(),
            "{} has no module directory when it should",
            kernel.meta
        );
        assert!(kernel.source.blob.exists());
        assert!(kernel.source.initrd.is_some());
        assert!(kernel.source.cmdline.is_some());
        assert!(kernel.source.config.is_some());
    }
}

#[test]
fn lists_kernels_without_modules() {
    let playground = prepare_playground(&CORE_CONFIG_NO_MODULES);
    let kernels = playground.manager.kernels().unwrap();
    assert_eq!(kernels.len(), 4);

    for kernel in &kernels {
        assert!(
            kernel.source.module_dir.is_none(),
            "{} has a module directory when it shouldn't",
            kernel.meta
        );
    }
}

#[test]
fn missing_siblings_do_not_suppress_records() {
    let playground = prepare_playground(&CORE_CONFIG);
    let kernel = &CORE_KERNELS[0];
    fs::remove_file(
        playground
            .kernel_dir()
            .join(format!("initrd-{}", common::blob_name(kernel))),
    )
    .unwrap();

    let kernels = playground.manager.kernels().unwrap();
    assert_eq!(kernels.len(), 4);
    let record = kernels
        .iter()
        .find(|k| k.meta.release == kernel.release)
        .unwrap();
    assert!(record.source.initrd.is_none());
    assert!(record.source.blob.exists());
}

#[test]
fn maps_kernels_and_resolves_defaults() {
    let playground = prepare_playground(&CORE_CONFIG);
    let kernels = playground.manager.kernels().unwrap();

    let map = playground.manager.map_kernels(&kernels);
    assert_eq!(map.len(), 2);
    assert_eq!(map["kvm"].len(), 2);
    assert_eq!(map["native"].len(), 2);

    let default = playground
        .manager
        .default_for_type(&kernels, "kvm")
        .expect("kvm default must resolve");
    assert_eq!(default.meta.release, 124);
    assert_eq!(default.meta.version, "4.2.3");
    assert_eq!(default.meta.ktype, "kvm");

    let default = playground
        .manager
        .default_for_type(&kernels, "native")
        .expect("native default must resolve");
    assert_eq!(default.meta.release, 138);
    assert_eq!(default.meta.version, "4.2.3");
    assert_eq!(default.meta.ktype, "native");

    assert!(playground.manager.default_for_type(&kernels, "lts").is_none());
}

#[test]
fn at_most_one_default_per_type() {
    let playground = prepare_playground(&CORE_CONFIG);
    let kernels = playground.manager.kernels().unwrap();
    for (ktype, of_type) in playground.manager.map_kernels(&kernels) {
        let defaults = of_type.iter().filter(|k| k.default_for_type).count();
        assert!(defaults <= 1, "{ktype} has {defaults} pinned defaults");
    }
}

#[test]
fn default_falls_back_to_newest_release() {
    const UNPINNED: &[PlaygroundKernel] = &[
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
            default_for_type: false,
        },
    ];
    let config = PlaygroundConfig {
        uts_name: None,
        kernels: UNPINNED,
        uefi: true,
        disable_modules: true,
    };

    let playground = prepare_playground(&config);
    let kernels = playground.manager.kernels().unwrap();
    assert!(kernels.iter().all(|k| !k.default_for_type));

    let default = playground
        .manager
        .default_for_type(&kernels, "kvm")
        .expect("fallback default must resolve");
    assert_eq!(default.meta.release, 124);
}

#[test]
fn timeout_round_trip() {
    let playground = prepare_playground(&CORE_CONFIG);
    let manager = &playground.manager;

    // Fragment seeded behind the manager's back
    fs::write(playground.kernel_conf_dir().join("timeout"), "5\n").unwrap();
    assert_eq!(manager.timeout().unwrap(), Some(5));

    manager.set_timeout(7).unwrap();
    assert_eq!(manager.timeout().unwrap(), Some(7));

    // Idempotent rewrite
    manager.set_timeout(7).unwrap();
    let stored = fs::read_to_string(playground.kernel_conf_dir().join("timeout")).unwrap();
    assert_eq!(stored, "7\n");

    manager.set_timeout(0).unwrap();
    assert!(!playground.kernel_conf_dir().join("timeout").exists());
    assert_eq!(manager.timeout().unwrap(), None);

    // Disabling twice still succeeds
    manager.set_timeout(0).unwrap();
    assert_eq!(manager.timeout().unwrap(), None);
}

#[test]
fn console_mode_round_trip() {
    let playground = prepare_playground(&CORE_CONFIG);
    let manager = &playground.manager;

    fs::write(playground.kernel_conf_dir().join("console_mode"), "max\n").unwrap();
    assert_eq!(manager.console_mode().unwrap().as_deref(), Some("max"));

    manager.set_console_mode(Some("auto")).unwrap();
    assert_eq!(manager.console_mode().unwrap().as_deref(), Some("auto"));

    manager.set_console_mode(None).unwrap();
    assert!(!playground.kernel_conf_dir().join("console_mode").exists());
    assert_eq!(manager.console_mode().unwrap(), None);

    manager.set_console_mode(None).unwrap();
    assert_eq!(manager.console_mode().unwrap(), None);
}

#[test]
fn rebinding_rescans_freestanding_initrds() {
    let Playground { root, mut manager } = prepare_playground(&CORE_CONFIG);
    assert!(manager.freestanding_initrds().is_empty());

    fs::write(root.path().join("usr/lib/initrd.d/ucode.img"), "ucode").unwrap();
    manager.set_prefix(root.path()).unwrap();

    assert!(manager
        .freestanding_initrds()
        .contains_key("freestanding-ucode.img"));
}

#[test]
fn vendor_prefix_comes_from_os_release() {
    let playground = prepare_playground(&CORE_CONFIG);
    assert_eq!(
        playground.manager.vendor_prefix(),
        Some("bootkeep-testing")
    );
    assert_eq!(playground.manager.namespace(), Some(common::NAMESPACE));
}

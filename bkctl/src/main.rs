// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! CLI for keeping kernels, initrds and loader entries on the boot
//! partition in step with the root filesystem.

use std::{fs, path::PathBuf};

use bootkeep::{esp::InstallState, Manager};
use clap::{Parser, Subcommand};
use color_eyre::{
    eyre::{bail, eyre},
    Section,
};
use pretty_env_logger::formatted_builder;

/// Kernel and boot loader entry management for the boot partition
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Override base path for all boot management operations
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    /// Force running in image mode (scripting integration)
    #[arg(short, long, global = true)]
    image: bool,

    /// Do not allow updating EFI vars
    #[arg(short, long, global = true)]
    no_efi_update: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print version and exit
    Version,

    /// Report currently running kernel as successfully booting
    ReportBooted,

    /// Configure the boot partition for next boot
    Update,

    /// Set the bootloader timeout value; 0 removes it
    SetTimeout { timeout: u32 },

    /// Retrieve the bootloader timeout value
    GetTimeout,

    /// Set the bootloader console mode; "" removes it
    SetConsoleMode { mode: String },

    /// Retrieve the bootloader console mode
    GetConsoleMode,

    /// List kernels installed on the root filesystem
    ListKernels,

    /// Status information (debugging)
    Status,
}

/// Values accepted for console-mode, see `loader.conf(5)`
const CONSOLE_MODES: &[&str] = &["", "0", "1", "2", "auto", "max", "keep"];

/// Bail-out permission check for operations that touch block devices
fn check_permissions() -> color_eyre::Result<()> {
    let euid = unsafe { nix::libc::geteuid() };
    match euid {
        0 => Ok(()),
        _ => Err(eyre!("bkctl must be run with root privileges to work correctly")).note(
            "This tool must be able to scan block devices and write to the boot partition",
        ),
    }
}

fn bound_manager(cli: &Cli) -> color_eyre::Result<Manager> {
    let mut manager = Manager::new();
    manager.set_image_mode(cli.image);
    manager.set_update_efi_vars(!cli.no_efi_update);

    let path = cli.path.clone().unwrap_or_else(|| "/".into());
    if path == PathBuf::from("/") && !cli.image {
        // Native operation: feed the running kernel in
        if let Ok(release) = fs::read_to_string("/proc/sys/kernel/osrelease") {
            let _ = manager.set_uname(release.trim());
        }
    }

    manager.set_prefix(&path)?;
    Ok(manager)
}

fn status(manager: &Manager) -> color_eyre::Result<()> {
    println!("Firmware: {:?}", manager.firmware());
    if let Some(device) = manager.root_device() {
        println!("Root device: {}", device.path.display());
        if let Some(uuid) = &device.uuid {
            println!("  UUID: {uuid}");
        }
        if let Some(part_uuid) = &device.part_uuid {
            println!("  PartUUID: {part_uuid}");
        }
        if let Some(luks_uuid) = &device.luks_uuid {
            println!("  LUKS UUID: {luks_uuid}");
        }
    }
    if let Some(esp) = manager.esp_device() {
        println!("ESP: {}", esp.display());
    }

    let kernels = manager.kernels()?;
    for kernel in &kernels {
        let state = match manager.install_state(kernel)? {
            InstallState::Installed => "installed",
            InstallState::Uninstalled => "not installed",
            InstallState::Partial { .. } => "PARTIAL (corrupt)",
        };
        let booted = if manager.has_booted(kernel) {
            ", booted ok"
        } else {
            ""
        };
        println!("{}: {state}{booted}", kernel.meta);
    }
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::config::HookBuilder::default()
        .issue_url("https://github.com/bootkeep/bootkeep/issues/new")
        .add_issue_metadata("version", env!("CARGO_PKG_VERSION"))
        .issue_filter(|_| true)
        .install()?;

    formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            println!("bkctl {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::SetTimeout { timeout } => {
            let manager = bound_manager(&cli)?;
            manager.set_timeout(*timeout)?;
            if *timeout == 0 {
                println!("Timeout has been removed");
            } else {
                println!("New timeout is: {timeout}");
            }
        }
        Commands::GetTimeout => {
            let manager = bound_manager(&cli)?;
            match manager.timeout()? {
                Some(timeout) => println!("Timeout: {timeout}"),
                None => println!("No timeout is currently configured"),
            }
        }
        Commands::SetConsoleMode { mode } => {
            if !CONSOLE_MODES.contains(&mode.as_str()) {
                bail!("please provide a valid value, see `man loader.conf`, or \"\" to disable");
            }
            let manager = bound_manager(&cli)?;
            let mode = (!mode.is_empty()).then_some(mode.as_str());
            manager.set_console_mode(mode)?;
            match mode {
                Some(mode) => println!("New console mode is: {mode}"),
                None => println!("Console mode has been removed"),
            }
        }
        Commands::GetConsoleMode => {
            let manager = bound_manager(&cli)?;
            match manager.console_mode()? {
                Some(mode) => println!("Console mode: {mode}"),
                None => println!("No console mode is currently configured"),
            }
        }
        Commands::ListKernels => {
            let manager = bound_manager(&cli)?;
            let kernels = manager.kernels()?;
            let mut types: Vec<&str> = manager.map_kernels(&kernels).into_keys().collect();
            types.sort();
            for ktype in types {
                let default = manager.default_for_type(&kernels, ktype);
                let mut of_type: Vec<_> = kernels
                    .iter()
                    .filter(|kernel| kernel.meta.ktype == ktype)
                    .collect();
                of_type.sort_by_key(|kernel| std::cmp::Reverse(kernel.meta.release));
                for kernel in of_type {
                    let marker = if default.is_some_and(|d| d.meta == kernel.meta) {
                        '*'
                    } else {
                        ' '
                    };
                    println!("{marker} {}", kernel.meta);
                }
            }
        }
        Commands::ReportBooted => {
            let manager = bound_manager(&cli)?;
            manager.report_booted()?;
            println!("Recorded successful boot");
        }
        Commands::Update => {
            check_permissions()?;
            let manager = bound_manager(&cli)?;
            manager.update()?;
        }
        Commands::Status => {
            check_permissions()?;
            let manager = bound_manager(&cli)?;
            status(&manager)?;
        }
    }

    Ok(())
}

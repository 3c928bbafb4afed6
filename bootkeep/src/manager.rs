// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Boot manager façade
//!
//! A [`Manager`] starts unbound; `set_prefix` validates a root tree and
//! binds it, after which kernel and configuration operations are available.
//! A failed bind leaves the previous state untouched, and rebinding is
//! allowed. All I/O is blocking and the handle is single-owner.

use std::{
    collections::HashMap,
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{
    bootloader::{Bootloader, Extlinux, SystemdBoot},
    esp::{InstallState, Inspector},
    file_utils::{changed_files, cmdline_snippet, copy_atomic_vfat, files_match, PathExt},
    kernel::{self, Kernel, SystemKernel},
    os_release::OsRelease,
    sysconfig::SysConfig,
    system::{Firmware, HostSystem, System},
    Error, BOOTED_DIR, BOOT_DIR, INITRD_DIR, SYSCONF_DIR,
};

/// Root device probing capability
pub trait BlockProbe: fmt::Debug {
    /// Identify the device backing the filesystem mounted at `path`
    fn probe_rootfs(&self, path: &Path) -> Result<blockdev::BlockDevice, blockdev::Error>;
}

/// Probe against the real host block layer
#[derive(Debug, Default)]
pub struct HostProbe;

impl BlockProbe for HostProbe {
    fn probe_rootfs(&self, path: &Path) -> Result<blockdev::BlockDevice, blockdev::Error> {
        blockdev::Probe::host()?.rootfs_device(path)
    }
}

/// Boot management façade
#[derive(Debug)]
pub struct Manager {
    sysconfig: Option<SysConfig>,
    os_release: Option<OsRelease>,
    vendor_prefix: Option<String>,
    namespace: Option<String>,
    namespace_override: Option<String>,
    system_kernel: Option<SystemKernel>,
    boot_dir: Option<PathBuf>,
    bootloader: Option<Box<dyn Bootloader>>,
    freestanding_initrds: HashMap<String, PathBuf>,

    image_mode: bool,
    can_mount: bool,
    update_efi_vars: bool,
    sync_filesystems: bool,

    probe: Box<dyn BlockProbe>,
    system: Box<dyn System>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// An unbound manager over the host capabilities
    pub fn new() -> Self {
        Self {
            sysconfig: None,
            os_release: None,
            vendor_prefix: None,
            namespace: None,
            namespace_override: None,
            system_kernel: None,
            boot_dir: None,
            bootloader: None,
            freestanding_initrds: HashMap::new(),
            image_mode: false,
            can_mount: false,
            update_efi_vars: false,
            sync_filesystems: true,
            probe: Box::new(HostProbe),
            system: Box::<HostSystem>::default(),
        }
    }

    /// Swap the block probing backend
    pub fn set_block_probe(&mut self, probe: Box<dyn BlockProbe>) {
        self.probe = probe;
    }

    /// Swap the system facts backend
    pub fn set_system(&mut self, system: Box<dyn System>) {
        self.system = system;
    }

    /// Bind a root tree. Failure leaves the previous binding untouched.
    pub fn set_prefix(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let mut sysconfig = SysConfig::new(path)?;

        match self.probe.probe_rootfs(path) {
            Ok(device) => {
                log::debug!("root device: {}", device.path.display());
                sysconfig.root_device = Some(device);
            }
            Err(error) => {
                log::warn!("unable to probe root device for {}: {error}", path.display());
            }
        }

        let os_release = read_os_release(path)?;
        let vendor_prefix = os_release.vendor_prefix();
        let namespace = if os_release.id.is_empty() {
            "linux".to_owned()
        } else {
            os_release.id.clone()
        };

        let bootloader: Box<dyn Bootloader> = match self.system.firmware_class() {
            Firmware::Uefi => Box::new(SystemdBoot),
            Firmware::Legacy => Box::new(Extlinux),
        };
        log::debug!("selected bootloader: {}", bootloader.name());

        let freestanding_initrds = scan_freestanding_initrds(path);

        self.sysconfig = Some(sysconfig);
        self.os_release = Some(os_release);
        self.vendor_prefix = Some(vendor_prefix);
        self.namespace = Some(namespace);
        self.bootloader = Some(bootloader);
        self.freestanding_initrds = freestanding_initrds;
        Ok(())
    }

    fn bound(&self) -> Result<&SysConfig, Error> {
        self.sysconfig.as_ref().ok_or(Error::NoPrefix)
    }

    /// Active prefix, when bound
    pub fn prefix(&self) -> Option<&Path> {
        self.sysconfig.as_ref().map(|sc| sc.prefix.as_path())
    }

    pub fn os_release(&self) -> Option<&OsRelease> {
        self.os_release.as_ref()
    }

    /// Vendor identifier prefixed to loader entry names
    pub fn vendor_prefix(&self) -> Option<&str> {
        self.vendor_prefix.as_deref()
    }

    /// Namespace prefixed to kernel payload names
    pub fn namespace(&self) -> Option<&str> {
        self.namespace_override
            .as_deref()
            .or(self.namespace.as_deref())
    }

    /// Override the payload namespace, sticky across rebinds
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace_override = Some(namespace.into());
    }

    /// Parse and store the running kernel identity.
    /// A refused identifier clears the stored kernel.
    pub fn set_uname(&mut self, uname: &str) -> Result<(), Error> {
        match uname.parse::<SystemKernel>() {
            Ok(kernel) => {
                self.system_kernel = Some(kernel);
                Ok(())
            }
            Err(error) => {
                self.system_kernel = None;
                Err(error)
            }
        }
    }

    pub fn system_kernel(&self) -> Option<&SystemKernel> {
        self.system_kernel.as_ref()
    }

    pub fn set_image_mode(&mut self, image_mode: bool) {
        self.image_mode = image_mode;
    }

    pub fn image_mode(&self) -> bool {
        self.image_mode
    }

    pub fn set_can_mount(&mut self, can_mount: bool) {
        self.can_mount = can_mount;
    }

    pub fn can_mount(&self) -> bool {
        self.can_mount
    }

    pub fn set_update_efi_vars(&mut self, update_efi_vars: bool) {
        self.update_efi_vars = update_efi_vars;
    }

    pub fn update_efi_vars(&self) -> bool {
        self.update_efi_vars
    }

    /// Whether boot partition writes are chased with a filesystem sync
    pub fn set_sync_filesystems(&mut self, sync_filesystems: bool) {
        self.sync_filesystems = sync_filesystems;
    }

    /// Override the boot partition directory (defaults to `<prefix>/boot`)
    pub fn set_boot_dir(&mut self, boot_dir: impl Into<PathBuf>) {
        self.boot_dir = Some(boot_dir.into());
    }

    pub fn boot_dir(&self) -> Result<PathBuf, Error> {
        if let Some(boot_dir) = &self.boot_dir {
            return Ok(boot_dir.clone());
        }
        Ok(self.bound()?.prefix.join(BOOT_DIR))
    }

    pub fn firmware(&self) -> Firmware {
        self.system.firmware_class()
    }

    pub fn system(&self) -> &dyn System {
        self.system.as_ref()
    }

    pub fn root_device(&self) -> Option<&blockdev::BlockDevice> {
        self.sysconfig.as_ref().and_then(|sc| sc.root_device.as_ref())
    }

    /// Freestanding initrds discovered at bind time, keyed by their
    /// boot partition name
    pub fn freestanding_initrds(&self) -> &HashMap<String, PathBuf> {
        &self.freestanding_initrds
    }

    /// Boot partition subpath kernel payloads install into
    pub fn kernel_destination(&self) -> Result<String, Error> {
        let namespace = self.namespace().ok_or(Error::NoPrefix)?;
        Ok(self
            .bootloader
            .as_ref()
            .and_then(|loader| loader.kernel_destination(self))
            .unwrap_or_else(|| format!("efi/{namespace}")))
    }

    /// Device node of the ESP as advertised by the running loader
    pub fn esp_device(&self) -> Option<PathBuf> {
        let uuid = crate::system::loader_device_part_uuid(self.system.as_ref())?;
        let path = self
            .system
            .devfs_path()
            .join("disk")
            .join("by-partuuid")
            .join(uuid.hyphenated().to_string());
        path.exists().then_some(path)
    }

    /// Discover installed kernels under the bound prefix
    pub fn kernels(&self) -> Result<Vec<Kernel>, Error> {
        let sysconfig = self.bound()?;
        let namespace = self.namespace().ok_or(Error::NoPrefix)?;
        kernel::discover_kernels(&sysconfig.prefix, namespace)
    }

    /// Partition a collection by kernel type
    pub fn map_kernels<'a>(&self, kernels: &'a [Kernel]) -> HashMap<&'a str, Vec<&'a Kernel>> {
        kernel::map_kernels(kernels)
    }

    /// Default kernel for a type: pinned default, else newest release
    pub fn default_for_type<'a>(&self, kernels: &'a [Kernel], ktype: &str) -> Option<&'a Kernel> {
        kernel::default_for_type(kernels, ktype)
    }

    pub fn timeout(&self) -> Result<Option<u32>, Error> {
        self.bound()?.timeout()
    }

    pub fn set_timeout(&self, timeout: u32) -> Result<(), Error> {
        self.bound()?.set_timeout(timeout)
    }

    pub fn console_mode(&self) -> Result<Option<String>, Error> {
        self.bound()?.console_mode()
    }

    pub fn set_console_mode(&self, mode: Option<&str>) -> Result<(), Error> {
        self.bound()?.set_console_mode(mode)
    }

    /// Classify a kernel's presence on the boot partition
    pub fn install_state(&self, kernel: &Kernel) -> Result<InstallState, Error> {
        Inspector::new(self).install_state(kernel)
    }

    /// Copy a kernel's payloads to the boot partition and write its entry.
    /// Partial progress is logged; on error the caller retries or cleans up.
    pub fn install_kernel(&self, kernel: &Kernel) -> Result<(), Error> {
        let files = Inspector::new(self).expected_files(kernel)?;

        let mut changeset = vec![(kernel.source.blob.clone(), files.kernel_blob.clone())];
        if let (Some(source), Some(dest)) = (kernel.source.initrd.clone(), files.initrd.clone()) {
            changeset.push((source, dest));
        }

        for (source, dest) in changed_files(&changeset) {
            log::debug!("installing {} -> {}", source.display(), dest.display());
            copy_atomic_vfat(&source, &dest, self.sync_filesystems).map_err(|io_error| {
                log::error!("failed to install {}: {io_error}", dest.display());
                Error::Path {
                    path: dest.clone(),
                    source: io_error,
                }
            })?;
        }

        let contents = self.loader_entry_contents(kernel)?;
        if let Some(parent) = files.loader_entry.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Path {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&files.loader_entry, contents).map_err(|source| {
            log::error!("failed to write {}: {source}", files.loader_entry.display());
            Error::Path {
                path: files.loader_entry.clone(),
                source,
            }
        })?;

        if kernel.default_for_type
            && self.update_efi_vars
            && matches!(self.firmware(), Firmware::Uefi)
        {
            if let Some(entry) = files.loader_entry.file_name().and_then(|name| name.to_str()) {
                if let Err(error) = self.system.set_efi_variable("LoaderEntryDefault", entry) {
                    log::warn!("unable to update LoaderEntryDefault: {error}");
                }
            }
        }

        Ok(())
    }

    /// Remove a kernel's payloads and entry from the boot partition
    pub fn uninstall_kernel(&self, kernel: &Kernel) -> Result<(), Error> {
        let files = Inspector::new(self).expected_files(kernel)?;
        for path in files.paths() {
            match fs::remove_file(path) {
                Ok(()) => log::debug!("removed {}", path.display()),
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    log::error!("unable to remove {}: {source}", path.display());
                    return Err(Error::Path {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether the on-ESP copies are missing or stale
    pub fn needs_update(&self, kernel: &Kernel) -> Result<bool, Error> {
        let files = Inspector::new(self).expected_files(kernel)?;
        if !files_match(&kernel.source.blob, &files.kernel_blob) {
            return Ok(true);
        }
        Ok(match (&kernel.source.initrd, &files.initrd) {
            (Some(source), Some(dest)) => !files_match(source, dest),
            _ => false,
        })
    }

    /// Copy freestanding initrds into the kernel destination
    pub fn install_freestanding_initrds(&self) -> Result<(), Error> {
        if self.freestanding_initrds.is_empty() {
            return Ok(());
        }
        let mut dest = self.boot_dir()?;
        for part in self.kernel_destination()?.split('/') {
            dest = dest.join_insensitive(part);
        }
        let changeset: Vec<_> = self
            .freestanding_initrds
            .iter()
            .map(|(name, path)| (path.clone(), dest.join(name)))
            .collect();
        for (source, dest) in changed_files(&changeset) {
            copy_atomic_vfat(&source, &dest, self.sync_filesystems).map_err(|io_error| {
                log::error!("failed to install {}: {io_error}", dest.display());
                Error::Path {
                    path: dest.clone(),
                    source: io_error,
                }
            })?;
        }
        Ok(())
    }

    /// Write `loader/loader.conf`: default entry, timeout, console mode
    pub fn write_loader_config(&self, kernels: &[Kernel]) -> Result<(), Error> {
        let boot = self.boot_dir()?;
        let vendor = self.vendor_prefix().ok_or(Error::NoPrefix)?;

        // Default the type of the running kernel, else the first type
        let ktype = self
            .system_kernel
            .as_ref()
            .map(|kernel| kernel.ktype.clone())
            .or_else(|| {
                let mut types: Vec<&str> =
                    kernels.iter().map(|kernel| kernel.meta.ktype.as_str()).collect();
                types.sort();
                types.first().map(|ktype| ktype.to_string())
            });

        let mut contents = String::new();
        if let Some(default) = ktype
            .as_deref()
            .and_then(|ktype| kernel::default_for_type(kernels, ktype))
        {
            let meta = &default.meta;
            contents.push_str(&format!(
                "default {vendor}-{}-{}-{}\n",
                meta.ktype, meta.version, meta.release
            ));
        }
        if let Some(timeout) = self.timeout()? {
            contents.push_str(&format!("timeout {timeout}\n"));
        }
        if let Some(mode) = self.console_mode()? {
            contents.push_str(&format!("console-mode {mode}\n"));
        }

        let loader_dir = boot.join_insensitive("loader");
        fs::create_dir_all(&loader_dir).map_err(|source| Error::Path {
            path: loader_dir.clone(),
            source,
        })?;
        let conf = loader_dir.join("loader.conf");
        fs::write(&conf, contents).map_err(|source| {
            log::error!("failed to write {}: {source}", conf.display());
            Error::Path { path: conf, source }
        })
    }

    /// Reconcile the boot partition with the installed kernel set
    pub fn update(&self) -> Result<(), Error> {
        let boot = self.boot_dir()?;
        if let Some(fstype) = self.system.boot_fstype(&boot) {
            log::debug!("boot partition filesystem: {fstype}");
        }

        let kernels = self.kernels()?;
        for kernel in &kernels {
            self.install_kernel(kernel)?;
        }
        self.install_freestanding_initrds()?;
        self.write_loader_config(&kernels)?;

        if self.sync_filesystems {
            if let Err(error) = self.system.sync_filesystem(&boot) {
                log::warn!("unable to sync {}: {error}", boot.display());
            }
        }
        Ok(())
    }

    fn booted_marker(&self, meta: &SystemKernel) -> Result<PathBuf, Error> {
        Ok(self.bound()?.prefix.join(BOOTED_DIR).join(format!(
            "k_booted_{}-{}.{}",
            meta.version, meta.release, meta.ktype
        )))
    }

    /// Record that the running kernel reached userspace successfully
    pub fn report_booted(&self) -> Result<(), Error> {
        let meta = self.system_kernel.as_ref().ok_or(Error::NoSystemKernel)?;
        let marker = self.booted_marker(meta)?;
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Path {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&marker, "bootkeep marker\n").map_err(|source| {
            log::error!("unable to write {}: {source}", marker.display());
            Error::Path {
                path: marker,
                source,
            }
        })
    }

    /// Forget the boot-success marker for a kernel
    pub fn unreport_booted(&self, meta: &SystemKernel) -> Result<(), Error> {
        let marker = self.booted_marker(meta)?;
        match fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Path {
                path: marker,
                source,
            }),
        }
    }

    /// Whether a kernel has ever reported a successful boot
    pub fn has_booted(&self, kernel: &Kernel) -> bool {
        self.booted_marker(&kernel.meta)
            .map(|marker| marker.exists())
            .unwrap_or(false)
    }

    /// Render the loader entry for a kernel
    fn loader_entry_contents(&self, kernel: &Kernel) -> Result<String, Error> {
        let os_release = self.os_release.as_ref().ok_or(Error::NoPrefix)?;
        let namespace = self.namespace().ok_or(Error::NoPrefix)?;
        let meta = &kernel.meta;

        let title = match os_release.pretty_name.as_deref() {
            Some(pretty) => format!("{pretty} ({meta})"),
            None => format!("{} ({meta})", os_release.name),
        };

        let destination = self.kernel_destination()?;
        let payload = format!("{namespace}.{}.{}-{}", meta.ktype, meta.version, meta.release);

        let initrd = if matches!(self.firmware(), Firmware::Uefi) && kernel.source.initrd.is_some()
        {
            format!("\ninitrd /{destination}/initrd-{payload}")
        } else {
            String::new()
        };

        let mut options = vec![];
        if let Some(device) = self.root_device() {
            if let Some(part_uuid) = &device.part_uuid {
                options.push(format!("root=PARTUUID={part_uuid}"));
            } else if let Some(uuid) = &device.uuid {
                options.push(format!("root=UUID={uuid}"));
            }
        }
        if let Some(cmdline) = &kernel.source.cmdline {
            match cmdline_snippet(cmdline) {
                Ok(snippet) if !snippet.is_empty() => options.push(snippet),
                Ok(_) => {}
                Err(error) => log::warn!("unreadable cmdline {}: {error}", cmdline.display()),
            }
        }

        Ok(format!(
            "title {title}\nlinux /{destination}/kernel-{payload}{initrd}\noptions {}\n",
            options.join(" ")
        ))
    }
}

fn read_os_release(prefix: &Path) -> Result<OsRelease, Error> {
    let candidates = [
        prefix.join("run").join("os-release"),
        prefix.join(SYSCONF_DIR).join("os-release"),
        prefix.join("usr").join("lib").join("os-release"),
    ];
    for candidate in candidates {
        match fs::read_to_string(&candidate) {
            Ok(text) => {
                log::trace!("reading os-release from {}", candidate.display());
                return OsRelease::from_str(&text);
            }
            Err(source) if source.kind() == ErrorKind::NotFound => continue,
            Err(source) => {
                log::error!("unable to read {}: {source}", candidate.display());
                return Err(Error::Path {
                    path: candidate,
                    source,
                });
            }
        }
    }
    Err(Error::MissingOsRelease {
        prefix: prefix.to_path_buf(),
    })
}

/// Freestanding initrds ship under `usr/lib/initrd.d`, keyed by the name
/// they take on the boot partition
fn scan_freestanding_initrds(prefix: &Path) -> HashMap<String, PathBuf> {
    let dir = prefix.join(INITRD_DIR);
    let mut initrds = HashMap::new();
    let Ok(entries) = fs::read_dir(&dir) else {
        return initrds;
    };
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            initrds.insert(format!("freestanding-{name}"), entry.path());
        }
    }
    initrds
}

#[cfg(test)]
mod tests {
    use super::Manager;

    #[test]
    fn uname_tracking() {
        let mut manager = Manager::new();
        assert!(manager.set_uname("4.4.0-120.lts").is_ok());
        assert!(manager.set_uname("0.1.").is_err());
        assert!(
            manager.system_kernel().is_none(),
            "refused uname must clear the stored kernel"
        );

        assert!(manager.set_uname("4.6.0-192.native").is_ok());
        let kernel = manager.system_kernel().expect("valid uname was stored");
        assert_eq!(kernel.version, "4.6.0");
        assert_eq!(kernel.ktype, "native");
        assert_eq!(kernel.release, 192);
    }

    #[test]
    fn unbound_operations_refuse() {
        let manager = Manager::new();
        assert!(manager.kernels().is_err());
        assert!(manager.timeout().is_err());
        assert!(manager.set_timeout(5).is_err());
        assert!(manager.console_mode().is_err());
        assert!(manager.set_console_mode(Some("auto")).is_err());
        assert!(manager.boot_dir().is_err());
    }

    #[test]
    fn set_prefix_requires_directory() {
        let mut manager = Manager::new();
        assert!(manager
            .set_prefix("/ro347u59jaowlq-definitely-not-here")
            .is_err());
        assert!(manager.prefix().is_none());
    }
}

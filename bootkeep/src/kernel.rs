// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Kernel identity and discovery
//!
//! Installed kernels are named `<namespace>.<type>.<version>-<release>` on
//! disk, with optional `initrd-`, `cmdline-` and `config-` siblings, plus a
//! `default-<type>` symlink pinning the default kernel for a type.

use std::{
    collections::{HashMap, HashSet},
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::{Error, KERNEL_DIR, MODULES_DIR};

/// Parsed kernel identity triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemKernel {
    /// Dotted upstream version, e.g. `4.2.1`
    pub version: String,

    /// Variant tag, e.g. `native`, `lts`, `kvm`
    pub ktype: String,

    /// Distribution build counter
    pub release: u64,
}

impl FromStr for SystemKernel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s).ok_or_else(|| {
            log::debug!("refusing kernel identifier: {s:?}");
            Error::InvalidKernelId {
                input: s.to_string(),
            }
        })
    }
}

impl fmt::Display for SystemKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.version, self.release, self.ktype)
    }
}

/// Grammar: `<version>-<release><noise>.<type>`. The version is dot-separated
/// decimal runs, the release is the longest digit prefix after the `-`, and
/// anything between the release digits and the `.` is discarded (packaging
/// tools have been known to leave droppings like `120a`).
fn parse(s: &str) -> Option<SystemKernel> {
    let (version, rest) = s.split_once('-')?;
    if version.is_empty()
        || version
            .split('.')
            .any(|run| run.is_empty() || !run.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let release = rest[..digits].parse::<u64>().ok()?;

    let (_, ktype) = rest[digits..].split_once('.')?;
    if ktype.is_empty() || ktype.contains('.') {
        return None;
    }

    Some(SystemKernel {
        version: version.to_owned(),
        ktype: ktype.to_owned(),
        release,
    })
}

/// On-disk locations backing a discovered kernel
#[derive(Debug, Clone)]
pub struct KernelSource {
    /// The bootable image itself; always present at discovery time
    pub blob: PathBuf,
    pub cmdline: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub initrd: Option<PathBuf>,
    pub module_dir: Option<PathBuf>,
}

/// A discovered kernel, immutable once scanned
#[derive(Debug, Clone)]
pub struct Kernel {
    pub meta: SystemKernel,
    pub source: KernelSource,

    /// Whether this kernel is pinned as the default for its type
    pub default_for_type: bool,
}

/// Parse `<namespace>.<type>.<version>-<release>` blob names
fn parse_blob_name(namespace: &str, name: &str) -> Option<SystemKernel> {
    let rest = name.strip_prefix(namespace)?.strip_prefix('.')?;
    let (ktype, version_release) = rest.split_once('.')?;
    format!("{version_release}.{ktype}").parse().ok()
}

/// Scan the kernel directory beneath `prefix` for installed kernels
///
/// Records are anchored on kernel blobs; missing siblings leave their fields
/// unset without suppressing the record. Collection order is scan order.
pub fn discover_kernels(prefix: &Path, namespace: &str) -> Result<Vec<Kernel>, Error> {
    let kernel_dir = prefix.join(KERNEL_DIR);
    let entries = match fs::read_dir(&kernel_dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            log::debug!("no kernel directory at {}", kernel_dir.display());
            return Ok(vec![]);
        }
        Err(source) => {
            log::error!("unable to scan {}: {source}", kernel_dir.display());
            return Err(Error::Path {
                path: kernel_dir,
                source,
            });
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Path {
            path: kernel_dir.clone(),
            source,
        })?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    let present: HashSet<&str> = names.iter().map(String::as_str).collect();

    let mut kernels: Vec<Kernel> = Vec::new();
    for name in &names {
        let Some(meta) = parse_blob_name(namespace, name) else {
            continue;
        };
        if kernels.iter().any(|k| k.meta == meta) {
            continue;
        }
        log::trace!("discovered kernel blob: {name}");

        let sibling =
            |file: String| -> Option<PathBuf> { present.contains(file.as_str()).then(|| kernel_dir.join(file)) };

        let initrd = sibling(format!(
            "initrd-{namespace}.{}.{}-{}",
            meta.ktype, meta.version, meta.release
        ));
        let cmdline = sibling(format!("cmdline-{meta}"));
        let config = sibling(format!("config-{meta}"));

        let module_dir = prefix
            .join(MODULES_DIR)
            .join(format!("{}-{}", meta.version, meta.release));
        let module_dir = module_dir.is_dir().then_some(module_dir);

        kernels.push(Kernel {
            source: KernelSource {
                blob: kernel_dir.join(name),
                cmdline,
                config,
                initrd,
                module_dir,
            },
            meta,
            default_for_type: false,
        });
    }

    // Resolve `default-<type>` symlinks to the kernels they pin. Scanned in
    // sorted order so conflicting claims resolve deterministically.
    let mut sorted_names = names.clone();
    sorted_names.sort();
    let mut defaults: HashMap<&str, SystemKernel> = HashMap::new();
    for name in &sorted_names {
        let Some(ktype) = name.strip_prefix("default-") else {
            continue;
        };
        let link = kernel_dir.join(name);
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(source) => {
                log::error!("unable to read {}: {source}", link.display());
                continue;
            }
        };
        let Some(target_name) = target.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        let Some(meta) = parse_blob_name(namespace, target_name) else {
            log::error!("default-{ktype} points at unparseable target {target_name}");
            continue;
        };
        if meta.ktype != ktype {
            log::error!("default-{ktype} points at a {} kernel, ignoring", meta.ktype);
            continue;
        }
        if let Some(existing) = defaults.get(ktype) {
            log::error!("conflicting default claims for {ktype}: keeping {existing}, ignoring {meta}");
            continue;
        }
        defaults.insert(ktype, meta);
    }

    for kernel in kernels.iter_mut() {
        if defaults.get(kernel.meta.ktype.as_str()) == Some(&kernel.meta) {
            kernel.default_for_type = true;
        }
    }

    Ok(kernels)
}

/// Partition a kernel collection by type, preserving per-type scan order
pub fn map_kernels(kernels: &[Kernel]) -> HashMap<&str, Vec<&Kernel>> {
    let mut map: HashMap<&str, Vec<&Kernel>> = HashMap::new();
    for kernel in kernels {
        map.entry(kernel.meta.ktype.as_str()).or_default().push(kernel);
    }
    map
}

/// The pinned default for a type, falling back to the newest release.
/// Release ties go to the lexicographically smallest version, then scan order.
pub fn default_for_type<'a>(kernels: &'a [Kernel], ktype: &str) -> Option<&'a Kernel> {
    if let Some(pinned) = kernels
        .iter()
        .find(|k| k.meta.ktype == ktype && k.default_for_type)
    {
        return Some(pinned);
    }

    kernels
        .iter()
        .filter(|k| k.meta.ktype == ktype)
        .fold(None, |best: Option<&Kernel>, kernel| match best {
            Some(best) if kernel.meta.release > best.meta.release => Some(kernel),
            Some(best)
                if kernel.meta.release == best.meta.release
                    && kernel.meta.version < best.meta.version =>
            {
                Some(kernel)
            }
            Some(best) => Some(best),
            None => Some(kernel),
        })
}

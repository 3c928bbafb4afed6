// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Filesystem helpers for boot partitions
//!
//! Boot partitions are typically VFAT: lookups are case-insensitive and
//! half-written files survive power loss. Copies here stage to a sibling and
//! rename into place, with change detection up front to avoid churning
//! flash for identical content.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Case-insensitive path joining for VFAT trees
pub trait PathExt {
    /// Join `component`, reusing an existing child that differs only by case
    fn join_insensitive(&self, component: &str) -> PathBuf;
}

impl PathExt for Path {
    fn join_insensitive(&self, component: &str) -> PathBuf {
        let exact = self.join(component);
        if exact.exists() {
            return exact;
        }
        if let Ok(entries) = fs::read_dir(self) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().eq_ignore_ascii_case(component) {
                    return self.join(name);
                }
            }
        }
        exact
    }
}

/// blake3 content hash, memory-mapped
pub fn file_hash(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

/// Whether both files exist with identical content
pub fn files_match(a: &Path, b: &Path) -> bool {
    match (file_hash(a), file_hash(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Reduce a copy changeset to pairs whose destination is missing or stale
pub fn changed_files(changeset: &[(PathBuf, PathBuf)]) -> Vec<(PathBuf, PathBuf)> {
    changeset
        .iter()
        .filter(|(source, dest)| !files_match(source, dest))
        .cloned()
        .collect()
}

/// Copy into place through a temporary sibling and a rename
pub fn copy_atomic_vfat(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    sync: bool,
) -> io::Result<()> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = match dest.file_name().and_then(|name| name.to_str()) {
        Some(name) => dest.with_file_name(format!(".{name}.update")),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination has no filename",
            ))
        }
    };

    fs::copy(source, &staging)?;
    if sync {
        fs::File::open(&staging)?.sync_all()?;
    }
    fs::rename(&staging, dest)?;
    Ok(())
}

/// Read a cmdline snippet: comments dropped, lines joined with spaces
pub fn cmdline_snippet(path: impl AsRef<Path>) -> io::Result<String> {
    let text = fs::read_to_string(path.as_ref())?;
    let snippet = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");
    Ok(snippet)
}

// SPDX-FileCopyrightText: Copyright © 2026 Bootkeep Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Minimal os-release(5) parsing

use std::str::FromStr;

/// The subset of os-release keys boot management needs
#[derive(Debug, Clone, Default)]
pub struct OsRelease {
    pub name: String,
    pub id: String,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
}

impl FromStr for OsRelease {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parsed = OsRelease::default();
        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "NAME" => parsed.name = value.to_owned(),
                "ID" => parsed.id = value.to_owned(),
                "VERSION_ID" => parsed.version_id = Some(value.to_owned()),
                "PRETTY_NAME" => parsed.pretty_name = Some(value.to_owned()),
                _ => {}
            }
        }
        Ok(parsed)
    }
}

impl OsRelease {
    /// Vendor identifier used to prefix loader entry filenames.
    /// Filename-hostile characters collapse to `-`.
    pub fn vendor_prefix(&self) -> String {
        let base = self.pretty_name.as_deref().unwrap_or(&self.name);
        base.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::OsRelease;

    const SAMPLE: &str = r#"NAME="Test Linux"
ID=testlinux
# a comment
VERSION_ID=42
PRETTY_NAME="Test Linux 42 (rolling)"
ANSI_COLOR="1;34"
"#;

    #[test]
    fn parses_known_keys() {
        let parsed: OsRelease = SAMPLE.parse().unwrap();
        assert_eq!(parsed.name, "Test Linux");
        assert_eq!(parsed.id, "testlinux");
        assert_eq!(parsed.version_id.as_deref(), Some("42"));
        assert_eq!(parsed.pretty_name.as_deref(), Some("Test Linux 42 (rolling)"));
    }

    #[test]
    fn vendor_prefix_is_filename_safe() {
        let parsed: OsRelease = SAMPLE.parse().unwrap();
        assert_eq!(parsed.vendor_prefix(), "Test-Linux-42--rolling-");
    }

    #[test]
    fn vendor_prefix_falls_back_to_name() {
        let parsed: OsRelease = "NAME=Tester\nID=tester\n".parse().unwrap();
        assert_eq!(parsed.vendor_prefix(), "Tester");
    }
}

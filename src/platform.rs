//! Platform targets for updater artifacts and standalone installers.
//!
//! Updater artifacts are keyed by the six `os-arch` targets Tauri apps build
//! for. Installers additionally allow universal/legacy targets that only make
//! sense for first-time downloads. Incoming target strings from update checks
//! go through a closed alias table before parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Targets an in-app updater can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdaterPlatform {
    DarwinAarch64,
    DarwinX86_64,
    LinuxX86_64,
    LinuxAarch64,
    WindowsX86_64,
    WindowsAarch64,
}

impl UpdaterPlatform {
    pub const ALL: [UpdaterPlatform; 6] = [
        Self::DarwinAarch64,
        Self::DarwinX86_64,
        Self::LinuxX86_64,
        Self::LinuxAarch64,
        Self::WindowsX86_64,
        Self::WindowsAarch64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DarwinAarch64 => "darwin-aarch64",
            Self::DarwinX86_64 => "darwin-x86_64",
            Self::LinuxX86_64 => "linux-x86_64",
            Self::LinuxAarch64 => "linux-aarch64",
            Self::WindowsX86_64 => "windows-x86_64",
            Self::WindowsAarch64 => "windows-aarch64",
        }
    }
}

impl fmt::Display for UpdaterPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdaterPlatform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or(())
    }
}

/// Targets a standalone installer can be published for.
///
/// Superset of [`UpdaterPlatform`]: adds universal macOS bundles and legacy
/// Windows/ARM variants that are downloaded by browsers, never applied by the
/// in-app updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallerPlatform {
    DarwinAarch64,
    DarwinX86_64,
    DarwinUniversal,
    LinuxX86_64,
    LinuxAarch64,
    LinuxArmv7,
    WindowsX86_64,
    WindowsAarch64,
    WindowsX86,
}

impl InstallerPlatform {
    pub const ALL: [InstallerPlatform; 9] = [
        Self::DarwinAarch64,
        Self::DarwinX86_64,
        Self::DarwinUniversal,
        Self::LinuxX86_64,
        Self::LinuxAarch64,
        Self::LinuxArmv7,
        Self::WindowsX86_64,
        Self::WindowsAarch64,
        Self::WindowsX86,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DarwinAarch64 => "darwin-aarch64",
            Self::DarwinX86_64 => "darwin-x86_64",
            Self::DarwinUniversal => "darwin-universal",
            Self::LinuxX86_64 => "linux-x86_64",
            Self::LinuxAarch64 => "linux-aarch64",
            Self::LinuxArmv7 => "linux-armv7",
            Self::WindowsX86_64 => "windows-x86_64",
            Self::WindowsAarch64 => "windows-aarch64",
            Self::WindowsX86 => "windows-x86",
        }
    }

    /// Lookup order when an installer for the exact platform is missing.
    ///
    /// macOS targets fall back to a universal bundle; Windows ARM falls back
    /// through the x86 line. Everything else has no substitute.
    pub fn fallback_chain(&self) -> &'static [InstallerPlatform] {
        match self {
            Self::DarwinAarch64 => &[Self::DarwinAarch64, Self::DarwinUniversal],
            Self::DarwinX86_64 => &[Self::DarwinX86_64, Self::DarwinUniversal],
            Self::WindowsAarch64 => &[
                Self::WindowsAarch64,
                Self::WindowsX86_64,
                Self::WindowsX86,
            ],
            Self::DarwinUniversal => &[Self::DarwinUniversal],
            Self::LinuxX86_64 => &[Self::LinuxX86_64],
            Self::LinuxAarch64 => &[Self::LinuxAarch64],
            Self::LinuxArmv7 => &[Self::LinuxArmv7],
            Self::WindowsX86_64 => &[Self::WindowsX86_64],
            Self::WindowsX86 => &[Self::WindowsX86],
        }
    }
}

impl fmt::Display for InstallerPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallerPlatform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or(())
    }
}

/// Closed alias table for incoming target strings.
///
/// Full-token aliases rewrite the whole target; bare-OS aliases apply to the
/// `os` half of an `os-arch` pair. Anything not in the table and not already
/// a canonical target is rejected.
const TARGET_ALIASES: &[(&str, &str)] = &[
    ("macos", "darwin"),
    ("osx", "darwin"),
    ("win", "windows"),
    ("win64", "windows-x86_64"),
    ("win32", "windows-x86_64"),
    ("linux64", "linux-x86_64"),
];

fn apply_alias(token: &str) -> &str {
    TARGET_ALIASES
        .iter()
        .find(|(from, _)| *from == token)
        .map(|(_, to)| *to)
        .unwrap_or(token)
}

/// Normalise a raw update-check target to a canonical updater platform.
///
/// Lowercases, applies the alias table, and preserves `os-arch` form (so
/// `macos-aarch64` becomes `darwin-aarch64`). A bare OS with no architecture
/// is malformed.
pub fn normalize_target(raw: &str) -> Result<UpdaterPlatform, ApiError> {
    let token = raw.trim().to_ascii_lowercase();
    let mapped = apply_alias(&token);

    if let Ok(p) = mapped.parse::<UpdaterPlatform>() {
        return Ok(p);
    }

    // `os-arch` form: alias the OS half, keep the arch half.
    if let Some((os, arch)) = mapped.split_once('-') {
        let candidate = format!("{}-{}", apply_alias(os), arch);
        if let Ok(p) = candidate.parse::<UpdaterPlatform>() {
            return Ok(p);
        }
    }

    Err(ApiError::validation(format!(
        "unknown update target '{raw}'"
    )))
}

/// Normalise a raw installer download platform through the same alias table.
pub fn normalize_installer_platform(raw: &str) -> Result<InstallerPlatform, ApiError> {
    let token = raw.trim().to_ascii_lowercase();
    let mapped = apply_alias(&token);

    if let Ok(p) = mapped.parse::<InstallerPlatform>() {
        return Ok(p);
    }

    if let Some((os, arch)) = mapped.split_once('-') {
        let candidate = format!("{}-{}", apply_alias(os), arch);
        if let Ok(p) = candidate.parse::<InstallerPlatform>() {
            return Ok(p);
        }
    }

    Err(ApiError::validation(format!(
        "unknown installer platform '{raw}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_targets_round_trip() {
        for p in UpdaterPlatform::ALL {
            assert_eq!(normalize_target(p.as_str()).unwrap(), p);
        }
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(
            normalize_target("win64").unwrap(),
            UpdaterPlatform::WindowsX86_64
        );
        assert_eq!(
            normalize_target("win32").unwrap(),
            UpdaterPlatform::WindowsX86_64
        );
        assert_eq!(
            normalize_target("linux64").unwrap(),
            UpdaterPlatform::LinuxX86_64
        );
        assert_eq!(
            normalize_target("macos-aarch64").unwrap(),
            UpdaterPlatform::DarwinAarch64
        );
        assert_eq!(
            normalize_target("osx-x86_64").unwrap(),
            UpdaterPlatform::DarwinX86_64
        );
        assert_eq!(
            normalize_target("Win-x86_64").unwrap(),
            UpdaterPlatform::WindowsX86_64
        );
    }

    #[test]
    fn bare_os_is_malformed() {
        assert!(normalize_target("macos").is_err());
        assert!(normalize_target("windows").is_err());
        assert!(normalize_target("").is_err());
    }

    #[test]
    fn unknown_targets_are_rejected() {
        assert!(normalize_target("solaris-sparc").is_err());
        assert!(normalize_target("darwin-riscv64").is_err());
    }

    #[test]
    fn installer_fallbacks() {
        assert_eq!(
            InstallerPlatform::DarwinAarch64.fallback_chain(),
            &[
                InstallerPlatform::DarwinAarch64,
                InstallerPlatform::DarwinUniversal
            ]
        );
        assert_eq!(
            InstallerPlatform::WindowsAarch64.fallback_chain(),
            &[
                InstallerPlatform::WindowsAarch64,
                InstallerPlatform::WindowsX86_64,
                InstallerPlatform::WindowsX86
            ]
        );
        assert_eq!(
            InstallerPlatform::LinuxX86_64.fallback_chain(),
            &[InstallerPlatform::LinuxX86_64]
        );
    }

    #[test]
    fn installer_platform_accepts_broader_enum() {
        assert_eq!(
            normalize_installer_platform("darwin-universal").unwrap(),
            InstallerPlatform::DarwinUniversal
        );
        assert_eq!(
            normalize_installer_platform("windows-x86").unwrap(),
            InstallerPlatform::WindowsX86
        );
        assert!(normalize_installer_platform("windows-itanium").is_err());
    }
}

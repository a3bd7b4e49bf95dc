//! Optional user configuration and architecture defaults.
//!
//! ```toml
//! # ~/.config/package-builder/config.toml
//! host_arch = "x86_64"
//! build_arch = "x86"
//! default_builder = "alpine"
//! ```
//!
//! Command-line flags and `HOSTARCH`/`BUILDARCH` win over the file; the file
//! wins over detection from the running binary.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Builder identity used when a descriptor does not name one.
pub const DEFAULT_BUILDER: &str = "alpine";

const CONFIG_DIR_NAME: &str = "package-builder";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagerConfig {
    pub host_arch: Option<String>,
    pub build_arch: Option<String>,
    pub default_builder: Option<String>,
}

impl PackagerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config '{}'", path.display()))
    }

    /// Load `explicit` if given, otherwise the per-user file if it exists.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                log::debug!("using config {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn default_builder(&self) -> &str {
        self.default_builder.as_deref().unwrap_or(DEFAULT_BUILDER)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Architecture name of the running binary.
pub fn detect_arch() -> Result<&'static str> {
    arch_name(std::env::consts::ARCH)
}

fn arch_name(rust_arch: &str) -> Result<&'static str> {
    match rust_arch {
        "x86_64" => Ok("x86_64"),
        "x86" => Ok("x86"),
        "aarch64" => Ok("aarch64"),
        other => bail!("unrecognized host architecture '{other}'; pass --host and --build"),
    }
}

/// Pick an architecture: explicit value, then config, then detection.
pub fn resolve_arch(explicit: Option<&str>, configured: Option<&str>) -> Result<String> {
    if let Some(arch) = explicit.or(configured) {
        return Ok(arch.to_string());
    }
    detect_arch().map(str::to_string)
}

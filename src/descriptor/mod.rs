//! Package set descriptors.
//!
//! A descriptor is a YAML document describing one source package that builds
//! into several binary packages:
//!
//! ```yaml
//! version: "1.3.1"
//! build: 2
//! sources:
//!   - https://zlib.net/zlib-{{.Version}}.tar.gz
//!   - file:patches
//! script:
//!   - '{{extract "zlib" "gz"}}'
//!   - '{{configure "zlib"}}'
//!   - '{{make "zlib" "all" "install"}}'
//!   - '{{mvman "zlib"}}'
//! packages:
//!   zlib:
//!     dependencies: [musl]
//!   zlib-man:
//! data:
//!   configure: [--prefix=/usr]
//! ```
//!
//! `sources` and `script` are templates. They are expanded exactly once, by
//! consuming the descriptor into an [`ExpandedDescriptor`].

pub mod data;

use crate::error::PackagingError;
use crate::template::{expand_lines, ArchPair, TemplateContext};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

pub use data::TemplateValue;

/// Name used for the descriptor inside a source bundle when it was read from stdin.
pub const STDIN_DESCRIPTOR_NAME: &str = "package.yaml";

/// One binary package produced by the set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Names of packages this one depends on. Not validated.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Where a descriptor came from. Kept so `file:` sources can be resolved
/// relative to it and so it can ship inside its own source bundle.
#[derive(Debug, Clone)]
pub struct DescriptorSource {
    /// File name of the descriptor (archive member name).
    pub name: String,
    /// Directory that relative `file:` sources are resolved against.
    pub base_dir: PathBuf,
    /// The descriptor exactly as it was read.
    pub bytes: Vec<u8>,
}

/// A loaded, not yet expanded, package set.
#[derive(Debug, Clone)]
pub struct PackageSetDescriptor {
    pub version: String,
    pub build: u64,
    pub sources: Vec<String>,
    pub script: Vec<String>,
    pub packages: BTreeMap<String, Package>,
    pub builder: String,
    pub build_dependencies: Vec<String>,
    pub data: BTreeMap<String, TemplateValue>,
    pub origin: DescriptorSource,
}

#[derive(Default, Deserialize)]
struct DescriptorDocument {
    #[serde(default, deserialize_with = "scalar_string")]
    version: String,
    #[serde(default, alias = "buildNumber", alias = "build_number")]
    build: u64,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    script: Vec<String>,
    #[serde(default)]
    packages: BTreeMap<String, Option<Package>>,
    #[serde(default)]
    builder: Option<String>,
    #[serde(default, alias = "buildDependencies", alias = "build_dependencies")]
    builddependencies: Vec<String>,
    #[serde(default)]
    data: BTreeMap<String, TemplateValue>,
}

fn is_empty_document(bytes: &[u8]) -> bool {
    matches!(
        serde_yaml::from_slice::<serde_yaml::Value>(bytes),
        Ok(serde_yaml::Value::Null)
    )
}

/// Versions like `1.2` read as YAML floats; keep whatever was written.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a scalar version, found {other:?}"
        ))),
    }
}

impl PackageSetDescriptor {
    /// Parse a descriptor from its serialized bytes.
    pub fn from_bytes(bytes: Vec<u8>, name: &str, base_dir: &Path, default_builder: &str) -> Result<Self> {
        // An empty or comment-only document is a valid, empty package set.
        let doc: DescriptorDocument = if is_empty_document(&bytes) {
            DescriptorDocument::default()
        } else {
            serde_yaml::from_slice(&bytes)
                .with_context(|| format!("parsing package descriptor '{name}'"))?
        };

        let builder = match doc.builder {
            Some(builder) if !builder.trim().is_empty() => builder,
            _ => default_builder.to_string(),
        };

        Ok(Self {
            version: doc.version,
            build: doc.build,
            sources: doc.sources,
            script: doc.script,
            packages: doc
                .packages
                .into_iter()
                .map(|(name, pkg)| (name, pkg.unwrap_or_default()))
                .collect(),
            builder,
            build_dependencies: doc.builddependencies,
            data: doc.data,
            origin: DescriptorSource {
                name: name.to_string(),
                base_dir: base_dir.to_path_buf(),
                bytes,
            },
        })
    }

    /// Read and parse a descriptor from a stream.
    pub fn from_reader(
        mut reader: impl Read,
        name: &str,
        base_dir: &Path,
        default_builder: &str,
    ) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading package descriptor '{name}'"))?;
        Self::from_bytes(bytes, name, base_dir, default_builder)
    }

    /// Load a descriptor file; relative `file:` sources resolve against its directory.
    pub fn load(path: &Path, default_builder: &str) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("reading package descriptor '{}'", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(STDIN_DESCRIPTOR_NAME);
        let base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_bytes(bytes, name, &base_dir, default_builder)
    }

    /// Package names in ascending order.
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Dependencies declared for one package.
    pub fn dependencies_of(&self, package: &str) -> Result<&[String], PackagingError> {
        self.packages
            .get(package)
            .map(|pkg| pkg.dependencies.as_slice())
            .ok_or_else(|| PackagingError::UnknownPackage(package.to_string()))
    }

    /// Expand `sources` and `script` for the given architectures.
    ///
    /// Consumes the descriptor, so a set can never be expanded twice.
    pub fn expand(self, arch: &ArchPair) -> Result<ExpandedDescriptor> {
        let ctx = TemplateContext::new(&self, arch);
        let sources = expand_lines(&self.sources, &ctx).context("expanding source templates")?;
        let script = expand_lines(&self.script, &ctx).context("expanding script templates")?;
        log::debug!(
            "expanded {} source line(s) and {} script line(s) for host={} build={}",
            sources.len(),
            script.len(),
            arch.host,
            arch.build
        );
        Ok(ExpandedDescriptor {
            descriptor: self,
            sources,
            script,
        })
    }
}

/// A descriptor whose templates have been expanded.
#[derive(Debug, Clone)]
pub struct ExpandedDescriptor {
    descriptor: PackageSetDescriptor,
    sources: Vec<String>,
    script: Vec<String>,
}

impl ExpandedDescriptor {
    /// The descriptor as loaded (unexpanded `sources`/`script`).
    pub fn descriptor(&self) -> &PackageSetDescriptor {
        &self.descriptor
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn script(&self) -> &[String] {
        &self.script
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    pub fn build(&self) -> u64 {
        self.descriptor.build
    }

    pub fn packages(&self) -> &BTreeMap<String, Package> {
        &self.descriptor.packages
    }

    pub fn origin(&self) -> &DescriptorSource {
        &self.descriptor.origin
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn descriptor(yaml: &str) -> PackageSetDescriptor {
        PackageSetDescriptor::from_bytes(yaml.as_bytes().to_vec(), "pkg.yaml", Path::new("."), "alpine")
            .unwrap()
    }

    pub(crate) fn arch() -> ArchPair {
        ArchPair::new("x86_64", "x86_64")
    }

    #[test]
    fn loads_fields_and_defaults() {
        let d = descriptor(
            "version: 1.2\n\
             buildNumber: 3\n\
             packages:\n  zlib:\n    dependencies: [musl]\n  zlib-man:\n\
             buildDependencies: [make, gcc]\n\
             unknown: ignored\n",
        );
        assert_eq!(d.version, "1.2");
        assert_eq!(d.build, 3);
        assert_eq!(d.builder, "alpine");
        assert_eq!(d.build_dependencies, ["make", "gcc"]);
        assert_eq!(d.package_names(), ["zlib", "zlib-man"]);
        assert_eq!(d.dependencies_of("zlib").unwrap(), ["musl"]);
        assert!(d.dependencies_of("zlib-man").unwrap().is_empty());
    }

    #[test]
    fn empty_builder_uses_default() {
        let d = descriptor("builder: ''\n");
        assert_eq!(d.builder, "alpine");
        let d = descriptor("builder: debian\n");
        assert_eq!(d.builder, "debian");
    }

    #[test]
    fn unknown_package_is_named_error() {
        let d = descriptor("packages:\n  zlib:\n");
        assert_eq!(
            d.dependencies_of("curl").unwrap_err(),
            PackagingError::UnknownPackage("curl".into())
        );
    }

    #[test]
    fn malformed_descriptor_fails_to_load() {
        let err = PackageSetDescriptor::from_bytes(
            b"packages: [not, a, map]\n".to_vec(),
            "bad.yaml",
            Path::new("."),
            "alpine",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("bad.yaml"));
    }

    #[test]
    fn expand_replaces_sources_and_script_only() {
        let d = descriptor(
            "version: '2.0'\n\
             sources: ['https://example.org/foo-{{.Version}}.tar.gz']\n\
             script: ['{{extract \"foo\" \"xz\"}}']\n",
        );
        let expanded = d.expand(&arch()).unwrap();
        assert_eq!(
            expanded.sources(),
            ["https://example.org/foo-2.0.tar.gz"]
        );
        assert_eq!(
            expanded.script(),
            ["tar -xf src/foo-2.0.tar.xz", "mv foo-2.0 foo"]
        );
        assert_eq!(
            expanded.descriptor().sources,
            ["https://example.org/foo-{{.Version}}.tar.gz"]
        );
    }

    #[test]
    fn load_uses_file_directory_as_base() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("zlib.yaml");
        fs::write(&path, "version: '1'\n").unwrap();
        let d = PackageSetDescriptor::load(&path, "alpine").unwrap();
        assert_eq!(d.origin.name, "zlib.yaml");
        assert_eq!(d.origin.base_dir, tmp.path());
        assert_eq!(d.origin.bytes, b"version: '1'\n");
    }
}

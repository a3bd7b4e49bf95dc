//! Source bundles.
//!
//! A source bundle is a tar archive carrying everything a package set needs
//! to build offline:
//!
//! ```text
//! zlib-1.3.1.tar.gz          remote sources, fetched
//! patches/                   local sources, copied (directories recursively)
//! patches/0001-fix.patch
//! zlib.yaml                  the descriptor itself
//! .pkginfo/
//! .pkginfo/zlib.pkginfo      one metadata record per package
//! manifest.txt               the source references, one per line
//! ```

pub mod fetch;

use crate::archive::{dir_header, file_header, symlink_header, ExactLen, GENERATED_FILE_MODE};
use crate::descriptor::ExpandedDescriptor;
use crate::error::PackagingError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

pub use fetch::{FetchedSource, Fetcher, HttpFetcher};

/// Archive member listing the declared sources.
pub const MANIFEST_NAME: &str = "manifest.txt";

/// Archive directory holding per-package metadata records.
pub const PKGINFO_DIR: &str = ".pkginfo";

/// Extension of per-package metadata records.
pub const PKGINFO_EXT: &str = "pkginfo";

const PKGINFO_DIR_MODE: u32 = 0o755;

/// A parsed source reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// Fetched over HTTP(S).
    Remote { url: Url, name: String },
    /// Copied from a path relative to the descriptor's directory.
    Local { path: PathBuf, name: String },
}

impl SourceRef {
    pub fn parse(reference: &str) -> Result<Self> {
        if let Some(rest) = reference.strip_prefix("file:") {
            let path = PathBuf::from(rest.trim_start_matches('/'));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .with_context(|| format!("local source '{reference}' has no file name"))?;
            return Ok(SourceRef::Local { path, name });
        }

        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Err(PackagingError::UnsupportedScheme {
                    scheme: String::new(),
                    reference: reference.to_string(),
                }
                .into())
            }
            Err(err) => {
                return Err(err).with_context(|| format!("parsing source reference '{reference}'"))
            }
        };
        match url.scheme() {
            "http" | "https" => {
                let name = url
                    .path_segments()
                    .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                    .map(str::to_string)
                    .with_context(|| format!("remote source '{reference}' has no file name"))?;
                Ok(SourceRef::Remote { url, name })
            }
            scheme => Err(PackagingError::UnsupportedScheme {
                scheme: scheme.to_string(),
                reference: reference.to_string(),
            }
            .into()),
        }
    }

    /// Member name in the bundle.
    pub fn name(&self) -> &str {
        match self {
            SourceRef::Remote { name, .. } | SourceRef::Local { name, .. } => name,
        }
    }
}

/// Per-package metadata record stored under `.pkginfo/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub build: u64,
    pub dependencies: Vec<String>,
}

/// Write the source bundle for `descriptor` to `out`.
///
/// Every reference is parsed before anything is written, so a bad scheme
/// leaves `out` untouched.
pub fn bundle_sources<W: Write>(descriptor: &ExpandedDescriptor, fetcher: &dyn Fetcher, out: W) -> Result<W> {
    let refs = descriptor
        .sources()
        .iter()
        .map(|reference| SourceRef::parse(reference))
        .collect::<Result<Vec<_>>>()?;

    let origin = descriptor.origin();
    let mut builder = tar::Builder::new(out);

    for source in &refs {
        match source {
            SourceRef::Remote { url, name } => append_remote(&mut builder, fetcher, url, name)?,
            SourceRef::Local { path, name } => {
                append_local(&mut builder, &origin.base_dir.join(path), name)?
            }
        }
    }

    append_bytes(&mut builder, &origin.name, &origin.bytes)
        .with_context(|| format!("adding descriptor '{}' to source archive", origin.name))?;

    builder
        .append_data(&mut dir_header(PKGINFO_DIR_MODE), PKGINFO_DIR, io::empty())
        .context("adding metadata directory to source archive")?;

    for (name, package) in descriptor.packages() {
        let record = PackageInfo {
            name: name.clone(),
            version: descriptor.version().to_string(),
            build: descriptor.build(),
            dependencies: package.dependencies.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&record)
            .with_context(|| format!("serializing metadata for '{name}'"))?;
        append_bytes(&mut builder, &pkginfo_path(name), &bytes)
            .with_context(|| format!("adding metadata for '{name}' to source archive"))?;
    }

    let manifest = descriptor.sources().join("\n");
    append_bytes(&mut builder, MANIFEST_NAME, manifest.as_bytes())
        .context("adding manifest to source archive")?;

    builder.into_inner().context("finishing source archive")
}

/// Archive path of a package's metadata record.
pub fn pkginfo_path(package: &str) -> String {
    format!("{PKGINFO_DIR}/{package}.{PKGINFO_EXT}")
}

fn append_bytes<W: Write>(builder: &mut tar::Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = file_header(bytes.len() as u64, GENERATED_FILE_MODE);
    builder.append_data(&mut header, name, bytes)?;
    Ok(())
}

fn append_remote<W: Write>(
    builder: &mut tar::Builder<W>,
    fetcher: &dyn Fetcher,
    url: &Url,
    name: &str,
) -> Result<()> {
    let FetchedSource {
        content_length,
        mut body,
    } = fetcher.fetch(url)?;

    let size = match content_length {
        Some(len) => {
            let mut header = file_header(len, GENERATED_FILE_MODE);
            builder
                .append_data(&mut header, name, ExactLen::new(body, len))
                .with_context(|| format!("adding '{url}' to source archive"))?;
            len
        }
        None => {
            // Headers need the size up front.
            let mut buf = Vec::new();
            body.read_to_end(&mut buf)
                .with_context(|| format!("reading '{url}'"))?;
            append_bytes(builder, name, &buf)
                .with_context(|| format!("adding '{url}' to source archive"))?;
            buf.len() as u64
        }
    };
    log::info!("bundled {name} from {url} ({size} bytes)");
    Ok(())
}

fn append_local<W: Write>(builder: &mut tar::Builder<W>, path: &Path, name: &str) -> Result<()> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("reading local source '{}'", path.display()))?;

    if !metadata.is_dir() {
        append_file(builder, path, name, &metadata)?;
        log::info!("bundled {name} from {} ({} bytes)", path.display(), metadata.len());
        return Ok(());
    }

    let mut count = 0usize;
    for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking local source '{}'", path.display()))?;
        let rel = entry.path().strip_prefix(path)?;
        let member = if rel.as_os_str().is_empty() {
            PathBuf::from(name)
        } else {
            Path::new(name).join(rel)
        };
        let metadata = entry
            .metadata()
            .with_context(|| format!("reading '{}'", entry.path().display()))?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            builder
                .append_data(&mut dir_header(mode_of(&metadata, 0o755)), &member, io::empty())
                .with_context(|| format!("adding directory '{}'", member.display()))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("reading link '{}'", entry.path().display()))?;
            builder
                .append_link(&mut symlink_header(mode_of(&metadata, 0o777)), &member, &target)
                .with_context(|| format!("adding symlink '{}'", member.display()))?;
        } else if file_type.is_file() {
            append_file(builder, entry.path(), &member.to_string_lossy(), &metadata)?;
        } else {
            log::warn!("skipping special file '{}'", entry.path().display());
            continue;
        }
        count += 1;
    }
    log::info!("bundled {name} from {} ({count} entries)", path.display());
    Ok(())
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    member: &str,
    metadata: &fs::Metadata,
) -> Result<()> {
    if !metadata.is_file() {
        bail!("local source '{}' is not a regular file", path.display());
    }
    let file = File::open(path).with_context(|| format!("opening '{}'", path.display()))?;
    let len = metadata.len();
    builder
        .append_data(
            &mut file_header(len, mode_of(metadata, 0o644)),
            member,
            ExactLen::new(file, len),
        )
        .with_context(|| format!("adding '{}' to source archive", path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata, _fallback: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata, fallback: u32) -> u32 {
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::PackageSetDescriptor;
    use crate::template::ArchPair;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    /// Serves canned bodies; `None` length simulates a chunked response.
    #[derive(Default)]
    struct StubFetcher {
        bodies: BTreeMap<String, (Vec<u8>, Option<u64>)>,
        requested: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        fn with(mut self, url: &str, body: &[u8], len: Option<u64>) -> Self {
            self.bodies.insert(url.to_string(), (body.to_vec(), len));
            self
        }
    }

    impl Fetcher for StubFetcher {
        fn fetch(&self, url: &Url) -> Result<FetchedSource> {
            self.requested.borrow_mut().push(url.to_string());
            let (body, len) = self
                .bodies
                .get(url.as_str())
                .cloned()
                .with_context(|| format!("404 for {url}"))?;
            Ok(FetchedSource {
                content_length: len,
                body: Box::new(Cursor::new(body)),
            })
        }
    }

    struct Member {
        path: String,
        kind: tar::EntryType,
        mode: u32,
        data: Vec<u8>,
    }

    fn members(archive: &[u8]) -> Vec<Member> {
        let mut archive = tar::Archive::new(archive);
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                Member {
                    path: entry.path().unwrap().to_string_lossy().into_owned(),
                    kind: entry.header().entry_type(),
                    mode: entry.header().mode().unwrap(),
                    data,
                }
            })
            .collect()
    }

    fn expanded(base: &Path, yaml: &str) -> ExpandedDescriptor {
        PackageSetDescriptor::from_bytes(yaml.as_bytes().to_vec(), "zlib.yaml", base, "alpine")
            .unwrap()
            .expand(&ArchPair::new("x86_64", "x86_64"))
            .unwrap()
    }

    #[test]
    fn reference_without_scheme_is_unsupported() {
        for reference in ["zlib-1.3.tar.gz", "patches/fix.patch", "/srv/src/zlib.tar.gz"] {
            let err = SourceRef::parse(reference).unwrap_err();
            assert_eq!(
                err.downcast_ref::<PackagingError>(),
                Some(&PackagingError::UnsupportedScheme {
                    scheme: String::new(),
                    reference: reference.into(),
                }),
                "{reference}"
            );
            assert_eq!(crate::error::exit_status(&err), crate::error::EXIT_FAILURE);
        }
    }

    #[test]
    fn parses_schemes() {
        let remote = SourceRef::parse("https://zlib.net/zlib-1.3.tar.gz").unwrap();
        assert_eq!(remote.name(), "zlib-1.3.tar.gz");
        assert!(matches!(remote, SourceRef::Remote { .. }));

        for reference in ["file:patches/a.patch", "file://patches/a.patch", "file:///patches/a.patch"] {
            assert_eq!(
                SourceRef::parse(reference).unwrap(),
                SourceRef::Local {
                    path: PathBuf::from("patches/a.patch"),
                    name: "a.patch".into(),
                }
            );
        }

        let err = SourceRef::parse("ftp://example.org/x.tar.gz").unwrap_err();
        assert_eq!(
            err.downcast_ref::<PackagingError>(),
            Some(&PackagingError::UnsupportedScheme {
                scheme: "ftp".into(),
                reference: "ftp://example.org/x.tar.gz".into(),
            })
        );
    }

    #[test]
    fn bundles_sources_descriptor_metadata_and_manifest_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("patches/extra")).unwrap();
        fs::write(tmp.path().join("patches/0001.patch"), "diff").unwrap();
        fs::write(tmp.path().join("patches/extra/note"), "n").unwrap();
        fs::write(tmp.path().join("local.conf"), "conf").unwrap();

        let yaml = "version: '1.3'\nbuild: 2\n\
                    sources:\n\
                    - https://zlib.net/zlib-{{.Version}}.tar.gz\n\
                    - https://mirror.example/chunked.txt\n\
                    - file:patches\n\
                    - file:local.conf\n\
                    packages:\n  zlib-man:\n  zlib:\n    dependencies: [musl]\n";
        let descriptor = expanded(tmp.path(), yaml);
        let fetcher = StubFetcher::default()
            .with("https://zlib.net/zlib-1.3.tar.gz", b"tarball", Some(7))
            .with("https://mirror.example/chunked.txt", b"chunky", None);

        let out = bundle_sources(&descriptor, &fetcher, Vec::new()).unwrap();
        let members = members(&out);
        let paths: Vec<&str> = members.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "zlib-1.3.tar.gz",
                "chunked.txt",
                "patches",
                "patches/0001.patch",
                "patches/extra",
                "patches/extra/note",
                "local.conf",
                "zlib.yaml",
                ".pkginfo",
                ".pkginfo/zlib.pkginfo",
                ".pkginfo/zlib-man.pkginfo",
                "manifest.txt",
            ]
        );

        assert_eq!(members[0].data, b"tarball");
        assert_eq!(members[0].mode, 0o600);
        assert_eq!(members[1].data, b"chunky");
        assert_eq!(members[2].kind, tar::EntryType::Directory);
        assert_eq!(members[3].data, b"diff");
        assert_eq!(members[7].data, yaml.as_bytes());
        assert_eq!(members[8].kind, tar::EntryType::Directory);

        let info: PackageInfo = serde_json::from_slice(&members[9].data).unwrap();
        assert_eq!(
            info,
            PackageInfo {
                name: "zlib".into(),
                version: "1.3".into(),
                build: 2,
                dependencies: vec!["musl".into()],
            }
        );

        assert_eq!(
            String::from_utf8(members[11].data.clone()).unwrap(),
            "https://zlib.net/zlib-1.3.tar.gz\n\
             https://mirror.example/chunked.txt\n\
             file:patches\n\
             file:local.conf"
        );
    }

    #[cfg(unix)]
    #[test]
    fn local_files_keep_their_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("hook.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let descriptor = expanded(tmp.path(), "sources: [file:hook.sh]\n");
        let out = bundle_sources(&descriptor, &StubFetcher::default(), Vec::new()).unwrap();
        let members = members(&out);
        assert_eq!(members[0].path, "hook.sh");
        assert_eq!(members[0].mode, 0o755);
    }

    #[test]
    fn unsupported_scheme_writes_nothing_and_fetches_nothing() {
        let tmp = TempDir::new().unwrap();
        let descriptor = expanded(
            tmp.path(),
            "sources:\n- https://zlib.net/zlib.tar.gz\n- ftp://example.org/x.tar.gz\n",
        );
        let fetcher = StubFetcher::default().with("https://zlib.net/zlib.tar.gz", b"z", Some(1));

        let mut out = Vec::new();
        let err = bundle_sources(&descriptor, &fetcher, &mut out).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PackagingError>(),
            Some(PackagingError::UnsupportedScheme { scheme, .. }) if scheme == "ftp"
        ));
        assert!(out.is_empty());
        assert!(fetcher.requested.borrow().is_empty());
    }

    #[test]
    fn short_remote_body_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let descriptor = expanded(tmp.path(), "sources: [https://zlib.net/zlib.tar.gz]\n");
        let fetcher = StubFetcher::default().with("https://zlib.net/zlib.tar.gz", b"abc", Some(10));
        assert!(bundle_sources(&descriptor, &fetcher, Vec::new()).is_err());
    }

    #[test]
    fn missing_local_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let descriptor = expanded(tmp.path(), "sources: [file:nope.patch]\n");
        let err = bundle_sources(&descriptor, &StubFetcher::default(), Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("nope.patch"));
    }

    #[test]
    fn fetch_failure_aborts_the_bundle() {
        let tmp = TempDir::new().unwrap();
        let descriptor = expanded(tmp.path(), "sources: [https://zlib.net/missing.tar.gz]\n");
        let err = bundle_sources(&descriptor, &StubFetcher::default(), Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("404"));
    }
}

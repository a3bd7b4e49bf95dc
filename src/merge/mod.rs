//! Rootfs merging.
//!
//! Per-package filesystem archives are concatenated into one plain tar in
//! the order given. Every entry is copied through unchanged, along with the
//! PAX records (extended attributes, ACLs) attached to it. Entries under
//! [`alternatives::ALTERNATIVES_DIR`] are also recorded, and once all inputs
//! are consumed one symlink per resolved alternative is appended.
//!
//! Inputs may be plain or zstd-compressed tar, as produced by the generated
//! build makefile. GNU sparse members are rejected.

pub mod alternatives;

use crate::archive::append_raw_symlink;
use alternatives::{classify, AltPath, AlternativesTable, ResolvedAlternative};
use anyhow::{bail, ensure, Context, Result};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Entry, Header};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Mode of generated alternative links.
pub const LINK_MODE: u32 = 0o777;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSummary {
    pub label: String,
    pub compressed: bool,
    pub entries: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inputs: Vec<InputSummary>,
    pub links: Vec<ResolvedAlternative>,
    /// Alternatives with a target but no provider.
    pub unresolved: Vec<String>,
}

/// A member as read from an input, before its body is copied.
struct Member {
    header: Header,
    path: PathBuf,
    link: Option<PathBuf>,
    /// Header alone carries the full path and link name, so it can be
    /// written back verbatim.
    verbatim: bool,
    /// PAX records that preceded the member, re-emitted before it.
    pax: Vec<(String, Vec<u8>)>,
}

/// Streaming merger. Owns the output for the whole merge.
pub struct AltMerger<W: Write> {
    builder: Builder<W>,
    table: AlternativesTable,
    inputs: Vec<InputSummary>,
}

impl<W: Write> AltMerger<W> {
    pub fn new(out: W) -> Self {
        Self {
            builder: Builder::new(out),
            table: AlternativesTable::default(),
            inputs: Vec::new(),
        }
    }

    /// Copy every entry of one input archive to the output.
    pub fn append_archive<R: Read>(&mut self, label: &str, input: R) -> Result<InputSummary> {
        let mut input = BufReader::new(input);
        let compressed = input
            .fill_buf()
            .with_context(|| format!("reading {label}"))?
            .starts_with(&ZSTD_MAGIC);

        let entries = if compressed {
            let decoder = zstd::stream::read::Decoder::with_buffer(input)
                .with_context(|| format!("opening zstd stream of {label}"))?;
            self.copy_entries(label, decoder)?
        } else {
            self.copy_entries(label, input)?
        };

        log::info!(
            "merged {label}: {entries} entries{}",
            if compressed { " (zstd)" } else { "" }
        );
        let summary = InputSummary {
            label: label.to_string(),
            compressed,
            entries,
        };
        self.inputs.push(summary.clone());
        Ok(summary)
    }

    fn copy_entries<S: Read>(&mut self, label: &str, source: S) -> Result<u64> {
        let mut archive = Archive::new(source);
        let mut count = 0;
        for entry in archive
            .entries()
            .with_context(|| format!("reading {label}"))?
        {
            let mut entry = entry.with_context(|| format!("reading entry {count} of {label}"))?;
            let header = entry.header().clone();
            if header.entry_type().is_gnu_sparse() {
                bail!(
                    "{label}: {} is a GNU sparse file and cannot be merged",
                    String::from_utf8_lossy(&entry.path_bytes())
                );
            }
            let pax = if header.entry_type().is_pax_global_extensions() {
                Vec::new()
            } else {
                pax_records(&mut entry)
                    .with_context(|| format!("reading PAX records of entry {count} of {label}"))?
            };
            let member = Member {
                verbatim: entry.path_bytes() == header.path_bytes()
                    && entry.link_name_bytes() == header.link_name_bytes(),
                path: entry
                    .path()
                    .with_context(|| format!("reading entry {count} of {label}"))?
                    .into_owned(),
                link: entry
                    .link_name()
                    .with_context(|| format!("reading entry {count} of {label}"))?
                    .map(Cow::into_owned),
                header,
                pax,
            };
            let name = member.path.to_string_lossy().into_owned();
            let entry_type = member.header.entry_type();

            match classify(&name) {
                AltPath::Target { alternative } if entry_type.is_file() => {
                    let mut content = Vec::new();
                    entry
                        .read_to_end(&mut content)
                        .with_context(|| format!("reading {name} in {label}"))?;
                    let target = String::from_utf8_lossy(&content);
                    let target = target.trim_end();
                    log::debug!("{label}: alternative {alternative} targets {target}");
                    self.table.set_target(alternative, target);
                    self.write_member(&member, &content[..])?;
                }
                AltPath::Provider {
                    alternative,
                    provider,
                } if !entry_type.is_dir() => {
                    log::debug!("{label}: alternative {alternative} provided by {provider}");
                    self.table.add_provider(alternative, provider);
                    self.write_member(&member, &mut entry)?;
                }
                _ => {
                    log::debug!("{label}: {name}");
                    self.write_member(&member, &mut entry)?;
                }
            }
            count += 1;
        }
        Ok(count)
    }

    fn write_member(&mut self, member: &Member, body: impl Read) -> Result<()> {
        if !member.pax.is_empty() {
            self.builder
                .append_pax_extensions(
                    member
                        .pax
                        .iter()
                        .map(|(key, value)| (key.as_str(), value.as_slice())),
                )
                .with_context(|| format!("writing PAX records of {}", member.path.display()))?;
        }
        let written = if member.verbatim {
            self.builder.append(&member.header, body)
        } else if let Some(link) = &member.link {
            let mut header = member.header.clone();
            self.builder.append_link(&mut header, &member.path, link)
        } else {
            let mut header = member.header.clone();
            self.builder.append_data(&mut header, &member.path, body)
        };
        written.with_context(|| format!("writing {}", member.path.display()))
    }

    /// Resolve alternatives, append their links and terminate the archive.
    pub fn finish(mut self) -> Result<(W, MergeReport)> {
        let resolution = std::mem::take(&mut self.table).resolve();

        for alt in &resolution.resolved {
            ensure!(
                !alt.link_path.is_empty(),
                "alternative '{}' has an empty target",
                alt.name
            );
            append_raw_symlink(&mut self.builder, &alt.link_path, &alt.link_target, LINK_MODE)
                .with_context(|| format!("writing link for alternative '{}'", alt.name))?;
            log::info!(
                "alternative {}: {} -> {}",
                alt.name,
                alt.link_path,
                alt.link_target
            );
        }
        for name in &resolution.unresolved {
            log::warn!("alternative {name} has a target but no provider, no link written");
        }

        let out = self
            .builder
            .into_inner()
            .context("finishing merged archive")?;
        Ok((
            out,
            MergeReport {
                inputs: self.inputs,
                links: resolution.resolved,
                unresolved: resolution.unresolved,
            },
        ))
    }
}

/// Key/value records of the PAX extended header preceding `entry`, if any.
fn pax_records<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<Vec<(String, Vec<u8>)>> {
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(Vec::new());
    };
    extensions
        .map(|extension| {
            let extension = extension?;
            let key = extension
                .key()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            Ok((key.to_string(), extension.value_bytes().to_vec()))
        })
        .collect()
}

/// Merge archive files into `out`, opening one input at a time.
pub fn merge_archives<W: Write>(inputs: &[impl AsRef<Path>], out: W) -> Result<(W, MergeReport)> {
    let mut merger = AltMerger::new(out);
    for path in inputs {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        merger.append_archive(&path.display().to_string(), file)?;
    }
    merger.finish()
}

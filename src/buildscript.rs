//! Makefile generation for a package set.
//!
//! The generated makefile expects to run in an empty build directory with
//! `SRCTAR` naming the source bundle:
//!
//! ```text
//! make -f build.mk SRCTAR=/path/to/zlib-src.tar
//! ```
//!
//! It unpacks the bundle into `src/`, runs the descriptor script as the
//! recipe of `build` (which fills `out/<package>/` trees), copies each
//! package's metadata record into its tree, and packs every tree into
//! `tars/<package>.tar.zst`.

use crate::descriptor::ExpandedDescriptor;
use crate::source::{pkginfo_path, PKGINFO_DIR};
use crate::template::functions::OUTPUT_DIR;
use anyhow::{Context, Result};
use std::io::Write;

/// Directory the generated makefile collects package archives in.
pub const TARS_DIR: &str = "tars";

/// Directory the source bundle is unpacked into.
pub const SRC_DIR: &str = "src";

/// Variable naming the source bundle, supplied on the make command line.
pub const SRCTAR_VAR: &str = "SRCTAR";

/// Extension of generated package archives.
pub const PACKAGE_ARCHIVE_EXT: &str = "tar.zst";

#[derive(Debug, Clone)]
pub struct BuildScript<'a> {
    packages: Vec<&'a str>,
    version: &'a str,
    build: u64,
    script: &'a [String],
}

impl<'a> BuildScript<'a> {
    /// Package names are sorted, so input order never changes the output.
    pub fn new(
        packages: impl IntoIterator<Item = &'a str>,
        version: &'a str,
        build: u64,
        script: &'a [String],
    ) -> Self {
        let mut packages: Vec<&str> = packages.into_iter().collect();
        packages.sort_unstable();
        packages.dedup();
        Self {
            packages,
            version,
            build,
            script,
        }
    }

    pub fn from_descriptor(descriptor: &'a ExpandedDescriptor) -> Self {
        Self::new(
            descriptor.packages().keys().map(String::as_str),
            descriptor.version(),
            descriptor.build(),
            descriptor.script(),
        )
    }

    pub fn render(&self) -> String {
        let tars: Vec<String> = self.packages.iter().map(|p| package_archive(p)).collect();
        let infos: Vec<String> = self.packages.iter().map(|p| info_target(p)).collect();

        let mut lines = vec![
            "all: gentars".to_string(),
            ".PHONY: all gentars outs sources build".to_string(),
            "BUILDROOT != pwd".to_string(),
            format!("OUTDIR = $(BUILDROOT)/{OUTPUT_DIR}"),
            format!("PKGS = {}", self.packages.join(" ")),
            format!("VERSION = {}", self.version),
            format!("BUILDNUM = {}", self.build),
            format!("TARS = {}", tars.join(" ")),
            format!("INFOS = {}", infos.join(" ")),
            "gentars: $(TARS)".to_string(),
            format!("{OUTPUT_DIR} {TARS_DIR} {SRC_DIR}:"),
            "\tmkdir -p $@".to_string(),
            "outs: $(INFOS)".to_string(),
        ];

        for (package, (tar, info)) in self.packages.iter().zip(tars.iter().zip(&infos)) {
            let out_dir = format!("{OUTPUT_DIR}/{package}");
            lines.extend([
                format!("{out_dir}: {OUTPUT_DIR}"),
                "\tmkdir -p $@".to_string(),
                format!("{info}: sources {out_dir}"),
                format!("\tcp {SRC_DIR}/{} $@", pkginfo_path(package)),
                format!("{tar}: build $(INFOS) {TARS_DIR}"),
                format!("\ttar --zstd -cf $@ -C {out_dir} ."),
            ]);
        }

        lines.extend([
            format!("sources: {SRC_DIR}"),
            format!(
                "\t@test -n \"$({SRCTAR_VAR})\" || {{ echo \"{SRCTAR_VAR} must name the source archive\" >&2; exit 1; }}"
            ),
            format!("\ttar -xf $({SRCTAR_VAR}) -C {SRC_DIR}"),
            "build: outs sources".to_string(),
        ]);
        lines.extend(self.script.iter().map(|line| format!("\t{line}")));

        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    pub fn write_to(&self, out: &mut dyn Write) -> Result<()> {
        out.write_all(self.render().as_bytes())
            .context("writing build script")?;
        Ok(())
    }
}

/// Archive goal for one package.
pub fn package_archive(package: &str) -> String {
    format!("{TARS_DIR}/{package}.{PACKAGE_ARCHIVE_EXT}")
}

fn info_target(package: &str) -> String {
    format!("{OUTPUT_DIR}/{package}/{PKGINFO_DIR}")
}

//! Per-invocation state shared by the command handlers.

use crate::descriptor::{PackageSetDescriptor, STDIN_DESCRIPTOR_NAME};
use crate::template::ArchPair;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// A path argument where `-` means the standard stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoPath {
    Std,
    File(PathBuf),
}

impl IoPath {
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            IoPath::Std
        } else {
            IoPath::File(PathBuf::from(arg))
        }
    }
}

/// Everything a command needs, fixed before it runs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub input: IoPath,
    pub output: IoPath,
    pub arch: ArchPair,
    pub default_builder: String,
}

impl RunContext {
    pub fn load_descriptor(&self) -> Result<PackageSetDescriptor> {
        match &self.input {
            IoPath::File(path) => PackageSetDescriptor::load(path, &self.default_builder),
            IoPath::Std => {
                let cwd = std::env::current_dir().context("resolving current directory")?;
                PackageSetDescriptor::from_reader(
                    io::stdin().lock(),
                    STDIN_DESCRIPTOR_NAME,
                    &cwd,
                    &self.default_builder,
                )
            }
        }
    }

    /// Run `write` against the output, flushing it before returning.
    pub fn with_output<T>(&self, write: impl FnOnce(&mut dyn Write) -> Result<T>) -> Result<T> {
        with_output(&self.output, write)
    }
}

/// Open `target`, hand it to `write`, and flush. The handle is closed on every path.
pub fn with_output<T>(target: &IoPath, write: impl FnOnce(&mut dyn Write) -> Result<T>) -> Result<T> {
    match target {
        IoPath::Std => {
            let mut out = BufWriter::new(io::stdout().lock());
            let value = write(&mut out)?;
            out.flush().context("flushing standard output")?;
            Ok(value)
        }
        IoPath::File(path) => {
            let mut out = BufWriter::new(create_output_file(path)?);
            let value = write(&mut out)?;
            out.flush()
                .with_context(|| format!("flushing '{}'", path.display()))?;
            out.get_ref()
                .sync_all()
                .with_context(|| format!("syncing '{}'", path.display()))?;
            Ok(value)
        }
    }
}

/// Create (or truncate) an output file readable only by its owner.
pub fn create_output_file(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("creating output '{}'", path.display()))
}

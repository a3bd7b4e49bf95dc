//! Tar helpers shared by the source bundler and the rootfs merger.
//!
//! Generated entries get deterministic headers: mtime, uid and gid are zero
//! so the same inputs always produce the same archive bytes.

use std::io::{self, Read, Write};
use tar::{Builder, EntryType, Header};

/// Bytes available for a name in a GNU header.
const GNU_NAME_LEN: usize = 100;

/// Member name of GNU long-name and long-link records.
const GNU_LONG_LINK_NAME: &str = "././@LongLink";

/// Mode for generated files (metadata records, manifests, fetched sources).
pub const GENERATED_FILE_MODE: u32 = 0o600;

fn header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    header
}

pub fn file_header(size: u64, mode: u32) -> Header {
    header(EntryType::Regular, size, mode)
}

pub fn dir_header(mode: u32) -> Header {
    header(EntryType::Directory, 0, mode)
}

pub fn symlink_header(mode: u32) -> Header {
    header(EntryType::Symlink, 0, mode)
}

/// Append a symlink whose path is written exactly as given, absolute or not.
///
/// `Builder::append_link` only accepts relative paths. Names that do not fit
/// the header go into GNU long-name and long-link records first.
pub fn append_raw_symlink<W: Write>(
    builder: &mut Builder<W>,
    path: &str,
    target: &str,
    mode: u32,
) -> io::Result<()> {
    if path.len() > GNU_NAME_LEN {
        append_gnu_long(builder, EntryType::GNULongName, path)?;
    }
    if target.len() > GNU_NAME_LEN {
        append_gnu_long(builder, EntryType::GNULongLink, target)?;
    }

    let mut header = symlink_header(mode);
    let gnu = header
        .as_gnu_mut()
        .ok_or_else(|| io::Error::other("symlink header is not GNU"))?;
    copy_truncated(&mut gnu.name, path);
    copy_truncated(&mut gnu.linkname, target);
    header.set_cksum();
    builder.append(&header, io::empty())
}

fn append_gnu_long<W: Write>(builder: &mut Builder<W>, kind: EntryType, name: &str) -> io::Result<()> {
    let mut data = name.as_bytes().to_vec();
    data.push(0);
    let mut header = header(kind, data.len() as u64, 0o644);
    header.set_path(GNU_LONG_LINK_NAME)?;
    header.set_cksum();
    builder.append(&header, data.as_slice())
}

fn copy_truncated(field: &mut [u8; GNU_NAME_LEN], value: &str) {
    let bytes = &value.as_bytes()[..value.len().min(GNU_NAME_LEN)];
    field.fill(0);
    field[..bytes.len()].copy_from_slice(bytes);
}

/// Reader that yields exactly `len` bytes from `inner`, failing if it ends early.
///
/// `tar::Builder` trusts the size in the header, so a short body would
/// otherwise corrupt every entry after it.
pub struct ExactLen<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactLen<R> {
    pub fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactLen<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {} byte(s) still expected", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

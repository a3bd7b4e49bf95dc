//! Name lists printed by `builddeps`, `pkgs` and `deps`.

use crate::context::RunContext;
use crate::descriptor::PackageSetDescriptor;
use crate::error::PackagingError;
use anyhow::{Context, Result};
use std::io::Write;

/// Which names of a descriptor to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    BuildDependencies,
    /// Package names, sorted.
    Packages,
    /// Dependencies of one package. `None` when `--package` was not given.
    Dependencies { package: Option<String> },
}

impl Listing {
    pub fn items<'d>(&self, descriptor: &'d PackageSetDescriptor) -> Result<Vec<&'d str>, PackagingError> {
        match self {
            Listing::BuildDependencies => Ok(descriptor
                .build_dependencies
                .iter()
                .map(String::as_str)
                .collect()),
            Listing::Packages => Ok(descriptor.package_names()),
            Listing::Dependencies { package } => {
                let package = package.as_deref().ok_or(PackagingError::MissingFlag("package"))?;
                Ok(descriptor
                    .dependencies_of(package)?
                    .iter()
                    .map(String::as_str)
                    .collect())
            }
        }
    }
}

/// Write `items` joined by `separator`, with no trailing separator.
pub fn write_list(out: &mut dyn Write, items: &[&str], separator: &str) -> Result<()> {
    out.write_all(items.join(separator).as_bytes())
        .context("writing list")
}

/// Resolve `listing` against `descriptor` and write it to the run's output.
///
/// Nothing is opened for writing when the listing cannot be resolved.
pub fn write_listing(
    ctx: &RunContext,
    descriptor: &PackageSetDescriptor,
    listing: &Listing,
    separator: &str,
) -> Result<()> {
    let items = listing.items(descriptor)?;
    log::debug!("{listing:?}: {} names", items.len());
    ctx.with_output(|out| write_list(out, &items, separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IoPath;
    use crate::descriptor::tests::{arch, descriptor};
    use crate::error::{exit_status, EXIT_FAILURE, EXIT_USAGE};
    use std::fs;
    use tempfile::TempDir;

    const DESCRIPTOR: &str = "packages:\n  zlib-man:\n  zlib:\n    dependencies: [musl, zlib-man]\n\
                              buildDependencies: [make, gcc]\n";

    fn context(tmp: &TempDir) -> RunContext {
        RunContext {
            input: IoPath::File(tmp.path().join("pkg.yaml")),
            output: IoPath::File(tmp.path().join("out")),
            arch: arch(),
            default_builder: "alpine".into(),
        }
    }

    fn listed(listing: Listing, separator: &str) -> Result<String> {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        write_listing(&ctx, &descriptor(DESCRIPTOR), &listing, separator)?;
        Ok(fs::read_to_string(tmp.path().join("out")).unwrap())
    }

    #[test]
    fn joins_with_separator() {
        assert_eq!(listed(Listing::BuildDependencies, "\n").unwrap(), "make\ngcc");
        assert_eq!(listed(Listing::Packages, " ").unwrap(), "zlib zlib-man");
        assert_eq!(
            listed(
                Listing::Dependencies {
                    package: Some("zlib".into())
                },
                ","
            )
            .unwrap(),
            "musl,zlib-man"
        );
    }

    #[test]
    fn empty_list_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let d = descriptor("packages:\n  zlib:\n");
        write_listing(&ctx, &d, &Listing::BuildDependencies, "\n").unwrap();
        assert_eq!(fs::read(tmp.path().join("out")).unwrap(), b"");
    }

    #[test]
    fn deps_without_package_is_a_usage_error() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let err = write_listing(
            &ctx,
            &descriptor(DESCRIPTOR),
            &Listing::Dependencies { package: None },
            "\n",
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PackagingError>(),
            Some(&PackagingError::MissingFlag("package"))
        );
        assert_eq!(exit_status(&err), EXIT_USAGE);
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn deps_of_unknown_package_fails() {
        let err = listed(
            Listing::Dependencies {
                package: Some("zstd".into()),
            },
            "\n",
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PackagingError>(),
            Some(&PackagingError::UnknownPackage("zstd".into()))
        );
        assert_eq!(exit_status(&err), EXIT_FAILURE);
    }
}

//! Packaging layer of a source-based distribution build.
//!
//! A package-set descriptor is compiled into two artifacts, and the per-package
//! archives produced by running the build are later merged into one rootfs:
//!
//! ```text
//! package.yaml ──► descriptor ──► template expansion ──┬──► source bundle (tar)
//!                                                      └──► build makefile
//!
//! make -f build.mk SRCTAR=src.tar ──► tars/<pkg>.tar.zst ──► merge ──► rootfs.tar
//! ```
//!
//! - [`descriptor`] loads the YAML descriptor and expands it exactly once
//! - [`template`] is the line template engine and its builder functions
//! - [`source`] bundles sources, metadata records and a manifest
//! - [`buildscript`] renders the build makefile
//! - [`listing`] prints dependency and package name lists
//! - [`merge`] concatenates package archives and resolves alternatives
//!
//! The `package-builder` and `merge-rootfs` binaries are thin wrappers over
//! these modules.

pub mod archive;
pub mod buildscript;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod listing;
pub mod logging;
pub mod merge;
pub mod source;
pub mod template;

pub use descriptor::{ExpandedDescriptor, Package, PackageSetDescriptor};
pub use error::PackagingError;
pub use template::ArchPair;

//! User-facing error kinds.
//!
//! Most failures travel as `anyhow::Error` with a context chain. The kinds
//! below are the ones callers need to tell apart, either to pick an exit
//! status or to report a specific mistake in the descriptor.

use thiserror::Error;

/// Exit status for usage mistakes (`EX_USAGE`).
pub const EXIT_USAGE: u8 = 64;

/// Exit status for every other fatal failure (`EX_DATAERR`).
pub const EXIT_FAILURE: u8 = 65;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackagingError {
    /// A source reference uses a scheme we cannot fetch.
    #[error("unrecognized scheme '{scheme}' in source '{reference}'")]
    UnsupportedScheme { scheme: String, reference: String },

    /// A flag the command cannot run without was not given.
    #[error("missing flag: --{0}")]
    MissingFlag(&'static str),

    /// A template data value does not have the shape its consumer needs.
    #[error("template data '{key}' is a {found}, expected a {expected}")]
    DataBagTypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A package name that is not declared in the descriptor.
    #[error("package '{0}' is not declared in the descriptor")]
    UnknownPackage(String),
}

/// Map a terminal error to the process exit status.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PackagingError>() {
        Some(PackagingError::MissingFlag(_)) => EXIT_USAGE,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn missing_flag_is_a_usage_error() {
        let err = anyhow::Error::new(PackagingError::MissingFlag("package"));
        assert_eq!(exit_status(&err), EXIT_USAGE);
        assert_eq!(err.to_string(), "missing flag: --package");
    }

    #[test]
    fn other_kinds_keep_failure_status_through_context() {
        let err = Err::<(), _>(PackagingError::UnsupportedScheme {
            scheme: "ftp".into(),
            reference: "ftp://example.org/a.tar.gz".into(),
        })
        .context("bundling sources")
        .unwrap_err();
        assert_eq!(exit_status(&err), EXIT_FAILURE);
        assert!(matches!(
            err.downcast_ref::<PackagingError>(),
            Some(PackagingError::UnsupportedScheme { .. })
        ));
    }
}

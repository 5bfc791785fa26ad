//! Error taxonomy for the denoising pipeline.
//!
//! Four failure classes cross the library boundary:
//!
//! - [`Error::Config`] — malformed YAML, an invalid regex, a missing field.
//! - [`Error::NotFound`] — a local path or remote resource that does not
//!   exist (HTTP 404, unresolvable host). Kept distinct from [`Error::Io`]
//!   so callers can tell a missing reference from a broken transport.
//! - [`Error::Encoding`] — a byte sequence the active decoder cannot
//!   recover from.
//! - [`Error::Io`] — everything else the OS or transport reports.
//!
//! CLI misuse is handled in the binary and never reaches this enum.

use std::io;

/// Errors produced while fetching, decoding, or configuring artifacts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed configuration: bad YAML, invalid regex, missing field.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local path or remote resource missing / host unresolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid byte sequence with no recovery state.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Transport or file-system failure other than a missing resource.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True when the error denotes a missing resource rather than a
    /// transport failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        fn fails() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into())
        }
        assert!(matches!(fails(), Err(Error::Io(_))));
    }

    #[test]
    fn not_found_is_distinct() {
        let e = Error::NotFound("ref.log".into());
        assert!(e.is_not_found());
        assert!(!Error::Config("x".into()).is_not_found());
        assert_eq!(e.to_string(), "not found: ref.log");
    }
}

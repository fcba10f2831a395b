//! Crate-wide error type.

use crate::css::model::TreeError;
use crate::css::parser::ParseError;
use crate::surface::SurfaceError;

/// Any error raised by the crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_messages() {
        let err: Error = TreeError::NonMonotonicIndex {
            previous: 3,
            found: 1,
        }
        .into();
        assert_eq!(err.to_string(), "rule index 1 does not follow 3 in document order");

        let err: Error = SurfaceError::Injection("closed".into()).into();
        assert!(matches!(err, Error::Surface(_)));
        assert_eq!(err.to_string(), "cannot inject styles: closed");
    }
}

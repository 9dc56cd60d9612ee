// SPDX-License-Identifier: (MIT OR Apache-2.0)

use lenq_exec::ExecError;
use lenq_guard::RewriteError;
use lenq_lower::LowerError;

/// Any failure surfaced by a query.
///
/// Errors from the inner crates are flattened so that a guard failure is
/// always `Error::Rewrite`, whichever stage reported it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Lower(LowerError),

    #[error(transparent)]
    Exec(ExecError),

    #[error("cannot convert {found} to {expected}")]
    Conversion { expected: &'static str, found: String },

    #[error("expression of type `{ty}` is not a queryable")]
    NotAQueryable { ty: String },
}

impl From<LowerError> for Error {
    fn from(err: LowerError) -> Self {
        match err {
            LowerError::Rewrite(err) => Error::Rewrite(err),
            other => Error::Lower(other),
        }
    }
}

impl From<ExecError> for Error {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Lower(err) => err.into(),
            other => Error::Exec(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_errors_flatten() {
        let rewrite = RewriteError::UnsupportedNode { kind: "Lambda" };
        let err: Error = ExecError::Lower(LowerError::Rewrite(rewrite.clone())).into();
        assert_eq!(err, Error::Rewrite(rewrite));

        let err: Error = ExecError::EmptySequence.into();
        assert_eq!(err, Error::Exec(ExecError::EmptySequence));
        assert_eq!(err.to_string(), "sequence contains no elements");
    }
}

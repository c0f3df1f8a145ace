#![deny(missing_docs)]

//! Error handling for Arbor.
//!
//! Every fallible operation in the workspace returns an [`ArborResult`]. Errors are constructed
//! with [`arbor_err!`] and returned early with [`arbor_bail!`], both of which take the variant
//! name followed by a format string:
//!
//! ```
//! use arbor_error::{arbor_bail, ArborError, ArborResult};
//!
//! fn lookup(name: &str) -> ArborResult<()> {
//!     arbor_bail!(UnmatchedPattern: "Pattern '{}' didn't match any column", name)
//! }
//!
//! assert!(matches!(lookup("x*"), Err(ArborError::UnmatchedPattern(..))));
//! ```

mod ext;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use arrow_schema::ArrowError;
pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The backtrace captured when an [`ArborError`] is created.
///
/// Printed as part of the error message; not exposed through `Error::provide`.
pub struct ErrBacktrace(Backtrace);

impl ErrBacktrace {
    /// Capture the current backtrace, subject to `RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`.
    #[inline]
    pub fn capture() -> Self {
        Self(Backtrace::capture())
    }

    /// The captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.0
    }
}

impl Display for ErrBacktrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ErrBacktrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

/// The top-level error type for Arbor.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum ArborError {
    /// The source file exposes zero or several trees and none was named.
    #[error("{0}\nBacktrace:\n{1}")]
    AmbiguousSource(ErrString, ErrBacktrace),
    /// An include specifier matched no column of the schema.
    #[error("{0}\nBacktrace:\n{1}")]
    UnmatchedPattern(ErrString, ErrBacktrace),
    /// The index column was selected by an ignore specifier.
    #[error("{0}\nBacktrace:\n{1}")]
    ForbiddenIgnore(ErrString, ErrBacktrace),
    /// More than one index column is present.
    #[error("{0}\nBacktrace:\n{1}")]
    AmbiguousIndex(ErrString, ErrBacktrace),
    /// A flatten request names a scalar column, or a column that was never read.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidFlatten(ErrString, ErrBacktrace),
    /// Array columns flattened together disagree in length within a row.
    #[error("{0}\nBacktrace:\n{1}")]
    InconsistentLengths(ErrString, ErrBacktrace),
    /// A table to be written has repeated column names.
    #[error("{0}\nBacktrace:\n{1}")]
    DuplicateColumns(ErrString, ErrBacktrace),
    /// The requested tree does not exist in a file.
    #[error("{0}\nBacktrace:\n{1}")]
    MissingKey(ErrString, ErrBacktrace),
    /// An index or a row range is out of bounds.
    #[error("{0}\nBacktrace:\n{1}")]
    OutOfBounds(ErrString, ErrBacktrace),
    /// Two schemas or types that must agree do not.
    #[error("{0}\nBacktrace:\n{1}")]
    MismatchedTypes(ErrString, ErrBacktrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, ErrBacktrace),
    /// The requested operation is not supported by a storage engine.
    #[error("{0}\nBacktrace:\n{1}")]
    NotImplemented(ErrString, ErrBacktrace),
    /// A wrapped error from the Arrow library.
    #[error("{0}\nBacktrace:\n{1}")]
    ArrowError(ArrowError, ErrBacktrace),
    /// A wrapped error with extra context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<ArborError>),
}

impl ArborError {
    /// Adds information about the context of an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        ArborError::Context(msg.into(), Box::new(self))
    }

    /// The innermost error, with every [`ArborError::Context`] layer removed.
    pub fn root_cause(&self) -> &ArborError {
        let mut err = self;
        while let ArborError::Context(_, inner) = err {
            err = inner;
        }
        err
    }
}

impl Debug for ArborError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<ArrowError> for ArborError {
    fn from(value: ArrowError) -> Self {
        ArborError::ArrowError(value, ErrBacktrace::capture())
    }
}

/// A type alias for Results that return [`ArborError`]s as their error type.
pub type ArborResult<T> = Result<T, ArborError>;

/// A convenient macro for creating an [`ArborError`].
///
/// The first token names the variant, e.g. `arbor_err!(OutOfBounds: "...", args)`. Without a
/// variant name the error is an [`ArborError::InvalidArgument`].
#[macro_export]
macro_rules! arbor_err {
    (Context: $msg:literal, $err:expr) => {{
        $crate::ArborError::Context($msg.into(), Box::new($err))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        $crate::ArborError::$variant(
            format!($fmt, $($arg),*).into(),
            $crate::ErrBacktrace::capture(),
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::arbor_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning an [`ArborError`] from the enclosing function.
#[macro_export]
macro_rules! arbor_bail {
    ($($tt:tt)+) => {
        return Err($crate::arbor_err!($($tt)+))
    };
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use arrow_schema::ArrowError;

    use crate::{ArborError, ArborResult};

    fn failing(column: &str) -> ArborResult<()> {
        arbor_bail!(InvalidFlatten: "Requested to flatten {} but it has a scalar type", column)
    }

    #[test]
    fn bail_uses_named_variant() {
        let err = failing("x").unwrap_err();
        assert!(matches!(err, ArborError::InvalidFlatten(..)));
        assert!(err.to_string().starts_with("Requested to flatten x"));
    }

    #[test]
    fn default_variant_is_invalid_argument() {
        let err = arbor_err!("bad mode {}", "q");
        assert!(matches!(err, ArborError::InvalidArgument(..)));
    }

    #[test]
    fn root_cause_skips_context() {
        let err = arbor_err!(MissingKey: "no tree 't'")
            .with_context("reading a.root")
            .with_context("reading chunk 0");
        assert!(matches!(err.root_cause(), ArborError::MissingKey(..)));
        assert!(err.to_string().starts_with("reading chunk 0: reading a.root: no tree 't'"));
    }

    #[test]
    fn backtrace_is_part_of_the_message() {
        let err = arbor_err!(OutOfBounds: "row {} out of range", 7);
        let ArborError::OutOfBounds(msg, backtrace) = &err else {
            unreachable!()
        };
        assert_eq!(msg.as_ref(), "row 7 out of range");
        assert_eq!(
            err.to_string(),
            format!("row 7 out of range\nBacktrace:\n{}", backtrace)
        );
        assert!(err.source().is_none());
    }

    #[test]
    fn context_exposes_its_source() {
        let err = ArborError::from(ArrowError::ComputeError("boom".to_string()))
            .with_context("extracting chunk");
        assert!(err.source().is_some());
        assert!(matches!(err.root_cause(), ArborError::ArrowError(..)));
    }
}

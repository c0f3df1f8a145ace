use crate::{ArborResult, ErrString};

/// Extension trait for [`ArborResult`].
pub trait ResultExt<T>: private::Sealed {
    /// Wrap the error, if any, with a lazily built context message.
    fn with_context<M, F>(self, msg: F) -> ArborResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M;
}

mod private {
    use crate::ArborResult;

    pub trait Sealed {}

    impl<T> Sealed for ArborResult<T> {}
}

impl<T> ResultExt<T> for ArborResult<T> {
    fn with_context<M, F>(self, msg: F) -> ArborResult<T>
    where
        M: Into<ErrString>,
        F: FnOnce() -> M,
    {
        self.map_err(|err| err.with_context(msg()))
    }
}

use std::time::Duration;

/// The outcome of a failed [`Invoker::execute`](crate::Invoker::execute).
///
/// Apart from [`Failed`](Self::Failed), which carries the error of the wrapped computation
/// untouched, every variant only concerns the caller that observed it. In particular, a timed out
/// caller does not affect the computation or the other callers waiting for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The wrapped computation failed.
    ///
    /// Every caller sharing the computation receives a clone of the same error.
    #[error(transparent)]
    Failed(E),
    /// This caller gave up waiting for the result.
    #[error("gave up waiting for the computation after {0:?}")]
    Timeout(Duration),
    /// The computation ended without producing a result, most likely because it panicked.
    #[error("the computation was aborted before producing a result")]
    Aborted,
}

impl<E> ExecuteError<E> {
    /// Returns the error of the wrapped computation, if that is what failed.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Converts into the error of the wrapped computation, if that is what failed.
    pub fn into_failure(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// A short name of the variant, used to tag metrics.
    pub(crate) fn metrics_tag(&self) -> &'static str {
        match self {
            Self::Failed(_) => "failed",
            Self::Timeout(_) => "timeout",
            Self::Aborted => "aborted",
        }
    }
}

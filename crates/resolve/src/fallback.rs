//! Sequential fallback across an ordered list of operations.

use std::future::Future;
use std::pin::Pin;

/// Why no operation in a fallback chain succeeded.
#[derive(Debug)]
pub enum FallbackError<E> {
    /// An operation failed in a way that must not be papered over by the
    /// next candidate. Failures recorded before it are included.
    Fatal {
        /// The fatal failure.
        error: E,
        /// Recoverable failures seen before it, in order.
        previous: Vec<E>,
    },
    /// Every operation failed recoverably; failures are in attempt order.
    Exhausted(Vec<E>),
}

impl<E> FallbackError<E> {
    /// All recorded failures in attempt order (the fatal one last).
    #[must_use]
    pub fn into_failures(self) -> Vec<E> {
        match self {
            Self::Fatal {
                error,
                mut previous,
            } => {
                previous.push(error);
                previous
            }
            Self::Exhausted(failures) => failures,
        }
    }
}

/// Boxed fallible operation for building a chain in a loop.
pub type Attempt<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Await `attempts` in order and return the first success.
///
/// A failure for which `recoverable` returns true moves on to the next
/// attempt; any other failure stops the chain. Futures are inert until
/// awaited, so later attempts never start once one succeeds.
pub async fn first_success<T, E, I, Fut>(
    attempts: I,
    recoverable: impl Fn(&E) -> bool,
) -> Result<T, FallbackError<E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut failures = Vec::new();
    for attempt in attempts {
        match attempt.await {
            Ok(value) => return Ok(value),
            Err(error) if recoverable(&error) => failures.push(error),
            Err(error) => {
                return Err(FallbackError::Fatal {
                    error,
                    previous: failures,
                });
            }
        }
    }
    Err(FallbackError::Exhausted(failures))
}

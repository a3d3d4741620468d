use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::container::binding::BindingError;

/// Handle to an asynchronous resolution.
///
/// Either already completed (inline resolution, or a failure before any work
/// was submitted) or backed by a task on the context executor.
pub struct Pending<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Ready(Option<Result<T, BindingError>>),
    Spawned(JoinHandle<Result<T, BindingError>>),
}

impl<T> Pending<T> {
    pub(crate) fn ready(result: Result<T, BindingError>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    pub(crate) fn spawned(handle: JoinHandle<Result<T, BindingError>>) -> Self {
        Self {
            state: PendingState::Spawned(handle),
        }
    }

    /// Whether awaiting would complete without suspending
    pub fn is_finished(&self) -> bool {
        match &self.state {
            PendingState::Ready(_) => true,
            PendingState::Spawned(handle) => handle.is_finished(),
        }
    }

    /// Whether the work runs on the executor
    pub fn is_spawned(&self) -> bool {
        matches!(self.state, PendingState::Spawned(_))
    }
}

// T is never pinned structurally
impl<T> Unpin for Pending<T> {}

impl<T> Future for Pending<T> {
    type Output = Result<T, BindingError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(slot) => Poll::Ready(slot.take().unwrap_or_else(|| {
                Err(BindingError::Executor {
                    message: "resolution polled after completion".to_string(),
                })
            })),
            PendingState::Spawned(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join_error)) => Poll::Ready(Err(BindingError::Executor {
                    message: join_error.to_string(),
                })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl<T> std::fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("spawned", &self.is_spawned())
            .field("finished", &self.is_finished())
            .finish()
    }
}

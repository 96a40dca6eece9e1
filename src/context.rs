use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::SwarmLimitError;

/// Per-call deadline, cancellation and trace parent.
///
/// The default context has none of them: store commands are then bounded
/// only by the store's own command timeout, and no spans are emitted.
///
/// ```
/// use std::time::Duration;
/// use swarmlimit::CallContext;
///
/// let ctx = CallContext::background()
///     .with_timeout(Duration::from_millis(50))
///     .with_parent_span(tracing::Span::current());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancellation: Option<CancellationToken>,
    parent_span: Option<Span>,
}

impl CallContext {
    /// Empty context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Abort the call once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abort the call once `timeout` elapsed from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Abort the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Emit query spans as children of `span`.
    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.parent_span = Some(span);
        self
    }

    pub(crate) fn parent_span(&self) -> Option<&Span> {
        self.parent_span.as_ref()
    }

    /// Drive `fut` to completion unless the deadline or the cancellation
    /// token fires first, in which case the in-flight future is dropped.
    pub(crate) async fn run<T, F>(&self, fut: F) -> Result<T, SwarmLimitError>
    where
        F: Future<Output = Result<T, SwarmLimitError>>,
    {
        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .unwrap_or(Err(SwarmLimitError::Canceled)),
                None => fut.await,
            }
        };

        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(SwarmLimitError::Canceled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}

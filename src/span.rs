use tracing::{Span, field};

use crate::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpanName {
    Allow,
    OldestScore,
}

/// Span around one store query.
///
/// Only created under an enabled parent span; otherwise every method is a
/// no-op and the admission path runs unchanged.
#[derive(Debug)]
pub(crate) struct QuerySpan {
    span: Option<Span>,
}

impl QuerySpan {
    pub(crate) fn start(parent: Option<&Span>, name: SpanName, settings: &Settings) -> Self {
        let Some(parent) = parent.filter(|parent| !parent.is_disabled()) else {
            return Self { span: None };
        };

        let span = match name {
            SpanName::Allow => tracing::info_span!(
                parent: parent,
                "redis_allow",
                component = "swarmlimit",
                span.kind = "client",
                ratelimit_type = %settings.kind,
                group = %settings.group,
                max_hits = *settings.max_hits,
                window = ?*settings.window,
                error = field::Empty,
            ),
            SpanName::OldestScore => tracing::info_span!(
                parent: parent,
                "redis_oldest_score",
                component = "swarmlimit",
                span.kind = "client",
                ratelimit_type = %settings.kind,
                group = %settings.group,
                max_hits = *settings.max_hits,
                window = ?*settings.window,
                error = field::Empty,
            ),
        };

        Self { span: Some(span) }
    }

    /// Span to instrument the query future with; disabled when no parent.
    pub(crate) fn span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::none)
    }

    pub(crate) fn finish(self, failed: bool) {
        if let Some(span) = self.span {
            if failed {
                span.record("error", true);
            }
        }
    }
}

//! Lifecycle hooks invoked at span start and span finish.
//!
//! Hooks are user-supplied callables; a misbehaving hook must never break
//! request handling, so every invocation is panic-isolated and a panicking
//! hook is treated as [`HookOutcome::Continue`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use opentelemetry::global::BoxedSpan;

use crate::tracer::{RequestHead, RequestOutcome};

/// What the interceptor should do after a hook returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HookOutcome {
    /// Proceed with the default behavior.
    #[default]
    Continue,
    /// The hook took over the remaining span lifecycle step.
    ///
    /// Returned from a start hook, the span is not registered and the hook
    /// owns it from this point on. Returned from a finish hook, the default
    /// [`end`] call is skipped and the hook is responsible for closing the
    /// span.
    ///
    /// [`end`]: opentelemetry::trace::Span::end
    Suppress,
}

/// Hook invoked right after a request span has been started and tagged.
pub type StartHook =
    Arc<dyn for<'a> Fn(&mut BoxedSpan, &RequestHead<'a>) -> HookOutcome + Send + Sync>;

/// Hook invoked right before a request span is finished.
pub type FinishHook =
    Arc<dyn for<'a, 'b> Fn(&mut BoxedSpan, &'a RequestOutcome<'b>) -> HookOutcome + Send + Sync>;

pub(crate) fn run_start_hook(
    hook: &StartHook,
    span: &mut BoxedSpan,
    head: &RequestHead<'_>,
) -> HookOutcome {
    match catch_unwind(AssertUnwindSafe(|| hook(span, head))) {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!("span start hook panicked, continuing without it");
            HookOutcome::Continue
        }
    }
}

pub(crate) fn run_finish_hook(
    hook: &FinishHook,
    span: &mut BoxedSpan,
    outcome: &RequestOutcome<'_>,
) -> HookOutcome {
    match catch_unwind(AssertUnwindSafe(|| hook(span, outcome))) {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!("span finish hook panicked, continuing without it");
            HookOutcome::Continue
        }
    }
}

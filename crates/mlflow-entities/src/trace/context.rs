use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use tokio::task_local;
use tracing::warn;

use crate::trace::live::LiveSpan;

thread_local! {
    static SPAN_STACK: RefCell<Vec<LiveSpan>> = const { RefCell::new(Vec::new()) };
}

task_local! {
    static TASK_STACK: RefCell<Vec<LiveSpan>>;
}

/// Returns the innermost span active on this call stack, if any.
///
/// Inside a traced future every span, synchronous or not, is kept on a stack
/// owned by that future, so siblings polled on the same thread never see it.
/// Outside of one, the per-thread stack is used.
pub fn active_span() -> Option<LiveSpan> {
    TASK_STACK
        .try_with(|stack| stack.borrow().last().cloned())
        .unwrap_or_else(|_| SPAN_STACK.with(|stack| stack.borrow().last().cloned()))
}

/// Returns `true` if a span is active on this call stack.
pub fn is_tracing() -> bool {
    active_span().is_some()
}

/// Removes its span from the stack it was pushed on when dropped, on every
/// exit path.
pub(crate) struct StackEntry {
    span_id: String,
    in_task: bool,
    // Must be dropped on the thread that pushed it.
    _not_send: PhantomData<*const ()>,
}

pub(crate) fn enter(span: &LiveSpan) -> StackEntry {
    let in_task = TASK_STACK
        .try_with(|stack| stack.borrow_mut().push(span.clone()))
        .is_ok();
    if !in_task {
        SPAN_STACK.with(|stack| stack.borrow_mut().push(span.clone()));
    }
    StackEntry {
        span_id: span.span_id().to_string(),
        in_task,
        _not_send: PhantomData,
    }
}

impl Drop for StackEntry {
    fn drop(&mut self) {
        if !self.in_task {
            SPAN_STACK.with(|stack| remove(&mut stack.borrow_mut(), &self.span_id));
        } else if TASK_STACK
            .try_with(|stack| remove(&mut stack.borrow_mut(), &self.span_id))
            .is_err()
        {
            warn!(span_id = %self.span_id, "span guard dropped outside the future that entered it");
        }
    }
}

fn remove(stack: &mut Vec<LiveSpan>, span_id: &str) {
    match stack.iter().rposition(|span| span.span_id() == span_id) {
        Some(idx) if idx + 1 == stack.len() => {
            stack.pop();
        }
        Some(idx) => {
            warn!(span_id, "span guard dropped out of order");
            stack.remove(idx);
        }
        None => {}
    }
}

/// Runs `fut` with `span` at the bottom of a span stack private to `fut`.
pub(crate) async fn scope<F: Future>(span: LiveSpan, fut: F) -> F::Output {
    TASK_STACK.scope(RefCell::new(vec![span]), fut).await
}

//! Relations between two half-open spans.
//!
//! Every predicate treats spans as `[start, end)`: a span ending exactly when
//! another begins does not overlap it. Callers reject degenerate windows
//! (`start >= end`) before asking.

use crate::model::Span;

use super::EngineError;

/// `a` spans the entire window.
pub fn fully_covers(a: &Span, window: &Span) -> bool {
    a.end >= window.end && a.start <= window.start
}

/// Exactly one endpoint of `a` falls strictly inside `window`.
pub fn partially_overlaps(a: &Span, window: &Span) -> bool {
    let end_inside = window.end > a.end && a.end > window.start;
    let start_inside = window.end > a.start && a.start > window.start;
    end_inside != start_inside
}

pub fn overlaps(a: &Span, b: &Span) -> bool {
    a.start < b.end && b.start < a.end
}

/// `a` contains `b`.
pub fn contains(a: &Span, b: &Span) -> bool {
    a.start <= b.start && b.end <= a.end
}

/// `a` lies within `b`.
pub fn contained_in(a: &Span, b: &Span) -> bool {
    contains(b, a)
}

/// Reject a window that is empty or inverted.
pub(crate) fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start >= window.end {
        return Err(EngineError::Chronology {
            start: window.start,
            end: window.end,
        });
    }
    Ok(())
}

use chrono::{DateTime, FixedOffset, NaiveDate};
use tracing::warn;

use crate::model::*;
use crate::repository::RecordFilter;

use super::{Engine, EngineError};

/// Calendar day of an instant.
fn day_of(t: Ms, offset: &FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(t).map(|dt| dt.with_timezone(offset).date_naive())
}

/// First and last calendar day a span touches. The end is exclusive, so the
/// last day is the day of the instant just before it.
fn day_range(span: &Span, offset: &FixedOffset) -> Option<(NaiveDate, NaiveDate)> {
    Some((day_of(span.start, offset)?, day_of(span.end - 1, offset)?))
}

/// Per-day count of spans touching each day, from the earliest start day to
/// the latest end day inclusive. Empty input gives an empty result.
pub fn daily_counts(spans: &[Span], offset: &FixedOffset) -> Vec<DailyCount> {
    let days: Vec<(NaiveDate, NaiveDate)> = spans
        .iter()
        .filter_map(|span| {
            let range = day_range(span, offset);
            if range.is_none() {
                warn!(start = span.start, end = span.end, "span outside calendar range, skipped");
            }
            range
        })
        .collect();

    let (Some(first), Some(last)) = (
        days.iter().map(|(start, _)| *start).min(),
        days.iter().map(|(_, end)| *end).max(),
    ) else {
        return Vec::new();
    };

    // Sweep line over day offsets: +1 on the first day, -1 the day after the last.
    let len = last.signed_duration_since(first).num_days() as usize + 1;
    let mut delta = vec![0i64; len + 1];
    for (start, end) in &days {
        delta[start.signed_duration_since(first).num_days() as usize] += 1;
        delta[end.signed_duration_since(first).num_days() as usize + 1] -= 1;
    }

    let mut running = 0i64;
    first
        .iter_days()
        .zip(delta)
        .take(len)
        .map(|(date, d)| {
            running += d;
            DailyCount {
                date,
                count: running as usize,
            }
        })
        .collect()
}

impl Engine {
    /// Daily counts over every Available record, all owners.
    pub async fn compute_daily_counts(&self) -> Result<Vec<DailyCount>, EngineError> {
        let start = std::time::Instant::now();
        let available = self
            .repo
            .query(&RecordFilter::with_statuses(&[Status::Available]))
            .await?;
        let spans: Vec<Span> = available.iter().map(|r| r.span).collect();
        let counts = daily_counts(&spans, &self.report_offset);
        metrics::histogram!(crate::observability::QUERY_DURATION_SECONDS, "query" => "daily_counts")
            .record(start.elapsed().as_secs_f64());
        Ok(counts)
    }
}

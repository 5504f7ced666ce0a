//! Resolution of [`TimeWindow`]s into concrete begin/end timestamps.

use chrono::{DateTime, Months, Utc};
use serde::Serialize;

use crate::model::TimeWindow;

/// Concrete bounds of a window, with human-readable labels for each end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowBounds {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub begin_label: String,
    pub end_label: String,
}

impl TimeWindow {
    /// Resolve this window to concrete bounds.
    ///
    /// Fixed windows end at `now` and start a fixed calendar distance
    /// before it; `dates` is ignored for them. [`TimeWindow::AllTime`]
    /// spans the earliest to the latest of `dates` and resolves to `None`
    /// when fewer than two distinct dates are known.
    pub fn resolve(self, dates: &[DateTime<Utc>], now: DateTime<Utc>) -> Option<WindowBounds> {
        let (begin, end) = match self {
            TimeWindow::Day => (now - chrono::Duration::days(1), now),
            TimeWindow::Week => (now - chrono::Duration::days(7), now),
            TimeWindow::Month => (months_before(now, 1), now),
            TimeWindow::Year => (months_before(now, 12), now),
            TimeWindow::AllTime => {
                let begin = dates.iter().min().copied()?;
                let end = dates.iter().max().copied()?;
                if begin == end {
                    return None;
                }
                (begin, end)
            }
        };

        let format = self.label_format();
        Some(WindowBounds {
            begin,
            end,
            begin_label: begin.format(format).to_string(),
            end_label: end.format(format).to_string(),
        })
    }

    fn label_format(&self) -> &'static str {
        match self {
            TimeWindow::Day => "%H:%M",
            TimeWindow::Week => "%a %d",
            TimeWindow::Month => "%d %b",
            TimeWindow::Year => "%b %Y",
            TimeWindow::AllTime => "%d %b %Y",
        }
    }
}

/// `now` minus whole calendar months, clamped to the end of shorter months.
fn months_before(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or_else(|| now - chrono::Duration::days(30 * i64::from(months)))
}

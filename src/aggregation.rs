//! Downsampling of request statistics into chart points.
//!
//! [`downsample`] is a pure transformation: it takes one category's records
//! and a [`TimeWindow`] and returns at most [`MAX_CHART_POINTS`] points plus
//! the window's totals. [`compute_chart`] is the storage-facing wrapper that
//! charts both categories at once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::model::{ChartPoint, DownsampleResult, RequestRecord, StatisticsCategory, TimeWindow};
use crate::storage::Storage;
use crate::window::WindowBounds;

/// Upper bound on the number of points handed to a chart.
pub const MAX_CHART_POINTS: usize = 50;

/// Downsample `records` for `window`, relative to the current time.
pub fn downsample(records: &[RequestRecord], window: TimeWindow) -> DownsampleResult {
    downsample_at(records, window, Utc::now())
}

/// Downsample `records` for `window`, relative to `now`.
///
/// Records are taken in input order, not date order. Under a fixed window a
/// record is kept only if its date lies strictly between the window's begin
/// and end. Under [`TimeWindow::AllTime`] the bounds come from the records
/// themselves, so every record is kept; fewer than two distinct dates gives
/// an empty result.
///
/// Each kept record becomes one point with a dense x index. When more than
/// [`MAX_CHART_POINTS`] points result they are merged by
/// [`rearrange_points`].
pub fn downsample_at(
    records: &[RequestRecord],
    window: TimeWindow,
    now: DateTime<Utc>,
) -> DownsampleResult {
    let dates: Vec<DateTime<Utc>> = records.iter().map(|r| r.date).collect();
    let Some(bounds) = window.resolve(&dates, now) else {
        return DownsampleResult::default();
    };

    let mut points = Vec::new();
    let mut request_total: i64 = 0;
    let mut saved_kilobytes: i64 = 0;

    for record in records {
        let inside = record.date > bounds.begin && record.date < bounds.end;
        if !(inside || window.is_all_time()) {
            continue;
        }

        points.push(ChartPoint {
            x: points.len(),
            y: record.request_count,
        });
        request_total = request_total.saturating_add(record.request_count);
        saved_kilobytes = saved_kilobytes.saturating_add(record.saved_kilobytes);
    }

    DownsampleResult {
        points: rearrange_points(points),
        request_total,
        saved_kilobytes,
    }
}

/// Cap `points` at [`MAX_CHART_POINTS`].
///
/// Shorter sequences are returned as-is. Longer ones are split, in order,
/// into groups of `ceil(len / MAX_CHART_POINTS)` points (the last group may
/// be shorter); each group collapses into one point whose y is the group's
/// sum and whose x is the group's index. Sums saturate at the `i64` bounds.
pub fn rearrange_points(points: Vec<ChartPoint>) -> Vec<ChartPoint> {
    if points.len() <= MAX_CHART_POINTS {
        return points;
    }

    let ratio = points.len().div_ceil(MAX_CHART_POINTS);
    points
        .chunks(ratio)
        .enumerate()
        .map(|(x, group)| ChartPoint {
            x,
            y: group.iter().fold(0i64, |sum, p| sum.saturating_add(p.y)),
        })
        .collect()
}

/// Chart data for both statistics categories over one window.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    /// Window the snapshot was computed for.
    pub window: TimeWindow,

    /// Bounds of the window, resolved against the "all" category's dates.
    ///
    /// `None` under `all_time` when there is not enough data to span a range.
    pub bounds: Option<WindowBounds>,

    /// Every request seen.
    pub requests: DownsampleResult,

    /// Blocked requests and the bandwidth they saved.
    pub blocked: DownsampleResult,

    /// When the snapshot was computed.
    pub generated_at: DateTime<Utc>,
}

/// Read both categories from storage and downsample them for `window`.
///
/// # Arguments
///
/// * `storage` - Statistics store
/// * `window` - Reporting window
/// * `now` - Reference timestamp (typically current time)
pub async fn compute_chart(
    storage: &Storage,
    window: TimeWindow,
    now: DateTime<Utc>,
) -> anyhow::Result<ChartSnapshot> {
    let statistics = storage.read_statistics().await?;
    let empty = Vec::new();
    let all = statistics.get(&StatisticsCategory::All).unwrap_or(&empty);
    let blocked = statistics
        .get(&StatisticsCategory::Blocked)
        .unwrap_or(&empty);

    let dates: Vec<DateTime<Utc>> = all.iter().map(|r| r.date).collect();
    let bounds = window.resolve(&dates, now);

    let requests = downsample_at(all, window, now);
    let blocked = downsample_at(blocked, window, now);

    debug!(
        window = %window,
        request_points = requests.points.len(),
        blocked_points = blocked.points.len(),
        requests_total = requests.request_total,
        blocked_total = blocked.request_total,
        "Chart computed"
    );

    Ok(ChartSnapshot {
        window,
        bounds,
        requests,
        blocked,
        generated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> DateTime<Utc> {
        now() - chrono::Duration::hours(hours)
    }

    /// `count` records inside the last year, one per hour, each with `y = 1`.
    fn hourly_records(count: usize) -> Vec<RequestRecord> {
        (0..count)
            .map(|i| RequestRecord::new(hours_ago(i as i64 + 1), 1))
            .collect()
    }

    #[test]
    fn test_downsample_empty() {
        for window in TimeWindow::ALL {
            let result = downsample_at(&[], window, now());
            assert_eq!(result, DownsampleResult::default());
        }
    }

    #[test]
    fn test_points_follow_input_order() {
        let records = vec![
            RequestRecord::new(hours_ago(2), 7),
            RequestRecord::new(hours_ago(10), 3),
            RequestRecord::new(hours_ago(5), 4),
        ];

        let result = downsample_at(&records, TimeWindow::Day, now());

        assert_eq!(
            result.points,
            vec![
                ChartPoint { x: 0, y: 7 },
                ChartPoint { x: 1, y: 3 },
                ChartPoint { x: 2, y: 4 },
            ]
        );
        assert_eq!(result.request_total, 14);
    }

    #[test]
    fn test_fixed_window_excludes_outside_and_boundaries() {
        let records = vec![
            RequestRecord::new(hours_ago(24), 100), // exactly begin
            RequestRecord::new(hours_ago(3), 2).with_saved_kilobytes(10),
            RequestRecord::new(now(), 100), // exactly end
            RequestRecord::new(hours_ago(48), 100),
            RequestRecord::new(hours_ago(1), 5).with_saved_kilobytes(20),
        ];

        let result = downsample_at(&records, TimeWindow::Day, now());

        assert_eq!(
            result.points,
            vec![ChartPoint { x: 0, y: 2 }, ChartPoint { x: 1, y: 5 }]
        );
        assert_eq!(result.request_total, 7);
        assert_eq!(result.saved_kilobytes, 30);
    }

    #[test]
    fn test_all_time_includes_boundary_records() {
        let d1 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let d2 = Utc.with_ymd_and_hms(2019, 6, 1, 0, 0, 0).unwrap();
        let records = vec![RequestRecord::new(d1, 5), RequestRecord::new(d2, 3)];

        let result = downsample_at(&records, TimeWindow::AllTime, now());

        assert_eq!(
            result.points,
            vec![ChartPoint { x: 0, y: 5 }, ChartPoint { x: 1, y: 3 }]
        );
        assert_eq!(result.request_total, 8);
    }

    #[test]
    fn test_all_time_single_date_is_empty() {
        let date = hours_ago(30);
        let records = vec![
            RequestRecord::new(date, 42).with_saved_kilobytes(9),
            RequestRecord::new(date, 8),
        ];

        let result = downsample_at(&records, TimeWindow::AllTime, now());

        assert!(result.is_empty());
    }

    #[test]
    fn test_all_time_ignores_now() {
        let future = now() + chrono::Duration::days(400);
        let records = vec![
            RequestRecord::new(hours_ago(24 * 900), 1),
            RequestRecord::new(future, 2),
        ];

        let result = downsample_at(&records, TimeWindow::AllTime, now());
        assert_eq!(result.points.len(), 2);

        let result = downsample_at(&records, TimeWindow::Year, now());
        assert!(result.points.is_empty());
    }

    #[test]
    fn test_exactly_max_points_unmodified() {
        let records = hourly_records(MAX_CHART_POINTS);

        let result = downsample_at(&records, TimeWindow::Week, now());

        assert_eq!(result.points.len(), MAX_CHART_POINTS);
        for (i, point) in result.points.iter().enumerate() {
            assert_eq!(point.x, i);
            assert_eq!(point.y, 1);
        }
    }

    #[test]
    fn test_one_hundred_twenty_records() {
        let records = hourly_records(120);

        let result = downsample_at(&records, TimeWindow::Week, now());

        assert_eq!(result.points.len(), 40);
        assert!(result.points.iter().all(|p| p.y == 3));
        assert_eq!(result.points.iter().map(|p| p.y).sum::<i64>(), 120);
        assert_eq!(result.request_total, 120);
        assert_eq!(result.points[39].x, 39);
    }

    #[test]
    fn test_short_last_group() {
        // 51 points -> ratio 2 -> 25 full pairs and one single point.
        let points: Vec<ChartPoint> = (0..51).map(|i| ChartPoint { x: i, y: i as i64 }).collect();

        let rearranged = rearrange_points(points);

        assert_eq!(rearranged.len(), 26);
        assert_eq!(rearranged[0], ChartPoint { x: 0, y: 1 });
        assert_eq!(rearranged[24], ChartPoint { x: 24, y: 48 + 49 });
        assert_eq!(rearranged[25], ChartPoint { x: 25, y: 50 });
    }

    #[test]
    fn test_downsampling_caps_and_preserves_sum() {
        for count in [0usize, 1, 49, 50, 51, 99, 100, 101, 149, 150, 151, 1_000, 8_761] {
            let points: Vec<ChartPoint> = (0..count)
                .map(|i| ChartPoint {
                    x: i,
                    y: (i % 7) as i64,
                })
                .collect();
            let input_sum: i64 = points.iter().map(|p| p.y).sum();

            let rearranged = rearrange_points(points);

            assert!(rearranged.len() <= MAX_CHART_POINTS, "count {count}");
            assert_eq!(rearranged.iter().map(|p| p.y).sum::<i64>(), input_sum);
            if count > MAX_CHART_POINTS {
                let ratio = count.div_ceil(MAX_CHART_POINTS);
                assert_eq!(rearranged.len(), count.div_ceil(ratio), "count {count}");
            } else {
                assert_eq!(rearranged.len(), count);
            }
            for (i, point) in rearranged.iter().enumerate() {
                assert_eq!(point.x, i);
            }
        }
    }

    #[test]
    fn test_downsample_uses_current_time() {
        let recent = Utc::now() - chrono::Duration::minutes(30);
        let stale = Utc::now() - chrono::Duration::days(3);
        let records = vec![RequestRecord::new(recent, 2), RequestRecord::new(stale, 9)];

        let result = downsample(&records, TimeWindow::Day);

        assert_eq!(result.points, vec![ChartPoint { x: 0, y: 2 }]);
        assert_eq!(downsample(&records, TimeWindow::Week).request_total, 11);
    }

    #[test]
    fn test_totals_saturate_instead_of_overflowing() {
        let records = vec![
            RequestRecord::new(hours_ago(2), i64::MAX).with_saved_kilobytes(i64::MAX),
            RequestRecord::new(hours_ago(1), i64::MAX).with_saved_kilobytes(1),
        ];

        let result = downsample_at(&records, TimeWindow::Day, now());

        assert_eq!(result.request_total, i64::MAX);
        assert_eq!(result.saved_kilobytes, i64::MAX);
        assert_eq!(result.points.len(), 2);

        let points: Vec<ChartPoint> = (0..60).map(|x| ChartPoint { x, y: i64::MAX }).collect();
        let rearranged = rearrange_points(points);
        assert_eq!(rearranged.len(), 30);
        assert!(rearranged.iter().all(|p| p.y == i64::MAX));
    }

    #[test]
    fn test_counts_are_not_clamped() {
        let records = vec![
            RequestRecord::new(hours_ago(2), -4),
            RequestRecord::new(hours_ago(1), 0),
        ];

        let result = downsample_at(&records, TimeWindow::Day, now());

        assert_eq!(result.request_total, -4);
        assert_eq!(result.points[0].y, -4);
    }

    #[tokio::test]
    async fn test_compute_chart_empty_store() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        let chart = compute_chart(&storage, TimeWindow::Day, now()).await.unwrap();

        assert!(chart.requests.is_empty());
        assert!(chart.blocked.is_empty());
        assert!(chart.bounds.is_some());

        let chart = compute_chart(&storage, TimeWindow::AllTime, now())
            .await
            .unwrap();
        assert!(chart.bounds.is_none());
    }

    #[tokio::test]
    async fn test_compute_chart_both_categories() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        for hours in [1, 2, 3] {
            storage
                .insert_record(StatisticsCategory::All, &RequestRecord::new(hours_ago(hours), 10))
                .await
                .unwrap();
        }
        storage
            .insert_record(
                StatisticsCategory::Blocked,
                &RequestRecord::new(hours_ago(2), 4).with_saved_kilobytes(64),
            )
            .await
            .unwrap();

        let chart = compute_chart(&storage, TimeWindow::Day, now()).await.unwrap();

        assert_eq!(chart.window, TimeWindow::Day);
        assert_eq!(chart.requests.points.len(), 3);
        assert_eq!(chart.requests.request_total, 30);
        assert_eq!(chart.blocked.points, vec![ChartPoint { x: 0, y: 4 }]);
        assert_eq!(chart.blocked.saved_kilobytes, 64);
        assert_eq!(chart.generated_at, now());
    }
}

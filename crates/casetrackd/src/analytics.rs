//! Read-only aggregate views over the case/event corpus.
//!
//! Every number is derived from the same underlying event stream with
//! plain SQL aggregates. Rates round to the nearest integer, hour/day
//! averages to one decimal, and any zero denominator yields 0.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use casetrack_shared::api::{
    AutomationMetrics, CallCounts, CaseMetrics, CommunicationMetrics, DistributionResponse,
    DistributorCount, EfficiencyMetrics, EmailCounts, OverviewResponse, ProcessCount, RegionCount,
    StatusCount, TrendPoint, TypeCount,
};
use casetrack_shared::{CaseStatus, Error, Result};

use crate::store::Store;

// Time-saved model. Policy numbers agreed with operations, not universal
// truths; tune here when the manual baseline changes.
pub const MANUAL_TIME_PER_CASE: f64 = 2.0;
pub const AUTOMATED_TIME_PER_CASE: f64 = 0.25;
pub const HOURLY_RATE: f64 = 20.0;

/// Trailing window for the trends endpoint. The period enumeration is
/// validated at the API boundary; this type is the already-valid form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendPeriod {
    SevenDays,
    ThirtyDays,
    NinetyDays,
}

impl TrendPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "7d" => Some(TrendPeriod::SevenDays),
            "30d" => Some(TrendPeriod::ThirtyDays),
            "90d" => Some(TrendPeriod::NinetyDays),
            _ => None,
        }
    }

    fn days(&self) -> i64 {
        match self {
            TrendPeriod::SevenDays => 7,
            TrendPeriod::ThirtyDays => 30,
            TrendPeriod::NinetyDays => 90,
        }
    }
}

#[derive(Clone)]
pub struct AnalyticsEngine {
    store: Store,
}

impl AnalyticsEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The dashboard overview: four independent aggregate blocks over the
    /// given window, defaulting to the last 30 days ending now. The blocks
    /// have no ordering dependency and are composed concurrently.
    pub async fn overview(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<OverviewResponse> {
        let start = start
            .unwrap_or_else(|| Utc::now() - Duration::days(30))
            .timestamp();
        let end = end.unwrap_or_else(Utc::now).timestamp();

        let (automation, communication, cases, efficiency) = tokio::join!(
            self.automation_metrics(start, end),
            self.communication_metrics(start, end),
            self.case_metrics(start, end),
            self.efficiency_metrics(start, end),
        );

        Ok(OverviewResponse {
            automation: automation?,
            communication: communication?,
            cases: cases?,
            efficiency: efficiency?,
        })
    }

    async fn automation_metrics(&self, start: i64, end: i64) -> Result<AutomationMetrics> {
        self.store
            .with_conn(move |conn| {
                let cases_processed: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cases WHERE created_at >= ?1 AND created_at <= ?2",
                    params![start, end],
                    |row| row.get(0),
                )?;

                let (total, automated): (i64, i64) = conn.query_row(
                    "SELECT
                        COUNT(DISTINCT c.codigo_sc),
                        COUNT(DISTINCT CASE WHEN e.type = 'result' THEN c.codigo_sc END)
                     FROM cases c
                     LEFT JOIN events e ON e.case_id = c.codigo_sc
                     WHERE c.created_at >= ?1 AND c.created_at <= ?2",
                    params![start, end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                let hours_saved =
                    cases_processed as f64 * (MANUAL_TIME_PER_CASE - AUTOMATED_TIME_PER_CASE);
                Ok(AutomationMetrics {
                    hours_saved: round1(hours_saved),
                    automation_rate: pct(automated, total),
                    cases_processed,
                    cost_savings: (hours_saved * HOURLY_RATE).round() as i64,
                })
            })
            .await
    }

    async fn communication_metrics(&self, start: i64, end: i64) -> Result<CommunicationMetrics> {
        self.store
            .with_conn(move |conn| {
                let (sent, received, calls, reached, not_reached, needs_help): (
                    i64,
                    i64,
                    i64,
                    i64,
                    i64,
                    i64,
                ) = conn.query_row(
                    "SELECT
                        COUNT(*) FILTER (WHERE type = 'email_sent'),
                        COUNT(*) FILTER (WHERE type = 'incoming_email'),
                        COUNT(*) FILTER (WHERE type = 'call'),
                        COUNT(*) FILTER (WHERE type = 'call'
                            AND json_extract(metadata, '$.callStatus') = 'Reached'),
                        COUNT(*) FILTER (WHERE type = 'call'
                            AND json_extract(metadata, '$.callStatus') = 'Not reached'),
                        COUNT(*) FILTER (WHERE type = 'call'
                            AND json_extract(metadata, '$.callStatus') = 'Needs help')
                     FROM events
                     WHERE timestamp >= ?1 AND timestamp <= ?2",
                    params![start, end],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )?;

                // Per case: earliest email_sent paired with the earliest
                // later incoming_email. Cases without a pair drop out of
                // the average (AVG skips NULL).
                let avg_response: Option<f64> = conn.query_row(
                    "WITH first_sent AS (
                        SELECT case_id, MIN(timestamp) AS sent_time
                        FROM events
                        WHERE type = 'email_sent'
                          AND timestamp >= ?1 AND timestamp <= ?2
                        GROUP BY case_id
                     )
                     SELECT AVG(((
                        SELECT MIN(e.timestamp) FROM events e
                        WHERE e.case_id = f.case_id
                          AND e.type = 'incoming_email'
                          AND e.timestamp > f.sent_time
                     ) - f.sent_time) / 3600.0)
                     FROM first_sent f",
                    params![start, end],
                    |row| row.get(0),
                )?;

                Ok(CommunicationMetrics {
                    total_emails: EmailCounts {
                        sent,
                        received,
                    },
                    total_calls: CallCounts {
                        total: calls,
                        reached,
                        not_reached,
                        needs_help,
                    },
                    avg_response_time: round1(avg_response.unwrap_or(0.0)),
                    call_success_rate: pct(reached, calls),
                })
            })
            .await
    }

    async fn case_metrics(&self, start: i64, end: i64) -> Result<CaseMetrics> {
        self.store
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM cases
                     WHERE created_at >= ?1 AND created_at <= ?2
                     GROUP BY status ORDER BY status",
                )?;
                let by_status: Vec<StatusCount> = stmt
                    .query_map(params![start, end], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                    .into_iter()
                    .filter_map(|(status, count)| {
                        CaseStatus::parse(&status).map(|status| StatusCount { status, count })
                    })
                    .collect();
                let total: i64 = by_status.iter().map(|s| s.count).sum();

                let (resolved, avg_days): (i64, Option<f64>) = conn.query_row(
                    "WITH case_timeline AS (
                        SELECT
                            c.codigo_sc,
                            MIN(e.timestamp) AS first_event,
                            MAX(CASE WHEN e.type = 'result' THEN e.timestamp END) AS result_time
                        FROM cases c
                        JOIN events e ON e.case_id = c.codigo_sc
                        WHERE c.created_at >= ?1 AND c.created_at <= ?2
                        GROUP BY c.codigo_sc
                     )
                     SELECT
                        COUNT(result_time),
                        AVG((result_time - first_event) / 86400.0)
                     FROM case_timeline",
                    params![start, end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                Ok(CaseMetrics {
                    total,
                    resolved,
                    resolution_rate: pct(resolved, total),
                    avg_resolution_time: round1(avg_days.unwrap_or(0.0)),
                    by_status,
                })
            })
            .await
    }

    async fn efficiency_metrics(&self, start: i64, end: i64) -> Result<EfficiencyMetrics> {
        self.store
            .with_conn(move |conn| {
                let events_per_case: Option<f64> = conn.query_row(
                    "SELECT AVG(cnt) FROM (
                        SELECT COUNT(e.id) AS cnt
                        FROM cases c
                        LEFT JOIN events e ON e.case_id = c.codigo_sc
                        WHERE c.created_at >= ?1 AND c.created_at <= ?2
                        GROUP BY c.codigo_sc
                     )",
                    params![start, end],
                    |row| row.get(0),
                )?;

                let (total_cases, retry_cases): (i64, i64) = conn.query_row(
                    "WITH call_counts AS (
                        SELECT COUNT(CASE WHEN e.type = 'call' THEN e.id END) AS call_count
                        FROM cases c
                        LEFT JOIN events e ON e.case_id = c.codigo_sc
                        WHERE c.created_at >= ?1 AND c.created_at <= ?2
                        GROUP BY c.codigo_sc
                     )
                     SELECT COUNT(*), COUNT(*) FILTER (WHERE call_count > 1)
                     FROM call_counts",
                    params![start, end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                let (_, review_cases): (i64, i64) = conn.query_row(
                    "SELECT
                        COUNT(DISTINCT c.codigo_sc),
                        COUNT(DISTINCT CASE WHEN e.type = 'needs_review' THEN c.codigo_sc END)
                     FROM cases c
                     LEFT JOIN events e ON e.case_id = c.codigo_sc
                     WHERE c.created_at >= ?1 AND c.created_at <= ?2",
                    params![start, end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;

                // Gaps between consecutive events of the same case, all
                // cases mixed into one global average.
                let avg_wait: Option<f64> = conn.query_row(
                    "WITH gaps AS (
                        SELECT (LEAD(timestamp) OVER (
                            PARTITION BY case_id ORDER BY timestamp, rowid
                        ) - timestamp) / 3600.0 AS wait_hours
                        FROM events
                        WHERE timestamp >= ?1 AND timestamp <= ?2
                     )
                     SELECT AVG(wait_hours) FROM gaps WHERE wait_hours IS NOT NULL",
                    params![start, end],
                    |row| row.get(0),
                )?;

                Ok(EfficiencyMetrics {
                    events_per_case: round1(events_per_case.unwrap_or(0.0)),
                    retry_rate: pct(retry_cases, total_cases),
                    review_rate: pct(review_cases, total_cases),
                    avg_wait_time: round1(avg_wait.unwrap_or(0.0)),
                })
            })
            .await
    }

    /// Daily created-case counts for the trailing window, ascending. Days
    /// without cases are absent rather than zero.
    pub async fn trends(&self, period: TrendPeriod) -> Result<Vec<TrendPoint>> {
        let end = Utc::now();
        let start = (end - Duration::days(period.days())).timestamp();
        let end = end.timestamp();

        self.store
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT date(created_at, 'unixepoch') AS day, COUNT(*)
                     FROM cases
                     WHERE created_at >= ?1 AND created_at <= ?2
                     GROUP BY day ORDER BY day",
                )?;
                let points = stmt
                    .query_map(params![start, end], |row| {
                        Ok(TrendPoint {
                            date: row.get(0)?,
                            cases: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(points)
            })
            .await
    }

    /// Four independent rankings over the trailing 30 days, each ordered by
    /// count descending.
    pub async fn distribution(&self) -> Result<DistributionResponse> {
        let cutoff = (Utc::now() - Duration::days(30)).timestamp();

        self.store
            .with_conn(move |conn| {
                let event_types = ranked(
                    conn,
                    "SELECT type, COUNT(*) AS count FROM events
                     WHERE timestamp >= ?1
                     GROUP BY type ORDER BY count DESC",
                    cutoff,
                )?
                .into_iter()
                .map(|(event_type, count)| TypeCount { event_type, count })
                .collect();

                let geographic = ranked(
                    conn,
                    "SELECT ccaa, COUNT(*) AS count FROM cases
                     WHERE created_at >= ?1
                     GROUP BY ccaa ORDER BY count DESC",
                    cutoff,
                )?
                .into_iter()
                .map(|(region, count)| RegionCount { region, count })
                .collect();

                let process_types = ranked(
                    conn,
                    "SELECT proceso, COUNT(*) AS count FROM cases
                     WHERE created_at >= ?1
                     GROUP BY proceso ORDER BY count DESC",
                    cutoff,
                )?
                .into_iter()
                .map(|(process, count)| ProcessCount { process, count })
                .collect();

                let distributors = ranked(
                    conn,
                    "SELECT distribuidora, COUNT(*) AS count FROM cases
                     WHERE created_at >= ?1
                     GROUP BY distribuidora ORDER BY count DESC",
                    cutoff,
                )?
                .into_iter()
                .map(|(distributor, count)| DistributorCount { distributor, count })
                .collect();

                Ok(DistributionResponse {
                    event_types,
                    geographic,
                    process_types,
                    distributors,
                })
            })
            .await
    }
}

fn ranked(
    conn: &rusqlite::Connection,
    sql: &str,
    cutoff: i64,
) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)?;
    Ok(rows)
}

/// Nearest-integer percentage, 0 when the denominator is 0.
fn pct(numerator: i64, denominator: i64) -> u32 {
    if denominator <= 0 {
        return 0;
    }
    ((numerator as f64 / denominator as f64) * 100.0).round() as u32
}

/// Round to one decimal place.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

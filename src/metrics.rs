use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::funnel::FunnelCounts;
use crate::models::{
    ClosureReason, DashboardMetrics, FunnelEvent, Person, Recency, Status, StatusCount,
    WeeklyCohort,
};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

pub const UNSPECIFIED_REASON: &str = "Unspecified";
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Whole-number percentage, 0 when there is nothing to divide by.
pub fn percentage(numerator: usize, denominator: usize) -> u32 {
    if denominator == 0 {
        return 0;
    }
    (numerator as f64 / denominator as f64 * 100.0).round() as u32
}

/// Elapsed time in the coarsest whole unit, e.g. "45s ago" or "3w ago".
/// Times in the future read as "0s ago".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    match seconds {
        s if s < MINUTE => format!("{s}s ago"),
        s if s < HOUR => format!("{}m ago", s / MINUTE),
        s if s < DAY => format!("{}h ago", s / HOUR),
        s if s < WEEK => format!("{}d ago", s / DAY),
        s => format!("{}w ago", s / WEEK),
    }
}

/// Midnight UTC of the most recent Monday (today, if today is Monday).
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = i64::from(now.weekday().num_days_from_monday());
    let monday = now.date_naive() - Duration::days(days_since_monday);
    monday
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

/// Direct tally of the status field, most common first. Recognised statuses
/// are grouped case-insensitively under their canonical label. Unrecognised
/// and missing statuses are grouped under their raw label or "Unknown".
pub fn status_breakdown(counts: &FunnelCounts) -> Vec<StatusCount> {
    let mut breakdown: Vec<StatusCount> = counts
        .by_label
        .iter()
        .map(|(label, count)| StatusCount {
            status: if label.is_empty() {
                UNKNOWN_STATUS.to_string()
            } else {
                label.clone()
            },
            count: *count,
            percent: percentage(*count, counts.total),
        })
        .collect();

    breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
    breakdown
}

pub fn weekly_cohort(people: &[Person], now: DateTime<Utc>) -> WeeklyCohort {
    let week_start = start_of_week(now);
    let this_week: Vec<&Person> = people.iter().filter(|p| p.created >= week_start).collect();
    let qualified = this_week.iter().filter(|p| p.has_qualified()).count();

    WeeklyCohort {
        week_start,
        created: this_week.len(),
        qualified,
        qualified_percent: percentage(qualified, this_week.len()),
    }
}

pub fn recency(people: &[Person], events: &[FunnelEvent], now: DateTime<Utc>) -> Recency {
    let last_application = people.iter().map(|p| p.created).max();
    let last_onboarded = events
        .iter()
        .filter(|event| event.reached(Status::Onboarded))
        .map(|event| event.timestamp)
        .max();

    Recency {
        last_application: last_application.map(|then| format_time_ago(then, now)),
        last_onboarded: last_onboarded.map(|then| format_time_ago(then, now)),
    }
}

/// Closure classification text among currently closed people, most common
/// first, each as a share of everyone closed.
pub fn closure_reasons(people: &[Person]) -> Vec<ClosureReason> {
    let mut tally: HashMap<&str, usize> = HashMap::new();
    let mut total_closed = 0usize;

    for person in people {
        if person.recognized_status() != Some(Status::Closed) {
            continue;
        }
        total_closed += 1;
        let reason = person
            .closure_classification
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(UNSPECIFIED_REASON);
        *tally.entry(reason).or_insert(0) += 1;
    }

    let mut reasons: Vec<ClosureReason> = tally
        .into_iter()
        .map(|(reason, count)| ClosureReason {
            reason: reason.to_string(),
            count,
            percent: percentage(count, total_closed),
        })
        .collect();

    reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    reasons
}

pub fn compute_metrics(
    people: &[Person],
    events: &[FunnelEvent],
    now: DateTime<Utc>,
) -> DashboardMetrics {
    let counts = FunnelCounts::tally(people);
    let qualified = counts.qualified();
    let onboarded = counts.onboarded();

    DashboardMetrics {
        total_people: counts.total,
        qualified,
        qualification_rate: percentage(qualified, counts.total),
        onboarded,
        onboarding_rate: percentage(onboarded, qualified),
        status_breakdown: status_breakdown(&counts),
        weekly: weekly_cohort(people, now),
        recency: recency(people, events, now),
        closure_reasons: closure_reasons(people),
    }
}

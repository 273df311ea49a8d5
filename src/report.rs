use std::fmt::Write;

use crate::refresh::DashboardSnapshot;

pub fn build_report(snapshot: &DashboardSnapshot) -> String {
    let metrics = &snapshot.metrics;
    let mut output = String::new();

    let _ = writeln!(output, "# Recruitment Funnel Report");
    let _ = writeln!(
        output,
        "Generated {}",
        snapshot.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "- {} people, {} qualified ({}% qualification rate)",
        metrics.total_people, metrics.qualified, metrics.qualification_rate
    );
    let _ = writeln!(
        output,
        "- {} onboarded ({}% of qualified)",
        metrics.onboarded, metrics.onboarding_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Breakdown");
    for entry in &metrics.status_breakdown {
        let _ = writeln!(
            output,
            "- {}: {} ({}%)",
            entry.status, entry.count, entry.percent
        );
    }

    let weekly = &metrics.weekly;
    let _ = writeln!(output);
    let _ = writeln!(output, "## This Week");
    let _ = writeln!(
        output,
        "{} new since {}, {} qualified ({}%)",
        weekly.created,
        weekly.week_start.date_naive(),
        weekly.qualified,
        weekly.qualified_percent
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recency");
    let _ = writeln!(
        output,
        "- Last application: {}",
        metrics.recency.last_application.as_deref().unwrap_or("never")
    );
    let _ = writeln!(
        output,
        "- Last onboarded: {}",
        metrics.recency.last_onboarded.as_deref().unwrap_or("never")
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Closure Reasons");
    if metrics.closure_reasons.is_empty() {
        let _ = writeln!(output, "No closed applicants.");
    } else {
        for reason in &metrics.closure_reasons {
            let _ = writeln!(
                output,
                "- {}: {} ({}%)",
                reason.reason, reason.count, reason.percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Funnel Flow");
    for edge in &snapshot.graph.edges {
        let _ = writeln!(output, "- {} -> {}: {}", edge.source, edge.target, edge.weight);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::build_flow_graph;
    use crate::metrics::compute_metrics;
    use crate::store::stub::person;
    use chrono::{TimeZone, Utc};

    #[test]
    fn report_lists_sections() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let people = vec![
            person("a", Some("Lead"), None, now),
            person("b", Some("Closed"), Some("Not a fit"), now),
        ];
        let snapshot = DashboardSnapshot {
            metrics: compute_metrics(&people, &[], now),
            graph: build_flow_graph(&people).unwrap(),
            last_updated: now,
        };

        let report = build_report(&snapshot);
        assert!(report.starts_with("# Recruitment Funnel Report\nGenerated 2026-10-18 09:30 UTC"));
        assert!(report.contains("- 2 people, 1 qualified (50% qualification rate)"));
        assert!(report.contains("- Not a fit: 1 (100%)"));
        assert!(report.contains("- Last onboarded: never"));
        assert!(report.contains("- Applications -> Closed/Rejected: 1"));
    }
}

use std::fmt::Write;

use crate::models::Metrics;

/// Renders the computed metrics as a markdown report. Formatting lives here,
/// never in the aggregator.
pub fn build_report(scope: Option<&str>, metrics: &Metrics) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("the full pipeline");

    let _ = writeln!(output, "# Lead Pipeline Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} consultations on record)",
        scope_label, metrics.total_consultations
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Conversion Funnel");

    if metrics.total_consultations == 0 {
        let _ = writeln!(output, "No leads recorded.");
    } else {
        for stage in &metrics.conversion_funnel {
            let _ = writeln!(
                output,
                "- {}: {} leads ({}%)",
                stage.status, stage.count, stage.percentage
            );
        }
    }

    let revenue = &metrics.revenue;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue");
    let _ = writeln!(output, "- Signed: {:.2}", revenue.total_signed);
    let _ = writeln!(output, "- Paid: {:.2}", revenue.total_paid);
    let _ = writeln!(output, "- Outstanding: {:.2}", revenue.total_outstanding);
    let _ = writeln!(output, "- Average deal size: {}", revenue.average_deal_size);
    let _ = writeln!(output, "- Win rate: {}%", revenue.win_rate);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue by Industry");
    if revenue.by_industry.is_empty() {
        let _ = writeln!(output, "No industry data yet.");
    } else {
        for entry in &revenue.by_industry {
            let _ = writeln!(output, "- {}: {:.2}", entry.industry, entry.value);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Revenue by Country");
    if revenue.by_country.is_empty() {
        let _ = writeln!(output, "No country data yet.");
    } else {
        for entry in &revenue.by_country {
            let _ = writeln!(
                output,
                "- {}: {:.2} across {} leads",
                entry.country, entry.value, entry.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Revenue");
    if revenue.by_month.is_empty() {
        let _ = writeln!(output, "No signed revenue yet.");
    } else {
        for bucket in &revenue.by_month {
            let _ = writeln!(
                output,
                "- {}: signed {:.2}, paid {:.2}",
                bucket.month, bucket.signed, bucket.paid
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lead Intake");
    if metrics.leads_trend.is_empty() {
        let _ = writeln!(output, "No leads recorded.");
    } else {
        for point in &metrics.leads_trend {
            let _ = writeln!(
                output,
                "- {}: {} new, {} converted",
                point.month, point.new_leads, point.converted
            );
        }
    }

    output
}

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use crate::models::{
    CountryRevenue, FinancialRecord, FunnelStage, IndustryRevenue, Lead, LeadsTrendPoint, Metrics,
    MonthlyRevenue, RevenueMetrics, StatusHistoryEntry, FUNNEL_STAGES,
};

const TREND_MONTHS: usize = 6;

/// One-shot aggregation over the full CRM record sets. Pure and total: empty
/// collections are valid, every rate guards its denominator, nothing here
/// touches I/O.
pub fn compute_metrics(
    leads: &[Lead],
    financials: &[FinancialRecord],
    history: &[StatusHistoryEntry],
) -> Metrics {
    let total_consultations = leads.len();

    let financials_by_lead: HashMap<Uuid, &FinancialRecord> =
        financials.iter().map(|f| (f.lead_id, f)).collect();

    let reaches: Vec<Option<usize>> = leads
        .iter()
        .map(|lead| funnel_reach(lead, history))
        .collect();

    let conversion_funnel = FUNNEL_STAGES
        .iter()
        .enumerate()
        .map(|(stage_index, &status)| {
            let count = reaches
                .iter()
                .filter(|reach| matches!(reach, Some(index) if *index >= stage_index))
                .count();
            FunnelStage {
                status,
                count,
                percentage: ratio_percent(count, total_consultations),
            }
        })
        .collect();

    let total_signed: f64 = financials.iter().map(|f| f.agreed_value).sum();
    let total_paid: f64 = financials.iter().map(|f| f.amount_paid).sum();

    let mut industry_values: HashMap<&str, f64> = HashMap::new();
    let mut country_buckets: HashMap<&str, (f64, usize)> = HashMap::new();
    for lead in leads {
        let record = financials_by_lead.get(&lead.id);
        if let (Some(record), Some(industry)) = (record, lead.industry.as_deref()) {
            *industry_values.entry(industry).or_insert(0.0) += record.agreed_value;
        }

        let country = lead.country.as_deref().unwrap_or("Unknown");
        let bucket = country_buckets.entry(country).or_insert((0.0, 0));
        bucket.1 += 1;
        if let Some(record) = record {
            bucket.0 += record.agreed_value;
        }
    }

    let mut by_industry: Vec<IndustryRevenue> = industry_values
        .into_iter()
        .map(|(industry, value)| IndustryRevenue {
            industry: industry.to_string(),
            value,
        })
        .collect();
    by_industry.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.industry.cmp(&b.industry))
    });

    let mut by_country: Vec<CountryRevenue> = country_buckets
        .into_iter()
        .map(|(country, (value, count))| CountryRevenue {
            country: country.to_string(),
            value,
            count,
        })
        .collect();
    by_country.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.country.cmp(&b.country))
    });

    // Revenue trend buckets by contract month when known, lead creation month
    // otherwise. BTreeMap keys are YYYY-MM, so iteration order is already
    // chronological.
    let mut revenue_months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for lead in leads {
        let Some(record) = financials_by_lead.get(&lead.id) else {
            continue;
        };
        if record.agreed_value <= 0.0 {
            continue;
        }
        let date = lead
            .contract_signed_date
            .unwrap_or_else(|| lead.created_at.date_naive());
        let bucket = revenue_months.entry(month_key(date)).or_insert((0.0, 0.0));
        bucket.0 += record.agreed_value;
        bucket.1 += record.amount_paid;
    }
    let by_month = last_populated(
        revenue_months
            .into_iter()
            .map(|(month, (signed, paid))| MonthlyRevenue {
                month,
                signed,
                paid,
            }),
    );

    let mut lead_months: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for lead in leads {
        let bucket = lead_months
            .entry(month_key(lead.created_at.date_naive()))
            .or_insert((0, 0));
        bucket.0 += 1;
        if lead.status.is_converted() {
            bucket.1 += 1;
        }
    }
    let leads_trend = last_populated(lead_months.into_iter().map(
        |(month, (new_leads, converted))| LeadsTrendPoint {
            month,
            new_leads,
            converted,
        },
    ));

    let converted = leads.iter().filter(|l| l.status.is_converted()).count();
    let received_proposal = leads
        .iter()
        .filter(|l| l.status.received_proposal())
        .count();

    let average_deal_size = if converted == 0 {
        0
    } else {
        (total_signed / converted as f64).round() as i64
    };

    Metrics {
        total_consultations,
        conversion_funnel,
        revenue: RevenueMetrics {
            total_signed,
            total_paid,
            total_outstanding: total_signed - total_paid,
            by_month,
            by_industry,
            by_country,
            average_deal_size,
            win_rate: ratio_percent(converted, received_proposal),
        },
        leads_trend,
    }
}

/// Furthest funnel stage a lead counts for, as an index into
/// `FUNNEL_STAGES`; `FUNNEL_STAGES.len()` means funnel-complete and `None`
/// means no stage at all.
///
/// A lead currently in the funnel counts up to its own stage, and anything
/// past `Contract Signed` counts for every stage. A closed lead counts only
/// as far as its status history shows it actually got, never as a full
/// conversion.
fn funnel_reach(lead: &Lead, history: &[StatusHistoryEntry]) -> Option<usize> {
    if lead.status.is_funnel_complete() {
        return Some(FUNNEL_STAGES.len());
    }
    if let Some(index) = lead.status.funnel_index() {
        return Some(index);
    }

    // Closed: take the furthest stage on record. History rows double as an
    // audit log (old and new status may match), so both sides are scanned.
    let mut reach: Option<usize> = None;
    for entry in history.iter().filter(|e| e.lead_id == lead.id) {
        for status in entry.old_status.iter().chain(std::iter::once(&entry.new_status)) {
            let candidate = if status.is_funnel_complete() {
                Some(FUNNEL_STAGES.len())
            } else {
                status.funnel_index()
            };
            reach = reach.max(candidate);
        }
    }
    reach
}

fn ratio_percent(numerator: usize, denominator: usize) -> u32 {
    if denominator == 0 {
        0
    } else {
        (numerator as f64 / denominator as f64 * 100.0).round() as u32
    }
}

fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn last_populated<T>(buckets: impl Iterator<Item = T>) -> Vec<T> {
    let collected: Vec<T> = buckets.collect();
    let skip = collected.len().saturating_sub(TREND_MONTHS);
    collected.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
    }

    fn lead_created(status: LeadStatus, year: i32, month: u32, day: u32) -> Lead {
        let created_at = ts(year, month, day);
        Lead {
            id: Uuid::new_v4(),
            company_name: "Northwind Traders".to_string(),
            contact_name: "Sam Fourie".to_string(),
            email: "sam@northwind.example".to_string(),
            phone: None,
            industry: None,
            country: None,
            source: "Referral".to_string(),
            status,
            notes: None,
            contract_signed_date: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn lead(status: LeadStatus) -> Lead {
        lead_created(status, 2026, 1, 12)
    }

    fn financed(lead: &Lead, agreed_value: f64, amount_paid: f64) -> FinancialRecord {
        FinancialRecord {
            lead_id: lead.id,
            currency: "USD".to_string(),
            payment_model: crate::models::PaymentModel::OneTime,
            agreed_value,
            amount_invoiced: agreed_value,
            amount_paid,
            created_at: lead.created_at,
            updated_at: lead.created_at,
        }
    }

    fn transition(
        lead: &Lead,
        old_status: Option<LeadStatus>,
        new_status: LeadStatus,
    ) -> StatusHistoryEntry {
        StatusHistoryEntry {
            lead_id: lead.id,
            old_status,
            new_status,
            note: None,
            changed_by: None,
            changed_at: lead.created_at,
        }
    }

    fn stage_counts(metrics: &Metrics) -> Vec<usize> {
        metrics.conversion_funnel.iter().map(|s| s.count).collect()
    }

    #[test]
    fn empty_inputs_yield_zeroed_metrics() {
        let metrics = compute_metrics(&[], &[], &[]);

        assert_eq!(metrics.total_consultations, 0);
        assert_eq!(metrics.conversion_funnel.len(), FUNNEL_STAGES.len());
        for stage in &metrics.conversion_funnel {
            assert_eq!(stage.count, 0);
            assert_eq!(stage.percentage, 0);
        }
        assert_eq!(metrics.revenue.total_signed, 0.0);
        assert_eq!(metrics.revenue.total_paid, 0.0);
        assert_eq!(metrics.revenue.total_outstanding, 0.0);
        assert_eq!(metrics.revenue.average_deal_size, 0);
        assert_eq!(metrics.revenue.win_rate, 0);
        assert!(metrics.revenue.by_month.is_empty());
        assert!(metrics.revenue.by_industry.is_empty());
        assert!(metrics.revenue.by_country.is_empty());
        assert!(metrics.leads_trend.is_empty());
    }

    #[test]
    fn funnel_counts_are_cumulative() {
        let leads = vec![
            lead(LeadStatus::ConsultationBooked),
            lead(LeadStatus::QualifiedLead),
            lead(LeadStatus::ContractSigned),
        ];
        let metrics = compute_metrics(&leads, &[], &[]);

        assert_eq!(stage_counts(&metrics), vec![3, 2, 2, 1, 1, 1]);
        let percentages: Vec<u32> = metrics
            .conversion_funnel
            .iter()
            .map(|s| s.percentage)
            .collect();
        assert_eq!(percentages, vec![100, 67, 67, 33, 33, 33]);
        for pair in percentages.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn funnel_complete_statuses_count_for_every_stage() {
        let leads = vec![
            lead(LeadStatus::ProjectInProgress),
            lead(LeadStatus::RetainerOngoing),
        ];
        let metrics = compute_metrics(&leads, &[], &[]);
        assert_eq!(stage_counts(&metrics), vec![2; 6]);
    }

    #[test]
    fn closed_leads_without_history_count_for_no_stage() {
        let mut leads: Vec<Lead> = (0..7)
            .map(|_| lead(LeadStatus::ConsultationBooked))
            .collect();
        leads.extend((0..3).map(|_| lead(LeadStatus::ClosedLost)));

        let metrics = compute_metrics(&leads, &[], &[]);
        assert_eq!(metrics.total_consultations, 10);
        assert_eq!(stage_counts(&metrics), vec![7, 0, 0, 0, 0, 0]);
        assert_eq!(metrics.conversion_funnel[0].percentage, 70);
    }

    #[test]
    fn closed_leads_count_up_to_their_recorded_stage() {
        let closed = lead(LeadStatus::ClosedLost);
        let history = vec![
            transition(&closed, None, LeadStatus::ConsultationBooked),
            transition(
                &closed,
                Some(LeadStatus::ConsultationBooked),
                LeadStatus::ProposalSent,
            ),
            transition(&closed, Some(LeadStatus::ProposalSent), LeadStatus::ClosedLost),
        ];

        let metrics = compute_metrics(&[closed], &[], &history);
        assert_eq!(stage_counts(&metrics), vec![1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn audit_entries_with_matching_statuses_do_not_inflate_reach() {
        let closed = lead(LeadStatus::ClosedNotAFit);
        let history = vec![
            transition(&closed, None, LeadStatus::ConsultationBooked),
            // financial edit logged against an unchanged status
            transition(
                &closed,
                Some(LeadStatus::DiscoveryCompleted),
                LeadStatus::DiscoveryCompleted,
            ),
        ];

        let metrics = compute_metrics(&[closed], &[], &history);
        assert_eq!(stage_counts(&metrics), vec![1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn single_signed_lead_revenue_metrics() {
        let signed = lead(LeadStatus::ContractSigned);
        let financials = vec![financed(&signed, 1000.0, 400.0)];

        let metrics = compute_metrics(&[signed], &financials, &[]);
        let revenue = &metrics.revenue;
        assert_eq!(revenue.total_signed, 1000.0);
        assert_eq!(revenue.total_paid, 400.0);
        assert_eq!(revenue.total_outstanding, 600.0);
        assert_eq!(revenue.average_deal_size, 1000);
        assert_eq!(revenue.win_rate, 100);
    }

    #[test]
    fn outstanding_is_exactly_signed_minus_paid() {
        let a = lead(LeadStatus::ContractSigned);
        let b = lead(LeadStatus::ProjectInProgress);
        // b is overpaid; the totals still reconcile
        let financials = vec![financed(&a, 1200.0, 300.0), financed(&b, 800.0, 900.0)];

        let metrics = compute_metrics(&[a, b], &financials, &[]);
        let revenue = &metrics.revenue;
        assert_eq!(
            revenue.total_outstanding,
            revenue.total_signed - revenue.total_paid
        );
        assert_eq!(revenue.total_outstanding, 800.0);
    }

    #[test]
    fn signed_totals_ignore_lead_status() {
        // A financial record on a lost lead still counts toward the totals.
        let lost = lead(LeadStatus::ClosedLost);
        let financials = vec![financed(&lost, 500.0, 500.0)];

        let metrics = compute_metrics(&[lost], &financials, &[]);
        assert_eq!(metrics.revenue.total_signed, 500.0);
        assert_eq!(metrics.revenue.average_deal_size, 0);
    }

    #[test]
    fn industry_breakdown_skips_unfinanced_and_unlabelled_leads() {
        let mut fintech = lead(LeadStatus::ContractSigned);
        fintech.industry = Some("Fintech".to_string());
        let mut retail = lead(LeadStatus::ContractSigned);
        retail.industry = Some("Retail".to_string());
        let mut unlabelled = lead(LeadStatus::ContractSigned);
        unlabelled.industry = None;
        let mut unfinanced = lead(LeadStatus::QualifiedLead);
        unfinanced.industry = Some("Retail".to_string());

        let financials = vec![
            financed(&fintech, 3000.0, 0.0),
            financed(&retail, 1000.0, 0.0),
            financed(&unlabelled, 750.0, 0.0),
        ];
        let leads = vec![fintech, retail, unlabelled, unfinanced];

        let metrics = compute_metrics(&leads, &financials, &[]);
        let by_industry = &metrics.revenue.by_industry;
        assert_eq!(by_industry.len(), 2);
        assert_eq!(by_industry[0].industry, "Fintech");
        assert_eq!(by_industry[0].value, 3000.0);
        assert_eq!(by_industry[1].industry, "Retail");
        assert_eq!(by_industry[1].value, 1000.0);
    }

    #[test]
    fn country_counts_cover_all_leads_but_values_only_financed_ones() {
        let mut kenya_signed = lead(LeadStatus::ContractSigned);
        kenya_signed.country = Some("Kenya".to_string());
        let mut kenya_open = lead(LeadStatus::DiscoveryCompleted);
        kenya_open.country = Some("Kenya".to_string());
        let nowhere = lead(LeadStatus::ConsultationBooked);

        let financials = vec![financed(&kenya_signed, 2500.0, 1000.0)];
        let leads = vec![kenya_signed, kenya_open, nowhere];

        let metrics = compute_metrics(&leads, &financials, &[]);
        let by_country = &metrics.revenue.by_country;

        let total_count: usize = by_country.iter().map(|c| c.count).sum();
        assert_eq!(total_count, metrics.total_consultations);

        let kenya = by_country.iter().find(|c| c.country == "Kenya").unwrap();
        assert_eq!(kenya.count, 2);
        assert_eq!(kenya.value, 2500.0);
        let unknown = by_country.iter().find(|c| c.country == "Unknown").unwrap();
        assert_eq!(unknown.count, 1);
        assert_eq!(unknown.value, 0.0);

        let value_total: f64 = by_country.iter().map(|c| c.value).sum();
        assert_eq!(value_total, metrics.revenue.total_signed);
    }

    #[test]
    fn orphan_financials_count_in_totals_but_not_breakdowns() {
        // A financial record whose lead is gone still feeds the totals, but
        // no country or month bucket can claim it.
        let mut kept = lead(LeadStatus::ContractSigned);
        kept.country = Some("Kenya".to_string());
        let mut orphan = financed(&kept, 999.0, 0.0);
        orphan.lead_id = Uuid::new_v4();

        let financials = vec![financed(&kept, 1000.0, 0.0), orphan];
        let metrics = compute_metrics(&[kept], &financials, &[]);

        assert_eq!(metrics.revenue.total_signed, 1999.0);
        let value_total: f64 = metrics.revenue.by_country.iter().map(|c| c.value).sum();
        assert_eq!(value_total, 1000.0);
        assert_eq!(metrics.revenue.by_month.len(), 1);
        assert_eq!(metrics.revenue.by_month[0].signed, 1000.0);
    }

    #[test]
    fn revenue_trend_merges_same_month_and_prefers_contract_date() {
        let mut first = lead_created(LeadStatus::ContractSigned, 2025, 11, 3);
        first.contract_signed_date = NaiveDate::from_ymd_opt(2026, 2, 10);
        let mut second = lead_created(LeadStatus::ContractSigned, 2026, 2, 20);
        second.contract_signed_date = NaiveDate::from_ymd_opt(2026, 2, 24);

        let financials = vec![financed(&first, 500.0, 100.0), financed(&second, 700.0, 0.0)];
        let metrics = compute_metrics(&[first, second], &financials, &[]);

        assert_eq!(metrics.revenue.by_month.len(), 1);
        let bucket = &metrics.revenue.by_month[0];
        assert_eq!(bucket.month, "2026-02");
        assert_eq!(bucket.signed, 1200.0);
        assert_eq!(bucket.paid, 100.0);
    }

    #[test]
    fn revenue_trend_falls_back_to_creation_month() {
        let unsigned = lead_created(LeadStatus::ProposalSent, 2026, 3, 5);
        let financials = vec![financed(&unsigned, 900.0, 0.0)];

        let metrics = compute_metrics(&[unsigned], &financials, &[]);
        assert_eq!(metrics.revenue.by_month[0].month, "2026-03");
    }

    #[test]
    fn zero_value_financials_stay_out_of_the_revenue_trend() {
        let placeholder = lead(LeadStatus::ContractSigned);
        let financials = vec![financed(&placeholder, 0.0, 0.0)];

        let metrics = compute_metrics(&[placeholder], &financials, &[]);
        assert!(metrics.revenue.by_month.is_empty());
    }

    #[test]
    fn trend_series_keep_the_last_six_populated_months() {
        let mut leads = Vec::new();
        let mut financials = Vec::new();
        for month in 1..=9 {
            let entry = lead_created(LeadStatus::ContractSigned, 2025, month, 15);
            financials.push(financed(&entry, 100.0, 0.0));
            leads.push(entry);
        }

        let metrics = compute_metrics(&leads, &financials, &[]);
        assert_eq!(metrics.revenue.by_month.len(), 6);
        assert_eq!(metrics.revenue.by_month[0].month, "2025-04");
        assert_eq!(metrics.revenue.by_month[5].month, "2025-09");
        assert_eq!(metrics.leads_trend.len(), 6);
        assert_eq!(metrics.leads_trend[0].month, "2025-04");
    }

    #[test]
    fn gap_months_do_not_pad_the_trend() {
        // Populated buckets only: a January + August spread yields two
        // buckets, not eight.
        let leads = vec![
            lead_created(LeadStatus::ConsultationBooked, 2025, 1, 9),
            lead_created(LeadStatus::ConsultationBooked, 2025, 8, 9),
        ];
        let metrics = compute_metrics(&leads, &[], &[]);
        let months: Vec<&str> = metrics.leads_trend.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["2025-01", "2025-08"]);
    }

    #[test]
    fn leads_trend_converts_on_current_status() {
        let converted = lead_created(LeadStatus::RetainerOngoing, 2026, 1, 4);
        let open = lead_created(LeadStatus::ProposalSent, 2026, 1, 18);
        let newer = lead_created(LeadStatus::ConsultationBooked, 2026, 2, 2);

        let metrics = compute_metrics(&[converted, open, newer], &[], &[]);
        assert_eq!(metrics.leads_trend.len(), 2);
        assert_eq!(metrics.leads_trend[0].month, "2026-01");
        assert_eq!(metrics.leads_trend[0].new_leads, 2);
        assert_eq!(metrics.leads_trend[0].converted, 1);
        assert_eq!(metrics.leads_trend[1].new_leads, 1);
        assert_eq!(metrics.leads_trend[1].converted, 0);
    }

    #[test]
    fn win_rate_rounds_to_nearest_integer() {
        let leads = vec![
            lead(LeadStatus::ContractSigned),
            lead(LeadStatus::ProposalSent),
            lead(LeadStatus::NegotiationReview),
        ];
        let metrics = compute_metrics(&leads, &[], &[]);
        assert_eq!(metrics.revenue.win_rate, 33);

        let leads = vec![
            lead(LeadStatus::ContractSigned),
            lead(LeadStatus::DeliveredHandedOver),
            lead(LeadStatus::ProposalSent),
        ];
        let metrics = compute_metrics(&leads, &[], &[]);
        assert_eq!(metrics.revenue.win_rate, 67);
    }

    #[test]
    fn average_deal_size_divides_by_converted_leads_only() {
        let signed = lead(LeadStatus::ContractSigned);
        let delivered = lead(LeadStatus::DeliveredHandedOver);
        let open = lead(LeadStatus::ProposalSent);

        let financials = vec![
            financed(&signed, 1000.0, 0.0),
            financed(&delivered, 2001.0, 0.0),
        ];
        let metrics = compute_metrics(&[signed, delivered, open], &financials, &[]);
        assert_eq!(metrics.revenue.average_deal_size, 1501);
    }
}

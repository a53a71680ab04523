use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle statuses in pipeline order. The first six form the conversion
/// funnel; the three after `ContractSigned` count as funnel-complete; the two
/// `Closed` variants are terminal outcomes outside the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "Consultation Booked")]
    ConsultationBooked,
    #[serde(rename = "Discovery Completed")]
    DiscoveryCompleted,
    #[serde(rename = "Qualified Lead")]
    QualifiedLead,
    #[serde(rename = "Proposal Sent")]
    ProposalSent,
    #[serde(rename = "Negotiation / Review")]
    NegotiationReview,
    #[serde(rename = "Contract Signed")]
    ContractSigned,
    #[serde(rename = "Project In Progress")]
    ProjectInProgress,
    #[serde(rename = "Delivered / Handed Over")]
    DeliveredHandedOver,
    #[serde(rename = "Retainer / Ongoing")]
    RetainerOngoing,
    #[serde(rename = "Closed – Not a Fit")]
    ClosedNotAFit,
    #[serde(rename = "Closed – Lost")]
    ClosedLost,
}

pub const FUNNEL_STAGES: [LeadStatus; 6] = [
    LeadStatus::ConsultationBooked,
    LeadStatus::DiscoveryCompleted,
    LeadStatus::QualifiedLead,
    LeadStatus::ProposalSent,
    LeadStatus::NegotiationReview,
    LeadStatus::ContractSigned,
];

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::ConsultationBooked => "Consultation Booked",
            LeadStatus::DiscoveryCompleted => "Discovery Completed",
            LeadStatus::QualifiedLead => "Qualified Lead",
            LeadStatus::ProposalSent => "Proposal Sent",
            LeadStatus::NegotiationReview => "Negotiation / Review",
            LeadStatus::ContractSigned => "Contract Signed",
            LeadStatus::ProjectInProgress => "Project In Progress",
            LeadStatus::DeliveredHandedOver => "Delivered / Handed Over",
            LeadStatus::RetainerOngoing => "Retainer / Ongoing",
            LeadStatus::ClosedNotAFit => "Closed – Not a Fit",
            LeadStatus::ClosedLost => "Closed – Lost",
        }
    }

    /// Position within the six-stage conversion funnel, if the status is one
    /// of the funnel stages.
    pub fn funnel_index(&self) -> Option<usize> {
        FUNNEL_STAGES.iter().position(|stage| stage == self)
    }

    /// Past `Contract Signed`: counts as having reached every funnel stage.
    pub fn is_funnel_complete(&self) -> bool {
        matches!(
            self,
            LeadStatus::ProjectInProgress
                | LeadStatus::DeliveredHandedOver
                | LeadStatus::RetainerOngoing
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, LeadStatus::ClosedNotAFit | LeadStatus::ClosedLost)
    }

    /// Contract signed or later.
    pub fn is_converted(&self) -> bool {
        matches!(self, LeadStatus::ContractSigned) || self.is_funnel_complete()
    }

    /// Proposal sent or later. The win-rate denominator.
    pub fn received_proposal(&self) -> bool {
        matches!(self, LeadStatus::ProposalSent | LeadStatus::NegotiationReview)
            || self.is_converted()
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let status = match value.trim() {
            "Consultation Booked" => LeadStatus::ConsultationBooked,
            "Discovery Completed" => LeadStatus::DiscoveryCompleted,
            "Qualified Lead" => LeadStatus::QualifiedLead,
            "Proposal Sent" => LeadStatus::ProposalSent,
            "Negotiation / Review" => LeadStatus::NegotiationReview,
            "Contract Signed" => LeadStatus::ContractSigned,
            "Project In Progress" => LeadStatus::ProjectInProgress,
            "Delivered / Handed Over" => LeadStatus::DeliveredHandedOver,
            "Retainer / Ongoing" => LeadStatus::RetainerOngoing,
            "Closed – Not a Fit" | "Closed - Not a Fit" => LeadStatus::ClosedNotAFit,
            "Closed – Lost" | "Closed - Lost" => LeadStatus::ClosedLost,
            other => anyhow::bail!("unknown lead status: {other:?}"),
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentModel {
    #[serde(rename = "One-time")]
    OneTime,
    #[serde(rename = "Milestone-based")]
    MilestoneBased,
    #[serde(rename = "Retainer")]
    Retainer,
}

impl PaymentModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentModel::OneTime => "One-time",
            PaymentModel::MilestoneBased => "Milestone-based",
            PaymentModel::Retainer => "Retainer",
        }
    }
}

impl fmt::Display for PaymentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentModel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let model = match value.trim() {
            "One-time" => PaymentModel::OneTime,
            "Milestone-based" => PaymentModel::MilestoneBased,
            "Retainer" => PaymentModel::Retainer,
            other => anyhow::bail!("unknown payment model: {other:?}"),
        };
        Ok(model)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Lead {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub notes: Option<String>,
    pub contract_signed_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// At most one per lead. Monetary fields are nominal sums in the record's
/// own currency; NULL columns coerce to 0.0 at the fetch boundary.
#[derive(Debug, Clone, Serialize)]
pub struct FinancialRecord {
    pub lead_id: Uuid,
    pub currency: String,
    pub payment_model: PaymentModel,
    pub agreed_value: f64,
    pub amount_invoiced: f64,
    pub amount_paid: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinancialRecord {
    pub fn outstanding_balance(&self) -> f64 {
        self.agreed_value - self.amount_paid
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusHistoryEntry {
    pub lead_id: Uuid,
    pub old_status: Option<LeadStatus>,
    pub new_status: LeadStatus,
    pub note: Option<String>,
    pub changed_by: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunnelStage {
    pub status: LeadStatus,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRevenue {
    pub month: String,
    pub signed: f64,
    pub paid: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndustryRevenue {
    pub industry: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryRevenue {
    pub country: String,
    pub value: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueMetrics {
    pub total_signed: f64,
    pub total_paid: f64,
    pub total_outstanding: f64,
    pub by_month: Vec<MonthlyRevenue>,
    pub by_industry: Vec<IndustryRevenue>,
    pub by_country: Vec<CountryRevenue>,
    pub average_deal_size: i64,
    pub win_rate: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadsTrendPoint {
    pub month: String,
    pub new_leads: usize,
    pub converted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub total_consultations: usize,
    pub conversion_funnel: Vec<FunnelStage>,
    pub revenue: RevenueMetrics,
    pub leads_trend: Vec<LeadsTrendPoint>,
}

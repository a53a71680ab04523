use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{FinancialRecord, Lead, LeadStatus, PaymentModel, StatusHistoryEntry};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let leads = vec![
        (
            Uuid::parse_str("7c9a63f2-1d54-4f0b-9a0e-55f1b4c2d301")?,
            "Harbor & Lane",
            "Maya Okafor",
            "maya@harborlane.example",
            Some("Ecommerce"),
            Some("United Kingdom"),
            "Referral",
            LeadStatus::RetainerOngoing,
            NaiveDate::from_ymd_opt(2025, 11, 4).context("invalid date")?,
            NaiveDate::from_ymd_opt(2025, 12, 2),
        ),
        (
            Uuid::parse_str("b1f0ad64-8a21-4f3e-bb1d-6f2a9e4c7702")?,
            "Atlas Logistics",
            "Daniel Mwangi",
            "daniel@atlaslogistics.example",
            Some("Logistics"),
            Some("Kenya"),
            "Website",
            LeadStatus::ContractSigned,
            NaiveDate::from_ymd_opt(2026, 1, 9).context("invalid date")?,
            NaiveDate::from_ymd_opt(2026, 1, 28),
        ),
        (
            Uuid::parse_str("4e7d2c88-9b3a-42d1-8c5f-0a6b1d9e8803")?,
            "Bloom Clinic",
            "Sara Haddad",
            "sara@bloomclinic.example",
            Some("Healthcare"),
            Some("United Arab Emirates"),
            "LinkedIn",
            LeadStatus::ProposalSent,
            NaiveDate::from_ymd_opt(2026, 2, 12).context("invalid date")?,
            None,
        ),
        (
            Uuid::parse_str("d2c41b7a-6e85-4b9c-a3f0-18e7d5a2c904")?,
            "Kestrel Studio",
            "Jonas Weber",
            "jonas@kestrelstudio.example",
            Some("Media"),
            Some("Germany"),
            "Referral",
            LeadStatus::ClosedLost,
            NaiveDate::from_ymd_opt(2026, 1, 21).context("invalid date")?,
            None,
        ),
        (
            Uuid::parse_str("95ab3e10-4c72-4d6f-b8e9-2f0c7a619505")?,
            "Quill & Co",
            "Tomás Rivera",
            "tomas@quillandco.example",
            None,
            None,
            "Event",
            LeadStatus::ConsultationBooked,
            NaiveDate::from_ymd_opt(2026, 3, 20).context("invalid date")?,
            None,
        ),
    ];

    for (id, company, contact, email, industry, country, source, status, created, signed) in leads {
        let created_at = created
            .and_hms_opt(10, 0, 0)
            .context("invalid time")?
            .and_utc();
        sqlx::query(
            r#"
            INSERT INTO lead_pipeline.leads
            (id, company_name, contact_name, email, phone, industry, country,
             source, status, contract_signed_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NULL, $5, $6, $7, $8, $9, $10, $10)
            ON CONFLICT (email) DO UPDATE
            SET company_name = EXCLUDED.company_name,
                contact_name = EXCLUDED.contact_name,
                status = EXCLUDED.status,
                contract_signed_date = EXCLUDED.contract_signed_date
            "#,
        )
        .bind(id)
        .bind(company)
        .bind(contact)
        .bind(email)
        .bind(industry)
        .bind(country)
        .bind(source)
        .bind(status.as_str())
        .bind(signed)
        .bind(created_at)
        .execute(pool)
        .await?;
    }

    let financials = vec![
        (
            Uuid::parse_str("61d8f4a2-3b90-4c1e-9d7a-84c2e0b5a111")?,
            Uuid::parse_str("7c9a63f2-1d54-4f0b-9a0e-55f1b4c2d301")?,
            "GBP",
            PaymentModel::Retainer,
            15000.0,
            12000.0,
            9000.0,
        ),
        (
            Uuid::parse_str("c3a95e17-0d46-4f82-b6c1-59f8d7e2a222")?,
            Uuid::parse_str("b1f0ad64-8a21-4f3e-bb1d-6f2a9e4c7702")?,
            "USD",
            PaymentModel::MilestoneBased,
            8000.0,
            4000.0,
            4000.0,
        ),
    ];

    for (id, lead_id, currency, model, agreed, invoiced, paid) in financials {
        sqlx::query(
            r#"
            INSERT INTO lead_pipeline.financials
            (id, lead_id, currency, payment_model, agreed_value, amount_invoiced, amount_paid)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (lead_id) DO UPDATE
            SET currency = EXCLUDED.currency,
                payment_model = EXCLUDED.payment_model,
                agreed_value = EXCLUDED.agreed_value,
                amount_invoiced = EXCLUDED.amount_invoiced,
                amount_paid = EXCLUDED.amount_paid
            "#,
        )
        .bind(id)
        .bind(lead_id)
        .bind(currency)
        .bind(model.as_str())
        .bind(agreed)
        .bind(invoiced)
        .bind(paid)
        .execute(pool)
        .await?;
    }

    // Kestrel Studio got as far as a qualified lead before closing; the
    // funnel credits closed leads from these rows.
    let history = vec![
        (
            Uuid::parse_str("0f4b8c21-7a5e-4d93-8b60-1c2d9e3f5a31")?,
            Uuid::parse_str("d2c41b7a-6e85-4b9c-a3f0-18e7d5a2c904")?,
            None,
            LeadStatus::ConsultationBooked,
            "Booked through partner referral",
        ),
        (
            Uuid::parse_str("8e2d5f70-3c16-4a84-9d2b-6e0f7a8c5b32")?,
            Uuid::parse_str("d2c41b7a-6e85-4b9c-a3f0-18e7d5a2c904")?,
            Some(LeadStatus::ConsultationBooked),
            LeadStatus::QualifiedLead,
            "Budget confirmed on discovery call",
        ),
        (
            Uuid::parse_str("5a9c1e48-6b07-4f25-a3d8-0e4f2b7d9c33")?,
            Uuid::parse_str("d2c41b7a-6e85-4b9c-a3f0-18e7d5a2c904")?,
            Some(LeadStatus::QualifiedLead),
            LeadStatus::ClosedLost,
            "Went with an in-house build",
        ),
        (
            Uuid::parse_str("2b7e9d56-1f83-4c60-b5a4-8d3c0e6f1a34")?,
            Uuid::parse_str("b1f0ad64-8a21-4f3e-bb1d-6f2a9e4c7702")?,
            Some(LeadStatus::NegotiationReview),
            LeadStatus::ContractSigned,
            "Signed after scope revision",
        ),
    ];

    for (id, lead_id, old_status, new_status, note) in history {
        sqlx::query(
            r#"
            INSERT INTO lead_pipeline.status_history
            (id, lead_id, old_status, new_status, note, changed_by)
            VALUES ($1, $2, $3, $4, $5, 'seed')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(lead_id)
        .bind(old_status.map(|s: LeadStatus| s.as_str()))
        .bind(new_status.as_str())
        .bind(note)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn fetch_leads(
    pool: &PgPool,
    industry: Option<&str>,
    country: Option<&str>,
) -> anyhow::Result<Vec<Lead>> {
    let mut query = String::from(
        "SELECT id, company_name, contact_name, email, phone, industry, country, \
         source, status, notes, contract_signed_date, created_at, updated_at \
         FROM lead_pipeline.leads",
    );

    if industry.is_some() {
        query.push_str(" WHERE industry = $1");
    } else if country.is_some() {
        query.push_str(" WHERE country = $1");
    }
    query.push_str(" ORDER BY created_at");

    let mut rows = sqlx::query(&query);
    if let Some(value) = industry {
        rows = rows.bind(value);
    } else if let Some(value) = country {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut leads = Vec::with_capacity(records.len());
    for row in records {
        leads.push(parse_lead(&row)?);
    }
    Ok(leads)
}

pub async fn fetch_financials(
    pool: &PgPool,
    industry: Option<&str>,
    country: Option<&str>,
) -> anyhow::Result<Vec<FinancialRecord>> {
    let mut query = String::from(
        "SELECT f.lead_id, f.currency, f.payment_model, f.agreed_value, \
         f.amount_invoiced, f.amount_paid, f.created_at, f.updated_at \
         FROM lead_pipeline.financials f \
         JOIN lead_pipeline.leads l ON l.id = f.lead_id",
    );

    if industry.is_some() {
        query.push_str(" WHERE l.industry = $1");
    } else if country.is_some() {
        query.push_str(" WHERE l.country = $1");
    }
    query.push_str(" ORDER BY f.created_at");

    let mut rows = sqlx::query(&query);
    if let Some(value) = industry {
        rows = rows.bind(value);
    } else if let Some(value) = country {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut financials = Vec::with_capacity(records.len());
    for row in records {
        financials.push(parse_financial(&row)?);
    }
    Ok(financials)
}

pub async fn fetch_history(
    pool: &PgPool,
    industry: Option<&str>,
    country: Option<&str>,
) -> anyhow::Result<Vec<StatusHistoryEntry>> {
    let mut query = String::from(
        "SELECT h.lead_id, h.old_status, h.new_status, h.note, h.changed_by, h.changed_at \
         FROM lead_pipeline.status_history h \
         JOIN lead_pipeline.leads l ON l.id = h.lead_id",
    );

    if industry.is_some() {
        query.push_str(" WHERE l.industry = $1");
    } else if country.is_some() {
        query.push_str(" WHERE l.country = $1");
    }
    query.push_str(" ORDER BY h.changed_at");

    let mut rows = sqlx::query(&query);
    if let Some(value) = industry {
        rows = rows.bind(value);
    } else if let Some(value) = country {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut history = Vec::with_capacity(records.len());
    for row in records {
        history.push(parse_history(&row)?);
    }
    Ok(history)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        company_name: String,
        contact_name: String,
        email: String,
        phone: Option<String>,
        industry: Option<String>,
        country: Option<String>,
        source: Option<String>,
        status: Option<String>,
        contract_signed_date: Option<NaiveDate>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status: LeadStatus = match row.status.as_deref() {
            Some(value) => value
                .parse()
                .with_context(|| format!("row for {}", row.email))?,
            None => LeadStatus::ConsultationBooked,
        };
        let source = row.source.unwrap_or_else(|| "Manual Entry".to_string());

        let existing: Option<Uuid> =
            sqlx::query("SELECT id FROM lead_pipeline.leads WHERE email = $1")
                .bind(&row.email)
                .fetch_optional(pool)
                .await?
                .map(|r| r.get("id"));

        if let Some(id) = existing {
            sqlx::query(
                r#"
                UPDATE lead_pipeline.leads
                SET company_name = $2, contact_name = $3, phone = $4,
                    industry = $5, country = $6, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&row.company_name)
            .bind(&row.contact_name)
            .bind(&row.phone)
            .bind(&row.industry)
            .bind(&row.country)
            .execute(pool)
            .await?;
            continue;
        }

        let lead_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO lead_pipeline.leads
            (id, company_name, contact_name, email, phone, industry, country,
             source, status, contract_signed_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(lead_id)
        .bind(&row.company_name)
        .bind(&row.contact_name)
        .bind(&row.email)
        .bind(&row.phone)
        .bind(&row.industry)
        .bind(&row.country)
        .bind(&source)
        .bind(status.as_str())
        .bind(row.contract_signed_date)
        .execute(pool)
        .await?;

        // Creation entry keeps the audit trail complete for imported leads.
        sqlx::query(
            r#"
            INSERT INTO lead_pipeline.status_history
            (id, lead_id, old_status, new_status, note, changed_by)
            VALUES ($1, $2, NULL, $3, $4, 'import')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lead_id)
        .bind(status.as_str())
        .bind(format!("Created via CSV intake ({source})"))
        .execute(pool)
        .await?;

        inserted += 1;
    }

    Ok(inserted)
}

fn parse_lead(row: &PgRow) -> anyhow::Result<Lead> {
    let status: String = row.get("status");
    Ok(Lead {
        id: row.get("id"),
        company_name: row.get("company_name"),
        contact_name: row.get("contact_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        industry: row.get("industry"),
        country: row.get("country"),
        source: row.get("source"),
        status: status
            .parse()
            .with_context(|| format!("lead {}", row.get::<Uuid, _>("id")))?,
        notes: row.get("notes"),
        contract_signed_date: row.get("contract_signed_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_financial(row: &PgRow) -> anyhow::Result<FinancialRecord> {
    let payment_model: String = row.get("payment_model");
    Ok(FinancialRecord {
        lead_id: row.get("lead_id"),
        currency: row.get("currency"),
        payment_model: payment_model
            .parse()
            .with_context(|| format!("financials for lead {}", row.get::<Uuid, _>("lead_id")))?,
        // Monetary columns coerce NULL to zero here so the aggregator never
        // sees a missing amount.
        agreed_value: row.get::<Option<f64>, _>("agreed_value").unwrap_or(0.0),
        amount_invoiced: row.get::<Option<f64>, _>("amount_invoiced").unwrap_or(0.0),
        amount_paid: row.get::<Option<f64>, _>("amount_paid").unwrap_or(0.0),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_history(row: &PgRow) -> anyhow::Result<StatusHistoryEntry> {
    let old_status: Option<String> = row.get("old_status");
    let new_status: String = row.get("new_status");
    Ok(StatusHistoryEntry {
        lead_id: row.get("lead_id"),
        old_status: old_status
            .as_deref()
            .map(str::parse::<LeadStatus>)
            .transpose()?,
        new_status: new_status
            .parse()
            .with_context(|| format!("history for lead {}", row.get::<Uuid, _>("lead_id")))?,
        note: row.get("note"),
        changed_by: row.get("changed_by"),
        changed_at: row.get("changed_at"),
    })
}

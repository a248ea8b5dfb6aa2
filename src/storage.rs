use chrono::Utc;
use sqlx::PgPool;

use crate::dispatch::ConversionDispatchReport;
use crate::errors::{AppError, ResultExt};
use crate::payload::ConversionPayload;

/// Persists one redacted audit row per dispatch attempt.
///
/// The payload itself is never stored; identifiers are reduced to presence
/// flags, matching what the redacted log line carries. Storage is
/// best-effort: the caller logs failures and the HTTP response is never
/// affected.
pub struct DispatchAuditStore {
    pool: PgPool,
}

impl DispatchAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the audit record for a completed dispatch.
    pub async fn record(
        &self,
        payload: &ConversionPayload,
        report: &ConversionDispatchReport,
        latency_ms: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO conversion_dispatches (
                transaction_id,
                lead_type,
                value,
                currency,
                community_id,
                has_email,
                has_phone,
                has_gclid,
                has_gbraid,
                has_wbraid,
                has_fbclid,
                google_success,
                google_error,
                meta_success,
                meta_error,
                latency_ms,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&payload.transaction_id)
        .bind(payload.lead_type.as_str())
        .bind(payload.value)
        .bind(&payload.currency)
        .bind(&payload.community_id)
        .bind(payload.email.is_some())
        .bind(payload.phone.is_some())
        .bind(payload.gclid.is_some())
        .bind(payload.gbraid.is_some())
        .bind(payload.wbraid.is_some())
        .bind(payload.fbclid.is_some())
        .bind(report.google.success)
        .bind(&report.google.error)
        .bind(report.meta.success)
        .bind(&report.meta.error)
        .bind(latency_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to store dispatch audit record")?;

        tracing::debug!(
            "✓ Dispatch audit record stored for {}",
            payload.transaction_id
        );
        Ok(())
    }
}

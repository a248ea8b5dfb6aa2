use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use moka::future::Cache;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::{self, DispatchResult};
use crate::errors::AppError;
use crate::google_ads::GoogleAdsClient;
use crate::meta_capi::MetaCapiClient;
use crate::models::{ConversionRequest, ConversionResponse};
use crate::payload::ConversionPayload;
use crate::storage::DispatchAuditStore;
use crate::validation::{is_valid_email, validate_phone};

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Database connection pool; `None` disables the dispatch audit log.
    pub db: Option<PgPool>,
    /// Google Ads conversion upload adapter.
    pub google_ads: Arc<GoogleAdsClient>,
    /// Meta Conversions API adapter.
    pub meta_capi: Arc<MetaCapiClient>,
    /// Short-TTL cache of recently dispatched transaction ids, suppressing
    /// double-click resubmits of the same logical conversion.
    pub recent_transactions_cache: Cache<String, i64>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "conversions-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/conversions
///
/// Conversion dispatch endpoint, called by the marketing site's
/// lead-submission handler immediately after the lead record has been
/// durably saved (never before; that ordering is the caller's contract).
///
/// Flow:
/// 1. Validate X-Api-Token (when configured).
/// 2. Suppress recent duplicate transaction ids (double-click resubmits).
/// 3. Drop invalid email/phone with a warning.
/// 4. Build the conversion payload (the only step allowed to fail the request).
/// 5. Fan out to both platform adapters concurrently.
/// 6. Store the redacted audit record (best-effort).
///
/// Per-platform failures are reported inside the 200 response body; the
/// caller logs them and proceeds, since the lead itself is already saved.
pub async fn dispatch_conversion_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConversionRequest>,
) -> Result<(StatusCode, Json<ConversionResponse>), AppError> {
    // Step 1: shared-secret auth, before anything else
    validate_api_token(&state.config, &headers)?;

    // Step 2: duplicate guard, only meaningful for caller-supplied ids
    let caller_supplied_id = request
        .transaction_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    if let Some(transaction_id) = &caller_supplied_id {
        if state
            .recent_transactions_cache
            .get(transaction_id)
            .await
            .is_some()
        {
            tracing::warn!("⚠️  Duplicate conversion submission: {}", transaction_id);
            return Ok((
                StatusCode::OK,
                Json(ConversionResponse {
                    dispatched: false,
                    duplicate: true,
                    transaction_id: transaction_id.clone(),
                    google: DispatchResult::failure("dispatch skipped: duplicate transaction"),
                    meta: DispatchResult::failure("dispatch skipped: duplicate transaction"),
                }),
            ));
        }
    }

    // Step 3: drop contact fields that would only pollute platform matching
    let request = sanitize_contact_fields(&state.config, request);

    // Step 4: build the payload; validation failures abort here, before any
    // adapter is invoked
    let payload = ConversionPayload::from_request(&request)?;

    // Mark the id as seen only once a valid payload exists, so a rejected
    // submission can be retried with the same id
    if let Some(transaction_id) = caller_supplied_id {
        state
            .recent_transactions_cache
            .insert(transaction_id, 1)
            .await;
    }

    tracing::info!(
        "📨 Conversion received: {}",
        payload.redacted()
    );

    // Step 5: concurrent fan-out
    let start = std::time::Instant::now();
    let report =
        dispatch::dispatch_conversion(state.google_ads.clone(), state.meta_capi.clone(), &payload)
            .await;
    let latency_ms = start.elapsed().as_millis() as i32;

    // Step 6: best-effort audit record
    if let Some(db) = &state.db {
        let store = DispatchAuditStore::new(db.clone());
        if let Err(e) = store.record(&payload, &report, latency_ms).await {
            tracing::error!("Failed to store dispatch audit record: {}", e);
        }
    } else {
        tracing::debug!("Audit storage disabled, skipping dispatch record");
    }

    Ok((
        StatusCode::OK,
        Json(ConversionResponse {
            dispatched: true,
            duplicate: false,
            transaction_id: payload.transaction_id.clone(),
            google: report.google,
            meta: report.meta,
        }),
    ))
}

/// Validate the shared-secret X-Api-Token header.
fn validate_api_token(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    // If no token is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_token) = config.api_token else {
        return Ok(());
    };

    let token = headers
        .get("X-Api-Token")
        .or_else(|| headers.get("x-api-token"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Api-Token header".to_string()))?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(token, expected_token) {
        tracing::warn!("Invalid API token received");
        return Err(AppError::Unauthorized("Invalid API token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison (basic implementation)
/// For production, consider using a crypto library like `subtle`
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Drops email/phone values that fail intake validation.
///
/// Invalid contact fields are removed rather than rejected: the lead is
/// already saved upstream, and a conversion without an email still attributes
/// through click ids. The payload keeps the raw (validated) values;
/// canonicalization happens inside the adapters.
fn sanitize_contact_fields(config: &Config, mut request: ConversionRequest) -> ConversionRequest {
    if let Some(email) = request.lead.email.take() {
        let email = email.trim().to_string();
        if is_valid_email(&email) {
            request.lead.email = Some(email);
        } else {
            tracing::warn!("❌ Dropping invalid email from conversion request");
        }
    }

    if let Some(phone) = request.lead.phone.take() {
        let (valid, _) = validate_phone(&phone, config.default_region);
        if valid {
            request.lead.phone = Some(phone);
        } else {
            tracing::warn!("❌ Dropping invalid phone from conversion request");
        }
    }

    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadContact;
    use phonenumber::country::Id as CountryId;

    fn test_config() -> Config {
        Config {
            port: 8080,
            database_url: None,
            api_token: Some("secret".to_string()),
            default_country_code: "1".to_string(),
            default_region: CountryId::US,
            google_ads: None,
            meta: None,
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(!constant_time_compare("", "a"));
    }

    #[test]
    fn test_api_token_validation() {
        let config = test_config();

        let mut headers = HeaderMap::new();
        assert!(validate_api_token(&config, &headers).is_err());

        headers.insert("X-Api-Token", "wrong".parse().unwrap());
        assert!(validate_api_token(&config, &headers).is_err());

        headers.insert("X-Api-Token", "secret".parse().unwrap());
        assert!(validate_api_token(&config, &headers).is_ok());
    }

    #[test]
    fn test_api_token_skipped_when_not_configured() {
        let mut config = test_config();
        config.api_token = None;

        let headers = HeaderMap::new();
        assert!(validate_api_token(&config, &headers).is_ok());
    }

    #[test]
    fn test_sanitize_drops_invalid_contact_fields() {
        let config = test_config();
        let request = ConversionRequest {
            transaction_id: None,
            lead_type: None,
            value: None,
            currency: None,
            lead: LeadContact {
                name: Some("Jane".to_string()),
                email: Some("not_an_email".to_string()),
                phone: Some("123".to_string()),
            },
            community: None,
            tracking: Default::default(),
        };

        let sanitized = sanitize_contact_fields(&config, request);
        assert!(sanitized.lead.email.is_none());
        assert!(sanitized.lead.phone.is_none());
        assert_eq!(sanitized.lead.name.as_deref(), Some("Jane"));
    }

    #[test]
    fn test_sanitize_keeps_valid_contact_fields() {
        let config = test_config();
        let request = ConversionRequest {
            transaction_id: None,
            lead_type: None,
            value: None,
            currency: None,
            lead: LeadContact {
                name: None,
                email: Some("jane@example.com".to_string()),
                phone: Some("(303) 555-0100".to_string()),
            },
            community: None,
            tracking: Default::default(),
        };

        let sanitized = sanitize_contact_fields(&config, request);
        assert_eq!(sanitized.lead.email.as_deref(), Some("jane@example.com"));
        assert_eq!(sanitized.lead.phone.as_deref(), Some("(303) 555-0100"));
    }

    #[test]
    fn test_sanitize_trims_padded_email() {
        let config = test_config();
        let mut request = ConversionRequest {
            transaction_id: None,
            lead_type: None,
            value: None,
            currency: None,
            lead: LeadContact::default(),
            community: None,
            tracking: Default::default(),
        };
        request.lead.email = Some(" Jane@Example.com ".to_string());

        let sanitized = sanitize_contact_fields(&config, request);
        assert_eq!(sanitized.lead.email.as_deref(), Some("Jane@Example.com"));
    }
}

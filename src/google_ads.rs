use chrono::Utc;
use failsafe::CircuitBreaker;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::circuit_breaker::{create_platform_circuit_breaker, PlatformCircuitBreaker};
use crate::config::GoogleAdsConfig;
use crate::dispatch::DispatchResult;
use crate::errors::AppError;
use crate::identity::{hash_identifier, hash_phone};
use crate::payload::ConversionPayload;

/// One click conversion in an upload request.
/// Documentation: https://developers.google.com/google-ads/api/docs/conversions/upload-clicks
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickConversion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gbraid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wbraid: Option<String>,

    /// Resource name of the conversion action the upload is keyed by.
    pub conversion_action: String,

    /// "yyyy-mm-dd hh:mm:ss+00:00", set at dispatch time.
    pub conversion_date_time: String,

    pub conversion_value: f64,
    pub currency_code: String,

    /// The shared deduplication key: identical to the id a client-side tag
    /// would report, so Google counts browser and server signals once.
    pub order_id: String,

    /// Enhanced-conversion identifiers (hashed email/phone).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_identifiers: Vec<UserIdentifier>,
}

/// A single hashed user identifier for enhanced conversions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadClickConversionsRequest {
    pub conversions: Vec<ClickConversion>,
    /// Surface per-conversion rejections in the response body instead of
    /// failing the whole request.
    pub partial_failure: bool,
}

/// Translates a `ConversionPayload` into a Google Ads click-conversion
/// upload and performs the transport call.
pub struct GoogleAdsClient {
    client: Client,
    config: Option<GoogleAdsConfig>,
    default_country_code: String,
    breaker: PlatformCircuitBreaker,
}

impl GoogleAdsClient {
    /// Credentials are injected once at startup; `None` means this
    /// environment does not report conversions to Google.
    pub fn new(config: Option<GoogleAdsConfig>, default_country_code: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            default_country_code: default_country_code.into(),
            breaker: create_platform_circuit_breaker(),
        }
    }

    /// Uploads one conversion. Never returns an error and never panics
    /// across this boundary: every outcome is folded into a `DispatchResult`.
    pub async fn dispatch(&self, payload: &ConversionPayload) -> DispatchResult {
        let Some(config) = &self.config else {
            tracing::debug!(
                "Google Ads credentials not configured, skipping upload for {}",
                payload.transaction_id
            );
            return DispatchResult::not_configured();
        };

        // One permission check per attempt; a half-open probe's outcome is
        // recorded directly so a success can close the circuit.
        if !self.breaker.is_call_permitted() {
            tracing::warn!(
                "⚠️  Google Ads circuit open, failing fast for {}",
                payload.transaction_id
            );
            return DispatchResult::failure(
                "google ads circuit open after consecutive transport failures",
            );
        }

        match self.upload(config, payload).await {
            Ok(()) => {
                self.breaker.on_success();
                tracing::info!(
                    "✅ Google Ads conversion uploaded: {}",
                    payload.transaction_id
                );
                DispatchResult::ok()
            }
            Err(e) => {
                self.breaker.on_error();
                tracing::error!(
                    "❌ Google Ads upload failed for {}: {}",
                    payload.transaction_id,
                    e
                );
                DispatchResult::failure(e.to_string())
            }
        }
    }

    async fn upload(
        &self,
        config: &GoogleAdsConfig,
        payload: &ConversionPayload,
    ) -> Result<(), AppError> {
        let request = UploadClickConversionsRequest {
            conversions: vec![self.build_conversion(config, payload)],
            partial_failure: true,
        };

        let url = format!(
            "{}/v17/customers/{}:uploadClickConversions",
            config.api_base_url, config.customer_id
        );

        // Redact credentials from logs
        tracing::debug!(
            "Google Ads upload: {} (developer-token=[REDACTED])",
            url
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", config.access_token))
            .header("developer-token", &config.developer_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalApiError(format!("Google Ads request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Google Ads API returned status {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Google Ads response: {}", e))
        })?;

        // A 2xx upload can still carry per-conversion rejections.
        if let Some(partial_failure) = body.get("partialFailureError") {
            let message = partial_failure
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("partial failure");
            return Err(AppError::ExternalApiError(format!(
                "Google Ads rejected conversion: {}",
                message
            )));
        }

        Ok(())
    }

    /// Builds the upload entry for one payload. Multiple click identifiers
    /// may coexist in a single conversion; hashed identifiers are attached
    /// only when the underlying value is non-degenerate.
    fn build_conversion(
        &self,
        config: &GoogleAdsConfig,
        payload: &ConversionPayload,
    ) -> ClickConversion {
        let mut user_identifiers = Vec::new();

        if let Some(email) = payload.email.as_deref() {
            let hashed = hash_identifier(email);
            if !hashed.is_empty() {
                user_identifiers.push(UserIdentifier {
                    hashed_email: Some(hashed),
                    hashed_phone_number: None,
                });
            }
        }

        if let Some(phone) = payload.phone.as_deref() {
            let hashed = hash_phone(phone, &self.default_country_code);
            if !hashed.is_empty() {
                user_identifiers.push(UserIdentifier {
                    hashed_email: None,
                    hashed_phone_number: Some(hashed),
                });
            }
        }

        ClickConversion {
            gclid: payload.gclid.clone(),
            gbraid: payload.gbraid.clone(),
            wbraid: payload.wbraid.clone(),
            conversion_action: config.conversion_action(),
            conversion_date_time: Utc::now().format("%Y-%m-%d %H:%M:%S+00:00").to_string(),
            conversion_value: payload.value,
            currency_code: payload.currency.clone(),
            order_id: payload.transaction_id.clone(),
            user_identifiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;
    use crate::payload::LeadType;

    fn test_config() -> GoogleAdsConfig {
        GoogleAdsConfig {
            customer_id: "1234567890".to_string(),
            conversion_action_id: "555".to_string(),
            developer_token: "dev-token".to_string(),
            access_token: "access-token".to_string(),
            api_base_url: "https://googleads.example.com".to_string(),
        }
    }

    fn test_payload() -> ConversionPayload {
        ConversionPayload {
            transaction_id: "txn_1".to_string(),
            lead_type: LeadType::LeadSubmit,
            value: 50.0,
            currency: "USD".to_string(),
            email: Some(" A@Example.com ".to_string()),
            phone: Some("(303) 555-0100".to_string()),
            community_id: None,
            community_name: None,
            care_type: None,
            gclid: Some("gclid_abc".to_string()),
            gbraid: Some("gbraid_def".to_string()),
            wbraid: None,
            fbclid: None,
            fbp: None,
            fbc: None,
            client_user_agent: None,
            client_ip_address: None,
            event_source_url: None,
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_term: None,
            utm_content: None,
        }
    }

    #[test]
    fn test_conversion_carries_dedup_key_and_value() {
        let client = GoogleAdsClient::new(Some(test_config()), "1");
        let conversion = client.build_conversion(&test_config(), &test_payload());

        assert_eq!(conversion.order_id, "txn_1");
        assert_eq!(conversion.conversion_value, 50.0);
        assert_eq!(conversion.currency_code, "USD");
        assert_eq!(
            conversion.conversion_action,
            "customers/1234567890/conversionActions/555"
        );
    }

    #[test]
    fn test_multiple_click_ids_coexist() {
        let client = GoogleAdsClient::new(Some(test_config()), "1");
        let conversion = client.build_conversion(&test_config(), &test_payload());

        assert_eq!(conversion.gclid.as_deref(), Some("gclid_abc"));
        assert_eq!(conversion.gbraid.as_deref(), Some("gbraid_def"));
        assert!(conversion.wbraid.is_none());
    }

    #[test]
    fn test_identifiers_hashed_with_fixed_recipe() {
        let client = GoogleAdsClient::new(Some(test_config()), "1");
        let conversion = client.build_conversion(&test_config(), &test_payload());

        assert_eq!(conversion.user_identifiers.len(), 2);
        assert_eq!(
            conversion.user_identifiers[0].hashed_email.as_deref(),
            Some(identity::hash_identifier("a@example.com").as_str())
        );
        assert_eq!(
            conversion.user_identifiers[1]
                .hashed_phone_number
                .as_deref(),
            Some(identity::hash_phone("3035550100", "1").as_str())
        );
    }

    #[test]
    fn test_degenerate_identifiers_are_omitted() {
        let client = GoogleAdsClient::new(Some(test_config()), "1");
        let mut payload = test_payload();
        payload.email = Some("   ".to_string());
        payload.phone = None;

        let conversion = client.build_conversion(&test_config(), &payload);
        assert!(conversion.user_identifiers.is_empty());
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let client = GoogleAdsClient::new(Some(test_config()), "1");
        let request = UploadClickConversionsRequest {
            conversions: vec![client.build_conversion(&test_config(), &test_payload())],
            partial_failure: true,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"partialFailure\":true"));
        assert!(json.contains("\"conversionAction\""));
        assert!(json.contains("\"orderId\":\"txn_1\""));
        assert!(json.contains("\"hashedEmail\""));
        assert!(json.contains("\"hashedPhoneNumber\""));
    }

    #[tokio::test]
    async fn test_unconfigured_client_reports_configuration_condition() {
        let client = GoogleAdsClient::new(None, "1");
        let result = client.dispatch(&test_payload()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("credentials not configured"));
    }
}

use chrono::Utc;
use failsafe::CircuitBreaker;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::circuit_breaker::{create_platform_circuit_breaker, PlatformCircuitBreaker};
use crate::config::MetaConfig;
use crate::dispatch::DispatchResult;
use crate::errors::AppError;
use crate::identity::{hash_identifier, hash_phone};
use crate::payload::{ConversionPayload, LeadType};

/// Match-improving signals for one server event. Email and phone are hashed
/// before they get here; cookies, user agent and IP travel as-is per the
/// Conversions API contract.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserData {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub em: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ph: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
}

/// Community/care-type context and value attribution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomData {
    pub value: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,
    pub lead_type: String,
}

/// One server event.
/// Documentation: https://developers.facebook.com/docs/marketing-api/conversions-api
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event_name: String,
    /// Dispatch time, not form-submission time: dispatch runs synchronously
    /// after persistence with negligible delay.
    pub event_time: i64,
    /// The shared deduplication key; Meta dedupes against a client pixel
    /// event carrying the same id.
    pub event_id: String,
    pub action_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub user_data: UserData,
    pub custom_data: CustomData,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerEventRequest {
    pub data: Vec<ServerEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_event_code: Option<String>,
}

/// Maps a lead type to the platform event name. Lead-class submissions all
/// report as "Lead"; tour/booking flows as "Schedule"; phone clicks as
/// "Contact".
pub fn event_name_for(lead_type: LeadType) -> &'static str {
    match lead_type {
        LeadType::LeadSubmit | LeadType::BrochureDownload => "Lead",
        LeadType::ScheduleTour | LeadType::BookingConfirmed => "Schedule",
        LeadType::PhoneCallClick => "Contact",
    }
}

/// Translates a `ConversionPayload` into a Meta Conversions API server event
/// and performs the transport call.
pub struct MetaCapiClient {
    client: Client,
    config: Option<MetaConfig>,
    default_country_code: String,
    breaker: PlatformCircuitBreaker,
}

impl MetaCapiClient {
    /// Credentials are injected once at startup; `None` means this
    /// environment does not report conversions to Meta.
    pub fn new(config: Option<MetaConfig>, default_country_code: impl Into<String>) -> Self {
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

    /// Sends one server event. Never returns an error and never panics
    /// across this boundary: every outcome is folded into a `DispatchResult`.
    pub async fn dispatch(&self, payload: &ConversionPayload) -> DispatchResult {
        let Some(config) = &self.config else {
            tracing::debug!(
                "Meta CAPI credentials not configured, skipping event for {}",
                payload.transaction_id
            );
            return DispatchResult::not_configured();
        };

        // One permission check per attempt; a half-open probe's outcome is
        // recorded directly so a success can close the circuit.
        if !self.breaker.is_call_permitted() {
            tracing::warn!(
                "⚠️  Meta CAPI circuit open, failing fast for {}",
                payload.transaction_id
            );
            return DispatchResult::failure(
                "meta capi circuit open after consecutive transport failures",
            );
        }

        match self.send_event(config, payload).await {
            Ok(()) => {
                self.breaker.on_success();
                tracing::info!("✅ Meta CAPI event sent: {}", payload.transaction_id);
                DispatchResult::ok()
            }
            Err(e) => {
                self.breaker.on_error();
                tracing::error!(
                    "❌ Meta CAPI event failed for {}: {}",
                    payload.transaction_id,
                    e
                );
                DispatchResult::failure(e.to_string())
            }
        }
    }

    async fn send_event(
        &self,
        config: &MetaConfig,
        payload: &ConversionPayload,
    ) -> Result<(), AppError> {
        let request = ServerEventRequest {
            data: vec![self.build_event(payload)],
            test_event_code: config.test_event_code.clone(),
        };

        // Build URL with proper parameter encoding; the access token rides as
        // a query parameter per the Graph API contract.
        let mut url = Url::parse(&format!("{}/{}/events", config.api_base_url, config.pixel_id))
            .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("access_token", &config.access_token);

        tracing::debug!(
            "Meta CAPI request: {}/{}/events?access_token=[REDACTED]",
            config.api_base_url,
            config.pixel_id
        );

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Meta CAPI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Meta CAPI returned status {}: {}",
                status, error_text
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Meta CAPI response: {}", e))
        })?;

        let events_received = body
            .get("events_received")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        if events_received < 1 {
            return Err(AppError::ExternalApiError(format!(
                "Meta CAPI accepted the request but received no events: {}",
                body
            )));
        }

        Ok(())
    }

    /// Builds the server event for one payload.
    fn build_event(&self, payload: &ConversionPayload) -> ServerEvent {
        let mut user_data = UserData {
            fbp: payload.fbp.clone(),
            fbc: payload.fbc.clone(),
            client_user_agent: payload.client_user_agent.clone(),
            client_ip_address: payload.client_ip_address.clone(),
            ..Default::default()
        };

        if let Some(email) = payload.email.as_deref() {
            let hashed = hash_identifier(email);
            if !hashed.is_empty() {
                user_data.em.push(hashed);
            }
        }
        if let Some(phone) = payload.phone.as_deref() {
            let hashed = hash_phone(phone, &self.default_country_code);
            if !hashed.is_empty() {
                user_data.ph.push(hashed);
            }
        }

        // No fbc cookie but a click id on the landing URL: reconstruct the
        // cookie format so the click still attributes.
        if user_data.fbc.is_none() {
            if let Some(fbclid) = payload.fbclid.as_deref() {
                user_data.fbc = Some(format!("fb.1.{}.{}", Utc::now().timestamp_millis(), fbclid));
            }
        }

        ServerEvent {
            event_name: event_name_for(payload.lead_type).to_string(),
            event_time: Utc::now().timestamp(),
            event_id: payload.transaction_id.clone(),
            action_source: "website".to_string(),
            event_source_url: payload.event_source_url.clone(),
            user_data,
            custom_data: CustomData {
                value: payload.value,
                currency: payload.currency.clone(),
                content_name: payload.community_name.clone(),
                content_category: payload.care_type.clone(),
                lead_type: payload.lead_type.as_str().to_string(),
            },
        }
    }
}

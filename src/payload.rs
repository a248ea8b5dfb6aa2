use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ConversionRequest;

/// Conversion event categories reported by the marketing site.
///
/// Each variant selects the semantic event name on the advertising platforms;
/// the wire form is snake_case (`lead_submit`, `schedule_tour`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadType {
    LeadSubmit,
    ScheduleTour,
    BookingConfirmed,
    PhoneCallClick,
    BrochureDownload,
}

impl LeadType {
    /// Wire/snake_case name, used in logs and the audit record.
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadType::LeadSubmit => "lead_submit",
            LeadType::ScheduleTour => "schedule_tour",
            LeadType::BookingConfirmed => "booking_confirmed",
            LeadType::PhoneCallClick => "phone_call_click",
            LeadType::BrochureDownload => "brochure_download",
        }
    }
}

/// The unit of work dispatched to both advertising platforms.
///
/// Built once per lead-submission attempt, immediately after the caller has
/// durably saved the lead, and immutable afterwards: adapters read from it
/// but never mutate it. `email`/`phone` are plaintext here; hashing happens
/// inside each adapter via the identity module, and the payload is discarded
/// after dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionPayload {
    /// Deduplication key shared with any client-side pixel fire for the same
    /// logical conversion. Never reused across distinct submissions.
    pub transaction_id: String,
    pub lead_type: LeadType,
    pub value: f64,
    pub currency: String,

    pub email: Option<String>,
    pub phone: Option<String>,

    pub community_id: Option<String>,
    pub community_name: Option<String>,
    pub care_type: Option<String>,

    // Click identifiers captured from the landing URL
    pub gclid: Option<String>,
    pub gbraid: Option<String>,
    pub wbraid: Option<String>,
    pub fbclid: Option<String>,

    // First-party Meta cookies
    pub fbp: Option<String>,
    pub fbc: Option<String>,

    pub client_user_agent: Option<String>,
    pub client_ip_address: Option<String>,
    pub event_source_url: Option<String>,

    // UTM parameters, informational only
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl ConversionPayload {
    /// Builds a payload from an incoming conversion request.
    ///
    /// Accepts the caller-supplied `transaction_id` (so the browser can reuse
    /// the same id for its client-side pixel fire) or generates one when
    /// absent. Fails with `AppError::Validation` when a mandatory field is
    /// missing or degenerate; validation failures mean a bug in the caller's
    /// payload construction, not a platform problem.
    ///
    /// Optional tracking fields are copied through untransformed: the two
    /// platforms want different representations, so normalization and hashing
    /// are deferred to the adapters.
    pub fn from_request(request: &ConversionRequest) -> Result<Self, AppError> {
        let transaction_id = match &request.transaction_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            Some(_) => {
                return Err(AppError::Validation(
                    "transaction_id must not be blank".to_string(),
                ))
            }
            None => Uuid::new_v4().to_string(),
        };

        let lead_type = request
            .lead_type
            .ok_or_else(|| AppError::Validation("lead_type is required".to_string()))?;

        let value = request
            .value
            .ok_or_else(|| AppError::Validation("value is required".to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(AppError::Validation(format!(
                "value must be a non-negative number, got {}",
                value
            )));
        }

        let currency = request
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::Validation("currency is required".to_string()))?;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::Validation(format!(
                "currency must be a 3-letter ISO code, got '{}'",
                currency
            )));
        }

        let tracking = &request.tracking;

        Ok(Self {
            transaction_id,
            lead_type,
            value,
            currency: currency.to_uppercase(),
            email: request.lead.email.clone(),
            phone: request.lead.phone.clone(),
            community_id: request.community.as_ref().and_then(|c| c.id.clone()),
            community_name: request.community.as_ref().and_then(|c| c.name.clone()),
            care_type: request.community.as_ref().and_then(|c| c.care_type.clone()),
            gclid: tracking.gclid.clone(),
            gbraid: tracking.gbraid.clone(),
            wbraid: tracking.wbraid.clone(),
            fbclid: tracking.fbclid.clone(),
            fbp: tracking.fbp.clone(),
            fbc: tracking.fbc.clone(),
            client_user_agent: tracking.client_user_agent.clone(),
            client_ip_address: tracking.client_ip_address.clone(),
            event_source_url: tracking.event_source_url.clone(),
            utm_source: tracking.utm_source.clone(),
            utm_medium: tracking.utm_medium.clone(),
            utm_campaign: tracking.utm_campaign.clone(),
            utm_term: tracking.utm_term.clone(),
            utm_content: tracking.utm_content.clone(),
        })
    }

    /// Redacted form for logs and the audit record.
    ///
    /// Plaintext PII never leaves the payload's lifetime: email and phone are
    /// reduced to presence flags, click identifiers to presence flags.
    pub fn redacted(&self) -> Value {
        json!({
            "transaction_id": self.transaction_id,
            "lead_type": self.lead_type.as_str(),
            "value": self.value,
            "currency": self.currency,
            "has_email": self.email.is_some(),
            "has_phone": self.phone.is_some(),
            "community_id": self.community_id,
            "care_type": self.care_type,
            "has_gclid": self.gclid.is_some(),
            "has_gbraid": self.gbraid.is_some(),
            "has_wbraid": self.wbraid.is_some(),
            "has_fbclid": self.fbclid.is_some(),
            "has_fbp": self.fbp.is_some(),
            "has_fbc": self.fbc.is_some(),
            "event_source_url": self.event_source_url,
            "utm_source": self.utm_source,
            "utm_campaign": self.utm_campaign,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommunityContext, ConversionRequest, LeadContact, TrackingParams};

    fn base_request() -> ConversionRequest {
        ConversionRequest {
            transaction_id: Some("txn_1".to_string()),
            lead_type: Some(LeadType::LeadSubmit),
            value: Some(50.0),
            currency: Some("USD".to_string()),
            lead: LeadContact {
                name: Some("Jane Doe".to_string()),
                email: Some("jane@example.com".to_string()),
                phone: Some("(303) 555-0100".to_string()),
            },
            community: Some(CommunityContext {
                id: Some("cm_42".to_string()),
                name: Some("Willow Creek".to_string()),
                care_type: Some("assisted_living".to_string()),
            }),
            tracking: TrackingParams::default(),
        }
    }

    #[test]
    fn test_builds_from_complete_request() {
        let payload = ConversionPayload::from_request(&base_request()).unwrap();
        assert_eq!(payload.transaction_id, "txn_1");
        assert_eq!(payload.lead_type, LeadType::LeadSubmit);
        assert_eq!(payload.value, 50.0);
        assert_eq!(payload.currency, "USD");
        assert_eq!(payload.community_name.as_deref(), Some("Willow Creek"));
    }

    #[test]
    fn test_generates_transaction_id_when_absent() {
        let mut request = base_request();
        request.transaction_id = None;
        let payload = ConversionPayload::from_request(&request).unwrap();
        assert!(!payload.transaction_id.is_empty());
    }

    #[test]
    fn test_rejects_blank_transaction_id() {
        let mut request = base_request();
        request.transaction_id = Some("   ".to_string());
        let err = ConversionPayload::from_request(&request).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_rejects_missing_lead_type() {
        let mut request = base_request();
        request.lead_type = None;
        assert!(matches!(
            ConversionPayload::from_request(&request),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_missing_value() {
        let mut request = base_request();
        request.value = None;
        assert!(matches!(
            ConversionPayload::from_request(&request),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_negative_and_non_finite_value() {
        let mut request = base_request();
        request.value = Some(-1.0);
        assert!(ConversionPayload::from_request(&request).is_err());

        request.value = Some(f64::NAN);
        assert!(ConversionPayload::from_request(&request).is_err());
    }

    #[test]
    fn test_rejects_missing_or_malformed_currency() {
        let mut request = base_request();
        request.currency = None;
        assert!(ConversionPayload::from_request(&request).is_err());

        request.currency = Some("US".to_string());
        assert!(ConversionPayload::from_request(&request).is_err());

        request.currency = Some("U5D".to_string());
        assert!(ConversionPayload::from_request(&request).is_err());
    }

    #[test]
    fn test_currency_is_uppercased() {
        let mut request = base_request();
        request.currency = Some("usd".to_string());
        let payload = ConversionPayload::from_request(&request).unwrap();
        assert_eq!(payload.currency, "USD");
    }

    #[test]
    fn test_redacted_form_carries_no_plaintext_pii() {
        let payload = ConversionPayload::from_request(&base_request()).unwrap();
        let redacted = serde_json::to_string(&payload.redacted()).unwrap();
        assert!(!redacted.contains("jane@example.com"));
        assert!(!redacted.contains("555-0100"));
        assert!(redacted.contains("\"has_email\":true"));
        assert!(redacted.contains("\"has_phone\":true"));
    }

    #[test]
    fn test_lead_type_wire_names() {
        assert_eq!(LeadType::LeadSubmit.as_str(), "lead_submit");
        assert_eq!(LeadType::PhoneCallClick.as_str(), "phone_call_click");
        let parsed: LeadType = serde_json::from_str("\"brochure_download\"").unwrap();
        assert_eq!(parsed, LeadType::BrochureDownload);
    }
}

use serde::{Deserialize, Serialize};

use crate::dispatch::DispatchResult;
use crate::payload::LeadType;

/// Body of `POST /api/v1/conversions`.
///
/// Sent by the lead-submission handler of the marketing site immediately
/// after the lead record has been durably saved, never before. The required
/// fields are deliberately `Option` here so that a missing field surfaces as
/// a payload validation error rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionRequest {
    /// Deduplication key chosen by the browser at submission time, so the
    /// same id can be reused for a client-side pixel fire. Generated
    /// server-side when absent.
    #[serde(default)]
    pub transaction_id: Option<String>,

    #[serde(default)]
    pub lead_type: Option<LeadType>,

    /// Conversion value attribution.
    #[serde(default)]
    pub value: Option<f64>,

    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: Option<String>,

    /// Finalized lead contact fields.
    #[serde(default)]
    pub lead: LeadContact,

    /// Community the lead is about, if any.
    #[serde(default)]
    pub community: Option<CommunityContext>,

    /// Browser-collected tracking metadata.
    #[serde(default)]
    pub tracking: TrackingParams,
}

/// Contact fields of the persisted lead record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeadContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Community context forwarded to platform content/category fields.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommunityContext {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub care_type: Option<String>,
}

/// Tracking identifiers collected in the browser at page-load/interaction
/// time: platform click ids from the landing URL, first-party Meta cookies,
/// UTM parameters, and request metadata that improves platform match rates.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackingParams {
    #[serde(default)]
    pub gclid: Option<String>,
    #[serde(default)]
    pub gbraid: Option<String>,
    #[serde(default)]
    pub wbraid: Option<String>,
    #[serde(default)]
    pub fbclid: Option<String>,

    #[serde(default)]
    pub fbp: Option<String>,
    #[serde(default)]
    pub fbc: Option<String>,

    #[serde(default)]
    pub client_user_agent: Option<String>,
    #[serde(default)]
    pub client_ip_address: Option<String>,
    #[serde(default)]
    pub event_source_url: Option<String>,

    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
}

/// Response for `POST /api/v1/conversions`.
///
/// Always 200 once the payload validates: conversion reporting is a
/// best-effort side channel, and per-platform failures are surfaced inside
/// the report rather than as an HTTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResponse {
    /// Whether the dispatch attempt ran (false only for duplicates).
    pub dispatched: bool,
    /// True when the transaction id was seen recently and dispatch was
    /// skipped; the platforms' own event dedup makes re-firing harmless, this
    /// just suppresses double-click resubmits.
    pub duplicate: bool,
    pub transaction_id: String,
    pub google: DispatchResult,
    pub meta: DispatchResult,
}

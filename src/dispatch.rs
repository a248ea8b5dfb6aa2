use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

use crate::google_ads::GoogleAdsClient;
use crate::meta_capi::MetaCapiClient;
use crate::payload::ConversionPayload;

/// Independent outcome of one platform adapter's dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    /// Configuration condition, not a transport failure: the environment has
    /// no credentials for this platform. Expected in dev/test.
    pub fn not_configured() -> Self {
        Self::failure("credentials not configured")
    }
}

/// Combined per-platform report returned to the lead-submission handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionDispatchReport {
    pub google: DispatchResult,
    pub meta: DispatchResult,
}

/// Joins the two adapter futures into a report.
///
/// Each future runs as its own task, so a panic (or runtime abort) in one
/// adapter is converted into that platform's failure entry and never
/// prevents the other's result from being collected. Total by contract:
/// always returns a report pair, even when both entries are failures.
pub async fn join_dispatch<G, M>(google: G, meta: M) -> ConversionDispatchReport
where
    G: Future<Output = DispatchResult> + Send + 'static,
    M: Future<Output = DispatchResult> + Send + 'static,
{
    let google_task = tokio::spawn(google);
    let meta_task = tokio::spawn(meta);

    let (google, meta) = tokio::join!(google_task, meta_task);

    ConversionDispatchReport {
        google: google.unwrap_or_else(|e| {
            tracing::error!("❌ Google Ads adapter task aborted: {}", e);
            DispatchResult::failure(format!("adapter task aborted: {}", e))
        }),
        meta: meta.unwrap_or_else(|e| {
            tracing::error!("❌ Meta CAPI adapter task aborted: {}", e);
            DispatchResult::failure(format!("adapter task aborted: {}", e))
        }),
    }
}

/// Fans one payload out to both platform adapters concurrently.
///
/// The payload is passed by value to each adapter task; adapters read from
/// their copy and share no state, so the two calls may complete in either
/// order. Callers are expected to log the report and proceed regardless of
/// outcome, since conversion reporting is a best-effort side channel to the
/// already-committed lead save, never a gate on it.
pub async fn dispatch_conversion(
    google: Arc<GoogleAdsClient>,
    meta: Arc<MetaCapiClient>,
    payload: &ConversionPayload,
) -> ConversionDispatchReport {
    tracing::info!(
        "📤 Dispatching conversion {} ({}) to ad platforms",
        payload.transaction_id,
        payload.lead_type.as_str()
    );

    let google_payload = payload.clone();
    let meta_payload = payload.clone();

    let report = join_dispatch(
        async move { google.dispatch(&google_payload).await },
        async move { meta.dispatch(&meta_payload).await },
    )
    .await;

    tracing::info!(
        "Dispatch complete for {}: google={}, meta={}",
        payload.transaction_id,
        if report.google.success { "ok" } else { "failed" },
        if report.meta.success { "ok" } else { "failed" },
    );

    report
}

use phonenumber::country::Id as CountryId;

/// Google Ads credentials and upload target, built once at startup and
/// injected into the Google adapter. Absent as a whole when the environment
/// is not configured for Google conversion uploads.
#[derive(Debug, Clone)]
pub struct GoogleAdsConfig {
    /// Ads account the conversions are uploaded to (digits only).
    pub customer_id: String,
    /// Conversion action the uploads are keyed by.
    pub conversion_action_id: String,
    pub developer_token: String,
    pub access_token: String,
    /// Overridable so tests can point the adapter at a mock server.
    pub api_base_url: String,
}

impl GoogleAdsConfig {
    /// Resource name of the configured conversion action.
    pub fn conversion_action(&self) -> String {
        format!(
            "customers/{}/conversionActions/{}",
            self.customer_id, self.conversion_action_id
        )
    }
}

/// Meta Conversions API credentials, same lifecycle as `GoogleAdsConfig`.
#[derive(Debug, Clone)]
pub struct MetaConfig {
    pub pixel_id: String,
    pub access_token: String,
    pub api_base_url: String,
    /// Routes events to Meta's test console instead of production delivery.
    pub test_event_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Optional: the dispatch audit log is skipped entirely when unset.
    pub database_url: Option<String>,
    /// Optional shared secret for the dispatch endpoint (X-Api-Token header).
    pub api_token: Option<String>,
    /// Country calling code prepended during phone normalization.
    pub default_country_code: String,
    /// Region used for intake phone validation.
    pub default_region: CountryId,
    pub google_ads: Option<GoogleAdsConfig>,
    pub meta: Option<MetaConfig>,
}

const GOOGLE_ADS_API_BASE_URL: &str = "https://googleads.googleapis.com";
const META_API_BASE_URL: &str = "https://graph.facebook.com/v21.0";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })
                .transpose()?,
            api_token: std::env::var("API_TOKEN")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            default_country_code: std::env::var("DEFAULT_COUNTRY_CODE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "1".to_string())
                .trim()
                .to_string(),
            default_region: parse_region(
                &std::env::var("DEFAULT_REGION").unwrap_or_else(|_| "US".to_string()),
            )?,
            google_ads: google_ads_from_env()?,
            meta: meta_from_env()?,
        };

        if !config
            .default_country_code
            .chars()
            .all(|c| c.is_ascii_digit())
        {
            anyhow::bail!("DEFAULT_COUNTRY_CODE must contain only digits");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Server Port: {}", config.port);
        if config.database_url.is_some() {
            tracing::info!("Dispatch audit storage enabled");
        } else {
            tracing::warn!("DATABASE_URL not set - dispatch audit storage disabled");
        }
        match &config.google_ads {
            Some(g) => tracing::info!("Google Ads adapter configured: customer {}", g.customer_id),
            None => tracing::warn!("Google Ads adapter not configured"),
        }
        match &config.meta {
            Some(m) => tracing::info!("Meta CAPI adapter configured: pixel {}", m.pixel_id),
            None => tracing::warn!("Meta CAPI adapter not configured"),
        }

        Ok(config)
    }
}

/// Markets the operator runs communities in; intake validation needs a
/// phonenumber region, not just a calling code.
fn parse_region(value: &str) -> anyhow::Result<CountryId> {
    match value.trim().to_uppercase().as_str() {
        "US" => Ok(CountryId::US),
        "CA" => Ok(CountryId::CA),
        "GB" => Ok(CountryId::GB),
        "AU" => Ok(CountryId::AU),
        other => anyhow::bail!("DEFAULT_REGION '{}' not supported (US, CA, GB, AU)", other),
    }
}

/// Reads the Google Ads credential group.
///
/// All-or-nothing: a partially configured group is treated as not configured
/// (with a warning naming the missing variables), never as a startup error,
/// since environments without ads credentials are expected in dev/test.
fn google_ads_from_env() -> anyhow::Result<Option<GoogleAdsConfig>> {
    let vars = [
        "GOOGLE_ADS_CUSTOMER_ID",
        "GOOGLE_ADS_CONVERSION_ACTION_ID",
        "GOOGLE_ADS_DEVELOPER_TOKEN",
        "GOOGLE_ADS_ACCESS_TOKEN",
    ];
    let values: Vec<Option<String>> = vars
        .iter()
        .map(|name| std::env::var(name).ok().filter(|s| !s.trim().is_empty()))
        .collect();

    if values.iter().all(|v| v.is_none()) {
        return Ok(None);
    }
    if values.iter().any(|v| v.is_none()) {
        let missing: Vec<&str> = vars
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| *name)
            .collect();
        tracing::warn!(
            "⚠️  Google Ads partially configured, adapter disabled (missing: {})",
            missing.join(", ")
        );
        return Ok(None);
    }

    let customer_id = values[0].clone().unwrap_or_default();
    if !customer_id.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("GOOGLE_ADS_CUSTOMER_ID must contain only digits (no dashes)");
    }

    Ok(Some(GoogleAdsConfig {
        customer_id,
        conversion_action_id: values[1].clone().unwrap_or_default(),
        developer_token: values[2].clone().unwrap_or_default(),
        access_token: values[3].clone().unwrap_or_default(),
        api_base_url: std::env::var("GOOGLE_ADS_API_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| GOOGLE_ADS_API_BASE_URL.to_string()),
    }))
}

/// Reads the Meta CAPI credential group, same all-or-nothing rules.
fn meta_from_env() -> anyhow::Result<Option<MetaConfig>> {
    let pixel_id = std::env::var("META_PIXEL_ID")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let access_token = std::env::var("META_ACCESS_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty());

    match (pixel_id, access_token) {
        (None, None) => Ok(None),
        (Some(pixel_id), Some(access_token)) => Ok(Some(MetaConfig {
            pixel_id,
            access_token,
            api_base_url: std::env::var("META_API_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| META_API_BASE_URL.to_string()),
            test_event_code: std::env::var("META_TEST_EVENT_CODE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })),
        (pixel_id, _) => {
            let missing = if pixel_id.is_none() {
                "META_PIXEL_ID"
            } else {
                "META_ACCESS_TOKEN"
            };
            tracing::warn!(
                "⚠️  Meta CAPI partially configured, adapter disabled (missing: {})",
                missing
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_action_resource_name() {
        let config = GoogleAdsConfig {
            customer_id: "1234567890".to_string(),
            conversion_action_id: "987654321".to_string(),
            developer_token: "dev".to_string(),
            access_token: "token".to_string(),
            api_base_url: GOOGLE_ADS_API_BASE_URL.to_string(),
        };
        assert_eq!(
            config.conversion_action(),
            "customers/1234567890/conversionActions/987654321"
        );
    }

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("us").unwrap(), CountryId::US);
        assert_eq!(parse_region(" CA ").unwrap(), CountryId::CA);
        assert!(parse_region("ZZ").is_err());
    }
}
